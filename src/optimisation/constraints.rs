//! Code for adding constraints to the transport model.
//!
//! Each family of constraints is added by its own function, which reads the index sets and the
//! variables of the model but never mutates them.
use super::problem::{Problem, Variable};
use super::variables::Variables;
use crate::index_sets::IndexSets;
use crate::mode::{FuelID, ModeID};
use crate::model::Model;
use crate::product::{ProductID, VehicleTypeID};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::hash::Hash;

mod capacity;
mod costs;
mod flow;
mod nonanticipativity;
mod technology;

/// The data needed to add constraints to the problem
pub struct ConstraintContext<'a> {
    /// The model
    pub model: &'a Model,
    /// The index sets of this model instance
    pub sets: &'a IndexSets,
    /// The variables already added to the problem
    pub variables: &'a Variables,
}

impl ConstraintContext<'_> {
    /// Slack added to relaxed inequalities
    fn feas_relax(&self) -> f64 {
        self.model.parameters.feas_relax
    }

    /// Half-width of the band around relaxed equalities
    fn absolute_deviation(&self) -> f64 {
        self.model.parameters.absolute_deviation
    }

    /// The product whose costs and emissions are charged to empty trips of a vehicle type
    fn cheapest_product(
        &self,
        mode: &ModeID,
        fuel: &FuelID,
        vehicle: &VehicleTypeID,
        year: u32,
    ) -> Result<&ProductID> {
        self.model
            .costs
            .cheapest_product(mode, fuel, vehicle, year)
            .with_context(|| {
                format!("No costs for empty trips of {vehicle} ({mode}, {fuel}) in {year}")
            })
    }
}

/// Terms of the constraints of one family, grouped by the index of the constraint
struct TermsByKey<K>(IndexMap<K, Vec<(Variable, f64)>>);

impl<K: Eq + Hash> TermsByKey<K> {
    fn new() -> Self {
        Self(IndexMap::new())
    }

    fn add(&mut self, key: K, var: Variable, coeff: f64) {
        self.0.entry(key).or_default().push((var, coeff));
    }

    fn take(&mut self, key: &K) -> Vec<(Variable, f64)> {
        self.0.swap_remove(key).unwrap_or_default()
    }

    fn into_rows(self) -> impl Iterator<Item = (K, Vec<(Variable, f64)>)> {
        self.0.into_iter()
    }
}

/// Add every constraint of the model.
///
/// # Arguments
///
/// * `problem` - The optimisation problem
/// * `ctx` - The model, index sets and variables
pub fn add_model_constraints(problem: &mut Problem, ctx: &ConstraintContext) -> Result<()> {
    flow::add_demand_constraints(problem, ctx);
    flow::add_path_arc_constraints(problem, ctx);
    flow::add_fleet_balance_constraints(problem, ctx);
    flow::add_emission_constraints(problem, ctx)?;

    capacity::add_edge_capacity_constraints(problem, ctx);
    capacity::add_terminal_capacity_constraints(problem, ctx);
    capacity::add_charging_constraints(problem, ctx);
    capacity::add_upgrade_constraints(problem, ctx);

    technology::add_transport_amount_constraints(problem, ctx);
    technology::add_technology_share_constraints(problem, ctx);
    if !ctx.sets.is_single_time_period() {
        technology::add_initial_mix_constraints(problem, ctx);
        technology::add_mode_shift_constraints(problem, ctx);
        technology::add_bass_diffusion_constraints(problem, ctx);
    }

    costs::add_cost_component_constraints(problem, ctx)?;
    costs::add_stage_cost_constraints(problem, ctx);

    nonanticipativity::add_nonanticipativity_constraints(problem, ctx);

    Ok(())
}
