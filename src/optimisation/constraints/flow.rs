//! Demand, path-arc consistency, vehicle conservation and emission accounting.
use super::{ConstraintContext, TermsByKey};
use crate::index_sets::ScenarioIndexed;
use crate::optimisation::problem::{ConstraintFamily, Problem};
use crate::product::find_vehicle_type;
use anyhow::Result;
use std::collections::HashMap;

/// Add demand constraints.
///
/// For every demand above the tolerance, the flow along the paths between its origin and
/// destination must be at least the demand. Supplying slightly more than the demand is allowed.
pub fn add_demand_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    for key in ctx.sets.demand() {
        let (origin, destination, product, year, scenario) = key;
        let amount = model.demand.get(origin, destination, product, *year);
        let terms = model
            .paths
            .od_paths(origin, destination)
            .iter()
            .filter_map(|path| {
                ctx.variables
                    .path_flow
                    .get(&(*path, product.clone(), *year, scenario.clone()))
            })
            .map(|var| (var, 1.0));

        problem.add_row(
            ConstraintFamily::Demand,
            key.label(),
            (amount - ctx.feas_relax())..,
            terms,
        );
    }
}

/// Add constraints linking arc flows to path flows.
///
/// The flow of a product on an arc, summed over fuels, must equal the flow along the paths using
/// the arc. Empty vehicle flows are linked to unimodal path flows in the same way.
pub fn add_path_arc_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let deviation = ctx.absolute_deviation();

    let mut terms = TermsByKey::new();
    for ((arc, _, product, year, scenario), var) in variables.flow.iter() {
        terms.add((*arc, product.clone(), *year, scenario.clone()), var, 1.0);
    }
    for ((path_id, product, year, scenario), var) in variables.path_flow.iter() {
        let Some(path) = model.paths.get(*path_id) else {
            continue;
        };
        for arc in &path.arcs {
            terms.add((*arc, product.clone(), *year, scenario.clone()), var, -1.0);
        }
    }
    for ((arc, product, year, scenario), terms) in terms.into_rows() {
        problem.add_row(
            ConstraintFamily::PathArc,
            format!("{},{product},{year},{scenario}", model.network.arc(arc)),
            -deviation..=deviation,
            terms,
        );
    }

    if !model.parameters.balancing_trips {
        return;
    }

    let mut terms = TermsByKey::new();
    for ((arc, _, vehicle, year, scenario), var) in variables.balancing_flow.iter() {
        terms.add((*arc, vehicle.clone(), *year, scenario.clone()), var, 1.0);
    }
    for ((path_id, vehicle, year, scenario), var) in variables.balancing_path_flow.iter() {
        let Some(path) = model.paths.get(*path_id) else {
            continue;
        };
        for arc in &path.arcs {
            terms.add((*arc, vehicle.clone(), *year, scenario.clone()), var, -1.0);
        }
    }
    for ((arc, vehicle, year, scenario), terms) in terms.into_rows() {
        problem.add_row(
            ConstraintFamily::PathArcBalancing,
            format!("{},{vehicle},{year},{scenario}", model.network.arc(arc)),
            -deviation..=deviation,
            terms,
        );
    }
}

/// Add vehicle conservation constraints.
///
/// At every node, the loaded vehicles arriving minus those leaving must be made up by empty
/// vehicles leaving minus those arriving, for each fuel and vehicle type.
pub fn add_fleet_balance_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    if ctx.sets.fleet_balance().is_empty() {
        return;
    }

    let model = ctx.model;
    let variables = ctx.variables;
    let deviation = ctx.absolute_deviation();

    // The vehicle type carrying each product on each mode
    let vehicle_for: HashMap<_, _> = model
        .modes
        .keys()
        .flat_map(|mode| model.products.values().map(move |product| (mode, product)))
        .filter_map(|(mode, product)| {
            find_vehicle_type(&model.vehicle_types, mode, &product.class)
                .map(|vehicle| ((mode.clone(), product.id.clone()), vehicle.id.clone()))
        })
        .collect();

    let mut terms = TermsByKey::new();
    for ((arc_idx, fuel, product, year, scenario), var) in variables.flow.iter() {
        let arc = model.network.arc(*arc_idx);
        let Some(vehicle) = vehicle_for.get(&(arc.mode.clone(), product.clone())) else {
            continue;
        };
        for (node, coeff) in [(&arc.to, 1.0), (&arc.from, -1.0)] {
            let key = (
                node.clone(),
                arc.mode.clone(),
                fuel.clone(),
                vehicle.clone(),
                *year,
                scenario.clone(),
            );
            terms.add(key, var, coeff);
        }
    }
    for ((arc_idx, fuel, vehicle, year, scenario), var) in variables.balancing_flow.iter() {
        let arc = model.network.arc(*arc_idx);
        for (node, coeff) in [(&arc.to, 1.0), (&arc.from, -1.0)] {
            let key = (
                node.clone(),
                arc.mode.clone(),
                fuel.clone(),
                vehicle.clone(),
                *year,
                scenario.clone(),
            );
            terms.add(key, var, coeff);
        }
    }

    for key in ctx.sets.fleet_balance() {
        let terms = terms.take(key);
        if terms.is_empty() {
            continue;
        }

        problem.add_row(
            ConstraintFamily::FleetBalance,
            key.label(),
            -deviation..=deviation,
            terms,
        );
    }
}

/// Add emission accounting and, if enabled, the emission cap.
///
/// Empty trips emit `empty_vehicle_factor` times the emissions of the cheapest product their
/// vehicle type carries. With the cap enabled, emissions in every period after the first are
/// limited to a percentage of the first period's, unless the penalised overshoot is used.
pub fn add_emission_constraints(problem: &mut Problem, ctx: &ConstraintContext) -> Result<()> {
    let model = ctx.model;
    let variables = ctx.variables;
    let evf = model.parameters.empty_vehicle_factor.value();

    let mut terms = TermsByKey::new();
    for ((arc_idx, fuel, product, year, scenario), var) in variables.flow.iter() {
        let emissions = model.costs.emissions(*arc_idx, fuel, product, *year);
        terms.add((*year, scenario.clone()), var, -emissions);
    }
    for ((arc_idx, fuel, vehicle, year, scenario), var) in variables.balancing_flow.iter() {
        let mode = &model.network.arc(*arc_idx).mode;
        let product = ctx.cheapest_product(mode, fuel, vehicle, *year)?;
        let emissions = model.costs.emissions(*arc_idx, fuel, product, *year);
        terms.add((*year, scenario.clone()), var, -evf * emissions);
    }

    for (key, total) in variables.total_emissions.iter() {
        let mut terms = terms.take(key);
        terms.push((total, 1.0));
        problem.add_row(ConstraintFamily::Emissions, key.label(), 0.0..=0.0, terms);
    }

    if !model.parameters.emission_cap {
        return Ok(());
    }

    let t0 = model.time_periods.first_year();
    for (key, penalty) in variables.emission_penalty.iter() {
        let (year, scenario) = key;
        let (Some(total), Some(first)) = (
            variables.total_emissions.get(key),
            variables.total_emissions.get(&(t0, scenario.clone())),
        ) else {
            continue;
        };

        let cap = model.parameters.emission_cap_percent(*year) / 100.0;
        problem.add_row(
            ConstraintFamily::EmissionCap,
            key.label(),
            ..=ctx.feas_relax(),
            [(total, 1.0), (first, -cap), (penalty, -1.0)],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::fixture::model;
    use crate::index_sets::{IndexSets, ModelBuildContext};
    use crate::model::Model;
    use crate::optimisation::constraints::{ConstraintContext, add_model_constraints};
    use crate::optimisation::problem::{ConstraintFamily, Problem};
    use crate::optimisation::variables::Variables;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn build(model: &Model) -> Problem {
        let ctx = ModelBuildContext::all_scenarios(model).unwrap();
        let sets = IndexSets::build(model, &ctx);
        let mut problem = Problem::default();
        let variables = Variables::new(&mut problem, model, &sets);
        let ctx = ConstraintContext {
            model,
            sets: &sets,
            variables: &variables,
        };
        add_model_constraints(&mut problem, &ctx).unwrap();
        problem
    }

    fn count(problem: &Problem, family: ConstraintFamily) -> usize {
        problem.iter_rows().filter(|row| row.family == family).count()
    }

    #[rstest]
    fn test_demand_rows(model: Model) {
        let problem = build(&model);

        // Two products in six years and three scenarios
        assert_eq!(count(&problem, ConstraintFamily::Demand), 2 * 6 * 3);
        let row = problem
            .iter_rows()
            .find(|row| row.family == ConstraintFamily::Demand)
            .unwrap();
        assert!(row.upper.is_infinite());
        assert!(row.terms.iter().all(|(_, coeff)| *coeff > 0.0));
        assert!(!row.terms.is_empty());
    }

    #[rstest]
    fn test_path_arc_rows_are_bands(model: Model) {
        let problem = build(&model);
        let deviation = model.parameters.absolute_deviation;
        let rows: Vec<_> = problem
            .iter_rows()
            .filter(|row| row.family == ConstraintFamily::PathArc)
            .collect();

        // One row per arc, product, year and scenario
        assert_eq!(
            rows.len(),
            model.network.arcs().len() * model.products.len() * 6 * 3
        );
        for row in rows {
            assert_approx_eq!(f64, row.lower, -deviation);
            assert_approx_eq!(f64, row.upper, deviation);
        }
    }

    #[rstest]
    fn test_fleet_balance_skipped_without_balancing(mut model: Model) {
        assert!(count(&build(&model), ConstraintFamily::FleetBalance) > 0);
        model.parameters.balancing_trips = false;
        let problem = build(&model);
        assert_eq!(count(&problem, ConstraintFamily::FleetBalance), 0);
        assert_eq!(count(&problem, ConstraintFamily::PathArcBalancing), 0);
    }

    #[rstest]
    fn test_emission_cap(mut model: Model) {
        assert_eq!(count(&build(&model), ConstraintFamily::EmissionCap), 0);
        model.parameters.emission_cap = true;
        let problem = build(&model);
        assert_eq!(count(&problem, ConstraintFamily::Emissions), 6 * 3);
        assert_eq!(count(&problem, ConstraintFamily::EmissionCap), 5 * 3);
    }
}
