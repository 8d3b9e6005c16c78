//! Tightening and releasing the bounds of first-stage variables between solves.
//!
//! These are used to evaluate the expected-value solution under uncertainty and to warm-start the
//! stochastic program from it.
use super::TransportModel;
use super::variables::{VariableMap, Variables};
use crate::index_sets::ScenarioIndexed;
use crate::scenario::ScenarioID;
use anyhow::{Context, Result, ensure};
use log::info;

impl TransportModel<'_> {
    /// Bound the first-stage decisions of every scenario by a solved single-scenario model.
    ///
    /// Emissions are kept within the relative deviation of the reference, while investment and
    /// charging decisions are fixed to the reference values. A decision missing from the reference
    /// is fixed to zero.
    pub fn fix_first_stage(&mut self, reference: &TransportModel) -> Result<()> {
        let relative = self.model.parameters.relative_deviation;
        self.bound_by_reference(reference, |vars| &vars.total_emissions, |value| {
            ((1.0 - relative) * value, (1.0 + relative) * value)
        })?;
        self.bound_by_reference(reference, |vars| &vars.edge_expansion, fix_integer)?;
        self.bound_by_reference(reference, |vars| &vars.upgrade, fix_integer)?;
        self.bound_by_reference(reference, |vars| &vars.node_expansion, |value| (value, value))?;
        self.bound_by_reference(reference, |vars| &vars.charging, |value| (value, value))?;
        info!("Fixed first-stage decisions to the reference solution");

        Ok(())
    }

    /// Release the first-stage decisions fixed by [`Self::fix_first_stage`].
    ///
    /// The first decision year stays bounded. Flows in the later first-stage years are allowed to
    /// dip slightly below zero and are capped at twice the largest demand. The current solution,
    /// if any, becomes the start vector for the next warm-started solve.
    pub fn unfix_first_stage(&mut self) {
        let params = &self.model.parameters;
        let time_periods = &self.model.time_periods;
        let t0 = time_periods.first_year();
        let released = |year: u32| year != t0 && time_periods.is_first_stage(year);
        let flow_bounds = (
            -params.absolute_deviation,
            2.0 * self.model.demand.max_amount(),
        );
        let investment_upper = if params.no_investments { 0.0 } else { 1.0 };

        for ((_, _, _, year, _), var) in self.variables.flow.iter() {
            if released(*year) {
                self.problem.set_bounds(var, flow_bounds.0, flow_bounds.1);
            }
        }
        if params.balancing_trips {
            for ((_, _, _, year, _), var) in self.variables.balancing_flow.iter() {
                if released(*year) {
                    self.problem.set_bounds(var, flow_bounds.0, flow_bounds.1);
                }
            }
        }
        for ((year, _), var) in self.variables.total_emissions.iter() {
            if released(*year) {
                self.problem.set_bounds(var, 0.0, f64::INFINITY);
            }
        }

        let investments = self
            .variables
            .edge_expansion
            .iter()
            .chain(self.variables.upgrade.iter())
            .map(|(_, var)| var)
            .chain(self.variables.node_expansion.iter().map(|(_, var)| var));
        for var in investments {
            self.problem.set_bounds(var, 0.0, investment_upper);
        }
        for (_, var) in self.variables.charging.iter() {
            self.problem.set_bounds(var, 0.0, f64::INFINITY);
        }

        if let Some(solution) = self.solution.take() {
            self.start = Some(solution.columns);
        }
        info!("Released first-stage decisions after the first decision year");
    }

    /// Bound the first-period emissions of every scenario by a solved first-period model
    pub fn fix_first_time_period(&mut self, init: &TransportModel) -> Result<()> {
        if self.sets.is_single_time_period() {
            return Ok(());
        }

        let relative = self.model.parameters.relative_deviation;
        let t0 = self.model.time_periods.first_year();
        let solution = init
            .solution()
            .context("The first-period model has not been solved")?;
        let init_scenario = single_scenario(init)?;
        let value = init
            .variables
            .total_emissions
            .get(&(t0, init_scenario.clone()))
            .map_or(0.0, |var| solution.value(var));

        for ((year, _), var) in self.variables.total_emissions.iter() {
            if *year == t0 {
                self.problem
                    .set_bounds(var, (1.0 - relative) * value, (1.0 + relative) * value);
            }
        }
        self.solution = None;

        Ok(())
    }

    /// Set the bounds of one family's first-stage variables from the reference's values
    fn bound_by_reference<K, F, B>(
        &mut self,
        reference: &TransportModel,
        family: F,
        bounds: B,
    ) -> Result<()>
    where
        K: ScenarioIndexed,
        F: Fn(&Variables) -> &VariableMap<K>,
        B: Fn(f64) -> (f64, f64),
    {
        let solution = reference
            .solution()
            .context("The reference model has not been solved")?;
        let reference_scenario = single_scenario(reference)?;
        let time_periods = &self.model.time_periods;

        let reference_vars = family(&reference.variables);
        for (key, var) in family(&self.variables).iter() {
            if !key.year().is_some_and(|year| time_periods.is_first_stage(year)) {
                continue;
            }

            let value = reference_vars
                .get(&key.with_scenario(reference_scenario))
                .map_or(0.0, |var| solution.value(var));
            let (lower, upper) = bounds(value);
            self.problem.set_bounds(var, lower, upper);
        }
        self.solution = None;

        Ok(())
    }
}

/// Bounds fixing a binary decision to the nearest integer
fn fix_integer(value: f64) -> (f64, f64) {
    let value = value.round();
    (value, value)
}

/// The only scenario of a reference model
fn single_scenario<'b>(reference: &'b TransportModel) -> Result<&'b ScenarioID> {
    let scenarios = reference.sets.scenarios();
    ensure!(
        scenarios.len() == 1,
        "A reference model must have a single scenario, not {}",
        scenarios.len()
    );

    Ok(&scenarios[0].id)
}

#[cfg(test)]
mod tests {
    use crate::fixture::model;
    use crate::index_sets::ModelBuildContext;
    use crate::model::Model;
    use crate::optimisation::variables::VariableMap;
    use crate::optimisation::{Solution, TransportModel};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    /// A reference model with every variable set to `value`
    fn solved_reference(model: &Model, value: f64) -> TransportModel<'_> {
        let ctx = ModelBuildContext::expected_value(model).unwrap();
        let mut reference = TransportModel::build(model, &ctx).unwrap();
        reference.solution = Some(Solution {
            columns: vec![value; reference.problem.num_cols()],
            objective: 0.0,
        });
        reference
    }

    #[rstest]
    fn test_fix_first_stage(model: Model) {
        let reference = solved_reference(&model, 0.8);
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        transport.fix_first_stage(&reference).unwrap();

        let relative = model.parameters.relative_deviation;
        for ((year, _), var) in transport.variables.total_emissions.iter() {
            let (lower, upper) = transport.problem.bounds(var);
            if *year < 2034 {
                assert_approx_eq!(f64, lower, 0.8 * (1.0 - relative));
                assert_approx_eq!(f64, upper, 0.8 * (1.0 + relative));
            } else {
                assert_eq!((lower, upper), (0.0, f64::INFINITY));
            }
        }

        // Binary decisions are rounded
        let (_, var) = transport.variables.edge_expansion.iter().next().unwrap();
        assert_eq!(transport.problem.bounds(var), (1.0, 1.0));
        for (_, var) in transport.variables.charging.iter().filter(|(k, _)| k.2 < 2034) {
            assert_eq!(transport.problem.bounds(var), (0.8, 0.8));
        }
    }

    #[rstest]
    fn test_missing_reference_values_fixed_to_zero(model: Model) {
        let mut reference = solved_reference(&model, 1.0);
        reference.variables.edge_expansion = VariableMap::default();

        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        transport.fix_first_stage(&reference).unwrap();
        assert!(!transport.variables.edge_expansion.is_empty());
        for (_, var) in transport.variables.edge_expansion.iter() {
            assert_eq!(transport.problem.bounds(var), (0.0, 0.0));
        }
    }

    #[rstest]
    fn test_unfix_first_stage(model: Model) {
        let reference = solved_reference(&model, 0.0);
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        transport.fix_first_stage(&reference).unwrap();
        transport.unfix_first_stage();

        for ((year, _), var) in transport.variables.total_emissions.iter() {
            let (lower, upper) = transport.problem.bounds(var);
            if *year == 2022 {
                assert_approx_eq!(f64, upper, 0.0);
            } else {
                assert!(upper.is_infinite());
                assert_approx_eq!(f64, lower, 0.0);
            }
        }
        for ((_, _, _, year, _), var) in transport.variables.flow.iter() {
            let (lower, upper) = transport.problem.bounds(var);
            if *year == 2026 || *year == 2030 {
                assert_approx_eq!(f64, lower, -model.parameters.absolute_deviation);
                assert_approx_eq!(f64, upper, 4.0);
            }
        }
        for (_, var) in transport.variables.edge_expansion.iter() {
            assert_eq!(transport.problem.bounds(var), (0.0, 1.0));
        }
        assert!(transport.solution().is_none());
        assert!(transport.start().is_none());
    }

    #[rstest]
    fn test_unfix_keeps_solution_as_start(model: Model) {
        let reference = solved_reference(&model, 0.0);
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        transport.fix_first_stage(&reference).unwrap();
        let num_cols = transport.problem.num_cols();
        transport.solution = Some(Solution {
            columns: vec![0.5; num_cols],
            objective: 3.0,
        });

        transport.unfix_first_stage();
        assert!(transport.solution().is_none());
        assert_eq!(transport.start(), Some(&vec![0.5; num_cols][..]));
    }

    #[rstest]
    fn test_fix_first_time_period(model: Model) {
        let ctx = ModelBuildContext::first_period(&model);
        let mut init = TransportModel::build(&model, &ctx).unwrap();
        init.solution = Some(Solution {
            columns: vec![2.0; init.problem.num_cols()],
            objective: 0.0,
        });

        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        transport.fix_first_time_period(&init).unwrap();
        let relative = model.parameters.relative_deviation;
        for ((year, _), var) in transport.variables.total_emissions.iter() {
            let (_, upper) = transport.problem.bounds(var);
            if *year == 2022 {
                assert_approx_eq!(f64, upper, 2.0 * (1.0 + relative));
            } else {
                assert!(upper.is_infinite());
            }
        }
    }

    #[rstest]
    fn test_reference_must_be_solved(model: Model) {
        let ctx = ModelBuildContext::expected_value(&model).unwrap();
        let reference = TransportModel::build(&model, &ctx).unwrap();
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let mut transport = TransportModel::build(&model, &ctx).unwrap();
        assert!(transport.fix_first_stage(&reference).is_err());
    }
}
