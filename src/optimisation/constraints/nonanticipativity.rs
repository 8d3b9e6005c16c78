//! Non-anticipativity: first-stage decisions cannot depend on the scenario.
use super::ConstraintContext;
use crate::index_sets::ScenarioIndexed;
use crate::optimisation::problem::{ConstraintFamily, Problem};
use crate::optimisation::variables::VariableMap;
use crate::time_period::TimePeriods;

/// Force the first-stage variables of one family to agree across every pair of scenarios.
///
/// Keys without a year (e.g. first-stage costs) are first-stage by definition.
fn add_for_family<K: ScenarioIndexed>(
    problem: &mut Problem,
    ctx: &ConstraintContext,
    name: &str,
    map: &VariableMap<K>,
) {
    let time_periods: &TimePeriods = &ctx.model.time_periods;
    for (key, var) in map.iter() {
        if !key.year().is_none_or(|year| time_periods.is_first_stage(year)) {
            continue;
        }

        for (_, other) in ctx
            .sets
            .scenario_pairs()
            .iter()
            .filter(|(first, _)| first == key.scenario())
        {
            let Some(other_var) = map.get(&key.with_scenario(other)) else {
                continue;
            };
            problem.add_row(
                ConstraintFamily::NonAnticipativity,
                format!("{name}[{}],{other}", key.label()),
                0.0..=0.0,
                [(var, 1.0), (other_var, -1.0)],
            );
        }
    }
}

/// Add non-anticipativity constraints for every variable family with first-stage entries.
///
/// The value at risk is a single variable shared by all scenarios, while the excess over it and
/// the second-stage cost differ between scenarios by definition.
pub fn add_nonanticipativity_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    if ctx.sets.scenario_pairs().is_empty() {
        return;
    }

    let variables = ctx.variables;
    add_for_family(problem, ctx, "x", &variables.flow);
    add_for_family(problem, ctx, "b", &variables.balancing_flow);
    add_for_family(problem, ctx, "h", &variables.path_flow);
    add_for_family(problem, ctx, "h_bal", &variables.balancing_path_flow);
    add_for_family(problem, ctx, "emissions", &variables.total_emissions);
    add_for_family(problem, ctx, "penalty", &variables.emission_penalty);
    add_for_family(problem, ctx, "stage_cost", &variables.stage_cost);
    add_for_family(problem, ctx, "epsilon", &variables.edge_expansion);
    add_for_family(problem, ctx, "upsilon", &variables.upgrade);
    add_for_family(problem, ctx, "nu", &variables.node_expansion);
    add_for_family(problem, ctx, "y", &variables.charging);
    add_for_family(problem, ctx, "q", &variables.transport_amount);
    add_for_family(problem, ctx, "q_delta", &variables.transport_decrease);
    add_for_family(problem, ctx, "q_aux", &variables.aux_transport_amount);
    add_for_family(problem, ctx, "q_mode", &variables.mode_total);
    add_for_family(problem, ctx, "cost", &variables.cost);
    add_for_family(problem, ctx, "first_stage_cost", &variables.first_stage_cost);
}
