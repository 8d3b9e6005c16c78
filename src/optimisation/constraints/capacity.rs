//! Edge and terminal capacity, charging capacity and infrastructure upgrades.
use super::{ConstraintContext, TermsByKey};
use crate::index_sets::ScenarioIndexed;
use crate::infrastructure::is_commissioned;
use crate::optimisation::problem::{ConstraintFamily, Problem, Variable};
use crate::optimisation::variables::VariableMap;
use itertools::iproduct;
use std::fmt::Display;
use std::hash::Hash;

/// Decisions of an investment made early enough to be available in `year`
fn commissioned<K: ScenarioIndexed>(
    map: &VariableMap<K>,
    lead_time: u32,
    year: u32,
    matches: impl Fn(&K) -> bool,
) -> Vec<Variable> {
    map.iter()
        .filter(|(key, _)| {
            matches(key) && key.year().is_some_and(|decided| is_commissioned(decided, lead_time, year))
        })
        .map(|(_, var)| var)
        .collect()
}

/// Add a limit of one on the sum of each group of investment decisions
fn add_single_investment_limits<K, G>(
    problem: &mut Problem,
    family: ConstraintFamily,
    map: &VariableMap<K>,
    group: impl Fn(&K) -> G,
) where
    K: ScenarioIndexed,
    G: Hash + Eq + Display,
{
    let mut terms = TermsByKey::new();
    for (key, var) in map.iter() {
        terms.add(group(key), var, 1.0);
    }
    for (key, terms) in terms.into_rows() {
        problem.add_row(family, key.to_string(), ..=1.0, terms);
    }
}

/// Add capacity constraints for capacitated edges.
///
/// The loaded and empty flow on each arc of an edge may use at most half of the edge's capacity,
/// which includes any expansion decided in the first stage at least its lead time earlier. Each
/// edge can be expanded at most once over the horizon.
pub fn add_edge_capacity_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let relax = ctx.feas_relax();

    let mut flows = TermsByKey::new();
    for ((arc, _, _, year, scenario), var) in variables.flow.iter() {
        flows.add((*arc, *year, scenario.clone()), var, 1.0);
    }
    for ((arc, _, _, year, scenario), var) in variables.balancing_flow.iter() {
        flows.add((*arc, *year, scenario.clone()), var, 1.0);
    }

    for ((edge_idx, capacity), year, scenario) in iproduct!(
        &model.infrastructure.edge_capacities,
        ctx.sets.years(),
        ctx.sets.iter_scenario_ids()
    ) {
        let edge = model.network.edge(*edge_idx);
        let expansions = match capacity.expansion {
            Some(expansion) => commissioned(
                &variables.edge_expansion,
                expansion.lead_time,
                *year,
                |(e, _, s)| e == edge_idx && s == scenario,
            )
            .into_iter()
            .map(|var| (var, -0.5 * expansion.increase))
            .collect(),
            None => Vec::new(),
        };

        for arc in edge.arcs {
            let mut terms = flows.take(&(arc, *year, scenario.clone()));
            terms.extend(expansions.iter().copied());
            problem.add_row(
                ConstraintFamily::Capacity,
                format!("{},{year},{scenario}", model.network.arc(arc)),
                ..=(0.5 * capacity.base + relax),
                terms,
            );
        }
    }

    if ctx.sets.years().len() > 1 {
        add_single_investment_limits(
            problem,
            ConstraintFamily::ExpansionLimit,
            &variables.edge_expansion,
            |(edge, _, scenario)| format!("{edge},{scenario}"),
        );
    }
}

/// Add terminal capacity constraints.
///
/// The flow along paths starting, ending or changing mode at a node may not exceed the
/// terminal's capacity for that mode, including expansions available by then. Each terminal can
/// be expanded at most once.
pub fn add_terminal_capacity_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let paths = &model.paths;
    let relax = ctx.feas_relax();

    for (((node, mode), capacity), year, scenario) in iproduct!(
        &model.infrastructure.node_capacities,
        ctx.sets.years(),
        ctx.sets.iter_scenario_ids()
    ) {
        if !model.network.node_has_mode(node, mode) {
            continue;
        }

        let path_ids = paths
            .origin_paths(node, mode)
            .iter()
            .chain(paths.destination_paths(node, mode))
            .chain(paths.transfer_paths(node, mode));
        let mut terms: Vec<_> = iproduct!(path_ids, model.products.keys())
            .filter_map(|(path, product)| {
                variables
                    .path_flow
                    .get(&(*path, product.clone(), *year, scenario.clone()))
            })
            .map(|var| (var, 1.0))
            .collect();

        if let Some(expansion) = capacity.expansion {
            let expansions = commissioned(
                &variables.node_expansion,
                expansion.lead_time,
                *year,
                |(n, m, _, s)| n == node && m == mode && s == scenario,
            );
            terms.extend(expansions.into_iter().map(|var| (var, -expansion.increase)));
        }

        problem.add_row(
            ConstraintFamily::TerminalCapacity,
            format!("{node},{mode},{year},{scenario}"),
            ..=(capacity.base + relax),
            terms,
        );
    }

    if ctx.sets.years().len() > 1 {
        add_single_investment_limits(
            problem,
            ConstraintFamily::TerminalExpansionLimit,
            &variables.node_expansion,
            |(node, mode, _, scenario)| format!("{node},{mode},{scenario}"),
        );
    }
}

/// Add charging capacity constraints.
///
/// Flows of a fuel needing charging or filling infrastructure on an edge may not exceed the
/// charging capacity built there. No edge has any charging capacity to begin with.
pub fn add_charging_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;

    let mut flows = TermsByKey::new();
    for ((arc, fuel, _, year, scenario), var) in variables.flow.iter() {
        let edge = model.network.arc(*arc).edge;
        flows.add((edge, fuel.clone(), *year, scenario.clone()), var, 1.0);
    }
    for ((arc, fuel, _, year, scenario), var) in variables.balancing_flow.iter() {
        let edge = model.network.arc(*arc).edge;
        flows.add((edge, fuel.clone(), *year, scenario.clone()), var, 1.0);
    }

    for (key, capacity) in variables.charging.iter() {
        let mut terms = flows.take(key);
        terms.push((capacity, -1.0));
        problem.add_row(
            ConstraintFamily::Charging,
            key.label(),
            ..=ctx.feas_relax(),
            terms,
        );
    }
}

/// Add infrastructure upgrade constraints.
///
/// The fuel enabled by an upgrade can only be used on the edge once an upgrade decided in the
/// first stage has been commissioned. Each edge can be upgraded at most once.
pub fn add_upgrade_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let max_total_demand = model.demand.max_total();

    let mut flows = TermsByKey::new();
    for ((arc, fuel, _, year, scenario), var) in variables.flow.iter() {
        let edge = model.network.arc(*arc).edge;
        flows.add((edge, fuel.clone(), *year, scenario.clone()), var, 1.0);
    }

    for ((edge, upgrade), year, scenario) in iproduct!(
        &model.infrastructure.edge_upgrades,
        ctx.sets.years(),
        ctx.sets.iter_scenario_ids()
    ) {
        let big_m = model.infrastructure.upgrade_big_m(*edge, max_total_demand);
        let mut terms = flows.take(&(*edge, upgrade.fuel.clone(), *year, scenario.clone()));
        let upgrades = commissioned(&variables.upgrade, upgrade.lead_time, *year, |(e, _, s)| {
            e == edge && s == scenario
        });
        terms.extend(upgrades.into_iter().map(|var| (var, -big_m)));

        problem.add_row(
            ConstraintFamily::Upgrade,
            format!("{},{},{year},{scenario}", model.network.edge(*edge), upgrade.fuel),
            ..=ctx.feas_relax(),
            terms,
        );
    }

    if ctx.sets.years().len() > 1 {
        add_single_investment_limits(
            problem,
            ConstraintFamily::UpgradeLimit,
            &variables.upgrade,
            |(edge, _, scenario)| format!("{edge},{scenario}"),
        );
    }
}
