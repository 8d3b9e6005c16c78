//! Cost components, discounted stage costs and the risk measure.
use super::{ConstraintContext, TermsByKey};
use crate::cost::CostComponent;
use crate::finance::{discount_factor, investment_discount, operating_discount};
use crate::index_sets::{CostKey, ScenarioIndexed};
use crate::infrastructure::InfrastructureKind;
use crate::optimisation::problem::{ConstraintFamily, Problem, Variable};
use crate::scenario::ScenarioID;
use anyhow::Result;

/// Add constraints defining every cost component of each decision year.
///
/// Each component variable is at least the cost of the decisions it covers, less the feasibility
/// slack. Empty trips are costed at `empty_vehicle_factor` times the cheapest product their
/// vehicle type carries.
pub fn add_cost_component_constraints(problem: &mut Problem, ctx: &ConstraintContext) -> Result<()> {
    let model = ctx.model;
    let variables = ctx.variables;
    let costs = &model.costs;
    let evf = model.parameters.empty_vehicle_factor.value();

    let mut terms: TermsByKey<CostKey> = TermsByKey::new();
    let mut add = |component, year: u32, scenario: &ScenarioID, var, coeff| {
        terms.add((component, year, scenario.clone()), var, coeff);
    };

    for ((arc_idx, fuel, product, year, scenario), var) in variables.flow.iter() {
        let mode = &model.network.arc(*arc_idx).mode;
        let transport = costs.transport_cost(*arc_idx, mode, fuel, product, *year, scenario);
        add(CostComponent::TransportOpex, *year, scenario, var, transport);
        let co2 = costs.co2_cost(*arc_idx, fuel, product, *year);
        add(CostComponent::TransportCo2, *year, scenario, var, co2);
        let time = costs.time_value(*arc_idx, product);
        add(CostComponent::TimeValue, *year, scenario, var, time);
    }

    for ((arc_idx, fuel, vehicle, year, scenario), var) in variables.balancing_flow.iter() {
        let mode = &model.network.arc(*arc_idx).mode;
        let product = ctx.cheapest_product(mode, fuel, vehicle, *year)?;
        let transport = costs.transport_cost(*arc_idx, mode, fuel, product, *year, scenario);
        add(CostComponent::BalancingOpex, *year, scenario, var, evf * transport);
        let co2 = costs.co2_cost(*arc_idx, fuel, product, *year);
        add(CostComponent::BalancingCo2, *year, scenario, var, evf * co2);
    }

    for ((path, product, year, scenario), var) in variables.path_flow.iter() {
        if costs.has_transfer_cost(*path, product) {
            let transfer = costs.transfer_cost(*path, product);
            add(CostComponent::Transfer, *year, scenario, var, transfer);
        }
    }

    for ((year, scenario), var) in variables.emission_penalty.iter() {
        add(CostComponent::Co2Penalty, *year, scenario, var, costs.co2_penalty());
    }

    for ((edge, fuel, year, scenario), var) in variables.charging.iter() {
        let mode = &model.network.edge(*edge).mode;
        let component = match model.infrastructure.charging_kind(mode, fuel) {
            Some(InfrastructureKind::Filling) => CostComponent::Filling,
            _ => CostComponent::Charging,
        };
        add(component, *year, scenario, var, costs.charging_cost(*edge, fuel, *year));
    }

    for ((edge, year, scenario), var) in variables.edge_expansion.iter() {
        if let Some(expansion) = model
            .infrastructure
            .edge_capacity(*edge)
            .and_then(|capacity| capacity.expansion)
        {
            add(CostComponent::EdgeInvestment, *year, scenario, var, expansion.cost);
        }
    }

    for ((node, mode, year, scenario), var) in variables.node_expansion.iter() {
        if let Some(expansion) = model
            .infrastructure
            .node_capacity(node, mode)
            .and_then(|capacity| capacity.expansion)
        {
            add(CostComponent::NodeInvestment, *year, scenario, var, expansion.cost);
        }
    }

    for ((edge, year, scenario), var) in variables.upgrade.iter() {
        if let Some(upgrade) = model.infrastructure.edge_upgrades.get(edge) {
            add(CostComponent::Upgrade, *year, scenario, var, upgrade.cost);
        }
    }

    for (key, cost) in variables.cost.iter() {
        let terms = terms
            .take(key)
            .into_iter()
            .map(|(var, coeff)| (var, -coeff))
            .chain([(cost, 1.0)]);
        problem.add_row(
            ConstraintFamily::CostComponent,
            key.label(),
            -ctx.feas_relax()..,
            terms,
        );
    }

    Ok(())
}

/// Add constraints defining the discounted cost of each decision year, the first- and
/// second-stage costs of each scenario and, for a risk-averse objective, the excess of each
/// scenario's second-stage cost over the value at risk.
///
/// Operating costs recur in every year the decision year stands in for, while investments are
/// paid once at its start.
pub fn add_stage_cost_constraints(problem: &mut Problem, ctx: &ConstraintContext) {
    let model = ctx.model;
    let variables = ctx.variables;
    let time_periods = &model.time_periods;
    let relax = ctx.feas_relax();
    let factor = discount_factor(model.parameters.risk_free_rate);

    let mut components: TermsByKey<(u32, ScenarioID)> = TermsByKey::new();
    for ((component, year, scenario), var) in variables.cost.iter() {
        let covered = time_periods.covered_years(*year);
        let discount = if component.is_investment() {
            investment_discount(factor, &covered)
        } else {
            operating_discount(factor, &covered)
        };
        components.add((*year, scenario.clone()), var, -discount);
    }

    let mut first_stage = TermsByKey::new();
    let mut second_stage = TermsByKey::new();
    for (key, stage_cost) in variables.stage_cost.iter() {
        let mut terms = components.take(key);
        terms.push((stage_cost, 1.0));
        problem.add_row(ConstraintFamily::StageCost, key.label(), -relax.., terms);

        let (year, scenario) = key;
        let totals = if time_periods.is_first_stage(*year) {
            &mut first_stage
        } else {
            &mut second_stage
        };
        totals.add(scenario.clone(), stage_cost, -1.0);
    }

    for (scenario, cost) in variables.first_stage_cost.iter() {
        let mut terms = first_stage.take(scenario);
        terms.push((cost, 1.0));
        problem.add_row(
            ConstraintFamily::FirstStageCost,
            scenario.label(),
            -relax..,
            terms,
        );
    }

    for (scenario, cost) in variables.second_stage_cost.iter() {
        let mut terms = second_stage.take(scenario);
        terms.push((cost, 1.0));
        problem.add_row(
            ConstraintFamily::SecondStageCost,
            scenario.label(),
            -relax..,
            terms,
        );
    }

    let Some(cvar_aux) = variables.cvar_aux else {
        return;
    };
    for (scenario, positive) in variables.cvar_positive.iter() {
        let Some(second) = variables.second_stage_cost.get(scenario) else {
            continue;
        };
        let terms: [(Variable, f64); 3] = [(positive, 1.0), (second, -1.0), (cvar_aux, 1.0)];
        problem.add_row(
            ConstraintFamily::CvarPositive,
            scenario.label(),
            -relax..,
            terms,
        );
    }
}
