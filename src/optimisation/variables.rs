//! Decision variables of the transport model.
use super::objective::ObjectiveWeights;
use super::problem::{Problem, Variable};
use crate::index_sets::{
    BalancingKey, BalancingPathKey, ChargingKey, CostKey, EdgeYearKey, FlowKey, IndexSets,
    ModeFuelKey, ModeKey, NodeYearKey, PathFlowKey, PeriodKey, ScenarioIndexed,
};
use crate::model::Model;
use crate::scenario::ScenarioID;
use indexmap::IndexMap;
use std::ops::RangeInclusive;

/// A map for easy lookup of variables in the problem.
///
/// The entries are ordered (see [`IndexMap`]) in the order the variables were added.
#[derive(Debug, Clone)]
pub struct VariableMap<K>(IndexMap<K, Variable>);

impl<K> Default for VariableMap<K> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<K: ScenarioIndexed> VariableMap<K> {
    /// Add a continuous variable for every key
    fn add_all<'a, I>(
        problem: &mut Problem,
        name: &str,
        keys: I,
        cost: f64,
        bounds: &RangeInclusive<f64>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut map = Self::default();
        for key in keys {
            let var = problem.add_column(cost, bounds.clone(), column_label(name, key));
            map.insert(key.clone(), var);
        }

        map
    }

    /// Add a binary variable for every key, fixed to zero if `disabled`
    fn add_binary<'a, I>(problem: &mut Problem, name: &str, keys: I, disabled: bool) -> Self
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let upper = if disabled { 0.0 } else { 1.0 };
        let mut map = Self::default();
        for key in keys {
            let var = problem.add_integer_column(0.0, 0.0..=upper, column_label(name, key));
            map.insert(key.clone(), var);
        }

        map
    }

    fn insert(&mut self, key: K, var: Variable) {
        let existing = self.0.insert(key, var).is_some();
        assert!(!existing, "Duplicate entry for var");
    }

    /// Get the variable for a key, if there is one
    pub fn get(&self, key: &K) -> Option<Variable> {
        self.0.get(key).copied()
    }

    /// Iterate over keys and variables
    pub fn iter(&self) -> impl Iterator<Item = (&K, Variable)> {
        self.0.iter().map(|(key, var)| (key, *var))
    }

    /// The number of variables
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn column_label<K: ScenarioIndexed>(name: &str, key: &K) -> String {
    format!("{name}[{}]", key.label())
}

const NON_NEGATIVE: RangeInclusive<f64> = 0.0..=f64::INFINITY;
const FREE: RangeInclusive<f64> = f64::NEG_INFINITY..=f64::INFINITY;

/// Every decision variable of the transport model
#[derive(Debug, Clone)]
pub struct Variables {
    /// Product flows on arcs
    pub flow: VariableMap<FlowKey>,
    /// Empty vehicle flows on arcs
    pub balancing_flow: VariableMap<BalancingKey>,
    /// Product flows along paths
    pub path_flow: VariableMap<PathFlowKey>,
    /// Empty vehicle flows along paths
    pub balancing_path_flow: VariableMap<BalancingPathKey>,
    /// Total emissions of each period
    pub total_emissions: VariableMap<PeriodKey>,
    /// Emissions exceeding the cap
    pub emission_penalty: VariableMap<PeriodKey>,
    /// Binary edge capacity expansion decisions
    pub edge_expansion: VariableMap<EdgeYearKey>,
    /// Binary edge upgrade decisions
    pub upgrade: VariableMap<EdgeYearKey>,
    /// Fractional terminal expansion decisions
    pub node_expansion: VariableMap<NodeYearKey>,
    /// Charging capacity
    pub charging: VariableMap<ChargingKey>,
    /// Transport amount of each technology
    pub transport_amount: VariableMap<ModeFuelKey>,
    /// Decrease in transport amount since the previous decision year
    pub transport_decrease: VariableMap<ModeFuelKey>,
    /// Yearly transport amounts of diffusing technologies
    pub aux_transport_amount: VariableMap<ModeFuelKey>,
    /// Total transport amount of each mode
    pub mode_total: VariableMap<ModeKey>,
    /// Cost components
    pub cost: VariableMap<CostKey>,
    /// Discounted cost of each period
    pub stage_cost: VariableMap<PeriodKey>,
    /// First-stage cost of each scenario
    pub first_stage_cost: VariableMap<ScenarioID>,
    /// Second-stage cost of each scenario
    pub second_stage_cost: VariableMap<ScenarioID>,
    /// Value at risk
    pub cvar_aux: Option<Variable>,
    /// Second-stage cost in excess of the value at risk
    pub cvar_positive: VariableMap<ScenarioID>,
}

impl Variables {
    /// Add every variable of the model to the problem.
    ///
    /// Only the per-scenario stage costs and the CVaR variables carry objective coefficients.
    pub fn new(problem: &mut Problem, model: &Model, sets: &IndexSets) -> Self {
        let params = &model.parameters;
        let weights = ObjectiveWeights::new(params, sets.scenarios().len());
        let t0 = model.time_periods.first_year();

        let balancing_bounds = if params.balancing_trips {
            NON_NEGATIVE
        } else {
            0.0..=0.0
        };
        let penalty_periods: Vec<PeriodKey> = if params.emission_cap {
            sets.periods()
                .iter()
                .filter(|(year, _)| *year > t0)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let node_expansion_bounds = if params.no_investments {
            0.0..=0.0
        } else {
            0.0..=1.0
        };
        let scenario_ids: Vec<ScenarioID> = sets.iter_scenario_ids().cloned().collect();

        let flow = VariableMap::add_all(problem, "x", sets.flows(), 0.0, &NON_NEGATIVE);
        let balancing_flow =
            VariableMap::add_all(problem, "b", sets.balancing_flows(), 0.0, &balancing_bounds);
        let path_flow = VariableMap::add_all(problem, "h", sets.path_flows(), 0.0, &NON_NEGATIVE);
        let balancing_path_flow = VariableMap::add_all(
            problem,
            "h_bal",
            sets.balancing_path_flows(),
            0.0,
            &NON_NEGATIVE,
        );
        let total_emissions =
            VariableMap::add_all(problem, "emissions", sets.periods(), 0.0, &NON_NEGATIVE);
        let emission_penalty =
            VariableMap::add_all(problem, "penalty", &penalty_periods, 0.0, &NON_NEGATIVE);
        let edge_expansion = VariableMap::add_binary(
            problem,
            "epsilon",
            sets.edge_expansions(),
            params.no_investments,
        );
        let upgrade = VariableMap::add_binary(problem, "upsilon", sets.upgrades(), params.no_investments);
        let node_expansion = VariableMap::add_all(
            problem,
            "nu",
            sets.node_expansions(),
            0.0,
            &node_expansion_bounds,
        );
        let charging = VariableMap::add_all(problem, "y", sets.charging(), 0.0, &NON_NEGATIVE);
        let transport_amount =
            VariableMap::add_all(problem, "q", sets.transport_amounts(), 0.0, &NON_NEGATIVE);
        let transport_decrease =
            VariableMap::add_all(problem, "q_delta", sets.transport_decreases(), 0.0, &NON_NEGATIVE);
        let aux_transport_amount =
            VariableMap::add_all(problem, "q_aux", sets.aux_transport_amounts(), 0.0, &NON_NEGATIVE);
        let mode_total = VariableMap::add_all(problem, "q_mode", sets.mode_totals(), 0.0, &NON_NEGATIVE);
        let cost = VariableMap::add_all(problem, "cost", sets.costs(), 0.0, &NON_NEGATIVE);
        let stage_cost = VariableMap::add_all(problem, "stage_cost", sets.periods(), 0.0, &NON_NEGATIVE);
        let first_stage_cost = VariableMap::add_all(
            problem,
            "first_stage_cost",
            &scenario_ids,
            weights.first_stage,
            &FREE,
        );
        let second_stage_cost = VariableMap::add_all(
            problem,
            "second_stage_cost",
            &scenario_ids,
            weights.second_stage,
            &FREE,
        );
        let (cvar_aux, cvar_positive) = match weights.cvar_aux {
            Some(weight) => (
                Some(problem.add_column(weight, FREE, "cvar_aux".into())),
                VariableMap::add_all(
                    problem,
                    "cvar_positive",
                    &scenario_ids,
                    weights.cvar_positive,
                    &NON_NEGATIVE,
                ),
            ),
            None => (None, VariableMap::default()),
        };

        Self {
            flow,
            balancing_flow,
            path_flow,
            balancing_path_flow,
            total_emissions,
            emission_penalty,
            edge_expansion,
            upgrade,
            node_expansion,
            charging,
            transport_amount,
            transport_decrease,
            aux_transport_amount,
            mode_total,
            cost,
            stage_cost,
            first_stage_cost,
            second_stage_cost,
            cvar_aux,
            cvar_positive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::model;
    use crate::index_sets::ModelBuildContext;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_variables_match_index_sets(model: Model) {
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let sets = IndexSets::build(&model, &ctx);
        let mut problem = Problem::default();
        let variables = Variables::new(&mut problem, &model, &sets);

        assert_eq!(variables.flow.len(), sets.flows().len());
        assert_eq!(variables.path_flow.len(), sets.path_flows().len());
        assert_eq!(variables.edge_expansion.len(), sets.edge_expansions().len());
        assert_eq!(variables.first_stage_cost.len(), 3);
        assert!(variables.emission_penalty.is_empty());
        assert!(variables.cvar_aux.is_some());

        // Only stage costs and risk variables are in the objective
        let (key, var) = variables.flow.iter().next().unwrap();
        assert_approx_eq!(f64, problem.cost(var), 0.0);
        assert!(problem.column_label(var).starts_with("x["));
        assert_eq!(variables.flow.get(key), Some(var));
        let var = variables.first_stage_cost.iter().next().unwrap().1;
        assert_approx_eq!(f64, problem.cost(var), 1.0 / 3.0);
    }

    #[rstest]
    fn test_disabled_investments_and_balancing(mut model: Model) {
        model.parameters.no_investments = true;
        model.parameters.balancing_trips = false;
        model.parameters.emission_cap = true;
        let ctx = ModelBuildContext::all_scenarios(&model).unwrap();
        let sets = IndexSets::build(&model, &ctx);
        let mut problem = Problem::default();
        let variables = Variables::new(&mut problem, &model, &sets);

        for (_, var) in variables.edge_expansion.iter().chain(variables.upgrade.iter()) {
            assert_eq!(problem.bounds(var), (0.0, 0.0));
        }
        for (_, var) in variables.balancing_flow.iter() {
            assert_eq!(problem.bounds(var), (0.0, 0.0));
        }

        // No penalty in the first period
        assert_eq!(variables.emission_penalty.len(), 5 * 3);
        assert!(variables.emission_penalty.iter().all(|((year, _), _)| *year > 2022));
    }
}
