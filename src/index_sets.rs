//! Compound index sets over which the optimisation's variables and constraints are defined.
//!
//! Every set is derived from the model data and a [`ModelBuildContext`] naming the active
//! scenarios and decision years. [`IndexSets::build`] is the only way of obtaining the sets, so
//! they are always rebuilt together: narrowing the scenarios or years means building a new
//! [`IndexSets`] from a new context.
use crate::cost::CostComponent;
use crate::infrastructure::is_investment_year;
use crate::mode::{FuelID, ModeID, iter_mode_fuels};
use crate::model::Model;
use crate::network::{ArcIndex, EdgeIndex, NodeID};
use crate::path::PathID;
use crate::product::{ProductID, VehicleTypeID, iter_vehicle_types_for_mode};
use crate::scenario::{Scenario, ScenarioID};
use crate::technology::Readiness;
use anyhow::{Context, Result, ensure};
use itertools::{Itertools, iproduct};
use std::hash::Hash;
use strum::IntoEnumIterator;

/// Terminal expansions smaller than this are ignored
const MIN_NODE_CAPACITY_INCREASE: f64 = 0.01;

/// Flow of a product on an arc with a fuel: (arc, fuel, product, year, scenario)
pub type FlowKey = (ArcIndex, FuelID, ProductID, u32, ScenarioID);
/// Empty vehicle flow on an arc: (arc, fuel, vehicle type, year, scenario)
pub type BalancingKey = (ArcIndex, FuelID, VehicleTypeID, u32, ScenarioID);
/// Flow of a product along a path: (path, product, year, scenario)
pub type PathFlowKey = (PathID, ProductID, u32, ScenarioID);
/// Empty vehicle flow along a path: (path, vehicle type, year, scenario)
pub type BalancingPathKey = (PathID, VehicleTypeID, u32, ScenarioID);
/// Demand to be met: (origin, destination, product, year, scenario)
pub type DemandKey = (NodeID, NodeID, ProductID, u32, ScenarioID);
/// Vehicle conservation at a node: (node, mode, fuel, vehicle type, year, scenario)
pub type FleetBalanceKey = (NodeID, ModeID, FuelID, VehicleTypeID, u32, ScenarioID);
/// A decision year in a scenario: (year, scenario)
pub type PeriodKey = (u32, ScenarioID);
/// An edge investment decision: (edge, year, scenario)
pub type EdgeYearKey = (EdgeIndex, u32, ScenarioID);
/// A terminal investment decision: (node, mode, year, scenario)
pub type NodeYearKey = (NodeID, ModeID, u32, ScenarioID);
/// Charging capacity on an edge: (edge, fuel, year, scenario)
pub type ChargingKey = (EdgeIndex, FuelID, u32, ScenarioID);
/// Transport amount of a mode-fuel technology: (mode, fuel, year, scenario)
pub type ModeFuelKey = (ModeID, FuelID, u32, ScenarioID);
/// Total transport amount of a mode: (mode, year, scenario)
pub type ModeKey = (ModeID, u32, ScenarioID);
/// A cost component of a decision year: (component, year, scenario)
pub type CostKey = (CostComponent, u32, ScenarioID);

/// A key with a scenario component
pub trait ScenarioIndexed: Clone + Eq + Hash {
    /// The scenario
    fn scenario(&self) -> &ScenarioID;

    /// The year, if the key has one
    fn year(&self) -> Option<u32>;

    /// The same key in another scenario
    fn with_scenario(&self, scenario: &ScenarioID) -> Self;

    /// A human-readable rendering of the key, for diagnostics
    fn label(&self) -> String;
}

macro_rules! impl_scenario_indexed {
    ($ty:ty, $year:tt, $scenario:tt, [$($field:tt),+]) => {
        impl ScenarioIndexed for $ty {
            fn scenario(&self) -> &ScenarioID {
                &self.$scenario
            }

            fn year(&self) -> Option<u32> {
                Some(self.$year)
            }

            fn with_scenario(&self, scenario: &ScenarioID) -> Self {
                let mut key = self.clone();
                key.$scenario = scenario.clone();
                key
            }

            fn label(&self) -> String {
                [$(self.$field.to_string()),+].join(",")
            }
        }
    };
}

impl_scenario_indexed!(FlowKey, 3, 4, [0, 1, 2, 3, 4]);
impl_scenario_indexed!(BalancingKey, 3, 4, [0, 1, 2, 3, 4]);
impl_scenario_indexed!(PathFlowKey, 2, 3, [0, 1, 2, 3]);
impl_scenario_indexed!(BalancingPathKey, 2, 3, [0, 1, 2, 3]);
impl_scenario_indexed!(DemandKey, 3, 4, [0, 1, 2, 3, 4]);
impl_scenario_indexed!(FleetBalanceKey, 4, 5, [0, 1, 2, 3, 4, 5]);
impl_scenario_indexed!(PeriodKey, 0, 1, [0, 1]);
impl_scenario_indexed!(EdgeYearKey, 1, 2, [0, 1, 2]);
impl_scenario_indexed!(NodeYearKey, 2, 3, [0, 1, 2, 3]);
impl_scenario_indexed!(ChargingKey, 2, 3, [0, 1, 2, 3]);
impl_scenario_indexed!(ModeFuelKey, 2, 3, [0, 1, 2, 3]);
impl_scenario_indexed!(ModeKey, 1, 2, [0, 1, 2]);
impl_scenario_indexed!(CostKey, 1, 2, [0, 1, 2]);

/// Per-scenario totals (e.g. first-stage cost) have no year
impl ScenarioIndexed for ScenarioID {
    fn scenario(&self) -> &ScenarioID {
        self
    }

    fn year(&self) -> Option<u32> {
        None
    }

    fn with_scenario(&self, scenario: &ScenarioID) -> Self {
        scenario.clone()
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

/// The scenarios and decision years a model instance is built for
#[derive(PartialEq, Debug, Clone)]
pub struct ModelBuildContext {
    scenarios: Vec<Scenario>,
    years: Vec<u32>,
    single_time_period: bool,
}

impl ModelBuildContext {
    /// All scenarios over the model's horizon.
    ///
    /// If the model parameters name a single time period, only that year is included and the
    /// constraints linking consecutive years are left out.
    pub fn all_scenarios(model: &Model) -> Result<Self> {
        Self::new(model, model.scenarios.iter().cloned().collect())
    }

    /// The synthesised expected-value scenario alone
    pub fn expected_value(model: &Model) -> Result<Self> {
        Self::new(model, vec![model.scenarios.expected_value.clone()])
    }

    /// A subset of the scenarios, in the order given
    pub fn with_scenarios(model: &Model, ids: &[ScenarioID]) -> Result<Self> {
        let scenarios = ids
            .iter()
            .map(|id| {
                model
                    .scenarios
                    .get(id)
                    .cloned()
                    .with_context(|| format!("Unknown scenario {id}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(model, scenarios)
    }

    /// The expected-value scenario in the first decision year only.
    ///
    /// Used for the base-year model whose solution bounds the first period of the main model.
    pub fn first_period(model: &Model) -> Self {
        Self {
            scenarios: vec![model.scenarios.expected_value.clone()],
            years: vec![model.time_periods.first_year()],
            single_time_period: false,
        }
    }

    fn new(model: &Model, scenarios: Vec<Scenario>) -> Result<Self> {
        ensure!(!scenarios.is_empty(), "At least one scenario must be active");
        let (years, single_time_period) = match model.parameters.single_time_period {
            Some(year) => {
                ensure!(
                    model.time_periods.contains(year),
                    "Single time period {year} is not a decision year"
                );
                (vec![year], true)
            }
            None => (model.time_periods.iter_years().collect(), false),
        };

        Ok(Self {
            scenarios,
            years,
            single_time_period,
        })
    }

    /// The active scenarios
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// The active decision years
    pub fn years(&self) -> &[u32] {
        &self.years
    }

    /// Whether only a single year is modelled, without links to other years
    pub fn is_single_time_period(&self) -> bool {
        self.single_time_period
    }
}

/// Every compound index set of one model instance
#[derive(Debug, Clone)]
pub struct IndexSets {
    scenarios: Vec<Scenario>,
    years: Vec<u32>,
    single_time_period: bool,
    flows: Vec<FlowKey>,
    balancing_flows: Vec<BalancingKey>,
    path_flows: Vec<PathFlowKey>,
    balancing_path_flows: Vec<BalancingPathKey>,
    demand: Vec<DemandKey>,
    fleet_balance: Vec<FleetBalanceKey>,
    periods: Vec<PeriodKey>,
    edge_expansions: Vec<EdgeYearKey>,
    upgrades: Vec<EdgeYearKey>,
    node_expansions: Vec<NodeYearKey>,
    charging: Vec<ChargingKey>,
    transport_amounts: Vec<ModeFuelKey>,
    transport_decreases: Vec<ModeFuelKey>,
    aux_transport_amounts: Vec<ModeFuelKey>,
    mode_totals: Vec<ModeKey>,
    costs: Vec<CostKey>,
    scenario_pairs: Vec<(ScenarioID, ScenarioID)>,
}

impl IndexSets {
    /// Build every index set for the given context
    pub fn build(model: &Model, ctx: &ModelBuildContext) -> IndexSets {
        let scenario_ids: Vec<ScenarioID> = ctx.scenarios.iter().map(|s| s.id.clone()).collect();
        let years = ctx.years.clone();
        let params = &model.parameters;
        let time_periods = &model.time_periods;
        let network = &model.network;

        let flows = iproduct!(network.iter_arcs(), model.products.keys(), &years, &scenario_ids)
            .flat_map(|((idx, arc), product, year, scenario)| {
                model.modes[&arc.mode]
                    .iter_fuel_ids()
                    .map(move |fuel| (idx, fuel.clone(), product.clone(), *year, scenario.clone()))
            })
            .collect();

        let balancing_flows = iproduct!(network.iter_arcs(), &years, &scenario_ids)
            .flat_map(|((idx, arc), year, scenario)| {
                let vehicles = iter_vehicle_types_for_mode(&model.vehicle_types, &arc.mode).collect_vec();
                iproduct!(model.modes[&arc.mode].iter_fuel_ids(), vehicles)
                    .map(move |(fuel, vehicle)| {
                        (idx, fuel.clone(), vehicle.id.clone(), *year, scenario.clone())
                    })
            })
            .collect();

        // Demand below the tolerance is treated as zero
        let demand_entries: Vec<_> = model
            .demand
            .iter()
            .filter(|((_, _, _, year), amount)| {
                years.contains(year) && *amount >= params.absolute_deviation
            })
            .map(|(key, _)| key.clone())
            .collect();
        let demand = iproduct!(&demand_entries, &scenario_ids)
            .map(|((origin, destination, product, year), scenario)| {
                (
                    origin.clone(),
                    destination.clone(),
                    product.clone(),
                    *year,
                    scenario.clone(),
                )
            })
            .collect();
        let path_flows = iproduct!(&demand_entries, &scenario_ids)
            .flat_map(|((origin, destination, product, year), scenario)| {
                model
                    .paths
                    .od_paths(origin, destination)
                    .iter()
                    .map(move |path| (*path, product.clone(), *year, scenario.clone()))
            })
            .collect();

        let (balancing_path_flows, fleet_balance) = if params.balancing_trips {
            (
                balancing_path_keys(model, &years, &scenario_ids),
                fleet_balance_keys(model, &years, &scenario_ids),
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let periods = iproduct!(&years, &scenario_ids)
            .map(|(year, scenario)| (*year, scenario.clone()))
            .collect();

        // Edge investments and upgrades are first-stage decisions; terminals may expand at any time
        let edge_expansions = iproduct!(&model.infrastructure.edge_capacities, &years, &scenario_ids)
            .filter_map(|((edge, capacity), year, scenario)| {
                let expansion = capacity.expansion?;
                is_investment_year(time_periods, expansion.lead_time, *year, true)
                    .then(|| (*edge, *year, scenario.clone()))
            })
            .collect();
        let upgrades = iproduct!(&model.infrastructure.edge_upgrades, &years, &scenario_ids)
            .filter(|((_, upgrade), year, _)| {
                is_investment_year(time_periods, upgrade.lead_time, **year, true)
            })
            .map(|((edge, _), year, scenario)| (*edge, *year, scenario.clone()))
            .collect();
        let node_expansions = iproduct!(&model.infrastructure.node_capacities, &years, &scenario_ids)
            .filter_map(|(((node, mode), capacity), year, scenario)| {
                let expansion = capacity.expansion?;
                (expansion.increase > MIN_NODE_CAPACITY_INCREASE
                    && is_investment_year(time_periods, expansion.lead_time, *year, false))
                .then(|| (node.clone(), mode.clone(), *year, scenario.clone()))
            })
            .collect();
        let charging = iproduct!(model.infrastructure.charging_edges(), &years, &scenario_ids)
            .map(|((edge, fuel), year, scenario)| (*edge, fuel.clone(), *year, scenario.clone()))
            .collect();

        let mode_fuels: Vec<_> = iter_mode_fuels(&model.modes)
            .map(|(mode, fuel)| (mode.id.clone(), fuel.id.clone()))
            .collect();
        let transport_amounts = mode_fuel_keys(&mode_fuels, years.iter().copied(), &scenario_ids);
        let (transport_decreases, aux_transport_amounts, mode_totals) = if ctx.single_time_period {
            (Vec::new(), Vec::new(), Vec::new())
        } else {
            let diffusing: Vec<_> = mode_fuels
                .iter()
                .filter(|(mode, fuel)| {
                    matches!(
                        model.technology.readiness(mode, fuel),
                        Readiness::Diffusing { .. }
                    )
                })
                .cloned()
                .collect();
            let first = years.first().copied().unwrap_or_default();
            let last = years.last().copied().unwrap_or_default();
            (
                mode_fuel_keys(&mode_fuels, years.iter().skip(1).copied(), &scenario_ids),
                mode_fuel_keys(&diffusing, first..=last, &scenario_ids),
                iproduct!(model.modes.keys(), &years, &scenario_ids)
                    .map(|(mode, year, scenario)| (mode.clone(), *year, scenario.clone()))
                    .collect(),
            )
        };

        let costs = iproduct!(CostComponent::iter(), &years, &scenario_ids)
            .map(|(component, year, scenario)| (component, *year, scenario.clone()))
            .collect();

        let scenario_pairs = scenario_ids
            .iter()
            .enumerate()
            .flat_map(|(i, first)| {
                scenario_ids[i + 1..]
                    .iter()
                    .map(move |second| (first.clone(), second.clone()))
            })
            .collect();

        IndexSets {
            scenarios: ctx.scenarios.clone(),
            years,
            single_time_period: ctx.single_time_period,
            flows,
            balancing_flows,
            path_flows,
            balancing_path_flows,
            demand,
            fleet_balance,
            periods,
            edge_expansions,
            upgrades,
            node_expansions,
            charging,
            transport_amounts,
            transport_decreases,
            aux_transport_amounts,
            mode_totals,
            costs,
            scenario_pairs,
        }
    }

    /// The active scenarios
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Iterate over the active scenarios' IDs
    pub fn iter_scenario_ids(&self) -> impl Iterator<Item = &ScenarioID> {
        self.scenarios.iter().map(|s| &s.id)
    }

    /// The active decision years
    pub fn years(&self) -> &[u32] {
        &self.years
    }

    /// The active decision year before `year`, if any
    pub fn previous_year(&self, year: u32) -> Option<u32> {
        let idx = self.years.iter().position(|&y| y == year)?;
        idx.checked_sub(1).map(|i| self.years[i])
    }

    /// Whether only a single year is modelled, without links to other years
    pub fn is_single_time_period(&self) -> bool {
        self.single_time_period
    }

    /// Arc flows of products
    pub fn flows(&self) -> &[FlowKey] {
        &self.flows
    }

    /// Arc flows of empty vehicles
    pub fn balancing_flows(&self) -> &[BalancingKey] {
        &self.balancing_flows
    }

    /// Path flows of products, for every path serving a demand
    pub fn path_flows(&self) -> &[PathFlowKey] {
        &self.path_flows
    }

    /// Path flows of empty vehicles, along unimodal paths
    pub fn balancing_path_flows(&self) -> &[BalancingPathKey] {
        &self.balancing_path_flows
    }

    /// Demands which must be met
    pub fn demand(&self) -> &[DemandKey] {
        &self.demand
    }

    /// Nodes at which vehicles are conserved
    pub fn fleet_balance(&self) -> &[FleetBalanceKey] {
        &self.fleet_balance
    }

    /// Decision years in each scenario
    pub fn periods(&self) -> &[PeriodKey] {
        &self.periods
    }

    /// Possible edge capacity expansions
    pub fn edge_expansions(&self) -> &[EdgeYearKey] {
        &self.edge_expansions
    }

    /// Possible edge upgrades
    pub fn upgrades(&self) -> &[EdgeYearKey] {
        &self.upgrades
    }

    /// Possible terminal expansions
    pub fn node_expansions(&self) -> &[NodeYearKey] {
        &self.node_expansions
    }

    /// Charging capacity on edges
    pub fn charging(&self) -> &[ChargingKey] {
        &self.charging
    }

    /// Transport amounts of every mode-fuel technology
    pub fn transport_amounts(&self) -> &[ModeFuelKey] {
        &self.transport_amounts
    }

    /// Decreases in transport amounts since the previous decision year
    pub fn transport_decreases(&self) -> &[ModeFuelKey] {
        &self.transport_decreases
    }

    /// Yearly transport amounts of diffusing technologies
    pub fn aux_transport_amounts(&self) -> &[ModeFuelKey] {
        &self.aux_transport_amounts
    }

    /// Total transport amounts of each mode
    pub fn mode_totals(&self) -> &[ModeKey] {
        &self.mode_totals
    }

    /// Cost components of each decision year
    pub fn costs(&self) -> &[CostKey] {
        &self.costs
    }

    /// Every unordered pair of distinct active scenarios
    pub fn scenario_pairs(&self) -> &[(ScenarioID, ScenarioID)] {
        &self.scenario_pairs
    }
}

fn mode_fuel_keys<I>(mode_fuels: &[(ModeID, FuelID)], years: I, scenarios: &[ScenarioID]) -> Vec<ModeFuelKey>
where
    I: Iterator<Item = u32> + Clone,
{
    iproduct!(mode_fuels, years, scenarios)
        .map(|((mode, fuel), year, scenario)| (mode.clone(), fuel.clone(), year, scenario.clone()))
        .collect()
}

fn balancing_path_keys(model: &Model, years: &[u32], scenarios: &[ScenarioID]) -> Vec<BalancingPathKey> {
    let unimodal = model.paths.iter().filter(|path| !path.is_multimodal());
    iproduct!(unimodal, years, scenarios)
        .flat_map(|(path, year, scenario)| {
            iter_vehicle_types_for_mode(&model.vehicle_types, path.first_mode())
                .map(move |vehicle| (path.id, vehicle.id.clone(), *year, scenario.clone()))
        })
        .collect()
}

fn fleet_balance_keys(model: &Model, years: &[u32], scenarios: &[ScenarioID]) -> Vec<FleetBalanceKey> {
    let network = &model.network;
    let mut keys = Vec::new();
    for mode in model.modes.values() {
        let nodes = network.mode_nodes(&mode.id).filter(|node| {
            !network.arcs_in(node, &mode.id).is_empty() || !network.arcs_out(node, &mode.id).is_empty()
        });
        let fuels = mode.iter_fuel_ids().cloned().collect_vec();
        let vehicles = iter_vehicle_types_for_mode(&model.vehicle_types, &mode.id).collect_vec();
        for (node, fuel, vehicle, year, scenario) in iproduct!(nodes, &fuels, &vehicles, years, scenarios) {
            keys.push((
                node.clone(),
                mode.id.clone(),
                fuel.clone(),
                vehicle.id.clone(),
                *year,
                scenario.clone(),
            ));
        }
    }

    keys
}
