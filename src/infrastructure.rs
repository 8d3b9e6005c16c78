//! Infrastructure: edge and terminal capacities, the investments that expand them, edge upgrades
//! enabling new fuels, and charging or filling stations along edges.
use crate::mode::{FuelID, ModeID};
use crate::network::{EdgeIndex, Network, NodeID};
use crate::time_period::TimePeriods;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use serde_string_enum::DeserializeLabeledStringEnum;

/// Factor applied to capacity (or demand) to obtain the big-M linking upgrades and flows
const UPGRADE_BIG_M_FACTOR: f64 = 1.5;

/// A possible capacity expansion
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Expansion {
    /// Capacity added by the expansion (scaled weight)
    pub increase: f64,
    /// One-off cost (scaled money)
    pub cost: f64,
    /// Years between the decision and the capacity becoming available
    pub lead_time: u32,
}

/// Capacity of an edge or terminal, with an optional expansion
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Capacity {
    /// Existing capacity (scaled weight)
    pub base: f64,
    /// The expansion available, if any
    pub expansion: Option<Expansion>,
}

/// An upgrade of an edge which allows a fuel to be used on it (e.g. electrification)
#[derive(PartialEq, Debug, Clone)]
pub struct Upgrade {
    /// The fuel the upgrade enables
    pub fuel: FuelID,
    /// One-off cost (scaled money)
    pub cost: f64,
    /// Years between the decision and the upgrade becoming available
    pub lead_time: u32,
}

/// Type of energy infrastructure needed along an edge
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, DeserializeLabeledStringEnum)]
pub enum InfrastructureKind {
    /// Charging stations
    #[string = "charging"]
    Charging,
    /// Filling stations
    #[string = "filling"]
    Filling,
}

/// Station parameters for a charging technology in one year
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct StationParameters {
    /// Maximum distance between stations (km)
    pub max_station_dist: f64,
    /// Cost of a station (NOK)
    pub station_cost: f64,
    /// Vehicles one station serves per day
    pub vehicles_filled_daily: f64,
}

/// A mode-fuel technology which needs charging or filling stations
#[derive(PartialEq, Debug, Clone)]
pub struct ChargingTechnology {
    /// Whether stations are charging or filling stations
    pub kind: InfrastructureKind,
    /// Station parameters by year
    pub stations: IndexMap<u32, StationParameters>,
}

/// All infrastructure data
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Infrastructure {
    /// Capacity of capacitated edges
    pub edge_capacities: IndexMap<EdgeIndex, Capacity>,
    /// Possible upgrades of edges
    pub edge_upgrades: IndexMap<EdgeIndex, Upgrade>,
    /// Capacity of capacitated terminals, keyed by node and mode
    pub node_capacities: IndexMap<(NodeID, ModeID), Capacity>,
    /// Technologies needing charging or filling stations
    pub charging: IndexMap<(ModeID, FuelID), ChargingTechnology>,
    charging_edges: Vec<(EdgeIndex, FuelID)>,
}

impl Infrastructure {
    /// Create the infrastructure data and derive which edges need charging capacity.
    ///
    /// Charging capacity is modelled on every edge not lying entirely abroad, for each charging
    /// technology of the edge's mode. Station parameters must be given for every decision year.
    pub fn new(
        edge_capacities: IndexMap<EdgeIndex, Capacity>,
        edge_upgrades: IndexMap<EdgeIndex, Upgrade>,
        node_capacities: IndexMap<(NodeID, ModeID), Capacity>,
        charging: IndexMap<(ModeID, FuelID), ChargingTechnology>,
        network: &Network,
        time_periods: &TimePeriods,
    ) -> Result<Self> {
        for ((mode, fuel), technology) in &charging {
            for year in time_periods.iter_years() {
                ensure!(
                    technology.stations.contains_key(&year),
                    "Missing charging data for {mode}/{fuel} in {year}"
                );
            }
        }

        let charging_edges = network
            .iter_edges()
            .filter(|(idx, _)| !network.edge_is_abroad(*idx))
            .flat_map(|(idx, edge)| {
                charging
                    .keys()
                    .filter(|(mode, _)| *mode == edge.mode)
                    .map(move |(_, fuel)| (idx, fuel.clone()))
            })
            .collect();

        Ok(Self {
            edge_capacities,
            edge_upgrades,
            node_capacities,
            charging,
            charging_edges,
        })
    }

    /// The (edge, fuel) pairs with charging capacity
    pub fn charging_edges(&self) -> &[(EdgeIndex, FuelID)] {
        &self.charging_edges
    }

    /// The capacity of an edge, if it is capacitated
    pub fn edge_capacity(&self, edge: EdgeIndex) -> Option<&Capacity> {
        self.edge_capacities.get(&edge)
    }

    /// The capacity of a terminal, if it is capacitated
    pub fn node_capacity(&self, node: &NodeID, mode: &ModeID) -> Option<&Capacity> {
        self.node_capacities.get(&(node.clone(), mode.clone()))
    }

    /// The kind of station a mode-fuel technology needs, if any
    pub fn charging_kind(&self, mode: &ModeID, fuel: &FuelID) -> Option<InfrastructureKind> {
        self.charging
            .get(&(mode.clone(), fuel.clone()))
            .map(|technology| technology.kind)
    }

    /// The big-M linking an upgrade to the flow of the fuel it enables.
    ///
    /// Derived from the edge's capacity (including any expansion) where the edge is capacitated,
    /// and from the largest total demand otherwise.
    pub fn upgrade_big_m(&self, edge: EdgeIndex, max_total_demand: f64) -> f64 {
        let capacity = self.edge_capacity(edge).map_or(max_total_demand, |capacity| {
            capacity.base + capacity.expansion.map_or(0.0, |e| e.increase)
        });

        UPGRADE_BIG_M_FACTOR * capacity
    }
}

/// Whether an investment with the given lead time can be decided in `year`.
///
/// The investment must become available before the end of the horizon. If `first_stage_only` is
/// set, only first-stage years qualify.
pub fn is_investment_year(
    time_periods: &TimePeriods,
    lead_time: u32,
    year: u32,
    first_stage_only: bool,
) -> bool {
    year + lead_time <= time_periods.last_year()
        && (!first_stage_only || time_periods.is_first_stage(year))
}

/// Whether an investment decided in `decided` is available in `year`
pub fn is_commissioned(decided: u32, lead_time: u32, year: u32) -> bool {
    decided + lead_time <= year
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, network, time_periods};
    use rstest::rstest;

    fn stations(years: impl IntoIterator<Item = u32>) -> ChargingTechnology {
        ChargingTechnology {
            kind: InfrastructureKind::Charging,
            stations: years
                .into_iter()
                .map(|year| {
                    (
                        year,
                        StationParameters {
                            max_station_dist: 100.0,
                            station_cost: 1e6,
                            vehicles_filled_daily: 50.0,
                        },
                    )
                })
                .collect(),
        }
    }

    #[rstest]
    fn test_charging_edges(network: Network, time_periods: TimePeriods) {
        let charging = [(("Road".into(), "Battery".into()), stations(time_periods.iter_years()))]
            .into_iter()
            .collect();
        let infrastructure = Infrastructure::new(
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            charging,
            &network,
            &time_periods,
        )
        .unwrap();

        let road_edges = network
            .iter_edges()
            .filter(|(_, edge)| edge.mode == "Road".into())
            .count();
        assert_eq!(infrastructure.charging_edges().len(), road_edges);
        assert!(
            infrastructure
                .charging_edges()
                .iter()
                .all(|(edge, fuel)| network.edge(*edge).mode == "Road".into()
                    && *fuel == "Battery".into())
        );
        assert_eq!(
            infrastructure.charging_kind(&"Road".into(), &"Battery".into()),
            Some(InfrastructureKind::Charging)
        );
    }

    #[rstest]
    fn test_charging_missing_year(network: Network, time_periods: TimePeriods) {
        let charging = [(("Road".into(), "Battery".into()), stations([2022]))]
            .into_iter()
            .collect();
        assert_error!(
            Infrastructure::new(
                IndexMap::new(),
                IndexMap::new(),
                IndexMap::new(),
                charging,
                &network,
                &time_periods,
            ),
            "Missing charging data for Road/Battery in 2026"
        );
    }

    #[rstest]
    #[case(2022, 4, true, true)]
    #[case(2034, 4, true, false)] // Second stage
    #[case(2034, 4, false, true)]
    #[case(2040, 12, false, false)] // Too late to finish
    fn test_is_investment_year(
        time_periods: TimePeriods,
        #[case] year: u32,
        #[case] lead_time: u32,
        #[case] first_stage_only: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(
            is_investment_year(&time_periods, lead_time, year, first_stage_only),
            expected
        );
    }

    #[test]
    fn test_upgrade_big_m() {
        let mut infrastructure = Infrastructure::default();
        infrastructure.edge_capacities.insert(
            EdgeIndex(0),
            Capacity {
                base: 10.0,
                expansion: Some(Expansion {
                    increase: 4.0,
                    cost: 1.0,
                    lead_time: 2,
                }),
            },
        );
        assert!((infrastructure.upgrade_big_m(EdgeIndex(0), 100.0) - 21.0).abs() < 1e-12);
        assert!((infrastructure.upgrade_big_m(EdgeIndex(1), 100.0) - 150.0).abs() < 1e-12);
        assert!(is_commissioned(2022, 4, 2026));
        assert!(!is_commissioned(2022, 5, 2026));
    }
}
