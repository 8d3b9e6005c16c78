//! Code for reading infrastructure capacities, upgrades and charging stations from CSV files.
use super::*;
use crate::infrastructure::{
    Capacity, ChargingTechnology, Expansion, Infrastructure, InfrastructureKind, StationParameters,
    Upgrade,
};
use crate::mode::{FuelID, ModeID, ModeMap};
use crate::model::{SCALE_MON, SCALE_W, round_precision};
use crate::network::{EdgeIndex, Network, NodeID};
use crate::time_period::TimePeriods;
use anyhow::bail;
use indexmap::IndexMap;
use serde::Deserialize;

const EDGE_CAPACITIES_FILE_NAME: &str = "edge_capacities.csv";
const NODE_CAPACITIES_FILE_NAME: &str = "node_capacities.csv";
const CHARGING_FILE_NAME: &str = "charging.csv";

#[derive(PartialEq, Debug)]
struct CapacityColumns {
    capacity_tonnes: Option<f64>,
    capacity_increase_tonnes: Option<f64>,
    investment_cost_nok: Option<f64>,
    lead_time: Option<u32>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct EdgeCapacityRaw {
    from: String,
    to: String,
    mode: String,
    route: u32,
    capacity_tonnes: Option<f64>,
    capacity_increase_tonnes: Option<f64>,
    investment_cost_nok: Option<f64>,
    lead_time: Option<u32>,
    upgrade_fuel: Option<String>,
    upgrade_cost_nok: Option<f64>,
    upgrade_lead_time: Option<u32>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct NodeCapacityRaw {
    node: String,
    mode: String,
    capacity_tonnes: Option<f64>,
    capacity_increase_tonnes: Option<f64>,
    investment_cost_nok: Option<f64>,
    lead_time: Option<u32>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct ChargingRaw {
    mode: String,
    fuel: String,
    year: u32,
    infrastructure: InfrastructureKind,
    max_station_dist_km: f64,
    station_cost_nok: f64,
    vehicles_filled_daily: f64,
}

macro_rules! capacity_columns {
    ($raw:expr) => {
        CapacityColumns {
            capacity_tonnes: $raw.capacity_tonnes,
            capacity_increase_tonnes: $raw.capacity_increase_tonnes,
            investment_cost_nok: $raw.investment_cost_nok,
            lead_time: $raw.lead_time,
        }
    };
}

/// Read all infrastructure data. Every file is optional.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes
/// * `network` - The network
/// * `time_periods` - Decision years
pub fn read_infrastructure(
    model_dir: &Path,
    modes: &ModeMap,
    network: &Network,
    time_periods: &TimePeriods,
) -> Result<Infrastructure> {
    let edge_path = model_dir.join(EDGE_CAPACITIES_FILE_NAME);
    let (edge_capacities, edge_upgrades) =
        read_edge_capacities_from_iter(read_csv_optional(&edge_path)?, modes, network)
            .with_context(|| input_err_msg(&edge_path))?;

    let node_path = model_dir.join(NODE_CAPACITIES_FILE_NAME);
    let node_capacities =
        read_node_capacities_from_iter(read_csv_optional(&node_path)?, modes, network)
            .with_context(|| input_err_msg(&node_path))?;

    let charging_path = model_dir.join(CHARGING_FILE_NAME);
    let charging = read_charging_from_iter(read_csv_optional(&charging_path)?, modes, time_periods)
        .with_context(|| input_err_msg(&charging_path))?;

    Infrastructure::new(
        edge_capacities,
        edge_upgrades,
        node_capacities,
        charging,
        network,
        time_periods,
    )
    .with_context(|| input_err_msg(&charging_path))
}

/// Convert capacity columns to scaled units. Returns `None` if no capacity is given.
fn parse_capacity(columns: &CapacityColumns, what: &str) -> Result<Option<Capacity>> {
    let expansion_given = columns.capacity_increase_tonnes.is_some()
        || columns.investment_cost_nok.is_some()
        || columns.lead_time.is_some();
    let Some(base) = columns.capacity_tonnes else {
        ensure!(
            !expansion_given,
            "Expansion given for {what} without a base capacity"
        );
        return Ok(None);
    };
    ensure!(
        base.is_finite() && base >= 0.0,
        "Capacity of {what} must be a non-negative number"
    );

    let expansion = match (
        columns.capacity_increase_tonnes,
        columns.investment_cost_nok,
        columns.lead_time,
    ) {
        (None, None, None) => None,
        (Some(increase), Some(cost), Some(lead_time)) => {
            ensure!(
                increase.is_finite() && increase >= 0.0 && cost.is_finite() && cost >= 0.0,
                "Expansion of {what} must have a non-negative increase and cost"
            );
            Some(Expansion {
                increase: round_precision(increase / SCALE_W),
                cost: round_precision(cost / SCALE_MON),
                lead_time,
            })
        }
        _ => bail!(
            "Expansion of {what} must give capacity increase, investment cost and lead time"
        ),
    };

    Ok(Some(Capacity {
        base: round_precision(base / SCALE_W),
        expansion,
    }))
}

fn read_edge_capacities_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    network: &Network,
) -> Result<(IndexMap<EdgeIndex, Capacity>, IndexMap<EdgeIndex, Upgrade>)>
where
    I: Iterator<Item = EdgeCapacityRaw>,
{
    let mut capacities = IndexMap::new();
    let mut upgrades = IndexMap::new();
    for raw in iter {
        let from = NodeID::from(raw.from);
        let to = NodeID::from(raw.to);
        let mode = modes
            .get(raw.mode.as_str())
            .with_context(|| format!("Unknown mode {}", raw.mode))?;
        let edge = network
            .find_edge(&from, &to, &mode.id, raw.route)
            .with_context(|| format!("Unknown edge {from}-{to} ({}, {})", mode.id, raw.route))?;
        let what = format!("edge {}", network.edge(edge));
        ensure!(
            !capacities.contains_key(&edge) && !upgrades.contains_key(&edge),
            "Duplicate entry for {what}"
        );

        if let Some(capacity) = parse_capacity(&capacity_columns!(raw), &what)? {
            ensure!(mode.capacitated, "Capacity given for {what}, but mode {} is not capacitated", mode.id);
            capacities.insert(edge, capacity);
        }

        match (raw.upgrade_fuel, raw.upgrade_cost_nok, raw.upgrade_lead_time) {
            (None, None, None) => {}
            (Some(fuel), Some(cost), Some(lead_time)) => {
                let fuel = FuelID::from(fuel);
                ensure!(
                    mode.has_fuel(&fuel),
                    "Upgrade of {what} enables fuel {fuel}, which mode {} cannot use",
                    mode.id
                );
                ensure!(
                    cost.is_finite() && cost >= 0.0,
                    "Upgrade cost of {what} must be a non-negative number"
                );
                upgrades.insert(
                    edge,
                    Upgrade {
                        fuel,
                        cost: round_precision(cost / SCALE_MON),
                        lead_time,
                    },
                );
            }
            _ => bail!("Upgrade of {what} must give fuel, cost and lead time"),
        }
    }

    Ok((capacities, upgrades))
}

fn read_node_capacities_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    network: &Network,
) -> Result<IndexMap<(NodeID, ModeID), Capacity>>
where
    I: Iterator<Item = NodeCapacityRaw>,
{
    let mut capacities = IndexMap::new();
    for raw in iter {
        let node = NodeID::from(raw.node);
        let mode = modes
            .get(raw.mode.as_str())
            .with_context(|| format!("Unknown mode {}", raw.mode))?;
        ensure!(
            network.node_has_mode(&node, &mode.id),
            "Node {node} is not served by mode {}",
            mode.id
        );
        let what = format!("terminal {node} ({})", mode.id);
        let Some(capacity) = parse_capacity(&capacity_columns!(raw), &what)? else {
            continue;
        };
        ensure!(
            capacities
                .insert((node.clone(), mode.id.clone()), capacity)
                .is_none(),
            "Duplicate entry for {what}"
        );
    }

    Ok(capacities)
}

fn read_charging_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    time_periods: &TimePeriods,
) -> Result<IndexMap<(ModeID, FuelID), ChargingTechnology>>
where
    I: Iterator<Item = ChargingRaw>,
{
    let mut charging: IndexMap<(ModeID, FuelID), ChargingTechnology> = IndexMap::new();
    for raw in iter {
        let mode = modes
            .get(raw.mode.as_str())
            .with_context(|| format!("Unknown mode {}", raw.mode))?;
        let fuel = FuelID::from(raw.fuel);
        ensure!(mode.has_fuel(&fuel), "Unknown fuel {fuel} for mode {}", mode.id);
        ensure!(
            raw.max_station_dist_km > 0.0
                && raw.vehicles_filled_daily > 0.0
                && raw.station_cost_nok.is_finite()
                && raw.station_cost_nok >= 0.0,
            "Invalid station parameters for {}/{fuel} in {}",
            mode.id,
            raw.year
        );

        let technology = charging
            .entry((mode.id.clone(), fuel.clone()))
            .or_insert_with(|| ChargingTechnology {
                kind: raw.infrastructure,
                stations: IndexMap::new(),
            });
        ensure!(
            technology.kind == raw.infrastructure,
            "Conflicting infrastructure kinds for {}/{fuel}",
            mode.id
        );
        if !time_periods.contains(raw.year) {
            continue;
        }

        let stations = StationParameters {
            max_station_dist: raw.max_station_dist_km,
            station_cost: raw.station_cost_nok,
            vehicles_filled_daily: raw.vehicles_filled_daily,
        };
        ensure!(
            technology.stations.insert(raw.year, stations).is_none(),
            "Duplicate charging data for {}/{fuel} in {}",
            mode.id,
            raw.year
        );
    }

    Ok(charging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, modes, network, time_periods};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn columns(
        capacity: Option<f64>,
        increase: Option<f64>,
        cost: Option<f64>,
        lead_time: Option<u32>,
    ) -> CapacityColumns {
        CapacityColumns {
            capacity_tonnes: capacity,
            capacity_increase_tonnes: increase,
            investment_cost_nok: cost,
            lead_time,
        }
    }

    fn edge_raw(mode: &str, capacity: CapacityColumns, upgrade: Option<&str>) -> EdgeCapacityRaw {
        EdgeCapacityRaw {
            from: "Oslo".to_string(),
            to: "Trondheim".to_string(),
            mode: mode.to_string(),
            route: 1,
            capacity_tonnes: capacity.capacity_tonnes,
            capacity_increase_tonnes: capacity.capacity_increase_tonnes,
            investment_cost_nok: capacity.investment_cost_nok,
            lead_time: capacity.lead_time,
            upgrade_fuel: upgrade.map(ToString::to_string),
            upgrade_cost_nok: upgrade.map(|_| 1e8),
            upgrade_lead_time: upgrade.map(|_| 3),
        }
    }

    #[test]
    fn test_parse_capacity() {
        let capacity = parse_capacity(&columns(Some(2e6), Some(1e6), Some(5e8), Some(4)), "x")
            .unwrap()
            .unwrap();
        assert_approx_eq!(f64, capacity.base, 2.0);
        let expansion = capacity.expansion.unwrap();
        assert_approx_eq!(f64, expansion.increase, 1.0);
        assert_approx_eq!(f64, expansion.cost, 0.5);
        assert_eq!(expansion.lead_time, 4);

        assert!(parse_capacity(&columns(None, None, None, None), "x").unwrap().is_none());
        assert_error!(
            parse_capacity(&columns(Some(1.0), Some(1.0), None, Some(4)), "x"),
            "Expansion of x must give capacity increase, investment cost and lead time"
        );
        assert_error!(
            parse_capacity(&columns(None, Some(1.0), None, None), "x"),
            "Expansion given for x without a base capacity"
        );
    }

    #[rstest]
    fn test_read_edge_capacities(modes: ModeMap, network: Network) {
        let (capacities, upgrades) = read_edge_capacities_from_iter(
            [
                edge_raw("Rail", columns(Some(1e6), None, None, None), Some("Diesel")),
                edge_raw("Road", columns(None, None, None, None), Some("Battery")),
            ]
            .into_iter(),
            &modes,
            &network,
        )
        .unwrap();
        assert_eq!(capacities.len(), 1);
        assert_eq!(upgrades.len(), 2);
        assert!(capacities.values().all(|c| c.expansion.is_none()));
    }

    #[rstest]
    fn test_read_edge_capacities_uncapacitated(modes: ModeMap, network: Network) {
        assert_error!(
            read_edge_capacities_from_iter(
                [edge_raw("Road", columns(Some(1e6), None, None, None), None)].into_iter(),
                &modes,
                &network,
            ),
            "Capacity given for edge Oslo-Trondheim (Road, 1), but mode Road is not capacitated"
        );
    }

    #[rstest]
    fn test_read_charging(modes: ModeMap, time_periods: TimePeriods) {
        let raw = |year, kind| ChargingRaw {
            mode: "Road".to_string(),
            fuel: "Battery".to_string(),
            year,
            infrastructure: kind,
            max_station_dist_km: 100.0,
            station_cost_nok: 1e6,
            vehicles_filled_daily: 30.0,
        };
        let charging = read_charging_from_iter(
            [raw(2022, InfrastructureKind::Charging), raw(2023, InfrastructureKind::Charging)]
                .into_iter(),
            &modes,
            &time_periods,
        )
        .unwrap();
        let technology = &charging[&("Road".into(), "Battery".into())];
        assert_eq!(technology.stations.keys().copied().collect_vec(), [2022]);

        assert_error!(
            read_charging_from_iter(
                [raw(2022, InfrastructureKind::Charging), raw(2026, InfrastructureKind::Filling)]
                    .into_iter(),
                &modes,
                &time_periods,
            ),
            "Conflicting infrastructure kinds for Road/Battery"
        );
    }
}
