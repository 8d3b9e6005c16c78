//! Fixtures for tests

use crate::bass::BassModel;
use crate::cost::{
    CostContext, CostTables, ModeFuelEconomics, ModeProductEconomics, TransferCost,
    VehicleEconomics,
};
use crate::demand::DemandMap;
use crate::infrastructure::{
    Capacity, ChargingTechnology, Expansion, Infrastructure, InfrastructureKind, StationParameters,
    Upgrade,
};
use crate::mode::{Fuel, Mode, ModeID, ModeMap, Novelty};
use crate::model::{Model, ModelParameters};
use crate::network::{Network, Node, NodeMap};
use crate::path::PathCatalog;
use crate::product::{Product, ProductMap, VehicleType, VehicleTypeMap};
use crate::scenario::{CostFactors, CostPath, Scenario, ScenarioInfo, ScenarioMap};
use crate::technology::{Readiness, Technology};
use crate::time_period::{Stage, TimePeriods};
use crate::units::{Dimensionless, Distance};
use indexmap::{IndexMap, IndexSet, indexmap};
use itertools::iproduct;
use rstest::fixture;
use std::path::PathBuf;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

#[fixture]
pub fn time_periods() -> TimePeriods {
    TimePeriods::new(vec![
        (2022, Stage::First),
        (2026, Stage::First),
        (2030, Stage::First),
        (2034, Stage::Second),
        (2040, Stage::Second),
        (2050, Stage::Second),
    ])
    .unwrap()
}

#[fixture]
pub fn parameters() -> ModelParameters {
    toml::from_str("").unwrap()
}

#[fixture]
pub fn modes() -> ModeMap {
    let fuel = |id: &str, group: &str, novelty| Fuel {
        id: id.into(),
        group: group.into(),
        novelty,
    };
    let mode = |id: &str, capacitated, fuels: Vec<Fuel>| Mode {
        id: id.into(),
        capacitated,
        lifetime: 15,
        fuels: fuels.into_iter().map(|f| (f.id.clone(), f)).collect(),
    };

    [
        mode(
            "Road",
            false,
            vec![
                fuel("Diesel", "Fossil", Novelty::Mature),
                fuel("Battery", "Electric", Novelty::New),
            ],
        ),
        mode("Rail", true, vec![fuel("Diesel", "Fossil", Novelty::Mature)]),
        mode("Sea", false, vec![fuel("HFO", "Fossil", Novelty::Mature)]),
    ]
    .into_iter()
    .map(|m| (m.id.clone(), m))
    .collect()
}

#[fixture]
pub fn products() -> ProductMap {
    [("Timber", "Dry bulk"), ("Fish", "Thermo")]
        .into_iter()
        .map(|(id, class)| {
            (
                id.into(),
                Product {
                    id: id.into(),
                    class: class.into(),
                },
            )
        })
        .collect()
}

#[fixture]
pub fn vehicle_types() -> VehicleTypeMap {
    [
        ("Truck_bulk", "Road", "Dry bulk"),
        ("Truck_thermo", "Road", "Thermo"),
        ("Train_bulk", "Rail", "Dry bulk"),
        ("Ship_bulk", "Sea", "Dry bulk"),
    ]
    .into_iter()
    .map(|(id, mode, class)| {
        (
            id.into(),
            VehicleType {
                id: id.into(),
                mode: mode.into(),
                product_class: class.into(),
            },
        )
    })
    .collect()
}

#[fixture]
pub fn network(modes: ModeMap) -> Network {
    let node = |id: &str, zone_nr, sea| Node {
        id: id.into(),
        zone_nr,
        zone_name: id.to_string(),
        abroad: false,
        road: true,
        rail: true,
        sea,
        latitude: 60.0,
        longitude: 10.0,
    };
    let nodes: NodeMap = [
        node("Oslo", 1, true),
        node("Bergen", 2, true),
        node("Trondheim", 3, false),
    ]
    .into_iter()
    .map(|n| (n.id.clone(), n))
    .collect();
    let mode_ids: IndexSet<ModeID> = modes.keys().cloned().collect();

    let edges = [
        ("Oslo", "Bergen", "Road", 460.0),
        ("Oslo", "Bergen", "Sea", 900.0),
        ("Oslo", "Trondheim", "Road", 500.0),
        ("Oslo", "Trondheim", "Rail", 550.0),
        ("Trondheim", "Bergen", "Road", 250.0),
    ]
    .into_iter()
    .map(|(from, to, mode, distance)| {
        ((from.into(), to.into(), mode.into(), 1), Distance(distance))
    });

    Network::new(nodes, &mode_ids, edges).unwrap()
}

#[fixture]
pub fn demand(time_periods: TimePeriods) -> DemandMap {
    let mut demand = DemandMap::new();
    for year in time_periods.iter_years() {
        demand.insert("Oslo".into(), "Bergen".into(), "Timber".into(), year, 2.0);
        demand.insert("Oslo".into(), "Bergen".into(), "Fish".into(), year, 0.5);
    }

    demand
}

#[fixture]
pub fn path_catalog(network: Network, demand: DemandMap) -> PathCatalog {
    PathCatalog::generate(&network, &demand, 2, 2).unwrap()
}

#[fixture]
pub fn scenario_info(modes: ModeMap, vehicle_types: VehicleTypeMap) -> ScenarioInfo {
    let scenario = |id: &str, probability, fossil, electric| Scenario {
        id: id.into(),
        probability: Dimensionless(probability),
        fuel_group_paths: indexmap! {
            "Fossil".into() => fossil,
            "Electric".into() => electric,
        },
    };
    let scenarios: ScenarioMap = [
        scenario("OOO", 0.3, CostPath::Optimistic, CostPath::Optimistic),
        scenario("PPP", 0.3, CostPath::Pessimistic, CostPath::Pessimistic),
        scenario("BOB", 0.4, CostPath::Base, CostPath::Optimistic),
    ]
    .into_iter()
    .map(|s| (s.id.clone(), s))
    .collect();

    let mut entries = Vec::new();
    for (path, vehicle) in iproduct!(
        [CostPath::Base, CostPath::Optimistic, CostPath::Pessimistic],
        vehicle_types.values()
    ) {
        let end = match path {
            CostPath::Base => 1.0,
            CostPath::Optimistic => 0.8,
            CostPath::Pessimistic => 1.2,
        };
        for fuel in modes[&vehicle.mode].iter_fuel_ids() {
            let key = (
                path,
                vehicle.mode.clone(),
                vehicle.product_class.clone(),
                fuel.clone(),
            );
            entries.push((key.clone(), 2022, 1.0));
            entries.push((key, 2040, end));
        }
    }

    ScenarioInfo::new(
        scenarios,
        CostFactors::new(entries).unwrap(),
        &["Fossil".into(), "Electric".into()],
        "BBB",
    )
    .unwrap()
}

#[fixture]
pub fn technology() -> Technology {
    Technology {
        readiness: indexmap! {
            ("Road".into(), "Battery".into()) => Readiness::Diffusing {
                base: BassModel::new(0.03, 0.38, 100.0, 2025.0).unwrap(),
                p_q_variation: 0.5,
                t0_delay: 2.0,
            },
        },
        phase_out: IndexMap::new(),
        init_fuel_share: IndexMap::new(),
        init_mode_share: IndexMap::new(),
        scenario_variation: false,
    }
}

#[fixture]
pub fn infrastructure(network: Network, time_periods: TimePeriods) -> Infrastructure {
    let rail = network
        .find_edge(&"Oslo".into(), &"Trondheim".into(), &"Rail".into(), 1)
        .unwrap();
    let edge_capacities = indexmap! {
        rail => Capacity {
            base: 1.0,
            expansion: Some(Expansion {
                increase: 2.0,
                cost: 0.5,
                lead_time: 4,
            }),
        },
    };
    let edge_upgrades = indexmap! {
        rail => Upgrade {
            fuel: "Diesel".into(),
            cost: 0.1,
            lead_time: 4,
        },
    };
    let charging = indexmap! {
        ("Road".into(), "Battery".into()) => ChargingTechnology {
            kind: InfrastructureKind::Charging,
            stations: time_periods
                .iter_years()
                .map(|year| {
                    (
                        year,
                        StationParameters {
                            max_station_dist: 100.0,
                            station_cost: 2e6,
                            vehicles_filled_daily: 40.0,
                        },
                    )
                })
                .collect(),
        },
    };

    Infrastructure::new(
        edge_capacities,
        edge_upgrades,
        IndexMap::new(),
        charging,
        &network,
        &time_periods,
    )
    .unwrap()
}

#[fixture]
pub fn vehicle_economics(
    modes: ModeMap,
    vehicle_types: VehicleTypeMap,
    products: ProductMap,
    time_periods: TimePeriods,
) -> VehicleEconomics {
    let mut economics = VehicleEconomics::default();
    for (vehicle, year) in iproduct!(vehicle_types.values(), time_periods.iter_years()) {
        let scale = match &*vehicle.mode.0 {
            "Sea" => 50.0,
            "Rail" => 20.0,
            _ => 1.0,
        };
        economics.mode_product.insert(
            (vehicle.mode.clone(), vehicle.product_class.clone(), year),
            ModeProductEconomics {
                capex_customisation: 20_000.0 * scale,
                residual_value_customisation: 2_000.0 * scale,
                lifetime_customisation: 10,
                opex_fixed: 60_000.0 * scale,
                opex_variable: 0.2 * scale,
                tonnage: 25.0 * scale,
                utilisation: 0.7,
                annual_mileage: 100_000.0,
            },
        );
    }

    for (mode, year) in iproduct!(modes.values(), time_periods.iter_years()) {
        for fuel in mode.fuels.values() {
            let battery = fuel.novelty == Novelty::New;
            economics.mode_fuel.insert(
                (mode.id.clone(), fuel.id.clone(), year),
                ModeFuelEconomics {
                    capex_vehicle: if battery { 250_000.0 } else { 150_000.0 },
                    residual_value_vehicle: 15_000.0,
                    lifetime_vehicle: 10,
                    opex_maintenance: 10_000.0,
                    fuel_economy: if battery { 1.2 } else { 0.3 },
                    fuel_cost: if battery { 0.1 } else { 1.5 },
                    payload_loss: if battery { 0.05 } else { 0.0 },
                    wacc: 0.05,
                    emission_cost: 0.0,
                    co2_per_km: if battery { 0.0 } else { 0.9 },
                },
            );
        }
    }

    let mode_ids: Vec<_> = modes.keys().collect();
    let classes: IndexSet<_> = products.values().map(|p| p.class.clone()).collect();
    for (from, to, class) in iproduct!(&mode_ids, &mode_ids, &classes) {
        if from != to {
            economics.transfer.insert(
                ((*from).clone(), (*to).clone(), class.clone()),
                TransferCost {
                    cost: 50.0,
                    hours: 4.0,
                },
            );
        }
    }

    economics.co2_fees = time_periods
        .iter_years()
        .map(|year| (year, 100.0 + f64::from(year - 2022) * 10.0))
        .collect();
    economics.time_values = products
        .keys()
        .map(|id| (id.clone(), 1.0))
        .collect();
    economics.speeds = [("Road", 60.0), ("Rail", 50.0), ("Sea", 25.0)]
        .into_iter()
        .map(|(mode, speed)| (mode.into(), speed))
        .collect();

    economics
}

/// Owned model data from which a [`CostContext`] can be borrowed
pub struct CostContextParts {
    pub modes: ModeMap,
    pub products: ProductMap,
    pub vehicle_types: VehicleTypeMap,
    pub network: Network,
    pub paths: PathCatalog,
    pub time_periods: TimePeriods,
    pub parameters: ModelParameters,
    pub infrastructure: Infrastructure,
    pub scenarios: ScenarioInfo,
}

impl CostContextParts {
    pub fn context(&self) -> CostContext<'_> {
        CostContext {
            modes: &self.modes,
            products: &self.products,
            vehicle_types: &self.vehicle_types,
            network: &self.network,
            paths: &self.paths,
            time_periods: &self.time_periods,
            parameters: &self.parameters,
            infrastructure: &self.infrastructure,
            scenarios: &self.scenarios,
        }
    }
}

#[fixture]
#[allow(clippy::too_many_arguments)]
pub fn cost_context_parts(
    modes: ModeMap,
    products: ProductMap,
    vehicle_types: VehicleTypeMap,
    network: Network,
    path_catalog: PathCatalog,
    time_periods: TimePeriods,
    parameters: ModelParameters,
    infrastructure: Infrastructure,
    scenario_info: ScenarioInfo,
) -> CostContextParts {
    CostContextParts {
        modes,
        products,
        vehicle_types,
        network,
        paths: path_catalog,
        time_periods,
        parameters,
        infrastructure,
        scenarios: scenario_info,
    }
}

#[fixture]
pub fn model(
    cost_context_parts: CostContextParts,
    vehicle_economics: VehicleEconomics,
    demand: DemandMap,
    technology: Technology,
) -> Model {
    let costs = CostTables::new(&vehicle_economics, &cost_context_parts.context()).unwrap();
    let CostContextParts {
        modes,
        products,
        vehicle_types,
        network,
        paths,
        time_periods,
        parameters,
        infrastructure,
        scenarios,
    } = cost_context_parts;

    Model {
        model_path: PathBuf::from("."),
        parameters,
        modes,
        products,
        vehicle_types,
        time_periods,
        network,
        paths,
        generated_paths: true,
        demand,
        costs,
        infrastructure,
        technology,
        scenarios,
    }
}

/// A single-year model of timber transport from Oslo to Bergen.
///
/// Each entry of `edges` is the only edge of its mode between the two nodes, given as
/// `(mode, distance, capacity)`. Road runs on diesel only and there are no empty trips, so the
/// cost of moving a tonne along each path is fixed.
pub fn two_node_model(edges: &[(&str, f64, Option<f64>)], amount: f64) -> Model {
    let single_year = || TimePeriods::new(vec![(2022, Stage::First)]).unwrap();
    let diesel_modes = || {
        let mut modes = modes();
        for mode in modes.values_mut() {
            mode.fuels.retain(|id, _| &*id.0 != "Battery");
        }
        modes
    };
    let timber = || {
        let mut products = products();
        products.retain(|id, _| &*id.0 == "Timber");
        products
    };

    let node = |id: &str, zone_nr| Node {
        id: id.into(),
        zone_nr,
        zone_name: id.to_string(),
        abroad: false,
        road: true,
        rail: true,
        sea: true,
        latitude: 60.0,
        longitude: 8.0,
    };
    let nodes: NodeMap = [node("Oslo", 1), node("Bergen", 2)]
        .into_iter()
        .map(|n| (n.id.clone(), n))
        .collect();
    let mode_ids: IndexSet<ModeID> = diesel_modes().keys().cloned().collect();
    let network = Network::new(
        nodes,
        &mode_ids,
        edges.iter().map(|(mode, distance, _)| {
            (
                ("Oslo".into(), "Bergen".into(), (*mode).into(), 1),
                Distance(*distance),
            )
        }),
    )
    .unwrap();

    let mut demand = DemandMap::new();
    demand.insert("Oslo".into(), "Bergen".into(), "Timber".into(), 2022, amount);
    let paths = PathCatalog::generate(&network, &demand, 2, 2).unwrap();

    let edge_capacities = edges
        .iter()
        .filter_map(|(mode, _, capacity)| {
            let edge = network.find_edge(&"Oslo".into(), &"Bergen".into(), &(*mode).into(), 1)?;
            capacity.map(|base| {
                (
                    edge,
                    Capacity {
                        base,
                        expansion: None,
                    },
                )
            })
        })
        .collect();
    let infrastructure = Infrastructure::new(
        edge_capacities,
        IndexMap::new(),
        IndexMap::new(),
        IndexMap::new(),
        &network,
        &single_year(),
    )
    .unwrap();

    let mut parameters = parameters();
    parameters.balancing_trips = false;
    let parts = CostContextParts {
        modes: diesel_modes(),
        products: timber(),
        vehicle_types: vehicle_types(),
        network,
        paths,
        time_periods: single_year(),
        parameters,
        infrastructure,
        scenarios: scenario_info(diesel_modes(), vehicle_types()),
    };
    let economics = vehicle_economics(diesel_modes(), vehicle_types(), timber(), single_year());
    let technology = Technology {
        readiness: IndexMap::new(),
        ..technology()
    };

    model(parts, economics, demand, technology)
}
