//! Cost and emission coefficients for the optimisation.
//!
//! Vehicle economics (annualised capital, operating and fuel costs) are turned into a normalised
//! cost per tonne-km and emissions per tonne-km for every mode, fuel, product and year. These are
//! scaled by arc distance to give per-arc coefficients. Second-stage transport costs are further
//! multiplied by the cost factor of the scenario's cost path for the fuel's group.
use crate::finance::annual_capital_cost;
use crate::infrastructure::Infrastructure;
use crate::mode::{FuelID, ModeID, ModeMap};
use crate::model::{ModelParameters, SCALE_EMIS, SCALE_MON, SCALE_W, round_precision};
use crate::network::{ArcIndex, EdgeIndex, Network};
use crate::path::{Path, PathCatalog, PathID};
use crate::product::{ProductClassID, ProductID, ProductMap, VehicleTypeID, VehicleTypeMap, find_vehicle_type};
use crate::scenario::{ScenarioID, ScenarioInfo};
use crate::time_period::TimePeriods;
use crate::units::{Dimensionless, Money};
use anyhow::{Context, Result, ensure};
use std::collections::HashMap;

const DAYS_PER_YEAR: f64 = 365.0;

/// Economic parameters of a vehicle carrying a product class on a mode, in one year
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ModeProductEconomics {
    /// Capital cost of customising the vehicle for the product class (EUR)
    pub capex_customisation: f64,
    /// Residual value of the customisation (EUR)
    pub residual_value_customisation: f64,
    /// Lifetime of the customisation (years)
    pub lifetime_customisation: u32,
    /// Fixed annual operating cost: administration, crew, insurance (EUR)
    pub opex_fixed: f64,
    /// Variable operating cost (EUR/km)
    pub opex_variable: f64,
    /// Payload (tonnes)
    pub tonnage: f64,
    /// Average utilisation of the payload
    pub utilisation: f64,
    /// Distance driven per year (km)
    pub annual_mileage: f64,
}

/// Economic parameters of a vehicle using a fuel on a mode, in one year
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ModeFuelEconomics {
    /// Capital cost of the vehicle (EUR)
    pub capex_vehicle: f64,
    /// Residual value of the vehicle (EUR)
    pub residual_value_vehicle: f64,
    /// Lifetime of the vehicle (years)
    pub lifetime_vehicle: u32,
    /// Annual maintenance and repair cost (EUR)
    pub opex_maintenance: f64,
    /// Fuel use per km
    pub fuel_economy: f64,
    /// Cost per unit of fuel (EUR)
    pub fuel_cost: f64,
    /// Share of payload lost due to the drivetrain
    pub payload_loss: f64,
    /// Weighted average cost of capital
    pub wacc: f64,
    /// Emission cost (EUR/km)
    pub emission_cost: f64,
    /// CO2 emitted per km (kg)
    pub co2_per_km: f64,
}

/// Cost of changing mode at a terminal for one product class
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct TransferCost {
    /// Handling cost (NOK/tonne)
    pub cost: f64,
    /// Loading and unloading time plus waiting time (hours)
    pub hours: f64,
}

/// Raw economic data from which the cost tables are computed
#[derive(PartialEq, Debug, Clone, Default)]
pub struct VehicleEconomics {
    /// Economics per (mode, product class, year)
    pub mode_product: HashMap<(ModeID, ProductClassID, u32), ModeProductEconomics>,
    /// Economics per (mode, fuel, year)
    pub mode_fuel: HashMap<(ModeID, FuelID, u32), ModeFuelEconomics>,
    /// Tax added to the fuel cost, per (mode, fuel)
    pub fuel_taxes: HashMap<(ModeID, FuelID), f64>,
    /// Transfer cost per (from mode, to mode, product class), stored in both directions
    pub transfer: HashMap<(ModeID, ModeID, ProductClassID), TransferCost>,
    /// CO2 fee per year at the chosen level (EUR/tonne CO2)
    pub co2_fees: HashMap<u32, f64>,
    /// Value of time per product (EUR per tonne-hour)
    pub time_values: HashMap<ProductID, f64>,
    /// Average speed per mode (km/h)
    pub speeds: HashMap<ModeID, f64>,
}

impl VehicleEconomics {
    /// Annual cost of operating one vehicle (EUR)
    fn annual_vehicle_cost(
        &self,
        mode: &ModeID,
        fuel: &FuelID,
        mp: &ModeProductEconomics,
        mf: &ModeFuelEconomics,
    ) -> f64 {
        let wacc = Dimensionless(mf.wacc);
        let tax = self
            .fuel_taxes
            .get(&(mode.clone(), fuel.clone()))
            .copied()
            .unwrap_or(0.0);

        let capital = [
            (mf.capex_vehicle, mf.lifetime_vehicle),
            (mf.residual_value_vehicle, mf.lifetime_vehicle),
            (mp.capex_customisation, mp.lifetime_customisation),
            (mp.residual_value_customisation, mp.lifetime_customisation),
        ]
        .into_iter()
        .map(|(cost, lifetime)| annual_capital_cost(Money(cost), lifetime, wacc).value())
        .sum::<f64>();

        capital
            + mp.opex_fixed
            + mf.opex_maintenance
            + (mp.opex_variable + mf.emission_cost + mf.fuel_economy * (mf.fuel_cost + tax))
                * mp.annual_mileage
    }

    /// Cost per tonne-km (EUR), including the penalties for partial utilisation and payload loss
    pub fn cost_per_tonne_km(
        &self,
        mode: &ModeID,
        fuel: &FuelID,
        mp: &ModeProductEconomics,
        mf: &ModeFuelEconomics,
    ) -> f64 {
        let annual = self.annual_vehicle_cost(mode, fuel, mp, mf);
        let tonne_km = mp.annual_mileage * mp.tonnage;
        let utilisation_penalty = 1.0 / mp.utilisation - 1.0;
        let payload_penalty = 1.0 / (1.0 - mf.payload_loss) - 1.0;

        annual * (1.0 + utilisation_penalty + payload_penalty) / tonne_km
    }

    /// Emissions per tonne-km (grams CO2)
    pub fn emissions_per_tonne_km(mp: &ModeProductEconomics, mf: &ModeFuelEconomics) -> f64 {
        1000.0 * mf.co2_per_km / (mp.tonnage * mp.utilisation)
    }
}

/// The model data the cost tables are derived from
pub struct CostContext<'a> {
    /// Modes and fuels
    pub modes: &'a ModeMap,
    /// Products
    pub products: &'a ProductMap,
    /// Vehicle types
    pub vehicle_types: &'a VehicleTypeMap,
    /// The network
    pub network: &'a Network,
    /// The path catalogue
    pub paths: &'a PathCatalog,
    /// Decision years
    pub time_periods: &'a TimePeriods,
    /// Model parameters
    pub parameters: &'a ModelParameters,
    /// Infrastructure data
    pub infrastructure: &'a Infrastructure,
    /// The scenario tree
    pub scenarios: &'a ScenarioInfo,
}

/// The additive components of the cost of a decision period
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, PartialOrd, Ord, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum CostComponent {
    /// Operating cost of loaded transport
    TransportOpex,
    /// CO2 fees for loaded transport
    TransportCo2,
    /// Penalty for emissions exceeding the cap
    Co2Penalty,
    /// Operating cost of empty balancing trips
    BalancingOpex,
    /// CO2 fees for empty balancing trips
    BalancingCo2,
    /// Value of time spent in transport
    TimeValue,
    /// Transfer costs between modes
    Transfer,
    /// Annual cost of charging stations
    Charging,
    /// Annual cost of filling stations
    Filling,
    /// Edge capacity expansion
    EdgeInvestment,
    /// Terminal capacity expansion
    NodeInvestment,
    /// Edge upgrades
    Upgrade,
}

impl CostComponent {
    /// Whether the component is a one-off investment rather than a recurring cost
    pub fn is_investment(self) -> bool {
        matches!(
            self,
            Self::EdgeInvestment | Self::NodeInvestment | Self::Upgrade
        )
    }
}

/// Key for per-arc coefficients: (arc, fuel, product, year)
pub type ArcKey = (ArcIndex, FuelID, ProductID, u32);

/// All cost and emission coefficients used by the optimisation, in scaled units
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CostTables {
    normalised_cost: HashMap<(ModeID, FuelID, ProductID, u32), f64>,
    normalised_emissions: HashMap<(ModeID, FuelID, ProductID, u32), f64>,
    transport: HashMap<ArcKey, f64>,
    emissions: HashMap<ArcKey, f64>,
    co2: HashMap<ArcKey, f64>,
    time_value: HashMap<(ArcIndex, ProductID), f64>,
    transfer: HashMap<(PathID, ProductID), f64>,
    transfer_time: HashMap<(PathID, ProductID), f64>,
    charging: HashMap<(EdgeIndex, FuelID, u32), f64>,
    cost_factors: HashMap<(ScenarioID, ModeID, FuelID, ProductID, u32), f64>,
    cheapest_product: HashMap<(ModeID, FuelID, VehicleTypeID, u32), ProductID>,
    co2_penalty: f64,
}

impl CostTables {
    /// Compute all coefficients.
    ///
    /// Fails if economic data is missing for a mode-fuel or mode-product class combination that
    /// is in use, or if a transfer, fee, time value, speed or cost factor needed is missing.
    pub fn new(economics: &VehicleEconomics, ctx: &CostContext) -> Result<Self> {
        let mut tables = Self {
            co2_penalty: round_precision(
                ctx.parameters.co2_penalty / 1e6 / SCALE_MON * SCALE_EMIS,
            ),
            ..Self::default()
        };

        tables.compute_normalised(economics, ctx)?;
        tables.compute_arc_coefficients(economics, ctx)?;
        tables.compute_transfer(economics, ctx)?;
        tables.compute_charging(ctx);
        tables.compute_cost_factors(ctx)?;
        tables.compute_cheapest_products(ctx);

        Ok(tables)
    }

    fn compute_normalised(&mut self, economics: &VehicleEconomics, ctx: &CostContext) -> Result<()> {
        let eur_to_nok = ctx.parameters.eur_to_nok;
        for mode in ctx.modes.values() {
            for fuel in mode.iter_fuel_ids() {
                for product in ctx.products.values() {
                    let has_vehicle =
                        find_vehicle_type(ctx.vehicle_types, &mode.id, &product.class).is_some();
                    for year in ctx.time_periods.iter_years() {
                        let key = (mode.id.clone(), fuel.clone(), product.id.clone(), year);
                        if !has_vehicle {
                            // Cannot be carried: prohibitively expensive and emission free
                            self.normalised_cost.insert(key.clone(), ctx.parameters.cost_big_m);
                            self.normalised_emissions.insert(key, 0.0);
                            continue;
                        }

                        let mp = economics
                            .mode_product
                            .get(&(mode.id.clone(), product.class.clone(), year))
                            .with_context(|| {
                                format!(
                                    "Missing vehicle data for mode {} and product class {} in {year}",
                                    mode.id, product.class
                                )
                            })?;
                        let mf = economics
                            .mode_fuel
                            .get(&(mode.id.clone(), fuel.clone(), year))
                            .with_context(|| {
                                format!(
                                    "Missing vehicle data for mode {} and fuel {fuel} in {year}",
                                    mode.id
                                )
                            })?;

                        let per_tonne_km = economics.cost_per_tonne_km(&mode.id, fuel, mp, mf);
                        ensure!(
                            per_tonne_km.is_finite(),
                            "Cost per tonne-km for {}/{fuel}/{} in {year} is not finite",
                            mode.id,
                            product.id
                        );
                        self.normalised_cost.insert(
                            key.clone(),
                            round_precision(per_tonne_km * eur_to_nok / SCALE_MON * SCALE_W),
                        );

                        let emissions = VehicleEconomics::emissions_per_tonne_km(mp, mf);
                        self.normalised_emissions.insert(
                            key,
                            round_precision(emissions * SCALE_W / SCALE_EMIS),
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn compute_arc_coefficients(
        &mut self,
        economics: &VehicleEconomics,
        ctx: &CostContext,
    ) -> Result<()> {
        let eur_to_nok = ctx.parameters.eur_to_nok;
        let fees: HashMap<u32, f64> = ctx
            .time_periods
            .iter_years()
            .map(|year| {
                let fee = economics
                    .co2_fees
                    .get(&year)
                    .with_context(|| format!("Missing CO2 fee for {year}"))?;
                Ok((year, fee * eur_to_nok / 1e6 / SCALE_MON * SCALE_EMIS))
            })
            .collect::<Result<_>>()?;

        for (idx, arc) in ctx.network.iter_arcs() {
            let distance = arc.distance.value();
            let speed = economics
                .speeds
                .get(&arc.mode)
                .with_context(|| format!("Missing speed for mode {}", arc.mode))?;
            let Some(mode) = ctx.modes.get(&arc.mode) else {
                continue;
            };

            for product in ctx.products.values() {
                let time_value = economics
                    .time_values
                    .get(&product.id)
                    .with_context(|| format!("Missing time value for product {}", product.id))?;
                let time_value = round_precision(time_value * eur_to_nok / SCALE_MON * SCALE_W);
                self.time_value.insert(
                    (idx, product.id.clone()),
                    round_precision(distance / speed * time_value),
                );

                for fuel in mode.iter_fuel_ids() {
                    for year in ctx.time_periods.iter_years() {
                        let norm_key = (mode.id.clone(), fuel.clone(), product.id.clone(), year);
                        let key = (idx, fuel.clone(), product.id.clone(), year);
                        let has_vehicle =
                            find_vehicle_type(ctx.vehicle_types, &mode.id, &product.class).is_some();
                        let cost = if has_vehicle {
                            round_precision(distance * self.normalised_cost[&norm_key])
                        } else {
                            ctx.parameters.cost_big_m
                        };
                        let emissions =
                            round_precision(distance * self.normalised_emissions[&norm_key]);
                        self.transport.insert(key.clone(), cost);
                        self.co2
                            .insert(key.clone(), round_precision(emissions * fees[&year]));
                        self.emissions.insert(key, emissions);
                    }
                }
            }
        }

        Ok(())
    }

    fn compute_transfer(&mut self, economics: &VehicleEconomics, ctx: &CostContext) -> Result<()> {
        let first_last_mile: ModeID = ctx.parameters.first_last_mile_mode.as_str().into();
        let eur_to_nok = ctx.parameters.eur_to_nok;
        for path in ctx.paths.iter() {
            if needs_transfer_cost(path, &first_last_mile) {
                for product in ctx.products.values() {
                    let time_value = economics
                        .time_values
                        .get(&product.id)
                        .with_context(|| format!("Missing time value for product {}", product.id))?;
                    let time_value = round_precision(time_value * eur_to_nok / SCALE_MON * SCALE_W);
                    let (cost, hours) = path_transfers(path, &first_last_mile)
                        .into_iter()
                        .map(|(from, to)| {
                            let transfer = economics
                                .transfer
                                .get(&(from.clone(), to.clone(), product.class.clone()))
                                .with_context(|| {
                                    format!(
                                        "Missing transfer cost from {from} to {to} for product class {}",
                                        product.class
                                    )
                                })?;
                            Ok((round_precision(transfer.cost / SCALE_MON * SCALE_W), transfer.hours))
                        })
                        .try_fold((0.0, 0.0), |(c, h), item: Result<(f64, f64)>| {
                            item.map(|(cost, hours)| (c + cost, h + hours))
                        })?;

                    self.transfer
                        .insert((path.id, product.id.clone()), round_precision(cost));
                    self.transfer_time.insert(
                        (path.id, product.id.clone()),
                        round_precision(hours * time_value),
                    );
                }
            }
        }

        Ok(())
    }

    fn compute_charging(&mut self, ctx: &CostContext) {
        let payload = ctx.parameters.avg_truck_payload;
        for (edge_idx, fuel) in ctx.infrastructure.charging_edges() {
            let edge = ctx.network.edge(*edge_idx);
            let Some(technology) = ctx
                .infrastructure
                .charging
                .get(&(edge.mode.clone(), fuel.clone()))
            else {
                continue;
            };

            for (year, stations) in &technology.stations {
                let num_stations = edge.distance.value() / stations.max_station_dist;
                let cost = num_stations * stations.station_cost
                    / (stations.vehicles_filled_daily * payload * DAYS_PER_YEAR)
                    / SCALE_MON
                    * SCALE_W;
                self.charging
                    .insert((*edge_idx, fuel.clone(), *year), round_precision(cost));
            }
        }
    }

    fn compute_cost_factors(&mut self, ctx: &CostContext) -> Result<()> {
        let scenarios = ctx
            .scenarios
            .iter()
            .chain(std::iter::once(&ctx.scenarios.expected_value));
        for scenario in scenarios {
            for mode in ctx.modes.values() {
                for fuel in mode.fuels.values() {
                    for product in ctx.products.values() {
                        if find_vehicle_type(ctx.vehicle_types, &mode.id, &product.class).is_none() {
                            continue;
                        }

                        for year in ctx.time_periods.iter_second_stage() {
                            let factor = ctx.scenarios.cost_factor(
                                scenario,
                                &fuel.group,
                                &mode.id,
                                &product.class,
                                &fuel.id,
                                year,
                            )?;
                            self.cost_factors.insert(
                                (
                                    scenario.id.clone(),
                                    mode.id.clone(),
                                    fuel.id.clone(),
                                    product.id.clone(),
                                    year,
                                ),
                                factor,
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn compute_cheapest_products(&mut self, ctx: &CostContext) {
        for vehicle in ctx.vehicle_types.values() {
            let Some(mode) = ctx.modes.get(&vehicle.mode) else {
                continue;
            };
            for fuel in mode.iter_fuel_ids() {
                for year in ctx.time_periods.iter_years() {
                    let cheapest = ctx
                        .products
                        .values()
                        .filter(|p| p.class == vehicle.product_class)
                        .min_by(|a, b| {
                            let cost = |id: &ProductID| {
                                self.normalised_cost[&(mode.id.clone(), fuel.clone(), id.clone(), year)]
                            };
                            cost(&a.id).total_cmp(&cost(&b.id))
                        });
                    if let Some(product) = cheapest {
                        self.cheapest_product.insert(
                            (mode.id.clone(), fuel.clone(), vehicle.id.clone(), year),
                            product.id.clone(),
                        );
                    }
                }
            }
        }
    }

    /// Normalised transport cost per tonne-km
    pub fn normalised_cost(&self, mode: &ModeID, fuel: &FuelID, product: &ProductID, year: u32) -> f64 {
        self.normalised_cost
            .get(&(mode.clone(), fuel.clone(), product.clone(), year))
            .copied()
            .unwrap_or(0.0)
    }

    /// Transport cost per tonne on an arc before scenario adjustment
    pub fn base_transport_cost(&self, arc: ArcIndex, fuel: &FuelID, product: &ProductID, year: u32) -> f64 {
        lookup(&self.transport, arc, fuel, product, year)
    }

    /// Transport cost per tonne on an arc in a scenario.
    ///
    /// First-stage years use the base cost; second-stage years apply the scenario's cost factor.
    pub fn transport_cost(
        &self,
        arc: ArcIndex,
        mode: &ModeID,
        fuel: &FuelID,
        product: &ProductID,
        year: u32,
        scenario: &ScenarioID,
    ) -> f64 {
        let base = self.base_transport_cost(arc, fuel, product, year);
        match self.cost_factors.get(&(
            scenario.clone(),
            mode.clone(),
            fuel.clone(),
            product.clone(),
            year,
        )) {
            Some(factor) => round_precision(base * factor),
            None => base,
        }
    }

    /// Emissions per tonne on an arc
    pub fn emissions(&self, arc: ArcIndex, fuel: &FuelID, product: &ProductID, year: u32) -> f64 {
        lookup(&self.emissions, arc, fuel, product, year)
    }

    /// CO2 fee cost per tonne on an arc
    pub fn co2_cost(&self, arc: ArcIndex, fuel: &FuelID, product: &ProductID, year: u32) -> f64 {
        lookup(&self.co2, arc, fuel, product, year)
    }

    /// Value of the time a tonne of product spends on an arc
    pub fn time_value(&self, arc: ArcIndex, product: &ProductID) -> f64 {
        self.time_value
            .get(&(arc, product.clone()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Transfer cost per tonne along a path, including the value of transfer time
    pub fn transfer_cost(&self, path: PathID, product: &ProductID) -> f64 {
        let key = (path, product.clone());
        self.transfer.get(&key).copied().unwrap_or(0.0)
            + self.transfer_time.get(&key).copied().unwrap_or(0.0)
    }

    /// Whether a path incurs transfer costs
    pub fn has_transfer_cost(&self, path: PathID, product: &ProductID) -> bool {
        self.transfer.contains_key(&(path, product.clone()))
    }

    /// Annual cost per unit of charging capacity on an edge
    pub fn charging_cost(&self, edge: EdgeIndex, fuel: &FuelID, year: u32) -> f64 {
        self.charging
            .get(&(edge, fuel.clone(), year))
            .copied()
            .unwrap_or(0.0)
    }

    /// The product whose costs are used for empty trips of a vehicle type
    pub fn cheapest_product(
        &self,
        mode: &ModeID,
        fuel: &FuelID,
        vehicle: &VehicleTypeID,
        year: u32,
    ) -> Option<&ProductID> {
        self.cheapest_product
            .get(&(mode.clone(), fuel.clone(), vehicle.clone(), year))
    }

    /// Cost per unit of emissions exceeding the cap
    pub fn co2_penalty(&self) -> f64 {
        self.co2_penalty
    }
}

fn lookup(map: &HashMap<ArcKey, f64>, arc: ArcIndex, fuel: &FuelID, product: &ProductID, year: u32) -> f64 {
    map.get(&(arc, fuel.clone(), product.clone(), year))
        .copied()
        .unwrap_or(0.0)
}

/// Whether a path pays transfer costs: every path except those using only the first/last-mile
/// mode
pub fn needs_transfer_cost(path: &Path, first_last_mile: &ModeID) -> bool {
    path.is_multimodal() || path.first_mode() != first_last_mile
}

/// The mode changes along a path, including the first and last mile when the path starts or ends
/// on a mode other than `first_last_mile`
fn path_transfers<'a>(path: &'a Path, first_last_mile: &'a ModeID) -> Vec<(&'a ModeID, &'a ModeID)> {
    let mut transfers = Vec::new();
    if path.first_mode() != first_last_mile {
        transfers.push((first_last_mile, path.first_mode()));
    }
    transfers.extend(
        path.modes
            .iter()
            .zip(path.modes.iter().skip(1))
            .filter(|(a, b)| a != b),
    );
    if path.last_mode() != first_last_mile {
        transfers.push((path.last_mode(), first_last_mile));
    }

    transfers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{cost_context_parts, vehicle_economics, CostContextParts};
    use crate::network::NodeID;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn arc(network: &Network, from: &str, to: &str, mode: &str) -> ArcIndex {
        network
            .find_arc(&NodeID::from(from), &NodeID::from(to), &mode.into(), 1)
            .unwrap()
    }

    #[rstest]
    fn test_cost_per_tonne_km(vehicle_economics: VehicleEconomics) {
        let mode = ModeID::from("Road");
        let fuel = FuelID::from("Diesel");
        let mp = vehicle_economics.mode_product[&(mode.clone(), "Dry bulk".into(), 2022)];
        let mf = vehicle_economics.mode_fuel[&(mode.clone(), fuel.clone(), 2022)];

        let annuity = |capex: f64, lifetime: u32| {
            let factor = (1.0 + mf.wacc).powi(lifetime as i32);
            factor * mf.wacc * capex / (factor - 1.0)
        };
        let annual = annuity(mf.capex_vehicle, mf.lifetime_vehicle)
            + annuity(mf.residual_value_vehicle, mf.lifetime_vehicle)
            + annuity(mp.capex_customisation, mp.lifetime_customisation)
            + annuity(mp.residual_value_customisation, mp.lifetime_customisation)
            + mp.opex_fixed
            + mf.opex_maintenance
            + (mp.opex_variable + mf.emission_cost + mf.fuel_economy * mf.fuel_cost)
                * mp.annual_mileage;
        let expected = annual
            * (1.0 / mp.utilisation + 1.0 / (1.0 - mf.payload_loss) - 1.0)
            / (mp.annual_mileage * mp.tonnage);

        assert_approx_eq!(
            f64,
            vehicle_economics.cost_per_tonne_km(&mode, &fuel, &mp, &mf),
            expected,
            epsilon = 1e-9
        );
    }

    #[rstest]
    fn test_fuel_tax(mut vehicle_economics: VehicleEconomics) {
        let mode = ModeID::from("Road");
        let fuel = FuelID::from("Diesel");
        let mp = vehicle_economics.mode_product[&(mode.clone(), "Dry bulk".into(), 2022)];
        let mf = vehicle_economics.mode_fuel[&(mode.clone(), fuel.clone(), 2022)];
        let before = vehicle_economics.cost_per_tonne_km(&mode, &fuel, &mp, &mf);
        vehicle_economics
            .fuel_taxes
            .insert((mode.clone(), fuel.clone()), 0.5);
        assert!(vehicle_economics.cost_per_tonne_km(&mode, &fuel, &mp, &mf) > before);
    }

    #[rstest]
    fn test_cost_proportional_to_distance(
        cost_context_parts: CostContextParts,
        vehicle_economics: VehicleEconomics,
    ) {
        let ctx = cost_context_parts.context();
        let tables = CostTables::new(&vehicle_economics, &ctx).unwrap();
        let network = ctx.network;
        let fuel = FuelID::from("Diesel");
        let product = ProductID::from("Timber");

        // Oslo-Trondheim by road is twice as long as Trondheim-Bergen
        let long = arc(network, "Oslo", "Trondheim", "Road");
        let short = arc(network, "Trondheim", "Bergen", "Road");
        assert_approx_eq!(
            f64,
            network.arc(long).distance.value(),
            2.0 * network.arc(short).distance.value()
        );
        let norm = tables.normalised_cost(&"Road".into(), &fuel, &product, 2022);
        assert_approx_eq!(
            f64,
            tables.base_transport_cost(long, &fuel, &product, 2022),
            round_precision(network.arc(long).distance.value() * norm)
        );
        assert_approx_eq!(
            f64,
            tables.base_transport_cost(long, &fuel, &product, 2022),
            2.0 * tables.base_transport_cost(short, &fuel, &product, 2022),
            epsilon = 1e-4
        );
        assert_approx_eq!(
            f64,
            tables.emissions(long, &fuel, &product, 2022),
            2.0 * tables.emissions(short, &fuel, &product, 2022),
            epsilon = 1e-4
        );
    }

    #[rstest]
    fn test_no_vehicle_type(cost_context_parts: CostContextParts, vehicle_economics: VehicleEconomics) {
        let ctx = cost_context_parts.context();
        let tables = CostTables::new(&vehicle_economics, &ctx).unwrap();

        // Fish cannot go by sea
        let sea = arc(ctx.network, "Oslo", "Bergen", "Sea");
        let fuel = FuelID::from("HFO");
        let fish = ProductID::from("Fish");
        assert_approx_eq!(
            f64,
            tables.base_transport_cost(sea, &fuel, &fish, 2022),
            ctx.parameters.cost_big_m
        );
        assert_approx_eq!(f64, tables.emissions(sea, &fuel, &fish, 2022), 0.0);
    }

    #[rstest]
    fn test_second_stage_cost_factor(
        cost_context_parts: CostContextParts,
        vehicle_economics: VehicleEconomics,
    ) {
        let ctx = cost_context_parts.context();
        let tables = CostTables::new(&vehicle_economics, &ctx).unwrap();
        let road = arc(ctx.network, "Oslo", "Bergen", "Road");
        let mode = ModeID::from("Road");
        let fuel = FuelID::from("Battery");
        let product = ProductID::from("Timber");

        for scenario in ctx.scenarios.iter() {
            // First stage uses the base cost in every scenario
            assert_approx_eq!(
                f64,
                tables.transport_cost(road, &mode, &fuel, &product, 2030, &scenario.id),
                tables.base_transport_cost(road, &fuel, &product, 2030)
            );
        }

        // The optimistic scenario is cheaper in the second stage
        let base = tables.transport_cost(road, &mode, &fuel, &product, 2040, &"BBB".into());
        let optimistic = tables.transport_cost(road, &mode, &fuel, &product, 2040, &"OOO".into());
        assert!(optimistic < base);
    }

    #[rstest]
    fn test_transfer_cost(cost_context_parts: CostContextParts, vehicle_economics: VehicleEconomics) {
        let ctx = cost_context_parts.context();
        let tables = CostTables::new(&vehicle_economics, &ctx).unwrap();
        let timber = ProductID::from("Timber");

        for path in ctx.paths.iter() {
            let expected = needs_transfer_cost(path, &"Road".into());
            assert_eq!(tables.has_transfer_cost(path.id, &timber), expected);
            if !expected {
                assert_approx_eq!(f64, tables.transfer_cost(path.id, &timber), 0.0);
            }
        }

        // Rail then road: one first-mile transfer and one rail to road transfer
        let rail_road = ctx
            .paths
            .iter()
            .find(|p| p.modes == [ModeID::from("Rail"), ModeID::from("Road")])
            .unwrap();
        let transfers = path_transfers(rail_road, &ModeID::from("Road"));
        assert_eq!(transfers.len(), 2);
        assert!(tables.transfer_cost(rail_road.id, &timber) > 0.0);
    }

    #[rstest]
    fn test_missing_vehicle_data(
        cost_context_parts: CostContextParts,
        mut vehicle_economics: VehicleEconomics,
    ) {
        let ctx = cost_context_parts.context();
        vehicle_economics
            .mode_fuel
            .remove(&("Road".into(), "Battery".into(), 2026));
        let err = CostTables::new(&vehicle_economics, &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing vehicle data for mode Road and fuel Battery in 2026"
        );
    }
}
