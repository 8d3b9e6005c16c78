//! Code for reading vehicle economics and related cost data from CSV files.
use super::*;
use crate::cost::{ModeFuelEconomics, ModeProductEconomics, TransferCost, VehicleEconomics};
use crate::mode::{FuelID, ModeID, ModeMap};
use crate::product::{ProductClassID, ProductID, ProductMap, VehicleTypeMap};
use crate::time_period::TimePeriods;
use serde::Deserialize;

const MODE_PRODUCT_FILE_NAME: &str = "vehicles_mode_product.csv";
const MODE_FUEL_FILE_NAME: &str = "vehicles_mode_fuel.csv";
const FUEL_TAXES_FILE_NAME: &str = "fuel_taxes.csv";
const TRANSFER_COSTS_FILE_NAME: &str = "transfer_costs.csv";
const CO2_FEES_FILE_NAME: &str = "co2_fees.csv";
const TIME_VALUES_FILE_NAME: &str = "time_values.csv";
const MODE_SPEEDS_FILE_NAME: &str = "mode_speeds.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ModeProductRaw {
    mode: String,
    product_class: String,
    year: u32,
    capex_customisation: f64,
    residual_value_customisation: f64,
    lifetime_customisation: u32,
    opex_fixed: f64,
    opex_variable: f64,
    tonnage: f64,
    utilisation: f64,
    annual_mileage: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct ModeFuelRaw {
    mode: String,
    fuel: String,
    year: u32,
    capex_vehicle: f64,
    residual_value_vehicle: f64,
    lifetime_vehicle: u32,
    opex_maintenance: f64,
    fuel_economy: f64,
    fuel_cost: f64,
    payload_loss: f64,
    wacc: f64,
    emission_cost: f64,
    co2_per_km: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct FuelTaxRaw {
    mode: String,
    fuel: String,
    tax: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct TransferCostRaw {
    from_mode: String,
    to_mode: String,
    product_class: String,
    cost_nok_per_tonne: f64,
    loading_hours: f64,
    waiting_hours: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct Co2FeeRaw {
    year: u32,
    level: String,
    fee_eur_per_tonne: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct TimeValueRaw {
    product: String,
    time_value_eur_per_tonne_hour: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct ModeSpeedRaw {
    mode: String,
    speed_kmh: f64,
}

/// Read vehicle economics and the other raw data the cost tables are computed from.
///
/// Rows for years which are not decision years are ignored. Missing rows for combinations in use
/// are reported when the cost tables are built.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes
/// * `products` - All products
/// * `vehicle_types` - All vehicle types
/// * `time_periods` - Decision years
/// * `parameters` - Model parameters, giving the CO2 fee level
pub fn read_vehicle_economics(
    model_dir: &Path,
    modes: &ModeMap,
    products: &ProductMap,
    vehicle_types: &VehicleTypeMap,
    time_periods: &TimePeriods,
    parameters: &ModelParameters,
) -> Result<VehicleEconomics> {
    let mut economics = VehicleEconomics::default();

    let file_path = model_dir.join(MODE_PRODUCT_FILE_NAME);
    economics.mode_product =
        read_mode_product_from_iter(read_csv(&file_path)?, modes, vehicle_types, time_periods)
            .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(MODE_FUEL_FILE_NAME);
    economics.mode_fuel = read_mode_fuel_from_iter(read_csv(&file_path)?, modes, time_periods)
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(FUEL_TAXES_FILE_NAME);
    for raw in read_csv_optional::<FuelTaxRaw>(&file_path)? {
        let key = check_mode_fuel(modes, &raw.mode, &raw.fuel)
            .with_context(|| input_err_msg(&file_path))?;
        try_insert(&mut economics.fuel_taxes, key, raw.tax)
            .with_context(|| input_err_msg(&file_path))?;
    }

    let file_path = model_dir.join(TRANSFER_COSTS_FILE_NAME);
    economics.transfer = read_transfer_costs_from_iter(read_csv(&file_path)?, modes, products)
        .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(CO2_FEES_FILE_NAME);
    economics.co2_fees =
        read_co2_fees_from_iter(read_csv(&file_path)?, &parameters.co2_fee_level, time_periods)
            .with_context(|| input_err_msg(&file_path))?;

    let file_path = model_dir.join(TIME_VALUES_FILE_NAME);
    for raw in read_csv::<TimeValueRaw>(&file_path)? {
        let product = ProductID::from(raw.product);
        ensure!(
            products.contains_key(&product),
            "Unknown product {product} in {}",
            file_path.display()
        );
        try_insert(&mut economics.time_values, product, raw.time_value_eur_per_tonne_hour)
            .with_context(|| input_err_msg(&file_path))?;
    }

    let file_path = model_dir.join(MODE_SPEEDS_FILE_NAME);
    for raw in read_csv::<ModeSpeedRaw>(&file_path)? {
        let mode = ModeID::from(raw.mode);
        ensure!(
            modes.contains_key(&mode),
            "Unknown mode {mode} in {}",
            file_path.display()
        );
        ensure!(
            raw.speed_kmh > 0.0,
            "Speed of mode {mode} must be greater than zero"
        );
        try_insert(&mut economics.speeds, mode, raw.speed_kmh)
            .with_context(|| input_err_msg(&file_path))?;
    }

    Ok(economics)
}

fn check_mode_fuel(modes: &ModeMap, mode: &str, fuel: &str) -> Result<(ModeID, FuelID)> {
    let mode = modes
        .get(mode)
        .with_context(|| format!("Unknown mode {mode}"))?;
    let fuel = FuelID::from(fuel);
    ensure!(mode.has_fuel(&fuel), "Unknown fuel {fuel} for mode {}", mode.id);

    Ok((mode.id.clone(), fuel))
}

fn read_mode_product_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    vehicle_types: &VehicleTypeMap,
    time_periods: &TimePeriods,
) -> Result<HashMap<(ModeID, ProductClassID, u32), ModeProductEconomics>>
where
    I: Iterator<Item = ModeProductRaw>,
{
    let mut map = HashMap::new();
    for raw in iter {
        let mode = ModeID::from(raw.mode);
        let class = ProductClassID::from(raw.product_class);
        ensure!(modes.contains_key(&mode), "Unknown mode {mode}");
        ensure!(
            vehicle_types
                .values()
                .any(|v| v.mode == mode && v.product_class == class),
            "No vehicle type for mode {mode} and product class {class}"
        );
        ensure!(
            raw.tonnage > 0.0 && raw.annual_mileage > 0.0,
            "Tonnage and annual mileage for {mode}/{class} in {} must be greater than zero",
            raw.year
        );
        ensure!(
            raw.utilisation > 0.0 && raw.utilisation <= 1.0,
            "Utilisation for {mode}/{class} in {} must be greater than zero and at most one",
            raw.year
        );
        if !time_periods.contains(raw.year) {
            continue;
        }

        let economics = ModeProductEconomics {
            capex_customisation: raw.capex_customisation,
            residual_value_customisation: raw.residual_value_customisation,
            lifetime_customisation: raw.lifetime_customisation,
            opex_fixed: raw.opex_fixed,
            opex_variable: raw.opex_variable,
            tonnage: raw.tonnage,
            utilisation: raw.utilisation,
            annual_mileage: raw.annual_mileage,
        };
        try_insert(&mut map, (mode, class, raw.year), economics)?;
    }

    Ok(map)
}

fn read_mode_fuel_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    time_periods: &TimePeriods,
) -> Result<HashMap<(ModeID, FuelID, u32), ModeFuelEconomics>>
where
    I: Iterator<Item = ModeFuelRaw>,
{
    let mut map = HashMap::new();
    for raw in iter {
        let (mode, fuel) = check_mode_fuel(modes, &raw.mode, &raw.fuel)?;
        ensure!(
            (0.0..1.0).contains(&raw.payload_loss),
            "Payload loss for {mode}/{fuel} in {} must be at least zero and less than one",
            raw.year
        );
        ensure!(
            raw.wacc.is_finite() && raw.wacc >= 0.0,
            "WACC for {mode}/{fuel} in {} must be a non-negative number",
            raw.year
        );
        if !time_periods.contains(raw.year) {
            continue;
        }

        let economics = ModeFuelEconomics {
            capex_vehicle: raw.capex_vehicle,
            residual_value_vehicle: raw.residual_value_vehicle,
            lifetime_vehicle: raw.lifetime_vehicle,
            opex_maintenance: raw.opex_maintenance,
            fuel_economy: raw.fuel_economy,
            fuel_cost: raw.fuel_cost,
            payload_loss: raw.payload_loss,
            wacc: raw.wacc,
            emission_cost: raw.emission_cost,
            co2_per_km: raw.co2_per_km,
        };
        try_insert(&mut map, (mode, fuel, raw.year), economics)?;
    }

    Ok(map)
}

/// Read transfer costs. Each row applies in both directions unless the reverse direction is
/// given explicitly.
fn read_transfer_costs_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    products: &ProductMap,
) -> Result<HashMap<(ModeID, ModeID, ProductClassID), TransferCost>>
where
    I: Iterator<Item = TransferCostRaw>,
{
    let mut explicit = HashMap::new();
    for raw in iter {
        let from = ModeID::from(raw.from_mode);
        let to = ModeID::from(raw.to_mode);
        let class = ProductClassID::from(raw.product_class);
        ensure!(modes.contains_key(&from), "Unknown mode {from}");
        ensure!(modes.contains_key(&to), "Unknown mode {to}");
        ensure!(
            products.values().any(|p| p.class == class),
            "Unknown product class {class}"
        );
        let transfer = TransferCost {
            cost: raw.cost_nok_per_tonne,
            hours: raw.loading_hours + raw.waiting_hours,
        };
        try_insert(&mut explicit, (from, to, class), transfer)?;
    }

    let mut transfer = explicit.clone();
    for ((from, to, class), cost) in explicit {
        transfer.entry((to, from, class)).or_insert(cost);
    }

    Ok(transfer)
}

fn read_co2_fees_from_iter<I>(
    iter: I,
    level: &str,
    time_periods: &TimePeriods,
) -> Result<HashMap<u32, f64>>
where
    I: Iterator<Item = Co2FeeRaw>,
{
    let mut fees = HashMap::new();
    let mut levels = IndexSet::new();
    for raw in iter {
        levels.insert(raw.level.clone());
        if raw.level != level || !time_periods.contains(raw.year) {
            continue;
        }
        try_insert(&mut fees, raw.year, raw.fee_eur_per_tonne)?;
    }
    ensure!(
        levels.contains(level),
        "CO2 fee level {level} not found (available: {})",
        format_items_with_cap(levels)
    );

    let missing = time_periods
        .iter_years()
        .filter(|year| !fees.contains_key(year))
        .collect_vec();
    ensure!(
        missing.is_empty(),
        "Missing CO2 fee for years: {}",
        format_items_with_cap(missing)
    );

    Ok(fees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, modes, products, time_periods};
    use rstest::rstest;

    fn transfer(from: &str, to: &str, cost: f64) -> TransferCostRaw {
        TransferCostRaw {
            from_mode: from.to_string(),
            to_mode: to.to_string(),
            product_class: "Dry bulk".to_string(),
            cost_nok_per_tonne: cost,
            loading_hours: 2.0,
            waiting_hours: 1.0,
        }
    }

    #[rstest]
    fn test_transfer_costs_symmetric(modes: ModeMap, products: ProductMap) {
        let costs = read_transfer_costs_from_iter(
            [transfer("Road", "Rail", 40.0), transfer("Road", "Sea", 60.0), transfer("Sea", "Road", 70.0)]
                .into_iter(),
            &modes,
            &products,
        )
        .unwrap();
        let get = |from: &str, to: &str| costs[&(from.into(), to.into(), "Dry bulk".into())];
        assert_eq!(get("Rail", "Road"), get("Road", "Rail"));
        assert!((get("Rail", "Road").hours - 3.0).abs() < 1e-12);

        // Explicit reverse direction is kept
        assert!((get("Sea", "Road").cost - 70.0).abs() < 1e-12);
        assert!((get("Road", "Sea").cost - 60.0).abs() < 1e-12);
    }

    #[rstest]
    fn test_co2_fees(time_periods: TimePeriods) {
        let fee = |year, level: &str| Co2FeeRaw {
            year,
            level: level.to_string(),
            fee_eur_per_tonne: 100.0,
        };
        let all_years = || time_periods.iter_years().map(|y| fee(y, "base"));

        let fees = read_co2_fees_from_iter(all_years(), "base", &time_periods).unwrap();
        assert_eq!(fees.len(), time_periods.len());

        assert_error!(
            read_co2_fees_from_iter(all_years(), "high", &time_periods),
            "CO2 fee level high not found (available: base)"
        );
        assert_error!(
            read_co2_fees_from_iter([fee(2022, "base")].into_iter(), "base", &time_periods),
            "Missing CO2 fee for years: 2026, 2030, 2034, 2040, 2050"
        );
    }

    #[rstest]
    fn test_mode_fuel_payload_loss(modes: ModeMap, time_periods: TimePeriods) {
        let raw = ModeFuelRaw {
            mode: "Road".to_string(),
            fuel: "Battery".to_string(),
            year: 2022,
            capex_vehicle: 1.0,
            residual_value_vehicle: 0.0,
            lifetime_vehicle: 10,
            opex_maintenance: 0.0,
            fuel_economy: 1.0,
            fuel_cost: 1.0,
            payload_loss: 1.0,
            wacc: 0.05,
            emission_cost: 0.0,
            co2_per_km: 0.0,
        };
        assert_error!(
            read_mode_fuel_from_iter([raw].into_iter(), &modes, &time_periods),
            "Payload loss for Road/Battery in 2022 must be at least zero and less than one"
        );
    }
}
