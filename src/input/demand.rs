//! Code for reading transport demand from a CSV file.
use super::*;
use crate::demand::DemandMap;
use crate::model::{SCALE_W, round_precision};
use crate::network::{Network, NodeID};
use crate::product::{ProductID, ProductMap};
use crate::time_period::TimePeriods;
use log::debug;
use serde::Deserialize;
use std::collections::HashSet;

const DEMAND_FILE_NAME: &str = "demand.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct DemandRaw {
    origin: String,
    destination: String,
    product: String,
    year: u32,
    amount_tons: f64,
}

/// Read transport demand, converting tonnes to scaled weight units.
///
/// Rows for years which are not decision years are ignored.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `network` - The network, for validating nodes
/// * `products` - All products
/// * `time_periods` - Decision years
pub fn read_demand(
    model_dir: &Path,
    network: &Network,
    products: &ProductMap,
    time_periods: &TimePeriods,
) -> Result<DemandMap> {
    let file_path = model_dir.join(DEMAND_FILE_NAME);
    read_demand_from_iter(read_csv(&file_path)?, network, products, time_periods)
        .with_context(|| input_err_msg(&file_path))
}

fn read_demand_from_iter<I>(
    iter: I,
    network: &Network,
    products: &ProductMap,
    time_periods: &TimePeriods,
) -> Result<DemandMap>
where
    I: Iterator<Item = DemandRaw>,
{
    let mut demand = DemandMap::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;
    for raw in iter {
        let origin = NodeID::from(raw.origin);
        let destination = NodeID::from(raw.destination);
        let product = ProductID::from(raw.product);
        ensure!(network.nodes.contains_key(&origin), "Unknown node {origin}");
        ensure!(
            network.nodes.contains_key(&destination),
            "Unknown node {destination}"
        );
        ensure!(products.contains_key(&product), "Unknown product {product}");
        ensure!(
            raw.amount_tons.is_finite() && raw.amount_tons >= 0.0,
            "Demand from {origin} to {destination} for {product} in {} must be a non-negative number",
            raw.year
        );
        ensure!(
            seen.insert((origin.clone(), destination.clone(), product.clone(), raw.year)),
            "Duplicate demand entry from {origin} to {destination} for {product} in {}",
            raw.year
        );

        if !time_periods.contains(raw.year) {
            skipped += 1;
            continue;
        }

        let amount = round_precision(raw.amount_tons / SCALE_W);
        demand.insert(origin, destination, product, raw.year, amount);
    }

    if skipped > 0 {
        debug!("Ignored {skipped} demand entries for years which are not decision years");
    }

    Ok(demand)
}
