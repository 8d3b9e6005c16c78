//! Common routines for handling input data.
use crate::cost::{CostContext, CostTables};
use crate::id::insert_unique;
use crate::model::{Model, ModelParameters};
use crate::path::PathCatalog;
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::de::{Deserialize, DeserializeOwned, Deserializer};
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::fs;
use std::hash::Hash;
use std::path::Path;

mod demand;
use demand::read_demand;
mod infrastructure;
use infrastructure::read_infrastructure;
mod mode;
use mode::read_modes;
mod network;
use network::read_network;
mod path;
pub use path::PATHS_FILE_NAME;
use path::read_paths;
mod product;
use product::{read_products, read_vehicle_types};
mod scenario;
use scenario::read_scenarios;
mod technology;
use technology::read_technology;
mod time_period;
use time_period::read_time_periods;
mod vehicle;
use vehicle::read_vehicle_economics;

/// The maximum number of items to list in an error message
const MAX_ITEMS_IN_MESSAGE: usize = 10;

/// Read a series of type `T`s from a CSV file.
///
/// Will raise an error if the file is empty.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec.into_iter())
}

/// Read a series of type `T`s from a CSV file.
///
/// A missing or empty file yields no items.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
pub fn read_csv_optional<'a, T: DeserializeOwned + 'a>(
    file_path: &'a Path,
) -> Result<impl Iterator<Item = T> + 'a> {
    if !file_path.exists() {
        return Ok(Vec::new().into_iter());
    }

    let vec = read_csv_internal(file_path)?;
    Ok(vec.into_iter())
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| input_err_msg(file_path))?
        .into_deserialize()
        .process_results(|iter| iter.collect_vec())
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Read a Dimensionless float, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<Dimensionless, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        Err(serde::de::Error::custom("Value must be between 0 and 1"))?;
    }

    Ok(Dimensionless(value))
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Check whether an iterator contains values that are sorted and unique
pub fn is_sorted_and_unique<T, I>(iter: I) -> bool
where
    T: PartialOrd + Clone,
    I: IntoIterator<Item = T>,
{
    iter.into_iter().tuple_windows().all(|(a, b)| a < b)
}

/// Format a list of items, showing at most [`MAX_ITEMS_IN_MESSAGE`] of them
pub fn format_items_with_cap<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    let items = items.into_iter().collect_vec();
    let mut out = items
        .iter()
        .take(MAX_ITEMS_IN_MESSAGE)
        .map(ToString::to_string)
        .join(", ");
    if items.len() > MAX_ITEMS_IN_MESSAGE {
        let _ = write!(out, " and {} more", items.len() - MAX_ITEMS_IN_MESSAGE);
    }

    out
}

/// Insert a key-value pair into a map, raising an error if the key is already present
pub fn try_insert<K, V>(map: &mut HashMap<K, V>, key: K, value: V) -> Result<()>
where
    K: Eq + Hash + fmt::Debug,
{
    let key_str = format!("{key:?}");
    ensure!(
        map.insert(key, value).is_none(),
        "Key {key_str} already exists in the map"
    );

    Ok(())
}

/// Read a model from the specified directory.
///
/// All input tables are read and cross-validated here; no optimisation problem is built.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The static model data ([`Model`]) or an error.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;

    let time_periods = read_time_periods(model_dir)?;
    let modes = read_modes(model_dir)?;
    let products = read_products(model_dir)?;
    let vehicle_types = read_vehicle_types(model_dir, &modes, &products)?;
    let network = read_network(model_dir, &modes)?;
    let demand = read_demand(model_dir, &network, &products, &time_periods)?;
    let scenarios = read_scenarios(model_dir, &modes, &parameters)?;
    let (paths, generated_paths) = match read_paths(model_dir, &network)? {
        Some(paths) => {
            paths
                .check_coverage(&demand)
                .with_context(|| input_err_msg(model_dir.join(PATHS_FILE_NAME)))?;
            (paths, false)
        }
        None => (
            PathCatalog::generate(
                &network,
                &demand,
                parameters.max_path_legs,
                parameters.max_path_modes,
            )?,
            true,
        ),
    };
    let infrastructure = read_infrastructure(model_dir, &modes, &network, &time_periods)?;
    let technology = read_technology(model_dir, &modes, &parameters)?;
    let economics = read_vehicle_economics(
        model_dir,
        &modes,
        &products,
        &vehicle_types,
        &time_periods,
        &parameters,
    )?;
    let costs = CostTables::new(
        &economics,
        &CostContext {
            modes: &modes,
            products: &products,
            vehicle_types: &vehicle_types,
            network: &network,
            paths: &paths,
            time_periods: &time_periods,
            parameters: &parameters,
            infrastructure: &infrastructure,
            scenarios: &scenarios,
        },
    )?;

    Ok(Model {
        model_path: model_dir.to_path_buf(),
        parameters,
        modes,
        products,
        vehicle_types,
        time_periods,
        network,
        paths,
        generated_paths,
        demand,
        costs,
        infrastructure,
        technology,
        scenarios,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs::File;
    use std::io::Write as IoWrite;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Record {
        id: String,
        value: u32,
    }

    /// Create an example CSV file in dir_path
    fn create_csv_file(dir_path: &Path, contents: &str) -> PathBuf {
        let file_path = dir_path.join("test.csv");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_read_csv() {
        let dir = tempdir().unwrap();
        let file_path = create_csv_file(dir.path(), "id,value\nhello,1\nworld, 2\n");
        let records: Vec<Record> = read_csv(&file_path).unwrap().collect();
        assert_eq!(
            records,
            &[
                Record {
                    id: "hello".to_string(),
                    value: 1,
                },
                Record {
                    id: "world".to_string(),
                    value: 2,
                }
            ]
        );

        // File with no data (only column headers)
        let file_path = create_csv_file(dir.path(), "id,value\n");
        assert!(read_csv::<Record>(&file_path).is_err());
        assert!(
            read_csv_optional::<Record>(&file_path)
                .unwrap()
                .next()
                .is_none()
        );

        // Missing optional file
        let missing = dir.path().join("missing.csv");
        assert!(read_csv_optional::<Record>(&missing).unwrap().next().is_none());
    }

    #[test]
    fn test_read_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.toml");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "id = \"hello\"\nvalue = 1").unwrap();
        }

        assert_eq!(
            read_toml::<Record>(&file_path).unwrap(),
            Record {
                id: "hello".to_string(),
                value: 1,
            }
        );

        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "bad toml syntax").unwrap();
        }

        assert!(read_toml::<Record>(&file_path).is_err());
    }

    #[test]
    fn test_deserialise_proportion() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialise_proportion")]
            value: Dimensionless,
        }

        let ok: Wrapper = toml::from_str("value = 0.5").unwrap();
        assert_eq!(ok.value, Dimensionless(0.5));
        assert!(toml::from_str::<Wrapper>("value = 1.5").is_err());
        assert!(toml::from_str::<Wrapper>("value = -0.1").is_err());
    }

    #[test]
    fn test_is_sorted_and_unique() {
        assert!(is_sorted_and_unique([1, 2]));
        assert!(!is_sorted_and_unique([1, 1]));
        assert!(!is_sorted_and_unique([2, 1]));
        assert!(is_sorted_and_unique([1]));
        assert!(is_sorted_and_unique::<u32, _>([]));
    }

    #[test]
    fn test_format_items_with_cap() {
        assert_eq!(format_items_with_cap(["a", "b"]), "a, b");
        let many = (0..12).map(|i| i.to_string());
        assert_eq!(
            format_items_with_cap(many),
            "0, 1, 2, 3, 4, 5, 6, 7, 8, 9 and 2 more"
        );
    }

    #[test]
    fn test_try_insert() {
        let mut map = HashMap::new();
        assert!(try_insert(&mut map, "a", 1).is_ok());
        assert!(try_insert(&mut map, "a", 2).is_err());
        assert_eq!(map["a"], 1);
    }
}
