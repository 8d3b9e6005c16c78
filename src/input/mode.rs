//! Code for reading modes and their fuels from CSV files.
use super::*;
use crate::mode::{Fuel, FuelGroupID, Mode, ModeID, ModeMap, Novelty};
use indexmap::IndexMap;
use serde::Deserialize;

const MODES_FILE_NAME: &str = "modes.csv";
const FUELS_FILE_NAME: &str = "fuels.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ModeRaw {
    mode: String,
    capacitated: bool,
    lifetime: u32,
}

#[derive(PartialEq, Debug, Deserialize)]
struct FuelRaw {
    mode: String,
    fuel: String,
    fuel_group: String,
    novelty: Novelty,
}

/// Read modes and the fuels available to each of them.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// A map of modes, in input order, or an error
pub fn read_modes(model_dir: &Path) -> Result<ModeMap> {
    let modes_path = model_dir.join(MODES_FILE_NAME);
    let mut modes = read_modes_from_iter(read_csv(&modes_path)?)
        .with_context(|| input_err_msg(&modes_path))?;

    let fuels_path = model_dir.join(FUELS_FILE_NAME);
    add_fuels_from_iter(&mut modes, read_csv(&fuels_path)?)
        .with_context(|| input_err_msg(&fuels_path))?;

    Ok(modes)
}

fn read_modes_from_iter<I>(iter: I) -> Result<ModeMap>
where
    I: Iterator<Item = ModeRaw>,
{
    let mut modes = ModeMap::new();
    for raw in iter {
        ensure!(raw.lifetime > 0, "Lifetime of mode {} must be greater than zero", raw.mode);
        let mode = Mode {
            id: ModeID::from(raw.mode),
            capacitated: raw.capacitated,
            lifetime: raw.lifetime,
            fuels: IndexMap::new(),
        };
        insert_unique(&mut modes, mode, "mode")?;
    }

    Ok(modes)
}

fn add_fuels_from_iter<I>(modes: &mut ModeMap, iter: I) -> Result<()>
where
    I: Iterator<Item = FuelRaw>,
{
    for raw in iter {
        let mode = modes
            .get_mut(raw.mode.as_str())
            .with_context(|| format!("Unknown mode {}", raw.mode))?;
        let fuel = Fuel {
            id: raw.fuel.into(),
            group: FuelGroupID::from(raw.fuel_group),
            novelty: raw.novelty,
        };
        ensure!(
            !mode.fuels.contains_key(&fuel.id),
            "Duplicate fuel {} for mode {}",
            fuel.id,
            mode.id
        );
        mode.fuels.insert(fuel.id.clone(), fuel);
    }

    for mode in modes.values() {
        ensure!(!mode.fuels.is_empty(), "No fuels defined for mode {}", mode.id);
    }

    Ok(())
}

/// The distinct fuel groups used by any mode, in order of first appearance
pub fn fuel_groups(modes: &ModeMap) -> Vec<FuelGroupID> {
    modes
        .values()
        .flat_map(|mode| mode.fuels.values().map(|fuel| fuel.group.clone()))
        .unique()
        .collect()
}
