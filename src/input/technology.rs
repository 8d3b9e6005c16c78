//! Code for reading technology readiness, phase-out and initial mix data from CSV files.
use super::*;
use crate::bass::BassModel;
use crate::mode::{FuelID, ModeID, ModeMap, Novelty};
use crate::technology::{Readiness, Technology};
use anyhow::bail;
use indexmap::IndexMap;
use serde::Deserialize;

const TECH_READINESS_FILE_NAME: &str = "tech_readiness.csv";
const PHASE_OUT_FILE_NAME: &str = "phase_out.csv";
const INIT_FUEL_MIX_FILE_NAME: &str = "init_fuel_mix.csv";
const INIT_MODE_MIX_FILE_NAME: &str = "init_mode_mix.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ReadinessRaw {
    mode: String,
    fuel: String,
    mature: bool,
    p: Option<f64>,
    q: Option<f64>,
    m: Option<f64>,
    t0: Option<f64>,
    p_q_variation: Option<f64>,
    t0_delay: Option<f64>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct PhaseOutRaw {
    mode: String,
    fuel: String,
    year: u32,
    restriction: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct InitFuelMixRaw {
    mode: String,
    fuel: String,
    max_transport_share: f64,
}

#[derive(PartialEq, Debug, Deserialize)]
struct InitModeMixRaw {
    mode: String,
    share: f64,
}

/// Read technology data.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes
/// * `parameters` - Model parameters
pub fn read_technology(
    model_dir: &Path,
    modes: &ModeMap,
    parameters: &ModelParameters,
) -> Result<Technology> {
    let readiness_path = model_dir.join(TECH_READINESS_FILE_NAME);
    let readiness = read_readiness_from_iter(read_csv(&readiness_path)?, modes)
        .with_context(|| input_err_msg(&readiness_path))?;

    let phase_out_path = model_dir.join(PHASE_OUT_FILE_NAME);
    let phase_out = read_csv_optional::<PhaseOutRaw>(&phase_out_path)?
        .map(|raw| {
            let key = mode_fuel(modes, &raw.mode, &raw.fuel)?;
            ensure!(
                (0.0..=1.0).contains(&raw.restriction),
                "Phase-out restriction for {}/{} in {} must be between 0 and 1",
                key.0,
                key.1,
                raw.year
            );
            Ok(((key.0, key.1, raw.year), raw.restriction))
        })
        .collect::<Result<IndexMap<_, _>>>()
        .with_context(|| input_err_msg(&phase_out_path))?;

    let fuel_mix_path = model_dir.join(INIT_FUEL_MIX_FILE_NAME);
    let init_fuel_share = read_csv_optional::<InitFuelMixRaw>(&fuel_mix_path)?
        .map(|raw| {
            let key = mode_fuel(modes, &raw.mode, &raw.fuel)?;
            ensure!(
                (0.0..=100.0).contains(&raw.max_transport_share),
                "Initial share of {}/{} must be a percentage",
                key.0,
                key.1
            );
            Ok((key, raw.max_transport_share))
        })
        .collect::<Result<IndexMap<_, _>>>()
        .with_context(|| input_err_msg(&fuel_mix_path))?;

    let mode_mix_path = model_dir.join(INIT_MODE_MIX_FILE_NAME);
    let init_mode_share = read_csv_optional::<InitModeMixRaw>(&mode_mix_path)?
        .map(|raw| {
            let mode = modes
                .get(raw.mode.as_str())
                .with_context(|| format!("Unknown mode {}", raw.mode))?;
            ensure!(
                (0.0..=1.0).contains(&raw.share),
                "Initial share of mode {} must be between 0 and 1",
                mode.id
            );
            Ok((mode.id.clone(), raw.share))
        })
        .collect::<Result<IndexMap<_, _>>>()
        .with_context(|| input_err_msg(&mode_mix_path))?;

    Ok(Technology {
        readiness,
        phase_out,
        init_fuel_share,
        init_mode_share,
        scenario_variation: parameters.bass_scenario_variation,
    })
}

/// Look up a mode-fuel pair, checking that both exist
fn mode_fuel(modes: &ModeMap, mode: &str, fuel: &str) -> Result<(ModeID, FuelID)> {
    let mode = modes
        .get(mode)
        .with_context(|| format!("Unknown mode {mode}"))?;
    let fuel = FuelID::from(fuel);
    ensure!(mode.has_fuel(&fuel), "Unknown fuel {fuel} for mode {}", mode.id);

    Ok((mode.id.clone(), fuel))
}

fn read_readiness_from_iter<I>(iter: I, modes: &ModeMap) -> Result<IndexMap<(ModeID, FuelID), Readiness>>
where
    I: Iterator<Item = ReadinessRaw>,
{
    let mut readiness = IndexMap::new();
    for raw in iter {
        let key = mode_fuel(modes, &raw.mode, &raw.fuel)?;
        let value = if raw.mature {
            Readiness::Mature
        } else {
            let (Some(p), Some(q), Some(m), Some(t0)) = (raw.p, raw.q, raw.m, raw.t0) else {
                bail!(
                    "Bass parameters p, q, m and t0 must be given for {}/{}",
                    key.0,
                    key.1
                );
            };
            let base = BassModel::new(p, q, m, t0)
                .with_context(|| format!("Invalid Bass parameters for {}/{}", key.0, key.1))?;
            Readiness::Diffusing {
                base,
                p_q_variation: raw.p_q_variation.unwrap_or(0.0),
                t0_delay: raw.t0_delay.unwrap_or(0.0),
            }
        };
        ensure!(
            readiness.insert(key.clone(), value).is_none(),
            "Duplicate readiness entry for {}/{}",
            key.0,
            key.1
        );
    }

    // New technologies need a diffusion curve
    for mode in modes.values() {
        for fuel in mode.fuels.values().filter(|f| f.novelty == Novelty::New) {
            ensure!(
                matches!(
                    readiness.get(&(mode.id.clone(), fuel.id.clone())),
                    Some(Readiness::Diffusing { .. })
                ),
                "No diffusion curve given for new technology {}/{}",
                mode.id,
                fuel.id
            );
        }
    }

    Ok(readiness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, modes};
    use rstest::rstest;

    fn raw(mode: &str, fuel: &str, mature: bool) -> ReadinessRaw {
        ReadinessRaw {
            mode: mode.to_string(),
            fuel: fuel.to_string(),
            mature,
            p: (!mature).then_some(0.03),
            q: (!mature).then_some(0.38),
            m: (!mature).then_some(100.0),
            t0: (!mature).then_some(2025.0),
            p_q_variation: None,
            t0_delay: None,
        }
    }

    #[rstest]
    fn test_read_readiness(modes: ModeMap) {
        let readiness = read_readiness_from_iter(
            [raw("Road", "Diesel", true), raw("Road", "Battery", false)].into_iter(),
            &modes,
        )
        .unwrap();
        assert_eq!(
            readiness[&("Road".into(), "Diesel".into())],
            Readiness::Mature
        );
        assert!(matches!(
            readiness[&("Road".into(), "Battery".into())],
            Readiness::Diffusing { .. }
        ));
    }

    #[rstest]
    fn test_read_readiness_missing_curve(modes: ModeMap) {
        assert_error!(
            read_readiness_from_iter([raw("Road", "Diesel", true)].into_iter(), &modes),
            "No diffusion curve given for new technology Road/Battery"
        );

        let mut incomplete = raw("Road", "Battery", false);
        incomplete.t0 = None;
        assert_error!(
            read_readiness_from_iter([incomplete].into_iter(), &modes),
            "Bass parameters p, q, m and t0 must be given for Road/Battery"
        );
    }

    #[rstest]
    fn test_mode_fuel(modes: ModeMap) {
        assert!(mode_fuel(&modes, "Road", "Battery").is_ok());
        assert_error!(mode_fuel(&modes, "Air", "Jet"), "Unknown mode Air");
        assert_error!(
            mode_fuel(&modes, "Rail", "Battery"),
            "Unknown fuel Battery for mode Rail"
        );
    }
}
