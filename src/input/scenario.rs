//! Code for reading the scenario tree and cost factors from CSV files.
use super::*;
use crate::input::mode::fuel_groups;
use crate::mode::{FuelGroupID, ModeMap};
use crate::scenario::{
    CostFactorKey, CostFactors, CostPath, Scenario, ScenarioID, ScenarioInfo, ScenarioMap,
    equal_probability,
};
use float_cmp::approx_eq;
use indexmap::IndexMap;
use log::warn;
use serde::Deserialize;

const SCENARIOS_FILE_NAME: &str = "scenarios.csv";
const FUEL_GROUP_PATHS_FILE_NAME: &str = "scenario_fuel_group_paths.csv";
const COST_FACTORS_FILE_NAME: &str = "cost_factors.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ScenarioRaw {
    scenario: String,
    probability: Option<f64>,
}

#[derive(PartialEq, Debug, Deserialize)]
struct FuelGroupPathRaw {
    scenario: String,
    fuel_group: String,
    path: CostPath,
}

#[derive(PartialEq, Debug, Deserialize)]
struct CostFactorRaw {
    path: CostPath,
    year: u32,
    mode: String,
    product_class: String,
    fuel: String,
    cost_factor: f64,
}

/// Read the scenario tree.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes, for validating fuel groups and cost factors
/// * `parameters` - Model parameters
///
/// # Returns
///
/// The scenarios, their cost factor data and the expected-value scenario, or an error
pub fn read_scenarios(
    model_dir: &Path,
    modes: &ModeMap,
    parameters: &ModelParameters,
) -> Result<ScenarioInfo> {
    let groups = fuel_groups(modes);

    let scenarios_path = model_dir.join(SCENARIOS_FILE_NAME);
    let mut scenarios = read_scenarios_from_iter(read_csv(&scenarios_path)?)
        .with_context(|| input_err_msg(&scenarios_path))?;

    let paths_path = model_dir.join(FUEL_GROUP_PATHS_FILE_NAME);
    add_fuel_group_paths(&mut scenarios, read_csv(&paths_path)?, &groups)
        .with_context(|| input_err_msg(&paths_path))?;

    let factors_path = model_dir.join(COST_FACTORS_FILE_NAME);
    let cost_factors = read_cost_factors_from_iter(read_csv(&factors_path)?, modes)
        .with_context(|| input_err_msg(&factors_path))?;

    ScenarioInfo::new(scenarios, cost_factors, &groups, &parameters.ev_scenario_name)
        .with_context(|| input_err_msg(&scenarios_path))
}

fn read_scenarios_from_iter<I>(iter: I) -> Result<ScenarioMap>
where
    I: Iterator<Item = ScenarioRaw>,
{
    let raw = iter.collect_vec();
    let given = raw.iter().filter(|s| s.probability.is_some()).count();
    ensure!(
        given == 0 || given == raw.len(),
        "Probabilities must be given for all scenarios or for none"
    );

    let default_probability = equal_probability(raw.len());
    let mut scenarios = ScenarioMap::new();
    for s in raw {
        let probability = s.probability.map_or(default_probability, Dimensionless);
        ensure!(
            probability.is_finite() && (0.0..=1.0).contains(&probability.value()),
            "Probability of scenario {} must be between 0 and 1",
            s.scenario
        );
        let scenario = Scenario {
            id: ScenarioID::from(s.scenario),
            probability,
            fuel_group_paths: IndexMap::new(),
        };
        insert_unique(&mut scenarios, scenario, "scenario")?;
    }

    // The objective weights scenarios equally
    if scenarios
        .values()
        .any(|s| !approx_eq!(f64, s.probability.value(), default_probability.value(), epsilon = 1e-9))
    {
        warn!("Scenario probabilities are not uniform, but the objective weights scenarios equally");
    }

    Ok(scenarios)
}

fn add_fuel_group_paths<I>(
    scenarios: &mut ScenarioMap,
    iter: I,
    fuel_groups: &[FuelGroupID],
) -> Result<()>
where
    I: Iterator<Item = FuelGroupPathRaw>,
{
    for raw in iter {
        let scenario = scenarios
            .get_mut(raw.scenario.as_str())
            .with_context(|| format!("Unknown scenario {}", raw.scenario))?;
        let group = FuelGroupID::from(raw.fuel_group);
        ensure!(fuel_groups.contains(&group), "Unknown fuel group {group}");
        ensure!(
            scenario.fuel_group_paths.insert(group.clone(), raw.path).is_none(),
            "Duplicate path for fuel group {group} in scenario {}",
            scenario.id
        );
    }

    for scenario in scenarios.values() {
        let missing = fuel_groups
            .iter()
            .filter(|g| !scenario.fuel_group_paths.contains_key(*g))
            .collect_vec();
        ensure!(
            missing.is_empty(),
            "Scenario {} has no path for fuel groups: {}",
            scenario.id,
            format_items_with_cap(missing)
        );
    }

    Ok(())
}

fn read_cost_factors_from_iter<I>(iter: I, modes: &ModeMap) -> Result<CostFactors>
where
    I: Iterator<Item = CostFactorRaw>,
{
    let entries: Vec<(CostFactorKey, u32, f64)> = iter
        .map(|raw| {
            let mode = modes
                .get(raw.mode.as_str())
                .with_context(|| format!("Unknown mode {}", raw.mode))?;
            ensure!(
                mode.fuels.contains_key(raw.fuel.as_str()),
                "Unknown fuel {} for mode {}",
                raw.fuel,
                mode.id
            );
            let key = (
                raw.path,
                mode.id.clone(),
                raw.product_class.into(),
                raw.fuel.into(),
            );
            Ok((key, raw.year, raw.cost_factor))
        })
        .collect::<Result<_>>()?;

    CostFactors::new(entries)
}
