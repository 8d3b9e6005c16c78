//! The scenario tree: scenarios, their probabilities and the fuel-group cost trajectories they
//! follow in the second stage.
use crate::id::{define_id_getter, define_id_type};
use crate::mode::{FuelGroupID, FuelID, ModeID};
use crate::product::ProductClassID;
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::collections::HashMap;
use std::fmt;

define_id_type! {ScenarioID}

/// A map of [`Scenario`]s, keyed by scenario ID
pub type ScenarioMap = IndexMap<ScenarioID, Scenario>;

/// The cost trajectory a fuel group follows in a scenario
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, DeserializeLabeledStringEnum)]
pub enum CostPath {
    /// Benchmark development
    #[string = "B"]
    Base,
    /// Faster, cheaper development
    #[string = "O"]
    Optimistic,
    /// Slower, more expensive development
    #[string = "P"]
    Pessimistic,
}

impl fmt::Display for CostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CostPath::Base => "B",
            CostPath::Optimistic => "O",
            CostPath::Pessimistic => "P",
        };
        write!(f, "{label}")
    }
}

/// A leaf of the scenario tree
#[derive(PartialEq, Debug, Clone)]
pub struct Scenario {
    /// Unique identifier for the scenario
    pub id: ScenarioID,
    /// Probability of the scenario
    pub probability: Dimensionless,
    /// The cost path followed by each fuel group
    pub fuel_group_paths: IndexMap<FuelGroupID, CostPath>,
}
define_id_getter! {Scenario, ScenarioID}

impl Scenario {
    /// The cost path followed by a fuel group (the base path if not listed)
    pub fn cost_path(&self, fuel_group: &FuelGroupID) -> CostPath {
        self.fuel_group_paths
            .get(fuel_group)
            .copied()
            .unwrap_or(CostPath::Base)
    }
}

/// Key for a cost factor series: (cost path, mode, product class, fuel)
pub type CostFactorKey = (CostPath, ModeID, ProductClassID, FuelID);

/// Cost factor time series, linearly interpolated between the given years
#[derive(PartialEq, Debug, Clone, Default)]
pub struct CostFactors(HashMap<CostFactorKey, Vec<(u32, f64)>>);

impl CostFactors {
    /// Create from raw (key, year, factor) entries
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (CostFactorKey, u32, f64)>,
    {
        let mut map: HashMap<CostFactorKey, Vec<(u32, f64)>> = HashMap::new();
        for (key, year, factor) in entries {
            ensure!(
                factor.is_finite() && factor >= 0.0,
                "Cost factor for {} {}/{}/{} in {year} must be a non-negative number",
                key.0,
                key.1,
                key.2,
                key.3
            );
            map.entry(key).or_default().push((year, factor));
        }

        for (key, series) in &mut map {
            series.sort_by_key(|(year, _)| *year);
            ensure!(
                series.windows(2).all(|w| w[0].0 < w[1].0),
                "Duplicate year in cost factors for {} {}/{}/{}",
                key.0,
                key.1,
                key.2,
                key.3
            );
        }

        Ok(Self(map))
    }

    /// Whether a series exists for the given key
    pub fn contains(&self, key: &CostFactorKey) -> bool {
        self.0.contains_key(key)
    }

    /// The cost factor for a key at `year`, interpolated and clamped at the ends of the series
    pub fn get(&self, key: &CostFactorKey, year: u32) -> Option<f64> {
        let series = self.0.get(key)?;
        let (first_year, first_value) = *series.first()?;
        if year <= first_year {
            return Some(first_value);
        }

        for (&(lo_year, lo), &(hi_year, hi)) in series.iter().zip(series.iter().skip(1)) {
            if year <= hi_year {
                let frac = f64::from(year - lo_year) / f64::from(hi_year - lo_year);
                return Some(lo + frac * (hi - lo));
            }
        }

        series.last().map(|(_, value)| *value)
    }
}

/// The complete scenario tree with cost factor data
#[derive(PartialEq, Debug, Clone)]
pub struct ScenarioInfo {
    /// All scenarios, in input order
    pub scenarios: ScenarioMap,
    /// Cost factor series for each cost path
    pub cost_factors: CostFactors,
    /// The synthesised expected-value scenario
    pub expected_value: Scenario,
}

impl ScenarioInfo {
    /// Create the scenario tree.
    ///
    /// `ev_scenario_name` names the synthesised expected-value scenario, which follows the base
    /// path for every fuel group and has probability one.
    pub fn new(
        scenarios: ScenarioMap,
        cost_factors: CostFactors,
        fuel_groups: &[FuelGroupID],
        ev_scenario_name: &str,
    ) -> Result<Self> {
        ensure!(!scenarios.is_empty(), "At least one scenario must be given");
        check_probabilities(scenarios.values())?;

        let expected_value = Scenario {
            id: ev_scenario_name.into(),
            probability: Dimensionless(1.0),
            fuel_group_paths: fuel_groups
                .iter()
                .map(|fg| (fg.clone(), CostPath::Base))
                .collect(),
        };

        Ok(Self {
            scenarios,
            cost_factors,
            expected_value,
        })
    }

    /// Iterate over the scenarios
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    /// The number of scenarios
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Whether there are no scenarios
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Look up a scenario by ID, including the expected-value scenario
    pub fn get(&self, id: &ScenarioID) -> Option<&Scenario> {
        if *id == self.expected_value.id {
            return Some(&self.expected_value);
        }
        self.scenarios.get(id)
    }

    /// The cost paths in use by some scenario (always including the base path)
    pub fn iter_cost_paths(&self) -> impl Iterator<Item = CostPath> {
        let mut paths = vec![CostPath::Base];
        for scenario in self.scenarios.values() {
            for path in scenario.fuel_group_paths.values() {
                if !paths.contains(path) {
                    paths.push(*path);
                }
            }
        }

        paths.into_iter()
    }

    /// The cost factor applying to a mode-fuel-product class in a scenario and year
    pub fn cost_factor(
        &self,
        scenario: &Scenario,
        fuel_group: &FuelGroupID,
        mode: &ModeID,
        product_class: &ProductClassID,
        fuel: &FuelID,
        year: u32,
    ) -> Result<f64> {
        let path = scenario.cost_path(fuel_group);
        let key = (path, mode.clone(), product_class.clone(), fuel.clone());
        self.cost_factors.get(&key, year).with_context(|| {
            format!("Missing cost factors for path {path}, mode {mode}, product class {product_class}, fuel {fuel}")
        })
    }
}

/// Check that scenario probabilities sum to one
pub fn check_probabilities<'a, I>(scenarios: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Scenario>,
{
    let total: f64 = scenarios.into_iter().map(|s| s.probability.value()).sum();
    ensure!(
        (total - 1.0).abs() < 1e-6,
        "Scenario probabilities must sum to one (sum is {total})"
    );

    Ok(())
}

/// Equal probabilities for `n` scenarios
pub fn equal_probability(n: usize) -> Dimensionless {
    Dimensionless(1.0 / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, scenario_info};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    fn key(path: CostPath) -> CostFactorKey {
        (path, "Road".into(), "Dry bulk".into(), "Battery".into())
    }

    #[rstest]
    #[case(2020, 1.0)] // Before the series
    #[case(2034, 0.8)]
    #[case(2037, 0.75)]
    #[case(2040, 0.7)]
    #[case(2060, 0.7)] // After the series
    fn test_cost_factor_interpolation(#[case] year: u32, #[case] expected: f64) {
        let factors = CostFactors::new([
            (key(CostPath::Optimistic), 2040, 0.7),
            (key(CostPath::Optimistic), 2022, 1.0),
            (key(CostPath::Optimistic), 2034, 0.8),
        ])
        .unwrap();
        assert_approx_eq!(
            f64,
            factors.get(&key(CostPath::Optimistic), year).unwrap(),
            expected,
            epsilon = 1e-12
        );
        assert!(factors.get(&key(CostPath::Base), year).is_none());
    }

    #[test]
    fn test_cost_factor_duplicate_year() {
        assert_error!(
            CostFactors::new([(key(CostPath::Base), 2022, 1.0), (key(CostPath::Base), 2022, 1.1)]),
            "Duplicate year in cost factors for B Road/Dry bulk/Battery"
        );
    }

    #[rstest]
    fn test_probability_conservation(scenario_info: ScenarioInfo) {
        assert!(check_probabilities(scenario_info.iter()).is_ok());
        let total: f64 = scenario_info.iter().map(|s| s.probability.value()).sum();
        assert_approx_eq!(f64, total, 1.0, epsilon = 1e-12);

        let n = scenario_info.len();
        let probability = equal_probability(n);
        assert_approx_eq!(f64, probability.value() * n as f64, 1.0, epsilon = 1e-12);
    }

    #[rstest]
    fn test_expected_value_scenario(scenario_info: ScenarioInfo) {
        let ev = &scenario_info.expected_value;
        assert_eq!(ev.id, "BBB".into());
        assert_eq!(ev.probability, Dimensionless(1.0));
        assert!(ev.fuel_group_paths.values().all(|p| *p == CostPath::Base));
        assert_eq!(scenario_info.get(&"BBB".into()), Some(ev));
        assert_eq!(scenario_info.iter_cost_paths().next(), Some(CostPath::Base));
    }

    #[test]
    fn test_bad_probabilities() {
        let scenario = |id: &str, probability| Scenario {
            id: id.into(),
            probability: Dimensionless(probability),
            fuel_group_paths: IndexMap::new(),
        };
        let scenarios: ScenarioMap = [scenario("A", 0.5), scenario("B", 0.2)]
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        assert_error!(
            ScenarioInfo::new(scenarios, CostFactors::default(), &[], "BBB"),
            "Scenario probabilities must sum to one (sum is 0.7)"
        );
    }
}
