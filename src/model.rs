//! The model represents the static input data provided by the user.
use crate::cost::CostTables;
use crate::demand::DemandMap;
use crate::infrastructure::Infrastructure;
use crate::mode::ModeMap;
use crate::network::Network;
use crate::path::PathCatalog;
use crate::product::{ProductMap, VehicleTypeMap};
use crate::scenario::ScenarioInfo;
use crate::technology::Technology;
use crate::time_period::TimePeriods;
use std::path::PathBuf;

pub mod parameters;
pub use parameters::{AnalysisType, ModelParameters, ObjectiveKind};

/// Scaling factor applied to monetary values (NOK)
pub const SCALE_MON: f64 = 1e9;

/// Scaling factor applied to weights (tonnes)
pub const SCALE_W: f64 = 1e6;

/// Scaling factor applied to emissions (grams CO2)
pub const SCALE_EMIS: f64 = 1e8;

/// Number of decimal places that derived coefficients are rounded to
pub const PRECISION_DIGITS: i32 = 5;

/// Round a coefficient to [`PRECISION_DIGITS`] decimal places
pub fn round_precision(value: f64) -> f64 {
    let factor = 10f64.powi(PRECISION_DIGITS);
    (value * factor).round() / factor
}

/// Model definition
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// Transport modes and the fuels they can use
    pub modes: ModeMap,
    /// Products and their classes
    pub products: ProductMap,
    /// Vehicle types, each serving one product class on one mode
    pub vehicle_types: VehicleTypeMap,
    /// Decision years and their stages
    pub time_periods: TimePeriods,
    /// Nodes, edges and arcs
    pub network: Network,
    /// Catalogue of origin-destination paths
    pub paths: PathCatalog,
    /// Whether the path catalogue was generated rather than read from the model directory
    pub generated_paths: bool,
    /// Transport demand
    pub demand: DemandMap,
    /// Transport, emission, transfer and charging cost coefficients
    pub costs: CostTables,
    /// Capacity, investment and charging infrastructure data
    pub infrastructure: Infrastructure,
    /// Technology readiness, phase-out and initial mix data
    pub technology: Technology,
    /// The scenario tree
    pub scenarios: ScenarioInfo,
}

impl Model {
    /// Iterate over the model's decision years
    pub fn iter_years(&self) -> impl Iterator<Item = u32> + '_ {
        self.time_periods.iter_years()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    #[case(1.234_567_89, 1.234_57)]
    #[case(-0.000_004, 0.0)]
    #[case(12.0, 12.0)]
    fn test_round_precision(#[case] value: f64, #[case] expected: f64) {
        assert_approx_eq!(f64, round_precision(value), expected);
    }
}
