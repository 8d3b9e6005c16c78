//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::input::{deserialise_proportion, input_err_msg, is_sorted_and_unique, read_toml};
use crate::units::Dimensionless;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_unit_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            <$type>::new($value)
        }
    };
}

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_unit_param_default!(default_cvar_coeff, Dimensionless, 0.3);
define_unit_param_default!(default_cvar_alpha, Dimensionless, 0.8);
define_unit_param_default!(default_risk_free_rate, Dimensionless, 0.038);
define_unit_param_default!(default_empty_vehicle_factor, Dimensionless, 0.6);
define_param_default!(default_eur_to_nok, f64, 10.0);
define_param_default!(default_co2_fee_level, String, "base".to_string());
define_param_default!(default_balancing_trips, bool, true);
define_param_default!(default_mip_gap, f64, 0.005);
define_param_default!(default_feasibility_tolerance, f64, 1e-6);
define_param_default!(default_feas_relax, f64, 0.0);
define_param_default!(default_absolute_deviation, f64, 0.001);
define_param_default!(default_relative_deviation, f64, 0.0001);
define_param_default!(default_rho_star, f64, 0.975);
define_param_default!(default_avg_truck_payload, f64, 13.0);
define_param_default!(default_cost_big_m, f64, 1e8);
define_param_default!(default_co2_penalty, f64, 10_000.0);
define_param_default!(default_first_last_mile_mode, String, "Road".to_string());
define_param_default!(default_ev_scenario_name, String, "BBB".to_string());
define_param_default!(default_max_path_legs, u32, 4);
define_param_default!(default_max_path_modes, u32, 2);

/// The relative emission cap, as a percentage of first-period emissions, at various years
fn default_emission_cap_relative() -> Vec<EmissionCapStep> {
    [
        (2023, 100.0),
        (2026, 72.5),
        (2028, 60.0),
        (2030, 45.0),
        (2034, 40.0),
        (2040, 25.0),
        (2050, 10.0),
    ]
    .into_iter()
    .map(|(year, percent)| EmissionCapStep { year, percent })
    .collect()
}

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
pub struct ModelParameters {
    /// Which analysis to run
    #[serde(default)]
    pub analysis_type: AnalysisType,
    /// The form of the objective function
    #[serde(default)]
    pub objective: ObjectiveKind,
    /// Weight given to CVaR in the mean-CVaR objective (lambda)
    #[serde(default = "default_cvar_coeff")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub cvar_coeff: Dimensionless,
    /// Tail-probability threshold for CVaR (alpha)
    #[serde(default = "default_cvar_alpha")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub cvar_alpha: Dimensionless,
    /// Social discount rate
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Dimensionless,
    /// Conversion rate from EUR to NOK
    #[serde(default = "default_eur_to_nok")]
    pub eur_to_nok: f64,
    /// Which level of the CO2 fee schedule to use
    #[serde(default = "default_co2_fee_level")]
    pub co2_fee_level: String,
    /// Cost and emission factor applied to empty (balancing) vehicle trips
    #[serde(default = "default_empty_vehicle_factor")]
    #[serde(deserialize_with = "deserialise_proportion")]
    pub empty_vehicle_factor: Dimensionless,
    /// Whether to model empty vehicle trips needed to balance fleets
    #[serde(default = "default_balancing_trips")]
    pub balancing_trips: bool,
    /// Disallow all infrastructure investments
    #[serde(default)]
    pub no_investments: bool,
    /// Relative MIP gap passed to the solver
    #[serde(default = "default_mip_gap")]
    pub mip_gap: f64,
    /// Primal feasibility tolerance passed to the solver
    #[serde(default = "default_feasibility_tolerance")]
    pub feasibility_tolerance: f64,
    /// Time limit for each solve, in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,
    /// Additive slack on relaxed inequality constraints
    #[serde(default = "default_feas_relax")]
    pub feas_relax: f64,
    /// Tolerance band on equality-like constraints and cutoff below which demand is ignored
    #[serde(default = "default_absolute_deviation")]
    pub absolute_deviation: f64,
    /// Relative band used when bounding emissions to a reference solution
    #[serde(default = "default_relative_deviation")]
    pub relative_deviation: f64,
    /// Modal shift speed parameter
    #[serde(default = "default_rho_star")]
    pub rho_star: f64,
    /// Average truck payload in tonnes, used to normalise charging costs
    #[serde(default = "default_avg_truck_payload")]
    pub avg_truck_payload: f64,
    /// Cost assigned to mode/product combinations that have no vehicle type
    #[serde(default = "default_cost_big_m")]
    pub cost_big_m: f64,
    /// Whether to cap emissions relative to the first period
    #[serde(default)]
    pub emission_cap: bool,
    /// Emission cap schedule (percent of first-period emissions), interpolated between years
    #[serde(default = "default_emission_cap_relative")]
    pub emission_cap_relative: Vec<EmissionCapStep>,
    /// Penalty for exceeding the emission cap (NOK per tonne CO2)
    #[serde(default = "default_co2_penalty")]
    pub co2_penalty: f64,
    /// Whether Bass diffusion parameters vary with the scenario
    #[serde(default)]
    pub bass_scenario_variation: bool,
    /// Mode used for first- and last-mile transport
    #[serde(default = "default_first_last_mile_mode")]
    pub first_last_mile_mode: String,
    /// Name of the synthesised expected-value scenario
    #[serde(default = "default_ev_scenario_name")]
    pub ev_scenario_name: String,
    /// Restrict operational constraints to a single year
    #[serde(default)]
    pub single_time_period: Option<u32>,
    /// Solve a first-period-only model first and use it to bound the first period
    #[serde(default)]
    pub solve_init_model: bool,
    /// Maximum number of legs for generated paths
    #[serde(default = "default_max_path_legs")]
    pub max_path_legs: u32,
    /// Maximum number of distinct modes on a generated path
    #[serde(default = "default_max_path_modes")]
    pub max_path_modes: u32,
}

/// A step in the relative emission cap schedule
#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
pub struct EmissionCapStep {
    /// The year
    pub year: u32,
    /// Percentage of first-period emissions allowed
    pub percent: f64,
}

/// The analysis to run
#[derive(
    DeserializeLabeledStringEnum, SerializeLabeledStringEnum, Debug, PartialEq, Default, Clone, Copy,
)]
pub enum AnalysisType {
    /// Full two-stage stochastic program
    #[default]
    #[string = "sp"]
    StochasticProgram,
    /// Deterministic expected-value problem
    #[string = "ev"]
    ExpectedValue,
    /// Expected result of using the expected-value solution
    #[string = "eev"]
    ExpectedResultOfExpectedValue,
    /// Stochastic program warm-started from the EEV solution
    #[string = "sp_warm_start"]
    StochasticProgramWarmStart,
}

/// The form of the objective function
#[derive(
    DeserializeLabeledStringEnum, SerializeLabeledStringEnum, Debug, PartialEq, Default, Clone, Copy,
)]
pub enum ObjectiveKind {
    /// Mean-CVaR risk-averse objective
    #[default]
    #[string = "mean_cvar"]
    MeanCvar,
    /// Expected cost
    #[string = "risk_neutral"]
    RiskNeutral,
}

/// Check that a parameter is a finite, non-negative number
fn check_non_negative(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "{name} must be a finite number greater than or equal to zero"
    );

    Ok(())
}

/// Check that a parameter is a finite number greater than zero
fn check_positive(name: &str, value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value > 0.0,
        "{name} must be a finite number greater than zero"
    );

    Ok(())
}

/// Check that `cvar_alpha` leaves a non-empty tail
fn check_cvar_alpha(value: Dimensionless) -> Result<()> {
    ensure!(value.value() < 1.0, "cvar_alpha must be less than one");

    Ok(())
}

/// Check that the modal shift parameter is in (0, 1]
fn check_rho_star(value: f64) -> Result<()> {
    ensure!(
        value > 0.0 && value <= 1.0,
        "rho_star must be greater than zero and at most one"
    );

    Ok(())
}

/// Check that the emission cap schedule is non-empty and ordered
fn check_emission_cap_relative(steps: &[EmissionCapStep]) -> Result<()> {
    ensure!(!steps.is_empty(), "`emission_cap_relative` is empty");

    let years: Vec<u32> = steps.iter().map(|step| step.year).collect();
    ensure!(
        is_sorted_and_unique(&years),
        "`emission_cap_relative` years must be composed of unique values in order"
    );

    for step in steps {
        check_non_negative("emission_cap_relative percent", step.percent)?;
    }

    Ok(())
}

/// Check the path generation bounds
fn check_path_bounds(max_path_legs: u32, max_path_modes: u32) -> Result<()> {
    ensure!(max_path_legs > 0, "max_path_legs cannot be zero");
    ensure!(max_path_modes > 0, "max_path_modes cannot be zero");

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        // cvar_coeff and empty_vehicle_factor already validated with deserialise_proportion
        check_cvar_alpha(self.cvar_alpha)?;

        check_non_negative("risk_free_rate", self.risk_free_rate.value())?;
        check_positive("eur_to_nok", self.eur_to_nok)?;
        check_positive("mip_gap", self.mip_gap)?;
        check_positive("feasibility_tolerance", self.feasibility_tolerance)?;
        if let Some(time_limit) = self.time_limit {
            check_positive("time_limit", time_limit)?;
        }
        check_non_negative("feas_relax", self.feas_relax)?;
        check_non_negative("absolute_deviation", self.absolute_deviation)?;
        check_non_negative("relative_deviation", self.relative_deviation)?;
        check_rho_star(self.rho_star)?;
        check_positive("avg_truck_payload", self.avg_truck_payload)?;
        check_positive("cost_big_m", self.cost_big_m)?;
        check_non_negative("co2_penalty", self.co2_penalty)?;
        check_emission_cap_relative(&self.emission_cap_relative)?;
        check_path_bounds(self.max_path_legs, self.max_path_modes)?;
        ensure!(
            !self.ev_scenario_name.is_empty(),
            "ev_scenario_name cannot be empty"
        );

        Ok(())
    }

    /// The relative emission cap (in percent) at `year`.
    ///
    /// Linearly interpolated between the years of the schedule and held constant outside them.
    pub fn emission_cap_percent(&self, year: u32) -> f64 {
        interpolate_steps(&self.emission_cap_relative, year)
    }
}

/// Linear interpolation over an ordered, non-empty schedule, clamped at both ends
fn interpolate_steps(steps: &[EmissionCapStep], year: u32) -> f64 {
    let Some(first) = steps.first() else {
        return 100.0;
    };
    if year <= first.year {
        return first.percent;
    }

    for (lo, hi) in steps.iter().zip(steps.iter().skip(1)) {
        if year <= hi.year {
            let frac = f64::from(year - lo.year) / f64::from(hi.year - lo.year);
            return lo.percent + frac * (hi.percent - lo.percent);
        }
    }

    steps.last().map_or(first.percent, |last| last.percent)
}
