//! Functionality for running the stochastic, expected-value and related analyses.
use crate::index_sets::ModelBuildContext;
use crate::model::{AnalysisType, Model};
use crate::optimisation::{SolverOptions, TransportModel};
use crate::output::DataWriter;
use crate::scenario::ScenarioID;
use anyhow::{Context, Result};
use log::info;
use std::path::Path;

/// Feasibility tolerance for the expected-value solve whose first stage is reused
const EV_FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Feasibility tolerance for re-solving the stochastic program from the EEV solution
const WARM_START_FEASIBILITY_TOLERANCE: f64 = 1e-2;

/// First- and second-stage cost of one scenario in a solution
#[derive(PartialEq, Debug, Clone)]
pub struct ScenarioCosts {
    /// The scenario
    pub scenario: ScenarioID,
    /// Total discounted cost of the first-stage years
    pub first_stage: f64,
    /// Total discounted cost of the second-stage years
    pub second_stage: f64,
}

/// The outcome of solving one model
#[derive(PartialEq, Debug, Clone)]
pub struct SolveSummary {
    /// The analysis the model was solved for (`sp`, `ev` or `eev`)
    pub analysis: &'static str,
    /// The optimal objective value
    pub objective: f64,
    /// Stage costs of each scenario
    pub scenario_costs: Vec<ScenarioCosts>,
}

impl SolveSummary {
    fn new(analysis: &'static str, transport: &TransportModel) -> Result<Self> {
        let objective = transport
            .solution()
            .context("The model has not been solved")?
            .objective();
        let scenario_costs = transport
            .iter_stage_costs()
            .map(|(scenario, first_stage, second_stage)| ScenarioCosts {
                scenario: scenario.clone(),
                first_stage,
                second_stage,
            })
            .collect();

        Ok(Self {
            analysis,
            objective,
            scenario_costs,
        })
    }
}

/// The results of an analysis
pub struct AnalysisResults<'a> {
    /// Summaries of the models solved, in the order they were solved
    pub summaries: Vec<SolveSummary>,
    /// The last model solved
    pub final_model: TransportModel<'a>,
}

impl AnalysisResults<'_> {
    /// The summary of the named analysis, if it was run
    pub fn summary(&self, analysis: &str) -> Option<&SolveSummary> {
        self.summaries
            .iter()
            .rev()
            .find(|summary| summary.analysis == analysis)
    }

    /// The value of the stochastic solution (EEV minus SP), if both were solved
    pub fn value_of_stochastic_solution(&self) -> Option<f64> {
        Some(self.summary("eev")?.objective - self.summary("sp")?.objective)
    }
}

/// Run the analysis named in the model parameters and write the results.
///
/// # Arguments:
///
/// * `model` - The model to run
/// * `output_path` - The folder to which output files will be written
/// * `debug_model` - Whether to write the constraints of the final model to file
pub fn run(model: &Model, output_path: &Path, debug_model: bool) -> Result<()> {
    let mut writer = DataWriter::create(output_path, model, debug_model)?;
    if model.generated_paths {
        writer.write_generated_paths(model)?;
    }

    let results = run_analysis(model)?;
    if let Some(vss) = results.value_of_stochastic_solution() {
        info!("Value of the stochastic solution: {vss}");
    }

    writer.write_summaries(&results.summaries)?;
    writer.write_solution(&results.final_model)?;
    writer.write_debug_info(&results.final_model)?;
    writer.flush()
}

/// Build and solve the models needed by the analysis named in the model parameters
pub fn run_analysis(model: &Model) -> Result<AnalysisResults<'_>> {
    let options = SolverOptions::from_parameters(&model.parameters);
    let init = if model.parameters.solve_init_model {
        Some(solve_init_model(model, &options)?)
    } else {
        None
    };
    let init = init.as_ref();

    let mut summaries = Vec::new();
    let final_model = match model.parameters.analysis_type {
        AnalysisType::StochasticProgram => {
            let ctx = ModelBuildContext::all_scenarios(model)?;
            let mut sp = build_model(model, &ctx, init)?;
            summaries.push(solve(&mut sp, &options, "sp")?);
            sp
        }
        AnalysisType::ExpectedValue => {
            let ctx = ModelBuildContext::expected_value(model)?;
            let mut ev = build_model(model, &ctx, init)?;
            summaries.push(solve(&mut ev, &options, "ev")?);
            ev
        }
        AnalysisType::ExpectedResultOfExpectedValue => {
            let (eev, ev_summary, eev_summary) = solve_eev(model, init, &options)?;
            summaries.extend([ev_summary, eev_summary]);
            eev
        }
        AnalysisType::StochasticProgramWarmStart => {
            let (mut sp, ev_summary, eev_summary) = solve_eev(model, init, &options)?;
            summaries.extend([ev_summary, eev_summary]);

            sp.unfix_first_stage();
            let warm_options = options
                .with_feasibility_tolerance(WARM_START_FEASIBILITY_TOLERANCE)
                .for_warm_start();
            summaries.push(solve(&mut sp, &warm_options, "sp")?);
            sp
        }
    };

    Ok(AnalysisResults {
        summaries,
        final_model,
    })
}

/// Solve the base-year model whose emissions bound the first period of the main model
pub fn solve_init_model<'a>(model: &'a Model, options: &SolverOptions) -> Result<TransportModel<'a>> {
    info!("Solving the first-period model");
    let ctx = ModelBuildContext::first_period(model);
    let mut init = TransportModel::build(model, &ctx)?;
    init.solve(options)
        .context("Failed to solve the first-period model")?;

    Ok(init)
}

/// Solve the expected-value model, then every scenario with its first stage fixed to the EV
/// solution.
///
/// Returns the EEV model along with the summaries of both solves.
fn solve_eev<'a>(
    model: &'a Model,
    init: Option<&TransportModel>,
    options: &SolverOptions,
) -> Result<(TransportModel<'a>, SolveSummary, SolveSummary)> {
    let ctx = ModelBuildContext::expected_value(model)?;
    let mut ev = build_model(model, &ctx, init)?;
    let ev_options = options.with_feasibility_tolerance(EV_FEASIBILITY_TOLERANCE);
    let ev_summary = solve(&mut ev, &ev_options, "ev")?;

    let ctx = ModelBuildContext::all_scenarios(model)?;
    let mut eev = build_model(model, &ctx, init)?;
    eev.fix_first_stage(&ev)?;
    let eev_summary = solve(&mut eev, options, "eev")?;

    Ok((eev, ev_summary, eev_summary))
}

fn build_model<'a>(
    model: &'a Model,
    ctx: &ModelBuildContext,
    init: Option<&TransportModel>,
) -> Result<TransportModel<'a>> {
    let mut transport = TransportModel::build(model, ctx)?;
    if let Some(init) = init {
        transport.fix_first_time_period(init)?;
    }

    Ok(transport)
}

fn solve(
    transport: &mut TransportModel,
    options: &SolverOptions,
    analysis: &'static str,
) -> Result<SolveSummary> {
    info!("Solving the {analysis} model");
    transport
        .solve(options)
        .with_context(|| format!("Failed to solve the {analysis} model"))?;

    SolveSummary::new(analysis, transport)
}
