//! Code for building and solving the two-stage stochastic transport model.
//!
//! A [`TransportModel`] is built for one set of active scenarios and decision years. Once built,
//! it can be solved any number of times, with the bounds of its first-stage variables tightened
//! or released in between (see the `fixing` module).
use crate::index_sets::{IndexSets, ModelBuildContext};
use crate::log::LOG_LEVEL_ENV_VAR;
use crate::model::{Model, ModelParameters};
use crate::scenario::ScenarioID;
use anyhow::{Context, Result};
use highs::{HighsModelStatus, HighsStatus};
use log::{error, info, warn};
use std::error::Error;
use std::fmt;

mod constraints;
use constraints::{ConstraintContext, add_model_constraints};
mod fixing;
mod objective;
pub mod problem;
use problem::{Problem, Variable};
pub mod variables;
use variables::Variables;

/// Slack below which a row of the elastic problem counts as satisfied
const ELASTIC_SLACK_TOLERANCE: f64 = 1e-6;

/// Scaling strategy used when the numerics of the problem need more care
const NUMERIC_FOCUS_SCALE_STRATEGY: i32 = 3;

/// Effort spent on primal heuristics when warm-starting from a previous solution
const WARM_START_HEURISTIC_EFFORT: f64 = 0.3;

/// An error from the solver
#[derive(Debug, Clone)]
pub enum ModelError {
    /// The model definition is incoherent.
    ///
    /// Users should not be able to trigger this error.
    Incoherent(HighsStatus),
    /// The model is infeasible. The violated constraints have been logged.
    Infeasible,
    /// An optimal solution could not be found
    NonOptimal(HighsModelStatus),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Incoherent(status) => write!(f, "Incoherent model: {status:?}"),
            ModelError::Infeasible => write!(f, "The model is infeasible"),
            ModelError::NonOptimal(status) => {
                write!(f, "Could not find optimal result: {status:?}")
            }
        }
    }
}

impl Error for ModelError {}

/// Options passed through to the solver
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct SolverOptions {
    /// Primal feasibility tolerance
    pub feasibility_tolerance: f64,
    /// Relative MIP gap at which to stop
    pub mip_gap: f64,
    /// Time limit in seconds
    pub time_limit: Option<f64>,
    /// Use more conservative scaling
    pub numeric_focus: bool,
    /// Pass the model's start vector (see [`TransportModel::start`]) to the solver and spend
    /// more effort on heuristics seeded by it
    pub warm_start: bool,
}

impl SolverOptions {
    /// Options taken from the model parameters
    pub fn from_parameters(parameters: &ModelParameters) -> Self {
        Self {
            feasibility_tolerance: parameters.feasibility_tolerance,
            mip_gap: parameters.mip_gap,
            time_limit: parameters.time_limit,
            numeric_focus: false,
            warm_start: false,
        }
    }

    /// The same options with a different feasibility tolerance
    pub fn with_feasibility_tolerance(mut self, tolerance: f64) -> Self {
        self.feasibility_tolerance = tolerance;
        self
    }

    /// The same options with numeric focus and warm start switched on
    pub fn for_warm_start(mut self) -> Self {
        self.numeric_focus = true;
        self.warm_start = true;
        self
    }

    fn apply(&self, model: &mut highs::Model) {
        model.set_option("primal_feasibility_tolerance", self.feasibility_tolerance);
        model.set_option("mip_rel_gap", self.mip_gap);
        if let Some(time_limit) = self.time_limit {
            model.set_option("time_limit", time_limit);
        }
        if self.numeric_focus {
            model.set_option("simplex_scale_strategy", NUMERIC_FOCUS_SCALE_STRATEGY);
        }
        if self.warm_start {
            model.set_option("mip_heuristic_effort", WARM_START_HEURISTIC_EFFORT);
        }
    }
}

/// Enable logging for the HiGHS solver
fn enable_highs_logging(model: &mut highs::Model) {
    // **HACK**: Skip this step if logging is disabled (e.g. when running tests)
    if std::env::var(LOG_LEVEL_ENV_VAR).is_ok_and(|level| level.eq_ignore_ascii_case("off")) {
        return;
    }

    model.set_option("log_to_console", true);
    model.set_option("output_flag", true);
}

/// Log the constraints which cannot be satisfied together.
///
/// An elastic copy of the problem is solved, minimising the total violation. Every row left with a
/// positive slack is logged along with the variables it contains, as is every fixed variable
/// which had to move off its fixed value.
fn log_infeasibilities(problem: &Problem) {
    let solved = match problem.to_elastic_highs().try_solve() {
        Ok(solved) if solved.status() == HighsModelStatus::Optimal => solved,
        Ok(solved) => {
            error!(
                "Could not diagnose infeasibility: elastic problem is {:?}. Check the \
                 bounds of fixed first-stage decisions.",
                solved.status()
            );
            return;
        }
        Err(status) => {
            error!("Could not diagnose infeasibility: {status:?}");
            return;
        }
    };

    let columns = solved.get_solution().columns().to_vec();
    let num_cols = problem.num_cols();
    let mut num_violated = 0;
    for (i, row) in problem.iter_rows().enumerate() {
        let up = columns.get(num_cols + 2 * i).copied().unwrap_or_default();
        let down = columns.get(num_cols + 2 * i + 1).copied().unwrap_or_default();
        let violation = up.max(down);
        if violation <= ELASTIC_SLACK_TOLERANCE {
            continue;
        }

        num_violated += 1;
        let vars = row
            .terms
            .iter()
            .map(|(var, _)| problem.column_label(*var))
            .collect::<Vec<_>>()
            .join(", ");
        error!(
            "Infeasible constraint {}[{}] (violated by {violation:.6}): variables {vars}",
            row.family, row.label
        );
    }

    let fixed_offset = num_cols + 2 * problem.num_rows();
    for (j, var) in problem.iter_fixed_columns().enumerate() {
        let up = columns.get(fixed_offset + 2 * j).copied().unwrap_or_default();
        let down = columns.get(fixed_offset + 2 * j + 1).copied().unwrap_or_default();
        let violation = up.max(down);
        if violation <= ELASTIC_SLACK_TOLERANCE {
            continue;
        }

        num_violated += 1;
        error!(
            "Fixed variable {} must move by {violation:.6} from its fixed value {}",
            problem.column_label(var),
            problem.bounds(var).0
        );
    }

    error!(
        "{num_violated} constraints or fixings violated; total violation {:.6}",
        solved.objective_value()
    );
}

/// The values of the variables at an optimum
#[derive(PartialEq, Debug, Clone)]
pub struct Solution {
    columns: Vec<f64>,
    objective: f64,
}

impl Solution {
    /// The value of a variable
    pub fn value(&self, var: Variable) -> f64 {
        self.columns[var.index()]
    }

    /// The value of the objective function
    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// The transport model built for one set of scenarios and decision years
pub struct TransportModel<'a> {
    model: &'a Model,
    sets: IndexSets,
    problem: Problem,
    variables: Variables,
    solution: Option<Solution>,
    start: Option<Vec<f64>>,
}

impl<'a> TransportModel<'a> {
    /// Build the variables and constraints for the given scenarios and years
    pub fn build(model: &'a Model, ctx: &ModelBuildContext) -> Result<Self> {
        let sets = IndexSets::build(model, ctx);
        let mut problem = Problem::default();
        let variables = Variables::new(&mut problem, model, &sets);
        add_model_constraints(
            &mut problem,
            &ConstraintContext {
                model,
                sets: &sets,
                variables: &variables,
            },
        )
        .context("Failed to add constraints to the model")?;

        info!(
            "Built model for scenarios [{}] with {} variables and {} constraints",
            sets.iter_scenario_ids()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            problem.num_cols(),
            problem.num_rows()
        );

        Ok(Self {
            model,
            sets,
            problem,
            variables,
            solution: None,
            start: None,
        })
    }

    /// Solve the model.
    ///
    /// If the model is infeasible, the constraints responsible are logged before an error is
    /// returned. With [`SolverOptions::warm_start`] set, the start vector (if any) is handed to
    /// the solver as its initial solution.
    pub fn solve(&mut self, options: &SolverOptions) -> Result<&Solution, ModelError> {
        self.solution = None;

        let mut highs_model = self.problem.to_highs();
        enable_highs_logging(&mut highs_model);
        options.apply(&mut highs_model);
        let start = self.start.as_deref().filter(|_| options.warm_start);
        if let Some(Err(status)) =
            start.map(|start| highs_model.try_set_solution(Some(start), None, None, None))
        {
            warn!("Solver rejected the warm start ({status:?}); solving from scratch");
        }

        let solved = highs_model.try_solve().map_err(ModelError::Incoherent)?;
        match solved.status() {
            HighsModelStatus::Optimal => {}
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                log_infeasibilities(&self.problem);
                return Err(ModelError::Infeasible);
            }
            status => return Err(ModelError::NonOptimal(status)),
        }

        let solution = Solution {
            columns: solved.get_solution().columns().to_vec(),
            objective: solved.objective_value(),
        };
        info!("Optimal objective: {}", solution.objective);

        Ok(&*self.solution.insert(solution))
    }

    /// The model data
    pub fn model(&self) -> &'a Model {
        self.model
    }

    /// The index sets the model was built over
    pub fn sets(&self) -> &IndexSets {
        &self.sets
    }

    /// The underlying problem
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// The decision variables
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// The solution of the last successful solve, if the bounds have not changed since
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// The column values kept from the solution in place when the first stage was last unfixed
    pub fn start(&self) -> Option<&[f64]> {
        self.start.as_deref()
    }

    /// The first- and second-stage costs of each scenario in the last solution
    pub fn iter_stage_costs(&self) -> impl Iterator<Item = (&ScenarioID, f64, f64)> {
        let solution = self.solution.as_ref();
        self.variables
            .first_stage_cost
            .iter()
            .filter_map(move |(scenario, first)| {
                let solution = solution?;
                let second = self.variables.second_stage_cost.get(scenario)?;
                Some((scenario, solution.value(first), solution.value(second)))
            })
    }
}
