//! The module responsible for writing output data to disk.
use crate::analysis::SolveSummary;
use crate::mode::{FuelID, ModeID};
use crate::model::Model;
use crate::network::{Network, NodeID};
use crate::optimisation::TransportModel;
use crate::product::{ProductID, VehicleTypeID};
use crate::scenario::ScenarioID;
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;
use metadata::write_metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "freight_sp_results";

/// The output file name for the objective and stage costs of each solve
const SUMMARY_FILE_NAME: &str = "summary.csv";

/// The output file name for arc flows
const FLOWS_FILE_NAME: &str = "flows.csv";

/// The output file name for empty balancing trips
const BALANCING_FLOWS_FILE_NAME: &str = "balancing_flows.csv";

/// The output file name for path flows
const PATH_FLOWS_FILE_NAME: &str = "path_flows.csv";

/// The output file name for investment decisions
const INVESTMENTS_FILE_NAME: &str = "investments.csv";

/// The output file name for transport amounts by mode and fuel
const TRANSPORT_AMOUNTS_FILE_NAME: &str = "transport_amounts.csv";

/// The output file name for total emissions
const EMISSIONS_FILE_NAME: &str = "emissions.csv";

/// The output file name for cost components
const COSTS_FILE_NAME: &str = "costs.csv";

/// The output file name for the constraints of the model
const DEBUG_CONSTRAINTS_FILE_NAME: &str = "debug_constraints.csv";

/// The output file name for a generated path catalogue
const GENERATED_PATHS_FILE_NAME: &str = "generated_paths.csv";

/// Values smaller than this in magnitude are not written
const MIN_REPORTED_VALUE: f64 = 1e-6;

/// Get the output directory for the model at the specified path
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model, if it does not already exist.
///
/// An existing directory that is not empty is only replaced if `allow_overwrite` is set.
///
/// # Returns
///
/// Whether an existing directory was overwritten
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    let overwrite = if let Ok(mut entries) = fs::read_dir(output_dir) {
        if entries.next().is_none() {
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. \
            Please delete the folder or pass the --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Represents a row in the summary CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SummaryRow {
    analysis: String,
    scenario: ScenarioID,
    objective: f64,
    first_stage_cost: f64,
    second_stage_cost: f64,
}

/// Represents a row in the flows CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct FlowRow {
    from: NodeID,
    to: NodeID,
    mode: ModeID,
    route: u32,
    fuel: FuelID,
    product: ProductID,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the balancing flows CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BalancingFlowRow {
    from: NodeID,
    to: NodeID,
    mode: ModeID,
    route: u32,
    fuel: FuelID,
    vehicle_type: VehicleTypeID,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the path flows CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PathFlowRow {
    path_id: u32,
    product: ProductID,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the investments CSV file.
///
/// `key` describes what was invested in: an edge, a terminal (node and mode) or an edge and fuel.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct InvestmentRow {
    kind: String,
    key: String,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the transport amounts CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct TransportAmountRow {
    mode: ModeID,
    fuel: FuelID,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the emissions CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct EmissionsRow {
    year: u32,
    scenario: ScenarioID,
    emissions: f64,
    penalty: f64,
}

/// Represents a row in the costs CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct CostRow {
    component: String,
    year: u32,
    scenario: ScenarioID,
    value: f64,
}

/// Represents a row in the debug constraints CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DebugConstraintRow {
    family: String,
    key: String,
    lower: f64,
    upper: f64,
}

/// Represents one leg of a path in the generated paths CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct PathLegRow {
    path_id: u32,
    leg: u32,
    from: NodeID,
    to: NodeID,
    mode: ModeID,
    route: u32,
}

/// Whether a solution value is large enough to be written
fn is_reported(value: f64) -> bool {
    value.abs() > MIN_REPORTED_VALUE
}

/// Open a CSV writer for a file in the output folder
fn new_writer(output_path: &Path, file_name: &str) -> Result<csv::Writer<File>> {
    let file_path = output_path.join(file_name);
    csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    constraints_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        Ok(Self {
            constraints_writer: new_writer(output_path, DEBUG_CONSTRAINTS_FILE_NAME)?,
        })
    }

    /// Write the family, key and bounds of every constraint
    fn write_constraints(&mut self, transport: &TransportModel) -> Result<()> {
        for row in transport.problem().iter_rows() {
            self.constraints_writer.serialize(DebugConstraintRow {
                family: row.family.to_string(),
                key: row.label.clone(),
                lower: row.lower,
                upper: row.upper,
            })?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.constraints_writer.flush()?;

        Ok(())
    }
}

/// An object for writing the results of an analysis to file
pub struct DataWriter {
    output_path: PathBuf,
    summary_writer: csv::Writer<File>,
    flows_writer: csv::Writer<File>,
    balancing_flows_writer: csv::Writer<File>,
    path_flows_writer: csv::Writer<File>,
    investments_writer: csv::Writer<File>,
    transport_amounts_writer: csv::Writer<File>,
    emissions_writer: csv::Writer<File>,
    costs_writer: csv::Writer<File>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Write metadata and open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `model` - The model being run
    /// * `save_debug_info` - Whether to include extra CSV files for debugging the model
    pub fn create(output_path: &Path, model: &Model, save_debug_info: bool) -> Result<Self> {
        write_metadata(output_path, model).context("Failed to save metadata")?;

        let debug_writer = if save_debug_info {
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            output_path: output_path.to_path_buf(),
            summary_writer: new_writer(output_path, SUMMARY_FILE_NAME)?,
            flows_writer: new_writer(output_path, FLOWS_FILE_NAME)?,
            balancing_flows_writer: new_writer(output_path, BALANCING_FLOWS_FILE_NAME)?,
            path_flows_writer: new_writer(output_path, PATH_FLOWS_FILE_NAME)?,
            investments_writer: new_writer(output_path, INVESTMENTS_FILE_NAME)?,
            transport_amounts_writer: new_writer(output_path, TRANSPORT_AMOUNTS_FILE_NAME)?,
            emissions_writer: new_writer(output_path, EMISSIONS_FILE_NAME)?,
            costs_writer: new_writer(output_path, COSTS_FILE_NAME)?,
            debug_writer,
        })
    }

    /// Write the path catalogue generated for the model, in the same format as the input file
    pub fn write_generated_paths(&self, model: &Model) -> Result<()> {
        let mut writer = new_writer(&self.output_path, GENERATED_PATHS_FILE_NAME)?;
        for path in model.paths.iter() {
            for (leg, arc_idx) in (1..).zip(&path.arcs) {
                let arc = model.network.arc(*arc_idx);
                writer.serialize(PathLegRow {
                    path_id: path.id.0,
                    leg,
                    from: arc.from.clone(),
                    to: arc.to.clone(),
                    mode: arc.mode.clone(),
                    route: arc.route,
                })?;
            }
        }
        writer.flush()?;

        Ok(())
    }

    /// Write the objective and stage costs of each solve
    pub fn write_summaries(&mut self, summaries: &[SolveSummary]) -> Result<()> {
        for summary in summaries {
            for costs in &summary.scenario_costs {
                self.summary_writer.serialize(SummaryRow {
                    analysis: summary.analysis.to_string(),
                    scenario: costs.scenario.clone(),
                    objective: summary.objective,
                    first_stage_cost: costs.first_stage,
                    second_stage_cost: costs.second_stage,
                })?;
            }
        }

        Ok(())
    }

    /// Write the non-zero values of the decision variables of a solved model
    pub fn write_solution(&mut self, transport: &TransportModel) -> Result<()> {
        let solution = transport
            .solution()
            .context("Cannot write results for a model which has not been solved")?;
        let variables = transport.variables();
        let network = &transport.model().network;

        for ((arc_idx, fuel, product, year, scenario), var) in variables.flow.iter() {
            let value = solution.value(var);
            if !is_reported(value) {
                continue;
            }

            let arc = network.arc(*arc_idx);
            self.flows_writer.serialize(FlowRow {
                from: arc.from.clone(),
                to: arc.to.clone(),
                mode: arc.mode.clone(),
                route: arc.route,
                fuel: fuel.clone(),
                product: product.clone(),
                year: *year,
                scenario: scenario.clone(),
                value,
            })?;
        }

        for ((arc_idx, fuel, vehicle_type, year, scenario), var) in
            variables.balancing_flow.iter()
        {
            let value = solution.value(var);
            if !is_reported(value) {
                continue;
            }

            let arc = network.arc(*arc_idx);
            self.balancing_flows_writer.serialize(BalancingFlowRow {
                from: arc.from.clone(),
                to: arc.to.clone(),
                mode: arc.mode.clone(),
                route: arc.route,
                fuel: fuel.clone(),
                vehicle_type: vehicle_type.clone(),
                year: *year,
                scenario: scenario.clone(),
                value,
            })?;
        }

        for ((path, product, year, scenario), var) in variables.path_flow.iter() {
            let value = solution.value(var);
            if is_reported(value) {
                self.path_flows_writer.serialize(PathFlowRow {
                    path_id: path.0,
                    product: product.clone(),
                    year: *year,
                    scenario: scenario.clone(),
                    value,
                })?;
            }
        }

        self.write_investments(transport, network)?;

        for ((mode, fuel, year, scenario), var) in variables.transport_amount.iter() {
            let value = solution.value(var);
            if is_reported(value) {
                self.transport_amounts_writer.serialize(TransportAmountRow {
                    mode: mode.clone(),
                    fuel: fuel.clone(),
                    year: *year,
                    scenario: scenario.clone(),
                    value,
                })?;
            }
        }

        for (key, var) in variables.total_emissions.iter() {
            let penalty = variables
                .emission_penalty
                .get(key)
                .map_or(0.0, |var| solution.value(var));
            let (year, scenario) = key;
            self.emissions_writer.serialize(EmissionsRow {
                year: *year,
                scenario: scenario.clone(),
                emissions: solution.value(var),
                penalty,
            })?;
        }

        for ((component, year, scenario), var) in variables.cost.iter() {
            let value = solution.value(var);
            if is_reported(value) {
                self.costs_writer.serialize(CostRow {
                    component: component.to_string(),
                    year: *year,
                    scenario: scenario.clone(),
                    value,
                })?;
            }
        }

        Ok(())
    }

    /// Write edge and terminal expansions, upgrades and charging infrastructure
    fn write_investments(&mut self, transport: &TransportModel, network: &Network) -> Result<()> {
        let Some(solution) = transport.solution() else {
            return Ok(());
        };
        let variables = transport.variables();

        let edge_expansions = variables
            .edge_expansion
            .iter()
            .map(|((edge, year, scenario), var)| {
                ("edge_expansion", network.edge(*edge).to_string(), *year, scenario, var)
            });
        let upgrades = variables
            .upgrade
            .iter()
            .map(|((edge, year, scenario), var)| {
                ("upgrade", network.edge(*edge).to_string(), *year, scenario, var)
            });
        let node_expansions =
            variables
                .node_expansion
                .iter()
                .map(|((node, mode, year, scenario), var)| {
                    ("node_expansion", format!("{node} ({mode})"), *year, scenario, var)
                });
        let charging = variables
            .charging
            .iter()
            .map(|((edge, fuel, year, scenario), var)| {
                let key = format!("{} {fuel}", network.edge(*edge));
                ("charging", key, *year, scenario, var)
            });

        for (kind, key, year, scenario, var) in edge_expansions
            .chain(upgrades)
            .chain(node_expansions)
            .chain(charging)
        {
            let value = solution.value(var);
            if is_reported(value) {
                self.investments_writer.serialize(InvestmentRow {
                    kind: kind.to_string(),
                    key,
                    year,
                    scenario: scenario.clone(),
                    value,
                })?;
            }
        }

        Ok(())
    }

    /// Write debug information to CSV files, if enabled
    pub fn write_debug_info(&mut self, transport: &TransportModel) -> Result<()> {
        if let Some(wtr) = &mut self.debug_writer {
            wtr.write_constraints(transport)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.summary_writer.flush()?;
        self.flows_writer.flush()?;
        self.balancing_flows_writer.flush()?;
        self.path_flows_writer.flush()?;
        self.investments_writer.flush()?;
        self.transport_amounts_writer.flush()?;
        self.emissions_writer.flush()?;
        self.costs_writer.flush()?;
        if let Some(wtr) = &mut self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}
