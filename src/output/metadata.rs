//! The `metadata.toml` file describing a run: what was solved, with which build, and where.
use crate::model::{AnalysisType, Model, ObjectiveKind};
use anyhow::{Result, anyhow};
use chrono::Local;
use platform_info::{PlatformInfo, PlatformInfoAPI, UNameAPI};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// The output file name for metadata
const METADATA_FILE_NAME: &str = "metadata.toml";

/// Build-time information generated by the build script
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Serialize)]
struct Metadata<'a> {
    run: RunMetadata<'a>,
    model: ModelMetadata<'a>,
    program: ProgramMetadata,
    platform: PlatformMetadata,
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    model_path: &'a Path,
    /// Local start time of the run (RFC 2822)
    started: String,
}

/// The size and settings of the model which was solved
#[derive(Serialize)]
struct ModelMetadata<'a> {
    analysis_type: AnalysisType,
    objective: ObjectiveKind,
    scenarios: Vec<&'a str>,
    first_stage_years: Vec<u32>,
    second_stage_years: Vec<u32>,
    num_paths: usize,
    generated_paths: bool,
}

impl<'a> ModelMetadata<'a> {
    fn new(model: &'a Model) -> Self {
        Self {
            analysis_type: model.parameters.analysis_type,
            objective: model.parameters.objective,
            scenarios: model.scenarios.iter().map(|s| &*s.id.0).collect(),
            first_stage_years: model.time_periods.iter_first_stage().collect(),
            second_stage_years: model.time_periods.iter_second_stage().collect(),
            num_paths: model.paths.len(),
            generated_paths: model.generated_paths,
        }
    }
}

#[derive(Serialize)]
struct ProgramMetadata {
    name: &'static str,
    version: &'static str,
    target: &'static str,
    is_debug: bool,
    rustc_version: &'static str,
    build_time_utc: &'static str,
    /// Short commit hash, suffixed with `-dirty` for uncommitted changes
    git_commit: String,
}

impl ProgramMetadata {
    fn new() -> Self {
        let git_commit = match built_info::GIT_COMMIT_HASH_SHORT {
            Some(hash) if built_info::GIT_DIRTY == Some(true) => format!("{hash}-dirty"),
            Some(hash) => hash.to_string(),
            None => "unknown".to_string(),
        };

        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            target: built_info::TARGET,
            is_debug: built_info::DEBUG,
            rustc_version: built_info::RUSTC_VERSION,
            build_time_utc: built_info::BUILT_TIME_UTC,
            git_commit,
        }
    }
}

/// The machine the model was solved on, as reported by [`PlatformInfo`]
#[derive(Serialize)]
struct PlatformMetadata {
    osname: String,
    sysname: String,
    release: String,
    machine: String,
    hostname: String,
}

impl PlatformMetadata {
    fn new() -> Result<Self> {
        let info = PlatformInfo::new()
            .map_err(|err| anyhow!("Unable to determine platform info: {err}"))?;
        Ok(Self {
            osname: info.osname().to_string_lossy().into(),
            sysname: info.sysname().to_string_lossy().into(),
            release: info.release().to_string_lossy().into(),
            machine: info.machine().to_string_lossy().into(),
            hostname: info.nodename().to_string_lossy().into(),
        })
    }
}

/// Write `metadata.toml` for a run of `model` to the output folder
pub fn write_metadata(output_path: &Path, model: &Model) -> Result<()> {
    let metadata = Metadata {
        run: RunMetadata {
            model_path: &model.model_path,
            started: Local::now().to_rfc2822(),
        },
        model: ModelMetadata::new(model),
        program: ProgramMetadata::new(),
        platform: PlatformMetadata::new()?,
    };
    fs::write(
        output_path.join(METADATA_FILE_NAME),
        toml::to_string(&metadata)?,
    )?;

    Ok(())
}
