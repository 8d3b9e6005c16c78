//! Program logging.
//!
//! Messages go to the terminal, coloured when it supports it: warnings and errors on stderr,
//! everything else on stdout. When a run has an output folder, two plain-text log files are also
//! written there: one with the whole run and one with only warnings and errors, which is handy
//! for checking a long solve for dropped demand or infeasibility reports.
use anyhow::{Context, Result, bail};
use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{Level, LevelFilter, Record};
use std::env;
use std::fmt::{Arguments, Display};
use std::fs::File;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::OnceLock;

/// Set once the program logger has been installed
static LOGGER_INIT: OnceLock<()> = OnceLock::new();

/// The environment variable which overrides the log level
pub const LOG_LEVEL_ENV_VAR: &str = "FREIGHT_SP_LOG_LEVEL";

/// The log level used if neither the settings file nor the environment give one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log file with every message of the run
const RUN_LOG_FILE_NAME: &str = "freight_sp_run.log";

/// Log file with warnings and errors only
const WARNINGS_LOG_FILE_NAME: &str = "freight_sp_warnings.log";

/// Prefix stripped from log targets to keep lines short
const TARGET_PREFIX: &str = "freight_sp::";

/// Whether the program logger has been initialised
pub fn is_logger_initialised() -> bool {
    LOGGER_INIT.get().is_some()
}

/// Convert a log level name (case insensitive) to a [`LevelFilter`]
fn parse_log_level(log_level: &str) -> Result<LevelFilter> {
    let level = match log_level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        unknown => bail!("Unknown log level: {unknown}"),
    };

    Ok(level)
}

/// The log level to use: the environment variable wins over the settings file
fn resolve_log_level(log_level_from_settings: &str) -> Result<LevelFilter> {
    match env::var(LOG_LEVEL_ENV_VAR) {
        Ok(level) => parse_log_level(&level)
            .with_context(|| format!("Invalid value for {LOG_LEVEL_ENV_VAR}")),
        Err(_) => parse_log_level(log_level_from_settings),
    }
}

/// Initialise the program logger.
///
/// Accepted log levels are `off`, `error`, `warn`, `info`, `debug` and `trace`. The level can be
/// set in `settings.toml` or with the `FREIGHT_SP_LOG_LEVEL` environment variable, which takes
/// precedence.
///
/// The logger can only be initialised once per process.
///
/// # Arguments
///
/// * `log_level_from_settings`: The log level specified in `settings.toml`
/// * `log_file_path`: Folder in which to create log files, if any
pub fn init(log_level_from_settings: &str, log_file_path: Option<&Path>) -> Result<()> {
    let log_level = resolve_log_level(log_level_from_settings)?;

    let mut dispatch = Dispatch::new()
        .chain(console_dispatch(log_level, false))
        .chain(console_dispatch(log_level, true));
    if let Some(dir) = log_file_path {
        // The files always record at least info-level messages, whatever the console shows
        dispatch = dispatch
            .chain(file_dispatch(dir, RUN_LOG_FILE_NAME, log_level.max(LevelFilter::Info))?)
            .chain(file_dispatch(dir, WARNINGS_LOG_FILE_NAME, LevelFilter::Warn)?);
    }

    dispatch.apply().context("Logger already initialised")?;
    LOGGER_INIT
        .set(())
        .ok()
        .context("Logger already initialised")?;

    Ok(())
}

/// Messages for stdout (`warnings == false`) or stderr (`warnings == true`)
fn console_dispatch(log_level: LevelFilter, warnings: bool) -> Dispatch {
    let colours = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let (use_colour, level) = if warnings {
        (std::io::stderr().is_terminal(), log_level.min(LevelFilter::Warn))
    } else {
        (std::io::stdout().is_terminal(), log_level)
    };

    let dispatch = Dispatch::new()
        .filter(move |metadata| (metadata.level() <= Level::Warn) == warnings)
        .format(move |out, message, record| {
            if use_colour {
                write_log(out, colours.color(record.level()), record, message);
            } else {
                write_log(out, record.level(), record, message);
            }
        })
        .level(level);

    if warnings {
        dispatch.chain(std::io::stderr())
    } else {
        dispatch.chain(std::io::stdout())
    }
}

/// Messages for a plain-text log file in `dir`, truncating any file left by a previous run
fn file_dispatch(dir: &Path, file_name: &str, level: LevelFilter) -> Result<Dispatch> {
    let path = dir.join(file_name);
    let file = File::create(&path)
        .with_context(|| format!("Could not create log file {}", path.display()))?;

    Ok(Dispatch::new()
        .format(|out, message, record| write_log(out, record.level(), record, message))
        .level(level)
        .chain(file))
}

/// The module a message came from, without the crate name
fn short_target<'a>(record: &Record<'a>) -> &'a str {
    let target = record.target();
    target.strip_prefix(TARGET_PREFIX).unwrap_or(target)
}

/// Write one log line: `[time level module] message`
fn write_log<T: Display>(out: FormatCallback, level: T, record: &Record, message: &Arguments) {
    let timestamp = Local::now().format("%H:%M:%S");
    let target = short_target(record);

    out.finish(format_args!("[{timestamp} {level} {target}] {message}"));
}
