//! A two-stage stochastic programming model of freight transport.
//!
//! Mode, fuel and infrastructure decisions for a national freight network are planned over a set
//! of decision years. Decisions in the early years are taken before it is known which technology
//! scenario unfolds; the later years adapt to the scenario.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod analysis;
pub mod bass;
pub mod cli;
pub mod cost;
pub mod demand;
pub mod finance;
pub mod id;
pub mod index_sets;
pub mod infrastructure;
pub mod input;
pub mod log;
pub mod mode;
pub mod model;
pub mod network;
pub mod optimisation;
pub mod output;
pub mod path;
pub mod product;
pub mod scenario;
pub mod settings;
pub mod technology;
pub mod time_period;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the config dir for the program.
///
/// Falls back to the current directory if the platform has no config dir.
pub fn get_config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_default();
    path.push("freight_sp");

    path
}
