//! The `settings` subcommands, for inspecting and editing `settings.toml`.
use crate::log::LOG_LEVEL_ENV_VAR;
use crate::settings::{Settings, get_settings_file_path};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::env;
use std::fs;
use std::path::Path;

/// Subcommands for settings
#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Open the settings file in a text editor, creating it first if needed
    Edit,
    /// Print the path the settings file is read from
    Path,
    /// Print the settings in effect
    Show,
    /// Print a commented-out `settings.toml` with the default values
    DumpDefault,
}

impl SettingsSubcommands {
    /// Execute the supplied settings subcommand
    pub fn execute(self) -> Result<()> {
        match self {
            Self::Edit => edit_settings_file(&get_settings_file_path()),
            Self::Path => {
                println!("{}", get_settings_file_path().display());
                Ok(())
            }
            Self::Show => show_settings(),
            Self::DumpDefault => {
                print!("{}", Settings::default_file_contents()?);
                Ok(())
            }
        }
    }
}

/// Write the default settings file to `file_path` unless a file is already there
fn ensure_settings_file_exists(file_path: &Path) -> Result<()> {
    if file_path.is_file() {
        return Ok(());
    }

    if let Some(dir_path) = file_path.parent() {
        fs::create_dir_all(dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir_path.display()))?;
    }
    fs::write(file_path, Settings::default_file_contents()?)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;

    Ok(())
}

fn edit_settings_file(file_path: &Path) -> Result<()> {
    ensure_settings_file_exists(file_path)?;

    println!("Opening settings file for editing: {}", file_path.display());
    edit::edit_file(file_path)?;

    Ok(())
}

fn show_settings() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings.")?;
    print!("{}", toml::to_string(&settings)?);

    if let Ok(level) = env::var(LOG_LEVEL_ENV_VAR) {
        println!("# log_level is overridden by {LOG_LEVEL_ENV_VAR}={level}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_settings_file_exists() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("freight_sp").join("settings.toml");
        ensure_settings_file_exists(&file_path).unwrap();
        let contents = fs::read_to_string(&file_path).unwrap();
        assert!(contents.starts_with('#'));

        // An existing file is left alone
        fs::write(&file_path, "log_level = \"debug\"\n").unwrap();
        ensure_settings_file_exists(&file_path).unwrap();
        assert_eq!(
            fs::read_to_string(&file_path).unwrap(),
            "log_level = \"debug\"\n"
        );
    }
}
