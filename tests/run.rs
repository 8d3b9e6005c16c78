//! Integration tests for the `run` command.
use freight_sp::cli::{RunOpts, handle_run_command};
use freight_sp::settings::Settings;
use std::path::PathBuf;
use tempfile::tempdir;

/// Get the path to the demonstration model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/simple")
}

/// An integration test for the `run` command.
#[test]
fn test_handle_run_command() {
    unsafe { std::env::set_var("FREIGHT_SP_LOG_LEVEL", "off") };

    {
        // Save results to non-existent directory to check that directory creation works
        let tempdir = tempdir().unwrap();
        let output_dir = tempdir.path().join("results");
        let opts = RunOpts {
            output_dir: Some(output_dir.clone()),
            ..Default::default()
        };
        handle_run_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap();

        for file_name in [
            "metadata.toml",
            "summary.csv",
            "flows.csv",
            "costs.csv",
            "emissions.csv",
            "generated_paths.csv",
        ] {
            assert!(
                output_dir.join(file_name).is_file(),
                "{file_name} was not written"
            );
        }
        assert!(!output_dir.join("debug_constraints.csv").exists());
    }

    // Second time will fail because the logging is already initialised
    let opts = RunOpts {
        output_dir: Some(tempdir().unwrap().path().to_path_buf()),
        ..Default::default()
    };
    assert_eq!(
        handle_run_command(&get_model_dir(), &opts, Some(Settings::default()))
            .unwrap_err()
            .chain()
            .next()
            .unwrap()
            .to_string(),
        "Failed to initialise logging."
    );
}
