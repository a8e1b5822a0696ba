// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tests of the `imaging-graphs` binary.

use indoc::indoc;
use serde_json::Value;
use tempfile::TempDir;

use crate::{get_cmd_output, imaging_graphs, make_file_in_dir};

/// A small observation that images quickly.
const SMALL_TOML: &str = indoc! {r#"
    [simulation]
    num_datasets = 2
    num_antennas = 8
    num_times = 2
    npixel = 32
    point_sources = ["0,0,1.0", "5,-3,0.5"]

    [deconvolution]
    niter = 100

    [pipeline]
    nmajor = 1
    num_workers = 2
"#};

fn read_summary(path: &std::path::Path) -> Value {
    let contents = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&contents).unwrap()
}

#[test]
fn test_help() {
    for args in [vec!["--help"], vec!["continuum-imaging", "--help"], vec!["ical", "--help"]] {
        let cmd = imaging_graphs().args(&args).ok();
        assert!(cmd.is_ok(), "{args:?}: {:?}", get_cmd_output(cmd));
    }

    let (stdout, _) = get_cmd_output(imaging_graphs().arg("--help").ok());
    assert!(stdout.contains("continuum-imaging"));
    assert!(stdout.contains("ical"));

    let (stdout, _) = get_cmd_output(imaging_graphs().args(["ical", "--help"]).ok());
    assert!(stdout.contains("--first-selfcal"));
    assert!(stdout.contains("facets_wstack"));
}

#[test]
fn test_continuum_imaging() {
    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir("args.toml", tmp_dir.path(), SMALL_TOML);
    let summary = tmp_dir.path().join("summary.json");

    let cmd = imaging_graphs()
        .arg("continuum-imaging")
        .arg(&args_file)
        .arg("--no-progress-bars")
        .arg("-o")
        .arg(&summary)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));

    let summary = read_summary(&summary);
    assert_eq!(summary["pipeline"], "continuum-imaging");
    assert_eq!(summary["context"], "2d");
    assert_eq!(summary["nmajor"], 1);
    assert_eq!(summary["image_shape"], serde_json::json!([1, 1, 32, 32]));
    assert!(summary["model_flux"].as_f64().unwrap() > 0.0);
    assert!(summary["residual_peak"].as_f64().unwrap() < 1.0);
    assert!(summary.get("calibrated_sum_weights").is_none());
}

#[test]
fn test_cli_args_override_args_file() {
    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir("args.toml", tmp_dir.path(), SMALL_TOML);
    let summary = tmp_dir.path().join("summary.json");

    let cmd = imaging_graphs()
        .arg("continuum-imaging")
        .arg(&args_file)
        .args(["--no-progress-bars", "--context", "slice", "--vis-slices", "2"])
        .args(["--nmajor", "0"])
        .arg("--output")
        .arg(&summary)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));

    let summary = read_summary(&summary);
    assert_eq!(summary["context"], "slice");
    assert_eq!(summary["nmajor"], 0);
    // Without major cycles, nothing is added to the empty model.
    assert_eq!(summary["model_flux"].as_f64().unwrap(), 0.0);
}

#[test]
fn test_json_args_file() {
    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir(
        "args.json",
        tmp_dir.path(),
        r#"{"simulation": {"num_datasets": 1, "num_times": 2}, "pipeline": {"nmajor": 1}}"#,
    );
    let cmd = imaging_graphs()
        .arg("continuum-imaging")
        .arg(&args_file)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
}

#[test]
fn test_dry_run_saves_toml() {
    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir("args.toml", tmp_dir.path(), SMALL_TOML);
    let saved = tmp_dir.path().join("saved.toml");
    let summary = tmp_dir.path().join("summary.json");

    let cmd = imaging_graphs()
        .arg("continuum-imaging")
        .arg(&args_file)
        .args(["--num-datasets", "3", "--dry-run", "--save-toml"])
        .arg(&saved)
        .arg("--output")
        .arg(&summary)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
    // Nothing is computed in a dry run.
    assert!(!summary.exists());

    let saved_contents = std::fs::read_to_string(&saved).unwrap();
    assert!(saved_contents.contains("num_datasets = 3"));

    // The saved file reproduces the run.
    let cmd = imaging_graphs()
        .arg("continuum-imaging")
        .arg(&saved)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));
}

#[test]
fn test_bad_arguments() {
    let cmd = imaging_graphs()
        .args(["continuum-imaging", "--context", "3d", "--dry-run"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Error"), "{stderr}");
    assert!(stderr.contains("3d"), "{stderr}");

    // The 2d context has no facets.
    let cmd = imaging_graphs()
        .args(["continuum-imaging", "--facets", "2", "--dry-run"])
        .ok();
    assert!(cmd.is_err());

    let cmd = imaging_graphs()
        .args(["continuum-imaging", "--deconvolve-facets", "2"])
        .args(["--deconvolve-channels", "2", "--dry-run"])
        .ok();
    assert!(cmd.is_err());

    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir("args.yaml", tmp_dir.path(), "");
    let cmd = imaging_graphs()
        .arg("ical")
        .arg(&args_file)
        .arg("--dry-run")
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("recognised file extension"), "{stderr}");
}

#[test]
fn test_ical() {
    let tmp_dir = TempDir::new().unwrap();
    let args_file = make_file_in_dir("args.toml", tmp_dir.path(), SMALL_TOML);
    let summary = tmp_dir.path().join("summary.json");

    let cmd = imaging_graphs()
        .arg("ical")
        .arg(&args_file)
        .args(["--no-progress-bars", "--first-selfcal", "1"])
        .arg("--output")
        .arg(&summary)
        .ok();
    assert!(cmd.is_ok(), "{:?}", get_cmd_output(cmd));

    let summary = read_summary(&summary);
    assert_eq!(summary["pipeline"], "ical");
    assert!(summary["model_flux"].as_f64().unwrap() > 0.0);
    let weights = summary["calibrated_sum_weights"].as_array().unwrap();
    assert_eq!(weights.len(), 2);
    assert!(weights.iter().all(|w| w.as_f64().unwrap() >= 0.0));
}
