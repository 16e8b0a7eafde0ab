use approx::assert_abs_diff_eq;
use std::fs;
use std::path::Path;
use std::process::Command;

use horizon::artifacts::{FittedArtifacts, OrdinalEncoder, StandardScaler};
use horizon::model::{LinearPredictorParams, WeibullAftModel};
use horizon::types::DerivedFeatureVector;
use tempfile::tempdir;

fn write_artifacts(dir: &Path, log_scale: f64) {
    let model = WeibullAftModel::new(
        DerivedFeatureVector::FEATURE_NAMES
            .iter()
            .map(|name| name.to_string())
            .collect(),
        LinearPredictorParams::new(log_scale, vec![-0.2, 0.03, -0.6, 0.01, -0.04, 0.01]),
        LinearPredictorParams::intercept_only(0.1),
    )
    .expect("model");
    let scaler = StandardScaler::for_age_and_bmi([68.0, 26.5], [11.5, 4.8]).expect("scaler");
    FittedArtifacts::new(model, scaler, OrdinalEncoder::tumor_stage())
        .save_dir(dir)
        .expect("save artifacts");
}

fn horizon() -> Command {
    Command::new(env!("CARGO_BIN_EXE_horizon"))
}

#[test]
fn estimate_prints_the_result_card_and_writes_the_curve() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 4.0);
    let curve_path = tmp.path().join("curve.tsv");

    let output = horizon()
        .args([
            "estimate",
            "--age",
            "60",
            "--weight",
            "70.0",
            "--height",
            "1.70",
            "--stage",
            "II",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
            "--curve-out",
            curve_path.to_str().expect("path str"),
        ])
        .output()
        .expect("run horizon cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Estimated median survival:"), "{stdout}");
    assert!(stdout.contains("Time to 25% survival probability:"), "{stdout}");

    let curve = fs::read_to_string(&curve_path).expect("curve file");
    let mut lines = curve.lines();
    assert_eq!(lines.next(), Some("months\tsurvival"));
    assert_eq!(lines.next(), Some("0\t1"));
    assert_eq!(curve.lines().count(), 2001);
}

#[test]
fn json_output_reports_an_unreached_threshold_as_null() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 9.0);

    let output = horizon()
        .args([
            "estimate",
            "--stage",
            "1",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
            "--grid-samples",
            "50",
            "--json",
        ])
        .output()
        .expect("run horizon cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON on stdout");
    assert!(report["median_survival_time"].as_f64().expect("median") > 400.0);
    assert!(report["threshold_crossing_time"].is_null());
    assert_eq!(report["curve"]["months"].as_array().expect("months").len(), 50);
}

#[test]
fn out_of_range_input_fails_with_a_readable_message() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 4.0);

    let output = horizon()
        .args([
            "estimate",
            "--age",
            "20",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
        ])
        .output()
        .expect("run horizon cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not valid"), "{stderr}");
    assert!(stderr.contains("Age 20"), "{stderr}");
}

#[test]
fn missing_artifacts_fail_fast() {
    let tmp = tempdir().expect("temporary directory");

    let output = horizon()
        .args([
            "estimate",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
        ])
        .output()
        .expect("run horizon cli");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not installed correctly"), "{stderr}");
}

#[test]
fn invalid_threshold_flag_is_rejected() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 4.0);

    let status = horizon()
        .args([
            "estimate",
            "--threshold",
            "1.5",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
        ])
        .status()
        .expect("run horizon cli");

    assert!(!status.success());
}

#[test]
fn invalid_prediction_prints_the_message_and_still_writes_the_curve() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 720.0);
    let curve_path = tmp.path().join("curve.tsv");

    let output = horizon()
        .args([
            "estimate",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
            "--curve-out",
            curve_path.to_str().expect("path str"),
        ])
        .output()
        .expect("run horizon cli");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("The prediction is invalid (infinite or not a number)"),
        "{stderr}"
    );

    let curve = fs::read_to_string(&curve_path).expect("curve still written");
    assert_eq!(curve.lines().count(), 2001);
    assert!(curve.lines().skip(1).all(|line| line.ends_with("\t1")));
}

#[test]
fn config_file_settings_apply_and_flags_override_them() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 4.0);
    let config_path = tmp.path().join("estimate.toml");
    fs::write(
        &config_path,
        "crossing_threshold = 0.5\n\n[grid]\nend = 240.0\nsamples = 100\n",
    )
    .expect("write config");

    let output = horizon()
        .args([
            "estimate",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
            "--config",
            config_path.to_str().expect("path str"),
            "--grid-samples",
            "60",
            "--json",
        ])
        .output()
        .expect("run horizon cli");

    assert!(output.status.success(), "CLI exited with {:?}", output.status);
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("valid JSON on stdout");
    assert_eq!(report["threshold"].as_f64(), Some(0.5));
    let months = report["curve"]["months"].as_array().expect("months");
    assert_eq!(months.len(), 60);
    let last = months.last().and_then(|m| m.as_f64()).expect("last month");
    assert_abs_diff_eq!(last, 240.0, epsilon = 1e-9);
}

#[test]
fn unreadable_config_file_is_rejected() {
    let tmp = tempdir().expect("temporary directory");
    write_artifacts(tmp.path(), 4.0);

    let output = horizon()
        .args([
            "estimate",
            "--artifacts-dir",
            tmp.path().to_str().expect("path str"),
            "--config",
            tmp.path().join("missing.toml").to_str().expect("path str"),
        ])
        .output()
        .expect("run horizon cli");

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
