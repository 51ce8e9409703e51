mod common;

use assert_cmd::Command;
use common::shifted_pair;
use predicates::prelude::*;
use stereo_depth::bm::BlockMatchParameters;
use stereo_depth::images;
use stereo_depth::tuning::{load_parameters, save_parameters};

fn cli() -> Command {
    Command::cargo_bin("stereo-depth").expect("binary built")
}

#[test]
fn params_writes_default_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("3dmap_set.txt");
    cli()
        .args(["params", "--out"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote default parameters"));
    assert_eq!(load_parameters(&out).expect("load"), BlockMatchParameters::default());
}

#[test]
fn disparity_writes_gray_and_jet_images() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (left, right) = shifted_pair(6);
    let left_path = dir.path().join("left.png");
    let right_path = dir.path().join("right.png");
    images::save_gray(&left, &left_path).expect("save left");
    images::save_gray(&right, &right_path).expect("save right");

    let params_path = dir.path().join("params.json");
    let params = BlockMatchParameters {
        min_disparity: 0,
        num_disparities: 32,
        ..Default::default()
    };
    save_parameters(&params, &params_path).expect("params");

    let out = dir.path().join("out");
    cli()
        .arg("disparity")
        .arg("--left")
        .arg(&left_path)
        .arg("--right")
        .arg(&right_path)
        .arg("--params")
        .arg(&params_path)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let gray = images::load_gray(out.join("disparity.png")).expect("gray output");
    assert_eq!(gray.size(), left.size());
    let jet = images::load_rgb(out.join("disparity_jet.png")).expect("jet output");
    assert_eq!(jet.size(), left.size());
}

#[test]
fn invalid_parameter_file_fails_with_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (left, right) = shifted_pair(3);
    let left_path = dir.path().join("left.png");
    let right_path = dir.path().join("right.png");
    images::save_gray(&left, &left_path).expect("save left");
    images::save_gray(&right, &right_path).expect("save right");
    let params_path = dir.path().join("bad.json");
    let bad = BlockMatchParameters {
        num_disparities: 100,
        ..Default::default()
    };
    save_parameters(&bad, &params_path).expect("params");

    cli()
        .arg("disparity")
        .arg("--left")
        .arg(&left_path)
        .arg("--right")
        .arg(&right_path)
        .arg("--params")
        .arg(&params_path)
        .arg("--out")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("numberOfDisparities"));
}

#[test]
fn calibrate_without_pairs_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .arg("calibrate")
        .arg("--images")
        .arg(dir.path())
        .arg("--out")
        .arg(dir.path().join("bundle"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
    assert!(!dir.path().join("bundle").exists());
}

#[test]
fn rectify_requires_a_bundle() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .arg("rectify")
        .arg("--calibration")
        .arg(dir.path().join("missing"))
        .arg("--left")
        .arg("l.png")
        .arg("--right")
        .arg("r.png")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing file"));
}

#[test]
fn rectify_with_bundle_writes_pair() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bundle = dir.path().join("bundle");
    common::parallel_rig().export(&bundle).expect("export");
    let (left, right) = shifted_pair(5);
    let left_path = dir.path().join("left.png");
    let right_path = dir.path().join("right.png");
    images::save_gray(&left, &left_path).expect("save left");
    images::save_gray(&right, &right_path).expect("save right");

    let out = dir.path().join("rect");
    cli()
        .arg("rectify")
        .arg("--calibration")
        .arg(&bundle)
        .arg("--left")
        .arg(&left_path)
        .arg("--right")
        .arg(&right_path)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    assert!(out.join("rectified_left.png").is_file());
    assert!(out.join("rectified_right.png").is_file());
}
