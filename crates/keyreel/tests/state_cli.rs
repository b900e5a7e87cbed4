use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

const PROJECT: &str = r#"
version = 1

[output]
width = 64
height = 48
frame_rate = 30.0

[[keyframes]]
time = 0
label = "backdrop"
source = { kind = "solid", width = 8, height = 8, rgba = [0, 0, 255, 255] }
actions = [{ kind = "show", layer = 2 }]
effects = [{ kind = "quad", relative_width = 50.0 }]

[[keyframes]]
time = 10
label = "title"
source = { kind = "solid", width = 4, height = 4 }
actions = [{ kind = "show", layer = 1 }]

[[keyframes]]
time = 20
source = { kind = "solid", width = 4, height = 4 }
actions = [{ kind = "hide", label = "title" }]
"#;

fn write_project(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("show.toml");
    std::fs::write(&path, PROJECT).unwrap();
    path
}

fn state_json(project: &Path, frame: i64) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_keyreel"))
        .args(["state"])
        .arg(project)
        .args(["--frame", &frame.to_string(), "--json"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn labels(report: &Value) -> Vec<Option<String>> {
    report["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["label"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn state_before_first_keyframe_is_empty() {
    let dir = tempdir().unwrap();
    let project = write_project(dir.path());
    let report = state_json(&project, -1);
    assert_eq!(report["frame"], -1);
    assert!(report["entries"].as_array().unwrap().is_empty());
}

#[test]
fn state_orders_entries_by_layer() {
    let dir = tempdir().unwrap();
    let project = write_project(dir.path());
    let report = state_json(&project, 15);
    assert_eq!(
        labels(&report),
        vec![Some("title".to_string()), Some("backdrop".to_string())]
    );
    assert_eq!(report["entries"][1]["effects"][0], "quad");
    assert_eq!(report["entries"][1]["source"], "solid");
    assert_eq!(report["entries"][1]["image"], true);
}

#[test]
fn hide_action_removes_the_labelled_keyframe() {
    let dir = tempdir().unwrap();
    let project = write_project(dir.path());
    let report = state_json(&project, 25);
    assert_eq!(labels(&report), vec![Some("backdrop".to_string())]);
}

#[test]
fn table_output_names_the_frame() {
    let dir = tempdir().unwrap();
    let project = write_project(dir.path());
    let output = Command::new(env!("CARGO_BIN_EXE_keyreel"))
        .arg("state")
        .arg(&project)
        .args(["--frame", "0"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("frame 0: 1 active"), "{stdout}");
}

#[test]
fn missing_project_fails() {
    let dir = tempdir().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_keyreel"))
        .arg("state")
        .arg(dir.path().join("absent.toml"))
        .args(["--frame", "0"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load project"), "{stderr}");
}
