use std::path::PathBuf;
use std::process::Command;

use overlay_runtime::{OverlayDocument, WidgetDefinition};

fn exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_overlay"))
}

#[test]
fn cli_apply_prints_scene_and_records_status() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("overlay.json");
    let status_path = dir.path().join("mounts.json");

    let doc = OverlayDocument {
        id: "main".to_string(),
        name: "Main".to_string(),
        widgets: vec![
            WidgetDefinition::starter("clock", "Clock"),
            WidgetDefinition::new("broken", "export default {", ""),
        ],
    };
    std::fs::write(&doc_path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let out = Command::new(exe())
        .args(["apply", "--in"])
        .arg(&doc_path)
        .args(["--frames", "2", "--status-out"])
        .arg(&status_path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8(out.stdout).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["kind"], "document");
    assert!(stdout.contains("widget-clock"));
    assert!(!stdout.contains("widget-broken"));
    assert!(String::from_utf8_lossy(&out.stderr).contains("broken"));

    let status: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&status_path).unwrap()).unwrap();
    assert_eq!(status["clock"], false);
    assert!(status.get("broken").is_none());
}

#[test]
fn cli_preview_fails_on_bad_widget() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("bad.js");
    std::fs::write(&script, "export default { unmount() {} }").unwrap();

    let out = Command::new(exe())
        .arg("preview")
        .arg("--script")
        .arg(&script)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("compile error"));
}

#[test]
fn cli_preview_mounts_a_good_widget() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("badge.js");
    let css = dir.path().join("badge.css");
    std::fs::write(
        &script,
        "export default { mount(el) { const b = document.createElement('b'); b.textContent = 'LIVE'; el.appendChild(b) } }",
    )
    .unwrap();
    std::fs::write(&css, "b { color: red }").unwrap();

    let out = Command::new(exe())
        .arg("preview")
        .arg("--script")
        .arg(&script)
        .arg("--css")
        .arg(&css)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("LIVE"));
}
