use std::process::Command;

fn stubweave() -> String {
    std::env::var("CARGO_BIN_EXE_stubweave").unwrap_or_else(|_| {
        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        path.push("stubweave");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path.to_string_lossy().to_string()
    })
}

#[test]
fn stubweave_exits_non_zero_on_missing_classpath_entry() {
    let output = Command::new(stubweave())
        .arg("--classpath")
        .arg("missing.jar")
        .output()
        .expect("run stubweave");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("classpath entry not found"), "{stderr}");
}

#[test]
fn stubweave_exits_non_zero_on_malformed_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = dir.path().join("stubweave.json");
    std::fs::write(&config, r#"{ "stubs": 1 }"#).expect("write config");

    let output = Command::new(stubweave())
        .arg("--classpath")
        .arg(dir.path())
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run stubweave");

    assert!(!output.status.success());
}

#[test]
fn stubweave_writes_an_empty_fact_base_for_an_empty_program() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output_path = dir.path().join("facts.json");
    let sarif_path = dir.path().join("diagnostics.sarif");

    let output = Command::new(stubweave())
        .arg("--classpath")
        .arg(dir.path())
        .arg("--ignore-platform")
        .arg("--output")
        .arg(&output_path)
        .arg("--diagnostics")
        .arg(&sarif_path)
        .output()
        .expect("run stubweave");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let facts = std::fs::read_to_string(&output_path).expect("fact base");
    assert!(facts.contains("\"tool\": \"stubweave\""));
    let sarif = std::fs::read_to_string(&sarif_path).expect("sarif");
    assert!(sarif.contains("\"version\": \"2.1.0\""));
}
