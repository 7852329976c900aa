use assert_cmd::Command;

fn gatelink(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gatelink").unwrap();
    cmd.env_remove("GATELINK_TOKEN")
        .arg("--config")
        .arg(config_dir.path().join("config.toml"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatelink(&dir).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("forward"));
    assert!(stdout.contains("probe"));
}

#[test]
fn probe_without_gateway_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatelink(&dir).args(["probe", "example.com:22"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no gateway configured"), "stderr: {stderr}");
}

#[test]
fn probe_rejects_bad_target() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatelink(&dir)
        .args(["--gateway", "ws://127.0.0.1:9", "probe", "no-port"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid target"), "stderr: {stderr}");
}

#[test]
fn config_save_persists_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatelink(&dir)
        .args(["--api", "https://app.example.com", "config", "--save"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let saved = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(saved.contains("https://app.example.com"));
}

#[test]
fn config_output_masks_token() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatelink(&dir)
        .args(["--token", "s3cret", "config", "--save"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("s3cret"), "stdout: {stdout}");
    assert!(stdout.contains("<redacted>"));

    let saved = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(saved.contains("s3cret"));
}
