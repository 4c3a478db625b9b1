//! Integration tests for the launcher command line
//!
//! Commands run against the fixture configs with `true` standing in for the
//! container runtime, so nothing here needs a live engine.

use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str;
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn launcher() -> Result<Command> {
    let fixtures = fixtures_dir();
    let mut cmd = Command::cargo_bin("launcher")?;
    cmd.env_remove("LAUNCHER_DOCKER_PATH")
        .env_remove("LAUNCHER_RUNTIME")
        .arg("--conf-dir")
        .arg(fixtures.join("containers"))
        .arg("--templates-dir")
        .arg(&fixtures);
    Ok(cmd)
}

#[test]
fn test_help_lists_phases() -> Result<()> {
    let mut cmd = Command::cargo_bin("launcher")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(str::contains("bootstrap"))
        .stdout(str::contains("rebuild"))
        .stdout(str::contains("--docker-path"));
    Ok(())
}

#[test]
fn test_start_dry_run_prints_run_command() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["--docker-path", "true", "start", "test", "--dry-run"]);
    cmd.assert()
        .success()
        .stdout(str::contains("true run --detach --restart=always"))
        .stdout(str::contains("-p 80:80"))
        .stdout(str::contains("--name test"))
        .stdout(str::contains("local_discourse/test"))
        .stdout(str::contains("SOME_SECRET").not());
    Ok(())
}

#[test]
fn test_generate_raw_yaml() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["generate", "raw-yaml", "test"]);
    cmd.assert()
        .success()
        .stdout(str::contains("path: /etc/service/nginx/run"))
        .stdout(str::contains("path: /etc/service/postgres/run"));
    Ok(())
}

#[test]
fn test_generate_resolved_masks_secrets() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["generate", "resolved", "test"]);
    cmd.assert()
        .success()
        .stdout(str::contains("\"DISCOURSE_DB_PASSWORD\": \"****\""))
        .stdout(str::contains("SOME_SECRET").not());
    Ok(())
}

#[test]
fn test_generate_dockerfile_into_build_dir() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut cmd = launcher()?;
    cmd.arg("--build-dir")
        .arg(tmp.path())
        .args(["generate", "dockerfile", "test"]);
    cmd.assert().success();

    let dockerfile = std::fs::read_to_string(tmp.path().join("test/Dockerfile"))?;
    assert!(dockerfile.contains("ARG dockerfile_from_image=discourse/base:release"));
    assert!(tmp.path().join("test/config.yaml").exists());
    Ok(())
}

#[test]
fn test_broken_config_reports_syntax_error() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["--docker-path", "true", "build", "broken"]);
    cmd.assert()
        .failure()
        .code(1)
        .stderr(str::contains("YAML syntax error"));
    Ok(())
}

#[test]
fn test_stop_missing_container_is_not_an_error() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["--docker-path", "true", "stop", "test"]);
    cmd.assert()
        .success()
        .stdout(str::contains("test was not found"));
    Ok(())
}

#[test]
fn test_destroy_missing_container_is_not_an_error() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["--docker-path", "true", "destroy", "test"]);
    cmd.assert()
        .success()
        .stdout(str::contains("test was not found"));
    Ok(())
}

#[test]
fn test_runtime_flag_invalid() -> Result<()> {
    let mut cmd = Command::cargo_bin("launcher")?;
    cmd.args(["--runtime", "invalid", "stop", "test"]);
    cmd.assert()
        .failure()
        .stderr(str::contains("invalid value 'invalid'"));
    Ok(())
}

#[test]
fn test_run_requires_command() -> Result<()> {
    let mut cmd = launcher()?;
    cmd.args(["run", "test"]);
    cmd.assert().failure();
    Ok(())
}
