//! CLI tests: spawn the agent binary and check output and exit codes.

use std::fs;
use std::process::Command;

use agent::exit_codes;
use agent::io::config::{AgentConfig, load_config, write_config};
use agent::io::paths::AgentPaths;
use agent::test_support::{one_step_from_win, walled_corridor};

fn agent() -> Command {
    Command::new(env!("CARGO_BIN_EXE_agent"))
}

#[test]
fn init_writes_default_config_under_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let status = agent()
        .args(["init", "--root"])
        .arg(temp.path())
        .status()
        .expect("agent init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let paths = AgentPaths::new(temp.path());
    assert_eq!(
        load_config(&paths.config_path).expect("config"),
        AgentConfig::default()
    );
}

#[test]
fn plan_prints_winning_actions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let grid = temp.path().join("level.txt");
    fs::write(&grid, walled_corridor().to_grid_string()).expect("grid");

    let output = agent()
        .arg("plan")
        .arg("--grid")
        .arg(&grid)
        .output()
        .expect("agent plan");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(stdout.trim().split(", ").count(), 4);
}

#[test]
fn plan_without_solution_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let grid = temp.path().join("level.txt");
    fs::write(&grid, one_step_from_win().to_grid_string()).expect("grid");
    let physics = temp.path().join("frozen.toml");
    fs::write(&physics, "").expect("physics");

    let output = agent()
        .arg("plan")
        .arg("--grid")
        .arg(&grid)
        .arg("--physics")
        .arg(&physics)
        .output()
        .expect("agent plan");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no plan"));
}

#[test]
fn rules_lists_active_rules() {
    let temp = tempfile::tempdir().expect("tempdir");
    let grid = temp.path().join("level.txt");
    fs::write(&grid, walled_corridor().to_grid_string()).expect("grid");

    let output = agent()
        .args(["rules", "--grid"])
        .arg(&grid)
        .output()
        .expect("agent rules");
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        vec!["BABA IS YOU", "FLAG IS WIN", "WALL IS STOP"]
    );
}

/// Verifies an unreachable bridge fails the run with the generic error code.
#[test]
fn run_against_unreachable_bridge_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = AgentPaths::new(temp.path());
    let mut config = AgentConfig::default();
    config.environment.base_url = "http://127.0.0.1:9".to_string();
    config.environment.timeout_secs = 1;
    write_config(&paths.config_path, &config).expect("config");

    let output = agent()
        .args(["run", "--level", "1", "--fresh", "--root"])
        .arg(temp.path())
        .output()
        .expect("agent run");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("load level 1"));
    assert_eq!(
        fs::read_to_string(&paths.physics_path).expect("placeholder installed"),
        ""
    );
}
