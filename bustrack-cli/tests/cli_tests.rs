//! Integration tests for the bustrack binary
//!
//! Each test runs the built binary against its own temporary session file.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        Ok(Workspace {
            dir: TempDir::new()?,
        })
    }

    fn session_path(&self) -> PathBuf {
        self.dir.path().join("session.json")
    }

    fn write_fixes(&self, json: &str) -> Result<PathBuf> {
        let path = self.dir.path().join("fixes.json");
        std::fs::write(&path, json)?;
        Ok(path)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_bustrack"))
            .args(["--log-level", "error"])
            .args(args)
            .env("BUSTRACK_SESSION_PATH", self.session_path())
            .env_remove("RUST_LOG")
            .output()?;
        Ok(output)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are utf-8")
}

const ROUTE: &str = r#"[
    {"latitude": 37.0, "longitude": -122.0, "timestamp": 1000},
    {"latitude": 37.001, "longitude": -122.001, "timestamp": 2000},
    {"latitude": 37.0005, "longitude": -122.0005, "timestamp": 1500},
    {"latitude": 200.0, "longitude": -122.0, "timestamp": 2500},
    {"latitude": 37.002, "longitude": -122.002, "timestamp": 3000}
]"#;

#[test]
fn test_simulate_prints_ordered_path() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(ROUTE)?;

    let output = ws.run(&[
        "simulate",
        "--key",
        "bus42",
        "--fixes",
        path_arg(&fixes),
        "--no-filter",
        "--json",
    ])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(result["key"], "bus42");

    let timestamps: Vec<i64> = result["path"]
        .as_array()
        .expect("path is an array")
        .iter()
        .map(|p| p["timestamp"].as_i64().expect("timestamp is an integer"))
        .collect();
    // 1500 arrives late and is ignored; the 200 degree fix never reaches the store
    assert_eq!(timestamps, vec![1000, 2000, 3000]);
    assert_eq!(result["ignored"], 1);
    assert!(result["distance_meters"].as_f64().unwrap_or(0.0) > 200.0);
    Ok(())
}

#[test]
fn test_simulate_applies_fix_thresholds() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(
        r#"[
            {"latitude": 37.0, "longitude": -122.0, "timestamp": 0},
            {"latitude": 37.01, "longitude": -122.0, "timestamp": 1000},
            {"latitude": 37.01, "longitude": -122.0, "timestamp": 10000}
        ]"#,
    )?;

    let output = ws.run(&["simulate", "-k", "bus7", "-f", path_arg(&fixes), "--json"])?;
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    // The fix one second after the first is below the default 5s interval
    assert_eq!(result["path"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[test]
fn test_session_kept_then_cleared() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(ROUTE)?;

    let output = ws.run(&["session", "show"])?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("No stored session"));

    let output = ws.run(&[
        "simulate",
        "--key",
        "bus42",
        "--fixes",
        path_arg(&fixes),
        "--keep-session",
        "--password",
        "hunter2",
    ])?;
    assert!(output.status.success());
    assert!(ws.session_path().exists());

    let output = ws.run(&["session", "show"])?;
    let shown = stdout(&output);
    assert!(shown.contains("bus42"));
    assert!(!shown.contains("hunter2"));

    let output = ws.run(&["session", "clear"])?;
    assert!(output.status.success());
    assert!(!ws.session_path().exists());

    let output = ws.run(&["session", "show"])?;
    assert!(stdout(&output).contains("No stored session"));
    Ok(())
}

#[test]
fn test_simulate_without_keep_session_clears_it() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(ROUTE)?;

    let output = ws.run(&["simulate", "--key", "bus42", "--fixes", path_arg(&fixes)])?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("ignored"));
    assert!(!ws.session_path().exists());
    Ok(())
}

#[test]
fn test_simulate_rejects_empty_key() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(ROUTE)?;

    let output = ws.run(&["simulate", "--key", "  ", "--fixes", path_arg(&fixes)])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_simulate_rejects_malformed_fix_file() -> Result<()> {
    let ws = Workspace::new()?;
    let fixes = ws.write_fixes(r#"{"latitude": 1.0}"#)?;

    let output = ws.run(&["simulate", "--key", "bus42", "--fixes", path_arg(&fixes)])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not a JSON array of fixes"));
    Ok(())
}

#[test]
fn test_config_prints_effective_toml() -> Result<()> {
    let ws = Workspace::new()?;
    let config_path = ws.dir.path().join("bustrack.toml");
    std::fs::write(
        &config_path,
        "[store]\nlistener_buffer = 32\n\n[publisher]\nmin_interval = \"2s\"\n",
    )?;

    let output = ws.run(&["--config", path_arg(&config_path), "config"])?;
    assert!(output.status.success());

    let printed = stdout(&output);
    assert!(printed.contains("listener_buffer = 32"));
    assert!(printed.contains("min_interval = \"2s\""));
    assert!(printed.contains("first_fix_timeout = \"5s\""));
    Ok(())
}

#[test]
fn test_invalid_config_fails() -> Result<()> {
    let ws = Workspace::new()?;
    let config_path = ws.dir.path().join("bustrack.toml");
    std::fs::write(&config_path, "[store]\nlistener_buffer = 0\n")?;

    let output = ws.run(&["--config", path_arg(&config_path), "config"])?;
    assert!(!output.status.success());
    Ok(())
}
