//! E2E tests for the `tote` binary: sim, layout and config commands.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn tote_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tote"));
    cmd.current_dir(dir);
    cmd.env("TOTE_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd.env_remove("TOTE_TIMING");
    // Keep the user config out of the developer's real config dir.
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env("HOME", dir);
    cmd
}

fn json_stdout(dir: &Path, args: &[&str]) -> Value {
    let output = tote_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("tote should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn sim_run_json_reports_all_passed() {
    let dir = TempDir::new().expect("tempdir");
    let report = json_stdout(dir.path(), &["sim", "run", "--seeds", "8", "--rounds", "20"]);
    assert_eq!(report["seeds_run"], 8);
    assert_eq!(report["seeds_passed"], 8);
    assert_eq!(report["all_passed"], true);
    assert!(report["first_failure"].is_null());
}

#[test]
fn sim_run_text_is_key_value() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["sim", "run", "--seeds", "3", "--rounds", "12", "--reorder-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("campaign seeds_run=3 rounds=12"))
        .stdout(predicate::str::contains("all_passed=true"));
}

#[test]
fn sim_run_quiet_prints_nothing_on_success() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["sim", "run", "--seeds", "2", "--rounds", "10", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn sim_run_rejects_out_of_range_rates() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["sim", "run", "--seeds", "1", "--expiry", "150"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expiry rate must be a percentage"));
}

#[test]
fn sim_replay_json_is_deterministic() {
    let dir = TempDir::new().expect("tempdir");
    let args = ["sim", "replay", "--seed", "11", "--rounds", "24", "--trace"];
    let first = json_stdout(dir.path(), &args);
    let second = json_stdout(dir.path(), &args);
    assert_eq!(first, second);
    assert_eq!(first["seed"], 11);
    assert_eq!(first["oracle_passed"], true);
    assert_eq!(first["converged"], true);
    let trace = first["trace"].as_array().expect("trace included");
    assert_eq!(first["trace_events"], trace.len());
    assert!(trace.iter().all(|event| event.get("event").is_some()));
}

#[test]
fn sim_replay_uses_project_currency() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join(".tote")).expect("mkdir");
    fs::write(
        dir.path().join(".tote/config.toml"),
        "[cart]\ncurrency = \"EUR\"\n",
    )
    .expect("write config");

    let replay = json_stdout(dir.path(), &["sim", "replay", "--seed", "4", "--rounds", "16"]);
    let total = replay["settled_total"].as_str().expect("total");
    assert!(total.contains('€') || total.contains("EUR"), "total was {total}");
}

#[test]
fn layout_open_desktop_is_split() {
    let dir = TempDir::new().expect("tempdir");
    let geometry = json_stdout(dir.path(), &["layout", "--width", "1440", "--height", "900", "--open"]);
    assert_eq!(geometry["state"], "open");
    assert_eq!(geometry["class"], "desktop");
    assert_eq!(geometry["panel"]["mode"], "split");
    let panel = geometry["panel"]["width_px"].as_u64().expect("panel width");
    let content = geometry["content"]["width_px"].as_u64().expect("content width");
    assert_eq!(panel + content, 1440);
    assert_eq!(geometry["navbar"]["search_visible"], false);
}

#[test]
fn layout_open_mobile_is_overlay_with_scroll_lock() {
    let dir = TempDir::new().expect("tempdir");
    let geometry = json_stdout(dir.path(), &["layout", "--width", "390", "--height", "844", "--open"]);
    assert_eq!(geometry["class"], "mobile");
    assert_eq!(geometry["panel"]["mode"], "overlay");
    assert_eq!(geometry["panel"]["width_px"], 390);
    assert_eq!(geometry["page_scroll_locked"], true);
}

#[test]
fn layout_honors_project_breakpoint() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["config", "set", "layout.breakpoint_px", "1500"])
        .assert()
        .success();

    let geometry = json_stdout(dir.path(), &["layout", "--width", "1440", "--open"]);
    assert_eq!(geometry["class"], "mobile");
}

#[test]
fn layout_rejects_empty_viewport() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["layout", "--width", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("viewport must be at least 1x1"));
}

#[test]
fn config_show_reports_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let config = json_stdout(dir.path(), &["config", "show"]);
    assert_eq!(config["resolved_output"], "json");
    assert_eq!(config["project"]["layout"]["breakpoint_px"], 768);
    assert_eq!(config["project"]["storage"]["cookie_name"], "cartId");
    assert_eq!(config["project"]["cart"]["currency"], "USD");
}

#[test]
fn config_set_then_unset_round_trips_through_file() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["config", "set", "cart.currency", "gbp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("action=set"));

    let raw = fs::read_to_string(dir.path().join(".tote/config.toml")).expect("config written");
    assert!(raw.contains("currency = \"GBP\""));

    let config = json_stdout(dir.path(), &["config", "show"]);
    assert_eq!(config["project"]["cart"]["currency"], "GBP");

    tote_cmd(dir.path())
        .args(["config", "unset", "cart.currency"])
        .assert()
        .success();
    let config = json_stdout(dir.path(), &["config", "show"]);
    assert_eq!(config["project"]["cart"]["currency"], "USD");
}

#[test]
fn config_set_rejects_unknown_key() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["config", "set", "layout.gutter", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported key"));
    assert!(!dir.path().join(".tote/config.toml").exists());
}

#[test]
fn broken_project_config_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join(".tote")).expect("mkdir");
    fs::write(dir.path().join(".tote/config.toml"), "[cart]\ncurrency = \"dollars\"\n")
        .expect("write config");

    tote_cmd(dir.path())
        .args(["layout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid [cart] currency"));
}

#[test]
fn format_env_selects_json() {
    let dir = TempDir::new().expect("tempdir");
    let output = tote_cmd(dir.path())
        .env("FORMAT", "json")
        .args(["layout", "--width", "800"])
        .output()
        .expect("tote should not crash");
    assert!(output.status.success());
    let geometry: Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(geometry["class"], "desktop");
}

#[test]
fn timing_flag_reports_backend_calls() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["--timing", "sim", "run", "--seeds", "1", "--rounds", "8", "-q"])
        .assert()
        .success()
        .stderr(predicate::str::contains("timing report"))
        .stderr(predicate::str::contains("cmd.sim"));
}

#[test]
fn timing_flag_without_backend_calls_still_reports() {
    let dir = TempDir::new().expect("tempdir");
    tote_cmd(dir.path())
        .args(["--timing", "layout"])
        .assert()
        .success()
        .stderr(predicate::str::contains("cmd.layout"));
}
