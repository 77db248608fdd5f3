//! End-to-end tests for the `kb` command-line interface.
#![allow(deprecated)] // Command::cargo_bin – macro replacement not yet stable

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Write a two-sided skirmish to a temp directory.
fn test_encounter() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("skirmish.json");
    fs::write(
        &path,
        r#"{
    "combatants": [
        {
            "id": "knight",
            "side": "heroes",
            "health": 14,
            "armor": 14,
            "actions": [
                {
                    "name": "longsword",
                    "targeting": "enemy",
                    "effect": { "kind": "attack", "to_hit": "1d20+5", "damage": "1d8+3" }
                }
            ]
        },
        {
            "id": "goblin-a",
            "side": "monsters",
            "health": 7,
            "armor": 12,
            "actions": [
                {
                    "name": "scimitar",
                    "targeting": "enemy",
                    "effect": { "kind": "attack", "to_hit": "1d20+4", "damage": "1d6+2" }
                }
            ]
        },
        {
            "id": "goblin-b",
            "side": "monsters",
            "health": 7,
            "armor": 12,
            "actions": [
                {
                    "name": "shortbow",
                    "targeting": "enemy",
                    "effect": { "kind": "attack", "to_hit": "1d20+4", "damage": "1d6+2" }
                }
            ]
        }
    ],
    "policies": { "heroes": "focus-weakest" }
}
"#,
    )
    .unwrap();
    (dir, path)
}

fn kb() -> Command {
    Command::cargo_bin("kb").unwrap()
}

// ---------------------------------------------------------------------------
// roll
// ---------------------------------------------------------------------------

#[test]
fn roll_seeded_is_reproducible() {
    kb().args(["roll", "2d6+3", "--seed", "42"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("2d6+3")
                .and(predicate::str::contains("[6, 3]"))
                .and(predicate::str::contains("12")),
        );
}

#[test]
fn roll_json_reports_totals() {
    let output = kb()
        .args(["roll", "4d6kh3", "--seed", "42", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["entropy"], "deterministic");
    assert_eq!(report["rolls"].as_array().unwrap().len(), 1);
    assert_eq!(report["total"], 12);
    assert!(report.get("audit").is_none());
}

#[test]
fn roll_many_times_prints_summary() {
    kb().args(["roll", "1d20", "--seed", "7", "-n", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total").and(predicate::str::contains("mean")));
}

#[test]
fn roll_times_zero_fails() {
    kb().args(["roll", "1d20", "--seed", "7", "-n", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--times must be at least 1"));
}

#[test]
fn roll_audit_includes_trail() {
    let output = kb()
        .args(["roll", "1d20", "--seed", "3", "-n", "2", "--audit", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = report["audit"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn roll_rejects_unknown_provider() {
    kb().args(["roll", "1d6", "--trusted", "carrier-pigeon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown entropy provider"));
}

#[test]
fn roll_seed_conflicts_with_trusted() {
    kb().args(["roll", "1d6", "--seed", "1", "--trusted", "os"])
        .assert()
        .failure();
}

#[test]
fn roll_invalid_notation_points_at_error() {
    kb().args(["roll", "2dx", "--seed", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid dice notation"));
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[test]
fn check_prints_canonical_form() {
    kb().args(["check", "4d6kh3"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("4d6kh3")
                .and(predicate::str::contains("4 × d6"))
                .and(predicate::str::contains("keep highest 3")),
        );
}

#[test]
fn check_describes_advantage() {
    kb().args(["check", "1d20adv+5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("keep the higher total"));
}

#[test]
fn check_fails_invalid_notation() {
    kb().args(["check", "d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid dice notation"));
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

#[test]
fn verify_reports_operational() {
    kb().arg("verify")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("entropy.d6")
                .and(predicate::str::contains("dice.4d6kh3"))
                .and(predicate::str::contains("operational")),
        );
}

#[test]
fn verify_json_lists_checks() {
    let output = kb().args(["verify", "--json"]).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "operational");
    let checks = report["checks"].as_array().unwrap();
    assert!(checks.iter().all(|c| c["passed"] == true));
    assert!(checks.iter().any(|c| c["name"] == "audit.replay"));
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

#[test]
fn simulate_prints_win_table() {
    let (_dir, path) = test_encounter();
    kb().args(["simulate", path.to_str().unwrap(), "-n", "50", "-s", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("heroes")
                .and(predicate::str::contains("monsters"))
                .and(predicate::str::contains("Win rate"))
                .and(predicate::str::contains("rounds")),
        );
}

#[test]
fn simulate_json_is_reproducible() {
    let (_dir, path) = test_encounter();
    let run = |workers: &str| {
        let output = kb()
            .args(["simulate", path.to_str().unwrap(), "-n", "200", "-s", "9"])
            .args(["-w", workers, "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        output.stdout
    };
    let one = run("1");
    assert_eq!(one, run("3"));

    let summary: serde_json::Value = serde_json::from_slice(&one).unwrap();
    assert_eq!(summary["trial_count"], 200);
    assert_eq!(summary["completed"], 200);
    assert_eq!(summary["sides"].as_array().unwrap().len(), 2);
}

#[test]
fn simulate_with_metric() {
    let (_dir, path) = test_encounter();
    kb().args(["simulate", path.to_str().unwrap(), "-n", "20"])
        .args(["--metric", "damage:monsters"])
        .assert()
        .success()
        .stdout(predicate::str::contains("damage:monsters"));
}

#[test]
fn simulate_config_file_with_override() {
    let (dir, path) = test_encounter();
    let config = dir.path().join("sim.json");
    fs::write(&config, r#"{ "trial_count": 5000, "seed": 11, "max_rounds": 30 }"#).unwrap();

    let output = kb()
        .args(["simulate", path.to_str().unwrap(), "--json"])
        .args(["-c", config.to_str().unwrap(), "-n", "25"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["trial_count"], 25);
    assert_eq!(summary["seed"], 11);
}

#[test]
fn simulate_zero_trials_fails() {
    let (_dir, path) = test_encounter();
    kb().args(["simulate", path.to_str().unwrap(), "-n", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least one trial"));
}

#[test]
fn simulate_bad_metric_fails() {
    let (_dir, path) = test_encounter();
    kb().args(["simulate", path.to_str().unwrap(), "--metric", "style"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn simulate_unknown_policy_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("duel.json");
    fs::write(
        &path,
        r#"{
    "combatants": [
        { "id": "a", "side": "red", "health": 5 },
        { "id": "b", "side": "blue", "health": 5 }
    ],
    "default_policy": "berserk"
}"#,
    )
    .unwrap();

    kb().args(["simulate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown policy 'berserk'"));
}

#[test]
fn simulate_one_sided_encounter_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("alone.json");
    fs::write(
        &path,
        r#"{ "combatants": [ { "id": "a", "side": "red", "health": 5 } ] }"#,
    )
    .unwrap();

    kb().args(["simulate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid encounter"));
}

#[test]
fn simulate_missing_file_fails() {
    kb().args(["simulate", "/nonexistent/encounter.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn simulate_accepts_side_profiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("profiled.json");
    fs::write(
        &path,
        r#"{
    "combatants": [
        {
            "id": "cleric",
            "side": "heroes",
            "health": 12,
            "actions": [
                { "name": "mace", "targeting": "enemy",
                  "effect": { "kind": "attack", "to_hit": "1d20+4", "damage": "1d6+2" } },
                { "name": "mend", "targeting": "ally",
                  "effect": { "kind": "heal", "amount": "1d8+2" } }
            ]
        },
        {
            "id": "ogre",
            "side": "monsters",
            "health": 20,
            "actions": [
                { "name": "club", "targeting": "enemy",
                  "effect": { "kind": "attack", "to_hit": "1d20+5", "damage": "2d8+4" } }
            ]
        }
    ],
    "default_policy": "focus-weakest",
    "profiles": { "heroes": { "aggression": 0.1, "risk_tolerance": 0.2 } }
}"#,
    )
    .unwrap();

    let output = kb()
        .args(["simulate", path.to_str().unwrap(), "-n", "40", "-s", "5", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["trial_count"], 40);
}
