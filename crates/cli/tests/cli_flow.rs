use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn codeplay(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("codeplay").expect("binary");
    cmd.arg("--quiet").arg("--store").arg(store);
    cmd
}

fn status_json(store: &Path) -> Value {
    let output = codeplay(store)
        .args(["status", "--json"])
        .output()
        .expect("status run");
    assert!(output.status.success(), "status failed: {output:?}");
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn game<'a>(status: &'a Value, id: &str) -> &'a Value {
    status["games"]
        .as_array()
        .expect("games array")
        .iter()
        .find(|game| game["game"]["id"] == id)
        .expect("game present")
}

#[test]
fn fresh_store_starts_unlocked() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");

    let status = status_json(&store);
    assert_eq!(status["total_lines_written"], 0);
    assert_eq!(status["state_scope"], "per_game");
    for id in ["snake", "whack-a-mole"] {
        let state = &game(&status, id)["state"];
        assert_eq!(state["status"], "unlocked");
        assert_eq!(state["plays_remaining"], 5);
    }
    assert!(store.exists(), "registration should persist initial state");
}

#[test]
fn playing_spends_credits_until_locked() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");

    for score in [3, 9, 4, 1] {
        codeplay(&store)
            .args(["play", "snake", "--score", &score.to_string()])
            .assert()
            .success();
    }
    codeplay(&store)
        .args(["play", "snake", "--score", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("high score 9"))
        .stdout(predicate::str::contains("Out of plays"));

    codeplay(&store)
        .args(["play", "snake", "--score", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Snake is locked. Write 50 more lines of code to unlock it",
        ));

    let status = status_json(&store);
    let snake = game(&status, "snake");
    assert_eq!(snake["state"]["status"], "locked");
    assert_eq!(snake["stats"]["total_plays"], 5);
    assert_eq!(snake["lines_remaining"], 50);
    assert_eq!(
        game(&status, "whack-a-mole")["state"]["plays_remaining"],
        5
    );
}

#[test]
fn play_reads_game_messages_from_stdin() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");

    let output = codeplay(&store)
        .args(["play", "whack-a-mole", "--json"])
        .write_stdin("{\"type\":\"ready\"}\nnot json\n{\"type\":\"gameOver\",\"score\":12}\n")
        .output()
        .expect("play run");
    assert!(output.status.success(), "play failed: {output:?}");
    let body: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(body["completed"], true);
    assert_eq!(body["stats"]["high_score"], 12);
    assert_eq!(body["state"]["plays_remaining"], 4);

    // closing the window without a game over is free
    let output = codeplay(&store)
        .args(["play", "whack-a-mole", "--json"])
        .write_stdin("{\"type\":\"log\",\"text\":\"hi\"}\n")
        .output()
        .expect("play run");
    assert!(output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(body["completed"], false);
    assert_eq!(body["state"]["plays_remaining"], 4);
}

#[test]
fn unknown_game_is_rejected_without_writes() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");
    status_json(&store);
    let before = fs::read_to_string(&store).expect("store");

    codeplay(&store)
        .args(["play", "ghost", "--score", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown game: ghost"));
    assert_eq!(fs::read_to_string(&store).expect("store"), before);
}

#[test]
fn admin_commands_override_state() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");

    codeplay(&store)
        .args(["lock", "snake"])
        .assert()
        .success()
        .stdout(predicate::str::contains("snake: locked, 0/50 lines"));
    codeplay(&store)
        .args(["unlock", "snake"])
        .assert()
        .success()
        .stdout(predicate::str::contains("snake: unlocked, 5 plays left"));

    codeplay(&store)
        .args(["play", "snake", "--score", "30"])
        .assert()
        .success();
    codeplay(&store)
        .args(["reset", "snake"])
        .assert()
        .success();
    let status = status_json(&store);
    assert_eq!(game(&status, "snake")["stats"]["high_score"], 0);
    assert_eq!(game(&status, "snake")["state"]["plays_remaining"], 5);

    codeplay(&store).args(["lock", "snake"]).assert().success();
    codeplay(&store)
        .arg("reset-all")
        .assert()
        .success()
        .stdout(predicate::str::contains("All game state cleared"));
    assert_eq!(
        game(&status_json(&store), "snake")["state"]["status"],
        "unlocked"
    );
}

#[test]
fn export_and_import_move_state_between_stores() {
    let temp = tempdir().expect("tempdir");
    let source = temp.path().join("source.json");
    let target = temp.path().join("target.json");
    let dump = temp.path().join("dump.json");

    codeplay(&source)
        .args(["play", "snake", "--score", "77"])
        .assert()
        .success();
    codeplay(&source)
        .args(["export", "--out"])
        .arg(&dump)
        .assert()
        .success();

    codeplay(&target)
        .arg("import")
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported"));
    let status = status_json(&target);
    assert_eq!(game(&status, "snake")["stats"]["high_score"], 77);
    assert_eq!(game(&status, "snake")["state"]["plays_remaining"], 4);

    let bad = temp.path().join("bad.json");
    fs::write(&bad, r#"{"codeplay.total_lines": 1, "editor.theme": "dark"}"#).expect("write");
    codeplay(&target)
        .arg("import")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed import"));
    assert_eq!(status_json(&target)["total_lines_written"], 0);
}

#[test]
fn config_file_sets_thresholds() {
    let temp = tempdir().expect("tempdir");
    let store = temp.path().join("state.json");
    let config = temp.path().join("codeplay.toml");
    fs::write(
        &config,
        "[unlock]\ninitial_play_credits = 0\nlines_required_to_unlock = 10\n",
    )
    .expect("write config");

    codeplay(&store)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("locked, 0/10 lines"));

    fs::write(&config, "[unlock]\nlines_required_to_unlock = 0\n").expect("write config");
    codeplay(&store)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config"));
}
