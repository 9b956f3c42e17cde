use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("maddpg").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MADDPG - multi-agent actor-critic training in Rust"));
}

#[test]
fn test_cli_variants() {
    let mut cmd = Command::cargo_bin("maddpg").unwrap();
    cmd.arg("variants")
        .assert()
        .success()
        .stdout(predicate::str::contains("Available variants:"))
        .stdout(predicate::str::contains("m3ddpg"));
}

#[test]
fn test_cli_demo() {
    let mut cmd = Command::cargo_bin("maddpg").unwrap();
    cmd.arg("demo")
        .arg("--steps")
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains("Step 2: reward="));
}

#[test]
fn test_cli_rejects_unknown_variant() {
    let mut cmd = Command::cargo_bin("maddpg").unwrap();
    cmd.args(["train", "--variant", "ppo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown policy variant"));
}

#[test]
fn test_cli_train_short_run() {
    let dir = std::env::temp_dir().join(format!("maddpg-cli-{}", std::process::id()));
    let mut cmd = Command::cargo_bin("maddpg").unwrap();
    cmd.args([
        "train",
        "--variant",
        "m3ddpg",
        "--agents",
        "2",
        "--adversaries",
        "1",
        "--steps",
        "60",
        "--batch-size",
        "16",
        "--update-every",
        "20",
        "--hidden",
        "16",
    ])
    .arg("--save-dir")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("Training complete"));

    assert!(dir.join("adversary_0.json").exists());
    assert!(dir.join("agent_1.json").exists());
    let _ = std::fs::remove_dir_all(&dir);
}
