//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("pcmflash")
}

const IMAGE: &str = "\
:020000040000FA
:10000000000102030405060708090A0B0C0D0E0F78
:0400000500000000F7
:00000001FF
";

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("pcmflash"))
        .stdout(predicate::str::contains("Usage"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pcmflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn non_interactive_environment_variable_works() {
    let mut cmd = cli_cmd();
    cmd.env("PCMFLASH_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_invalid_ip() {
    let mut cmd = cli_cmd();
    cmd.args(["set-ip", "300.1.1.1"]).assert().failure().code(2);
}

#[test]
fn exit_code_two_for_invalid_device_id() {
    let mut cmd = cli_cmd();
    cmd.args(["--device-id", "zz", "exit-loader"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn erase_without_region_is_usage_error() {
    let mut cmd = cli_cmd();
    cmd.arg("erase")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--all"));
}

#[test]
fn erase_non_interactive_without_yes_refuses() {
    let mut cmd = cli_cmd();
    cmd.args(["--non-interactive", "erase", "--all"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn reset_without_target_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env_remove("PCMFLASH_TARGET")
        .arg("reset")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn exit_code_three_for_missing_config_file() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.arg("--config")
        .arg(dir.path().join("missing.toml"))
        .args(["info", "whatever.hex"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn invalid_local_config_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("pcmflash.toml"), "invalid toml [[[").expect("write config");
    fs::write(dir.path().join("fw.hex"), IMAGE).expect("write image");

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["info", "fw.hex"])
        .output()
        .expect("command should execute");
    assert!(output.status.success(), "command should succeed despite config warning");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

#[test]
fn exit_code_one_for_missing_image() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(dir.path().join("does_not_exist.hex"))
        .assert()
        .failure()
        .code(1);
}

#[test]
fn burn_rejects_corrupt_image_before_networking() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("bad.hex");
    fs::write(&image, ":00000001FE\n").expect("write image");

    let mut cmd = cli_cmd();
    cmd.args(["--yes", "burn"])
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("verification failed"));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.hex");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn info_json_is_valid_json_without_extra_lines() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.hex");
    fs::write(&image, IMAGE).expect("write image");

    let output = cli_cmd()
        .current_dir(dir.path())
        .args(["info", "--json"])
        .arg(&image)
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["lines"], 4);
    assert_eq!(parsed["data"]["transmitted"], 3);
    assert_eq!(parsed["data"]["skipped"], 1);
    assert_eq!(parsed["data"]["checksums_valid"], true);
}

#[test]
fn info_command_with_valid_file_writes_summary_to_stderr() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("fw.hex");
    fs::write(&image, IMAGE).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("info")
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("To upload:   3"));
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_pcmflash()"));
}

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg("--")
        .arg(dir.path().join("-image.hex"))
        .assert()
        .failure()
        .code(1);
}

#[test]
fn colors_disabled_when_not_tty() {
    let output = cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(!stdout.contains("\x1b["), "Colors should be disabled in non-TTY mode");
}
