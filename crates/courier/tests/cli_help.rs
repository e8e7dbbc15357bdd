use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn help_includes_top_level_commands() {
    let mut cmd = cargo_bin_cmd!("courier");
    cmd.arg("--help");

    let has_cmd = |name: &str| predicate::str::is_match(format!(r"(?m)^\s{{2}}{name}\b")).unwrap();

    cmd.assert()
        .success()
        .stdout(has_cmd("run"))
        .stdout(has_cmd("completion"));
}

#[test]
fn run_help_documents_the_token_and_assistant() {
    let mut cmd = cargo_bin_cmd!("courier");
    cmd.args(["run", "--help"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--telegram-token"))
        .stdout(predicate::str::contains("--assistant"));
}

#[test]
fn completion_emits_a_script() {
    let mut cmd = cargo_bin_cmd!("courier");
    cmd.args(["completion", "bash"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("courier"));
}
