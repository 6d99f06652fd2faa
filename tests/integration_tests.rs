use assert_cmd::Command;
use predicates::str::contains;

fn predsim() -> Command {
    Command::cargo_bin("predsim").unwrap()
}

#[test]
fn runs_without_arguments() {
    predsim().assert().success();
}

#[test]
fn runs_sum() {
    predsim()
        .arg("run")
        .arg("tests/files/sum.asm")
        .arg("--minimal")
        .assert()
        .success()
        .stdout("OUT 0x1F1: 8\n")
        .stderr(contains("Halted at 0x003"));
}

#[test]
fn runs_bare_path() {
    predsim()
        .arg("tests/files/sum.asm")
        .assert()
        .success()
        .stdout(contains("OUT 0x1F1: 8"));
}

#[test]
fn feeds_input_from_argument() {
    predsim()
        .arg("run")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .arg("--input")
        .arg("3")
        .assert()
        .success()
        .stdout("OUT 0x1F1: 3\nOUT 0x1F1: 2\nOUT 0x1F1: 1\n");
}

#[test]
fn feeds_input_from_stdin() {
    predsim()
        .arg("run")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .write_stdin("0x2\n")
        .assert()
        .success()
        .stdout("OUT 0x1F1: 2\nOUT 0x1F1: 1\n");
}

#[test]
fn stops_when_input_runs_out() {
    predsim()
        .arg("run")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .assert()
        .success()
        .stdout("")
        .stderr(contains("No more input"));
}

#[test]
fn traces_instructions() {
    predsim()
        .arg("run")
        .arg("tests/files/sum.asm")
        .arg("--trace")
        .assert()
        .success()
        .stderr(contains("ADD R0, R1, #5"));
}

#[test]
fn checks_valid_file() {
    predsim()
        .arg("check")
        .arg("tests/files/countdown.asm")
        .assert()
        .success()
        .stderr(contains("7 instructions"));
}

#[test]
fn reports_every_error() {
    predsim()
        .arg("check")
        .arg("tests/files/errors.asm")
        .assert()
        .failure()
        .stderr(contains("asm::mnemonic"))
        .stderr(contains("asm::range"))
        .stderr(contains("asm::undefined_label"))
        .stderr(contains("3 errors"));
}

#[test]
fn refuses_to_run_bad_file() {
    predsim()
        .arg("run")
        .arg("tests/files/errors.asm")
        .assert()
        .failure()
        .stdout("");
}

#[test]
fn rejects_unknown_extension() {
    predsim()
        .arg("run")
        .arg("Cargo.toml")
        .assert()
        .failure()
        .stderr(contains(".asm"));
}

#[test]
fn lists_program() {
    predsim()
        .arg("list")
        .arg("tests/files/countdown.asm")
        .assert()
        .success()
        .stdout(contains("LOOP:"))
        .stdout(contains("  0x001  11F1  MEMORY  STR 0x1F1"))
        .stdout(contains("(P1) B 0x001"))
        .stdout(contains("  0x006  F000  HLT     HLT"))
        .stdout(contains("HLT").count(2));
}

#[test]
fn debugs_countdown() {
    predsim()
        .arg("debug")
        .arg("tests/files/countdown.asm")
        .arg("--minimal")
        .arg("--command")
        .arg("step; input 2; run; output; quit")
        .assert()
        .success()
        .stdout("OUT 0x1F1: 2\nOUT 0x1F1: 1\n")
        .stderr(contains("0x1F1: 2\n0x1F1: 1\n"))
        .stderr(contains("Halted at 0x006"));
}

#[test]
fn debugger_reports_bad_commands() {
    predsim()
        .arg("debug")
        .arg("tests/files/sum.asm")
        .arg("--minimal")
        .arg("--command")
        .arg("jump; input 4; step 99; registers")
        .assert()
        .success()
        .stderr(contains("Not a command: `jump`"))
        .stderr(contains("not waiting for input"))
        .stderr(contains("R0 8\n"))
        .stderr(contains("PC 4\n"));
}

#[test]
fn debugger_restarts_program() {
    predsim()
        .arg("debug")
        .arg("tests/files/sum.asm")
        .arg("--minimal")
        .arg("--command")
        .arg("run; restart; step 2; mem 0x1F1")
        .assert()
        .success()
        .stdout("OUT 0x1F1: 8\n")
        .stderr(contains("PC at 0x002"));
}
