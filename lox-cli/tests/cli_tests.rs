//! Integration tests for the Lox CLI.
//!
//! These tests invoke the `lox` binary as a subprocess and check
//! exit codes, stdout, and stderr.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(deprecated)]
fn lox() -> Command {
    Command::cargo_bin("lox").unwrap()
}

/// Write `source` to a script file inside `dir`.
fn script(dir: &TempDir, source: &str) -> PathBuf {
    let path = dir.path().join("test.lox");
    fs::write(&path, source).unwrap();
    path
}

// ---- Usage ----

#[test]
fn help_flag_exits_0() {
    lox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: lox"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    lox()
        .arg("--frobnicate")
        .assert()
        .failure()
        .code(64)
        .stderr(predicate::str::contains("--frobnicate"));
}

#[test]
fn too_many_paths_is_a_usage_error() {
    lox().args(["a.lox", "b.lox"]).assert().failure().code(64);
}

// ---- Running files ----

#[test]
fn run_prints_program_output() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "print 1 + 2;\nprint \"hi\";\n");

    lox()
        .arg(&path)
        .assert()
        .success()
        .stdout("3\nhi\n");
}

#[test]
fn compile_error_exits_65() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "print ;");

    lox()
        .arg(&path)
        .assert()
        .failure()
        .code(65)
        .stderr(predicate::str::contains(
            "[line 1] Error at ';': Expect expression.",
        ));
}

#[test]
fn runtime_error_exits_70_with_trace() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "print 1;\nfun f() {\n  return -nil;\n}\nf();\n");

    lox()
        .arg(&path)
        .assert()
        .failure()
        .code(70)
        .stdout("1\n")
        .stderr(predicate::str::contains(
            "Operand must be a number.\n[line 3] in f()\n[line 5] in script",
        ));
}

#[test]
fn missing_file_exits_74() {
    lox()
        .arg("nonexistent.lox")
        .assert()
        .failure()
        .code(74)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn stress_gc_flag_runs_program() {
    let dir = TempDir::new().unwrap();
    let path = script(
        &dir,
        "class A { init(s) { this.s = s; } }\nvar a = A(\"x\" + \"y\");\nprint a.s;\n",
    );

    lox()
        .args(["--stress-gc", "--gc-threshold", "1024"])
        .arg(&path)
        .assert()
        .success()
        .stdout("xy\n");
}

// ---- Disassembly ----

#[test]
fn disassemble_prints_every_function() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "fun f() { return 1; }\nprint f();\n");

    lox()
        .arg("--disassemble")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("== <script> =="))
        .stdout(predicate::str::contains("== f =="))
        .stdout(predicate::str::contains("OP_RETURN"));
}

#[test]
fn disassemble_does_not_run_the_program() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "print \"side effect\";");

    lox()
        .arg("--disassemble")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("OP_PRINT"))
        .stdout(predicate::str::contains("side effect\n").not());
}

#[test]
fn disassemble_reports_compile_errors() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "var;");

    lox()
        .arg("--disassemble")
        .arg(&path)
        .assert()
        .failure()
        .code(65)
        .stderr(predicate::str::contains("Expect variable name."));
}

#[test]
fn disassemble_requires_a_path() {
    lox().arg("--disassemble").assert().failure().code(64);
}

// ---- REPL ----

#[test]
fn repl_keeps_globals_between_lines() {
    lox()
        .write_stdin("var a = 20;\nprint a + 22;\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42\n"))
        .stdout(predicate::str::starts_with("> "));
}

#[test]
fn repl_continues_after_errors() {
    lox()
        .write_stdin("print nope;\nprint ;\nprint \"still here\";\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("still here"))
        .stderr(predicate::str::contains("Undefined variable 'nope'."))
        .stderr(predicate::str::contains("Expect expression."));
}
