//! CLI integration tests for awk-ai
//!
//! These tests run the awk-ai binary and verify command-line behavior.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::NamedTempFile;

fn spawn(args: &[&str], input: Option<&str>, env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_awk-ai"));
    cmd.args(args)
        .envs(env.iter().copied())
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().expect("binary should start");
    if let Some(input) = input
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin.write_all(input.as_bytes()).expect("stdin should accept input");
    }
    child.wait_with_output().expect("binary should finish")
}

/// Run awk-ai with the given arguments and input, returning stdout
fn run_awk_ai(args: &[&str], input: Option<&str>) -> Result<String, String> {
    let output = spawn(args, input, &[]);
    if output.status.success() {
        String::from_utf8(output.stdout).map_err(|e| e.to_string())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).to_string())
    }
}

#[test]
fn test_cli_help() {
    let output = run_awk_ai(&["--help"], None).unwrap();
    assert!(output.contains("Usage:"));
    assert!(output.contains("awk-ai"));
}

#[test]
fn test_cli_version() {
    let output = run_awk_ai(&["--version"], None).unwrap();
    assert!(output.starts_with("awk-ai "));
}

#[test]
fn test_cli_simple_program() {
    let output = run_awk_ai(&["BEGIN { print \"hello\" }"], None).unwrap();
    assert_eq!(output, "hello\n");
}

#[test]
fn test_cli_with_input() {
    let output = run_awk_ai(&["{ print $1 }"], Some("a b c")).unwrap();
    assert_eq!(output, "a\n");
}

#[test]
fn test_cli_field_separator() {
    let output = run_awk_ai(&["-F:", "{ print $1 }"], Some("a:b:c")).unwrap();
    assert_eq!(output, "a\n");
    let output = run_awk_ai(&["-F", ",", "{ print $2 }"], Some("a,b,c")).unwrap();
    assert_eq!(output, "b\n");
}

#[test]
fn test_cli_tab_separator() {
    let output = run_awk_ai(&["-Ft", "{ print $2 }"], Some("a b\tc\n")).unwrap();
    assert_eq!(output, "c\n");
    let output = run_awk_ai(&["-F\\t", "{ print $2 }"], Some("a b\tc\n")).unwrap();
    assert_eq!(output, "c\n");
}

#[test]
fn test_cli_variable() {
    let output = run_awk_ai(&["-v", "x=5", "BEGIN { print x + 1 }"], None).unwrap();
    assert_eq!(output, "6\n");
    let output = run_awk_ai(&["-v", "s=a\\tb", "BEGIN { print s }"], None).unwrap();
    assert_eq!(output, "a\tb\n");
}

#[test]
fn test_cli_program_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, r#"BEGIN {{ print "from file" }}"#).unwrap();

    let path = file.path().to_str().unwrap();
    let output = run_awk_ai(&["-f", path], None).unwrap();
    assert_eq!(output, "from file\n");
}

#[test]
fn test_cli_separator_end_of_options() {
    let output = run_awk_ai(&["--", "BEGIN { print \"test\" }"], None).unwrap();
    assert_eq!(output, "test\n");
}

#[test]
fn test_cli_stdin_dash() {
    let output = run_awk_ai(&["{ print }", "-"], Some("hello")).unwrap();
    assert_eq!(output, "hello\n");
}

#[test]
fn test_cli_multiple_inputs() {
    let mut file1 = NamedTempFile::new().unwrap();
    writeln!(file1, "a").unwrap();
    let mut file2 = NamedTempFile::new().unwrap();
    writeln!(file2, "b").unwrap();

    let path1 = file1.path().to_str().unwrap();
    let path2 = file2.path().to_str().unwrap();
    let output = run_awk_ai(&["{ print FNR, $0 } END { print NR, ARGC }", path1, path2], None).unwrap();
    assert_eq!(output, "1 a\n1 b\n2 3\n");
}

#[test]
fn test_cli_operand_assignment() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "x").unwrap();
    let path = file.path().to_str().unwrap();
    let output = run_awk_ai(&["{ print tag, $0 }", "tag=one", path, "tag=two", path], None).unwrap();
    assert_eq!(output, "one x\ntwo x\n");
}

#[test]
fn test_cli_exit_code() {
    let output = spawn(&["BEGIN { exit 3 }"], None, &[]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_cli_simulated_ai_functions() {
    let output = run_awk_ai(
        &["{ print ai_sentiment($0) \"|\" ai_fact_check($0) }"],
        Some("I love that the Pacific Ocean is the largest ocean\n"),
    )
    .unwrap();
    assert_eq!(output, "positive|true\n");
}

#[test]
fn test_cli_missing_input_file() {
    let output = spawn(&["{ print }", "/nonexistent/awk-ai-input"], None, &[]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/awk-ai-input"));
}

#[test]
fn test_cli_runtime_error_reports_line() {
    let output = spawn(&["BEGIN {\n  x = 1 / 0\n}"], None, &[]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("division by zero"));
    assert!(stderr.contains("line 2"));
}

#[test]
fn test_cli_debug_logging_goes_to_stderr() {
    let output = spawn(&["{ print }"], Some("x\n"), &[("AWK_AI_LOG", "debug")]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "x\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("main phase"));
}

#[test]
fn test_cli_error_no_program() {
    assert!(run_awk_ai(&[], None).is_err());
}

#[test]
fn test_cli_error_unknown_option() {
    assert!(run_awk_ai(&["--unknown"], None).is_err());
}

#[test]
fn test_cli_error_missing_option_args() {
    assert!(run_awk_ai(&["-f"], None).is_err());
    assert!(run_awk_ai(&["-v"], None).is_err());
    assert!(run_awk_ai(&["-F"], None).is_err());
}

#[test]
fn test_cli_error_invalid_v_arg() {
    assert!(run_awk_ai(&["-v", "invalid", "BEGIN { }"], None).is_err());
}

#[test]
fn test_cli_syntax_error() {
    let output = spawn(&["BEGIN { print ( }"], None, &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("syntax error"));
}
