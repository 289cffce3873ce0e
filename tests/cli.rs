use std::io::Write;
use std::process::{Command, Output};

fn kite() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kite"))
}

fn source_file(src: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".kite").tempfile().expect("create temp file");
    file.write_all(src.as_bytes()).expect("write source");
    file
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

// --- Running programs ---

#[test]
fn runs_a_file() {
    let file = source_file("fn main() {\n  let x = 0\n  while x < 3 {\n    x += 1\n    : x\n  }\n}\n");
    let out = kite().arg(file.path()).output().expect("failed to run kite");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "1\n2\n3\n");
}

#[test]
fn runs_inline_source() {
    let out = kite().args(["-e", "fn main() { : 6 * 7 }"]).output().expect("failed to run kite");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "42");
}

#[test]
fn no_optimize_gives_same_output() {
    let src = "fn main() { let a = 3; let b = a * a; : b - 1 }";
    let plain = kite().args(["--no-optimize", "-e", src]).output().expect("failed to run kite");
    let folded = kite().args(["-e", src]).output().expect("failed to run kite");
    assert_eq!(stdout(&plain), "8\n");
    assert_eq!(stdout(&plain), stdout(&folded));
}

// --- Exit codes ---

#[test]
fn compile_error_exits_65_with_code() {
    let out = kite().args(["--no-color", "-e", "fn main() {\n  if 1 { }\n}"]).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(65));
    let err = stderr(&out);
    assert!(err.contains("error[K-V001]"), "stderr: {err}");
    assert!(err.contains("--> line 2"), "stderr: {err}");
    assert!(stdout(&out).is_empty());
}

#[test]
fn runtime_error_exits_70() {
    let src = "fn f(a: int) {\n}\nfn main() {\n  : 1\n  f(true)\n}";
    let out = kite().args(["--no-color", "-e", src]).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(70));
    assert_eq!(stdout(&out), "1\n");
    let err = stderr(&out);
    assert!(err.contains("error[K-R009]"), "stderr: {err}");
    assert!(err.contains("in function 'main'"), "stderr: {err}");
}

#[test]
fn missing_file_exits_66() {
    let out = kite().arg("/definitely/not/here.kite").output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(66));
    assert!(stderr(&out).contains("cannot read"));
}

#[test]
fn no_input_is_a_usage_error() {
    let out = kite().output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(64));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let out = kite().arg("--frobnicate").output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(64));
}

#[test]
fn max_frames_flag_limits_recursion() {
    let src = "fn down(n: int) {\n  if n > 0 {\n    down(n - 1)\n  }\n}\nfn main() {\n  down(20)\n}";
    let ok = kite().args(["-e", src]).output().expect("failed to run kite");
    assert!(ok.status.success(), "stderr: {}", stderr(&ok));
    let out = kite().args(["--max-frames", "10", "--no-color", "-e", src]).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(70));
    assert!(stderr(&out).contains("K-R010"));
}

// --- Diagnostics ---

#[test]
fn parse_error_shows_snippet_and_suggestion() {
    let file = source_file("fn main() {\n  let count = 1\n  : cuont\n}\n");
    let out = kite().arg("--no-color").arg(file.path()).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(65));
    let err = stderr(&out);
    assert!(err.contains("error[K-P005]: undefined variable 'cuont'"), "stderr: {err}");
    assert!(err.contains("--> 3:5"), "stderr: {err}");
    assert!(err.contains("^^^^^"), "stderr: {err}");
    assert!(err.contains("did you mean 'count'?"), "stderr: {err}");
}

#[test]
fn json_diagnostics_are_one_object_per_line() {
    let src = "fn main() {\n  : a\n  : b\n}";
    let out = kite().args(["--json", "-e", src]).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(65));
    let err = stderr(&out);
    let lines: Vec<&str> = err.lines().filter(|l| l.starts_with('{')).collect();
    assert_eq!(lines.len(), 2, "stderr: {err}");
    for line in lines {
        let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON");
        assert_eq!(v["code"], "K-P005");
        assert_eq!(v["severity"], "error");
    }
}

#[test]
fn explain_prints_long_text() {
    let out = kite().args(["--explain", "K-R009"]).output().expect("failed to run kite");
    assert!(out.status.success());
    assert!(stdout(&out).starts_with("## K-R009"));

    let out = kite().args(["--explain", "K-Z000"]).output().expect("failed to run kite");
    assert_eq!(out.status.code(), Some(64));
}

// --- Inspection ---

#[test]
fn disassemble_lists_every_function_without_running() {
    let out = kite()
        .args(["--disassemble", "-e", "fn main() {\n  : 1 + 2\n}"])
        .output()
        .expect("failed to run kite");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("== script =="), "{text}");
    assert!(text.contains("== main =="), "{text}");
    assert!(text.contains("PRINT_POP"), "{text}");
    assert!(text.contains("'3'"), "folded constant missing: {text}");
    assert!(!text.lines().any(|l| l == "3"), "program should not run: {text}");
}

#[test]
fn dump_ir_is_json() {
    let out = kite().args(["--dump-ir", "-e", "fn main() {\n  : 2 * 4\n}"]).output().expect("failed to run kite");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("IR is JSON");
    assert!(v["stmts"].is_array());
    assert!(stdout(&out).contains(r#""Int": 8"#), "{}", stdout(&out));
}
