use kite::vm::VmError;
use kite::{run_source, CompileFailure, Config, InterpretResult};

fn config() -> Config {
    Config { echo: false, ..Config::default() }
}

fn unoptimized() -> Config {
    Config { optimize: false, ..config() }
}

fn output(src: &str) -> Vec<String> {
    let run = run_source(src, &config());
    match run.result {
        InterpretResult::Ok => run.output,
        other => panic!("expected success, got {:?}", other),
    }
}

fn runtime_error(src: &str) -> kite::vm::RuntimeError {
    match run_source(src, &config()).result {
        InterpretResult::RuntimeError(e) => e,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

fn compile_errors(src: &str) -> Vec<CompileFailure> {
    match run_source(src, &config()).result {
        InterpretResult::CompileError(errors) => errors,
        other => panic!("expected compile errors, got {:?}", other),
    }
}

// --- Core scenarios ---

#[test]
fn loop_counter_is_not_folded() {
    let src = "fn main() { let x = 0; while x < 3 { x = x + 1; : x; } }";
    assert_eq!(output(src), ["1", "2", "3"]);
}

#[test]
fn field_updates_persist_across_method_calls() {
    let src = "\
class Counter {
  let count = 0
  fn bump(): int {
    this.count += 1
    return this.count
  }
}
fn main() {
  let c = Counter()
  c.bump()
  c.bump()
  : c.bump()
  : c.count
}";
    assert_eq!(output(src), ["3", "3"]);
}

#[test]
fn argument_type_is_checked_at_call_boundary() {
    let src = "fn half(n: int): int {\n  return n / 2\n}\nfn main() {\n  : half(3.5)\n}";
    let err = runtime_error(src);
    assert!(matches!(err.kind, VmError::ArgumentType { ref param, .. } if param == "n"), "{err}");
    assert_eq!(err.line, 5);
    assert!(err.to_string().starts_with("[line 5] in main:"), "{err}");
}

// --- Optimizer soundness ---

#[test]
fn optimizer_does_not_change_printed_output() {
    let programs = [
        "fn main() {\n  let a = 2\n  let b = a * 3 + 1\n  : b - a\n}",
        "fn main() {\n  let x = 10\n  if x > 5 {\n    x = x / 2\n  } else {\n    x = 0\n  }\n  : x\n}",
        "fn main() {\n  let i = 0\n  let total = 0\n  while i < 5 {\n    total += i * i\n    i += 1\n  }\n  : total\n}",
        "fn main() {\n  let t = true\n  let f = !t\n  : t and f\n  : t or f\n  : 1 != 2\n}",
        "fn main() {\n  let d = 1.5d\n  let l = 10L\n  : l * 2 - 1\n  : d / 0.5d\n}",
        "let g = 7\nfn twice(n: int): int {\n  return n + n\n}\nfn main() {\n  : twice(g)\n}",
    ];
    for src in programs {
        let folded = run_source(src, &config());
        let plain = run_source(src, &unoptimized());
        assert!(matches!(folded.result, InterpretResult::Ok), "{src}: {:?}", folded.result);
        assert!(matches!(plain.result, InterpretResult::Ok), "{src}: {:?}", plain.result);
        assert_eq!(folded.output, plain.output, "{src}");
    }
}

#[test]
fn unused_binding_still_runs_its_call() {
    let src = "fn noisy(): int {\n  : 42\n  return 1\n}\nfn main() {\n  let unused = noisy()\n}";
    assert_eq!(output(src), ["42"]);
}

#[test]
fn code_after_return_never_runs() {
    let src = "fn f(): int {\n  return 1\n  : 99\n}\nfn main() {\n  : f()\n}";
    assert_eq!(output(src), ["1"]);
}

#[test]
fn conditional_write_is_not_assumed() {
    let src = "fn pick(flag: bool): int {\n  let x = 1\n  if flag {\n    x = 2\n  }\n  return x\n}\nfn main() {\n  : pick(true)\n  : pick(false)\n}";
    assert_eq!(output(src), ["2", "1"]);
}

#[test]
fn reassigned_global_is_read_fresh() {
    let src = "let n = 1\nfn bump() {\n  n = n + 1\n}\nfn main() {\n  bump()\n  bump()\n  : n\n}";
    assert_eq!(output(src), ["3"]);
}

// --- Language surface ---

#[test]
fn for_loop_runs_increment_last() {
    let src = "fn main() {\n  for let i = 0; i < 3; i += 1 {\n    : i\n  }\n}";
    assert_eq!(output(src), ["0", "1", "2"]);
}

#[test]
fn recursion_through_globals() {
    let src = "fn fib(n: int): int {\n  if n < 2 {\n    return n\n  }\n  return fib(n - 1) + fib(n - 2)\n}\nfn main() {\n  : fib(15)\n}";
    assert_eq!(output(src), ["610"]);
}

#[test]
fn mixed_numeric_kinds_follow_left_operand() {
    let src = "fn main() {\n  let i = 7\n  : i / 2\n  let f = 7.0\n  : f / 2\n}";
    assert_eq!(output(src), ["3", "3.5"]);
}

#[test]
fn short_circuit_skips_right_side() {
    let src = "\
fn boom(): bool {
  : 0
  return true
}
fn main() {
  : false and boom()
  : true or boom()
  : true and boom()
}";
    assert_eq!(output(src), ["false", "true", "0", "true"]);
}

#[test]
fn instances_alias_through_variables() {
    let src = "\
class Cell {
  let v = 1
}
fn main() {
  let a = Cell()
  let b = a
  b.v = 5
  : a.v
}";
    assert_eq!(output(src), ["5"]);
}

#[test]
fn function_without_return_yields_zero_value() {
    let src = "fn f(flag: bool): int {\n  if flag {\n    return 9\n  }\n}\nfn main() {\n  : f(true)\n  : f(false)\n}";
    assert_eq!(output(src), ["9", "0"]);
}

#[test]
fn strings_and_null_print() {
    let src = "fn main() {\n  let s: any = \"hi\"\n  : s\n  let n: any\n  : n\n}";
    assert_eq!(output(src), ["hi", "null"]);
}

#[test]
fn program_without_main_runs_global_initializers_only() {
    let run = run_source("let a = 1\nlet b = a + 1", &config());
    assert!(matches!(run.result, InterpretResult::Ok));
    assert!(run.output.is_empty());
}

// --- Failures ---

#[test]
fn type_errors_are_compile_errors() {
    let errors = compile_errors("fn main() {\n  let x = 1\n  x = true\n  while 3 { }\n}");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].line(), 3);
    assert_eq!(errors[1].line(), 4);
}

#[test]
fn runtime_fault_stops_execution() {
    let src = "fn div(a: int, b: int): int {\n  return a / b\n}\nfn main() {\n  : 1\n  : div(4, 0)\n  : 2\n}";
    let run = run_source(src, &config());
    assert_eq!(run.output, ["1"]);
    match run.result {
        InterpretResult::RuntimeError(e) => {
            assert_eq!(e.function, "div");
            assert_eq!(e.line, 2);
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn void_method_in_an_argument_stops_before_the_outer_call() {
    let src = "\
class C {
  fn m() {
  }
}
fn h(a: int, b: any): int {
  return a
}
fn outer(a: any, b: int) {
  : 777
}
fn main() {
  let c = C()
  outer(h(1, c.m()), 0)
}";
    let run = run_source(src, &config());
    assert!(run.output.is_empty(), "{:?}", run.output);
    match run.result {
        InterpretResult::RuntimeError(e) => {
            assert_eq!(e.kind, VmError::NoReturnValue { function: "m".into() });
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn deep_recursion_overflows() {
    let src = "fn down(n: int): int {\n  return down(n + 1)\n}\nfn main() {\n  : down(0)\n}";
    let err = runtime_error(src);
    assert!(matches!(err.kind, VmError::StackOverflow { limit: 64 }));
}
