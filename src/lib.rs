//! kite: a small statically typed language compiled to bytecode for a
//! stack/register VM.
//!
//! The pipeline is `lex -> parse -> verify -> optimize -> compile -> run`.
//! [`interpret`] drives all of it; the stages are public for tooling.

pub mod ast;
pub mod chunk;
pub mod compiler;
pub mod diagnostic;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod value;
pub mod verify;
pub mod vm;

use std::rc::Rc;

use tracing::debug;

use crate::ast::Program;
use crate::compiler::CompileError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::value::Function;
use crate::verify::VerifyError;
use crate::vm::{RuntimeError, Vm};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fold constants and remove dead code before compiling.
    pub optimize: bool,
    /// Deepest call nesting before a stack overflow.
    pub max_frames: usize,
    /// Write printed values to stdout as well as capturing them.
    pub echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { optimize: true, max_frames: vm::DEFAULT_MAX_FRAMES, echo: true }
    }
}

/// Anything that stops a program before it runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileFailure {
    #[error("line {line}: {0}", line = .0.line)]
    Lex(#[from] LexError),
    #[error("line {line}: {0}", line = .0.line)]
    Parse(#[from] ParseError),
    #[error("line {line}: {0}", line = .0.line)]
    Verify(#[from] VerifyError),
    #[error("line {line}: {0}", line = .0.line)]
    Compile(#[from] CompileError),
}

impl CompileFailure {
    pub fn line(&self) -> u32 {
        match self {
            CompileFailure::Lex(e) => e.line,
            CompileFailure::Parse(e) => e.line,
            CompileFailure::Verify(e) => e.line,
            CompileFailure::Compile(e) => e.line,
        }
    }
}

#[derive(Debug)]
pub enum InterpretResult {
    Ok,
    CompileError(Vec<CompileFailure>),
    RuntimeError(RuntimeError),
}

/// Lexes, parses, and type-checks a program. Parse errors stop the
/// pipeline; all of them are returned, as are all verifier errors.
pub fn check(source: &str) -> Result<Program, Vec<CompileFailure>> {
    let tokens = lexer::lex(source).map_err(|e| vec![CompileFailure::from(e)])?;
    debug!(tokens = tokens.len(), "lexed");

    let (program, errors) = parser::parse(tokens, source);
    if !errors.is_empty() {
        return Err(errors.into_iter().map(CompileFailure::from).collect());
    }
    debug!(declarations = program.stmts.len(), "parsed");

    let errors = verify::verify(&program);
    if !errors.is_empty() {
        return Err(errors.into_iter().map(CompileFailure::from).collect());
    }
    Ok(program)
}

/// Runs the front end and code generator. Returns the IR that was compiled
/// alongside the script function.
pub fn build(source: &str, config: &Config) -> Result<(Program, Rc<Function>), Vec<CompileFailure>> {
    let mut program = check(source)?;
    if config.optimize {
        optimizer::optimize(&mut program);
    }
    let script = compiler::compile(&program).map_err(|e| vec![CompileFailure::from(e)])?;
    Ok((program, script))
}

/// Outcome of [`run_source`]: the result plus everything printed before it.
#[derive(Debug)]
pub struct Run {
    pub result: InterpretResult,
    pub output: Vec<String>,
}

pub fn run_source(source: &str, config: &Config) -> Run {
    let script = match build(source, config) {
        Ok((_, script)) => script,
        Err(errors) => return Run { result: InterpretResult::CompileError(errors), output: Vec::new() },
    };
    let mut vm = Vm::new().with_max_frames(config.max_frames).with_echo(config.echo);
    let result = match vm.run(script) {
        Ok(()) => InterpretResult::Ok,
        Err(e) => InterpretResult::RuntimeError(e),
    };
    Run { result, output: vm.take_output() }
}

/// Compiles and runs `source` with the default configuration.
pub fn interpret(source: &str) -> InterpretResult {
    run_source(source, &Config::default()).result
}
