pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;
use crate::chunk::ChunkError;
use crate::compiler::CompileError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::value::ValueError;
use crate::verify::VerifyError;
use crate::vm::{RuntimeError, VmError};
use crate::CompileFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    /// Source line, when the error knows one but has no byte span.
    pub line: Option<u32>,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            line: None,
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- Stable codes ----

pub fn chunk_code(e: &ChunkError) -> &'static str {
    match e {
        ChunkError::TooManyConstants => "K-C001",
        ChunkError::JumpTooLarge => "K-C002",
        ChunkError::LoopTooLarge => "K-C003",
        ChunkError::TooManyArguments => "K-C004",
    }
}

pub fn runtime_code(e: &VmError) -> &'static str {
    match e {
        VmError::Value(ValueError::ExpectedNumber { .. }) => "K-R001",
        VmError::Value(ValueError::ExpectedBoolean { .. }) => "K-R002",
        VmError::Value(ValueError::DivisionByZero) => "K-R003",
        VmError::ExpectedInstance { .. } => "K-R004",
        VmError::UndefinedField { .. } => "K-R005",
        VmError::NotCallable { .. } => "K-R006",
        VmError::MissingConstructor { .. } => "K-R007",
        VmError::Arity { .. } => "K-R008",
        VmError::ArgumentType { .. } => "K-R009",
        VmError::StackOverflow { .. } => "K-R010",
        VmError::UnboundMethod { .. } => "K-R011",
        VmError::StackUnderflow | VmError::UnbalancedStack { .. } => "K-R012",
        VmError::NoReturnValue { .. } => "K-R015",
        VmError::UnassignedRegister { .. } | VmError::UndefinedGlobal { .. } => "K-R013",
        VmError::BadConstant { .. }
        | VmError::BadJump
        | VmError::EndOfCode
        | VmError::UnknownOpcode { .. }
        | VmError::NoFrame => "K-R014",
    }
}

// ---- From impls for error types ----

impl From<&LexError> for Diagnostic {
    fn from(e: &LexError) -> Self {
        let span = Span { start: e.position, end: e.position + e.snippet.len().max(1) };
        let mut d = Diagnostic::error(format!("unexpected input '{}'", e.snippet))
            .with_code("K-L001")
            .with_line(e.line)
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(e: &ParseError) -> Self {
        let mut d = Diagnostic::error(&e.message)
            .with_code(e.code)
            .with_line(e.line)
            .with_span(e.span, "here");
        if let Some(s) = &e.suggestion {
            d = d.with_suggestion(s.clone());
        }
        d
    }
}

impl From<&VerifyError> for Diagnostic {
    fn from(e: &VerifyError) -> Self {
        let mut d = Diagnostic::error(&e.message)
            .with_code(e.code)
            .with_line(e.line)
            .with_note(format!("in function '{}'", e.function));
        if let Some(hint) = &e.hint {
            d = d.with_suggestion(hint.clone());
        }
        d
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_code(chunk_code(&e.kind))
            .with_line(e.line)
            .with_note(format!("in function '{}'", e.function))
    }
}

impl From<&CompileFailure> for Diagnostic {
    fn from(e: &CompileFailure) -> Self {
        match e {
            CompileFailure::Lex(e) => e.into(),
            CompileFailure::Parse(e) => e.into(),
            CompileFailure::Verify(e) => e.into(),
            CompileFailure::Compile(e) => e.into(),
        }
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        Diagnostic::error(e.kind.to_string())
            .with_code(runtime_code(&e.kind))
            .with_line(e.line)
            .with_note(format!("in function '{}'", e.function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_error_builder() {
        let d = Diagnostic::error("something went wrong");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "something went wrong");
        assert!(d.code.is_none());
        assert!(d.labels.is_empty());
        assert!(d.suggestion.is_none());
    }

    #[test]
    fn from_lex_error() {
        let e = LexError {
            position: 3,
            line: 1,
            snippet: "&".to_string(),
            suggestion: "Use the keywords 'and' / 'or' for logical operators".to_string(),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("K-L001"));
        assert!(d.message.contains('&'));
        assert_eq!(d.labels[0].span, Span { start: 3, end: 4 });
        assert!(d.suggestion.is_some());
    }

    #[test]
    fn from_parse_error_keeps_code_and_suggestion() {
        let e = ParseError {
            code: "K-P005",
            line: 3,
            span: Span { start: 10, end: 15 },
            message: "undefined variable 'cuont'".to_string(),
            suggestion: Some("did you mean 'count'?".to_string()),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("K-P005"));
        assert_eq!(d.line, Some(3));
        assert_eq!(d.labels[0].span, Span { start: 10, end: 15 });
        assert_eq!(d.suggestion.as_deref(), Some("did you mean 'count'?"));
    }

    #[test]
    fn from_verify_error_names_function() {
        let e = VerifyError {
            code: "K-V001",
            line: 2,
            function: "main".to_string(),
            message: "if condition must be bool, found int".to_string(),
            hint: None,
        };
        let d = Diagnostic::from(&e);
        assert!(d.notes.iter().any(|n| n.contains("main")));
        assert!(d.labels.is_empty());
    }

    #[test]
    fn runtime_errors_get_codes_by_kind() {
        let e = RuntimeError {
            line: 7,
            function: "main".to_string(),
            kind: VmError::NotCallable { got: "int" },
            disassembly: String::new(),
        };
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("K-R006"));
        assert_eq!(d.line, Some(7));
        assert!(d.message.contains("int"));
    }

    #[test]
    fn every_code_is_registered() {
        let chunk = [
            ChunkError::TooManyConstants,
            ChunkError::JumpTooLarge,
            ChunkError::LoopTooLarge,
            ChunkError::TooManyArguments,
        ];
        for e in &chunk {
            assert!(registry::lookup(chunk_code(e)).is_some(), "{e}");
        }
        let vm = [
            VmError::Value(ValueError::DivisionByZero),
            VmError::StackUnderflow,
            VmError::NoFrame,
            VmError::UndefinedGlobal { slot: 0 },
            VmError::StackOverflow { limit: 1 },
            VmError::UnboundMethod { name: "m".into() },
            VmError::NoReturnValue { function: "m".into() },
        ];
        for e in &vm {
            assert!(registry::lookup(runtime_code(e)).is_some(), "{e}");
        }
    }
}
