use std::fmt;

use logos::Logos;

use crate::ast::{SourceMap, Span};

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("and")]
    And,
    #[token("class")]
    Class,
    #[token("else")]
    Else,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("fn")]
    Fn,
    #[token("if")]
    If,
    #[token("null")]
    Null,
    #[token("or")]
    Or,
    #[token("return")]
    Return,
    #[token("this")]
    This,
    #[token("true")]
    True,
    #[token("let")]
    Let,
    #[token("while")]
    While,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,

    #[token("-")]
    Minus,
    #[token("-=")]
    MinusEqual,
    #[token("+")]
    Plus,
    #[token("+=")]
    PlusEqual,
    #[token("/")]
    Slash,
    #[token("/=")]
    SlashEqual,
    #[token("*")]
    Star,
    #[token("*=")]
    StarEqual,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,

    // Numeric literals: `3` int, `1.5` float, `10L` long, `2.5d` double
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i32>().ok())]
    Int(i32),
    #[regex(r"[0-9]+L", |lex| { let s = lex.slice(); s[..s.len() - 1].parse::<i64>().ok() })]
    Long(i64),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f32>().ok())]
    Float(f32),
    #[regex(r"[0-9]+(\.[0-9]+)?d", |lex| { let s = lex.slice(); s[..s.len() - 1].parse::<f64>().ok() })]
    Double(f64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Tokens that can begin a statement; panic-mode recovery stops here.
    pub fn starts_statement(&self) -> bool {
        matches!(
            self,
            Token::Class
                | Token::Fn
                | Token::Let
                | Token::For
                | Token::If
                | Token::While
                | Token::Return
                | Token::Colon
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::And => "and",
            Token::Class => "class",
            Token::Else => "else",
            Token::False => "false",
            Token::For => "for",
            Token::Fn => "fn",
            Token::If => "if",
            Token::Null => "null",
            Token::Or => "or",
            Token::Return => "return",
            Token::This => "this",
            Token::True => "true",
            Token::Let => "let",
            Token::While => "while",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Semicolon => ";",
            Token::Colon => ":",
            Token::Minus => "-",
            Token::MinusEqual => "-=",
            Token::Plus => "+",
            Token::PlusEqual => "+=",
            Token::Slash => "/",
            Token::SlashEqual => "/=",
            Token::Star => "*",
            Token::StarEqual => "*=",
            Token::Bang => "!",
            Token::BangEqual => "!=",
            Token::Equal => "=",
            Token::EqualEqual => "==",
            Token::Greater => ">",
            Token::GreaterEqual => ">=",
            Token::Less => "<",
            Token::LessEqual => "<=",
            Token::Int(n) => return write!(f, "{}", n),
            Token::Long(n) => return write!(f, "{}L", n),
            Token::Float(x) => return write!(f, "{:?}", x),
            Token::Double(x) => return write!(f, "{:?}d", x),
            Token::Str(s) => return write!(f, "\"{}\"", s),
            Token::Ident(name) => return write!(f, "{}", name),
        };
        f.write_str(text)
    }
}

/// Lex source code into a stream of tokens with byte spans.
/// Stops at the first unrecognised input.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span { start: range.start, end: range.end };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let snippet = &source[range];
                let (line, _) = SourceMap::new(source).lookup(span.start);
                return Err(LexError {
                    position: span.start,
                    line: line as u32,
                    snippet: snippet.to_string(),
                    suggestion: suggest_fix(snippet),
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad: &str) -> String {
    if bad.starts_with('"') {
        "Unterminated string: add a closing '\"'".to_string()
    } else if bad.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        if bad.contains('.') {
            format!("Number literal '{}' is out of range", bad)
        } else {
            format!("Integer literal '{}' does not fit in an int; add an 'L' suffix for a long", bad)
        }
    } else if bad == "&" || bad == "|" {
        "Use the keywords 'and' / 'or' for logical operators".to_string()
    } else {
        format!("Unexpected character(s): '{}'", bad)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub line: u32,
    pub snippet: String,
    pub suggestion: String,
}
