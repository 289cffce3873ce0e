use std::collections::HashMap;

use tracing::debug;

use crate::ast::*;
use crate::lexer::Token;
use crate::value::{Param, Type, Value};
use crate::verify::closest_match;

const MAX_ERRORS: usize = 20;
const MAX_SLOTS: usize = 256;
const TYPE_NAMES: &[&str] = &["bool", "int", "float", "double", "long", "any"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub code: &'static str,
    pub line: u32,
    pub span: Span,
    pub message: String,
    pub suggestion: Option<String>,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Register numbering for the function being parsed. Slots are handed out
/// in declaration order and never reused.
struct FnScope {
    next_slot: usize,
    is_method: bool,
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    lines: Vec<u32>,
    end_line: u32,
    pos: usize,
    locals: Locals,
    // scopes[0] holds the globals
    scopes: Vec<Vec<(String, LocalId)>>,
    next_global: usize,
    function: Option<FnScope>,
    class_fields: Option<Vec<FieldDecl>>,
    returns: HashMap<LocalId, Option<Type>>,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>, source: &str) -> Self {
        let map = SourceMap::new(source);
        let lines = tokens.iter().map(|(_, span)| map.line_of(span.start)).collect();
        Parser {
            tokens,
            lines,
            end_line: map.line_count() as u32,
            pos: 0,
            locals: Locals::new(),
            scopes: vec![Vec::new()],
            next_global: 0,
            function: None,
            class_fields: None,
            returns: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            None => self
                .tokens
                .last()
                .map(|(_, s)| Span { start: s.end, end: s.end })
                .unwrap_or(Span::UNKNOWN),
        }
    }

    /// Line of the current token.
    fn line(&self) -> u32 {
        self.lines.get(self.pos).copied().unwrap_or(self.end_line)
    }

    /// Line of the token just consumed.
    fn prev_line(&self) -> u32 {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .copied()
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}' {}", expected, context)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, wanted: &str) -> ParseError {
        match self.peek() {
            Some(tok) => self.error("K-P001", format!("expected {}, found '{}'", wanted, tok)),
            None => self.error("K-P002", format!("expected {}, found end of input", wanted)),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            line: self.line(),
            span: self.peek_span(),
            message,
            suggestion: None,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn record(&mut self, error: ParseError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        if self.errors.len() >= MAX_ERRORS {
            // give up; enclosing blocks unwind at end of input
            self.pos = self.tokens.len();
        }
    }

    /// Panic-mode recovery. Skips to the next token that can start a
    /// statement (or, at top level, a declaration), treating `{ ... }` as
    /// one unit.
    fn synchronize(&mut self, start: usize, top_level: bool) {
        if self.pos == start {
            self.advance();
        }
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            if depth == 0 {
                if self.pos > 0 && self.tokens[self.pos - 1].0 == Token::Semicolon && !top_level {
                    return;
                }
                let boundary = if top_level {
                    matches!(tok, Token::Fn | Token::Class | Token::Let)
                } else {
                    tok.starts_statement() || *tok == Token::RBrace
                };
                if boundary {
                    return;
                }
            }
            match tok {
                Token::LBrace => depth += 1,
                Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    // ---- Scopes ----

    fn declare_global(&mut self, name: &str, ty: Type, span: Span, line: u32) -> Result<LocalId> {
        if self.scopes[0].iter().any(|(n, _)| n == name) {
            return Err(ParseError {
                code: "K-P012",
                line,
                span,
                message: format!("'{}' is already declared", name),
                suggestion: None,
            });
        }
        if self.next_global >= MAX_SLOTS {
            return Err(ParseError {
                code: "K-P010",
                line,
                span,
                message: "too many global declarations (limit 256)".to_string(),
                suggestion: None,
            });
        }
        let id = self.locals.push(Local::new(name, self.next_global as u8, ty, true));
        self.next_global += 1;
        self.scopes[0].push((name.to_string(), id));
        Ok(id)
    }

    fn declare_local(&mut self, name: &str, ty: Type, span: Span, line: u32) -> Result<LocalId> {
        let slot = match self.function.as_mut() {
            Some(f) if f.next_slot < MAX_SLOTS => {
                f.next_slot += 1;
                f.next_slot - 1
            }
            Some(_) => {
                return Err(ParseError {
                    code: "K-P010",
                    line,
                    span,
                    message: "too many local variables in one function (limit 256)".to_string(),
                    suggestion: None,
                });
            }
            None => return self.declare_global(name, ty, span, line),
        };
        let id = self.locals.push(Local::new(name, slot as u8, ty, false));
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), id));
        }
        Ok(id)
    }

    fn resolve(&self, name: &str, span: Span, line: u32) -> Result<LocalId> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, id)) = scope.iter().rev().find(|(n, _)| n == name) {
                return Ok(*id);
            }
        }
        let visible = self.scopes.iter().flatten().map(|(n, _)| n.as_str());
        Err(ParseError {
            code: "K-P005",
            line,
            span,
            message: format!("undefined variable '{}'", name),
            suggestion: closest_match(name, visible).map(|s| format!("did you mean '{}'?", s)),
        })
    }

    // ---- Top-level parsing ----

    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let mut stmts = Vec::new();

        while !self.at_end() {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            let start = self.pos;
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    self.record(e);
                    self.function = None;
                    self.class_fields = None;
                    self.scopes.truncate(1);
                    self.synchronize(start, true);
                }
            }
        }

        debug!(
            declarations = stmts.len(),
            locals = self.locals.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        (Program { stmts, locals: self.locals }, self.errors)
    }

    fn declaration(&mut self) -> Result<Stmt> {
        let stmt = match self.peek() {
            Some(Token::Fn) => {
                self.advance();
                Stmt::Function(self.function_decl()?)
            }
            Some(Token::Class) => {
                self.advance();
                Stmt::Class(self.class_decl()?)
            }
            Some(Token::Let) => {
                self.advance();
                self.let_decl()?
            }
            Some(tok) => {
                return Err(self.error(
                    "K-P009",
                    format!("expected 'fn', 'class' or 'let' at top level, found '{}'", tok),
                ));
            }
            None => return Err(self.unexpected("a declaration")),
        };
        self.end_statement()?;
        Ok(stmt)
    }

    /// A statement ends at `;`, before `}`, at end of input, or at a line
    /// break.
    fn end_statement(&mut self) -> Result<()> {
        if self.eat(&Token::Semicolon) {
            return Ok(());
        }
        match self.peek() {
            None | Some(Token::RBrace) => Ok(()),
            Some(_) if self.line() == self.prev_line() => Err(self.error(
                "K-P008",
                "there can't be more than one statement on one line; separate them with ';'".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }

    fn function_decl(&mut self) -> Result<FunctionDecl> {
        let line = self.prev_line();
        let span = self.peek_span();
        let name = self.expect_ident("function name")?;
        // bound before the body so the function can call itself
        let local = self.declare_global(&name, Type::Object, span, line)?;

        self.function = Some(FnScope { next_slot: 0, is_method: false });
        self.scopes.push(Vec::new());
        let result = self.function_rest(name, Some(local), false, line);
        self.scopes.truncate(1);
        self.function = None;
        result
    }

    fn function_rest(
        &mut self,
        name: String,
        local: Option<LocalId>,
        is_method: bool,
        line: u32,
    ) -> Result<FunctionDecl> {
        self.expect(&Token::LParen, "after function name")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let span = self.peek_span();
                let param_line = self.line();
                let param = self.expect_ident("parameter name")?;
                self.expect(&Token::Colon, "after parameter name")?;
                let ty = self.type_name()?;
                self.declare_local(&param, ty, span, param_line)?;
                params.push(Param { name: param, ty });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "after parameters")?;

        let return_type = if self.eat(&Token::Colon) { Some(self.type_name()?) } else { None };
        if let Some(local) = local {
            self.returns.insert(local, return_type);
        }

        self.expect(&Token::LBrace, "before function body")?;
        let body = self.block_items()?;
        Ok(FunctionDecl { name, local, params, return_type, body, is_method, line })
    }

    fn type_name(&mut self) -> Result<Type> {
        let span = self.peek_span();
        let line = self.line();
        let name = self.expect_ident("type name")?;
        Type::from_name(&name).ok_or_else(|| ParseError {
            code: "K-P006",
            line,
            span,
            message: format!("unknown type '{}'", name),
            suggestion: closest_match(&name, TYPE_NAMES.iter().copied())
                .map(|s| format!("did you mean '{}'?", s)),
        })
    }

    fn let_decl(&mut self) -> Result<Stmt> {
        let line = self.prev_line();
        let span = self.peek_span();
        let name = self.expect_ident("variable name")?;
        let (ty, init) = self.typed_initializer(&name, span, line)?;
        let local = self.declare_local(&name, ty, span, line)?;
        Ok(Stmt::Let { local, init, line })
    }

    /// `[: type] [= expr]`, shared by `let` and class fields.
    fn typed_initializer(&mut self, name: &str, span: Span, line: u32) -> Result<(Type, Expr)> {
        let declared = if self.eat(&Token::Colon) { Some(self.type_name()?) } else { None };
        let init = if self.eat(&Token::Equal) { Some(self.expression()?) } else { None };
        match (declared, init) {
            (Some(ty), Some(init)) => Ok((ty, init)),
            (None, Some(init)) => Ok((init.ty, init)),
            (Some(ty), None) => Ok((ty, Expr::new(ExprKind::Literal(ty.zero()), ty, line))),
            (None, None) => Err(ParseError {
                code: "K-P007",
                line,
                span,
                message: format!("cannot infer the type of '{}'", name),
                suggestion: Some(format!("write '{}: <type>' or '{} = <value>'", name, name)),
            }),
        }
    }

    // ---- Classes ----

    fn class_decl(&mut self) -> Result<ClassDecl> {
        let line = self.prev_line();
        let span = self.peek_span();
        let name = self.expect_ident("class name")?;
        let local = self.declare_global(&name, Type::Object, span, line)?;
        self.expect(&Token::LBrace, "before class body")?;

        self.class_fields = Some(Vec::new());
        let body = self.class_body();
        let fields = self.class_fields.take().unwrap_or_default();
        let (inits, mut methods) = body?;

        // field initializers run first inside the constructor
        let init_at = match methods.iter().position(|(m, _)| m.name == INIT) {
            Some(i) => i,
            None => {
                let this = self.locals.push(Local::new("this", 0, Type::Object, false));
                let ctor = FunctionDecl {
                    name: INIT.to_string(),
                    local: None,
                    params: Vec::new(),
                    return_type: None,
                    body: Vec::new(),
                    is_method: true,
                    line,
                };
                methods.push((ctor, this));
                methods.len() - 1
            }
        };
        let (ctor, this) = &mut methods[init_at];
        let prologue = inits.into_iter().map(|(field, value)| {
            let object = Expr::new(ExprKind::Variable(*this), Type::Object, field.line);
            let ty = value.ty;
            Stmt::Expression(Expr::new(
                ExprKind::Set { object: Box::new(object), name: field.name, value: Box::new(value) },
                ty,
                field.line,
            ))
        });
        let body = std::mem::take(&mut ctor.body);
        ctor.body = prologue.chain(body).collect();

        Ok(ClassDecl {
            name,
            local,
            fields,
            methods: methods.into_iter().map(|(m, _)| m).collect(),
            line,
        })
    }

    #[allow(clippy::type_complexity)]
    fn class_body(&mut self) -> Result<(Vec<(FieldDecl, Expr)>, Vec<(FunctionDecl, LocalId)>)> {
        let mut inits = Vec::new();
        let mut methods: Vec<(FunctionDecl, LocalId)> = Vec::new();
        loop {
            while self.eat(&Token::Semicolon) {}
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok((inits, methods));
                }
                Some(Token::Let) => {
                    self.advance();
                    inits.push(self.field_decl()?);
                }
                Some(Token::Fn) => {
                    self.advance();
                    let span = self.peek_span();
                    let method = self.method_decl()?;
                    if methods.iter().any(|(m, _)| m.name == method.0.name) {
                        return Err(ParseError {
                            code: "K-P012",
                            line: method.0.line,
                            span,
                            message: format!("method '{}' is already declared", method.0.name),
                            suggestion: None,
                        });
                    }
                    methods.push(method);
                }
                Some(tok) => {
                    return Err(self.error(
                        "K-P001",
                        format!("expected 'fn' or 'let' in class body, found '{}'", tok),
                    ));
                }
                None => return Err(self.unexpected("'}' after class body")),
            }
            self.end_statement()?;
        }
    }

    fn field_decl(&mut self) -> Result<(FieldDecl, Expr)> {
        let line = self.prev_line();
        let span = self.peek_span();
        let name = self.expect_ident("field name")?;
        let (ty, init) = self.typed_initializer(&name, span, line)?;
        let fields = self.class_fields.get_or_insert_with(Vec::new);
        if fields.iter().any(|f| f.name == name) {
            return Err(ParseError {
                code: "K-P012",
                line,
                span,
                message: format!("field '{}' is already declared", name),
                suggestion: None,
            });
        }
        let field = FieldDecl { name, ty, line };
        fields.push(field.clone());
        Ok((field, init))
    }

    /// `fn name(params) { }`, or `fn(params) { }` for the constructor.
    fn method_decl(&mut self) -> Result<(FunctionDecl, LocalId)> {
        let line = self.prev_line();
        let span = self.peek_span();
        let name = match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                name
            }
            _ => INIT.to_string(),
        };

        self.function = Some(FnScope { next_slot: 0, is_method: true });
        self.scopes.push(Vec::new());
        let result = self
            .declare_local("this", Type::Object, span, line)
            .and_then(|this| self.function_rest(name, None, true, line).map(|f| (f, this)));
        self.scopes.truncate(1);
        self.function = None;

        let (method, this) = result?;
        if method.name == INIT && method.return_type.is_some() {
            return Err(ParseError {
                code: "K-P014",
                line,
                span,
                message: "a constructor can't declare a return type".to_string(),
                suggestion: None,
            });
        }
        Ok((method, this))
    }

    // ---- Statements ----

    /// Statements up to and including the closing `}`. Errors inside are
    /// recorded and parsing resumes at the next statement.
    fn block_items(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Semicolon) {}
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    return Ok(stmts);
                }
                None => return Err(self.unexpected("'}' after block")),
                Some(_) => {}
            }
            let start = self.pos;
            let depth = self.scopes.len();
            match self.terminated_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(e) => {
                    self.record(e);
                    self.scopes.truncate(depth);
                    self.synchronize(start, false);
                }
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.scopes.push(Vec::new());
        let result = self.block_items();
        self.scopes.pop();
        result
    }

    fn terminated_statement(&mut self) -> Result<Stmt> {
        let stmt = self.statement()?;
        self.end_statement()?;
        Ok(stmt)
    }

    fn statement(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Token::Let) => {
                self.advance();
                self.let_decl()
            }
            Some(Token::For) => {
                self.advance();
                self.for_stmt()
            }
            Some(Token::If) => {
                self.advance();
                self.if_stmt()
            }
            Some(Token::While) => {
                self.advance();
                self.while_stmt()
            }
            Some(Token::Return) => {
                self.advance();
                self.return_stmt()
            }
            Some(Token::Colon) => {
                self.advance();
                Ok(Stmt::Print(self.expression()?))
            }
            Some(Token::LBrace) => {
                self.advance();
                Ok(Stmt::Block(self.block()?))
            }
            Some(Token::Fn) | Some(Token::Class) => Err(self.error(
                "K-P009",
                "functions and classes can only be declared at top level".to_string(),
            )),
            _ => Ok(Stmt::Expression(self.expression()?)),
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        let cond = self.expression()?;
        self.expect(&Token::LBrace, "after if condition")?;
        let then_branch = Box::new(Stmt::Block(self.block()?));
        let else_branch = if self.eat(&Token::Else) {
            if self.eat(&Token::If) {
                Some(Box::new(self.if_stmt()?))
            } else {
                self.expect(&Token::LBrace, "after 'else'")?;
                Some(Box::new(Stmt::Block(self.block()?)))
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch })
    }

    fn while_stmt(&mut self) -> Result<Stmt> {
        let cond = self.expression()?;
        self.expect(&Token::LBrace, "after while condition")?;
        let body = Box::new(Stmt::Block(self.block()?));
        Ok(Stmt::While { cond, body })
    }

    /// `for init; cond; incr { body }` becomes
    /// `{ init; while cond { { body } incr } }`.
    fn for_stmt(&mut self) -> Result<Stmt> {
        let line = self.prev_line();
        self.scopes.push(Vec::new());
        let result = self.for_rest(line);
        self.scopes.pop();
        result
    }

    fn for_rest(&mut self, line: u32) -> Result<Stmt> {
        let init = if self.eat(&Token::Semicolon) {
            None
        } else {
            let init = if self.eat(&Token::Let) {
                self.let_decl()?
            } else {
                Stmt::Expression(self.expression()?)
            };
            self.expect(&Token::Semicolon, "after loop initializer")?;
            Some(init)
        };

        let cond = if self.check(&Token::Semicolon) {
            Expr::literal(Value::Boolean(true), line)
        } else {
            self.expression()?
        };
        self.expect(&Token::Semicolon, "after loop condition")?;

        let incr = if self.check(&Token::LBrace) { None } else { Some(self.expression()?) };
        self.expect(&Token::LBrace, "before loop body")?;

        let mut body = Stmt::Block(self.block()?);
        if let Some(incr) = incr {
            body = Stmt::Block(vec![body, Stmt::Expression(incr)]);
        }

        let mut stmts: Vec<Stmt> = init.into_iter().collect();
        stmts.push(Stmt::While { cond, body: Box::new(body) });
        Ok(Stmt::Block(stmts))
    }

    fn return_stmt(&mut self) -> Result<Stmt> {
        let line = self.prev_line();
        let value = match self.peek() {
            None | Some(Token::Semicolon) | Some(Token::RBrace) => None,
            Some(_) if self.line() != line => None,
            Some(_) => Some(self.expression()?),
        };
        Ok(Stmt::Return { value, line })
    }

    // ---- Expressions ----

    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let target = self.or()?;
        let op = match self.peek() {
            Some(Token::Equal) => None,
            Some(Token::PlusEqual) => Some(BinaryOp::Add),
            Some(Token::MinusEqual) => Some(BinaryOp::Subtract),
            Some(Token::StarEqual) => Some(BinaryOp::Multiply),
            Some(Token::SlashEqual) => Some(BinaryOp::Divide),
            _ => return Ok(target),
        };
        let op_line = self.line();
        let op_span = self.peek_span();
        self.advance();
        let value = self.assignment()?;
        let line = target.line;

        let invalid = |message: &str| ParseError {
            code: "K-P004",
            line: op_line,
            span: op_span,
            message: message.to_string(),
            suggestion: None,
        };

        match target.kind {
            ExprKind::Variable(local) if self.locals[local].name != "this" => {
                let ty = self.locals[local].ty;
                let value = match op {
                    Some(op) => binary(op, Expr::new(ExprKind::Variable(local), ty, line), value),
                    None => value,
                };
                Ok(Expr::new(ExprKind::Assign { local, value: Box::new(value) }, ty, line))
            }
            ExprKind::Get { object, name } => {
                let value = match op {
                    Some(_) if !object.is_pure() => {
                        return Err(invalid(
                            "compound assignment needs a plain object expression on the left",
                        ));
                    }
                    Some(op) => {
                        let read = Expr::new(
                            ExprKind::Get { object: object.clone(), name: name.clone() },
                            target.ty,
                            line,
                        );
                        binary(op, read, value)
                    }
                    None => value,
                };
                let ty = value.ty;
                Ok(Expr::new(ExprKind::Set { object, name, value: Box::new(value) }, ty, line))
            }
            _ => Err(invalid("invalid assignment target")),
        }
    }

    fn or(&mut self) -> Result<Expr> {
        let mut expr = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            expr = logical(LogicalOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            expr = logical(LogicalOp::And, expr, right);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqualEqual) => BinaryOp::Equal,
                Some(Token::BangEqual) => BinaryOp::NotEqual,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.comparison()?;
            expr = binary(op, expr, right);
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut expr = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Greater) => BinaryOp::Greater,
                Some(Token::GreaterEqual) => BinaryOp::GreaterEqual,
                Some(Token::Less) => BinaryOp::Less,
                Some(Token::LessEqual) => BinaryOp::LessEqual,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.term()?;
            expr = binary(op, expr, right);
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.factor()?;
            expr = binary(op, expr, right);
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.unary()?;
            expr = binary(op, expr, right);
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        let line = self.line();
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            _ => return self.call(),
        };
        self.advance();
        let operand = self.unary()?;
        let ty = match op {
            UnaryOp::Not => Type::Boolean,
            UnaryOp::Negate => operand.ty,
        };
        Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, ty, line))
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if !self.check(&Token::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                if args.len() > 255 {
                    return Err(self.error("K-P010", "too many arguments (limit 255)".to_string()));
                }
                self.expect(&Token::RParen, "after arguments")?;
                let ty = self.call_type(&expr);
                let line = expr.line;
                expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args }, ty, line);
            } else if self.eat(&Token::Dot) {
                let name = self.expect_ident("property name after '.'")?;
                let ty = self.field_type(&expr, &name);
                let line = expr.line;
                expr = Expr::new(ExprKind::Get { object: Box::new(expr), name }, ty, line);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Declared return type when the callee is a known global function.
    fn call_type(&self, callee: &Expr) -> Type {
        match &callee.ungrouped().kind {
            ExprKind::Variable(id) => self.returns.get(id).copied().flatten().unwrap_or(Type::Object),
            _ => Type::Object,
        }
    }

    /// `this.field` takes the declared type of a field seen earlier in the
    /// class body; every other property read is `any`.
    fn field_type(&self, object: &Expr, name: &str) -> Type {
        let is_this = matches!(&object.kind, ExprKind::Variable(id) if self.locals[*id].name == "this");
        if !is_this {
            return Type::Object;
        }
        self.class_fields
            .as_ref()
            .and_then(|fields| fields.iter().find(|f| f.name == name))
            .map(|f| f.ty)
            .unwrap_or(Type::Object)
    }

    fn primary(&mut self) -> Result<Expr> {
        let line = self.line();
        let span = self.peek_span();
        let value = match self.peek() {
            Some(Token::True) => Value::Boolean(true),
            Some(Token::False) => Value::Boolean(false),
            Some(Token::Null) => Value::null(),
            Some(Token::Int(n)) => Value::Int(*n),
            Some(Token::Long(n)) => Value::Long(*n),
            Some(Token::Float(x)) => Value::Float(*x),
            Some(Token::Double(x)) => Value::Double(*x),
            Some(Token::Str(s)) => Value::string(s),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                let id = self.resolve(&name, span, line)?;
                self.advance();
                return Ok(Expr::new(ExprKind::Variable(id), self.locals[id].ty, line));
            }
            Some(Token::This) => {
                if !self.function.as_ref().is_some_and(|f| f.is_method) {
                    return Err(self.error("K-P011", "can't use 'this' outside of a method".to_string()));
                }
                let id = self.resolve("this", span, line)?;
                self.advance();
                return Ok(Expr::new(ExprKind::Variable(id), Type::Object, line));
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&Token::RParen, "after expression")?;
                let ty = inner.ty;
                return Ok(Expr::new(ExprKind::Grouping(Box::new(inner)), ty, line));
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(Expr::literal(value, line))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let ty = if op.is_comparison() || op.is_equality() { Type::Boolean } else { left.ty.widen(right.ty) };
    let line = left.line;
    Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, ty, line)
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    let ty = left.ty.widen(right.ty);
    let line = left.line;
    Expr::new(ExprKind::Logical { op, left: Box::new(left), right: Box::new(right) }, ty, line)
}

pub fn parse(tokens: Vec<(Token, Span)>, source: &str) -> (Program, Vec<ParseError>) {
    Parser::new(tokens, source).parse_program()
}
