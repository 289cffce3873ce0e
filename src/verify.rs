use std::collections::HashMap;

use crate::ast::*;
use crate::value::Type;

/// A static type error found after parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} in '{function}'")]
pub struct VerifyError {
    pub code: &'static str,
    pub line: u32,
    pub function: String,
    pub message: String,
    pub hint: Option<String>,
}

/// `any` is checked at run time, so it is accepted wherever a concrete
/// type is expected.
fn compatible(expected: Type, found: Type) -> bool {
    expected == found || expected == Type::Object || found == Type::Object
}

fn numeric(ty: Type) -> bool {
    ty.is_number() || ty == Type::Object
}

fn boolean(ty: Type) -> bool {
    ty == Type::Boolean || ty == Type::Object
}

struct FuncCtx<'a> {
    name: &'a str,
    return_type: Option<Type>,
    class: Option<&'a ClassDecl>,
}

struct VerifyContext<'a> {
    locals: &'a Locals,
    // return type of each global function, by its binding
    functions: HashMap<LocalId, (&'a str, Option<Type>)>,
    errors: Vec<VerifyError>,
}

pub(crate) fn closest_match<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for candidate in candidates {
        if candidate == name {
            continue;
        }
        let dist = levenshtein(name, candidate);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }
    best.map(|(s, _)| s.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate().take(m + 1) { row[0] = i; }
    for (j, val) in dp[0].iter_mut().enumerate().take(n + 1) { *val = j; }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

impl<'a> VerifyContext<'a> {
    fn error(&mut self, f: &FuncCtx, code: &'static str, line: u32, message: String, hint: Option<String>) {
        self.errors.push(VerifyError {
            code,
            line,
            function: f.name.to_string(),
            message,
            hint,
        });
    }

    fn verify_function(&mut self, decl: &'a FunctionDecl, class: Option<&'a ClassDecl>) {
        let ctx = FuncCtx { name: &decl.name, return_type: decl.return_type, class };
        for stmt in &decl.body {
            self.verify_stmt(&ctx, stmt);
        }
    }

    fn verify_stmt(&mut self, f: &FuncCtx, stmt: &Stmt) {
        match stmt {
            Stmt::Let { local, init, line } => {
                self.verify_expr(f, init, true);
                let locals = self.locals;
                let local = &locals[*local];
                if !compatible(local.ty, init.ty) {
                    let message = format!("cannot initialise '{}' of type {} with a {}", local.name, local.ty, init.ty);
                    self.error(f, "K-V005", *line, message, None);
                }
            }
            Stmt::Expression(expr) => self.verify_expr(f, expr, false),
            Stmt::Print(expr) => self.verify_expr(f, expr, true),
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.verify_stmt(f, s);
                }
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.verify_condition(f, cond, "if");
                self.verify_stmt(f, then_branch);
                if let Some(else_branch) = else_branch {
                    self.verify_stmt(f, else_branch);
                }
            }
            Stmt::While { cond, body } => {
                self.verify_condition(f, cond, "while");
                self.verify_stmt(f, body);
            }
            Stmt::Return { value, line } => match (value, f.return_type) {
                (Some(value), Some(expected)) => {
                    self.verify_expr(f, value, true);
                    if !compatible(expected, value.ty) {
                        let message = format!("expected to return {} but found {}", expected, value.ty);
                        self.error(f, "K-V008", *line, message, None);
                    }
                }
                (Some(value), None) => {
                    self.verify_expr(f, value, true);
                    let message = "return with a value from a function without a return type".to_string();
                    let hint = Some(format!("declare one: fn {}(...): {} {{ ... }}", f.name, value.ty));
                    self.error(f, "K-V006", *line, message, hint);
                }
                (None, Some(expected)) => {
                    let message = format!("missing return value of type {}", expected);
                    self.error(f, "K-V007", *line, message, None);
                }
                (None, None) => {}
            },
            // nested declarations are rejected by the parser
            Stmt::Function(_) | Stmt::Class(_) => {}
        }
    }

    fn verify_condition(&mut self, f: &FuncCtx, cond: &Expr, keyword: &str) {
        self.verify_expr(f, cond, true);
        if !boolean(cond.ty) {
            let message = format!("{} condition must be bool, found {}", keyword, cond.ty);
            self.error(f, "K-V001", cond.line, message, None);
        }
    }

    fn verify_expr(&mut self, f: &FuncCtx, expr: &Expr, needs_value: bool) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => {}
            ExprKind::Grouping(inner) => self.verify_expr(f, inner, needs_value),
            ExprKind::Assign { local, value } => {
                self.verify_expr(f, value, true);
                let locals = self.locals;
                let local = &locals[*local];
                if !compatible(local.ty, value.ty) {
                    let message = format!("cannot assign {} to '{}' of type {}", value.ty, local.name, local.ty);
                    self.error(f, "K-V005", expr.line, message, None);
                }
            }
            ExprKind::Unary { op, operand } => {
                self.verify_expr(f, operand, true);
                match op {
                    UnaryOp::Not if !boolean(operand.ty) => {
                        let message = format!("operator '!' needs a bool operand, found {}", operand.ty);
                        self.error(f, "K-V004", expr.line, message, None);
                    }
                    UnaryOp::Negate if !numeric(operand.ty) => {
                        let message = format!("operator '-' needs a numeric operand, found {}", operand.ty);
                        self.error(f, "K-V002", expr.line, message, None);
                    }
                    _ => {}
                }
            }
            ExprKind::Binary { op, left, right } => {
                self.verify_expr(f, left, true);
                self.verify_expr(f, right, true);
                let (l, r) = (left.ty, right.ty);
                if op.is_equality() {
                    let ok = l == Type::Object
                        || r == Type::Object
                        || (l.is_number() && r.is_number())
                        || (l == Type::Boolean && r == Type::Boolean);
                    if !ok {
                        let message = format!("cannot compare {} with {}", l, r);
                        self.error(f, "K-V003", expr.line, message, None);
                    }
                } else if !numeric(l) || !numeric(r) {
                    let message = format!("operator '{}' needs numeric operands, found {} and {}", op.symbol(), l, r);
                    self.error(f, "K-V002", expr.line, message, None);
                }
            }
            ExprKind::Logical { op, left, right } => {
                self.verify_expr(f, left, true);
                self.verify_expr(f, right, true);
                if !boolean(left.ty) || !boolean(right.ty) {
                    let word = match op {
                        LogicalOp::And => "and",
                        LogicalOp::Or => "or",
                    };
                    let message = format!("'{}' needs bool operands, found {} and {}", word, left.ty, right.ty);
                    self.error(f, "K-V004", expr.line, message, None);
                }
            }
            ExprKind::Call { callee, args } => {
                self.verify_expr(f, callee, true);
                for arg in args {
                    self.verify_expr(f, arg, true);
                }
                if needs_value {
                    if let ExprKind::Variable(id) = &callee.ungrouped().kind {
                        if let Some((name, None)) = self.functions.get(id).copied() {
                            let message = format!("'{}' does not return a value", name);
                            self.error(f, "K-V009", expr.line, message, None);
                        }
                    }
                }
            }
            ExprKind::Get { object, .. } => self.verify_expr(f, object, true),
            ExprKind::Set { object, name, value } => {
                self.verify_expr(f, object, true);
                self.verify_expr(f, value, true);
                let is_this = matches!(&object.kind, ExprKind::Variable(id) if self.locals[*id].name == "this");
                let field = f.class.filter(|_| is_this).and_then(|c| c.field(name));
                if let Some(field) = field {
                    if !compatible(field.ty, value.ty) {
                        let message = format!("cannot assign {} to field '{}' of type {}", value.ty, name, field.ty);
                        self.error(f, "K-V005", expr.line, message, None);
                    }
                }
            }
        }
    }
}

/// Checks the static typing rules the parser does not enforce. Returns every
/// error found.
pub fn verify(program: &Program) -> Vec<VerifyError> {
    let functions = program
        .stmts
        .iter()
        .filter_map(|s| match s {
            Stmt::Function(f) => f.local.map(|id| (id, (f.name.as_str(), f.return_type))),
            _ => None,
        })
        .collect();

    let mut ctx = VerifyContext { locals: &program.locals, functions, errors: Vec::new() };
    let script = FuncCtx { name: "<script>", return_type: None, class: None };

    for stmt in &program.stmts {
        match stmt {
            Stmt::Function(decl) => ctx.verify_function(decl, None),
            Stmt::Class(class) => {
                for method in &class.methods {
                    ctx.verify_function(method, Some(class));
                }
            }
            other => ctx.verify_stmt(&script, other),
        }
    }

    ctx.errors
}
