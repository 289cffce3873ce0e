use std::cmp::Ordering;

use crate::ast::*;
use crate::value::{Arith, Value};

/// Walk state for one function body.
///
/// `journal` records the previous known value of every binding written, so
/// a branch that may not run can be rolled back before its sibling is
/// visited.
pub(super) struct FoldCtx<'a> {
    locals: &'a mut Locals,
    in_loop: bool,
    journal: Vec<(LocalId, Option<Value>)>,
    pub(super) folds: usize,
}

impl<'a> FoldCtx<'a> {
    pub(super) fn new(locals: &'a mut Locals) -> Self {
        FoldCtx { locals, in_loop: false, journal: Vec::new(), folds: 0 }
    }

    pub(super) fn locals_mut(&mut self) -> &mut Locals {
        self.locals
    }

    fn write(&mut self, id: LocalId, value: Option<Value>) {
        let old = std::mem::replace(&mut self.locals[id].value, value);
        self.journal.push((id, old));
    }

    /// Visits code that may or may not run. Known values are restored
    /// afterwards; the bindings it wrote are returned.
    fn branch(&mut self, visit: impl FnOnce(&mut Self)) -> Vec<LocalId> {
        let mark = self.journal.len();
        visit(self);
        let mut written = Vec::new();
        while self.journal.len() > mark {
            if let Some((id, old)) = self.journal.pop() {
                self.locals[id].value = old;
                written.push(id);
            }
        }
        written
    }

    /// After a conditional, a binding written on any path has no single
    /// known value.
    fn forget(&mut self, written: Vec<LocalId>) {
        for id in written {
            self.write(id, None);
        }
    }

    pub(super) fn stmts(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Let { local, init, .. } => {
                self.expr(init);
                self.locals[*local].value = init.known_value().cloned();
            }
            Stmt::Expression(expr) | Stmt::Print(expr) => self.expr(expr),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Block(stmts) => self.stmts(stmts),
            Stmt::If { cond, then_branch, else_branch } => {
                self.expr(cond);
                let known = match cond.known_value() {
                    Some(Value::Boolean(b)) => Some(*b),
                    _ => None,
                };
                match known {
                    // only one side can run: it is straight-line code
                    Some(true) => {
                        self.stmt(then_branch);
                        if let Some(else_branch) = else_branch {
                            self.branch(|ctx| ctx.stmt(else_branch));
                        }
                    }
                    Some(false) => {
                        self.branch(|ctx| ctx.stmt(then_branch));
                        if let Some(else_branch) = else_branch {
                            self.stmt(else_branch);
                        }
                    }
                    None => {
                        let mut written = self.branch(|ctx| ctx.stmt(then_branch));
                        if let Some(else_branch) = else_branch {
                            written.extend(self.branch(|ctx| ctx.stmt(else_branch)));
                        }
                        self.forget(written);
                    }
                }
            }
            Stmt::While { cond, body } => {
                let outer = std::mem::replace(&mut self.in_loop, true);
                self.expr(cond);
                self.stmt(body);
                self.in_loop = outer;
            }
            // declarations are walked by `fold_program`, each with its own context
            Stmt::Function(_) | Stmt::Class(_) => {}
        }
    }

    /// A read folds to the binding's known value. Anything else pins the
    /// binding: it stays live and its writes are kept.
    fn read(&mut self, id: LocalId) -> Option<Value> {
        let in_loop = self.in_loop;
        let local = &mut self.locals[id];
        if !in_loop && local.should_fold {
            if let Some(value) = &local.value {
                return Some(value.clone());
            }
        }
        local.should_fold = false;
        local.is_used = true;
        None
    }

    fn expr(&mut self, expr: &mut Expr) {
        let folded = match &mut expr.kind {
            ExprKind::Literal(_) => None,
            ExprKind::Variable(id) => self.read(*id),
            ExprKind::Assign { local, value } => {
                self.expr(value);
                if self.in_loop {
                    // a later iteration observes this write
                    self.locals[*local].should_fold = false;
                } else {
                    let known = value.known_value().cloned();
                    self.write(*local, known);
                }
                None
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand);
                operand.known_value().and_then(|v| match op {
                    UnaryOp::Negate => v.negate().ok(),
                    UnaryOp::Not => v.not().ok(),
                })
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(left);
                self.expr(right);
                match (left.known_value(), right.known_value()) {
                    (Some(a), Some(b)) => fold_binary(*op, a, b),
                    _ => None,
                }
            }
            ExprKind::Logical { op, left, right } => {
                self.expr(left);
                let written = self.branch(|ctx| ctx.expr(right));
                self.forget(written);
                match (left.known_value(), right.known_value()) {
                    (Some(Value::Boolean(a)), Some(Value::Boolean(b))) => Some(Value::Boolean(match op {
                        LogicalOp::And => *a && *b,
                        LogicalOp::Or => *a || *b,
                    })),
                    _ => None,
                }
            }
            ExprKind::Grouping(inner) => {
                self.expr(inner);
                None
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee);
                for arg in args {
                    self.expr(arg);
                }
                None
            }
            ExprKind::Get { object, .. } => {
                self.expr(object);
                None
            }
            ExprKind::Set { object, value, .. } => {
                self.expr(object);
                self.expr(value);
                None
            }
        };

        if let Some(value) = folded {
            expr.kind = ExprKind::Literal(value);
            self.folds += 1;
        } else if matches!(expr.kind, ExprKind::Grouping(_)) {
            if let ExprKind::Grouping(inner) = std::mem::replace(&mut expr.kind, ExprKind::Literal(Value::null())) {
                *expr = *inner;
            }
        }
    }
}

/// Evaluates `a op b` for two known operands, exactly as the VM would.
/// Division by a known zero folds to `0.0d`.
pub(super) fn fold_binary(op: BinaryOp, a: &Value, b: &Value) -> Option<Value> {
    if let Some(arith) = op.arith() {
        if arith == Arith::Divide && a.is_number() && b.is_zero() {
            return Some(Value::Double(0.0));
        }
        return a.arith(arith, b).ok();
    }
    if op.is_equality() {
        let equal = a.equals(b);
        return Some(Value::Boolean(if op == BinaryOp::Equal { equal } else { !equal }));
    }
    let ord = a.compare(b).ok()?;
    let result = match op {
        BinaryOp::Greater => ord == Some(Ordering::Greater),
        BinaryOp::GreaterEqual => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Less => ord == Some(Ordering::Less),
        BinaryOp::LessEqual => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        _ => return None,
    };
    Some(Value::Boolean(result))
}
