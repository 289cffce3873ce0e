use crate::ast::*;
use crate::value::Value;

pub(super) struct Dce<'a> {
    locals: &'a Locals,
    pub(super) removed: usize,
}

impl<'a> Dce<'a> {
    pub(super) fn new(locals: &'a Locals) -> Self {
        Dce { locals, removed: 0 }
    }

    /// A write is dead when every read of the binding was folded away.
    fn dead_write(&self, id: LocalId) -> bool {
        let local = &self.locals[id];
        local.should_fold || !local.is_used
    }

    /// Rewrites one block. Everything after a `return` in the same block is
    /// unreachable.
    pub(super) fn block(&mut self, stmts: Vec<Stmt>) -> (Vec<Stmt>, bool) {
        let mut out = Vec::with_capacity(stmts.len());
        let mut returned = false;
        for stmt in stmts {
            if returned {
                self.removed += 1;
                continue;
            }
            match self.stmt(stmt) {
                Some((stmt, diverges)) => {
                    returned = diverges;
                    out.push(stmt);
                }
                None => self.removed += 1,
            }
        }
        (out, returned)
    }

    /// Returns the rewritten statement and whether it always returns.
    fn stmt(&mut self, stmt: Stmt) -> Option<(Stmt, bool)> {
        match stmt {
            Stmt::Let { local, init, line } => {
                if self.locals[local].is_used {
                    let init = self.value(init);
                    return Some((Stmt::Let { local, init, line }, false));
                }
                if init.is_pure() {
                    return None;
                }
                self.effect(init).map(|e| (Stmt::Expression(e), false))
            }
            Stmt::Expression(expr) => self.effect(expr).map(|e| (Stmt::Expression(e), false)),
            Stmt::Print(expr) => Some((Stmt::Print(self.value(expr)), false)),
            Stmt::Block(stmts) => {
                let (stmts, returned) = self.block(stmts);
                Some((Stmt::Block(stmts), returned))
            }
            Stmt::If { cond, then_branch, else_branch } => match cond.known_value() {
                Some(Value::Boolean(true)) => self.stmt(*then_branch),
                Some(Value::Boolean(false)) => else_branch.and_then(|e| self.stmt(*e)),
                _ => {
                    let cond = self.value(cond);
                    let then_branch = self.branch(*then_branch);
                    let else_branch = else_branch.map(|e| Box::new(self.branch(*e)));
                    Some((Stmt::If { cond, then_branch: Box::new(then_branch), else_branch }, false))
                }
            },
            Stmt::While { cond, body } => {
                if matches!(cond.known_value(), Some(Value::Boolean(false))) {
                    return None;
                }
                let cond = self.value(cond);
                let body = self.branch(*body);
                Some((Stmt::While { cond, body: Box::new(body) }, false))
            }
            Stmt::Return { value, line } => {
                let value = value.map(|v| self.value(v));
                Some((Stmt::Return { value, line }, true))
            }
            Stmt::Function(mut decl) => {
                self.function(&mut decl);
                Some((Stmt::Function(decl), false))
            }
            Stmt::Class(mut class) => {
                for method in &mut class.methods {
                    self.function(method);
                }
                Some((Stmt::Class(class), false))
            }
        }
    }

    pub(super) fn function(&mut self, decl: &mut FunctionDecl) {
        let body = std::mem::take(&mut decl.body);
        decl.body = self.block(body).0;
    }

    /// A branch that vanished entirely still needs a statement in its place.
    fn branch(&mut self, stmt: Stmt) -> Stmt {
        match self.stmt(stmt) {
            Some((stmt, _)) => stmt,
            None => Stmt::Block(Vec::new()),
        }
    }

    /// Rewrites an expression evaluated only for its effect. `None` when
    /// nothing is left to evaluate.
    fn effect(&mut self, expr: Expr) -> Option<Expr> {
        match expr.kind {
            ExprKind::Assign { local, value } if self.dead_write(local) => {
                self.removed += 1;
                self.effect(*value)
            }
            ExprKind::Grouping(inner) => self.effect(*inner),
            ExprKind::Literal(_) => None,
            kind => Some(self.value(Expr { kind, ..expr })),
        }
    }

    /// Rewrites an expression whose value is used.
    fn value(&mut self, expr: Expr) -> Expr {
        let Expr { kind, ty, line } = expr;
        let kind = match kind {
            ExprKind::Assign { local, value } if self.dead_write(local) => {
                self.removed += 1;
                return self.value(*value);
            }
            ExprKind::Grouping(inner) => return self.value(*inner),
            ExprKind::Assign { local, value } => ExprKind::Assign { local, value: Box::new(self.value(*value)) },
            ExprKind::Unary { op, operand } => ExprKind::Unary { op, operand: Box::new(self.value(*operand)) },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(self.value(*left)),
                right: Box::new(self.value(*right)),
            },
            ExprKind::Logical { op, left, right } => ExprKind::Logical {
                op,
                left: Box::new(self.value(*left)),
                right: Box::new(self.value(*right)),
            },
            ExprKind::Call { callee, args } => ExprKind::Call {
                callee: Box::new(self.value(*callee)),
                args: args.into_iter().map(|a| self.value(a)).collect(),
            },
            ExprKind::Get { object, name } => ExprKind::Get { object: Box::new(self.value(*object)), name },
            ExprKind::Set { object, name, value } => ExprKind::Set {
                object: Box::new(self.value(*object)),
                name,
                value: Box::new(self.value(*value)),
            },
            kind @ (ExprKind::Literal(_) | ExprKind::Variable(_)) => kind,
        };
        Expr { kind, ty, line }
    }
}
