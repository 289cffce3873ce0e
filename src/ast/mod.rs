use std::ops::{Index, IndexMut};

use serde::Serialize;

use crate::value::{Arith, Param, Type, Value};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };
}

// ---- Bindings ----

/// Stable index of a [`Local`] in the program's [`Locals`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LocalId(pub usize);

/// One binding. Every read and write of the binding holds its [`LocalId`],
/// so the optimizer's updates here are seen by all of them.
#[derive(Debug, Clone, Serialize)]
pub struct Local {
    pub name: String,
    /// Register index, or global table index when `is_global`.
    pub slot: u8,
    pub ty: Type,
    /// Last statically known value at the current point of the optimizer walk.
    pub value: Option<Value>,
    pub is_global: bool,
    pub is_used: bool,
    /// Cleared once a read can no longer be replaced by `value`: the binding
    /// is touched inside a loop, holds an object, or is read where its value
    /// is unknown.
    pub should_fold: bool,
}

impl Local {
    pub fn new(name: &str, slot: u8, ty: Type, is_global: bool) -> Self {
        Local {
            name: name.to_string(),
            slot,
            ty,
            value: None,
            is_global,
            is_used: false,
            should_fold: ty != Type::Object,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Locals {
    items: Vec<Local>,
}

impl Locals {
    pub fn new() -> Self {
        Locals::default()
    }

    pub fn push(&mut self, local: Local) -> LocalId {
        self.items.push(local);
        LocalId(self.items.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalId, &Local)> {
        self.items.iter().enumerate().map(|(i, l)| (LocalId(i), l))
    }

    pub fn find(&self, name: &str) -> Option<LocalId> {
        self.iter().find(|(_, l)| l.name == name).map(|(id, _)| id)
    }
}

impl Index<LocalId> for Locals {
    type Output = Local;
    fn index(&self, id: LocalId) -> &Local {
        &self.items[id.0]
    }
}

impl IndexMut<LocalId> for Locals {
    fn index_mut(&mut self, id: LocalId) -> &mut Local {
        &mut self.items[id.0]
    }
}

// ---- Operators ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

impl BinaryOp {
    pub fn arith(self) -> Option<Arith> {
        match self {
            BinaryOp::Add => Some(Arith::Add),
            BinaryOp::Subtract => Some(Arith::Subtract),
            BinaryOp::Multiply => Some(Arith::Multiply),
            BinaryOp::Divide => Some(Arith::Divide),
            _ => None,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Greater | BinaryOp::GreaterEqual | BinaryOp::Less | BinaryOp::LessEqual)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Equal | BinaryOp::NotEqual)
    }

    /// `a op b == b op a`
    pub fn commutes(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Multiply)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

// ---- Expressions ----

/// A typed expression node. `ty` is the static type inferred at parse time.
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Literal(Value),
    Variable(LocalId),
    /// `name = value`. Compound forms arrive here already desugared to
    /// `name = name op value`.
    Assign {
        local: LocalId,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Grouping(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: String,
    },
    Set {
        object: Box<Expr>,
        name: String,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, line: u32) -> Self {
        Expr { kind, ty, line }
    }

    pub fn literal(value: Value, line: u32) -> Self {
        let ty = value.ty();
        Expr { kind: ExprKind::Literal(value), ty, line }
    }

    /// The statically known value, if this node is (a grouping of) a literal.
    pub fn known_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Literal(v) => Some(v),
            ExprKind::Grouping(inner) => inner.known_value(),
            _ => None,
        }
    }

    /// Strips any number of grouping parentheses.
    pub fn ungrouped(&self) -> &Expr {
        match &self.kind {
            ExprKind::Grouping(inner) => inner.ungrouped(),
            _ => self,
        }
    }

    /// True if evaluating this subtree may invoke a function.
    pub fn has_call(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => false,
            ExprKind::Call { .. } => true,
            ExprKind::Assign { value, .. } => value.has_call(),
            ExprKind::Unary { operand, .. } => operand.has_call(),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.has_call() || right.has_call()
            }
            ExprKind::Grouping(inner) => inner.has_call(),
            ExprKind::Get { object, .. } => object.has_call(),
            ExprKind::Set { object, value, .. } => object.has_call() || value.has_call(),
        }
    }

    /// True if evaluating this subtree writes the binding `id`.
    pub fn assigns(&self, id: LocalId) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => false,
            ExprKind::Assign { local, value } => *local == id || value.assigns(id),
            ExprKind::Unary { operand, .. } => operand.assigns(id),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.assigns(id) || right.assigns(id)
            }
            ExprKind::Grouping(inner) => inner.assigns(id),
            ExprKind::Call { callee, args } => callee.assigns(id) || args.iter().any(|a| a.assigns(id)),
            ExprKind::Get { object, .. } => object.assigns(id),
            ExprKind::Set { object, value, .. } => object.assigns(id) || value.assigns(id),
        }
    }

    /// True if evaluating this subtree has no observable effect beyond its
    /// value. Runtime faults (a bad field read, say) are not counted.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Variable(_) => true,
            ExprKind::Call { .. } | ExprKind::Assign { .. } | ExprKind::Set { .. } => false,
            ExprKind::Unary { operand, .. } => operand.is_pure(),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.is_pure() && right.is_pure()
            }
            ExprKind::Grouping(inner) => inner.is_pure(),
            ExprKind::Get { object, .. } => object.is_pure(),
        }
    }
}

// ---- Statements ----

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    /// `let name[: type] [= init]`; a missing initializer is the type's zero value.
    Let { local: LocalId, init: Expr, line: u32 },
    Expression(Expr),
    /// `: expr`
    Print(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Return { value: Option<Expr>, line: u32 },
    Function(FunctionDecl),
    Class(ClassDecl),
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    /// Global slot binding for top-level functions; `None` for methods.
    pub local: Option<LocalId>,
    pub params: Vec<Param>,
    pub return_type: Option<Type>,
    pub body: Vec<Stmt>,
    pub is_method: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub line: u32,
}

/// `class Name { let field ... fn method(...) { } }`. Field initializers are
/// already prepended to the `<init>` method as `this.field = value`.
#[derive(Debug, Clone, Serialize)]
pub struct ClassDecl {
    pub name: String,
    pub local: LocalId,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub line: u32,
}

impl ClassDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

pub const INIT: &str = "<init>";

/// A parsed program: top-level declarations plus the binding arena they
/// refer to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
    pub locals: Locals,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.stmts.iter().find_map(|s| match s {
            Stmt::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.stmts.iter().find_map(|s| match s {
            Stmt::Class(c) if c.name == name => Some(c),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i32) -> Expr {
        Expr::literal(Value::Int(n), 1)
    }

    fn call() -> Expr {
        let callee = Expr::new(ExprKind::Variable(LocalId(0)), Type::Object, 1);
        Expr::new(ExprKind::Call { callee: Box::new(callee), args: vec![] }, Type::Object, 1)
    }

    #[test]
    fn object_locals_never_fold() {
        assert!(Local::new("n", 0, Type::Int, false).should_fold);
        assert!(!Local::new("o", 0, Type::Object, false).should_fold);
    }

    #[test]
    fn arena_ids_are_stable() {
        let mut locals = Locals::new();
        let a = locals.push(Local::new("a", 0, Type::Int, false));
        let b = locals.push(Local::new("b", 1, Type::Int, false));
        locals[a].is_used = true;
        assert!(locals[a].is_used);
        assert!(!locals[b].is_used);
        assert_eq!(locals.find("b"), Some(b));
    }

    #[test]
    fn known_value_sees_through_grouping() {
        let grouped = Expr::new(ExprKind::Grouping(Box::new(int(4))), Type::Int, 1);
        assert!(matches!(grouped.known_value(), Some(Value::Int(4))));
    }

    #[test]
    fn call_flags_propagate_upwards() {
        let sum = Expr::new(
            ExprKind::Binary { op: BinaryOp::Add, left: Box::new(int(1)), right: Box::new(call()) },
            Type::Object,
            1,
        );
        assert!(sum.has_call());
        assert!(!sum.is_pure());

        let plain = Expr::new(
            ExprKind::Binary { op: BinaryOp::Add, left: Box::new(int(1)), right: Box::new(int(2)) },
            Type::Int,
            1,
        );
        assert!(!plain.has_call());
        assert!(plain.is_pure());
    }

    #[test]
    fn assignment_is_impure_without_a_call() {
        let assign = Expr::new(ExprKind::Assign { local: LocalId(0), value: Box::new(int(1)) }, Type::Int, 1);
        assert!(!assign.has_call());
        assert!(!assign.is_pure());
    }
}
