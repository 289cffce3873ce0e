//! Source-level optimizations over the typed IR: constant folding with
//! propagation through bindings, then dead code elimination.

use tracing::{debug, instrument};

use crate::ast::*;

mod dce;
mod fold;

/// Folding runs twice so that values exposed by the first pass (a binding
/// whose initializer only became constant after folding) reach their reads.
const FOLD_PASSES: usize = 2;

/// Rewrites `program` in place. The result has the same observable
/// behavior for every input.
#[instrument(skip_all)]
pub fn optimize(program: &mut Program) {
    pin_reassigned_globals(program);

    for pass in 1..=FOLD_PASSES {
        let folds = fold_program(program);
        debug!(pass, folds, "constant folding");
    }

    let removed = eliminate_dead_code(program);
    debug!(removed, "dead code elimination");
}

/// A global written anywhere may change between its declaration and any
/// function body that reads it.
fn pin_reassigned_globals(program: &mut Program) {
    let mut assigned = Vec::new();
    for stmt in &program.stmts {
        walk_stmt(stmt, &mut |expr| {
            if let ExprKind::Assign { local, .. } = &expr.kind {
                assigned.push(*local);
            }
        });
    }
    for id in assigned {
        let local = &mut program.locals[id];
        if local.is_global {
            local.should_fold = false;
        }
    }
}

fn fold_program(program: &mut Program) -> usize {
    let Program { stmts, locals } = program;
    let mut folds = 0;
    let mut script = fold::FoldCtx::new(locals);
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::Function(decl) => {
                let mut ctx = fold::FoldCtx::new(script.locals_mut());
                ctx.stmts(&mut decl.body);
                folds += ctx.folds;
            }
            Stmt::Class(class) => {
                for method in &mut class.methods {
                    let mut ctx = fold::FoldCtx::new(script.locals_mut());
                    ctx.stmts(&mut method.body);
                    folds += ctx.folds;
                }
            }
            other => script.stmts(std::slice::from_mut(other)),
        }
    }
    folds + script.folds
}

fn eliminate_dead_code(program: &mut Program) -> usize {
    let stmts = std::mem::take(&mut program.stmts);
    let mut dce = dce::Dce::new(&program.locals);
    let (stmts, _) = dce.block(stmts);
    let removed = dce.removed;
    program.stmts = stmts;
    removed
}

// ---- IR walking ----

fn walk_stmt(stmt: &Stmt, visit: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Let { init, .. } => walk_expr(init, visit),
        Stmt::Expression(expr) | Stmt::Print(expr) => walk_expr(expr, visit),
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                walk_expr(value, visit);
            }
        }
        Stmt::Block(stmts) => stmts.iter().for_each(|s| walk_stmt(s, visit)),
        Stmt::If { cond, then_branch, else_branch } => {
            walk_expr(cond, visit);
            walk_stmt(then_branch, visit);
            if let Some(else_branch) = else_branch {
                walk_stmt(else_branch, visit);
            }
        }
        Stmt::While { cond, body } => {
            walk_expr(cond, visit);
            walk_stmt(body, visit);
        }
        Stmt::Function(decl) => decl.body.iter().for_each(|s| walk_stmt(s, visit)),
        Stmt::Class(class) => {
            for method in &class.methods {
                method.body.iter().for_each(|s| walk_stmt(s, visit));
            }
        }
    }
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match &expr.kind {
        ExprKind::Literal(_) | ExprKind::Variable(_) => {}
        ExprKind::Assign { value, .. } => walk_expr(value, visit),
        ExprKind::Unary { operand, .. } => walk_expr(operand, visit),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        ExprKind::Grouping(inner) => walk_expr(inner, visit),
        ExprKind::Call { callee, args } => {
            walk_expr(callee, visit);
            args.iter().for_each(|a| walk_expr(a, visit));
        }
        ExprKind::Get { object, .. } => walk_expr(object, visit),
        ExprKind::Set { object, value, .. } => {
            walk_expr(object, visit);
            walk_expr(value, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Op;
    use crate::compiler::compile;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::value::Value;

    fn optimized(src: &str) -> Program {
        let tokens = lex(src).unwrap();
        let (mut program, errors) = parse(tokens, src);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        optimize(&mut program);
        program
    }

    fn main_body(program: &Program) -> &[Stmt] {
        &program.function("main").expect("main").body
    }

    fn printed(stmt: &Stmt) -> &Expr {
        match stmt {
            Stmt::Print(expr) => expr,
            other => panic!("expected print, got {other:?}"),
        }
    }

    fn printed_literal(stmt: &Stmt) -> Value {
        match &printed(stmt).kind {
            ExprKind::Literal(v) => v.clone(),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn folds_arithmetic_with_precedence() {
        let p = optimized("fn main() {\n  : 2 + 3 * 4\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 1);
        assert!(matches!(printed_literal(&body[0]), Value::Int(14)));
    }

    #[test]
    fn folded_values_match_evaluation() {
        let cases: &[(&str, Value)] = &[
            ("7 - 2", Value::Int(5)),
            ("7 / 2", Value::Int(3)),
            ("1.5 * 2.0", Value::Double(3.0)),
            ("7 > 2", Value::Boolean(true)),
            ("2 >= 2", Value::Boolean(true)),
            ("7 < 2", Value::Boolean(false)),
            ("3 == 3", Value::Boolean(true)),
            ("3 != 3", Value::Boolean(false)),
            ("-(4)", Value::Int(-4)),
            ("!true", Value::Boolean(false)),
            ("true and false", Value::Boolean(false)),
            ("false or true", Value::Boolean(true)),
        ];
        for (expr, expected) in cases {
            let p = optimized(&format!("fn main() {{\n  : {expr}\n}}"));
            let got = printed_literal(&main_body(&p)[0]);
            assert!(got.equals(expected), "{expr}: got {got:?}, want {expected:?}");
        }
    }

    #[test]
    fn divide_by_known_zero_folds_to_zero_double() {
        let p = optimized("fn main() {\n  : 5 / 0\n}");
        assert!(matches!(printed_literal(&main_body(&p)[0]), Value::Double(d) if d == 0.0));
    }

    #[test]
    fn propagates_through_bindings_and_drops_them() {
        let p = optimized("fn main() {\n  let x = 5\n  let y = x + 1\n  : y * 2\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 1, "{body:?}");
        assert!(matches!(printed_literal(&body[0]), Value::Int(12)));
    }

    #[test]
    fn straight_line_reassignment_folds() {
        let p = optimized("fn main() {\n  let x = 1\n  x = 2\n  : x\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 1, "{body:?}");
        assert!(matches!(printed_literal(&body[0]), Value::Int(2)));
    }

    #[test]
    fn loop_bindings_are_not_folded() {
        let p = optimized("fn main() {\n  let i = 0\n  while i < 5 {\n    i = i + 1\n  }\n  : i\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 3, "{body:?}");
        assert!(matches!(body[0], Stmt::Let { .. }));
        assert!(matches!(printed(&body[2]).kind, ExprKind::Variable(_)));
        let i = p.locals.find("i").expect("i");
        assert!(!p.locals[i].should_fold);
        assert!(p.locals[i].is_used);

        // after the loop, the print reads the register, not a constant
        let script = compile(&p).expect("compiles");
        let main = script.find("main").expect("main");
        let insts = main.chunk.instructions();
        let after_loop = insts.iter().rposition(|inst| inst.op == Op::Loop).expect("loop") + 1;
        let tail: Vec<Op> = insts[after_loop..].iter().map(|inst| inst.op).collect();
        assert_eq!(tail, vec![Op::Load, Op::PrintPop, Op::Return]);
        assert_eq!(insts[after_loop].operands, vec![p.locals[i].slot]);
    }

    #[test]
    fn conditional_writes_are_forgotten_after_the_branch() {
        let p = optimized("fn f(c: bool) {\n  let x = 1\n  if c {\n    x = 2\n    : x\n  }\n  : x\n}");
        let body = &p.function("f").expect("f").body;
        let Stmt::If { then_branch, .. } = &body[1] else { panic!("expected if, got {:?}", body[1]) };
        let Stmt::Block(inner) = then_branch.as_ref() else { panic!("expected block") };
        // inside the branch the write is still known
        assert!(matches!(printed_literal(&inner[1]), Value::Int(2)));
        assert!(matches!(printed(&body[2]).kind, ExprKind::Variable(_)));
    }

    #[test]
    fn constant_conditions_select_a_branch() {
        let p = optimized("fn main() {\n  if 1 < 2 {\n    : 10\n  } else {\n    : 20\n  }\n  while false {\n    : 30\n  }\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 1, "{body:?}");
        let Stmt::Block(chosen) = &body[0] else { panic!("expected block, got {:?}", body[0]) };
        assert!(matches!(printed_literal(&chosen[0]), Value::Int(10)));
    }

    #[test]
    fn statements_after_return_are_removed() {
        let p = optimized("fn f(): int {\n  return 1\n  : 2\n}");
        let body = &p.function("f").expect("f").body;
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0], Stmt::Return { .. }));
    }

    #[test]
    fn unused_binding_keeps_its_call() {
        let p = optimized("fn g(): int {\n  : 1\n  return 2\n}\nfn main() {\n  let x = g()\n}");
        let body = main_body(&p);
        assert_eq!(body.len(), 1);
        match &body[0] {
            Stmt::Expression(e) => assert!(matches!(e.kind, ExprKind::Call { .. })),
            other => panic!("expected call statement, got {other:?}"),
        }
    }

    #[test]
    fn reassigned_globals_are_pinned() {
        let p = optimized("let g = 1\nfn bump() {\n  g = g + 1\n}\nfn main() {\n  bump()\n  : g\n}");
        assert!(matches!(printed(&main_body(&p)[1]).kind, ExprKind::Variable(_)));
        assert!(p.stmts.iter().any(|s| matches!(s, Stmt::Let { .. })));
    }

    #[test]
    fn constant_globals_fold_into_functions() {
        let p = optimized("let limit = 10\nfn main() {\n  : limit * 2\n}");
        assert!(matches!(printed_literal(&main_body(&p)[0]), Value::Int(20)));
        assert!(!p.stmts.iter().any(|s| matches!(s, Stmt::Let { .. })));
    }
}
