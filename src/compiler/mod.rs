use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, instrument};

use crate::ast::*;
use crate::chunk::{Chunk, ChunkError, Op};
use crate::value::{Class, Function, Object, Param, Type, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} (in {function})")]
pub struct CompileError {
    pub line: u32,
    pub function: String,
    #[source]
    pub kind: ChunkError,
}

type Result<T> = std::result::Result<T, CompileError>;

pub const SCRIPT: &str = "script";

/// Lowers a program to its script function. The script installs every
/// top-level function, class and `let` into its global slot, then calls
/// `main` when the program declares one.
#[instrument(skip_all)]
pub fn compile(program: &Program) -> Result<Rc<Function>> {
    let mut script = FnCompiler::new(&program.locals, SCRIPT);
    let mut functions = 0;

    for stmt in &program.stmts {
        match stmt {
            Stmt::Function(decl) => {
                let function = compile_function(&program.locals, decl)?;
                functions += 1;
                if let Some(local) = decl.local {
                    script.install(local, Value::Object(Object::Function(function)), decl.line)?;
                }
            }
            Stmt::Class(class) => {
                let compiled = compile_class(&program.locals, class)?;
                functions += class.methods.len();
                script.install(class.local, Value::Object(Object::Class(compiled)), class.line)?;
            }
            other => script.stmt(other)?,
        }
    }

    let line = script.last_line(1);
    if let Some(main) = program.function("main").and_then(|f| f.local) {
        script.emit(Op::LoadGlobal, &[program.locals[main].slot], line);
        script.emit(Op::CallPop, &[0], line);
    }
    script.emit(Op::Return, &[], line);

    debug!(functions, script_bytes = script.chunk.len(), "compiled program");
    Ok(Rc::new(script.finish(Vec::new(), None, false)))
}

fn compile_function(locals: &Locals, decl: &FunctionDecl) -> Result<Rc<Function>> {
    let mut c = FnCompiler::new(locals, &decl.name);
    for stmt in &decl.body {
        c.stmt(stmt)?;
    }
    // falling off the end returns the zero value of the declared type
    let line = c.last_line(decl.line);
    if let Some(ty) = decl.return_type {
        let k = c.constant(ty.zero(), line)?;
        c.emit(Op::Ldc, &[k], line);
    }
    c.emit(Op::Return, &[], line);

    debug!(
        function = %decl.name,
        bytes = c.chunk.len(),
        constants = c.chunk.constants.len(),
        "compiled function"
    );
    Ok(Rc::new(c.finish(decl.params.clone(), decl.return_type, decl.is_method)))
}

fn compile_class(locals: &Locals, class: &ClassDecl) -> Result<Rc<Class>> {
    let mut methods = HashMap::new();
    for method in &class.methods {
        methods.insert(method.name.clone(), compile_function(locals, method)?);
    }
    Ok(Rc::new(Class { name: class.name.clone(), methods }))
}

// ---- Per-function compiler ----

struct FnCompiler<'a> {
    locals: &'a Locals,
    chunk: Chunk,
    name: String,
}

impl<'a> FnCompiler<'a> {
    fn new(locals: &'a Locals, name: &str) -> Self {
        FnCompiler { locals, chunk: Chunk::new(), name: name.to_string() }
    }

    fn finish(self, params: Vec<Param>, return_type: Option<Type>, is_method: bool) -> Function {
        Function { name: self.name, chunk: self.chunk, params, return_type, is_method }
    }

    fn error(&self, kind: ChunkError, line: u32) -> CompileError {
        CompileError { line, function: self.name.clone(), kind }
    }

    fn last_line(&self, default: u32) -> u32 {
        self.chunk.len().checked_sub(1).and_then(|at| self.chunk.line_at(at)).unwrap_or(default)
    }

    fn emit(&mut self, op: Op, operands: &[u8], line: u32) {
        self.chunk.emit(op, operands, line);
    }

    fn constant(&mut self, value: Value, line: u32) -> Result<u8> {
        self.chunk.add_constant(value).map_err(|kind| self.error(kind, line))
    }

    fn name_constant(&mut self, name: &str, line: u32) -> Result<u8> {
        self.constant(Value::string(name), line)
    }

    fn patch(&mut self, at: usize, line: u32) -> Result<()> {
        self.chunk.patch_jump(at).map_err(|kind| self.error(kind, line))
    }

    fn install(&mut self, local: LocalId, value: Value, line: u32) -> Result<()> {
        let k = self.constant(value, line)?;
        self.emit(Op::Ldc, &[k], line);
        self.emit(Op::StoreGlobal, &[self.locals[local].slot], line);
        Ok(())
    }

    /// Register slot of a plain read of a local (non-global) binding.
    fn register(&self, expr: &Expr) -> Option<u8> {
        match expr.ungrouped().kind {
            ExprKind::Variable(id) if !self.locals[id].is_global => Some(self.locals[id].slot),
            _ => None,
        }
    }

    fn reads(expr: &Expr, id: LocalId) -> bool {
        matches!(expr.ungrouped().kind, ExprKind::Variable(read) if read == id)
    }

    // ---- Statements ----

    fn stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Let { local, init, line } => self.store(*local, init, *line),
            Stmt::Expression(expr) => self.effect(expr),
            Stmt::Print(expr) => {
                self.expr(expr)?;
                self.emit(Op::PrintPop, &[], expr.line);
                Ok(())
            }
            Stmt::Block(stmts) => stmts.iter().try_for_each(|s| self.stmt(s)),
            Stmt::If { cond, then_branch, else_branch } => {
                let line = cond.line;
                self.expr(cond)?;
                let else_jump = self.chunk.emit_jump(Op::JumpIfFalse, line);
                self.stmt(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end_jump = self.chunk.emit_jump(Op::Jump, line);
                        self.patch(else_jump, line)?;
                        self.stmt(else_branch)?;
                        self.patch(end_jump, line)
                    }
                    None => self.patch(else_jump, line),
                }
            }
            Stmt::While { cond, body } => {
                let line = cond.line;
                let loop_start = self.chunk.len();
                self.expr(cond)?;
                let exit_jump = self.chunk.emit_jump(Op::JumpIfFalse, line);
                self.stmt(body)?;
                self.chunk.emit_loop(loop_start, line).map_err(|kind| self.error(kind, line))?;
                self.patch(exit_jump, line)
            }
            Stmt::Return { value, line } => {
                if let Some(value) = value {
                    self.expr(value)?;
                }
                self.emit(Op::Return, &[], *line);
                Ok(())
            }
            // declarations only occur at top level, where `compile` handles them
            Stmt::Function(_) | Stmt::Class(_) => Ok(()),
        }
    }

    /// Evaluates `value` into the binding `id`, leaving the stack untouched.
    fn store(&mut self, id: LocalId, value: &Expr, line: u32) -> Result<()> {
        let local = &self.locals[id];
        let slot = local.slot;
        if local.is_global {
            self.expr(value)?;
            self.emit(Op::StoreGlobal, &[slot], line);
            return Ok(());
        }
        if self.fused_store(id, slot, value, line)? {
            return Ok(());
        }
        self.expr(value)?;
        self.emit(Op::Store, &[slot], line);
        Ok(())
    }

    /// Register-only forms for the shapes that have one. Returns false when
    /// `value` must go through the stack.
    fn fused_store(&mut self, id: LocalId, dst: u8, value: &Expr, line: u32) -> Result<bool> {
        let locals = self.locals;
        let value = value.ungrouped();
        match &value.kind {
            ExprKind::Literal(v) => {
                let k = self.constant(v.clone(), line)?;
                self.emit(Op::LdcIp, &[dst, k], line);
            }
            ExprKind::Variable(src) => {
                let src = &locals[*src];
                let op = if src.is_global { Op::LoadGlobalIp } else { Op::LoadIp };
                self.emit(op, &[dst, src.slot], line);
            }
            ExprKind::Binary { op, left, right } => {
                let (Some(ft), Some(ip)) = (fused_ternary(*op), fused_in_place(*op)) else {
                    return Ok(false);
                };
                if let (Some(a), Some(b)) = (self.register(left), self.register(right)) {
                    self.emit(ft, &[a, b, dst], line);
                } else if Self::reads(left, id) && !right.assigns(id) {
                    // x = x op e
                    self.expr(right)?;
                    self.emit(ip, &[dst], line);
                } else if op.commutes() && Self::reads(right, id) && left.ty == right.ty && !left.assigns(id) {
                    // x = e op x
                    self.expr(left)?;
                    self.emit(ip, &[dst], line);
                } else {
                    return Ok(false);
                }
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate if Self::reads(operand, id) => self.emit(Op::NegateIp, &[dst], line),
                UnaryOp::Not if Self::reads(operand, id) => self.emit(Op::InvertBooleanIp, &[dst], line),
                UnaryOp::Not => match self.register(operand) {
                    Some(src) => self.emit(Op::InvertBooleanFt, &[src, dst], line),
                    None => return Ok(false),
                },
                UnaryOp::Negate => return Ok(false),
            },
            ExprKind::Get { object, name } => {
                self.expr(object)?;
                let k = self.name_constant(name, line)?;
                self.emit(Op::GetIp, &[k, dst], line);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// An expression evaluated for its effect only: nothing is left behind.
    fn effect(&mut self, expr: &Expr) -> Result<()> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Assign { local, value } => self.store(*local, value, line),
            ExprKind::Call { callee, args } => self.call(callee, args, true, line),
            ExprKind::Set { object, name, value } => {
                self.expr(object)?;
                let k = self.name_constant(name, line)?;
                match value.known_value() {
                    Some(v) => {
                        let c = self.constant(v.clone(), line)?;
                        self.emit(Op::SetLdc, &[k, c], line);
                    }
                    None => {
                        self.expr(value)?;
                        self.emit(Op::Set, &[k], line);
                        self.emit(Op::Pop, &[], line);
                    }
                }
                Ok(())
            }
            ExprKind::Grouping(inner) => self.effect(inner),
            _ => {
                self.expr(expr)?;
                // a call to a function without a return type pushes nothing
                let pop = if expr.has_call() { Op::PopIfPresent } else { Op::Pop };
                self.emit(pop, &[], line);
                Ok(())
            }
        }
    }

    // ---- Expressions ----

    /// Leaves the value of `expr` on the stack.
    fn expr(&mut self, expr: &Expr) -> Result<()> {
        let locals = self.locals;
        let line = expr.line;
        match &expr.kind {
            ExprKind::Literal(v) => {
                let k = self.constant(v.clone(), line)?;
                self.emit(Op::Ldc, &[k], line);
            }
            ExprKind::Variable(id) => {
                let local = &locals[*id];
                let op = if local.is_global { Op::LoadGlobal } else { Op::Load };
                self.emit(op, &[local.slot], line);
            }
            ExprKind::Assign { local, value } => {
                let local = &locals[*local];
                self.expr(value)?;
                self.emit(Op::Dup, &[], line);
                let op = if local.is_global { Op::StoreGlobal } else { Op::Store };
                self.emit(op, &[local.slot], line);
            }
            ExprKind::Unary { op, operand } => {
                self.expr(operand)?;
                let op = match op {
                    UnaryOp::Negate => Op::Negate,
                    UnaryOp::Not => Op::InvertBoolean,
                };
                self.emit(op, &[], line);
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(left)?;
                self.expr(right)?;
                self.binary_op(*op, line);
            }
            ExprKind::Logical { op, left, right } => {
                // left; DUP; JUMP_IF_x end; POP; right; end:
                self.expr(left)?;
                self.emit(Op::Dup, &[], line);
                let jump = match op {
                    LogicalOp::And => Op::JumpIfFalse,
                    LogicalOp::Or => Op::JumpIfTrue,
                };
                let end = self.chunk.emit_jump(jump, line);
                self.emit(Op::Pop, &[], line);
                self.expr(right)?;
                self.patch(end, line)?;
            }
            ExprKind::Grouping(inner) => self.expr(inner)?,
            ExprKind::Call { callee, args } => self.call(callee, args, false, line)?,
            ExprKind::Get { object, name } => {
                self.expr(object)?;
                let k = self.name_constant(name, line)?;
                self.emit(Op::Get, &[k], line);
            }
            ExprKind::Set { object, name, value } => {
                self.expr(object)?;
                self.expr(value)?;
                let k = self.name_constant(name, line)?;
                self.emit(Op::Set, &[k], line);
            }
        }
        Ok(())
    }

    fn binary_op(&mut self, op: BinaryOp, line: u32) {
        match op {
            BinaryOp::Add => self.emit(Op::Add, &[], line),
            BinaryOp::Subtract => {
                self.emit(Op::Negate, &[], line);
                self.emit(Op::Add, &[], line);
            }
            BinaryOp::Multiply => self.emit(Op::Multiply, &[], line),
            BinaryOp::Divide => self.emit(Op::Divide, &[], line),
            BinaryOp::Greater => self.emit(Op::IsGreater, &[], line),
            BinaryOp::GreaterEqual => self.emit(Op::IsGreaterEqual, &[], line),
            BinaryOp::Less => self.emit(Op::IsLess, &[], line),
            BinaryOp::LessEqual => self.emit(Op::IsLessEqual, &[], line),
            BinaryOp::Equal => self.emit(Op::IsEqual, &[], line),
            BinaryOp::NotEqual => {
                self.emit(Op::IsEqual, &[], line);
                self.emit(Op::InvertBoolean, &[], line);
            }
        }
    }

    /// `obj.m(args)` resolves `m` on the instance at call time; anything
    /// else is evaluated to a callee value first.
    fn call(&mut self, callee: &Expr, args: &[Expr], discard: bool, line: u32) -> Result<()> {
        let argc = u8::try_from(args.len()).map_err(|_| self.error(ChunkError::TooManyArguments, line))?;
        if let ExprKind::Get { object, name } = &callee.ungrouped().kind {
            self.expr(object)?;
            for arg in args {
                self.expr(arg)?;
            }
            let k = self.name_constant(name, line)?;
            let op = if discard { Op::CallMethodPop } else { Op::CallMethod };
            self.emit(op, &[k, argc], line);
        } else {
            self.expr(callee)?;
            for arg in args {
                self.expr(arg)?;
            }
            let op = if discard { Op::CallPop } else { Op::Call };
            self.emit(op, &[argc], line);
        }
        Ok(())
    }
}

fn fused_in_place(op: BinaryOp) -> Option<Op> {
    match op {
        BinaryOp::Add => Some(Op::AddIp),
        BinaryOp::Subtract => Some(Op::SubtractIp),
        BinaryOp::Multiply => Some(Op::MultiplyIp),
        BinaryOp::Divide => Some(Op::DivideIp),
        _ => None,
    }
}

fn fused_ternary(op: BinaryOp) -> Option<Op> {
    match op {
        BinaryOp::Add => Some(Op::AddFt),
        BinaryOp::Subtract => Some(Op::SubtractFt),
        BinaryOp::Multiply => Some(Op::MultiplyFt),
        BinaryOp::Divide => Some(Op::DivideFt),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Instruction;
    use crate::lexer::lex;
    use crate::optimizer::optimize;
    use crate::parser::parse;

    fn compile_src(src: &str, optimized: bool) -> Rc<Function> {
        let tokens = lex(src).unwrap();
        let (mut program, errors) = parse(tokens, src);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        if optimized {
            optimize(&mut program);
        }
        compile(&program).unwrap()
    }

    fn function(script: &Function, name: &str) -> Rc<Function> {
        script.find(name).unwrap_or_else(|| panic!("no function {name}"))
    }

    fn ops(src: &str, name: &str) -> Vec<Op> {
        function(&compile_src(src, false), name).chunk.ops()
    }

    /// Every jump must land on an instruction boundary (or the very end).
    fn assert_jumps_land(chunk: &Chunk) {
        let insts = chunk.instructions();
        let boundaries: Vec<usize> = insts.iter().map(|i| i.offset).chain([chunk.len()]).collect();
        for inst in insts.iter().filter(|i| i.op.is_jump()) {
            let target = inst.target().expect("jump target");
            assert!(boundaries.contains(&target), "{} at {} lands mid-instruction at {}", inst.op.name(), inst.offset, target);
        }
    }

    #[test]
    fn script_installs_globals_then_calls_main() {
        let script = compile_src("fn main() {\n  : 1\n}", true);
        assert_eq!(script.name, SCRIPT);
        assert_eq!(script.chunk.ops(), vec![Op::Ldc, Op::StoreGlobal, Op::LoadGlobal, Op::CallPop, Op::Return]);
    }

    #[test]
    fn script_without_main_only_installs() {
        let script = compile_src("let g = 1\nfn f() { }", false);
        assert_eq!(script.chunk.ops(), vec![Op::Ldc, Op::StoreGlobal, Op::Ldc, Op::StoreGlobal, Op::Return]);
    }

    #[test]
    fn if_else_jumps_are_patched_to_branch_starts() {
        let f = function(&compile_src("fn f(c: bool) {\n  if c {\n    : 1\n  } else {\n    : 2\n  }\n}", false), "f");
        let insts = f.chunk.instructions();
        let ops: Vec<Op> = insts.iter().map(|i| i.op).collect();
        assert_eq!(
            ops,
            vec![Op::Load, Op::JumpIfFalse, Op::Ldc, Op::PrintPop, Op::Jump, Op::Ldc, Op::PrintPop, Op::Return]
        );
        // the false branch starts right after the unconditional jump
        assert_eq!(insts[1].target(), Some(insts[5].offset));
        assert_eq!(insts[4].target(), Some(insts[7].offset));
        // encoded distance counts from the byte after the operand
        let distance = f.chunk.read_short(insts[1].offset + 1).unwrap() as usize;
        assert_eq!(insts[1].offset + 3 + distance, insts[5].offset);
    }

    #[test]
    fn while_loops_back_to_the_condition() {
        let f = function(&compile_src("fn f() {\n  let i = 0\n  while i < 3 {\n    i = i + 1\n  }\n}", false), "f");
        let insts = f.chunk.instructions();
        let cond = insts.iter().position(|i| i.op == Op::Load).unwrap();
        let exit = insts.iter().find(|i| i.op == Op::JumpIfFalse).unwrap();
        let back = insts.iter().find(|i| i.op == Op::Loop).unwrap();
        assert_eq!(back.target(), Some(insts[cond].offset));
        assert_eq!(exit.target(), Some(back.offset + back.width()));
        assert_jumps_land(&f.chunk);
    }

    #[test]
    fn logical_operators_short_circuit() {
        let and = ops("fn f(a: bool, b: bool) {\n  : a and b\n}", "f");
        assert_eq!(
            and,
            vec![Op::Load, Op::Dup, Op::JumpIfFalse, Op::Pop, Op::Load, Op::PrintPop, Op::Return]
        );
        let or = ops("fn f(a: bool, b: bool) {\n  : a or b\n}", "f");
        assert!(or.contains(&Op::JumpIfTrue));
    }

    #[test]
    fn subtraction_and_inequality_have_no_opcode_of_their_own() {
        let code = ops("fn f(a: int, b: int) {\n  : a - b\n  : a != b\n}", "f");
        assert_eq!(
            code,
            vec![
                Op::Load,
                Op::Load,
                Op::Negate,
                Op::Add,
                Op::PrintPop,
                Op::Load,
                Op::Load,
                Op::IsEqual,
                Op::InvertBoolean,
                Op::PrintPop,
                Op::Return,
            ]
        );
    }

    #[test]
    fn register_shapes_are_fused() {
        let src = "fn f(a: int, b: int, ok: bool) {\n  let c = a + b\n  let d = 5\n  let e = a\n  c = c * 2\n  c = 2 + c\n  let n = !ok\n  ok = !ok\n  e = -e\n}";
        assert_eq!(
            ops(src, "f"),
            vec![
                Op::AddFt,
                Op::LdcIp,
                Op::LoadIp,
                Op::Ldc,
                Op::MultiplyIp,
                Op::Ldc,
                Op::AddIp,
                Op::InvertBooleanFt,
                Op::InvertBooleanIp,
                Op::NegateIp,
                Op::Return,
            ]
        );
    }

    #[test]
    fn ternary_operands_name_source_and_destination_registers() {
        let f = function(&compile_src("fn f(a: int, b: int) {\n  let c = a - b\n}", false), "f");
        let first = &f.chunk.instructions()[0];
        assert_eq!(*first, Instruction { offset: 0, op: Op::SubtractFt, operands: vec![0, 1, 2] });
    }

    #[test]
    fn non_commuting_shapes_fall_back_to_the_stack() {
        let both_registers = ops("fn f(a: int) {\n  let x = 1\n  x = a - x\n}", "f");
        assert_eq!(both_registers, vec![Op::LdcIp, Op::SubtractFt, Op::Return]);
        let constant_left = ops("fn f(a: int) {\n  let x = 1\n  x = 10 - x\n}", "f");
        assert_eq!(constant_left, vec![Op::LdcIp, Op::Ldc, Op::Load, Op::Negate, Op::Add, Op::Store, Op::Return]);
    }

    #[test]
    fn globals_are_never_fused() {
        let code = ops("let g = 0\nfn f() {\n  g = g + 1\n}", "f");
        assert_eq!(code, vec![Op::LoadGlobal, Op::Ldc, Op::Add, Op::StoreGlobal, Op::Return]);
    }

    #[test]
    fn value_position_assignment_duplicates() {
        let code = ops("fn f() {\n  let x = 0\n  : x = 3\n}", "f");
        assert_eq!(code, vec![Op::LdcIp, Op::Ldc, Op::Dup, Op::Store, Op::PrintPop, Op::Return]);
    }

    #[test]
    fn statement_calls_discard_their_result() {
        let src = "fn g(): int {\n  return 1\n}\nclass C {\n  fn m() { }\n}\nfn f() {\n  let c = C()\n  g()\n  c.m()\n  : g()\n}";
        let code = ops(src, "f");
        assert_eq!(
            code,
            vec![
                Op::LoadGlobal,
                Op::Call,
                Op::Store,
                Op::LoadGlobal,
                Op::CallPop,
                Op::Load,
                Op::CallMethodPop,
                Op::LoadGlobal,
                Op::Call,
                Op::PrintPop,
                Op::Return,
            ]
        );
    }

    #[test]
    fn field_stores_with_constants_use_set_ldc() {
        let src = "class P {\n  let x = 1\n  let y = 0\n  fn move(d: int) {\n    this.y = d\n  }\n}";
        let script = compile_src(src, false);
        let init = function(&script, INIT);
        assert_eq!(init.chunk.ops(), vec![Op::Load, Op::SetLdc, Op::Load, Op::SetLdc, Op::Return]);
        let mv = function(&script, "move");
        assert_eq!(mv.chunk.ops(), vec![Op::Load, Op::Load, Op::Set, Op::Pop, Op::Return]);
    }

    #[test]
    fn field_reads_into_registers_use_get_ip() {
        let src = "class P {\n  let x = 1\n  fn get(): int {\n    let v = this.x\n    return v\n  }\n}";
        let get = function(&compile_src(src, false), "get");
        assert_eq!(get.chunk.ops(), vec![Op::Load, Op::GetIp, Op::Load, Op::Return, Op::Ldc, Op::Return]);
    }

    #[test]
    fn typed_functions_fall_back_to_the_zero_value() {
        let f = function(&compile_src("fn f(): long {\n}", false), "f");
        assert_eq!(f.chunk.ops(), vec![Op::Ldc, Op::Return]);
        assert!(matches!(f.chunk.constants[0], Value::Long(0)));
    }

    #[test]
    fn dead_branches_compile_like_the_surviving_branch() {
        let folded = function(&compile_src("fn main() {\n  if true {\n    : 1\n  } else {\n    : 2\n  }\n}", true), "main");
        let plain = function(&compile_src("fn main() {\n  {\n    : 1\n  }\n}", true), "main");
        assert_eq!(folded.chunk.code, plain.chunk.code);

        let folded = function(&compile_src("fn main() {\n  if false {\n    : 1\n  } else {\n    : 2\n  }\n}", true), "main");
        let plain = function(&compile_src("fn main() {\n  {\n    : 2\n  }\n}", true), "main");
        assert_eq!(folded.chunk.code, plain.chunk.code);
    }

    #[test]
    fn every_jump_lands_on_an_instruction() {
        let src = "fn f(n: int): int {\n  let total = 0\n  let i = 0\n  while i < n {\n    if i > 2 and i < 8 or i == 0 {\n      total += i\n    } else if i == 9 {\n      total -= 1\n    }\n    i += 1\n  }\n  return total\n}";
        for optimized in [false, true] {
            let f = function(&compile_src(src, optimized), "f");
            assert_jumps_land(&f.chunk);
        }
    }
}
