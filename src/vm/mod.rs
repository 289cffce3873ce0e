use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::INIT;
use crate::chunk::Op;
use crate::value::{Arith, Function, Instance, Object, Type, Value, ValueError};

pub const DEFAULT_MAX_FRAMES: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("expected an instance but got {got}")]
    ExpectedInstance { got: &'static str },
    #[error("undefined field '{name}' on {class} instance")]
    UndefinedField { name: String, class: String },
    #[error("can only call functions and classes, got {got}")]
    NotCallable { got: &'static str },
    #[error("class {class} has no constructor")]
    MissingConstructor { class: String },
    #[error("method {name} called without an instance")]
    UnboundMethod { name: String },
    #[error("{function} expects {expected} argument(s) but got {got}")]
    Arity { function: String, expected: usize, got: usize },
    #[error("parameter '{param}' of {function} expects {expected} but got {got}")]
    ArgumentType { function: String, param: String, expected: &'static str, got: &'static str },
    #[error("stack overflow (more than {limit} frames)")]
    StackOverflow { limit: usize },
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("{function} returns nothing but its result was used")]
    NoReturnValue { function: String },
    #[error("{function} returned with {depth} extra value(s) on the stack")]
    UnbalancedStack { function: String, depth: usize },
    #[error("register {slot} read before assignment")]
    UnassignedRegister { slot: u8 },
    #[error("global {slot} read before assignment")]
    UndefinedGlobal { slot: u8 },
    #[error("constant {index} is missing or has the wrong kind")]
    BadConstant { index: u8 },
    #[error("jump outside of the chunk")]
    BadJump,
    #[error("ran past the end of the chunk")]
    EndOfCode,
    #[error("unknown opcode {byte:#04x}")]
    UnknownOpcode { byte: u8 },
    #[error("no active call frame")]
    NoFrame,
}

type VmResult<T> = Result<T, VmError>;

/// A fault that stopped execution, located at the failing instruction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("[line {line}] in {function}: {kind}")]
pub struct RuntimeError {
    pub line: u32,
    pub function: String,
    #[source]
    pub kind: VmError,
    /// The active chunk, with the failing instruction repeated last.
    pub disassembly: String,
}

// ── Call frames ──────────────────────────────────────────────────────

struct CallFrame {
    function: Rc<Function>,
    ip: usize,
    // offset of the instruction being executed, for error reports
    op_offset: usize,
    stack: Vec<Value>,
    registers: HashMap<u8, Value>,
    // set by the `_POP` call variants: the caller does not want the result
    discard: bool,
}

impl CallFrame {
    fn new(function: Rc<Function>, registers: HashMap<u8, Value>, discard: bool) -> Self {
        CallFrame { function, ip: 0, op_offset: 0, stack: Vec::new(), registers, discard }
    }
}

/// A parameter typed `any` takes every value; any other type requires a
/// value of exactly that kind.
fn accepts(ty: Type, value: &Value) -> bool {
    ty == Type::Object || value.ty() == ty
}

fn instance(value: &Value) -> VmResult<&Rc<Instance>> {
    value.as_instance().ok_or(VmError::ExpectedInstance { got: value.kind_name() })
}

fn field(inst: &Instance, name: &str) -> VmResult<Value> {
    inst.get(name).ok_or_else(|| VmError::UndefinedField {
        name: name.to_string(),
        class: inst.class.name.clone(),
    })
}

fn invert(value: &mut Value) -> VmResult<()> {
    match value {
        Value::Boolean(b) => {
            *b = !*b;
            Ok(())
        }
        other => Err(ValueError::ExpectedBoolean { got: other.kind_name() }.into()),
    }
}

// ── VM ───────────────────────────────────────────────────────────────

pub struct Vm {
    frames: Vec<CallFrame>,
    globals: HashMap<u8, Value>,
    output: Vec<String>,
    echo: bool,
    max_frames: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            frames: Vec::new(),
            globals: HashMap::new(),
            output: Vec::new(),
            echo: false,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    /// Also write printed values to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Every value printed so far, as text.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Runs a compiled script to completion.
    pub fn run(&mut self, script: Rc<Function>) -> Result<(), RuntimeError> {
        debug!(function = %script.name, "vm start");
        self.frames.clear();
        self.frames.push(CallFrame::new(script, HashMap::new(), true));
        let result = self.execute();
        let result = result.map_err(|kind| self.locate(kind));
        self.frames.clear();
        result
    }

    fn locate(&self, kind: VmError) -> RuntimeError {
        let Some(frame) = self.frames.last() else {
            return RuntimeError { line: 0, function: String::new(), kind, disassembly: String::new() };
        };
        let chunk = &frame.function.chunk;
        let mut disassembly = chunk.disassemble(&frame.function.name);
        if frame.op_offset < chunk.len() {
            disassembly.push_str(">> ");
            disassembly.push_str(&chunk.disassemble_instruction(frame.op_offset));
        }
        RuntimeError {
            line: chunk.line_at(frame.op_offset).unwrap_or(0),
            function: frame.function.name.clone(),
            kind,
            disassembly,
        }
    }

    // ── Frame access ─────────────────────────────────────────────────

    fn frame(&mut self) -> VmResult<&mut CallFrame> {
        self.frames.last_mut().ok_or(VmError::NoFrame)
    }

    fn read_byte(&mut self) -> VmResult<u8> {
        let frame = self.frame()?;
        let byte = frame.function.chunk.code.get(frame.ip).copied().ok_or(VmError::EndOfCode)?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> VmResult<u16> {
        let frame = self.frame()?;
        let short = frame.function.chunk.read_short(frame.ip).ok_or(VmError::EndOfCode)?;
        frame.ip += 2;
        Ok(short)
    }

    fn constant(&mut self, index: u8) -> VmResult<Value> {
        let frame = self.frame()?;
        frame.function.chunk.constants.get(index as usize).cloned().ok_or(VmError::BadConstant { index })
    }

    /// A field name from the constant pool.
    fn name(&mut self, index: u8) -> VmResult<Rc<str>> {
        match self.constant(index)? {
            Value::Object(Object::String(name)) => Ok(name),
            _ => Err(VmError::BadConstant { index }),
        }
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        self.frame()?.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.frame()?.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn register(&mut self, slot: u8) -> VmResult<Value> {
        self.frame()?.registers.get(&slot).cloned().ok_or(VmError::UnassignedRegister { slot })
    }

    fn set_register(&mut self, slot: u8, value: Value) -> VmResult<()> {
        self.frame()?.registers.insert(slot, value);
        Ok(())
    }

    fn global(&self, slot: u8) -> VmResult<Value> {
        self.globals.get(&slot).cloned().ok_or(VmError::UndefinedGlobal { slot })
    }

    fn jump(&mut self, offset: u16) -> VmResult<()> {
        let frame = self.frame()?;
        frame.ip = frame.ip.checked_add_signed(offset as i16 as isize).ok_or(VmError::BadJump)?;
        Ok(())
    }

    fn print(&mut self, value: Value) {
        let text = value.to_string();
        if self.echo {
            println!("{}", text);
        }
        self.output.push(text);
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    fn execute(&mut self) -> VmResult<()> {
        loop {
            let frame = self.frame()?;
            frame.op_offset = frame.ip;
            let byte = self.read_byte()?;
            let op = Op::from_byte(byte).ok_or(VmError::UnknownOpcode { byte })?;
            trace!(op = op.name(), depth = self.frames.len(), "exec");

            match op {
                Op::Add => self.arith(Arith::Add)?,
                Op::Multiply => self.arith(Arith::Multiply)?,
                Op::Divide => self.arith(Arith::Divide)?,
                Op::Negate => {
                    let v = self.pop()?;
                    self.push(v.negate()?)?;
                }

                Op::AddIp => self.arith_in_place(Arith::Add)?,
                Op::MultiplyIp => self.arith_in_place(Arith::Multiply)?,
                Op::DivideIp => self.arith_in_place(Arith::Divide)?,
                Op::SubtractIp => self.arith_in_place(Arith::Subtract)?,
                Op::NegateIp => {
                    let slot = self.read_byte()?;
                    let v = self.register(slot)?.negate()?;
                    self.set_register(slot, v)?;
                }

                Op::AddFt => self.arith_ternary(Arith::Add)?,
                Op::MultiplyFt => self.arith_ternary(Arith::Multiply)?,
                Op::DivideFt => self.arith_ternary(Arith::Divide)?,
                Op::SubtractFt => self.arith_ternary(Arith::Subtract)?,

                Op::InvertBoolean => {
                    let top = self.frame()?.stack.last_mut().ok_or(VmError::StackUnderflow)?;
                    invert(top)?;
                }
                Op::InvertBooleanIp => {
                    let slot = self.read_byte()?;
                    let v = self
                        .frame()?
                        .registers
                        .get_mut(&slot)
                        .ok_or(VmError::UnassignedRegister { slot })?;
                    invert(v)?;
                }
                Op::InvertBooleanFt => {
                    let src = self.read_byte()?;
                    let dst = self.read_byte()?;
                    let v = self.register(src)?.not()?;
                    self.set_register(dst, v)?;
                }

                Op::IsGreater => self.compare(|o| o.is_gt())?,
                Op::IsGreaterEqual => self.compare(|o| o.is_ge())?,
                Op::IsLess => self.compare(|o| o.is_lt())?,
                Op::IsLessEqual => self.compare(|o| o.is_le())?,
                Op::IsEqual => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Boolean(a.equals(&b)))?;
                }

                Op::Load => {
                    let slot = self.read_byte()?;
                    let v = self.register(slot)?;
                    self.push(v)?;
                }
                Op::LoadIp => {
                    let dst = self.read_byte()?;
                    let src = self.read_byte()?;
                    let v = self.register(src)?;
                    self.set_register(dst, v)?;
                }
                Op::LoadGlobal => {
                    let slot = self.read_byte()?;
                    let v = self.global(slot)?;
                    self.push(v)?;
                }
                Op::LoadGlobalIp => {
                    let dst = self.read_byte()?;
                    let slot = self.read_byte()?;
                    let v = self.global(slot)?;
                    self.set_register(dst, v)?;
                }
                Op::Store => {
                    let slot = self.read_byte()?;
                    let v = self.pop()?;
                    self.set_register(slot, v)?;
                }
                Op::StoreGlobal => {
                    let slot = self.read_byte()?;
                    let v = self.pop()?;
                    self.globals.insert(slot, v);
                }
                Op::Ldc => {
                    let index = self.read_byte()?;
                    let v = self.constant(index)?;
                    self.push(v)?;
                }
                Op::LdcIp => {
                    let dst = self.read_byte()?;
                    let index = self.read_byte()?;
                    let v = self.constant(index)?;
                    self.set_register(dst, v)?;
                }

                Op::Pop => {
                    self.pop()?;
                }
                Op::PopIfPresent => {
                    self.frame()?.stack.pop();
                }
                Op::PrintPop => {
                    let v = self.pop()?;
                    self.print(v);
                }
                Op::Dup => {
                    let top = self.frame()?.stack.last().cloned().ok_or(VmError::StackUnderflow)?;
                    self.push(top)?;
                }

                Op::JumpIfTrue | Op::JumpIfFalse => {
                    let offset = self.read_short()?;
                    let cond = self.pop()?.as_bool()?;
                    if cond == (op == Op::JumpIfTrue) {
                        self.jump(offset)?;
                    }
                }
                Op::Jump => {
                    let offset = self.read_short()?;
                    self.jump(offset)?;
                }
                Op::Loop => {
                    let offset = self.read_short()?;
                    let frame = self.frame()?;
                    frame.ip = frame.ip.checked_sub(offset as usize).ok_or(VmError::BadJump)?;
                }

                Op::Get => {
                    let name = self.read_byte().and_then(|k| self.name(k))?;
                    let object = self.pop()?;
                    let v = field(instance(&object)?, &name)?;
                    self.push(v)?;
                }
                Op::GetIp => {
                    let name = self.read_byte().and_then(|k| self.name(k))?;
                    let dst = self.read_byte()?;
                    let object = self.pop()?;
                    let v = field(instance(&object)?, &name)?;
                    self.set_register(dst, v)?;
                }
                Op::Set => {
                    let name = self.read_byte().and_then(|k| self.name(k))?;
                    let value = self.pop()?;
                    let object = self.pop()?;
                    instance(&object)?.set(&name, value.clone());
                    self.push(value)?;
                }
                Op::SetLdc => {
                    let name = self.read_byte().and_then(|k| self.name(k))?;
                    let value = self.read_byte().and_then(|k| self.constant(k))?;
                    let object = self.pop()?;
                    instance(&object)?.set(&name, value);
                }

                Op::Call | Op::CallPop => {
                    let argc = self.read_byte()?;
                    self.call_value(argc, op == Op::CallPop)?;
                }
                Op::CallMethod | Op::CallMethodPop => {
                    let name = self.read_byte().and_then(|k| self.name(k))?;
                    let argc = self.read_byte()?;
                    self.call_method(&name, argc, op == Op::CallMethodPop)?;
                }

                Op::Return => {
                    if self.return_from_frame()? {
                        debug!(printed = self.output.len(), "vm halt");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn arith(&mut self, op: Arith) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(a.arith(op, &b)?)
    }

    /// R[A] = R[A] op pop()
    fn arith_in_place(&mut self, op: Arith) -> VmResult<()> {
        let slot = self.read_byte()?;
        let rhs = self.pop()?;
        let v = self.register(slot)?.arith(op, &rhs)?;
        self.set_register(slot, v)
    }

    /// R[C] = R[A] op R[B]
    fn arith_ternary(&mut self, op: Arith) -> VmResult<()> {
        let a = self.read_byte()?;
        let b = self.read_byte()?;
        let c = self.read_byte()?;
        let v = self.register(a)?.arith(op, &self.register(b)?)?;
        self.set_register(c, v)
    }

    /// NaN compares false against everything.
    fn compare(&mut self, test: fn(std::cmp::Ordering) -> bool) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = a.compare(&b)?.is_some_and(test);
        self.push(Value::Boolean(result))
    }

    // ── Calls ────────────────────────────────────────────────────────

    /// Pops `argc` arguments and the value beneath them.
    fn take_call(&mut self, argc: u8) -> VmResult<(Value, Vec<Value>)> {
        let frame = self.frame()?;
        let base = frame.stack.len().checked_sub(argc as usize + 1).ok_or(VmError::StackUnderflow)?;
        let args = frame.stack.split_off(base + 1);
        let callee = frame.stack.pop().ok_or(VmError::StackUnderflow)?;
        Ok((callee, args))
    }

    fn call_value(&mut self, argc: u8, discard: bool) -> VmResult<()> {
        let (callee, args) = self.take_call(argc)?;
        self.invoke(callee, None, args, discard)
    }

    /// The method is looked up in the receiver's field map, which was
    /// seeded with every class method at construction.
    fn call_method(&mut self, name: &str, argc: u8, discard: bool) -> VmResult<()> {
        let (receiver, args) = self.take_call(argc)?;
        let method = field(instance(&receiver)?, name)?;
        self.invoke(method, Some(receiver), args, discard)
    }

    fn invoke(&mut self, callee: Value, receiver: Option<Value>, args: Vec<Value>, discard: bool) -> VmResult<()> {
        match callee {
            Value::Object(Object::Function(function)) => self.enter(function, receiver, args, discard),
            Value::Object(Object::Class(class)) => {
                let init = class
                    .methods
                    .get(INIT)
                    .cloned()
                    .ok_or_else(|| VmError::MissingConstructor { class: class.name.clone() })?;
                let instance = Value::Object(Object::Instance(Rc::new(Instance::new(class))));
                if !discard {
                    self.push(instance.clone())?;
                }
                // the constructor's own result is never wanted
                self.enter(init, Some(instance), args, true)
            }
            other => Err(VmError::NotCallable { got: other.kind_name() }),
        }
    }

    fn enter(&mut self, function: Rc<Function>, receiver: Option<Value>, args: Vec<Value>, discard: bool) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(VmError::StackOverflow { limit: self.max_frames });
        }
        if args.len() != function.params.len() {
            return Err(VmError::Arity {
                function: function.name.clone(),
                expected: function.params.len(),
                got: args.len(),
            });
        }

        let mut registers = HashMap::new();
        let mut slot = 0u8;
        if function.is_method {
            let this = receiver.ok_or_else(|| VmError::UnboundMethod { name: function.name.clone() })?;
            registers.insert(0, this);
            slot = 1;
        }
        for (param, arg) in function.params.iter().zip(args) {
            if !accepts(param.ty, &arg) {
                return Err(VmError::ArgumentType {
                    function: function.name.clone(),
                    param: param.name.clone(),
                    expected: param.ty.name(),
                    got: arg.kind_name(),
                });
            }
            registers.insert(slot, arg);
            slot = slot.wrapping_add(1);
        }

        trace!(function = %function.name, depth = self.frames.len() + 1, "call");
        self.frames.push(CallFrame::new(function, registers, discard));
        Ok(())
    }

    /// Returns true once the outermost frame has returned.
    fn return_from_frame(&mut self) -> VmResult<bool> {
        let frame = self.frame()?;
        let value = match frame.function.return_type {
            Some(_) => Some(frame.stack.pop().ok_or(VmError::StackUnderflow)?),
            None => None,
        };
        if !frame.stack.is_empty() {
            return Err(VmError::UnbalancedStack {
                function: frame.function.name.clone(),
                depth: frame.stack.len(),
            });
        }
        let discard = frame.discard;
        if value.is_none() && !discard {
            return Err(VmError::NoReturnValue { function: frame.function.name.clone() });
        }
        self.frames.pop();

        if self.frames.is_empty() {
            return Ok(true);
        }
        if let (Some(value), false) = (value, discard) {
            self.push(value)?;
        }
        Ok(false)
    }
}
