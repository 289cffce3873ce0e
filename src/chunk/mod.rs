use std::fmt::Write as _;

use crate::value::{Object, Value};

// ── Opcodes ──────────────────────────────────────────────────────────
//
// One byte per opcode, followed by zero to three one-byte operands.
// Jump operands are a single big-endian 16-bit offset.
//
// Suffixes:
//   _IP  in-place: the result is written straight into a register
//   _FT  from-to:  reads registers A and B, writes register C
//
// Operand order of the two-operand forms:
//   LDC_IP dst k          LOAD_IP dst src        LOAD_GLOBAL_IP dst global
//   INVERT_BOOLEAN_FT src dst                    GET_IP name dst
//   SET_LDC name k        CALL_METHOD name argc

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    // stack arithmetic
    Add,
    Multiply,
    Divide,
    Negate,
    // register arithmetic: pop the operand, combine into R[A]
    AddIp,
    MultiplyIp,
    DivideIp,
    SubtractIp,
    NegateIp,
    // R[C] = R[A] op R[B]
    AddFt,
    MultiplyFt,
    DivideFt,
    SubtractFt,
    InvertBoolean,
    InvertBooleanIp,
    InvertBooleanFt,
    IsGreater,
    IsGreaterEqual,
    IsLess,
    IsLessEqual,
    IsEqual,
    Load,
    LoadIp,
    LoadGlobal,
    LoadGlobalIp,
    Store,
    StoreGlobal,
    Ldc,
    LdcIp,
    Pop,
    PopIfPresent,
    PrintPop,
    Dup,
    JumpIfTrue,
    JumpIfFalse,
    Jump,
    Loop,
    Get,
    GetIp,
    Set,
    SetLdc,
    Call,
    CallPop,
    CallMethod,
    CallMethodPop,
    Return,
}

impl Op {
    /// Every opcode, indexed by its byte.
    pub const ALL: [Op; 46] = [
        Op::Add,
        Op::Multiply,
        Op::Divide,
        Op::Negate,
        Op::AddIp,
        Op::MultiplyIp,
        Op::DivideIp,
        Op::SubtractIp,
        Op::NegateIp,
        Op::AddFt,
        Op::MultiplyFt,
        Op::DivideFt,
        Op::SubtractFt,
        Op::InvertBoolean,
        Op::InvertBooleanIp,
        Op::InvertBooleanFt,
        Op::IsGreater,
        Op::IsGreaterEqual,
        Op::IsLess,
        Op::IsLessEqual,
        Op::IsEqual,
        Op::Load,
        Op::LoadIp,
        Op::LoadGlobal,
        Op::LoadGlobalIp,
        Op::Store,
        Op::StoreGlobal,
        Op::Ldc,
        Op::LdcIp,
        Op::Pop,
        Op::PopIfPresent,
        Op::PrintPop,
        Op::Dup,
        Op::JumpIfTrue,
        Op::JumpIfFalse,
        Op::Jump,
        Op::Loop,
        Op::Get,
        Op::GetIp,
        Op::Set,
        Op::SetLdc,
        Op::Call,
        Op::CallPop,
        Op::CallMethod,
        Op::CallMethodPop,
        Op::Return,
    ];

    pub fn from_byte(byte: u8) -> Option<Op> {
        Op::ALL.get(byte as usize).copied()
    }

    /// Number of operand bytes that follow the opcode.
    pub fn operand_len(self) -> usize {
        match self {
            Op::Add
            | Op::Multiply
            | Op::Divide
            | Op::Negate
            | Op::InvertBoolean
            | Op::IsGreater
            | Op::IsGreaterEqual
            | Op::IsLess
            | Op::IsLessEqual
            | Op::IsEqual
            | Op::Pop
            | Op::PopIfPresent
            | Op::PrintPop
            | Op::Dup
            | Op::Return => 0,
            Op::AddIp
            | Op::MultiplyIp
            | Op::DivideIp
            | Op::SubtractIp
            | Op::NegateIp
            | Op::InvertBooleanIp
            | Op::Load
            | Op::LoadGlobal
            | Op::Store
            | Op::StoreGlobal
            | Op::Ldc
            | Op::Get
            | Op::Set
            | Op::Call
            | Op::CallPop => 1,
            Op::LoadIp
            | Op::LoadGlobalIp
            | Op::LdcIp
            | Op::InvertBooleanFt
            | Op::GetIp
            | Op::SetLdc
            | Op::CallMethod
            | Op::CallMethodPop
            | Op::JumpIfTrue
            | Op::JumpIfFalse
            | Op::Jump
            | Op::Loop => 2,
            Op::AddFt | Op::MultiplyFt | Op::DivideFt | Op::SubtractFt => 3,
        }
    }

    pub fn is_jump(self) -> bool {
        matches!(self, Op::JumpIfTrue | Op::JumpIfFalse | Op::Jump | Op::Loop)
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Add => "ADD",
            Op::Multiply => "MULTIPLY",
            Op::Divide => "DIVIDE",
            Op::Negate => "NEGATE",
            Op::AddIp => "ADD_IP",
            Op::MultiplyIp => "MULTIPLY_IP",
            Op::DivideIp => "DIVIDE_IP",
            Op::SubtractIp => "SUBTRACT_IP",
            Op::NegateIp => "NEGATE_IP",
            Op::AddFt => "ADD_FT",
            Op::MultiplyFt => "MULTIPLY_FT",
            Op::DivideFt => "DIVIDE_FT",
            Op::SubtractFt => "SUBTRACT_FT",
            Op::InvertBoolean => "INVERT_BOOLEAN",
            Op::InvertBooleanIp => "INVERT_BOOLEAN_IP",
            Op::InvertBooleanFt => "INVERT_BOOLEAN_FT",
            Op::IsGreater => "IS_GREATER",
            Op::IsGreaterEqual => "IS_GREATER_EQUAL",
            Op::IsLess => "IS_LESS",
            Op::IsLessEqual => "IS_LESS_EQUAL",
            Op::IsEqual => "IS_EQUAL",
            Op::Load => "LOAD",
            Op::LoadIp => "LOAD_IP",
            Op::LoadGlobal => "LOAD_GLOBAL",
            Op::LoadGlobalIp => "LOAD_GLOBAL_IP",
            Op::Store => "STORE",
            Op::StoreGlobal => "STORE_GLOBAL",
            Op::Ldc => "LDC",
            Op::LdcIp => "LDC_IP",
            Op::Pop => "POP",
            Op::PopIfPresent => "POP_IF_PRESENT",
            Op::PrintPop => "PRINT_POP",
            Op::Dup => "DUP",
            Op::JumpIfTrue => "JUMP_IF_TRUE",
            Op::JumpIfFalse => "JUMP_IF_FALSE",
            Op::Jump => "JUMP",
            Op::Loop => "LOOP",
            Op::Get => "GET",
            Op::GetIp => "GET_IP",
            Op::Set => "SET",
            Op::SetLdc => "SET_LDC",
            Op::Call => "CALL",
            Op::CallPop => "CALL_POP",
            Op::CallMethod => "CALL_METHOD",
            Op::CallMethodPop => "CALL_METHOD_POP",
            Op::Return => "RETURN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChunkError {
    #[error("too many constants in one chunk (limit 256)")]
    TooManyConstants,
    #[error("too much code to jump over")]
    JumpTooLarge,
    #[error("loop body too large")]
    LoopTooLarge,
    #[error("too many arguments in one call (limit 255)")]
    TooManyArguments,
}

// ── Decoded instructions ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub op: Op,
    pub operands: Vec<u8>,
}

impl Instruction {
    /// Encoded size in bytes, opcode included.
    pub fn width(&self) -> usize {
        1 + self.operands.len()
    }

    pub fn operand(&self, i: usize) -> u8 {
        self.operands.get(i).copied().unwrap_or(0)
    }

    fn jump_operand(&self) -> u16 {
        u16::from_be_bytes([self.operand(0), self.operand(1)])
    }

    /// Absolute offset a jump or loop lands on.
    pub fn target(&self) -> Option<usize> {
        let after = self.offset + self.width();
        match self.op {
            Op::JumpIfTrue | Op::JumpIfFalse | Op::Jump => {
                let delta = self.jump_operand() as i16 as isize;
                after.checked_add_signed(delta)
            }
            Op::Loop => after.checked_sub(self.jump_operand() as usize),
            _ => None,
        }
    }
}

// ── Chunk ────────────────────────────────────────────────────────────

/// Bytecode for one function: code bytes, a constant pool addressed by a
/// one-byte index, and a run-length encoded line table.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Value>,
    // (run length, source line)
    lines: Vec<(usize, u32)>,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        match self.lines.last_mut() {
            Some((run, last)) if *last == line => *run += 1,
            _ => self.lines.push((1, line)),
        }
    }

    /// Appends an opcode and its operands; returns the opcode's offset.
    pub fn emit(&mut self, op: Op, operands: &[u8], line: u32) -> usize {
        debug_assert_eq!(op.operand_len(), operands.len(), "{} operand count", op.name());
        let at = self.code.len();
        self.write(op as u8, line);
        for &b in operands {
            self.write(b, line);
        }
        at
    }

    /// Adds a constant, reusing an identical earlier entry.
    pub fn add_constant(&mut self, value: Value) -> Result<u8, ChunkError> {
        if let Some(i) = self.constants.iter().position(|c| c.same_constant(&value)) {
            return Ok(i as u8);
        }
        if self.constants.len() >= 256 {
            return Err(ChunkError::TooManyConstants);
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u8)
    }

    /// Emits a forward jump with a placeholder offset. Returns the offset of
    /// the placeholder, to be handed to [`Chunk::patch_jump`].
    pub fn emit_jump(&mut self, op: Op, line: u32) -> usize {
        self.emit(op, &[0xff, 0xff], line);
        self.code.len() - 2
    }

    /// Points the jump whose placeholder sits at `at` to the current end of
    /// the code.
    pub fn patch_jump(&mut self, at: usize) -> Result<(), ChunkError> {
        let jump = self.code.len() - at - 2;
        if jump > i16::MAX as usize {
            return Err(ChunkError::JumpTooLarge);
        }
        let [hi, lo] = (jump as u16).to_be_bytes();
        self.code[at] = hi;
        self.code[at + 1] = lo;
        Ok(())
    }

    /// Emits a backward jump to `loop_start`.
    pub fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), ChunkError> {
        self.write(Op::Loop as u8, line);
        let offset = self.code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            return Err(ChunkError::LoopTooLarge);
        }
        let [hi, lo] = (offset as u16).to_be_bytes();
        self.write(hi, line);
        self.write(lo, line);
        Ok(())
    }

    pub fn read_short(&self, at: usize) -> Option<u16> {
        Some(u16::from_be_bytes([*self.code.get(at)?, *self.code.get(at + 1)?]))
    }

    /// Source line of the byte at `offset`.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        let mut end = 0;
        for &(run, line) in &self.lines {
            end += run;
            if offset < end {
                return Some(line);
            }
        }
        None
    }

    pub fn decode_at(&self, offset: usize) -> Option<Instruction> {
        let op = Op::from_byte(*self.code.get(offset)?)?;
        let start = offset + 1;
        let operands = self.code.get(start..start + op.operand_len())?.to_vec();
        Some(Instruction { offset, op, operands })
    }

    /// Decodes the whole chunk. Stops at the first byte that is not a
    /// well-formed instruction.
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut out = Vec::new();
        let mut offset = 0;
        while let Some(inst) = self.decode_at(offset) {
            offset += inst.width();
            out.push(inst);
        }
        out
    }

    pub fn ops(&self) -> Vec<Op> {
        self.instructions().into_iter().map(|i| i.op).collect()
    }

    // ── Disassembler ─────────────────────────────────────────────────

    pub fn disassemble(&self, name: &str) -> String {
        let mut out = format!("== {} ==\n", name);
        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_at(&mut out, offset);
        }
        for c in &self.constants {
            if let Value::Object(Object::Function(f)) = c {
                out.push('\n');
                out.push_str(&f.chunk.disassemble(&f.name));
            } else if let Value::Object(Object::Class(class)) = c {
                let mut names: Vec<_> = class.methods.keys().collect();
                names.sort();
                for m in names {
                    let f = &class.methods[m];
                    out.push('\n');
                    out.push_str(&f.chunk.disassemble(&format!("{}.{}", class.name, f.name)));
                }
            }
        }
        out
    }

    /// Disassembles the single instruction at `offset`. Used for runtime
    /// error reports.
    pub fn disassemble_instruction(&self, offset: usize) -> String {
        let mut out = String::new();
        self.disassemble_at(&mut out, offset);
        out.trim_end().to_string()
    }

    fn disassemble_at(&self, out: &mut String, offset: usize) -> usize {
        let _ = write!(out, "{:04} ", offset);
        let line = self.line_at(offset);
        if offset > 0 && line == self.line_at(offset - 1) {
            out.push_str("   | ");
        } else {
            let _ = write!(out, "{:4} ", line.unwrap_or(0));
        }

        let Some(inst) = self.decode_at(offset) else {
            let _ = writeln!(out, "??? {:#04x}", self.code[offset]);
            return offset + 1;
        };
        let name = inst.op.name();
        let a = inst.operand(0);
        let b = inst.operand(1);
        let _ = match inst.op {
            Op::Ldc | Op::Get | Op::Set => {
                writeln!(out, "{:<18} {:3} '{}'", name, a, self.constant_text(a))
            }
            Op::LdcIp => writeln!(out, "{:<18} {:3} {:3} '{}'", name, a, b, self.constant_text(b)),
            Op::GetIp | Op::CallMethod | Op::CallMethodPop => {
                writeln!(out, "{:<18} {:3} {:3} '{}'", name, a, b, self.constant_text(a))
            }
            Op::SetLdc => writeln!(
                out,
                "{:<18} {:3} {:3} '{}' = {}",
                name,
                a,
                b,
                self.constant_text(a),
                self.constant_text(b)
            ),
            op if op.is_jump() => {
                let target = inst.target().unwrap_or(0);
                writeln!(out, "{:<18} {:04} -> {:04}", name, offset, target)
            }
            _ => {
                let operands: Vec<String> = inst.operands.iter().map(|o| format!("{:3}", o)).collect();
                writeln!(out, "{:<18} {}", name, operands.join(" "))
            }
        };
        offset + inst.width()
    }

    fn constant_text(&self, idx: u8) -> String {
        self.constants
            .get(idx as usize)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "<bad constant>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table_matches_discriminants() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i, "{}", op.name());
            assert_eq!(Op::from_byte(i as u8), Some(*op));
        }
        assert_eq!(Op::from_byte(Op::ALL.len() as u8), None);
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::Int(42)).unwrap();
        let b = chunk.add_constant(Value::string("hi")).unwrap();
        let c = chunk.add_constant(Value::Int(42)).unwrap();
        let d = chunk.add_constant(Value::Long(42)).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_ne!(a, d);
        assert_eq!(chunk.constants.len(), 3);
    }

    #[test]
    fn constant_pool_overflow() {
        let mut chunk = Chunk::new();
        for i in 0..256 {
            chunk.add_constant(Value::Int(i)).unwrap();
        }
        assert_eq!(chunk.add_constant(Value::Int(1000)), Err(ChunkError::TooManyConstants));
        // existing entries still resolve
        assert_eq!(chunk.add_constant(Value::Int(7)), Ok(7));
    }

    #[test]
    fn line_table_is_run_length_encoded() {
        let mut chunk = Chunk::new();
        chunk.emit(Op::Ldc, &[0], 1);
        chunk.emit(Op::PrintPop, &[], 1);
        chunk.emit(Op::Return, &[], 3);
        assert_eq!(chunk.lines, vec![(3, 1), (1, 3)]);
        assert_eq!(chunk.line_at(0), Some(1));
        assert_eq!(chunk.line_at(2), Some(1));
        assert_eq!(chunk.line_at(3), Some(3));
        assert_eq!(chunk.line_at(4), None);
    }

    #[test]
    fn patched_jump_lands_after_skipped_code() {
        let mut chunk = Chunk::new();
        chunk.emit(Op::Ldc, &[0], 1);
        let at = chunk.emit_jump(Op::JumpIfFalse, 1);
        chunk.emit(Op::Ldc, &[0], 1);
        chunk.emit(Op::PrintPop, &[], 1);
        chunk.patch_jump(at).unwrap();
        let end = chunk.emit(Op::Return, &[], 1);

        let jump = chunk.decode_at(2).unwrap();
        assert_eq!(jump.op, Op::JumpIfFalse);
        assert_eq!(jump.target(), Some(end));
    }

    #[test]
    fn loop_lands_on_loop_start() {
        let mut chunk = Chunk::new();
        chunk.emit(Op::Ldc, &[0], 1);
        let start = chunk.len();
        chunk.emit(Op::Load, &[0], 2);
        chunk.emit(Op::PrintPop, &[], 2);
        let at = chunk.len();
        chunk.emit_loop(start, 2).unwrap();
        let inst = chunk.decode_at(at).unwrap();
        assert_eq!(inst.op, Op::Loop);
        assert_eq!(inst.target(), Some(start));
    }

    #[test]
    fn oversized_jump_is_rejected() {
        let mut chunk = Chunk::new();
        let at = chunk.emit_jump(Op::Jump, 1);
        for _ in 0..40_000 {
            chunk.write(Op::Pop as u8, 1);
        }
        assert_eq!(chunk.patch_jump(at), Err(ChunkError::JumpTooLarge));
    }

    #[test]
    fn instructions_decode_operands() {
        let mut chunk = Chunk::new();
        chunk.emit(Op::AddFt, &[0, 1, 2], 1);
        chunk.emit(Op::LdcIp, &[3, 0], 1);
        chunk.emit(Op::Return, &[], 1);
        let insts = chunk.instructions();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[0].operands, vec![0, 1, 2]);
        assert_eq!(insts[1].offset, 4);
        assert_eq!(chunk.ops(), vec![Op::AddFt, Op::LdcIp, Op::Return]);
    }

    #[test]
    fn disassembly_names_ops_and_constants() {
        let mut chunk = Chunk::new();
        let k = chunk.add_constant(Value::Int(7)).unwrap();
        chunk.emit(Op::Ldc, &[k], 1);
        chunk.emit(Op::PrintPop, &[], 1);
        chunk.emit(Op::Return, &[], 2);
        let text = chunk.disassemble("script");
        assert!(text.starts_with("== script =="));
        assert!(text.contains("LDC"));
        assert!(text.contains("'7'"));
        assert!(text.contains("PRINT_POP"));
        assert!(text.contains("RETURN"));
    }

    #[test]
    fn unknown_byte_disassembles_without_panicking() {
        let mut chunk = Chunk::new();
        chunk.write(0xee, 1);
        assert!(chunk.disassemble("bad").contains("???"));
        assert!(chunk.instructions().is_empty());
    }
}
