/// bytecode.rs
///
/// The instruction set. An instruction is a single opcode byte followed by
/// zero, one or two operands. Operands are unsigned 16 bit little endian
/// integers, independent of the byte order an image declares for its tables.

use std::fmt;

use crate::runtime::error::ExecError;

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal, $arity:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $value,)*
        }

        impl OpCode {
            pub fn from_u8(byte: u8) -> Option<OpCode> {
                match byte {
                    $($value => Some(OpCode::$name),)*
                    _ => None,
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(OpCode::$name => $mnemonic,)*
                }
            }

            /// Number of u16 operands following the opcode byte
            pub fn arity(&self) -> usize {
                match self {
                    $(OpCode::$name => $arity,)*
                }
            }
        }
    }
}

opcodes! {
    Nop = 0, "nop", 0;
    PushUndefined = 1, "push_undefined", 0;
    PushNaN = 2, "push_nan", 0;
    PushTrue = 3, "push_true", 0;
    PushFalse = 4, "push_false", 0;
    PushZero = 5, "push_zero", 0;
    PushInt = 6, "push_int", 1;
    PushNumber = 7, "push_number", 1;
    PushString = 8, "push_string", 1;
    PushFunction = 9, "push_function", 1;
    MakeClosure = 10, "make_closure", 2;
    MakeArray = 11, "make_array", 1;
    MakeObject = 12, "make_object", 1;
    Pop = 13, "pop", 0;
    Dup = 14, "dup", 0;
    Dup2 = 15, "dup2", 0;
    LoadLocal = 16, "load_local", 1;
    StoreLocal = 17, "store_local", 1;
    LoadCell = 18, "load_cell", 1;
    StoreCell = 19, "store_cell", 1;
    MakeCell = 20, "make_cell", 1;
    PushCell = 21, "push_cell", 1;
    LoadUpvalue = 22, "load_upvalue", 1;
    StoreUpvalue = 23, "store_upvalue", 1;
    PushUpvalue = 24, "push_upvalue", 1;
    LoadGlobal = 25, "load_global", 1;
    StoreGlobal = 26, "store_global", 1;
    DefineGlobal = 27, "define_global", 1;
    DeclareGlobal = 28, "declare_global", 1;
    GetElem = 29, "get_elem", 0;
    SetElem = 30, "set_elem", 0;
    Neg = 31, "neg", 0;
    Not = 32, "not", 0;
    BitNot = 33, "bit_not", 0;
    Add = 34, "add", 0;
    Sub = 35, "sub", 0;
    Mul = 36, "mul", 0;
    Div = 37, "div", 0;
    Mod = 38, "mod", 0;
    BitAnd = 39, "bit_and", 0;
    BitOr = 40, "bit_or", 0;
    BitXor = 41, "bit_xor", 0;
    Shl = 42, "shl", 0;
    Shr = 43, "shr", 0;
    Eq = 44, "eq", 0;
    Ne = 45, "ne", 0;
    Lt = 46, "lt", 0;
    Le = 47, "le", 0;
    Gt = 48, "gt", 0;
    Ge = 49, "ge", 0;
    Jump = 50, "jump", 1;
    JumpIfFalse = 51, "jump_if_false", 1;
    JumpIfTrue = 52, "jump_if_true", 1;
    JumpIfFalseOrPop = 53, "jump_if_false_or_pop", 1;
    JumpIfTrueOrPop = 54, "jump_if_true_or_pop", 1;
    Call = 55, "call", 1;
    Return = 56, "return", 0;
    ReturnUndefined = 57, "return_undefined", 0;
}

impl OpCode {
    /// Encoded size in bytes, opcode included
    #[inline]
    pub fn size(&self) -> usize {
        1 + 2 * self.arity()
    }

    pub fn is_jump(&self) -> bool {
        use OpCode::*;
        matches!(self, Jump | JumpIfFalse | JumpIfTrue | JumpIfFalseOrPop | JumpIfTrueOrPop)
    }

    /// Net change of the evaluation stack when the instruction falls through
    /// to the next one. The conditional jumps that leave their operand in
    /// place when taken are counted by their fallthrough behaviour.
    pub fn stack_effect(&self, a: u16, b: u16) -> i32 {
        use OpCode::*;
        let a = a as i32;
        let b = b as i32;
        match self {
            Nop | Jump | MakeCell | Neg | Not | BitNot => 0,
            PushUndefined | PushNaN | PushTrue | PushFalse | PushZero | PushInt |
            PushNumber | PushString | PushFunction | Dup | LoadLocal | LoadCell |
            PushCell | LoadUpvalue | PushUpvalue | LoadGlobal => 1,
            StoreLocal | StoreCell | StoreUpvalue | StoreGlobal => 0,
            Dup2 => 2,
            MakeClosure => 1 - b,
            MakeArray => 1 - a,
            MakeObject => 1 - 2 * a,
            Pop | DefineGlobal | JumpIfFalse | JumpIfTrue |
            JumpIfFalseOrPop | JumpIfTrueOrPop => -1,
            DeclareGlobal => 0,
            GetElem => -1,
            SetElem => -2,
            Add | Sub | Mul | Div | Mod | BitAnd | BitOr | BitXor | Shl | Shr |
            Eq | Ne | Lt | Le | Gt | Ge => -1,
            Call => -a,
            Return => -1,
            ReturnUndefined => 0,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// A decoded instruction. Unused operands are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub a: u16,
    pub b: u16,
}

impl Instruction {
    pub fn new(op: OpCode, a: u16, b: u16) -> Self {
        Self{ op, a, b }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.op.size()
    }

    pub(crate) fn encode(&self, target: &mut Vec<u8>) {
        target.push(self.op as u8);
        let arity = self.op.arity();
        if arity >= 1 {
            target.extend_from_slice(&self.a.to_le_bytes());
        }
        if arity >= 2 {
            target.extend_from_slice(&self.b.to_le_bytes());
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op.arity() {
            0 => write!(f, "{}", self.op),
            1 => write!(f, "{} {}", self.op, self.a),
            _ => write!(f, "{} {} {}", self.op, self.a, self.b),
        }
    }
}

#[inline]
fn read_operand(code: &[u8], at: usize) -> Result<u16, ExecError> {
    match code.get(at..at + 2) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(ExecError::InvalidOperand),
    }
}

/// Decodes the instruction starting at `pc`.
pub fn decode(code: &[u8], pc: usize) -> Result<Instruction, ExecError> {
    let byte = *code.get(pc).ok_or(ExecError::InvalidOperand)?;
    let op = OpCode::from_u8(byte).ok_or(ExecError::InvalidOpcode(byte))?;
    let a = if op.arity() >= 1 { read_operand(code, pc + 1)? } else { 0 };
    let b = if op.arity() >= 2 { read_operand(code, pc + 3)? } else { 0 };
    Ok(Instruction{ op, a, b })
}

/// Decodes an entire code blob into (offset, instruction) pairs.
pub fn disassemble(code: &[u8]) -> Result<Vec<(usize, Instruction)>, ExecError> {
    let mut result = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let instruction = decode(code, pc)?;
        result.push((pc, instruction));
        pc += instruction.size();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_mapping() {
        for byte in 0..=u8::MAX {
            if let Some(op) = OpCode::from_u8(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(OpCode::from_u8(58), None);
        assert_eq!(OpCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_decode_operands_are_little_endian() {
        let code = [OpCode::MakeClosure as u8, 0x02, 0x01, 0x03, 0x00, OpCode::Return as u8];
        let inst = decode(&code, 0).unwrap();
        assert_eq!(inst, Instruction::new(OpCode::MakeClosure, 0x0102, 3));
        assert_eq!(inst.size(), 5);
        assert_eq!(inst.to_string(), "make_closure 258 3");

        let inst = decode(&code, 5).unwrap();
        assert_eq!(inst.to_string(), "return");
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(decode(&[0xEE], 0), Err(ExecError::InvalidOpcode(0xEE)));
        assert_eq!(decode(&[OpCode::PushInt as u8, 0x01], 0), Err(ExecError::InvalidOperand));
        assert_eq!(decode(&[], 0), Err(ExecError::InvalidOperand));
    }

    #[test]
    fn test_encode_then_disassemble() {
        let mut code = Vec::new();
        Instruction::new(OpCode::PushInt, 7, 0).encode(&mut code);
        Instruction::new(OpCode::JumpIfFalse, 9, 0).encode(&mut code);
        Instruction::new(OpCode::Pop, 0, 0).encode(&mut code);
        Instruction::new(OpCode::ReturnUndefined, 0, 0).encode(&mut code);

        let listing = disassemble(&code).unwrap();
        let offsets: Vec<usize> = listing.iter().map(|(pc, _)| *pc).collect();
        assert_eq!(offsets, vec![0, 3, 6, 7]);
        assert_eq!(listing[1].1.to_string(), "jump_if_false 9");
    }

    #[test]
    fn test_stack_effects() {
        assert_eq!(OpCode::Call.stack_effect(3, 0), -3);
        assert_eq!(OpCode::MakeObject.stack_effect(2, 0), -3);
        assert_eq!(OpCode::MakeArray.stack_effect(0, 0), 1);
        assert_eq!(OpCode::MakeClosure.stack_effect(4, 2), -1);
        assert_eq!(OpCode::SetElem.stack_effect(0, 0), -2);
        assert_eq!(OpCode::Return.stack_effect(0, 0), -1);
        assert_eq!(OpCode::ReturnUndefined.stack_effect(0, 0), 0);
    }
}
