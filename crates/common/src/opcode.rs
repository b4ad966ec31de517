//! Opcode definitions for the Lox instruction stream.
//!
//! An instruction is one opcode byte followed by zero or more operand bytes.
//! Operand layout per opcode is documented on each variant. 16-bit operands
//! are stored big-endian (high byte first).

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value, so
/// `op as u8` is the encoded form.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Constants and literals
    /// Push constant `[index: u8]` from the chunk's pool.
    Constant = 0x00,
    /// Push `nil`.
    Nil = 0x01,
    /// Push `true`.
    True = 0x02,
    /// Push `false`.
    False = 0x03,
    /// Discard the top of stack.
    Pop = 0x04,

    // Variables
    /// Push the local in frame slot `[slot: u8]`.
    GetLocal = 0x05,
    /// Store top of stack into frame slot `[slot: u8]` without popping.
    SetLocal = 0x06,
    /// Push the global named by constant `[index: u8]`.
    GetGlobal = 0x07,
    /// Pop a value and bind it to the global named by constant `[index: u8]`.
    DefineGlobal = 0x08,
    /// Assign an existing global named by constant `[index: u8]`.
    SetGlobal = 0x09,
    /// Push the value behind upvalue `[index: u8]` of the running closure.
    GetUpvalue = 0x0A,
    /// Store top of stack through upvalue `[index: u8]`.
    SetUpvalue = 0x0B,
    /// Replace the instance on top with its property named by `[index: u8]`.
    GetProperty = 0x0C,
    /// Pop value and instance, set the field, push the value back.
    SetProperty = 0x0D,
    /// Pop superclass, bind its method `[index: u8]` to the receiver below.
    GetSuper = 0x0E,

    // Comparison
    /// Pop two values, push whether they are equal.
    Equal = 0x0F,
    /// Pop two numbers, push `a > b`.
    Greater = 0x10,
    /// Pop two numbers, push `a < b`.
    Less = 0x11,

    // Arithmetic
    /// Pop two numbers (or two strings), push the sum (or concatenation).
    Add = 0x12,
    /// Pop two numbers, push `a - b`.
    Subtract = 0x13,
    /// Pop two numbers, push `a * b`.
    Multiply = 0x14,
    /// Pop two numbers, push `a / b`.
    Divide = 0x15,
    /// Pop a value, push its logical negation.
    Not = 0x16,
    /// Pop a number, push its arithmetic negation.
    Negate = 0x17,

    // Statements and control flow
    /// Pop a value and write it to the output sink.
    Print = 0x18,
    /// Jump forward by `[offset: u16]`.
    Jump = 0x19,
    /// Jump forward by `[offset: u16]` if the top of stack is falsey.
    JumpIfFalse = 0x1A,
    /// Jump backward by `[offset: u16]`.
    Loop = 0x1B,

    // Calls and closures
    /// Call the value below `[arg_count: u8]` arguments.
    Call = 0x1C,
    /// Call method `[index: u8]` on the receiver with `[arg_count: u8]` arguments.
    Invoke = 0x1D,
    /// Call superclass method `[index: u8]` with `[arg_count: u8]` arguments.
    SuperInvoke = 0x1E,
    /// Wrap function constant `[index: u8]` in a closure, followed by
    /// `upvalue_count` pairs of `[is_local: u8] [index: u8]`.
    Closure = 0x1F,
    /// Close the upvalue for the top stack slot, then pop it.
    CloseUpvalue = 0x20,
    /// Return the top of stack from the running function.
    Return = 0x21,

    // Classes
    /// Push a new class named by constant `[index: u8]`.
    Class = 0x22,
    /// Copy the superclass methods into the subclass on top of stack.
    Inherit = 0x23,
    /// Pop a closure and attach it to the class below as method `[index: u8]`.
    Method = 0x24,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [OpCode; 37] = [
    OpCode::Constant,
    OpCode::Nil,
    OpCode::True,
    OpCode::False,
    OpCode::Pop,
    OpCode::GetLocal,
    OpCode::SetLocal,
    OpCode::GetGlobal,
    OpCode::DefineGlobal,
    OpCode::SetGlobal,
    OpCode::GetUpvalue,
    OpCode::SetUpvalue,
    OpCode::GetProperty,
    OpCode::SetProperty,
    OpCode::GetSuper,
    OpCode::Equal,
    OpCode::Greater,
    OpCode::Less,
    OpCode::Add,
    OpCode::Subtract,
    OpCode::Multiply,
    OpCode::Divide,
    OpCode::Not,
    OpCode::Negate,
    OpCode::Print,
    OpCode::Jump,
    OpCode::JumpIfFalse,
    OpCode::Loop,
    OpCode::Call,
    OpCode::Invoke,
    OpCode::SuperInvoke,
    OpCode::Closure,
    OpCode::CloseUpvalue,
    OpCode::Return,
    OpCode::Class,
    OpCode::Inherit,
    OpCode::Method,
];

impl TryFrom<u8> for OpCode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .get(value as usize)
            .copied()
            .ok_or(DecodeError::UnknownOpcode(value))
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl OpCode {
    /// Returns the mnemonic printed by the disassembler.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::GetSuper => "OP_GET_SUPER",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_opcodes_count() {
        assert_eq!(ALL_OPCODES.len(), 37);
    }

    #[test]
    fn byte_values_match_table_position() {
        for (i, &opcode) in ALL_OPCODES.iter().enumerate() {
            assert_eq!(opcode as usize, i, "{opcode:?} out of order");
        }
    }

    #[test]
    fn roundtrip_all_valid_opcodes() {
        for &opcode in &ALL_OPCODES {
            let byte = u8::from(opcode);
            let decoded = OpCode::try_from(byte).unwrap();
            assert_eq!(
                opcode, decoded,
                "roundtrip failed for {opcode:?} ({byte:#04x})"
            );
        }
    }

    #[test]
    fn bytes_past_the_table_are_unknown() {
        for byte in 0x25..=0xFFu8 {
            assert_eq!(
                OpCode::try_from(byte),
                Err(DecodeError::UnknownOpcode(byte)),
                "byte {byte:#04x} should be unknown"
            );
        }
    }

    #[test]
    fn mnemonics_are_prefixed_and_uppercase() {
        for &opcode in &ALL_OPCODES {
            let m = opcode.mnemonic();
            assert!(m.starts_with("OP_"), "bad mnemonic for {opcode:?}");
            assert_eq!(m, m.to_uppercase(), "mnemonic should be uppercase: {m}");
        }
    }
}
