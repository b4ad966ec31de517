//! Chunk: one function's compiled bytecode.
//!
//! A chunk holds the instruction bytes, a parallel line table with one
//! source line per byte, and an append-only constant pool.

use crate::error::DecodeError;
use crate::opcode::OpCode;
use crate::value::Value;

/// Compiled bytecode for a single function.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// Instruction stream.
    pub code: Vec<u8>,
    /// Source line of each byte in `code`. Always the same length as `code`.
    pub lines: Vec<u32>,
    /// Constant pool referenced by index from the instruction stream.
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte attributed to `line`.
    pub fn write(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Append an opcode attributed to `line`.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write(op as u8, line);
    }

    /// Append a value to the constant pool and return its index.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Number of bytes of code.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if no code has been written.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Read the byte at `offset`.
    pub fn read_u8(&self, offset: usize) -> Result<u8, DecodeError> {
        self.code
            .get(offset)
            .copied()
            .ok_or(DecodeError::Truncated { offset })
    }

    /// Read a big-endian 16-bit operand starting at `offset`.
    pub fn read_u16(&self, offset: usize) -> Result<u16, DecodeError> {
        let hi = self.read_u8(offset)?;
        let lo = self.read_u8(offset + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Decode the opcode at `offset`.
    pub fn op_at(&self, offset: usize) -> Result<OpCode, DecodeError> {
        OpCode::try_from(self.read_u8(offset)?)
    }

    /// Source line for the byte at `offset`, or 0 past the end.
    pub fn line_at(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }
}
