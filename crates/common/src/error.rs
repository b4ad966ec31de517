//! Decode errors for Lox instruction streams.

use thiserror::Error;

/// Errors that occur while reading bytes back out of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The byte does not name any opcode.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// An operand was expected past the end of the code.
    #[error("truncated instruction at offset {offset}")]
    Truncated { offset: usize },

    /// A constant operand names a missing slot, or a constant of the
    /// wrong kind for the instruction.
    #[error("bad constant operand {index}")]
    BadConstant { index: u8 },
}
