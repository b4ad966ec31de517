//! Lox common types and bytecode encoding.
//!
//! This crate provides the data structures shared by the compiler, the
//! disassembler and the virtual machine:
//!
//! - [`OpCode`]: the instruction set
//! - [`Chunk`]: instruction bytes, line table and constant pool
//! - [`Value`]: the tagged runtime value
//! - [`ObjRef`]: a handle to a collector-owned heap object
//! - [`DecodeError`]: errors from reading bytes back out of a chunk
//!
//! # Dependencies
//!
//! Only `thiserror`, for [`DecodeError`].

pub mod chunk;
pub mod error;
pub mod opcode;
pub mod value;

// Re-export commonly used types at the crate root.
pub use chunk::Chunk;
pub use error::DecodeError;
pub use opcode::OpCode;
pub use value::{format_number, ObjRef, Value};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy that generates a random valid OpCode.
    fn arb_opcode() -> impl Strategy<Value = OpCode> {
        prop::sample::select(&opcode::ALL_OPCODES[..])
    }

    proptest! {
        /// Every f64 bit pattern, NaN payloads included, survives a trip
        /// through a Value and a constant pool.
        #[test]
        fn number_bits_roundtrip(bits in any::<u64>()) {
            let mut chunk = Chunk::new();
            let idx = chunk.add_constant(Value::Number(f64::from_bits(bits)));
            match chunk.constants[idx] {
                Value::Number(n) => prop_assert_eq!(n.to_bits(), bits),
                other => prop_assert!(false, "expected number, got {:?}", other),
            }
        }

        /// Any byte either decodes to an opcode that re-encodes to the same
        /// byte, or is reported as unknown.
        #[test]
        fn any_byte_decodes_or_is_unknown(byte in any::<u8>()) {
            match OpCode::try_from(byte) {
                Ok(op) => prop_assert_eq!(op as u8, byte),
                Err(e) => prop_assert_eq!(e, DecodeError::UnknownOpcode(byte)),
            }
        }

        /// Written opcodes read back in order, each with its line.
        #[test]
        fn written_ops_read_back(
            ops in prop::collection::vec((arb_opcode(), 1u32..500), 0..64)
        ) {
            let mut chunk = Chunk::new();
            for &(op, line) in &ops {
                chunk.write_op(op, line);
            }
            prop_assert_eq!(chunk.len(), ops.len());
            for (i, &(op, line)) in ops.iter().enumerate() {
                prop_assert_eq!(chunk.op_at(i), Ok(op));
                prop_assert_eq!(chunk.line_at(i), line);
            }
        }
    }
}
