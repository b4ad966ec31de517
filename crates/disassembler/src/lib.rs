//! Lox bytecode disassembler.
//!
//! Renders chunks as text for `--disassemble` and for execution tracing.
//! Pure diagnostics: nothing here feeds back into compilation or execution.

pub mod disassembler;

pub use disassembler::{disassemble_chunk, disassemble_function, disassemble_instruction};
