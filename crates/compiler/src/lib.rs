//! Lox compiler: source text → bytecode.
//!
//! One pass, no syntax tree. The scanner hands tokens to a Pratt parser
//! that emits bytecode straight into the chunk of the function being
//! compiled, resolving locals, upvalues and globals as it goes.
//!
//! - [`compile`]: the entry point
//! - [`CompileError`]: one diagnostic; all of them are collected
//! - [`Scanner`], [`Token`], [`TokenKind`]: the tokenizer
//!
//! # Dependencies
//!
//! `thiserror` for error types, `log` to dump compiled chunks at debug
//! level, and the workspace's heap and disassembler crates.

mod compiler;
pub mod error;
mod expression;
pub mod scanner;

pub use compiler::{MAX_ARITY, MAX_JUMP, UINT8_COUNT};
pub use error::{CompileError, ErrorLocation};
pub use scanner::{Scanner, Token, TokenKind};

use lox_common::ObjRef;
use lox_heap::{GcRoots, Heap};

/// Compile `source` into a top-level script function.
///
/// Allocation during compilation may trigger a collection; `roots` names
/// whatever else the caller needs kept alive (the VM passes its globals).
/// On failure every independent error is returned, in source order.
pub fn compile(
    source: &str,
    heap: &mut Heap,
    roots: &dyn GcRoots,
) -> Result<ObjRef, Vec<CompileError>> {
    compiler::Compiler::new(source, heap, roots).compile()
}
