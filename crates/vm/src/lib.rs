//! Lox virtual machine: runs compiled chunks.
//!
//! The VM is a stack machine with:
//! - An operand stack shared by every call frame
//! - A call-frame stack of up to [`FRAMES_MAX`] closures
//! - A globals table keyed by interned name
//! - A sorted list of open upvalues, closed when their slot goes away
//!
//! All heap objects belong to the VM's [`lox_heap::Heap`]; the VM is the
//! collector's root set.
//!
//! # Usage
//!
//! ```
//! use lox_vm::Vm;
//!
//! let mut vm = Vm::with_output(Vec::new());
//! vm.interpret("var a = 1; print a + 2;").unwrap();
//! assert_eq!(vm.into_output(), b"3\n");
//! ```
//!
//! # Dependencies
//!
//! `thiserror` for error types; `log` for instruction tracing.

pub mod error;
pub mod execute;
pub mod machine;

pub use error::{InterpretError, RuntimeError, TraceFrame};
pub use machine::{CallFrame, Vm, VmConfig, FRAMES_MAX, STACK_MAX};

/// Run `source` on a fresh VM and return what it printed.
///
/// # Errors
///
/// Returns [`InterpretError`] if compilation or execution fails. Output
/// printed before a runtime error is discarded.
pub fn interpret(source: &str) -> Result<String, InterpretError> {
    let mut vm = Vm::with_output(Vec::new());
    vm.interpret(source)?;
    Ok(String::from_utf8_lossy(&vm.into_output()).into_owned())
}
