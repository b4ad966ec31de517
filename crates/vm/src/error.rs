//! Runtime and interpretation errors for the Lox VM.
//!
//! Runtime error messages are the ones a Lox program's user sees, so they
//! are phrased as sentences. A few variants (stack underflow, bad bytecode)
//! can only arise from malformed chunks, never from compiled source.

use std::fmt;

use lox_common::DecodeError;
use lox_compiler::CompileError;
use thiserror::Error;

/// Errors that abort execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Unary minus on a non-number.
    #[error("Operand must be a number.")]
    OperandMustBeNumber,

    /// Arithmetic or comparison on non-numbers.
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,

    /// `+` on anything but two numbers or two strings.
    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,

    /// Read or assignment of a global that was never defined.
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),

    /// No field or method with this name.
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),

    /// Property read on a non-instance.
    #[error("Only instances have properties.")]
    OnlyInstancesHaveProperties,

    /// Property write on a non-instance.
    #[error("Only instances have fields.")]
    OnlyInstancesHaveFields,

    /// Method invocation on a non-instance.
    #[error("Only instances have methods.")]
    OnlyInstancesHaveMethods,

    /// Call of something that is not a function, class or bound method.
    #[error("Can only call functions and classes.")]
    NotCallable,

    /// Call with the wrong number of arguments.
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: usize, got: usize },

    /// Call depth or operand stack exhausted.
    #[error("Stack overflow.")]
    StackOverflow,

    /// `class A < B` where `B` is not a class.
    #[error("Superclass must be a class.")]
    SuperclassNotClass,

    /// `print` could not write to the output sink.
    #[error("Could not write output: {0}")]
    Output(String),

    /// Pop from an empty stack or read below the current frame.
    #[error("Stack underflow.")]
    StackUnderflow,

    /// An instruction ran with no call frame active.
    #[error("No active call frame.")]
    NoActiveFrame,

    /// The instruction stream could not be decoded.
    #[error("Invalid bytecode: {0}")]
    Decode(#[from] DecodeError),
}

/// One line of a runtime stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: u32,
    /// Function name; `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {name}()", self.line),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// Why [`crate::Vm::interpret`] failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpretError {
    /// The source did not compile. Every independent error is listed.
    #[error("{}", join_lines(.0))]
    Compile(Vec<CompileError>),

    /// Execution aborted. `trace` lists active frames, innermost first.
    #[error("{error}\n{}", join_lines(.trace))]
    Runtime {
        error: RuntimeError,
        trace: Vec<TraceFrame>,
    },
}

fn join_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(T::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lox_compiler::ErrorLocation;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            RuntimeError::OperandsMustBeNumbers.to_string(),
            "Operands must be numbers."
        );
        assert_eq!(
            RuntimeError::UndefinedVariable("x".to_string()).to_string(),
            "Undefined variable 'x'."
        );
        assert_eq!(
            RuntimeError::ArityMismatch {
                expected: 2,
                got: 1
            }
            .to_string(),
            "Expected 2 arguments but got 1."
        );
        assert_eq!(
            RuntimeError::Decode(DecodeError::UnknownOpcode(99)).to_string(),
            "Invalid bytecode: unknown opcode 99"
        );
    }

    #[test]
    fn trace_frame_display() {
        let named = TraceFrame {
            line: 4,
            function: Some("inner".to_string()),
        };
        let script = TraceFrame {
            line: 9,
            function: None,
        };
        assert_eq!(named.to_string(), "[line 4] in inner()");
        assert_eq!(script.to_string(), "[line 9] in script");
    }

    #[test]
    fn runtime_error_display_includes_trace() {
        let e = InterpretError::Runtime {
            error: RuntimeError::StackOverflow,
            trace: vec![
                TraceFrame {
                    line: 2,
                    function: Some("f".to_string()),
                },
                TraceFrame {
                    line: 5,
                    function: None,
                },
            ],
        };
        assert_eq!(
            e.to_string(),
            "Stack overflow.\n[line 2] in f()\n[line 5] in script"
        );
    }

    #[test]
    fn compile_error_display_lists_every_error() {
        let e = InterpretError::Compile(vec![
            CompileError {
                line: 1,
                location: ErrorLocation::At(";".to_string()),
                message: "Expect expression.".to_string(),
            },
            CompileError {
                line: 3,
                location: ErrorLocation::AtEnd,
                message: "Expect '}' after block.".to_string(),
            },
        ]);
        assert_eq!(
            e.to_string(),
            "[line 1] Error at ';': Expect expression.\n\
             [line 3] Error at end: Expect '}' after block."
        );
    }
}
