//! Runtime value representation for the Lox VM.
//!
//! Values are what live on the operand stack, in constant pools, and in
//! tables. Heap objects are never embedded; a value holds an [`ObjRef`]
//! handle into the collector-owned heap.

use std::fmt;

/// Handle to a heap object.
///
/// A handle is an index into the heap's object arena plus the generation
/// of the slot at the time of allocation. Freeing a slot bumps its
/// generation, so a handle that outlives its object no longer matches the
/// slot even after the slot is reused. Comparing two handles compares
/// object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    /// Build a handle to `index` in the given slot generation.
    pub fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }

    /// Build a first-generation handle from an arena index.
    pub fn from_index(index: usize) -> Self {
        Self::new(index, 0)
    }

    /// The arena index this handle names.
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.generation {
            0 => write!(f, "#{}", self.index),
            generation => write!(f, "#{}.{generation}", self.index),
        }
    }
}

/// A tagged Lox value.
#[derive(Debug, Clone, Copy, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Nil,
    /// `true` or `false`.
    Bool(bool),
    /// IEEE 754 double. The bit pattern is carried unchanged.
    Number(f64),
    /// Reference to a heap object.
    Obj(ObjRef),
}

// Numbers compare with IEEE semantics, so NaN != NaN and 0.0 == -0.0.
// Objects compare by handle; strings are interned, so this is also content
// equality for them.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// `nil` and `false` are falsey; every other value is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// The number inside, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The object handle inside, if this is an object.
    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

/// Format a number the way C's `%g` does: six significant digits, trailing
/// zeros removed, exponent notation outside `[1e-4, 1e6)`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Round to six significant digits first; the exponent of the rounded
    // value decides between fixed and exponent notation.
    let sci = format!("{n:.5e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..6).contains(&exponent) {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{n:.decimals$}")).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
