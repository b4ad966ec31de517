//! Heap object variants.
//!
//! Every object lives in the [`Heap`](crate::Heap) arena and is referenced
//! through an [`ObjRef`]. Objects that point at other objects hold handles,
//! never Rust references, so cyclic graphs (a closure capturing itself
//! through an upvalue, a method closing over its class) need no special
//! ownership.

use std::mem::size_of;

use lox_common::{Chunk, ObjRef, Value};

use crate::table::Table;

/// Signature of a native function: arguments in, one value out.
pub type NativeFn = fn(&[Value]) -> Value;

/// Type tag of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
}

impl ObjKind {
    pub fn name(&self) -> &'static str {
        match self {
            ObjKind::String => "string",
            ObjKind::Function => "function",
            ObjKind::Native => "native",
            ObjKind::Closure => "closure",
            ObjKind::Upvalue => "upvalue",
            ObjKind::Class => "class",
            ObjKind::Instance => "instance",
            ObjKind::BoundMethod => "bound method",
        }
    }
}

/// Immutable interned string with its cached hash.
#[derive(Debug, Clone)]
pub struct ObjString {
    pub chars: Box<str>,
    pub hash: u32,
}

impl ObjString {
    pub fn new(chars: impl Into<Box<str>>) -> Self {
        let chars = chars.into();
        let hash = hash_string(&chars);
        Self { chars, hash }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// A compiled function. `name` is `None` for the top-level script.
#[derive(Debug, Clone, Default)]
pub struct ObjFunction {
    pub name: Option<ObjRef>,
    pub arity: usize,
    pub upvalue_count: usize,
    pub chunk: Chunk,
}

/// A function implemented in Rust.
#[derive(Debug, Clone)]
pub struct ObjNative {
    pub name: &'static str,
    pub function: NativeFn,
}

/// A function together with the upvalues it captured when created.
#[derive(Debug, Clone)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// Where an upvalue's variable currently lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpvalueState {
    /// Still on the operand stack at this absolute slot.
    Open(usize),
    /// Moved off the stack into the upvalue itself.
    Closed(Value),
}

#[derive(Debug, Clone)]
pub struct ObjUpvalue {
    pub state: UpvalueState,
}

impl ObjUpvalue {
    pub fn open(slot: usize) -> Self {
        Self {
            state: UpvalueState::Open(slot),
        }
    }

    /// The stack slot this upvalue points at, if still open.
    pub fn open_slot(&self) -> Option<usize> {
        match self.state {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjClass {
    pub name: ObjRef,
    pub methods: Table,
}

impl ObjClass {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

impl ObjInstance {
    pub fn new(class: ObjRef) -> Self {
        Self {
            class,
            fields: Table::new(),
        }
    }
}

/// A method closure paired with the receiver it was accessed on.
#[derive(Debug, Clone)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

/// A heap object.
#[derive(Debug, Clone)]
pub enum Object {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl Object {
    pub fn kind(&self) -> ObjKind {
        match self {
            Object::String(_) => ObjKind::String,
            Object::Function(_) => ObjKind::Function,
            Object::Native(_) => ObjKind::Native,
            Object::Closure(_) => ObjKind::Closure,
            Object::Upvalue(_) => ObjKind::Upvalue,
            Object::Class(_) => ObjKind::Class,
            Object::Instance(_) => ObjKind::Instance,
            Object::BoundMethod(_) => ObjKind::BoundMethod,
        }
    }

    /// Bytes charged to the allocator for this object.
    pub(crate) fn size(&self) -> usize {
        let payload = match self {
            Object::String(s) => s.chars.len(),
            Object::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * size_of::<u32>()
                    + f.chunk.constants.capacity() * size_of::<Value>()
            }
            Object::Native(_) | Object::Upvalue(_) | Object::BoundMethod(_) => 0,
            Object::Closure(c) => c.upvalues.capacity() * size_of::<ObjRef>(),
            Object::Class(c) => table_size(&c.methods),
            Object::Instance(i) => table_size(&i.fields),
        };
        size_of::<Object>() + payload
    }

    /// Push every object this one references onto `out`.
    pub(crate) fn trace(&self, out: &mut Vec<ObjRef>) {
        match self {
            Object::String(_) | Object::Native(_) => {}
            Object::Function(f) => {
                out.extend(f.name);
                out.extend(f.chunk.constants.iter().filter_map(Value::as_obj));
            }
            Object::Closure(c) => {
                out.push(c.function);
                out.extend(c.upvalues.iter().copied());
            }
            Object::Upvalue(u) => {
                if let UpvalueState::Closed(Value::Obj(r)) = u.state {
                    out.push(r);
                }
            }
            Object::Class(c) => {
                out.push(c.name);
                trace_table(&c.methods, out);
            }
            Object::Instance(i) => {
                out.push(i.class);
                trace_table(&i.fields, out);
            }
            Object::BoundMethod(b) => {
                out.extend(b.receiver.as_obj());
                out.push(b.method);
            }
        }
    }
}

fn table_size(table: &Table) -> usize {
    table.capacity() * (size_of::<Option<crate::table::Key>>() + size_of::<Value>())
}

pub(crate) fn trace_table(table: &Table, out: &mut Vec<ObjRef>) {
    for (key, value) in table.iter() {
        out.push(key.obj);
        out.extend(value.as_obj());
    }
}

/// 32-bit FNV-1a over the string's bytes.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in chars.as_bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}
