//! VM state management: operand stack, call frames, globals, GC roots.

use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use lox_common::{ObjRef, Value};
use lox_compiler::{compile, UINT8_COUNT};
use lox_heap::{
    GcConfig, GcRoots, Heap, NativeFn, NoRoots, ObjClosure, ObjNative, Object, Table,
};

use crate::error::{InterpretError, RuntimeError, TraceFrame};

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;

/// Operand stack capacity: every frame may address a full byte of slots.
pub const STACK_MAX: usize = FRAMES_MAX * UINT8_COUNT;

/// VM tuning knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmConfig {
    pub gc: GcConfig,
}

/// One active function invocation.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// Its function, cached to skip a lookup per instruction.
    pub function: ObjRef,
    /// Offset of the next instruction in the function's chunk.
    pub ip: usize,
    /// Stack index of slot 0 (the callee or receiver).
    pub slots: usize,
}

/// Everything the VM holds that keeps heap objects alive.
pub(crate) struct VmRoots<'a> {
    stack: &'a [Value],
    frames: &'a [CallFrame],
    globals: &'a Table,
    open_upvalues: &'a [ObjRef],
    init_string: ObjRef,
}

impl GcRoots for VmRoots<'_> {
    fn mark_roots(&self, heap: &mut Heap) {
        for &value in self.stack {
            heap.mark_value(value);
        }
        for frame in self.frames {
            heap.mark_object(frame.closure);
        }
        for &upvalue in self.open_upvalues {
            heap.mark_object(upvalue);
        }
        heap.mark_table(self.globals);
        heap.mark_object(self.init_string);
    }
}

/// The Lox virtual machine.
///
/// Owns its heap, so nothing survives between independently constructed
/// VMs. Globals persist across [`Vm::interpret`] calls on the same VM.
pub struct Vm<W: Write = io::Stdout> {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) globals: Table,
    /// Open upvalues sorted by ascending stack slot.
    pub(crate) open_upvalues: Vec<ObjRef>,
    pub(crate) init_string: ObjRef,
    pub(crate) out: W,
}

impl Vm<io::Stdout> {
    /// A VM printing to stdout with default settings.
    pub fn new() -> Self {
        Self::with_config(io::stdout(), VmConfig::default())
    }
}

impl Default for Vm<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    /// A VM printing to `out` with default settings.
    pub fn with_output(out: W) -> Self {
        Self::with_config(out, VmConfig::default())
    }

    pub fn with_config(out: W, config: VmConfig) -> Self {
        let mut heap = Heap::new(config.gc);
        let init_string = heap.intern("init", &NoRoots);
        let mut vm = Self {
            heap,
            stack: Vec::with_capacity(UINT8_COUNT),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            out,
        };
        vm.define_native("clock", clock_native);
        vm
    }

    /// Compile and run `source`.
    ///
    /// # Errors
    ///
    /// [`InterpretError::Compile`] with every compile error, or
    /// [`InterpretError::Runtime`] with the error and a stack trace. After a
    /// runtime error the stack is reset; globals defined so far remain.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = {
            let (heap, roots) = self.heap_and_roots();
            compile(source, heap, &roots).map_err(InterpretError::Compile)?
        };
        self.run_function(function)
            .map_err(|error| self.runtime_error(error))
    }

    fn run_function(&mut self, function: ObjRef) -> Result<(), RuntimeError> {
        // Root the function while its closure is allocated.
        self.push(Value::Obj(function))?;
        let closure = self.alloc(Object::Closure(ObjClosure {
            function,
            upvalues: Vec::new(),
        }));
        self.pop()?;
        self.push(Value::Obj(closure))?;
        self.call(closure, 0)?;
        self.run()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The output sink `print` writes to.
    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Value of a global variable, for embedders and tests.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.iter().find_map(|(key, value)| {
            (self.heap.str(key.obj) == name).then_some(value)
        })
    }

    /// Register a native function under `name`.
    pub fn define_native(&mut self, name: &'static str, function: NativeFn) {
        // Both objects stay on the stack until they are reachable from
        // the globals table.
        let name_ref = self.intern(name);
        self.stack.push(Value::Obj(name_ref));
        let native = self.alloc(Object::Native(ObjNative { name, function }));
        self.stack.push(Value::Obj(native));
        let key = self.heap.key(name_ref);
        self.globals.set(key, Value::Obj(native));
        self.stack.truncate(self.stack.len() - 2);
    }

    // ---- Allocation ----

    /// Split the borrow of `self` into the heap and everything else.
    fn heap_and_roots(&mut self) -> (&mut Heap, VmRoots<'_>) {
        let roots = VmRoots {
            stack: &self.stack,
            frames: &self.frames,
            globals: &self.globals,
            open_upvalues: &self.open_upvalues,
            init_string: self.init_string,
        };
        (&mut self.heap, roots)
    }

    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        let (heap, roots) = self.heap_and_roots();
        heap.alloc(object, &roots)
    }

    pub(crate) fn intern(&mut self, chars: &str) -> ObjRef {
        let (heap, roots) = self.heap_and_roots();
        heap.intern(chars, &roots)
    }

    pub(crate) fn take_string(&mut self, chars: String) -> ObjRef {
        let (heap, roots) = self.heap_and_roots();
        heap.take_string(chars, &roots)
    }

    // ---- Stack ----

    /// Push a value onto the stack, checking for overflow.
    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a value from the stack.
    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// The value `distance` slots below the top.
    pub(crate) fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .map(|index| self.stack[index])
            .ok_or(RuntimeError::StackUnderflow)
    }

    /// Overwrite the value `distance` slots below the top.
    pub(crate) fn poke(&mut self, distance: usize, value: Value) -> Result<(), RuntimeError> {
        let index = self
            .stack
            .len()
            .checked_sub(distance + 1)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.stack[index] = value;
        Ok(())
    }

    pub(crate) fn stack_slot(&self, index: usize) -> Result<Value, RuntimeError> {
        self.stack
            .get(index)
            .copied()
            .ok_or(RuntimeError::StackUnderflow)
    }

    pub(crate) fn set_stack_slot(&mut self, index: usize, value: Value) -> Result<(), RuntimeError> {
        let slot = self
            .stack
            .get_mut(index)
            .ok_or(RuntimeError::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    // ---- Errors ----

    /// Capture a stack trace for `error` and reset the VM to idle.
    fn runtime_error(&mut self, error: RuntimeError) -> InterpretError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                TraceFrame {
                    line: function.chunk.line_at(frame.ip.saturating_sub(1)),
                    function: function.name.map(|name| self.heap.str(name).to_string()),
                }
            })
            .collect();
        self.reset_stack();
        InterpretError::Runtime { error, trace }
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }
}

/// `clock()`: seconds since the Unix epoch.
fn clock_native(_args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm<Vec<u8>> {
        Vm::with_output(Vec::new())
    }

    #[test]
    fn push_pop_peek() {
        let mut vm = vm();
        vm.push(Value::Number(1.0)).unwrap();
        vm.push(Value::Number(2.0)).unwrap();
        assert_eq!(vm.peek(0), Ok(Value::Number(2.0)));
        assert_eq!(vm.peek(1), Ok(Value::Number(1.0)));
        assert_eq!(vm.peek(2), Err(RuntimeError::StackUnderflow));
        vm.poke(1, Value::Nil).unwrap();
        assert_eq!(vm.pop(), Ok(Value::Number(2.0)));
        assert_eq!(vm.pop(), Ok(Value::Nil));
        assert_eq!(vm.pop(), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn push_past_capacity_overflows() {
        let mut vm = vm();
        for _ in 0..STACK_MAX {
            vm.push(Value::Nil).unwrap();
        }
        assert_eq!(vm.push(Value::Nil), Err(RuntimeError::StackOverflow));
    }

    #[test]
    fn clock_is_registered() {
        let vm = vm();
        let clock = vm.global("clock").and_then(|v| v.as_obj()).unwrap();
        assert_eq!(vm.heap().native(clock).name, "clock");
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn clock_is_positive() {
        assert!(clock_native(&[]).as_number().unwrap() > 0.0);
    }

    #[test]
    fn native_registration_survives_stress_gc() {
        let vm = Vm::with_config(
            Vec::new(),
            VmConfig {
                gc: GcConfig {
                    stress: true,
                    ..GcConfig::default()
                },
            },
        );
        let clock = vm.global("clock").and_then(|v| v.as_obj()).unwrap();
        assert!(vm.heap().contains(clock));
        assert_eq!(vm.heap().str(vm.init_string), "init");
    }
}
