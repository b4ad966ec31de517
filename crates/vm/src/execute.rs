//! Main execution loop and opcode dispatch for the Lox VM.

use std::io::Write;

use log::{log_enabled, trace, Level};
use lox_common::{DecodeError, ObjRef, OpCode, Value};
use lox_disassembler::disassemble_instruction;
use lox_heap::{
    ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjKind, ObjUpvalue, Object, UpvalueState,
};

use crate::error::RuntimeError;
use crate::machine::{CallFrame, Vm, FRAMES_MAX};

impl<W: Write> Vm<W> {
    /// Execute from the innermost frame until the top-level script returns.
    pub(crate) fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if log_enabled!(Level::Trace) {
                self.trace_instruction()?;
            }

            let op = OpCode::try_from(self.read_byte()?)?;
            match op {
                // Constants and literals
                OpCode::Constant => {
                    let value = self.read_constant()?;
                    self.push(value)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop()?;
                }

                // Variables
                OpCode::GetLocal => self.exec_get_local()?,
                OpCode::SetLocal => self.exec_set_local()?,
                OpCode::GetGlobal => self.exec_get_global()?,
                OpCode::DefineGlobal => self.exec_define_global()?,
                OpCode::SetGlobal => self.exec_set_global()?,
                OpCode::GetUpvalue => self.exec_get_upvalue()?,
                OpCode::SetUpvalue => self.exec_set_upvalue()?,
                OpCode::GetProperty => self.exec_get_property()?,
                OpCode::SetProperty => self.exec_set_property()?,
                OpCode::GetSuper => self.exec_get_super()?,

                // Comparison
                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a > b))?;
                }
                OpCode::Less => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Bool(a < b))?;
                }

                // Arithmetic
                OpCode::Add => self.exec_add()?,
                OpCode::Subtract => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a - b))?;
                }
                OpCode::Multiply => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a * b))?;
                }
                OpCode::Divide => {
                    let (a, b) = self.pop_numbers()?;
                    self.push(Value::Number(a / b))?;
                }
                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(value.is_falsey()))?;
                }
                OpCode::Negate => self.exec_negate()?,

                // Statements and control flow
                OpCode::Print => self.exec_print()?,
                OpCode::Jump => {
                    let offset = self.read_u16()?;
                    self.frame_mut()?.ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16()?;
                    if self.peek(0)?.is_falsey() {
                        self.frame_mut()?.ip += offset as usize;
                    }
                }
                OpCode::Loop => self.exec_loop()?,

                // Calls and closures
                OpCode::Call => {
                    let arg_count = self.read_byte()? as usize;
                    let callee = self.peek(arg_count)?;
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte()? as usize;
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte()? as usize;
                    let superclass = self.pop_class()?;
                    self.invoke_from_class(superclass, name, arg_count)?;
                }
                OpCode::Closure => self.exec_closure()?,
                OpCode::CloseUpvalue => {
                    let top = self
                        .stack
                        .len()
                        .checked_sub(1)
                        .ok_or(RuntimeError::StackUnderflow)?;
                    self.close_upvalues(top)?;
                    self.pop()?;
                }
                OpCode::Return => {
                    if self.exec_return()? {
                        return Ok(());
                    }
                }

                // Classes
                OpCode::Class => {
                    let name = self.read_string()?;
                    let class = self.alloc(Object::Class(ObjClass::new(name)));
                    self.push(Value::Obj(class))?;
                }
                OpCode::Inherit => self.exec_inherit()?,
                OpCode::Method => self.exec_method()?,
            }
        }
    }

    fn trace_instruction(&self) -> Result<(), RuntimeError> {
        let frame = self.frame()?;
        let stack: String = self
            .stack
            .iter()
            .map(|value| format!("[ {} ]", self.heap.display(*value)))
            .collect();
        let chunk = &self.heap.function(frame.function).chunk;
        let (text, _) = disassemble_instruction(&self.heap, chunk, frame.ip);
        trace!("          {stack}");
        trace!("{text}");
        Ok(())
    }

    // ---- Frames and operands ----

    pub(crate) fn frame(&self) -> Result<&CallFrame, RuntimeError> {
        self.frames.last().ok_or(RuntimeError::NoActiveFrame)
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut CallFrame, RuntimeError> {
        self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        let byte = self.heap.function(frame.function).chunk.read_u8(frame.ip)?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeError> {
        let frame = self.frames.last_mut().ok_or(RuntimeError::NoActiveFrame)?;
        let value = self.heap.function(frame.function).chunk.read_u16(frame.ip)?;
        frame.ip += 2;
        Ok(value)
    }

    fn read_constant(&mut self) -> Result<Value, RuntimeError> {
        let index = self.read_byte()?;
        let frame = self.frame()?;
        self.heap
            .function(frame.function)
            .chunk
            .constants
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::Decode(DecodeError::BadConstant { index }))
    }

    /// Read a constant operand that must be an object of `kind`.
    fn read_object(&mut self, kind: ObjKind) -> Result<ObjRef, RuntimeError> {
        let index = self.read_byte()?;
        let frame = self.frame()?;
        let constant = self
            .heap
            .function(frame.function)
            .chunk
            .constants
            .get(index as usize)
            .copied();
        constant
            .and_then(|value| self.as_kind(value, kind))
            .ok_or(RuntimeError::Decode(DecodeError::BadConstant { index }))
    }

    fn read_string(&mut self) -> Result<ObjRef, RuntimeError> {
        self.read_object(ObjKind::String)
    }

    /// `value`'s object handle if it is an object of `kind`.
    fn as_kind(&self, value: Value, kind: ObjKind) -> Option<ObjRef> {
        value
            .as_obj()
            .filter(|_| self.heap.kind_of(value) == Some(kind))
    }

    fn pop_numbers(&mut self) -> Result<(f64, f64), RuntimeError> {
        match (self.peek(1)?, self.peek(0)?) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop()?;
                self.pop()?;
                Ok((a, b))
            }
            _ => Err(RuntimeError::OperandsMustBeNumbers),
        }
    }

    fn pop_class(&mut self) -> Result<ObjRef, RuntimeError> {
        let value = self.pop()?;
        self.as_kind(value, ObjKind::Class)
            .ok_or(RuntimeError::SuperclassNotClass)
    }

    // ---- Variables ----

    fn exec_get_local(&mut self) -> Result<(), RuntimeError> {
        let slot = self.read_byte()? as usize;
        let base = self.frame()?.slots;
        let value = self.stack_slot(base + slot)?;
        self.push(value)
    }

    fn exec_set_local(&mut self) -> Result<(), RuntimeError> {
        let slot = self.read_byte()? as usize;
        let base = self.frame()?.slots;
        let value = self.peek(0)?;
        self.set_stack_slot(base + slot, value)
    }

    fn exec_get_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        match self.globals.get(self.heap.key(name)) {
            Some(value) => self.push(value),
            None => Err(RuntimeError::UndefinedVariable(
                self.heap.str(name).to_string(),
            )),
        }
    }

    fn exec_define_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let value = self.peek(0)?;
        self.globals.set(self.heap.key(name), value);
        self.pop()?;
        Ok(())
    }

    fn exec_set_global(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let key = self.heap.key(name);
        let value = self.peek(0)?;
        // Assignment never creates a global.
        if self.globals.set(key, value) {
            self.globals.delete(key);
            return Err(RuntimeError::UndefinedVariable(
                self.heap.str(name).to_string(),
            ));
        }
        Ok(())
    }

    /// Upvalue `index` of the running closure.
    fn frame_upvalue(&self, index: u8) -> Result<ObjRef, RuntimeError> {
        let closure = self.frame()?.closure;
        self.heap
            .closure(closure)
            .upvalues
            .get(index as usize)
            .copied()
            .ok_or(RuntimeError::Decode(DecodeError::BadConstant { index }))
    }

    fn exec_get_upvalue(&mut self) -> Result<(), RuntimeError> {
        let index = self.read_byte()?;
        let upvalue = self.frame_upvalue(index)?;
        let value = match self.heap.upvalue(upvalue).state {
            UpvalueState::Open(slot) => self.stack_slot(slot)?,
            UpvalueState::Closed(value) => value,
        };
        self.push(value)
    }

    fn exec_set_upvalue(&mut self) -> Result<(), RuntimeError> {
        let index = self.read_byte()?;
        let upvalue = self.frame_upvalue(index)?;
        let value = self.peek(0)?;
        match self.heap.upvalue(upvalue).state {
            UpvalueState::Open(slot) => self.set_stack_slot(slot, value)?,
            UpvalueState::Closed(_) => {
                self.heap.upvalue_mut(upvalue).state = UpvalueState::Closed(value);
            }
        }
        Ok(())
    }

    // ---- Properties ----

    fn exec_get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let instance = self
            .as_kind(self.peek(0)?, ObjKind::Instance)
            .ok_or(RuntimeError::OnlyInstancesHaveProperties)?;

        // Fields shadow methods.
        let (field, class) = self.field_or_class(instance, name);
        if let Some(value) = field {
            self.pop()?;
            return self.push(value);
        }
        self.bind_method(class, name)
    }

    /// The instance's field `name`, if set, and its class.
    fn field_or_class(&self, instance: ObjRef, name: ObjRef) -> (Option<Value>, ObjRef) {
        let instance = self.heap.instance(instance);
        (instance.fields.get(self.heap.key(name)), instance.class)
    }

    fn exec_set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let instance = self
            .as_kind(self.peek(1)?, ObjKind::Instance)
            .ok_or(RuntimeError::OnlyInstancesHaveFields)?;
        let key = self.heap.key(name);
        let value = self.peek(0)?;
        self.heap.set_field(instance, key, value);

        let value = self.pop()?;
        self.pop()?;
        self.push(value)
    }

    fn exec_get_super(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let superclass = self.pop_class()?;
        self.bind_method(superclass, name)
    }

    /// Replace the receiver on top of the stack with `class.name` bound to
    /// it.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let method = self.find_method(class, name)?;
        let receiver = self.peek(0)?;
        let bound = self.alloc(Object::BoundMethod(ObjBoundMethod { receiver, method }));
        self.pop()?;
        self.push(Value::Obj(bound))
    }

    fn find_method(&self, class: ObjRef, name: ObjRef) -> Result<ObjRef, RuntimeError> {
        self.heap
            .class(class)
            .methods
            .get(self.heap.key(name))
            .and_then(|method| self.as_kind(method, ObjKind::Closure))
            .ok_or_else(|| RuntimeError::UndefinedProperty(self.heap.str(name).to_string()))
    }

    // ---- Operators ----

    fn exec_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0)?;
        let a = self.peek(1)?;
        if let (Value::Number(a), Value::Number(b)) = (a, b) {
            self.pop()?;
            self.pop()?;
            return self.push(Value::Number(a + b));
        }
        match (
            self.as_kind(a, ObjKind::String),
            self.as_kind(b, ObjKind::String),
        ) {
            (Some(a), Some(b)) => self.concatenate(a, b),
            _ => Err(RuntimeError::OperandsMustBeNumbersOrStrings),
        }
    }

    /// Concatenate the two strings on top of the stack. Both stay on the
    /// stack until the result exists.
    fn concatenate(&mut self, a: ObjRef, b: ObjRef) -> Result<(), RuntimeError> {
        let (a, b) = (self.heap.str(a), self.heap.str(b));
        let mut chars = String::with_capacity(a.len() + b.len());
        chars.push_str(a);
        chars.push_str(b);
        let result = self.take_string(chars);
        self.pop()?;
        self.pop()?;
        self.push(Value::Obj(result))
    }

    fn exec_negate(&mut self) -> Result<(), RuntimeError> {
        match self.peek(0)? {
            Value::Number(n) => self.poke(0, Value::Number(-n)),
            _ => Err(RuntimeError::OperandMustBeNumber),
        }
    }

    fn exec_print(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        writeln!(self.out, "{}", self.heap.display(value))
            .map_err(|e| RuntimeError::Output(e.to_string()))
    }

    fn exec_loop(&mut self) -> Result<(), RuntimeError> {
        let offset = self.read_u16()? as usize;
        let frame = self.frame_mut()?;
        frame.ip = frame
            .ip
            .checked_sub(offset)
            .ok_or(DecodeError::Truncated { offset: frame.ip })?;
        Ok(())
    }

    // ---- Calls ----

    /// Call `callee`, which sits below `arg_count` arguments on the stack.
    pub(crate) fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), RuntimeError> {
        let Value::Obj(r) = callee else {
            return Err(RuntimeError::NotCallable);
        };
        match self.heap.kind_of(callee) {
            Some(ObjKind::BoundMethod) => {
                let &ObjBoundMethod { receiver, method } = self.heap.bound_method(r);
                self.poke(arg_count, receiver)?;
                self.call(method, arg_count)
            }
            Some(ObjKind::Class) => {
                // The instance replaces the class in the callee slot and
                // keeps it reachable.
                let instance = self.alloc(Object::Instance(ObjInstance::new(r)));
                self.poke(arg_count, Value::Obj(instance))?;
                let initializer = self.heap.class(r).methods.get(self.heap.key(self.init_string));
                match initializer.and_then(|init| self.as_kind(init, ObjKind::Closure)) {
                    Some(init) => self.call(init, arg_count),
                    None if arg_count != 0 => Err(RuntimeError::ArityMismatch {
                        expected: 0,
                        got: arg_count,
                    }),
                    None => Ok(()),
                }
            }
            Some(ObjKind::Closure) => self.call(r, arg_count),
            Some(ObjKind::Native) => {
                let function = self.heap.native(r).function;
                let args_start = self
                    .stack
                    .len()
                    .checked_sub(arg_count)
                    .ok_or(RuntimeError::StackUnderflow)?;
                let result = function(&self.stack[args_start..]);
                // Drop the arguments and the native itself.
                self.stack.truncate(args_start.saturating_sub(1));
                self.push(result)
            }
            _ => Err(RuntimeError::NotCallable),
        }
    }

    /// Push a frame for `closure`.
    pub(crate) fn call(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;
        if arg_count != arity {
            return Err(RuntimeError::ArityMismatch {
                expected: arity,
                got: arg_count,
            });
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::StackOverflow);
        }
        let slots = self
            .stack
            .len()
            .checked_sub(arg_count + 1)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slots,
        });
        Ok(())
    }

    /// `receiver.name(args)` without materializing a bound method.
    fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let instance = self
            .as_kind(self.peek(arg_count)?, ObjKind::Instance)
            .ok_or(RuntimeError::OnlyInstancesHaveMethods)?;

        // A field holding a callable wins over a method of the same name.
        let (field, class) = self.field_or_class(instance, name);
        if let Some(field) = field {
            self.poke(arg_count, field)?;
            return self.call_value(field, arg_count);
        }
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), RuntimeError> {
        let method = self.find_method(class, name)?;
        self.call(method, arg_count)
    }

    /// Pop the returning frame. `true` once the top-level script is done.
    fn exec_return(&mut self) -> Result<bool, RuntimeError> {
        let result = self.pop()?;
        let frame = self.frames.pop().ok_or(RuntimeError::NoActiveFrame)?;
        self.close_upvalues(frame.slots)?;

        if self.frames.is_empty() {
            self.stack.clear();
            return Ok(true);
        }
        self.stack.truncate(frame.slots);
        self.push(result)?;
        Ok(false)
    }

    // ---- Closures ----

    fn exec_closure(&mut self) -> Result<(), RuntimeError> {
        let function = self.read_object(ObjKind::Function)?;
        let upvalue_count = self.heap.function(function).upvalue_count;
        let base = self.frame()?.slots;

        // Fresh upvalues land in `open_upvalues` and inherited ones belong
        // to the running closure, so all of them stay rooted here.
        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte()? != 0;
            let index = self.read_byte()?;
            let upvalue = if is_local {
                self.capture_upvalue(base + index as usize)
            } else {
                self.frame_upvalue(index)?
            };
            upvalues.push(upvalue);
        }

        let closure = self.alloc(Object::Closure(ObjClosure { function, upvalues }));
        self.push(Value::Obj(closure))
    }

    /// The open upvalue for stack `slot`, created if none exists yet.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &upvalue) in self.open_upvalues.iter().enumerate().rev() {
            match self.heap.upvalue(upvalue).open_slot() {
                Some(open) if open == slot => return upvalue,
                Some(open) if open < slot => break,
                _ => insert_at = i,
            }
        }

        let created = self.alloc(Object::Upvalue(ObjUpvalue::open(slot)));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Close every open upvalue at or above stack slot `last`.
    fn close_upvalues(&mut self, last: usize) -> Result<(), RuntimeError> {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let Some(slot) = self.heap.upvalue(upvalue).open_slot() else {
                self.open_upvalues.pop();
                continue;
            };
            if slot < last {
                break;
            }
            let value = self.stack_slot(slot)?;
            self.heap.upvalue_mut(upvalue).state = UpvalueState::Closed(value);
            self.open_upvalues.pop();
        }
        Ok(())
    }

    // ---- Classes ----

    fn exec_inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass = self
            .as_kind(self.peek(1)?, ObjKind::Class)
            .ok_or(RuntimeError::SuperclassNotClass)?;
        let subclass = self
            .as_kind(self.peek(0)?, ObjKind::Class)
            .ok_or(RuntimeError::NotCallable)?;

        // Copy-down inheritance: later method definitions override.
        self.heap.inherit_methods(superclass, subclass);
        self.pop()?;
        Ok(())
    }

    fn exec_method(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string()?;
        let method = self.peek(0)?;
        let class = self
            .as_kind(self.peek(1)?, ObjKind::Class)
            .ok_or(RuntimeError::NotCallable)?;
        if self.as_kind(method, ObjKind::Closure).is_none() {
            return Err(RuntimeError::NotCallable);
        }
        let key = self.heap.key(name);
        self.heap.set_method(class, key, method);
        self.pop()?;
        Ok(())
    }
}
