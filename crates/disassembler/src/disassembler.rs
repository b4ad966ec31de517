//! Disassembler: chunk → human-readable instruction listing.
//!
//! One line per instruction: `OOOO LLLL MNEMONIC operands`, where the line
//! column collapses to `   |` while consecutive instructions share a
//! source line. `OP_CLOSURE` additionally prints one line per captured
//! variable. Output depends only on the chunk and the heap objects its
//! constants refer to.

use lox_common::{Chunk, DecodeError, ObjRef, OpCode, Value};
use lox_heap::{Heap, Object};

/// Disassemble a whole chunk under a `== name ==` header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {name} ==\n");
    let mut offset = 0;
    while offset < chunk.len() {
        let (text, next) = disassemble_instruction(heap, chunk, offset);
        out.push_str(&text);
        out.push('\n');
        offset = next;
    }
    out
}

/// Disassemble the single instruction at `offset`.
///
/// Returns the text (without trailing newline) and the offset of the
/// following instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> (String, usize) {
    let mut text = format!("{offset:04} ");
    if offset > 0 && chunk.line_at(offset) == chunk.line_at(offset - 1) {
        text.push_str("   | ");
    } else {
        text.push_str(&format!("{:>4} ", chunk.line_at(offset)));
    }

    let op = match chunk.op_at(offset) {
        Ok(op) => op,
        Err(DecodeError::UnknownOpcode(byte)) => {
            text.push_str(&format!("Unknown opcode {byte}"));
            return (text, offset + 1);
        }
        Err(e) => {
            text.push_str(&format!("<{e}>"));
            return (text, chunk.len());
        }
    };

    let operands = match op {
        // No operands
        OpCode::Nil
        | OpCode::True
        | OpCode::False
        | OpCode::Pop
        | OpCode::Equal
        | OpCode::Greater
        | OpCode::Less
        | OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::Divide
        | OpCode::Not
        | OpCode::Negate
        | OpCode::Print
        | OpCode::CloseUpvalue
        | OpCode::Return
        | OpCode::Inherit => Ok((op.mnemonic().to_string(), offset + 1)),

        // One byte: a stack slot, upvalue index or argument count
        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call => byte_instruction(chunk, op, offset),

        // One byte indexing the constant pool
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => constant_instruction(heap, chunk, op, offset),

        // Two-byte jump distance
        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(chunk, op, 1, offset),
        OpCode::Loop => jump_instruction(chunk, op, -1, offset),

        // Constant name plus argument count
        OpCode::Invoke | OpCode::SuperInvoke => invoke_instruction(heap, chunk, op, offset),

        OpCode::Closure => closure_instruction(heap, chunk, offset),
    };

    match operands {
        Ok((operands, next)) => {
            text.push_str(&operands);
            (text, next)
        }
        Err(e) => {
            text.push_str(&format!("{} <{e}>", op.mnemonic()));
            (text, chunk.len())
        }
    }
}

/// Disassemble a function and, depth first, every function in its
/// constant pool.
pub fn disassemble_function(heap: &Heap, function: ObjRef) -> String {
    let mut out = String::new();
    let mut pending = vec![function];
    while let Some(r) = pending.pop() {
        let function = heap.function(r);
        let name = match function.name {
            Some(name) => heap.str(name),
            None => "<script>",
        };
        out.push_str(&disassemble_chunk(heap, &function.chunk, name));
        // Reverse so nested functions come out in source order.
        for value in function.chunk.constants.iter().rev() {
            if let Value::Obj(c) = value {
                if matches!(heap.get(*c), Object::Function(_)) {
                    pending.push(*c);
                }
            }
        }
    }
    out
}

type Decoded = Result<(String, usize), DecodeError>;

fn byte_instruction(chunk: &Chunk, op: OpCode, offset: usize) -> Decoded {
    let slot = chunk.read_u8(offset + 1)?;
    Ok((format!("{:<16} {slot:>4}", op.mnemonic()), offset + 2))
}

fn constant_instruction(heap: &Heap, chunk: &Chunk, op: OpCode, offset: usize) -> Decoded {
    let index = chunk.read_u8(offset + 1)?;
    let value = constant_text(heap, chunk, index);
    Ok((
        format!("{:<16} {index:>4} '{value}'", op.mnemonic()),
        offset + 2,
    ))
}

fn jump_instruction(chunk: &Chunk, op: OpCode, sign: i64, offset: usize) -> Decoded {
    let jump = chunk.read_u16(offset + 1)? as i64;
    let target = offset as i64 + 3 + sign * jump;
    Ok((
        format!("{:<16} {offset:>4} -> {target}", op.mnemonic()),
        offset + 3,
    ))
}

fn invoke_instruction(heap: &Heap, chunk: &Chunk, op: OpCode, offset: usize) -> Decoded {
    let index = chunk.read_u8(offset + 1)?;
    let arg_count = chunk.read_u8(offset + 2)?;
    let value = constant_text(heap, chunk, index);
    Ok((
        format!(
            "{:<16} ({arg_count} args) {index:>4} '{value}'",
            op.mnemonic()
        ),
        offset + 3,
    ))
}

fn closure_instruction(heap: &Heap, chunk: &Chunk, offset: usize) -> Decoded {
    let index = chunk.read_u8(offset + 1)?;
    let mut text = format!(
        "{:<16} {index:>4} {}",
        OpCode::Closure.mnemonic(),
        constant_text(heap, chunk, index)
    );

    let upvalue_count = match chunk.constants.get(index as usize) {
        Some(Value::Obj(r)) => match heap.get(*r) {
            Object::Function(f) => f.upvalue_count,
            _ => 0,
        },
        _ => 0,
    };

    let mut next = offset + 2;
    for _ in 0..upvalue_count {
        let is_local = chunk.read_u8(next)?;
        let slot = chunk.read_u8(next + 1)?;
        let kind = if is_local == 1 { "local" } else { "upvalue" };
        text.push_str(&format!(
            "\n{next:04}      |                     {kind} {slot}"
        ));
        next += 2;
    }
    Ok((text, next))
}

fn constant_text(heap: &Heap, chunk: &Chunk, index: u8) -> String {
    match chunk.constants.get(index as usize) {
        Some(&value) => heap.display(value).to_string(),
        None => String::from("<bad constant>"),
    }
}
