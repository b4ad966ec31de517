//! Single-pass compiler: tokens → bytecode, one chunk per function.
//!
//! Parsing and code generation happen together. Each function being
//! compiled has a [`FunctionState`]; nested function declarations push a
//! new state and pop it when the body ends, so the stack of states mirrors
//! lexical nesting and upvalue resolution walks it outward.
//!
//! Functions under construction are not yet heap objects. Their names and
//! constants are kept alive across collections by [`CompilerRoots`], which
//! also forwards to the embedder's roots (the VM's globals, in a REPL).
//!
//! Expression parsing lives in [`crate::expression`].

use log::{debug, log_enabled, Level};
use lox_common::{Chunk, ObjRef, OpCode, Value};
use lox_disassembler::disassemble_chunk;
use lox_heap::{GcRoots, Heap, ObjFunction, Object};

use crate::error::{CompileError, ErrorLocation};
use crate::scanner::{Scanner, Token, TokenKind};

/// Locals, upvalues and constants are addressed by a single byte.
pub const UINT8_COUNT: usize = u8::MAX as usize + 1;

/// Largest distance a jump or loop instruction can encode.
pub const MAX_JUMP: usize = u16::MAX as usize;

/// Most parameters a function may declare, and most arguments a call may
/// pass.
pub const MAX_ARITY: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Local<'src> {
    pub name: &'src str,
    /// `None` between declaration and the end of the initializer.
    pub depth: Option<usize>,
    pub is_captured: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpvalueRef {
    pub index: u8,
    pub is_local: bool,
}

/// Compile-time state of one function body.
#[derive(Debug)]
pub(crate) struct FunctionState<'src> {
    pub function: ObjFunction,
    pub kind: FunctionKind,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueRef>,
    pub scope_depth: usize,
}

impl<'src> FunctionState<'src> {
    fn new(kind: FunctionKind, name: Option<ObjRef>) -> Self {
        // Slot 0 holds the callee, or the receiver inside methods.
        let receiver = match kind {
            FunctionKind::Method | FunctionKind::Initializer => "this",
            FunctionKind::Script | FunctionKind::Function => "",
        };
        Self {
            function: ObjFunction {
                name,
                ..ObjFunction::default()
            },
            kind,
            locals: vec![Local {
                name: receiver,
                depth: Some(0),
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassState {
    pub has_superclass: bool,
}

/// Everything the compiler holds that the collector must not free: the
/// embedder's roots plus the name and constant pool of every function
/// still being compiled.
struct CompilerRoots<'a, 'src> {
    current: &'a FunctionState<'src>,
    enclosing: &'a [FunctionState<'src>],
    outer: &'a dyn GcRoots,
}

impl GcRoots for CompilerRoots<'_, '_> {
    fn mark_roots(&self, heap: &mut Heap) {
        self.outer.mark_roots(heap);
        for state in self.enclosing.iter().chain(std::iter::once(self.current)) {
            if let Some(name) = state.function.name {
                heap.mark_object(name);
            }
            for &constant in &state.function.chunk.constants {
                heap.mark_value(constant);
            }
        }
    }
}

pub(crate) struct Compiler<'src, 'a> {
    scanner: Scanner<'src>,
    pub(crate) current: Token<'src>,
    pub(crate) previous: Token<'src>,
    panic_mode: bool,
    errors: Vec<CompileError>,
    heap: &'a mut Heap,
    roots: &'a dyn GcRoots,
    pub(crate) state: FunctionState<'src>,
    enclosing: Vec<FunctionState<'src>>,
    pub(crate) classes: Vec<ClassState>,
}

impl<'src, 'a> Compiler<'src, 'a> {
    pub(crate) fn new(source: &'src str, heap: &'a mut Heap, roots: &'a dyn GcRoots) -> Self {
        let eof = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            line: 1,
        };
        Self {
            scanner: Scanner::new(source),
            current: eof,
            previous: eof,
            panic_mode: false,
            errors: Vec::new(),
            heap,
            roots,
            state: FunctionState::new(FunctionKind::Script, None),
            enclosing: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// Compile the whole source as the top-level script.
    pub(crate) fn compile(mut self) -> Result<ObjRef, Vec<CompileError>> {
        self.advance();
        while !self.match_token(TokenKind::Eof) {
            self.declaration();
        }
        let (function, _) = self.end_compiler();
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        Ok(self.heap.alloc(Object::Function(function), self.roots))
    }

    // ---- Heap access ----

    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        let roots = CompilerRoots {
            current: &self.state,
            enclosing: &self.enclosing,
            outer: self.roots,
        };
        self.heap.alloc(object, &roots)
    }

    pub(crate) fn intern(&mut self, chars: &str) -> ObjRef {
        let roots = CompilerRoots {
            current: &self.state,
            enclosing: &self.enclosing,
            outer: self.roots,
        };
        self.heap.intern(chars, &roots)
    }

    // ---- Token stream ----

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // ---- Errors ----

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::AtEnd,
            TokenKind::Error => ErrorLocation::None,
            _ => ErrorLocation::At(token.lexeme.to_string()),
        };
        self.errors.push(CompileError {
            line: token.line,
            location,
            message: message.to_string(),
        });
    }

    /// Skip tokens until something that looks like a statement boundary.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ---- Emission ----

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.state.function.chunk
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    pub(crate) fn emit_op_byte(&mut self, op: OpCode, byte: u8) {
        self.emit_op(op);
        self.emit_byte(byte);
    }

    /// Emit a jump with a placeholder operand; returns the operand offset
    /// for [`Compiler::patch_jump`].
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().len() - 2
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        // -2 for the operand itself.
        let jump = self.chunk().len() - offset - 2;
        if jump > MAX_JUMP {
            self.error("Too much code to jump over.");
        }
        let [hi, lo] = (jump.min(MAX_JUMP) as u16).to_be_bytes();
        let chunk = self.chunk();
        chunk.code[offset] = hi;
        chunk.code[offset + 1] = lo;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk().len() - loop_start + 2;
        if offset > MAX_JUMP {
            self.error("Loop body too large.");
        }
        let [hi, lo] = (offset.min(MAX_JUMP) as u16).to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk().add_constant(value);
        match u8::try_from(index) {
            Ok(index) => index,
            Err(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, index);
    }

    fn emit_return(&mut self) {
        if self.state.kind == FunctionKind::Initializer {
            self.emit_op_byte(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    // ---- Function states ----

    fn begin_function(&mut self, kind: FunctionKind) {
        let name = self.intern(self.previous.lexeme);
        let outer = std::mem::replace(&mut self.state, FunctionState::new(kind, Some(name)));
        self.enclosing.push(outer);
    }

    /// Finish the current function and return it with its captures.
    fn end_compiler(&mut self) -> (ObjFunction, Vec<UpvalueRef>) {
        self.emit_return();
        let outer = match self.enclosing.pop() {
            Some(outer) => outer,
            None => FunctionState::new(FunctionKind::Script, None),
        };
        let finished = std::mem::replace(&mut self.state, outer);

        if self.errors.is_empty() && log_enabled!(Level::Debug) {
            let name = match finished.function.name {
                Some(name) => self.heap.str(name),
                None => "<script>",
            };
            debug!(
                "{}",
                disassemble_chunk(self.heap, &finished.function.chunk, name)
            );
        }
        (finished.function, finished.upvalues)
    }

    // ---- Scopes and variables ----

    fn begin_scope(&mut self) {
        self.state.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.state.scope_depth -= 1;
        while let Some(local) = self.state.locals.last().copied() {
            if local.depth.is_some_and(|d| d <= self.state.scope_depth) {
                break;
            }
            if local.is_captured {
                self.emit_op(OpCode::CloseUpvalue);
            } else {
                self.emit_op(OpCode::Pop);
            }
            self.state.locals.pop();
        }
    }

    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let string = self.intern(name);
        self.make_constant(Value::Obj(string))
    }

    fn state_at(&mut self, level: usize) -> &mut FunctionState<'src> {
        if level == self.enclosing.len() {
            &mut self.state
        } else {
            &mut self.enclosing[level]
        }
    }

    /// Resolve `name` as a local of the function at `level` in the chain.
    fn resolve_local(&mut self, level: usize, name: &str) -> Option<u8> {
        let state = self.state_at(level);
        let (slot, local) = state
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name == name)?;
        let uninitialized = local.depth.is_none();
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(slot as u8)
    }

    /// Resolve `name` as an upvalue of the function at `level`, threading
    /// the capture through every function in between.
    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<u8> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.state_at(enclosing).locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(level, local, true));
        }
        let upvalue = self.resolve_upvalue(enclosing, name)?;
        Some(self.add_upvalue(level, upvalue, false))
    }

    fn add_upvalue(&mut self, level: usize, index: u8, is_local: bool) -> u8 {
        let candidate = UpvalueRef { index, is_local };
        let state = self.state_at(level);
        if let Some(existing) = state.upvalues.iter().position(|u| *u == candidate) {
            return existing as u8;
        }
        if state.upvalues.len() == UINT8_COUNT {
            self.error("Too many closure variables in function.");
            return 0;
        }
        state.upvalues.push(candidate);
        state.function.upvalue_count = state.upvalues.len();
        (state.upvalues.len() - 1) as u8
    }

    pub(crate) fn add_local(&mut self, name: &'src str) {
        if self.state.locals.len() == UINT8_COUNT {
            self.error("Too many local variables in function.");
            return;
        }
        self.state.locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
    }

    fn declare_variable(&mut self) {
        if self.state.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = self.state.scope_depth;
        let duplicate = self
            .state
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.map_or(true, |d| d >= depth))
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state.scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn mark_initialized(&mut self) {
        let depth = self.state.scope_depth;
        if depth == 0 {
            return;
        }
        if let Some(local) = self.state.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.state.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    /// Emit a read of `name`, or a write if an `=` follows and assignment
    /// is allowed here.
    pub(crate) fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let level = self.enclosing.len();
        let (get, set, arg) = if let Some(slot) = self.resolve_local(level, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(index) = self.resolve_upvalue(level, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, index)
        } else {
            let constant = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, constant)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set, arg);
        } else {
            self.emit_op_byte(get, arg);
        }
    }

    // ---- Declarations ----

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Class) {
            self.class_declaration();
        } else if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "Expect class name.");
        let class_name = self.previous;
        let name_constant = self.identifier_constant(class_name.lexeme);
        self.declare_variable();

        self.emit_op_byte(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.classes.push(ClassState {
            has_superclass: false,
        });

        if self.match_token(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "Expect superclass name.");
            self.variable(false);
            if class_name.lexeme == self.previous.lexeme {
                self.error("A class can't inherit from itself.");
            }

            self.begin_scope();
            self.add_local("super");
            self.define_variable(0);

            self.named_variable(class_name.lexeme, false);
            self.emit_op(OpCode::Inherit);
            if let Some(class) = self.classes.last_mut() {
                class.has_superclass = true;
            }
        }

        // The class stays on the stack while methods are bound to it.
        self.named_variable(class_name.lexeme, false);
        self.consume(TokenKind::LeftBrace, "Expect '{' before class body.");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after class body.");
        self.emit_op(OpCode::Pop);

        if self.classes.pop().is_some_and(|c| c.has_superclass) {
            self.end_scope();
        }
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "Expect method name.");
        let constant = self.identifier_constant(self.previous.lexeme);
        let kind = if self.previous.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            FunctionKind::Method
        };
        self.function(kind);
        self.emit_op_byte(OpCode::Method, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        // A function may refer to itself recursively.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(global);
    }

    fn function(&mut self, kind: FunctionKind) {
        self.begin_function(kind);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.state.function.arity += 1;
                if self.state.function.arity > MAX_ARITY {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        // No end_scope: the frame is discarded wholesale on return.
        let (function, upvalues) = self.end_compiler();
        let function = self.alloc(Object::Function(function));
        let constant = self.make_constant(Value::Obj(function));
        self.emit_op_byte(OpCode::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(u8::from(upvalue.is_local));
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenKind::Semicolon,
            "Expect ';' after variable declaration.",
        );
        self.define_variable(global);
    }

    // ---- Statements ----

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn return_statement(&mut self) {
        if self.state.kind == FunctionKind::Script {
            self.error("Can't return from top-level code.");
        }
        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
            return;
        }
        if self.state.kind == FunctionKind::Initializer {
            self.error("Can't return a value from an initializer.");
        }
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
        self.emit_op(OpCode::Return);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");
        if self.match_token(TokenKind::Semicolon) {
            // No initializer.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().len();
        let mut exit_jump = None;
        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            // The increment runs after the body: jump over it now, loop
            // back to it from the end of the body.
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }
}
