//! Pratt expression parsing.
//!
//! Each token kind has an optional prefix rule, an optional infix rule and
//! an infix precedence. The rules are dispatched with `match` over
//! [`TokenKind`] rather than a table of function pointers.

use lox_common::{OpCode, Value};

use crate::compiler::{Compiler, MAX_ARITY};
use crate::scanner::TokenKind;

/// Binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    /// One level tighter. Binary operators parse their right operand at
    /// this level, which makes them left associative.
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// Precedence of `kind` used as an infix operator.
fn infix_precedence(kind: TokenKind) -> Precedence {
    match kind {
        TokenKind::LeftParen | TokenKind::Dot => Precedence::Call,
        TokenKind::Minus | TokenKind::Plus => Precedence::Term,
        TokenKind::Slash | TokenKind::Star => Precedence::Factor,
        TokenKind::BangEqual | TokenKind::EqualEqual => Precedence::Equality,
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => Precedence::Comparison,
        TokenKind::And => Precedence::And,
        TokenKind::Or => Precedence::Or,
        _ => Precedence::None,
    }
}

impl<'src> Compiler<'src, '_> {
    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= infix_precedence(self.current.kind) {
            self.advance();
            self.infix(self.previous.kind, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Run the prefix rule for `kind`. Returns false if it has none.
    fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Nil | TokenKind::True | TokenKind::False => self.literal(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::This => self.this(),
            TokenKind::Super => self.super_(),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, kind: TokenKind, can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::Dot => self.dot(can_assign),
            TokenKind::And => self.and(),
            TokenKind::Or => self.or(),
            _ => self.binary(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => self.emit_op(OpCode::Negate),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(infix_precedence(operator).next());
        match operator {
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => {}
        }
    }

    fn number(&mut self) {
        match self.previous.lexeme.parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        // Strip the quotes.
        let contents = &lexeme[1..lexeme.len() - 1];
        let string = self.intern(contents);
        self.emit_constant(Value::Obj(string));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => self.emit_op(OpCode::Nil),
        }
    }

    pub(crate) fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.lexeme, can_assign);
    }

    fn this(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        // `this` is never assignable.
        self.variable(false);
    }

    fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.");
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.identifier_constant(self.previous.lexeme);

        self.named_variable("this", false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_byte(OpCode::SuperInvoke, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_op_byte(OpCode::GetSuper, name);
        }
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_byte(OpCode::Call, arg_count);
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.identifier_constant(self.previous.lexeme);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op_byte(OpCode::Invoke, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_op_byte(OpCode::GetProperty, name);
        }
    }

    fn argument_list(&mut self) -> u8 {
        let mut arg_count: usize = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if arg_count == MAX_ARITY {
                    self.error("Can't have more than 255 arguments.");
                }
                arg_count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        arg_count.min(MAX_ARITY) as u8
    }

    fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lox_heap::{Heap, NoRoots};

    fn code(source: &str) -> Vec<u8> {
        let mut heap = Heap::default();
        let function = Compiler::new(source, &mut heap, &NoRoots)
            .compile()
            .unwrap_or_else(|errors| panic!("unexpected errors: {errors:?}"));
        heap.function(function).chunk.code.clone()
    }

    fn messages(source: &str) -> Vec<String> {
        let mut heap = Heap::default();
        match Compiler::new(source, &mut heap, &NoRoots).compile() {
            Ok(_) => Vec::new(),
            Err(errors) => errors.into_iter().map(|e| e.message).collect(),
        }
    }

    fn ops(bytes: &[u8]) -> Vec<u8> {
        // Expression statements end in POP, NIL, RETURN.
        bytes[..bytes.len() - 3].to_vec()
    }

    #[test]
    fn precedence_ordering() {
        assert!(Precedence::Assignment < Precedence::Or);
        assert!(Precedence::Factor > Precedence::Term);
        assert_eq!(Precedence::Term.next(), Precedence::Factor);
        assert_eq!(Precedence::Primary.next(), Precedence::Primary);
    }

    #[test]
    fn factor_binds_tighter_than_term() {
        use OpCode::*;
        assert_eq!(
            ops(&code("1 + 2 * 3;")),
            vec![
                Constant as u8, 0, Constant as u8, 1, Constant as u8, 2, Multiply as u8,
                Add as u8
            ]
        );
    }

    #[test]
    fn binary_operators_are_left_associative() {
        use OpCode::*;
        assert_eq!(
            ops(&code("1 - 2 - 3;")),
            vec![
                Constant as u8, 0, Constant as u8, 1, Subtract as u8, Constant as u8, 2,
                Subtract as u8
            ]
        );
    }

    #[test]
    fn compound_comparisons_lower_to_two_ops() {
        use OpCode::*;
        assert_eq!(
            ops(&code("1 != 2;"))[4..],
            [Equal as u8, Not as u8]
        );
        assert_eq!(ops(&code("1 <= 2;"))[4..], [Greater as u8, Not as u8]);
        assert_eq!(ops(&code("1 >= 2;"))[4..], [Less as u8, Not as u8]);
    }

    #[test]
    fn unary_and_grouping() {
        use OpCode::*;
        assert_eq!(
            ops(&code("-(1 + 2);")),
            vec![Constant as u8, 0, Constant as u8, 1, Add as u8, Negate as u8]
        );
        assert_eq!(ops(&code("!true;")), vec![True as u8, Not as u8]);
    }

    #[test]
    fn and_short_circuits() {
        use OpCode::*;
        assert_eq!(
            ops(&code("true and false;")),
            vec![True as u8, JumpIfFalse as u8, 0, 2, Pop as u8, False as u8]
        );
    }

    #[test]
    fn or_short_circuits() {
        use OpCode::*;
        assert_eq!(
            ops(&code("false or true;")),
            vec![
                False as u8, JumpIfFalse as u8, 0, 3, Jump as u8, 0, 2, Pop as u8,
                True as u8
            ]
        );
    }

    #[test]
    fn method_call_fuses_into_invoke() {
        use OpCode::*;
        // a.b(1): GET_GLOBAL a, CONSTANT 1, INVOKE b 1
        assert_eq!(
            ops(&code("a.b(1);")),
            vec![GetGlobal as u8, 0, Constant as u8, 2, Invoke as u8, 1, 1]
        );
    }

    #[test]
    fn property_set_and_get() {
        use OpCode::*;
        assert_eq!(
            ops(&code("a.b = a.c;")),
            vec![
                GetGlobal as u8, 0, GetGlobal as u8, 2, GetProperty as u8, 3,
                SetProperty as u8, 1
            ]
        );
    }

    #[test]
    fn invalid_assignment_target() {
        assert_eq!(messages("1 + 2 = 3;"), vec!["Invalid assignment target."]);
        assert_eq!(messages("a * b = 3;"), vec!["Invalid assignment target."]);
        assert!(messages("a = b = 3;").is_empty());
    }

    #[test]
    fn missing_expression() {
        assert_eq!(messages("print;"), vec!["Expect expression."]);
    }

    #[test]
    fn this_and_super_outside_classes() {
        assert_eq!(messages("print this;"), vec!["Can't use 'this' outside of a class."]);
        assert_eq!(
            messages("fun f() { super.g(); }"),
            vec!["Can't use 'super' outside of a class."]
        );
        assert_eq!(
            messages("class A { f() { super.f(); } }"),
            vec!["Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn too_many_arguments() {
        let args = vec!["nil"; MAX_ARITY + 1].join(", ");
        assert_eq!(
            messages(&format!("f({args});")),
            vec!["Can't have more than 255 arguments."]
        );
    }
}
