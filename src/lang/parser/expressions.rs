use super::*;
use super::symbol_table::Resolved;
use crate::lang::lexer::{parse_number, unescape_string};

/// An expression whose final access has not been emitted yet. Keeping it
/// pending lets an assignment turn it into a store instead of a load.
#[derive(Clone, Copy)]
pub(super) enum Access<'a> {
    // Value is on the stack
    Value,
    Variable{ name: &'a [u8], span: InputSpan, resolved: Resolved },
    // Container and key are on the stack
    Element,
}

// Binary operators by precedence level, lowest first
const BINARY_LEVELS: &[&[(TokenKind, OpCode)]] = &[
    &[(TokenKind::OrOr, OpCode::JumpIfTrueOrPop)],
    &[(TokenKind::AndAnd, OpCode::JumpIfFalseOrPop)],
    &[(TokenKind::Or, OpCode::BitOr)],
    &[(TokenKind::Caret, OpCode::BitXor)],
    &[(TokenKind::And, OpCode::BitAnd)],
    &[(TokenKind::EqualEqual, OpCode::Eq), (TokenKind::NotEqual, OpCode::Ne)],
    &[
        (TokenKind::Less, OpCode::Lt), (TokenKind::LessEquals, OpCode::Le),
        (TokenKind::Greater, OpCode::Gt), (TokenKind::GreaterEquals, OpCode::Ge),
    ],
    &[(TokenKind::ShiftLeft, OpCode::Shl), (TokenKind::ShiftRight, OpCode::Shr)],
    &[(TokenKind::Plus, OpCode::Add), (TokenKind::Minus, OpCode::Sub)],
    &[(TokenKind::Star, OpCode::Mul), (TokenKind::Slash, OpCode::Div), (TokenKind::Percent, OpCode::Mod)],
];

fn assignment_operator(kind: TokenKind) -> Option<Option<OpCode>> {
    match kind {
        TokenKind::Equal => Some(None),
        TokenKind::PlusEquals => Some(Some(OpCode::Add)),
        TokenKind::MinusEquals => Some(Some(OpCode::Sub)),
        TokenKind::StarEquals => Some(Some(OpCode::Mul)),
        TokenKind::SlashEquals => Some(Some(OpCode::Div)),
        TokenKind::PercentEquals => Some(Some(OpCode::Mod)),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    /// Parses an expression, leaving exactly one value on the stack.
    pub(super) fn parse_expression(&mut self) -> Result<(), ParseError> {
        self.parse_assign_expression()
    }

    pub(super) fn parse_assign_expression(&mut self) -> Result<(), ParseError> {
        self.enter_expression()?;

        let access = self.parse_ternary_expression()?;
        let op_token = self.lexer.peek()?;
        match assignment_operator(op_token.kind) {
            Some(operator) => {
                self.lexer.next_token()?;
                match access {
                    Access::Value => {
                        return Err(self.error_at_token(
                            ParseErrorKind::Syntax, op_token,
                            format!("cannot assign to this expression using {}", op_token.kind.describe())
                        ));
                    },
                    Access::Variable{ .. } => {
                        if let Some(op) = operator {
                            self.materialize(access)?;
                            self.parse_assign_expression()?;
                            self.emitter().emit_op(op);
                        } else {
                            self.parse_assign_expression()?;
                        }
                        self.store(access)?;
                    },
                    Access::Element => {
                        if let Some(op) = operator {
                            self.emitter().emit_op(OpCode::Dup2);
                            self.emitter().emit_op(OpCode::GetElem);
                            self.parse_assign_expression()?;
                            self.emitter().emit_op(op);
                        } else {
                            self.parse_assign_expression()?;
                        }
                        self.emitter().emit_op(OpCode::SetElem);
                    }
                }
            },
            None => self.materialize(access)?,
        }

        self.leave_expression();
        Ok(())
    }

    fn parse_ternary_expression(&mut self) -> Result<Access<'a>, ParseError> {
        let access = self.parse_binary_expression(0)?;
        if self.lexer.peek()?.kind != TokenKind::Question {
            return Ok(access);
        }

        self.materialize(access)?;
        self.lexer.next_token()?;
        let else_label = self.emitter().new_label();
        let end_label = self.emitter().new_label();

        self.emitter().emit_jump(OpCode::JumpIfFalse, else_label);
        let depth = self.emitter().depth();
        self.parse_assign_expression()?;
        self.emitter().emit_jump(OpCode::Jump, end_label);

        self.expect(TokenKind::Colon)?;
        self.emitter().place_label(else_label);
        self.emitter().set_depth(depth);
        self.parse_assign_expression()?;
        self.emitter().place_label(end_label);

        Ok(Access::Value)
    }

    fn parse_binary_expression(&mut self, level: usize) -> Result<Access<'a>, ParseError> {
        if level >= BINARY_LEVELS.len() {
            return self.parse_unary_expression();
        }

        let mut access = self.parse_binary_expression(level + 1)?;
        loop {
            let kind = self.lexer.peek()?.kind;
            let op = match BINARY_LEVELS[level].iter().find(|(k, _)| *k == kind) {
                Some((_, op)) => *op,
                None => return Ok(access),
            };

            self.materialize(access)?;
            self.lexer.next_token()?;
            if op.is_jump() {
                // Short circuiting: the left operand is the result when the
                // jump is taken, otherwise it is popped.
                let end_label = self.emitter().new_label();
                self.emitter().emit_jump(op, end_label);
                let rhs = self.parse_binary_expression(level + 1)?;
                self.materialize(rhs)?;
                self.emitter().place_label(end_label);
            } else {
                let rhs = self.parse_binary_expression(level + 1)?;
                self.materialize(rhs)?;
                self.emitter().emit_op(op);
            }
            access = Access::Value;
        }
    }

    fn parse_unary_expression(&mut self) -> Result<Access<'a>, ParseError> {
        let op = match self.lexer.peek()?.kind {
            TokenKind::Minus => OpCode::Neg,
            TokenKind::Exclamation => OpCode::Not,
            TokenKind::Tilde => OpCode::BitNot,
            _ => return self.parse_postfix_expression(),
        };

        self.enter_expression()?;
        self.lexer.next_token()?;
        let operand = self.parse_unary_expression()?;
        self.materialize(operand)?;
        self.emitter().emit_op(op);
        self.leave_expression();
        Ok(Access::Value)
    }

    fn parse_postfix_expression(&mut self) -> Result<Access<'a>, ParseError> {
        let mut access = self.parse_primary_expression()?;
        loop {
            let token = self.lexer.peek()?;
            match token.kind {
                TokenKind::OpenParen => {
                    self.materialize(access)?;
                    self.lexer.next_token()?;
                    let mut num_args = 0usize;
                    if self.lexer.peek()?.kind != TokenKind::CloseParen {
                        loop {
                            self.parse_assign_expression()?;
                            num_args += 1;
                            if self.lexer.peek()?.kind != TokenKind::Comma {
                                break;
                            }
                            self.lexer.next_token()?;
                        }
                    }
                    self.expect(TokenKind::CloseParen)?;
                    if num_args > self.options.max_locals {
                        return Err(self.error_at_token(
                            ParseErrorKind::TooManyLocals, token,
                            format!("too many arguments in call, at most {} are allowed", self.options.max_locals)
                        ));
                    }
                    self.emitter().emit(OpCode::Call, num_args as u16, 0);
                    access = Access::Value;
                },
                TokenKind::OpenSquare => {
                    self.materialize(access)?;
                    self.lexer.next_token()?;
                    self.parse_expression()?;
                    self.expect(TokenKind::CloseSquare)?;
                    access = Access::Element;
                },
                TokenKind::Dot => {
                    self.materialize(access)?;
                    self.lexer.next_token()?;
                    let ident = self.expect(TokenKind::Ident)?;
                    let name_idx = self.add_name(self.source.section_at_span(ident.span), ident.span)?;
                    self.emitter().emit(OpCode::PushString, name_idx, 0);
                    access = Access::Element;
                },
                _ => return Ok(access),
            }
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Access<'a>, ParseError> {
        let token = self.lexer.next_token()?;
        match token.kind {
            TokenKind::Number => {
                let text = self.source.section_at_span(token.span);
                let value = match parse_number(text) {
                    Some(value) => value,
                    None => return Err(self.error_at_token(
                        ParseErrorKind::Lexical, token, String::from("invalid number literal")
                    )),
                };
                self.emit_number(value, token.span)?;
            },
            TokenKind::String => {
                let value = unescape_string(self.source, token.span)?;
                let idx = self.add_string(&value, token.span)?;
                self.emitter().emit(OpCode::PushString, idx, 0);
            },
            TokenKind::KwTrue => self.emitter().emit_op(OpCode::PushTrue),
            TokenKind::KwFalse => self.emitter().emit_op(OpCode::PushFalse),
            TokenKind::KwUndefined => self.emitter().emit_op(OpCode::PushUndefined),
            TokenKind::KwNaN => self.emitter().emit_op(OpCode::PushNaN),
            TokenKind::Ident => {
                let name = self.source.section_at_span(token.span);
                let resolved = self.symbols.resolve(name)
                    .map_err(|e| self.symbol_error(e, token.span))?;
                return Ok(Access::Variable{ name, span: token.span, resolved });
            },
            TokenKind::OpenParen => {
                self.parse_expression()?;
                self.expect(TokenKind::CloseParen)?;
            },
            TokenKind::OpenSquare => {
                let mut num_elements = 0usize;
                while self.lexer.peek()?.kind != TokenKind::CloseSquare {
                    self.parse_assign_expression()?;
                    num_elements += 1;
                    if self.lexer.peek()?.kind != TokenKind::Comma {
                        break;
                    }
                    self.lexer.next_token()?;
                }
                self.expect(TokenKind::CloseSquare)?;
                if num_elements > u16::MAX as usize {
                    return Err(self.error_at_token(ParseErrorKind::TooManyConstants, token, String::from("array literal too large")));
                }
                self.emitter().emit(OpCode::MakeArray, num_elements as u16, 0);
            },
            TokenKind::OpenCurly => {
                let mut num_entries = 0usize;
                while self.lexer.peek()?.kind != TokenKind::CloseCurly {
                    self.parse_object_key()?;
                    self.expect(TokenKind::Colon)?;
                    self.parse_assign_expression()?;
                    num_entries += 1;
                    if self.lexer.peek()?.kind != TokenKind::Comma {
                        break;
                    }
                    self.lexer.next_token()?;
                }
                self.expect(TokenKind::CloseCurly)?;
                if num_entries > (u16::MAX / 2) as usize {
                    return Err(self.error_at_token(ParseErrorKind::TooManyConstants, token, String::from("object literal too large")));
                }
                self.emitter().emit(OpCode::MakeObject, num_entries as u16, 0);
            },
            TokenKind::KwDef => {
                self.parse_function(token)?;
            },
            _ => {
                return Err(self.error_at_token(
                    ParseErrorKind::Syntax, token,
                    format!("expected an expression, found {}", token.kind.describe())
                ));
            }
        }

        Ok(Access::Value)
    }

    fn parse_object_key(&mut self) -> Result<(), ParseError> {
        let token = self.lexer.next_token()?;
        let key = match token.kind {
            TokenKind::Ident | TokenKind::Number => {
                String::from_utf8_lossy(self.source.section_at_span(token.span)).into_owned()
            },
            TokenKind::String => unescape_string(self.source, token.span)?,
            _ => {
                return Err(self.error_at_token(
                    ParseErrorKind::Syntax, token,
                    format!("expected a property name, found {}", token.kind.describe())
                ));
            }
        };

        let idx = self.add_string(&key, token.span)?;
        self.emitter().emit(OpCode::PushString, idx, 0);
        Ok(())
    }

    fn emit_number(&mut self, value: f64, span: InputSpan) -> Result<(), ParseError> {
        if value == 0.0 && value.is_sign_positive() {
            self.emitter().emit_op(OpCode::PushZero);
        } else if value.fract() == 0.0 && value > 0.0 && value <= u16::MAX as f64 {
            self.emitter().emit(OpCode::PushInt, value as u16, 0);
        } else {
            let idx = self.add_number(value, span)?;
            self.emitter().emit(OpCode::PushNumber, idx, 0);
        }
        Ok(())
    }

    /// Emits the load of a pending access.
    fn materialize(&mut self, access: Access<'a>) -> Result<(), ParseError> {
        match access {
            Access::Value => {},
            Access::Variable{ name, span, resolved } => match resolved {
                Resolved::Local(slot) => self.emitter().emit(OpCode::LoadLocal, slot, 0),
                Resolved::Upvalue(idx) => self.emitter().emit(OpCode::LoadUpvalue, idx, 0),
                Resolved::Global => {
                    let name_idx = self.add_name(name, span)?;
                    self.emitter().emit(OpCode::LoadGlobal, name_idx, 0);
                }
            },
            Access::Element => self.emitter().emit_op(OpCode::GetElem),
        }
        Ok(())
    }

    /// Emits the store of the value on top of the stack into a variable. The
    /// value stays on the stack as the result of the assignment.
    fn store(&mut self, access: Access<'a>) -> Result<(), ParseError> {
        if let Access::Variable{ name, span, resolved } = access {
            match resolved {
                Resolved::Local(slot) => self.emitter().emit(OpCode::StoreLocal, slot, 0),
                Resolved::Upvalue(idx) => self.emitter().emit(OpCode::StoreUpvalue, idx, 0),
                Resolved::Global => {
                    let is_known = self.declared_globals.contains(name)
                        || (self.is_known_global)(&String::from_utf8_lossy(name));
                    if !is_known {
                        return Err(ParseError::new_error_at_span(
                            ParseErrorKind::UndefinedIdentifier, self.source, span,
                            format!("assignment to undeclared identifier '{}'", String::from_utf8_lossy(name))
                        ));
                    }
                    let name_idx = self.add_name(name, span)?;
                    self.emitter().emit(OpCode::StoreGlobal, name_idx, 0);
                }
            }
        }
        Ok(())
    }

    fn enter_expression(&mut self) -> Result<(), ParseError> {
        self.expr_depth += 1;
        if self.expr_depth > self.options.max_expr_depth {
            let token = self.lexer.peek()?;
            return Err(self.error_at_token(
                ParseErrorKind::ExpressionTooDeep, token,
                format!("expression nested too deeply, at most {} levels are allowed", self.options.max_expr_depth)
            ));
        }
        Ok(())
    }

    #[inline]
    fn leave_expression(&mut self) {
        self.expr_depth -= 1;
    }
}
