/// parser/mod.rs
///
/// Single pass compiler. The recursive descent parser emits code for each
/// production as soon as it is recognized, no syntax tree is built. Statements
/// live in this file, expressions in `expressions.rs`.

mod emitter;
mod expressions;
pub(crate) mod symbol_table;

use std::collections::{HashMap, HashSet};

use super::input_source::{InputSource, InputSpan, ParseError, ParseErrorKind};
use super::lexer::Lexer;
use super::tokens::{Token, TokenKind};
use super::bytecode::OpCode;
use super::{CompileOptions, FunctionDef, Program};

use emitter::{EmitError, FunctionEmitter, Label};
use symbol_table::{SymbolError, SymbolTable, UpvalueSource};

// Trace output of the compiler
macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "compiler", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "compiler", $format, $($args),*);
    };
}

/// Jump targets of the innermost loop
struct LoopLabels {
    break_to: Label,
    continue_to: Label,
}

struct FunctionState {
    emitter: FunctionEmitter,
    index: usize,
    loops: Vec<LoopLabels>,
}

pub(crate) struct Parser<'a> {
    source: &'a InputSource,
    lexer: Lexer<'a>,
    options: &'a CompileOptions,
    is_known_global: &'a dyn Fn(&str) -> bool,
    symbols: SymbolTable<'a>,
    functions: Vec<FunctionState>,
    // Constant pools, deduplicated
    numbers: Vec<f64>,
    number_lookup: HashMap<u64, u16>,
    strings: Vec<Box<str>>,
    string_lookup: HashMap<Box<str>, u16>,
    compiled: Vec<Option<FunctionDef>>,
    declared_globals: HashSet<&'a [u8]>,
    expr_depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a InputSource, options: &'a CompileOptions, is_known_global: &'a dyn Fn(&str) -> bool) -> Self {
        Self{
            source,
            lexer: Lexer::new(source),
            options,
            is_known_global,
            symbols: SymbolTable::new(options.max_locals.max(1)),
            functions: vec![FunctionState{ emitter: FunctionEmitter::new(), index: 0, loops: Vec::new() }],
            numbers: Vec::new(),
            number_lookup: HashMap::new(),
            strings: Vec::new(),
            string_lookup: HashMap::new(),
            compiled: vec![None],
            declared_globals: HashSet::new(),
            expr_depth: 0,
        }
    }

    pub(crate) fn compile(mut self) -> Result<Program, ParseError> {
        self.hoist_declarations(false)?;
        loop {
            let token = self.lexer.peek()?;
            if token.kind == TokenKind::Eof {
                break;
            }
            self.parse_statement()?;
        }

        // The value of the last expression statement is the unit's result
        let end = self.lexer.peek()?;
        self.emitter().emit(OpCode::LoadLocal, 0, 0);
        self.emitter().emit_op(OpCode::Return);

        let state = match self.functions.pop() {
            Some(state) => state,
            None => return Err(self.error_str_at_span(ParseErrorKind::Syntax, end.span, "unbalanced function nesting")),
        };
        let main = state.emitter.finish(1, 0, &[], false)
            .map_err(|e| self.emit_error(e, end.span))?;
        self.compiled[0] = Some(main);

        let mut functions = Vec::with_capacity(self.compiled.len());
        for def in self.compiled.into_iter() {
            match def {
                Some(def) => functions.push(def),
                None => return Err(ParseError::new_error_str_at_span(
                    ParseErrorKind::Syntax, self.source, end.span, "incomplete function"
                )),
            }
        }

        debug_log!("compiled {} functions, {} numbers, {} strings", functions.len(), self.numbers.len(), self.strings.len());
        Ok(Program{ numbers: self.numbers, strings: self.strings, functions })
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<(), ParseError> {
        let token = self.lexer.peek()?;
        match token.kind {
            TokenKind::KwVar => {
                self.parse_var_statement()?;
                self.consume_optional_semicolon()
            },
            TokenKind::KwDef => self.parse_def_statement(),
            TokenKind::KwIf => self.parse_if_statement(),
            TokenKind::KwWhile => self.parse_while_statement(),
            TokenKind::KwFor => self.parse_for_statement(),
            TokenKind::KwBreak | TokenKind::KwContinue => self.parse_loop_jump(),
            TokenKind::KwReturn => self.parse_return_statement(),
            TokenKind::OpenCurly => self.parse_block(),
            TokenKind::SemiColon => {
                self.lexer.next_token()?;
                Ok(())
            },
            _ => {
                self.parse_expression()?;
                if self.symbols.is_top_level() {
                    self.emitter().emit(OpCode::StoreLocal, 0, 0);
                }
                self.emitter().emit_op(OpCode::Pop);
                self.consume_optional_semicolon()
            }
        }
    }

    fn parse_block(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::OpenCurly)?;
        loop {
            let token = self.lexer.peek()?;
            match token.kind {
                TokenKind::CloseCurly => {
                    self.lexer.next_token()?;
                    return Ok(());
                },
                TokenKind::Eof => {
                    return Err(self.error_str_at_span(ParseErrorKind::Syntax, token.span, "expected '}', found end of input"));
                },
                _ => self.parse_statement()?,
            }
        }
    }

    /// Parses `var a = 1, b` without the trailing semicolon, as it is shared
    /// with the initializer of a for loop.
    fn parse_var_statement(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::KwVar)?;
        loop {
            let ident = self.expect(TokenKind::Ident)?;
            let name = self.source.section_at_span(ident.span);
            let has_initializer = self.lexer.peek()?.kind == TokenKind::Equal;
            if has_initializer {
                self.lexer.next_token()?;
            }

            if self.symbols.is_top_level() {
                let name_idx = self.add_name(name, ident.span)?;
                self.declared_globals.insert(name);
                if has_initializer {
                    self.parse_assign_expression()?;
                    self.emitter().emit(OpCode::DefineGlobal, name_idx, 0);
                } else {
                    self.emitter().emit(OpCode::DeclareGlobal, name_idx, 0);
                }
            } else {
                let slot = self.symbols.declare_local(name)
                    .map_err(|e| self.symbol_error(e, ident.span))?;
                if has_initializer {
                    self.parse_assign_expression()?;
                    self.emitter().emit(OpCode::StoreLocal, slot, 0);
                    self.emitter().emit_op(OpCode::Pop);
                }
            }

            if self.lexer.peek()?.kind != TokenKind::Comma {
                return Ok(());
            }
            self.lexer.next_token()?;
        }
    }

    fn parse_def_statement(&mut self) -> Result<(), ParseError> {
        let def_token = self.expect(TokenKind::KwDef)?;
        let ident = self.lexer.next_token()?;
        if ident.kind != TokenKind::Ident {
            return Err(self.error_at_token(
                ParseErrorKind::Syntax, ident,
                format!("expected a function name, found {}", ident.kind.describe())
            ).with_info_str_at_span(self.source, def_token.span, "function definition starts here"));
        }
        let name = self.source.section_at_span(ident.span);

        if self.symbols.is_top_level() {
            let name_idx = self.add_name(name, ident.span)?;
            self.declared_globals.insert(name);
            self.parse_function(def_token)?;
            self.emitter().emit(OpCode::DefineGlobal, name_idx, 0);
        } else {
            // Declared before the body, so the function can refer to itself
            let slot = self.symbols.declare_local(name)
                .map_err(|e| self.symbol_error(e, ident.span))?;
            self.parse_function(def_token)?;
            self.emitter().emit(OpCode::StoreLocal, slot, 0);
            self.emitter().emit_op(OpCode::Pop);
        }

        Ok(())
    }

    fn parse_if_statement(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::KwIf)?;
        self.parse_condition()?;

        let else_label = self.emitter().new_label();
        self.emitter().emit_jump(OpCode::JumpIfFalse, else_label);
        self.parse_statement()?;

        if self.lexer.peek()?.kind == TokenKind::KwElse {
            self.lexer.next_token()?;
            let end_label = self.emitter().new_label();
            self.emitter().emit_jump(OpCode::Jump, end_label);
            self.emitter().place_label(else_label);
            self.parse_statement()?;
            self.emitter().place_label(end_label);
        } else {
            self.emitter().place_label(else_label);
        }

        Ok(())
    }

    fn parse_while_statement(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::KwWhile)?;
        let start_label = self.emitter().new_label();
        let end_label = self.emitter().new_label();

        self.emitter().place_label(start_label);
        self.parse_condition()?;
        self.emitter().emit_jump(OpCode::JumpIfFalse, end_label);

        self.parse_loop_body(end_label, start_label)?;
        self.emitter().emit_jump(OpCode::Jump, start_label);
        self.emitter().place_label(end_label);
        Ok(())
    }

    fn parse_for_statement(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::KwFor)?;
        self.expect(TokenKind::OpenParen)?;

        // Initializer
        match self.lexer.peek()?.kind {
            TokenKind::KwVar => self.parse_var_statement()?,
            TokenKind::SemiColon => {},
            _ => {
                self.parse_expression()?;
                self.emitter().emit_op(OpCode::Pop);
            }
        }
        self.expect(TokenKind::SemiColon)?;

        // Condition
        let cond_label = self.emitter().new_label();
        let end_label = self.emitter().new_label();
        self.emitter().place_label(cond_label);
        if self.lexer.peek()?.kind != TokenKind::SemiColon {
            self.parse_expression()?;
            self.emitter().emit_jump(OpCode::JumpIfFalse, end_label);
        }
        self.expect(TokenKind::SemiColon)?;

        // Step, placed before the body and jumped over on the first pass
        let step_label = if self.lexer.peek()?.kind != TokenKind::CloseParen {
            let body_label = self.emitter().new_label();
            let step_label = self.emitter().new_label();
            self.emitter().emit_jump(OpCode::Jump, body_label);
            self.emitter().place_label(step_label);
            self.parse_expression()?;
            self.emitter().emit_op(OpCode::Pop);
            self.emitter().emit_jump(OpCode::Jump, cond_label);
            self.emitter().place_label(body_label);
            step_label
        } else {
            cond_label
        };
        self.expect(TokenKind::CloseParen)?;

        self.parse_loop_body(end_label, step_label)?;
        self.emitter().emit_jump(OpCode::Jump, step_label);
        self.emitter().place_label(end_label);
        Ok(())
    }

    fn parse_loop_body(&mut self, break_to: Label, continue_to: Label) -> Result<(), ParseError> {
        self.current().loops.push(LoopLabels{ break_to, continue_to });
        let result = self.parse_statement();
        self.current().loops.pop();
        result
    }

    fn parse_loop_jump(&mut self) -> Result<(), ParseError> {
        let token = self.lexer.next_token()?;
        let labels = self.current().loops.last().map(|l| (l.break_to, l.continue_to));
        let target = match labels {
            Some((break_to, _)) if token.kind == TokenKind::KwBreak => break_to,
            Some((_, continue_to)) => continue_to,
            None => {
                return Err(self.error_at_token(
                    ParseErrorKind::Syntax, token,
                    format!("{} outside of a loop", token.kind.describe())
                ));
            }
        };

        // Nothing after the jump runs, the next statement starts at the same depth
        let depth = self.emitter().depth();
        self.emitter().emit_jump(OpCode::Jump, target);
        self.emitter().set_depth(depth);
        self.consume_optional_semicolon()
    }

    fn parse_return_statement(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::KwReturn)?;
        let depth = self.emitter().depth();
        match self.lexer.peek()?.kind {
            TokenKind::SemiColon | TokenKind::CloseCurly | TokenKind::Eof => {
                self.emitter().emit_op(OpCode::ReturnUndefined);
            },
            _ => {
                self.parse_expression()?;
                self.emitter().emit_op(OpCode::Return);
            }
        }
        self.emitter().set_depth(depth);
        self.consume_optional_semicolon()
    }

    fn parse_condition(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::OpenParen)?;
        self.parse_expression()?;
        self.expect(TokenKind::CloseParen)?;
        Ok(())
    }

    /// Parses the parameter list and body of a function whose `def` keyword
    /// (and name, if any) was already consumed, and emits the code that
    /// creates the function value in the enclosing function.
    fn parse_function(&mut self, def_token: Token) -> Result<(), ParseError> {
        let index = self.compiled.len();
        if index > u16::MAX as usize {
            return Err(self.error_str_at_span(ParseErrorKind::TooManyConstants, def_token.span, "too many functions"));
        }
        self.compiled.push(None);
        self.symbols.push_function();
        self.functions.push(FunctionState{ emitter: FunctionEmitter::new(), index, loops: Vec::new() });

        self.expect(TokenKind::OpenParen)?;
        if self.lexer.peek()?.kind != TokenKind::CloseParen {
            loop {
                let ident = self.expect(TokenKind::Ident)?;
                let name = self.source.section_at_span(ident.span);
                self.symbols.declare_parameter(name)
                    .map_err(|e| self.symbol_error(e, ident.span))?;
                if self.lexer.peek()?.kind != TokenKind::Comma {
                    break;
                }
                self.lexer.next_token()?;
            }
        }
        self.expect(TokenKind::CloseParen)?;

        self.hoist_declarations(true)?;
        self.parse_block()?;
        self.emitter().emit_op(OpCode::ReturnUndefined);

        let scope = self.symbols.pop_function();
        let state = match self.functions.pop() {
            Some(state) => state,
            None => return Err(self.error_str_at_span(ParseErrorKind::Syntax, def_token.span, "unbalanced function nesting")),
        };
        debug_assert_eq!(state.index, index);

        let is_closure = !scope.upvalues.is_empty();
        let def = state.emitter.finish(scope.locals.len(), scope.arg_count, &scope.captured, is_closure)
            .map_err(|e| self.emit_error(e, def_token.span))?;
        debug_log!("function {}: {} locals, {} upvalues, {} bytes", index, def.var_count, scope.upvalues.len(), def.code.len());
        self.compiled[index] = Some(def);

        // Create the function value in the enclosing function
        if is_closure {
            for (_, upvalue) in scope.upvalues.iter() {
                match upvalue {
                    UpvalueSource::ParentLocal(slot) => self.emitter().emit(OpCode::PushCell, *slot, 0),
                    UpvalueSource::ParentUpvalue(idx) => self.emitter().emit(OpCode::PushUpvalue, *idx, 0),
                }
            }
            self.emitter().emit(OpCode::MakeClosure, index as u16, scope.upvalues.len() as u16);
        } else {
            self.emitter().emit(OpCode::PushFunction, index as u16, 0);
        }

        Ok(())
    }

    /// Declares every variable and named function of the code ahead before
    /// any of it is compiled, so that uses preceding a declaration resolve
    /// to the same slot. For a function body the scan ends at the body's
    /// closing brace, otherwise it covers the whole unit, whose names are
    /// globals.
    fn hoist_declarations(&mut self, in_body: bool) -> Result<(), ParseError> {
        for ident in scan_declarations(self.lexer.clone(), in_body) {
            let name = self.source.section_at_span(ident.span);
            if self.symbols.is_top_level() {
                self.declared_globals.insert(name);
            } else {
                self.symbols.declare_local(name)
                    .map_err(|e| self.symbol_error(e, ident.span))?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Utilities
    // -------------------------------------------------------------------------

    #[inline]
    fn current(&mut self) -> &mut FunctionState {
        let idx = self.functions.len() - 1;
        &mut self.functions[idx]
    }

    #[inline]
    fn emitter(&mut self) -> &mut FunctionEmitter {
        &mut self.current().emitter
    }

    fn consume_optional_semicolon(&mut self) -> Result<(), ParseError> {
        if self.lexer.peek()?.kind == TokenKind::SemiColon {
            self.lexer.next_token()?;
        }
        Ok(())
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let token = self.lexer.next_token()?;
        if token.kind != expected {
            return Err(self.error_at_token(
                ParseErrorKind::Syntax, token,
                format!("expected {}, found {}", expected.describe(), token.kind.describe())
            ));
        }
        Ok(token)
    }

    fn add_number(&mut self, value: f64, span: InputSpan) -> Result<u16, ParseError> {
        if let Some(idx) = self.number_lookup.get(&value.to_bits()) {
            return Ok(*idx);
        }
        if self.numbers.len() >= self.options.max_constants.min(u16::MAX as usize + 1) {
            return Err(self.error_str_at_span(ParseErrorKind::TooManyConstants, span, "too many number constants"));
        }

        let idx = self.numbers.len() as u16;
        self.numbers.push(value);
        self.number_lookup.insert(value.to_bits(), idx);
        Ok(idx)
    }

    fn add_string(&mut self, value: &str, span: InputSpan) -> Result<u16, ParseError> {
        if let Some(idx) = self.string_lookup.get(value) {
            return Ok(*idx);
        }
        if self.strings.len() >= self.options.max_constants.min(u16::MAX as usize + 1) {
            return Err(self.error_str_at_span(ParseErrorKind::TooManyConstants, span, "too many string constants"));
        }

        let idx = self.strings.len() as u16;
        let value: Box<str> = value.into();
        self.strings.push(value.clone());
        self.string_lookup.insert(value, idx);
        Ok(idx)
    }

    /// Adds an identifier to the string pool, used for global names.
    fn add_name(&mut self, name: &[u8], span: InputSpan) -> Result<u16, ParseError> {
        let name = String::from_utf8_lossy(name);
        self.add_string(&name, span)
    }

    fn error_at_token(&self, kind: ParseErrorKind, token: Token, message: String) -> ParseError {
        ParseError::new_error_at_span(kind, self.source, token.span, message)
    }

    fn error_str_at_span(&self, kind: ParseErrorKind, span: InputSpan, message: &str) -> ParseError {
        ParseError::new_error_str_at_span(kind, self.source, span, message)
    }

    fn symbol_error(&self, error: SymbolError, span: InputSpan) -> ParseError {
        match error {
            SymbolError::TooManyLocals => self.error_str_at_span(
                ParseErrorKind::TooManyLocals, span, "too many local variables in function"
            ),
            SymbolError::TooManyUpvalues => self.error_str_at_span(
                ParseErrorKind::TooManyLocals, span, "too many captured variables in function"
            ),
            SymbolError::DuplicateParameter => self.error_str_at_span(
                ParseErrorKind::Syntax, span, "duplicate parameter name"
            ),
        }
    }

    fn emit_error(&self, error: EmitError, span: InputSpan) -> ParseError {
        match error {
            EmitError::FunctionTooLarge => self.error_str_at_span(
                ParseErrorKind::FunctionTooLarge, span, "function exceeds the maximum code size"
            ),
            EmitError::StackTooDeep => self.error_str_at_span(
                ParseErrorKind::ExpressionTooDeep, span, "function exceeds the maximum stack depth"
            ),
        }
    }
}

/// Collects the names declared by `var` and `def` statements of one function,
/// skipping the bodies of nested functions. Scanning stops silently at the
/// first lexical error, which the parser reports once it gets there.
fn scan_declarations(mut lexer: Lexer<'_>, in_body: bool) -> Vec<Token> {
    let mut names = Vec::new();
    // Depth of braces, and of all brackets for separating declarators
    let mut curly_depth = 0i32;
    let mut nesting = 0i32;
    // Curly depth of the nested function body being skipped
    let mut nested_body: Option<i32> = None;
    // Bracket nesting of the `var` statement whose declarators are scanned
    let mut declarators: Option<i32> = None;
    let mut expect_name = false;

    loop {
        let token = match lexer.next_token() {
            Ok(token) => token,
            Err(_) => break,
        };
        if expect_name {
            expect_name = false;
            if token.kind == TokenKind::Ident {
                names.push(token);
                continue;
            }
        }

        match token.kind {
            TokenKind::Eof => break,
            TokenKind::OpenCurly => {
                curly_depth += 1;
                nesting += 1;
            },
            TokenKind::CloseCurly => {
                curly_depth -= 1;
                nesting -= 1;
                if in_body && curly_depth <= 0 {
                    break;
                }
                if nested_body.map_or(false, |depth| curly_depth < depth) {
                    nested_body = None;
                }
            },
            TokenKind::OpenParen | TokenKind::OpenSquare => nesting += 1,
            TokenKind::CloseParen | TokenKind::CloseSquare => nesting -= 1,
            _ => {},
        }
        if declarators.map_or(false, |at| nesting < at) {
            declarators = None;
        }
        if nested_body.is_some() {
            continue;
        }

        match token.kind {
            TokenKind::KwVar => {
                declarators = Some(nesting);
                expect_name = true;
            },
            TokenKind::Comma if declarators == Some(nesting) => expect_name = true,
            TokenKind::SemiColon if declarators == Some(nesting) => declarators = None,
            TokenKind::KwDef => {
                // Only named definitions declare a name, the body is never ours
                nested_body = Some(curly_depth + 1);
                if let Ok(next) = lexer.peek() {
                    if next.kind == TokenKind::Ident {
                        names.push(next);
                    }
                }
            },
            TokenKind::KwIf | TokenKind::KwWhile | TokenKind::KwFor |
            TokenKind::KwReturn | TokenKind::KwBreak | TokenKind::KwContinue => declarators = None,
            _ => {},
        }
    }

    names
}
