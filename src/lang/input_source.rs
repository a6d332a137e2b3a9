use std::fmt;
use std::fmt::Write;
use std::sync::{RwLock, RwLockReadGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPosition {
    pub line: u32,
    pub offset: u32,
}

impl InputPosition {
    pub(crate) fn with_offset(&self, offset: u32) -> Self {
        InputPosition { line: self.line, offset: self.offset + offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpan {
    pub begin: InputPosition,
    pub end: InputPosition,
}

impl InputSpan {
    #[inline]
    pub fn from_positions(begin: InputPosition, end: InputPosition) -> Self {
        Self { begin, end }
    }
}

/// Wrapper around script text with an optional filename. The text is never
/// modified: the lexer walks it with its own cursor and tokens only store
/// positions into it.
pub struct InputSource {
    pub(crate) filename: String,
    pub(crate) input: Vec<u8>,
    // The offset_lookup is built on-demand upon attempting to report an error.
    offset_lookup: RwLock<Vec<u32>>,
}

impl InputSource {
    pub fn new(filename: String, input: Vec<u8>) -> Self {
        Self{
            filename,
            input,
            offset_lookup: RwLock::new(Vec::new()),
        }
    }

    pub fn from_str(filename: &str, text: &str) -> Self {
        Self::new(filename.to_string(), Vec::from(text.as_bytes()))
    }

    #[cfg(test)]
    pub fn new_test(input: &str) -> Self {
        Self::from_str("test", input)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.input.len()
    }

    #[inline]
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.input.get(offset).copied()
    }

    #[inline]
    pub fn section_at_pos(&self, start: InputPosition, end: InputPosition) -> &[u8] {
        &self.input[start.offset as usize..end.offset as usize]
    }

    #[inline]
    pub fn section_at_span(&self, span: InputSpan) -> &[u8] {
        &self.input[span.begin.offset as usize..span.end.offset as usize]
    }

    fn get_lookup(&self) -> RwLockReadGuard<Vec<u32>> {
        // Once constructed the lookup always contains at least two elements.
        // A poisoned lock only means a panicking reader, the data is fine.
        {
            let lookup = self.offset_lookup.read().unwrap_or_else(|e| e.into_inner());
            if !lookup.is_empty() {
                return lookup;
            }
        }

        {
            let mut lookup = self.offset_lookup.write().unwrap_or_else(|e| e.into_inner());
            if lookup.is_empty() {
                // Line number (!) to offset lookup, so offset by 1.
                lookup.push(0); // line 0: never used
                lookup.push(0); // first line: first character
                for (char_idx, c) in self.input.iter().enumerate() {
                    if *c == b'\n' {
                        lookup.push(char_idx as u32 + 1);
                    }
                }
                lookup.push(self.input.len() as u32 + 1); // for lookup_line_end
            }
        }

        self.offset_lookup.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Retrieves offset at which line starts (right after newline)
    fn lookup_line_start_offset(&self, line_number: u32) -> u32 {
        let lookup = self.get_lookup();
        let idx = (line_number as usize).min(lookup.len() - 2);
        lookup[idx]
    }

    /// Retrieves offset at which line ends (at the newline character or the
    /// preceding carriage feed for \r\n-encoded newlines)
    fn lookup_line_end_offset(&self, line_number: u32) -> u32 {
        let lookup = self.get_lookup();
        let idx = (line_number as usize + 1).min(lookup.len() - 1);
        let mut offset = lookup[idx] - 1;
        if offset as usize > self.input.len() {
            offset = self.input.len() as u32;
        }

        let start = self.lookup_line_start_offset(line_number);
        if offset > start && self.input.get(offset as usize - 1) == Some(&b'\r') {
            offset -= 1;
        }
        offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Info,
    Error
}

/// What went wrong during compilation. Each kind maps onto its own status
/// code, see `ParseError::code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Lexical,
    Syntax,
    UndefinedIdentifier,
    TooManyLocals,
    ExpressionTooDeep,
    FunctionTooLarge,
    TooManyConstants,
}

impl ParseErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            ParseErrorKind::Lexical | ParseErrorKind::Syntax => -1,
            ParseErrorKind::UndefinedIdentifier => -2,
            ParseErrorKind::TooManyLocals => -3,
            ParseErrorKind::ExpressionTooDeep => -4,
            ParseErrorKind::FunctionTooLarge => -5,
            ParseErrorKind::TooManyConstants => -6,
        }
    }
}

#[derive(Debug)]
pub struct ParseErrorStatement {
    pub(crate) statement_kind: StatementKind,
    pub(crate) line: u32,
    pub(crate) start_column: u32,
    pub(crate) end_column: u32,
    pub(crate) filename: String,
    pub(crate) context: String,
    pub(crate) message: String,
}

impl ParseErrorStatement {
    fn from_source_at_pos(statement_kind: StatementKind, source: &InputSource, position: InputPosition, message: String) -> Self {
        let end = position.with_offset(1);
        Self::from_source_at_span(statement_kind, source, InputSpan::from_positions(position, end), message)
    }

    fn from_source_at_span(statement_kind: StatementKind, source: &InputSource, span: InputSpan, message: String) -> Self {
        debug_assert!(span.end.offset >= span.begin.offset);

        // Only the first line of a multi-line span is shown
        let line_start = source.lookup_line_start_offset(span.begin.line);
        let line_end = source.lookup_line_end_offset(span.begin.line);
        let context = Self::create_context(source, line_start as usize, line_end as usize);

        let start_column = span.begin.offset.saturating_sub(line_start) + 1;
        let end_column = if span.end.line == span.begin.line {
            (span.end.offset.saturating_sub(line_start) + 1).max(start_column + 1)
        } else {
            (line_end.saturating_sub(line_start) + 1).max(start_column + 1)
        };

        Self{
            statement_kind,
            line: span.begin.line,
            start_column,
            end_column,
            filename: source.filename.clone(),
            context,
            message,
        }
    }

    /// Produces context from source
    fn create_context(source: &InputSource, start: usize, end: usize) -> String {
        let end = end.min(source.input.len());
        let start = start.min(end);
        String::from_utf8_lossy(&source.input[start..end]).to_string()
    }
}

impl fmt::Display for ParseErrorStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Write kind of statement and message
        match self.statement_kind {
            StatementKind::Info => f.write_str(" INFO: ")?,
            StatementKind::Error => f.write_str("ERROR: ")?,
        }
        f.write_str(&self.message)?;
        f.write_char('\n')?;

        // Write originating file/line/column
        f.write_str(" +- ")?;
        if !self.filename.is_empty() {
            write!(f, "in {} ", self.filename)?;
        }
        writeln!(f, "at {}:{}", self.line, self.start_column)?;

        // Tabs are shown as 4 spaces, both in the context and in the
        // annotation underneath it
        fn transform_context(source: &str, target: &mut String) {
            for char in source.chars() {
                if char == '\t' {
                    target.push_str("    ");
                } else {
                    target.push(char);
                }
            }
        }

        fn extend_annotation(first_col: u32, last_col: u32, source: &str, target: &mut String, extend_char: char) {
            for (char_idx, char) in source.chars().enumerate().skip(first_col as usize - 1) {
                if char_idx + 1 >= last_col as usize {
                    break;
                }

                if char == '\t' {
                    for _ in 0..4 { target.push(extend_char); }
                } else {
                    target.push(extend_char);
                }
            }
        }

        writeln!(f, " | ")?;

        let mut context = String::with_capacity(128);
        let mut annotation = String::with_capacity(128);

        context.push_str(" | ");
        transform_context(&self.context, &mut context);
        context.push('\n');
        f.write_str(&context)?;

        annotation.push_str(" | ");
        extend_annotation(1, self.start_column, &self.context, &mut annotation, ' ');
        let before = annotation.len();
        extend_annotation(self.start_column, self.end_column, &self.context, &mut annotation, '~');
        if annotation.len() == before {
            // Error at end of line or end of input
            annotation.push('~');
        }
        annotation.push('\n');
        f.write_str(&annotation)
    }
}

#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) statements: Vec<ParseErrorStatement>
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.statements.is_empty() {
            return Ok(())
        }

        self.statements[0].fmt(f)?;
        for statement in self.statements.iter().skip(1) {
            writeln!(f)?;
            statement.fmt(f)?;
        }

        Ok(())
    }
}

impl ParseError {
    pub fn new_error_at_pos(kind: ParseErrorKind, source: &InputSource, position: InputPosition, message: String) -> Self {
        Self{ kind, statements: vec!(ParseErrorStatement::from_source_at_pos(
            StatementKind::Error, source, position, message
        )) }
    }

    pub fn new_error_str_at_pos(kind: ParseErrorKind, source: &InputSource, position: InputPosition, message: &str) -> Self {
        Self::new_error_at_pos(kind, source, position, message.to_string())
    }

    pub fn new_error_at_span(kind: ParseErrorKind, source: &InputSource, span: InputSpan, message: String) -> Self {
        Self{ kind, statements: vec!(ParseErrorStatement::from_source_at_span(
            StatementKind::Error, source, span, message
        )) }
    }

    pub fn new_error_str_at_span(kind: ParseErrorKind, source: &InputSource, span: InputSpan, message: &str) -> Self {
        Self::new_error_at_span(kind, source, span, message.to_string())
    }

    pub fn with_info_str_at_span(mut self, source: &InputSource, span: InputSpan, msg: &str) -> Self {
        self.statements.push(ParseErrorStatement::from_source_at_span(
            StatementKind::Info, source, span, msg.to_string()
        ));
        self
    }

    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }

    /// Source line of the first (error) statement.
    pub fn line(&self) -> u32 {
        self.statements.first().map(|s| s.line).unwrap_or(0)
    }

    pub fn message(&self) -> &str {
        self.statements.first().map(|s| s.message.as_str()).unwrap_or("")
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}
