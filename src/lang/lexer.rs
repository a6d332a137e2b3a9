/// lexer.rs
///
/// On-demand tokenizer. The parser pulls one token at a time and may peek a
/// single token ahead for its LL(1) decisions. Tokens only store positions
/// into the source buffer, so the source must outlive the lexer (and with it
/// the compilation of the unit).

use super::input_source::{InputPosition, InputSource, InputSpan, ParseError, ParseErrorKind};
use super::tokens::*;

#[derive(Clone)]
pub(crate) struct Lexer<'a> {
    source: &'a InputSource,
    offset: usize,
    line: u32,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a InputSource) -> Self {
        Self{ source, offset: 0, line: 1, peeked: None }
    }

    /// Returns the next token without consuming it.
    pub(crate) fn peek(&mut self) -> Result<Token, ParseError> {
        if let Some(token) = self.peeked {
            return Ok(token);
        }

        let token = self.scan()?;
        self.peeked = Some(token);
        Ok(token)
    }

    /// Consumes and returns the next token.
    pub(crate) fn next_token(&mut self) -> Result<Token, ParseError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }

        self.scan()
    }

    #[inline]
    fn pos(&self) -> InputPosition {
        InputPosition{ line: self.line, offset: self.offset as u32 }
    }

    #[inline]
    fn next(&self) -> Option<u8> {
        self.source.byte_at(self.offset)
    }

    #[inline]
    fn lookahead(&self, ahead: usize) -> Option<u8> {
        self.source.byte_at(self.offset + ahead)
    }

    fn consume(&mut self) {
        if let Some(c) = self.next() {
            if c == b'\n' {
                self.line += 1;
            }
            self.offset += 1;
        }
    }

    fn error_at(&self, pos: InputPosition, msg: &str) -> ParseError {
        ParseError::new_error_str_at_pos(ParseErrorKind::Lexical, self.source, pos, msg)
    }

    fn scan(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments()?;

        let begin = self.pos();
        let c = match self.next() {
            Some(c) => c,
            None => return Ok(Token::new(TokenKind::Eof, begin, begin)),
        };

        if is_identifier_start(c) {
            self.consume();
            while let Some(c) = self.next() {
                if !is_identifier_remaining(c) {
                    break;
                }
                self.consume();
            }
            let end = self.pos();
            let kind = keyword_or_ident(self.source.section_at_pos(begin, end));
            return Ok(Token::new(kind, begin, end));
        }

        if c.is_ascii_digit() {
            return self.consume_number(begin);
        }

        if c == b'"' || c == b'\'' {
            return self.consume_string(begin, c);
        }

        self.consume_punctuation(begin, c)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            match self.next() {
                Some(c) if c.is_ascii_whitespace() => self.consume(),
                Some(b'/') if self.lookahead(1) == Some(b'/') => {
                    while let Some(c) = self.next() {
                        if c == b'\n' {
                            break;
                        }
                        self.consume();
                    }
                },
                Some(b'/') if self.lookahead(1) == Some(b'*') => {
                    let begin = self.pos();
                    self.consume();
                    self.consume();

                    // Explicitly do not start with '*' as previous character,
                    // otherwise "/*/" would be a closed comment.
                    let mut prev_char = b' ';
                    let mut is_closed = false;
                    while let Some(c) = self.next() {
                        self.consume();
                        if prev_char == b'*' && c == b'/' {
                            is_closed = true;
                            break;
                        }
                        prev_char = c;
                    }

                    if !is_closed {
                        return Err(self.error_at(begin, "encountered unterminated block comment"));
                    }
                },
                _ => return Ok(()),
            }
        }
    }

    fn consume_number(&mut self, begin: InputPosition) -> Result<Token, ParseError> {
        if self.next() == Some(b'0') && matches!(self.lookahead(1), Some(b'x') | Some(b'X')) {
            self.consume();
            self.consume();
            let digits_start = self.offset;
            while let Some(c) = self.next() {
                if !c.is_ascii_hexdigit() {
                    break;
                }
                self.consume();
            }
            if self.offset == digits_start {
                return Err(self.error_at(begin, "hexadecimal literal without digits"));
            }
        } else {
            self.consume_digits();
            if self.next() == Some(b'.') && self.lookahead(1).map_or(false, |c| c.is_ascii_digit()) {
                self.consume();
                self.consume_digits();
            }
            if matches!(self.next(), Some(b'e') | Some(b'E')) {
                let mut ahead = 1;
                if matches!(self.lookahead(1), Some(b'+') | Some(b'-')) {
                    ahead = 2;
                }
                if self.lookahead(ahead).map_or(false, |c| c.is_ascii_digit()) {
                    for _ in 0..ahead {
                        self.consume();
                    }
                    self.consume_digits();
                } else {
                    return Err(self.error_at(self.pos(), "malformed exponent in number literal"));
                }
            }
        }

        if let Some(c) = self.next() {
            if is_identifier_remaining(c) {
                return Err(self.error_at(self.pos(), "invalid character in number literal"));
            }
        }

        Ok(Token::new(TokenKind::Number, begin, self.pos()))
    }

    fn consume_digits(&mut self) {
        while let Some(c) = self.next() {
            if !c.is_ascii_digit() {
                break;
            }
            self.consume();
        }
    }

    fn consume_string(&mut self, begin: InputPosition, quote: u8) -> Result<Token, ParseError> {
        self.consume();

        loop {
            match self.next() {
                None | Some(b'\n') => {
                    return Err(self.error_at(begin, "encountered unterminated string literal"));
                },
                Some(b'\\') => {
                    // Skip the escaped character, validated when unescaping
                    self.consume();
                    if self.next().is_none() || self.next() == Some(b'\n') {
                        return Err(self.error_at(begin, "encountered unterminated string literal"));
                    }
                    self.consume();
                },
                Some(c) if c == quote => {
                    self.consume();
                    break;
                },
                Some(_) => self.consume(),
            }
        }

        Ok(Token::new(TokenKind::String, begin, self.pos()))
    }

    fn consume_punctuation(&mut self, begin: InputPosition, first_char: u8) -> Result<Token, ParseError> {
        use TokenKind as TK;

        let second = self.lookahead(1);
        let (kind, len) = match (first_char, second) {
            (b'(', _) => (TK::OpenParen, 1),
            (b')', _) => (TK::CloseParen, 1),
            (b'{', _) => (TK::OpenCurly, 1),
            (b'}', _) => (TK::CloseCurly, 1),
            (b'[', _) => (TK::OpenSquare, 1),
            (b']', _) => (TK::CloseSquare, 1),
            (b',', _) => (TK::Comma, 1),
            (b'.', _) => (TK::Dot, 1),
            (b';', _) => (TK::SemiColon, 1),
            (b':', _) => (TK::Colon, 1),
            (b'?', _) => (TK::Question, 1),
            (b'~', _) => (TK::Tilde, 1),
            (b'^', _) => (TK::Caret, 1),
            (b'+', Some(b'=')) => (TK::PlusEquals, 2),
            (b'+', _) => (TK::Plus, 1),
            (b'-', Some(b'=')) => (TK::MinusEquals, 2),
            (b'-', _) => (TK::Minus, 1),
            (b'*', Some(b'=')) => (TK::StarEquals, 2),
            (b'*', _) => (TK::Star, 1),
            (b'/', Some(b'=')) => (TK::SlashEquals, 2),
            (b'/', _) => (TK::Slash, 1),
            (b'%', Some(b'=')) => (TK::PercentEquals, 2),
            (b'%', _) => (TK::Percent, 1),
            (b'!', Some(b'=')) => (TK::NotEqual, 2),
            (b'!', _) => (TK::Exclamation, 1),
            (b'=', Some(b'=')) => (TK::EqualEqual, 2),
            (b'=', _) => (TK::Equal, 1),
            (b'<', Some(b'<')) => (TK::ShiftLeft, 2),
            (b'<', Some(b'=')) => (TK::LessEquals, 2),
            (b'<', _) => (TK::Less, 1),
            (b'>', Some(b'>')) => (TK::ShiftRight, 2),
            (b'>', Some(b'=')) => (TK::GreaterEquals, 2),
            (b'>', _) => (TK::Greater, 1),
            (b'&', Some(b'&')) => (TK::AndAnd, 2),
            (b'&', _) => (TK::And, 1),
            (b'|', Some(b'|')) => (TK::OrOr, 2),
            (b'|', _) => (TK::Or, 1),
            (c, _) if !c.is_ascii() => {
                return Err(self.error_at(begin, "encountered a non-ASCII character"));
            },
            _ => {
                return Err(self.error_at(begin, "unexpected character"));
            }
        };

        for _ in 0..len {
            self.consume();
        }
        Ok(Token::new(kind, begin, self.pos()))
    }
}

/// Converts the text of a `Number` token into its value.
pub(crate) fn parse_number(text: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(text).ok()?;
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    text.parse::<f64>().ok()
}

/// Produces the contents of a `String` token with its escape sequences
/// resolved. Invalid escapes are reported at their position.
pub(crate) fn unescape_string(source: &InputSource, span: InputSpan) -> Result<String, ParseError> {
    let raw = source.section_at_span(span);
    debug_assert!(raw.len() >= 2);
    let inner = &raw[1..raw.len() - 1];

    let mut result = Vec::with_capacity(inner.len());
    let mut idx = 0;
    while idx < inner.len() {
        let c = inner[idx];
        if c == 0 {
            return Err(nul_in_string(source, span.begin.with_offset(idx as u32 + 1)));
        }
        if c != b'\\' {
            result.push(c);
            idx += 1;
            continue;
        }

        let escape_pos = span.begin.with_offset(idx as u32 + 1);
        let invalid = || ParseError::new_error_str_at_pos(
            ParseErrorKind::Lexical, source, escape_pos, "invalid escape sequence in string literal"
        );
        let escaped = *inner.get(idx + 1).ok_or_else(invalid)?;
        match escaped {
            b'n' => result.push(b'\n'),
            b't' => result.push(b'\t'),
            b'r' => result.push(b'\r'),
            b'0' => return Err(nul_in_string(source, escape_pos)),
            b'\\' => result.push(b'\\'),
            b'\'' => result.push(b'\''),
            b'"' => result.push(b'"'),
            b'x' => {
                let digits = inner.get(idx + 2..idx + 4).ok_or_else(invalid)?;
                let digits = std::str::from_utf8(digits).map_err(|_| invalid())?;
                let value = u8::from_str_radix(digits, 16).map_err(|_| invalid())?;
                if value >= 0x80 {
                    return Err(invalid());
                }
                if value == 0 {
                    return Err(nul_in_string(source, escape_pos));
                }
                result.push(value);
                idx += 2;
            },
            _ => return Err(invalid()),
        }
        idx += 2;
    }

    String::from_utf8(result).map_err(|_| ParseError::new_error_str_at_span(
        ParseErrorKind::Lexical, source, span, "string literal is not valid UTF-8"
    ))
}

// String constants are stored without a terminator and handed to hosts as
// C strings, so they cannot hold a NUL.
fn nul_in_string(source: &InputSource, pos: InputPosition) -> ParseError {
    ParseError::new_error_str_at_pos(ParseErrorKind::Lexical, source, pos, "string literals may not contain NUL characters")
}

fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_identifier_remaining(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'$'
}
