use std::collections::HashMap;

use lazy_static::lazy_static;
use maplit::hashmap;

use super::input_source::{InputPosition, InputSpan};

/// Represents a particular kind of token. Variable-length tokens (identifiers,
/// literals) carry their extent in the token's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TokenKind {
    // Variable-character tokens
    Ident,          // regular identifier
    Number,         // integer or floating point literal
    String,         // string literal, range includes the quotes
    // Keywords
    KwVar,
    KwDef,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwBreak,
    KwContinue,
    KwReturn,
    KwTrue,
    KwFalse,
    KwUndefined,
    KwNaN,
    // Punctuation
    OpenParen,      // (
    CloseParen,     // )
    OpenCurly,      // {
    CloseCurly,     // }
    OpenSquare,     // [
    CloseSquare,    // ]
    Comma,          // ,
    Dot,            // .
    SemiColon,      // ;
    Colon,          // :
    Question,       // ?
    // Operators
    Plus,           // +
    Minus,          // -
    Star,           // *
    Slash,          // /
    Percent,        // %
    Exclamation,    // !
    Tilde,          // ~
    And,            // &
    Or,             // |
    Caret,          // ^
    Equal,          // =
    PlusEquals,     // +=
    MinusEquals,    // -=
    StarEquals,     // *=
    SlashEquals,    // /=
    PercentEquals,  // %=
    EqualEqual,     // ==
    NotEqual,       // !=
    Less,           // <
    LessEquals,     // <=
    Greater,        // >
    GreaterEquals,  // >=
    ShiftLeft,      // <<
    ShiftRight,     // >>
    AndAnd,         // &&
    OrOr,           // ||
    // End of input
    Eof,
}

impl TokenKind {
    /// Human readable form used in error messages
    pub fn describe(&self) -> &'static str {
        use TokenKind as TK;
        match self {
            TK::Ident => "identifier",
            TK::Number => "number",
            TK::String => "string",
            TK::KwVar => "'var'",
            TK::KwDef => "'def'",
            TK::KwIf => "'if'",
            TK::KwElse => "'else'",
            TK::KwWhile => "'while'",
            TK::KwFor => "'for'",
            TK::KwBreak => "'break'",
            TK::KwContinue => "'continue'",
            TK::KwReturn => "'return'",
            TK::KwTrue => "'true'",
            TK::KwFalse => "'false'",
            TK::KwUndefined => "'undefined'",
            TK::KwNaN => "'NaN'",
            TK::OpenParen => "'('",
            TK::CloseParen => "')'",
            TK::OpenCurly => "'{'",
            TK::CloseCurly => "'}'",
            TK::OpenSquare => "'['",
            TK::CloseSquare => "']'",
            TK::Comma => "','",
            TK::Dot => "'.'",
            TK::SemiColon => "';'",
            TK::Colon => "':'",
            TK::Question => "'?'",
            TK::Plus => "'+'",
            TK::Minus => "'-'",
            TK::Star => "'*'",
            TK::Slash => "'/'",
            TK::Percent => "'%'",
            TK::Exclamation => "'!'",
            TK::Tilde => "'~'",
            TK::And => "'&'",
            TK::Or => "'|'",
            TK::Caret => "'^'",
            TK::Equal => "'='",
            TK::PlusEquals => "'+='",
            TK::MinusEquals => "'-='",
            TK::StarEquals => "'*='",
            TK::SlashEquals => "'/='",
            TK::PercentEquals => "'%='",
            TK::EqualEqual => "'=='",
            TK::NotEqual => "'!='",
            TK::Less => "'<'",
            TK::LessEquals => "'<='",
            TK::Greater => "'>'",
            TK::GreaterEquals => "'>='",
            TK::ShiftLeft => "'<<'",
            TK::ShiftRight => "'>>'",
            TK::AndAnd => "'&&'",
            TK::OrOr => "'||'",
            TK::Eof => "end of input",
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static [u8], TokenKind> = hashmap!{
        &b"var"[..] => TokenKind::KwVar,
        &b"def"[..] => TokenKind::KwDef,
        &b"if"[..] => TokenKind::KwIf,
        &b"else"[..] => TokenKind::KwElse,
        &b"while"[..] => TokenKind::KwWhile,
        &b"for"[..] => TokenKind::KwFor,
        &b"break"[..] => TokenKind::KwBreak,
        &b"continue"[..] => TokenKind::KwContinue,
        &b"return"[..] => TokenKind::KwReturn,
        &b"true"[..] => TokenKind::KwTrue,
        &b"false"[..] => TokenKind::KwFalse,
        &b"undefined"[..] => TokenKind::KwUndefined,
        &b"NaN"[..] => TokenKind::KwNaN,
    };
}

/// Classifies an identifier: either a reserved word or a plain `Ident`.
pub(crate) fn keyword_or_ident(text: &[u8]) -> TokenKind {
    KEYWORDS.get(text).copied().unwrap_or(TokenKind::Ident)
}

/// Represents a single token at a particular position. For variable-length
/// tokens the span covers the entire token text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: InputSpan,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, begin: InputPosition, end: InputPosition) -> Self {
        Self{ kind, span: InputSpan::from_positions(begin, end) }
    }
}
