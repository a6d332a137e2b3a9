/// lexer.rs
///
/// Tokenization and literal conversion, both directly on the lexer and
/// through the errors a compilation reports.

use super::*;
use crate::lang::input_source::InputSource;
use crate::lang::lexer::{parse_number, Lexer};
use crate::lang::tokens::TokenKind as TK;

fn token_kinds(text: &str) -> Vec<TK> {
    let source = InputSource::new_test(text);
    let mut lexer = Lexer::new(&source);
    let mut kinds = Vec::new();
    loop {
        let token = lexer.next_token().expect("lexing failed");
        if token.kind == TK::Eof {
            return kinds;
        }
        kinds.push(token.kind);
    }
}

#[test]
fn test_longest_operator_match() {
    assert_eq!(
        token_kinds("a += b << 2 >= c && !d"),
        vec![
            TK::Ident, TK::PlusEquals, TK::Ident, TK::ShiftLeft, TK::Number,
            TK::GreaterEquals, TK::Ident, TK::AndAnd, TK::Exclamation, TK::Ident,
        ]
    );
    assert_eq!(
        token_kinds("x==y!=z|w||v&u^t~s%=r"),
        vec![
            TK::Ident, TK::EqualEqual, TK::Ident, TK::NotEqual, TK::Ident, TK::Or,
            TK::Ident, TK::OrOr, TK::Ident, TK::And, TK::Ident, TK::Caret, TK::Ident,
            TK::Tilde, TK::Ident, TK::PercentEquals, TK::Ident,
        ]
    );
}

#[test]
fn test_keywords_and_identifiers() {
    assert_eq!(
        token_kinds("var def if else while for break continue return true false undefined NaN"),
        vec![
            TK::KwVar, TK::KwDef, TK::KwIf, TK::KwElse, TK::KwWhile, TK::KwFor, TK::KwBreak,
            TK::KwContinue, TK::KwReturn, TK::KwTrue, TK::KwFalse, TK::KwUndefined, TK::KwNaN,
        ]
    );
    // Keywords are case sensitive and only match whole words
    assert_eq!(token_kinds("Var nan variable $x _y2"), vec![TK::Ident; 5]);
}

#[test]
fn test_comments_are_skipped() {
    assert_eq!(
        token_kinds("a // line comment\n/* block\n comment */ b /*/ still comment */ c"),
        vec![TK::Ident, TK::Ident, TK::Ident]
    );
}

#[test]
fn test_peek_does_not_consume() {
    let source = InputSource::new_test("a 1");
    let mut lexer = Lexer::new(&source);
    assert_eq!(lexer.peek().unwrap().kind, TK::Ident);
    assert_eq!(lexer.peek().unwrap().kind, TK::Ident);
    assert_eq!(lexer.next_token().unwrap().kind, TK::Ident);
    let number = lexer.next_token().unwrap();
    assert_eq!(number.kind, TK::Number);
    assert_eq!(number.span.begin.line, 1);
    assert_eq!(lexer.next_token().unwrap().kind, TK::Eof);
    assert_eq!(lexer.next_token().unwrap().kind, TK::Eof);
}

#[test]
fn test_token_lines() {
    let source = InputSource::new_test("a\n\n  b /* x\n y */ c");
    let mut lexer = Lexer::new(&source);
    assert_eq!(lexer.next_token().unwrap().span.begin.line, 1);
    assert_eq!(lexer.next_token().unwrap().span.begin.line, 3);
    assert_eq!(lexer.next_token().unwrap().span.begin.line, 4);
}

#[test]
fn test_number_literal_values() {
    assert_eq!(parse_number(b"0"), Some(0.0));
    assert_eq!(parse_number(b"42"), Some(42.0));
    assert_eq!(parse_number(b"0x1F"), Some(31.0));
    assert_eq!(parse_number(b"0XfF"), Some(255.0));
    assert_eq!(parse_number(b"2.5"), Some(2.5));
    assert_eq!(parse_number(b"1e3"), Some(1000.0));
    assert_eq!(parse_number(b"25e-1"), Some(2.5));

    // A trailing dot is not part of the number
    assert_eq!(token_kinds("1.x"), vec![TK::Number, TK::Dot, TK::Ident]);
}

#[test]
fn test_string_escapes() {
    Tester::new_single_source_expect_ok(
        "escapes", r#"print('a\tb\\c\'d\x41', "it's")"#
    ).assert_has_string("a\tb\\c'dA").assert_has_string("it's");

    Tester::new_single_source_expect_ok("utf8 content", "print('héllo')")
        .assert_output("\"héllo\"\n");
}

#[test]
fn test_unterminated_string() {
    Tester::new_single_source_expect_err("unterminated string", "var a = 'abc\n;")
        .error(|e| { e
            .assert_num(1)
            .assert_msg_has(0, "unterminated string literal")
            .assert_occurs_at(0, "'abc");
        });

    Tester::new_single_source_expect_err("escaped newline", "var a = \"abc\\\n\";")
        .error(|e| { e.assert_msg_has(0, "unterminated string literal").assert_occurs_at(0, "\"abc"); });
}

#[test]
fn test_invalid_escape() {
    Tester::new_single_source_expect_err("unknown escape", "var a = 'a\\qb';")
        .error(|e| { e.assert_msg_has(0, "invalid escape sequence").assert_occurs_at(0, "\\q"); });

    Tester::new_single_source_expect_err("non-ascii hex escape", "var a = 'x\\xff';")
        .error(|e| { e.assert_msg_has(0, "invalid escape sequence").assert_occurs_at(0, "\\x"); });

    Tester::new_single_source_expect_err("short hex escape", "var a = '\\x4';")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "invalid escape sequence"); });
}

#[test]
fn test_nul_in_string() {
    Tester::new_single_source_expect_err("nul escape", "print('a\\0b');")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "may not contain NUL").assert_occurs_at(0, "\\0"); });

    Tester::new_single_source_expect_err("nul hex escape", "var a = \"\\x00\";")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "may not contain NUL").assert_occurs_at(0, "\\x00"); });

    Tester::new_single_source_expect_ok("other hex escapes", "print('\\x01' == '\\x01');")
        .assert_output("true\n");
}

#[test]
fn test_malformed_numbers() {
    Tester::new_single_source_expect_err("hex without digits", "var a = 0x;")
        .error(|e| { e.assert_msg_has(0, "hexadecimal literal without digits").assert_occurs_at(0, "0x"); });

    Tester::new_single_source_expect_err("bad exponent", "var a = 1e+;")
        .error(|e| { e.assert_msg_has(0, "malformed exponent").assert_occurs_at(0, "e+"); });

    Tester::new_single_source_expect_err("letters after digits", "var a = 12abc;")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "invalid character in number literal").assert_occurs_at(0, "abc"); });
}

#[test]
fn test_unexpected_characters() {
    Tester::new_single_source_expect_err("unexpected character", "var a = 1;\nvar b = @;")
        .error(|e| { e
            .assert_line(2)
            .assert_ctx_has(0, "var b = @;")
            .assert_msg_has(0, "unexpected character")
            .assert_occurs_at(0, "@");
        });

    Tester::new_single_source_expect_err("non-ascii outside string", "var a = é;")
        .error(|e| { e.assert_msg_has(0, "non-ASCII character").assert_occurs_at(0, "é"); });
}

#[test]
fn test_unterminated_block_comment() {
    Tester::new_single_source_expect_err("open comment", "var a = 1; /* never closed\n var b;")
        .assert_code(-1)
        .error(|e| { e
            .assert_line(1)
            .assert_msg_has(0, "unterminated block comment")
            .assert_occurs_at(0, "/*");
        });
}
