use super::*;
use crate::lang::CompileOptions;

#[test]
fn test_def_statement_requires_name() {
    Tester::new_single_source_expect_err("anonymous def statement", "def (a) { return a; }")
        .assert_code(-1)
        .error(|e| { e
            .assert_num(2)
            .assert_msg_has(0, "expected a function name, found '('")
            .assert_occurs_at(0, "(a)")
            .assert_msg_has(1, "function definition starts here")
            .assert_occurs_at(1, "def");
        });

    // As an expression the name is not needed
    Tester::new_single_source_expect_ok("anonymous def expression", "var f = def (a) { return a; };")
        .assert_num_functions(2);
}

#[test]
fn test_unexpected_tokens() {
    Tester::new_single_source_expect_err("missing name", "var = 3;")
        .error(|e| { e.assert_msg_has(0, "expected identifier, found '='").assert_occurs_at(0, "= 3"); });

    Tester::new_single_source_expect_err("unclosed call", "print(1")
        .error(|e| { e.assert_msg_has(0, "expected ')', found end of input"); });

    Tester::new_single_source_expect_err("unclosed block", "if (true) {\n  print(1);\n")
        .error(|e| { e.assert_msg_has(0, "expected '}', found end of input"); });

    Tester::new_single_source_expect_err("missing condition parens", "while true { }")
        .error(|e| { e.assert_msg_has(0, "expected '(', found 'true'").assert_occurs_at(0, "true"); });

    Tester::new_single_source_expect_err("not an expression", "var a = 1 + ;")
        .error(|e| { e.assert_msg_has(0, "expected an expression, found ';'").assert_occurs_at(0, ";"); });

    Tester::new_single_source_expect_err("bad property name", "var o = { x: 1, +: 2 };")
        .error(|e| { e.assert_msg_has(0, "expected a property name, found '+'").assert_occurs_at(0, "+:"); });

    Tester::new_single_source_expect_err("ternary without colon", "var a = true ? 1 2;")
        .error(|e| { e.assert_msg_has(0, "expected ':', found number").assert_occurs_at(0, "2;"); });
}

#[test]
fn test_invalid_assignment_targets() {
    Tester::new_single_source_expect_err("assign to literal", "1 = 2;")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "cannot assign to this expression using '='").assert_occurs_at(0, "= 2"); });

    Tester::new_single_source_expect_err("compound assign to call", "var f; f() += 1;")
        .error(|e| { e.assert_msg_has(0, "using '+='").assert_occurs_at(0, "+="); });
}

#[test]
fn test_assignment_to_undeclared_global() {
    Tester::new_single_source_expect_err("top level", "undeclared = 5;")
        .assert_code(-2)
        .error(|e| { e.assert_msg_has(0, "assignment to undeclared identifier 'undeclared'").assert_occurs_at(0, "undeclared"); });

    Tester::new_single_source_expect_err("inside function", "def f() { counter += 1; }")
        .assert_code(-2)
        .error(|e| { e.assert_occurs_at(0, "counter"); });

    // Declared globals, builtins and locals may be assigned
    Tester::new_single_source_expect_ok("declared", "var counter; def f() { counter += 1; }");
    Tester::new_single_source_expect_ok("builtin", "print = undefined;");
    Tester::new_single_source_expect_ok("local", "def f(a) { var b; a = 1; b = a; }");

    // Reading an unknown global is only an error once executed
    Tester::new_single_source_expect_ok("read unknown", "def f() { return unknown; }");
}

#[test]
fn test_loop_jumps_outside_loops() {
    Tester::new_single_source_expect_err("break at top level", "break;")
        .error(|e| { e.assert_msg_has(0, "'break' outside of a loop").assert_occurs_at(0, "break"); });

    Tester::new_single_source_expect_err("continue in nested function", "while (true) { def f() { continue; } }")
        .error(|e| { e.assert_msg_has(0, "'continue' outside of a loop").assert_occurs_at(0, "continue"); });
}

#[test]
fn test_duplicate_parameters() {
    Tester::new_single_source_expect_err("duplicate parameter", "def f(a, b, a) { }")
        .assert_code(-1)
        .error(|e| { e.assert_msg_has(0, "duplicate parameter name").assert_occurs_at(0, "a)"); });
}

#[test]
fn test_too_many_locals() {
    let options = CompileOptions{ max_locals: 2, ..CompileOptions::default() };

    Tester::new("too many parameters")
        .with_source("def f(a, b, c) { }")
        .with_compile_options(options.clone())
        .compile()
        .expect_err()
        .assert_code(-3)
        .error(|e| { e.assert_msg_has(0, "too many local variables").assert_occurs_at(0, "c)"); });

    Tester::new("too many variables")
        .with_source("def f(a) { var b; var c; }")
        .with_compile_options(options.clone())
        .compile()
        .expect_err()
        .assert_code(-3)
        .error(|e| { e.assert_occurs_at(0, "c;"); });

    Tester::new("too many arguments")
        .with_source("print(1, 2, 3);")
        .with_compile_options(options.clone())
        .compile()
        .expect_err()
        .assert_code(-3)
        .error(|e| { e.assert_msg_has(0, "too many arguments in call, at most 2"); });

    Tester::new("within limits")
        .with_source("def f(a, b) { var a; return a + b; } print(1, 2);")
        .with_compile_options(options)
        .compile()
        .expect_ok();
}

#[test]
fn test_expression_nesting_limit() {
    let nested = |depth: usize| format!("var a = {}1{};", "(".repeat(depth), ")".repeat(depth));
    let max_depth = CompileOptions::default().max_expr_depth;

    Tester::new_single_source_expect_ok("at the limit", nested(max_depth - 1));
    Tester::new_single_source_expect_err("beyond the limit", nested(max_depth + 1))
        .assert_code(-4)
        .error(|e| { e.assert_msg_has(0, "expression nested too deeply"); });

    Tester::new_single_source_expect_err("unary chain", format!("var a = {}1;", "-".repeat(max_depth + 1)))
        .assert_code(-4);
}

#[test]
fn test_constant_pool_limit() {
    let options = CompileOptions{ max_constants: 2, ..CompileOptions::default() };

    Tester::new("too many strings")
        .with_source("print('a'); print('b');")
        .with_compile_options(options.clone())
        .compile()
        .expect_err()
        .assert_code(-6)
        .error(|e| { e.assert_msg_has(0, "too many string constants").assert_occurs_at(0, "'b'"); });

    // Repeated constants share their slot
    Tester::new("deduplicated")
        .with_source("var x = 2.5; x = 2.5; x = 'a'; x = 'a';")
        .with_compile_options(options)
        .compile()
        .expect_ok()
        .assert_num_numbers(1)
        .assert_has_string("x")
        .assert_has_string("a");
}

#[test]
fn test_function_size_limit() {
    // Each definition takes four bytes of code
    let source = "var a = 0;\n".repeat(17_000);
    Tester::new_single_source_expect_err("oversized top level", source)
        .assert_code(-5)
        .error(|e| { e.assert_msg_has(0, "function exceeds the maximum code size"); });
}
