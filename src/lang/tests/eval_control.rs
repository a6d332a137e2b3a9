use super::*;

#[test]
fn test_if_else_chains() {
    Tester::new_single_source_expect_ok(
        "else if",
        "def classify(n) {
            if (n < 0) return 'negative';
            else if (n == 0) return 'zero';
            else { return 'positive'; }
        }
        print(classify(-5), classify(0), classify(3));"
    ).assert_output("\"negative\" \"zero\" \"positive\"\n");

    Tester::new_single_source_expect_ok("if without else", "var a = 1; if (a > 5) a = 10; print(a);")
        .assert_output("1\n");
}

#[test]
fn test_while_loops() {
    Tester::new_single_source_expect_ok(
        "factorial",
        "var n = 5; var fact = 1;
        while (n > 1) { fact *= n; n -= 1; }
        print(fact);"
    ).assert_output("120\n");

    Tester::new_single_source_expect_ok(
        "break and continue",
        "var i = 0; var seen = '';
        while (true) {
            i += 1;
            if (i == 2) continue;
            if (i > 4) break;
            seen += i;
        }
        print(seen, i);"
    ).assert_output("\"134\" 5\n");

    Tester::new_single_source_expect_ok("never entered", "while (false) print('body'); print('done');")
        .assert_output("\"done\"\n");
}

#[test]
fn test_for_loops() {
    Tester::new_single_source_expect_ok(
        "odd sum",
        "var total = 0;
        for (var i = 0; i < 10; i += 1) {
            if (i % 2 == 0) continue;
            if (i > 7) break;
            total += i;
        }
        print(total, i);"
    ).assert_output("16 9\n");

    Tester::new_single_source_expect_ok(
        "without clauses",
        "var n = 0;
        for (;;) { n += 1; if (n == 3) break; }
        print(n);"
    ).assert_output("3\n");

    Tester::new_single_source_expect_ok(
        "expression initializer",
        "var i; var out = '';
        for (i = 3; i; i -= 1) out += i;
        print(out);"
    ).assert_output("\"321\"\n");
}

#[test]
fn test_nested_loops() {
    Tester::new_single_source_expect_ok(
        "inner break",
        "def count_pairs(limit) {
            var pairs = 0;
            for (var a = 0; a < limit; a += 1) {
                for (var b = 0; b < limit; b += 1) {
                    if (b > a) break;
                    pairs += 1;
                }
            }
            return pairs;
        }
        print(count_pairs(4));"
    ).assert_output("10\n");
}

#[test]
fn test_recursion() {
    Tester::new_single_source_expect_ok(
        "fibonacci",
        "def fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
        print(fib(15));"
    ).assert_output("610\n");
}

#[test]
fn test_blocks_and_empty_statements() {
    Tester::new_single_source_expect_ok("empty statements", ";;{ ; } { print('x') };")
        .assert_output("\"x\"\n");

    // Newlines separate statements without semicolons
    Tester::new_single_source_expect_ok("no semicolons", "var a = 1\nvar b = 2\nprint(a + b)")
        .assert_output("3\n");
}

#[test]
fn test_last_expression_is_result() {
    Tester::new_single_source_expect_ok("last expression", "var a = 3; a * 2; var b = 1;")
        .execute()
        .assert_ok()
        .assert_result("6");

    Tester::new_single_source_expect_ok("no expression", "var a = 3;")
        .execute()
        .assert_result("undefined");

    Tester::new_single_source_expect_ok("string result", "'done';")
        .execute_via_image()
        .assert_result("\"done\"");
}
