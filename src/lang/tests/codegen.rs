/// codegen.rs
///
/// Shape of the emitted code: which instructions a construct compiles to and
/// the frame layout of each function.

use super::*;

#[test]
fn test_top_level_layout() {
    Tester::new_single_source_expect_ok("top level", "var a = 1; a + 1;")
        .assert_num_functions(1)
        .for_function(0, |f| { f
            .assert_arg_count(0)
            .assert_var_count(1)
            .assert_is_closure(false)
            .assert_has_op(OpCode::DefineGlobal)
            .assert_has_op(OpCode::LoadGlobal)
            .assert_has_op(OpCode::StoreLocal)
            .assert_no_op(OpCode::LoadCell);
        });

    Tester::new_single_source_expect_ok("declaration only", "var a;")
        .for_function(0, |f| { f.assert_has_op(OpCode::DeclareGlobal).assert_no_op(OpCode::DefineGlobal); });
}

#[test]
fn test_number_literals() {
    Tester::new_single_source_expect_ok(
        "number encodings",
        "var a = 0; var b = 7; var c = 65535; var d = 70000; var e = 1.5; var f = 1.5; var g = -0;"
    )
        .assert_num_numbers(2)
        .for_function(0, |f| { f
            .assert_has_op(OpCode::PushZero)
            .assert_has_op(OpCode::PushInt)
            .assert_has_op(OpCode::PushNumber)
            .assert_has_op(OpCode::Neg);
        });

    Tester::new_single_source_expect_ok("literal keywords", "var a = [true, false, undefined, NaN];")
        .assert_num_numbers(0)
        .for_function(0, |f| { f
            .assert_has_op(OpCode::PushTrue)
            .assert_has_op(OpCode::PushFalse)
            .assert_has_op(OpCode::PushUndefined)
            .assert_has_op(OpCode::PushNaN)
            .assert_has_op(OpCode::MakeArray);
        });
}

#[test]
fn test_function_frames() {
    Tester::new_single_source_expect_ok(
        "parameters and locals", "def f(a, b) { var c; var a; c = a + b; return c; }"
    )
        .assert_num_functions(2)
        .assert_has_string("f")
        .for_function(0, |f| { f.assert_has_op(OpCode::PushFunction).assert_has_op(OpCode::DefineGlobal); })
        .for_function(1, |f| { f
            .assert_arg_count(2)
            .assert_var_count(3)
            .assert_is_closure(false)
            .assert_has_op(OpCode::LoadLocal)
            .assert_has_op(OpCode::StoreLocal)
            .assert_has_op(OpCode::Return)
            .assert_no_op(OpCode::LoadGlobal)
            .assert_no_op(OpCode::MakeCell);
        });

    Tester::new_single_source_expect_ok("bare return", "def f() { return; }")
        .for_function(1, |f| { f.assert_has_op(OpCode::ReturnUndefined).assert_no_op(OpCode::Return); });
}

#[test]
fn test_captured_variables_become_cells() {
    Tester::new_single_source_expect_ok(
        "closure",
        "def outer(a) {
            var count = 0;
            def inc() { count = count + a; return count; }
            return inc;
        }"
    )
        .assert_num_functions(3)
        .for_function(0, |f| { f.assert_has_op(OpCode::PushFunction).assert_no_op(OpCode::MakeClosure); })
        .for_function(1, |f| { f
            .assert_arg_count(1)
            .assert_var_count(3)
            .assert_is_closure(false)
            .assert_has_op(OpCode::MakeCell)
            .assert_has_op(OpCode::StoreCell)
            .assert_has_op(OpCode::PushCell)
            .assert_has_op(OpCode::MakeClosure)
            // The uncaptured local holding `inc` stays a plain slot
            .assert_has_op(OpCode::StoreLocal)
            .assert_has_op(OpCode::LoadLocal);
        })
        .for_function(2, |f| { f
            .assert_arg_count(0)
            .assert_var_count(0)
            .assert_is_closure(true)
            .assert_has_op(OpCode::LoadUpvalue)
            .assert_has_op(OpCode::StoreUpvalue)
            .assert_no_op(OpCode::LoadLocal);
        });
}

#[test]
fn test_upvalues_pass_through_intermediate_functions() {
    Tester::new_single_source_expect_ok(
        "two levels",
        "def outer() {
            var x = 1;
            def middle() { def inner() { return x; } return inner; }
            return middle;
        }"
    )
        .assert_num_functions(4)
        .for_function(1, |f| { f.assert_has_op(OpCode::MakeCell).assert_has_op(OpCode::PushCell); })
        .for_function(2, |f| { f
            .assert_is_closure(true)
            .assert_has_op(OpCode::PushUpvalue)
            .assert_has_op(OpCode::MakeClosure)
            .assert_no_op(OpCode::LoadUpvalue);
        })
        .for_function(3, |f| { f.assert_is_closure(true).assert_has_op(OpCode::LoadUpvalue); });

    // Top level variables are globals and never captured
    Tester::new_single_source_expect_ok("global access", "var g = 1; def f() { return g; }")
        .for_function(1, |f| { f.assert_is_closure(false).assert_has_op(OpCode::LoadGlobal); });
}

#[test]
fn test_control_flow_jumps() {
    Tester::new_single_source_expect_ok("if else", "var a; if (a) a = 1; else a = 2;")
        .for_function(0, |f| { f.assert_has_op(OpCode::JumpIfFalse).assert_has_op(OpCode::Jump); });

    Tester::new_single_source_expect_ok("short circuit", "var a = 1 && 2 || 3;")
        .for_function(0, |f| { f
            .assert_has_op(OpCode::JumpIfFalseOrPop)
            .assert_has_op(OpCode::JumpIfTrueOrPop)
            .assert_no_op(OpCode::JumpIfFalse);
        });

    Tester::new_single_source_expect_ok("endless for", "for (;;) { break; }")
        .for_function(0, |f| { f.assert_has_op(OpCode::Jump).assert_no_op(OpCode::JumpIfFalse); });
}

#[test]
fn test_element_access() {
    Tester::new_single_source_expect_ok("compound element assignment", "var o = { n: 1 }; o.n += 2; o['n'];")
        .assert_has_string("n")
        .for_function(0, |f| { f
            .assert_has_op(OpCode::MakeObject)
            .assert_has_op(OpCode::Dup2)
            .assert_has_op(OpCode::GetElem)
            .assert_has_op(OpCode::SetElem);
        });

    Tester::new_single_source_expect_ok("plain element assignment", "var a = []; a[0] = 1;")
        .for_function(0, |f| { f.assert_has_op(OpCode::SetElem).assert_no_op(OpCode::Dup2); });
}

#[test]
fn test_program_accessors() {
    let tester = Tester::new_single_source_expect_ok("accessors", "var s = 'text'; var n = 2.5;");
    let program = tester.program();
    assert!(program.string(0).is_some());
    assert_eq!(program.number(0), Some(2.5));
    assert_eq!(program.number(1), None);
    assert!(program.function(0).is_some());
    assert!(program.function(1).is_none());
    assert!(program.footprint() > program.functions[0].code.len());
}

#[test]
fn test_early_exits_do_not_grow_the_stack() {
    let mut source = String::from("def f(n) {\n");
    for idx in 0..300 {
        source.push_str(&format!("    if (n == {}) return {};\n", idx, idx));
    }
    source.push_str("    return -1;\n}\nprint(f(3), f(299), f(300));");

    Tester::new_single_source_expect_ok("many returns", &source)
        .for_function(1, |f| { f.assert_stack_high(2); })
        .assert_output("3 299 -1\n");

    Tester::new_single_source_expect_ok(
        "loop jumps",
        "def g() {
            var i = 0;
            while (true) {
                i += 1;
                if (i < 3) continue;
                if (i < 5) { continue; }
                break;
            }
            return i;
        }
        print(g());"
    )
        .for_function(1, |f| { f.assert_stack_high(2); })
        .assert_output("5\n");
}
