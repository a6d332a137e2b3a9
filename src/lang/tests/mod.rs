/**
 * lang/tests
 *
 * Tests for the compiler front end and for the semantics of the language as
 * observed by running compiled programs. Programs run in a fresh environment
 * with the builtin natives; `assert_output` runs each program both directly
 * and after a round trip through an image.
 */

mod utils;
mod lexer;
mod parser_errors;
mod codegen;
mod eval_control;
mod image;

pub(crate) use utils::{Tester}; // the testing harness
pub(crate) use crate::lang::bytecode::OpCode;
