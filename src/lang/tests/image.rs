/// image.rs
///
/// Compiled programs written to images and loaded back, both as data and by
/// an environment executing them.

use super::*;
use crate::lang::image::{write_image, ByteOrder, Image, ImageHeader, HOST_ADDR_SIZE};
use crate::lang::Program;
use crate::runtime::builtins::OutputBuffer;
use crate::runtime::config::EnvConfig;
use crate::runtime::Env;

const SCRIPT: &str = "
    var greeting = 'hello';
    def shout(s, times) {
        var out = s;
        for (var i = 1; i < times; i += 1) out += '!';
        return def() { return out; };
    }
    print(shout(greeting, 3)(), 1.25, 70000);
";

fn new_env() -> (Env, OutputBuffer) {
    let mut env = Env::with_builtins(EnvConfig::default());
    let output = OutputBuffer::new();
    env.set_output(Box::new(output.clone()));
    (env, output)
}

#[test]
fn test_same_output_via_image() {
    Tester::new_single_source_expect_ok("script", SCRIPT)
        .assert_output("\"hello!!\" 1.250000 70000\n");
}

#[test]
fn test_compiled_program_survives_both_byte_orders() {
    let tester = Tester::new_single_source_expect_ok("script", SCRIPT);
    let program = tester.program();

    for byte_order in [ByteOrder::Little, ByteOrder::Big].iter() {
        let header = ImageHeader{ addr_size: HOST_ADDR_SIZE, byte_order: *byte_order };
        let bytes = write_image(program, header).unwrap();
        let image = Image::load(&bytes).unwrap();
        assert_eq!(image.function_count(), program.functions.len());
        assert_eq!(Program::from_image(&image), *program);

        let (mut env, output) = new_env();
        let result = env.execute_image(&bytes).unwrap();
        env.release(result);
        assert_eq!(output.take_string(), "\"hello!!\" 1.250000 70000\n");
    }
}

#[test]
fn test_rejected_image_leaves_environment_usable() {
    let program = Tester::new_single_source_expect_ok("script", "var a = 2; print(a * 21);")
        .program()
        .clone();
    let bytes = write_image(&program, ImageHeader::default()).unwrap();
    let (mut env, output) = new_env();

    let err = env.execute_image(&bytes[..bytes.len() - 2]).unwrap_err();
    assert_eq!(err.code(), -10);
    let mut trailing = bytes.clone();
    trailing.push(0);
    assert_eq!(env.execute_image(&trailing).unwrap_err().code(), -14);
    assert_eq!(env.code_used(), 0);
    assert_eq!(output.take_string(), "");

    env.execute_image(&bytes).unwrap();
    assert_eq!(output.take_string(), "42\n");
    assert!(env.code_used() > 0);
}

#[test]
fn test_units_from_images_share_globals() {
    let first = Tester::new_single_source_expect_ok("first", "var shared = 'from the first unit';")
        .program()
        .clone();
    let second = Tester::new("second")
        .with_source("print(shared); var shared = shared + '!';")
        .compile()
        .expect_ok()
        .program()
        .clone();

    let (mut env, output) = new_env();
    env.execute_image(&write_image(&first, ImageHeader::default()).unwrap()).unwrap();
    env.execute_image(&write_image(&second, ImageHeader::default()).unwrap()).unwrap();
    assert_eq!(output.take_string(), "\"from the first unit\"\n");

    let shared = env.global("shared").unwrap();
    assert_eq!(env.string_of(shared), Some("from the first unit!"));
}
