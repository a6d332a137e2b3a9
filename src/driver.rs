/// driver.rs
///
/// File level operations shared by the command line tools: compiling a
/// script to an image next to it, running a script or an image, listing the
/// contents of an image and driving timers until none remain.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lang::bytecode::disassemble;
use crate::lang::image::{write_image, ByteOrder, Image, ImageHeader, IMAGE_SUFFIX};
use crate::lang::input_source::InputSource;
use crate::lang::compile;
use crate::runtime::builtins::is_builtin;
use crate::runtime::error::{ExecResult, PandaError};
use crate::runtime::value::Value;
use crate::runtime::Env;

/// Path of the image `compile_file` produces for `input`.
pub fn image_path_for(input: &Path) -> PathBuf {
    input.with_extension(IMAGE_SUFFIX)
}

pub fn is_image_path(input: &Path) -> bool {
    input.extension().map_or(false, |ext| ext == IMAGE_SUFFIX)
}

fn read_source(input: &Path) -> Result<InputSource, PandaError> {
    let bytes = std::fs::read(input)?;
    Ok(InputSource::new(input.to_string_lossy().into_owned(), bytes))
}

/// Compiles a script into an image with the native layout, replacing any
/// existing image. Only the builtins are assumed to exist as globals.
pub fn compile_file(input: &Path) -> Result<PathBuf, PandaError> {
    let source = read_source(input)?;
    let options = crate::lang::CompileOptions::default();
    let program = compile(&source, &options, &is_builtin)?;
    let bytes = write_image(&program, ImageHeader::default())?;

    let output = image_path_for(input);
    std::fs::write(&output, &bytes)?;
    Ok(output)
}

/// Runs a file in `env`: an image when it carries the image suffix, source
/// text otherwise. The result is owned by the caller.
pub fn execute_file(env: &mut Env, input: &Path) -> Result<Value, PandaError> {
    if is_image_path(input) {
        let bytes = std::fs::read(input)?;
        env.execute_image(&bytes)
    } else {
        let source = read_source(input)?;
        env.execute_source(&source)
    }
}

/// Advances the environment's tick counter in real time and fires due
/// timers, until no timer is left.
pub fn run_timers(env: &mut Env, tick: Duration) -> ExecResult<()> {
    let ticks = env.ticks();
    while env.timeout_count() > 0 {
        std::thread::sleep(tick);
        ticks.advance(1);
        env.timeout_poll_now()?;
    }
    Ok(())
}

/// Writes a human readable listing of an image: header, constant tables and
/// the disassembly of every function.
pub fn dump_image(bytes: &[u8], out: &mut dyn Write) -> Result<(), PandaError> {
    let image = Image::load(bytes)?;
    let header = image.header();
    let byte_order = match header.byte_order {
        ByteOrder::Little => "little endian",
        ByteOrder::Big => "big endian",
    };
    writeln!(out, "image: {} bytes, {}-byte words, {}", bytes.len(), header.addr_size, byte_order)?;

    writeln!(out, "numbers: {}", image.number_count())?;
    for idx in 0..image.number_count() {
        if let Some(number) = image.number(idx) {
            writeln!(out, "  {:>4}: {}", idx, number)?;
        }
    }

    writeln!(out, "strings: {}", image.string_count())?;
    for idx in 0..image.string_count() {
        if let Some(text) = image.string(idx) {
            writeln!(out, "  {:>4}: {:?}", idx, text)?;
        }
    }

    writeln!(out, "functions: {}", image.function_count())?;
    for idx in 0..image.function_count() {
        let function = match image.function(idx) {
            Some(function) => function,
            None => continue,
        };
        writeln!(
            out, "  function {}: args {}, vars {}, stack {}{}",
            idx, function.arg_count, function.var_count, function.stack_high,
            if function.is_closure { ", closure" } else { "" }
        )?;
        match disassemble(function.code) {
            Ok(instructions) => {
                for (pc, instruction) in instructions.iter() {
                    writeln!(out, "    {:>5}  {}", pc, instruction)?;
                }
            },
            Err(e) => writeln!(out, "    <{}>", e)?,
        }
    }

    Ok(())
}
