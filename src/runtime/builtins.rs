/// builtins.rs
///
/// Natives every environment created through `Env::with_builtins` has:
/// output and the timer interface.

use std::cell::RefCell;
use std::io::Write;

use crate::common::*;
use super::native::NativeEntry;
use super::timeout::TimerId;

pub const BUILTINS: &[NativeEntry] = &[
    NativeEntry{ name: "print", func: native_print },
    NativeEntry{ name: "systicks", func: native_systicks },
    NativeEntry{ name: "setTimeout", func: native_set_timeout },
    NativeEntry{ name: "setInterval", func: native_set_interval },
    NativeEntry{ name: "clearTimeout", func: native_clear_timer },
    NativeEntry{ name: "clearInterval", func: native_clear_timer },
];

/// Whether `name` is one of the builtin natives.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|entry| entry.name == name)
}

/// `print(...)`: writes its arguments separated by spaces, then a newline.
fn native_print(env: &mut Env, args: &[Value]) -> ExecResult<Value> {
    let mut line = String::new();
    for (idx, arg) in args.iter().enumerate() {
        if idx != 0 {
            line.push(' ');
        }
        line.push_str(&env.display_value(*arg));
    }
    line.push('\n');

    env.output().write_all(line.as_bytes())
        .map_err(|e| ExecError::Native(format!("print: {}", e)))?;
    Ok(Value::Undefined)
}

fn native_systicks(env: &mut Env, _args: &[Value]) -> ExecResult<Value> {
    Ok(Value::Number(env.ticks().now() as f64))
}

fn native_set_timeout(env: &mut Env, args: &[Value]) -> ExecResult<Value> {
    register_timer(env, args, false)
}

fn native_set_interval(env: &mut Env, args: &[Value]) -> ExecResult<Value> {
    register_timer(env, args, true)
}

/// `(callback, wait[, param])`, returns the timer id
fn register_timer(env: &mut Env, args: &[Value], repeat: bool) -> ExecResult<Value> {
    let callback = args.get(0).copied().unwrap_or(Value::Undefined);
    if !callback.is_function() {
        return Err(ExecError::TypeMismatch);
    }
    let wait = match args.get(1) {
        Some(Value::Number(wait)) if *wait > 0.0 => wait.min(u32::MAX as f64) as u32,
        Some(Value::Number(_)) | None => 0,
        Some(_) => return Err(ExecError::TypeMismatch),
    };
    let param = args.get(2).copied().unwrap_or(Value::Undefined);

    let id = env.timeout_register(wait, callback, repeat, param)?;
    Ok(Value::Number(id as f64))
}

/// `clearTimeout` and `clearInterval`: `(id)` removes one timer and returns
/// whether it existed. Without an argument every timer is removed.
fn native_clear_timer(env: &mut Env, args: &[Value]) -> ExecResult<Value> {
    match args.get(0) {
        None => {
            let cleared = env.timeout_clear_all();
            Ok(Value::Boolean(cleared > 0))
        },
        Some(Value::Number(id)) if *id >= 0.0 && *id <= TimerId::MAX as f64 => {
            Ok(Value::Boolean(env.timeout_unregister(*id as TimerId)))
        },
        Some(_) => Ok(Value::Boolean(false)),
    }
}

/// A cloneable `Write` target collecting output in memory, used to capture
/// what `print` writes.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Rc<RefCell<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything written so far.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn take_string(&self) -> String {
        String::from_utf8_lossy(&self.take()).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
