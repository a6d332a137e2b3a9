use crate::runtime::{config::EnvConfig, error::PandaError, logging::FileLogger, Env};
use core::cell::RefCell;
use std::io::Write;
use std::os::raw::c_int;
use std::slice::from_raw_parts as slice_from_raw_parts;

///////////////////////////////////////////////
#[derive(Default)]
struct StoredError {
    // invariant: len is zero IFF its occupied
    // contents are 1+ bytes because we also store the NULL TERMINATOR
    buf: Vec<u8>,
}
impl StoredError {
    const NULL_TERMINATOR: u8 = 0;
    fn clear(&mut self) {
        // no null terminator either!
        self.buf.clear();
    }
    fn display_store<E: std::fmt::Display>(&mut self, error: &E) {
        let _ = write!(&mut self.buf, "{}", error);
        self.buf.push(Self::NULL_TERMINATOR);
    }
    fn tl_display_store<E: std::fmt::Display>(error: &E) {
        STORED_ERROR.with(|stored_error| {
            let mut stored_error = stored_error.borrow_mut();
            stored_error.clear();
            stored_error.display_store(error);
        })
    }
    fn tl_clear() {
        STORED_ERROR.with(|stored_error| {
            let mut stored_error = stored_error.borrow_mut();
            stored_error.clear();
        })
    }
    fn tl_bytes_peek() -> (*const u8, usize) {
        STORED_ERROR.with(|stored_error| {
            let stored_error = stored_error.borrow();
            match stored_error.buf.len() {
                0 => (core::ptr::null(), 0), // no error!
                n => {
                    // stores an error of length n-1 AND a NULL TERMINATOR
                    (stored_error.buf.as_ptr(), n - 1)
                }
            }
        })
    }
}
thread_local! {
    static STORED_ERROR: RefCell<StoredError> = RefCell::new(StoredError::default());
}

pub const ERR_OK: c_int = 0;
/// Arguments that are not even well formed, e.g. script text that is not
/// valid UTF-8 or an undecodable configuration.
pub const ERR_INVALID_ARGUMENT: c_int = -41;

/// Stores the error's text for `panda_error_peek` and turns it into its
/// status code.
fn tl_store_code(error: PandaError) -> c_int {
    StoredError::tl_display_store(&error);
    error.code()
}

///////////////////// ERRORS //////////////////////////

/// Returns length (via out pointer) and pointer (via return value) of the last error.
/// - pointer is NULL iff there was no last error
/// - data at pointer is null-delimited
/// - len does NOT include the length of the null-delimiter
/// If len is NULL, it will not written to.
#[no_mangle]
pub unsafe extern "C" fn panda_error_peek(len: *mut usize) -> *const u8 {
    let (err_ptr, err_len) = StoredError::tl_bytes_peek();
    if !len.is_null() {
        len.write(err_len);
    }
    err_ptr
}

///////////////////// ENVIRONMENT //////////////////////////

/// Creates an environment with the default configuration and the builtin natives.
#[no_mangle]
pub unsafe extern "C" fn panda_env_new() -> *mut Env {
    Box::into_raw(Box::new(Env::with_builtins(EnvConfig::default())))
}

/// Creates an environment from a bincode-encoded `EnvConfig`.
/// - On success returns the new environment
/// - On failure stores an error string (see `panda_error_peek`) and returns NULL
#[no_mangle]
pub unsafe extern "C" fn panda_env_new_with_config(config_ptr: *const u8, config_len: usize) -> *mut Env {
    StoredError::tl_clear();
    match bincode::deserialize::<EnvConfig>(&*slice_from_raw_parts(config_ptr, config_len)) {
        Ok(config) => Box::into_raw(Box::new(Env::with_builtins(config))),
        Err(err) => {
            StoredError::tl_display_store(&err);
            std::ptr::null_mut()
        }
    }
}

/// Creates an environment with the default configuration that logs to the file at the
/// given utf-8 encoded path. Returns NULL and stores an error if the file cannot be created.
#[no_mangle]
pub unsafe extern "C" fn panda_env_new_logging(path_ptr: *const u8, path_len: usize) -> *mut Env {
    StoredError::tl_clear();
    let path_bytes = &*slice_from_raw_parts(path_ptr, path_len);
    let path_str = match std::str::from_utf8(path_bytes) {
        Ok(path_str) => path_str,
        Err(err) => {
            StoredError::tl_display_store(&err);
            return std::ptr::null_mut();
        }
    };
    match std::fs::File::create(path_str) {
        Ok(file) => {
            let mut env = Env::with_builtins(EnvConfig::default());
            let env_id = env.id();
            env.set_logger(Box::new(FileLogger::new(env_id, file)));
            Box::into_raw(Box::new(env))
        }
        Err(err) => {
            StoredError::tl_display_store(&err);
            std::ptr::null_mut()
        }
    }
}

/// Destroys the environment, releasing everything it holds.
#[no_mangle]
pub unsafe extern "C" fn panda_env_destroy(env: *mut Env) {
    drop(Box::from_raw(env))
}

#[no_mangle]
pub unsafe extern "C" fn panda_env_print_debug(env: &Env) {
    println!("Debug print dump {:#?}", env);
}

///////////////////// EXECUTION //////////////////////////

/// Compiles and runs utf-8 encoded script text as a new unit of the environment.
/// Returns 0 on success; otherwise stores an error string and returns its negative status code.
#[no_mangle]
pub unsafe extern "C" fn panda_execute_string(env: &mut Env, text_ptr: *const u8, text_len: usize) -> c_int {
    StoredError::tl_clear();
    let text = match std::str::from_utf8(&*slice_from_raw_parts(text_ptr, text_len)) {
        Ok(text) => text,
        Err(err) => {
            StoredError::tl_display_store(&err);
            return ERR_INVALID_ARGUMENT;
        }
    };
    match env.execute_string(text) {
        Ok(value) => {
            env.release(value);
            ERR_OK
        }
        Err(err) => tl_store_code(err),
    }
}

/// Loads and runs an image as a new unit of the environment. The bytes are copied, the caller
/// keeps ownership of its buffer. Returns 0 or a negative status code, like `panda_execute_string`.
#[no_mangle]
pub unsafe extern "C" fn panda_execute_image(env: &mut Env, image_ptr: *const u8, image_len: usize) -> c_int {
    StoredError::tl_clear();
    match env.execute_image(&*slice_from_raw_parts(image_ptr, image_len)) {
        Ok(value) => {
            env.release(value);
            ERR_OK
        }
        Err(err) => tl_store_code(err),
    }
}

///////////////////// TIMERS //////////////////////////

/// Fires the timers due at tick `now`, in registration order.
/// Returns the number of callbacks run, or a negative status code if one of them failed.
#[no_mangle]
pub unsafe extern "C" fn panda_timeout_poll(env: &mut Env, now: u32) -> c_int {
    StoredError::tl_clear();
    match env.timeout_poll(now) {
        Ok(count) => count.min(c_int::MAX as usize) as c_int,
        Err(err) => tl_store_code(err.into()),
    }
}
