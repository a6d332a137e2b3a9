#[macro_use]
mod macros;

mod common;
pub mod driver;
pub mod lang;
pub mod runtime;

pub use runtime::{config::EnvConfig, error::PandaError, value::Value, Env};

#[cfg(feature = "ffi")]
pub mod ffi;
