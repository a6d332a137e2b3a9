use derive_more::{Display, From};

use crate::lang::image::ImageError;
use crate::lang::input_source::ParseError;

/// Errors raised while executing code. Any of them aborts the current top
/// level execution; there is no way to catch them from within a script.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ExecError {
    #[display(fmt = "out of memory")]
    OutOfMemory,
    #[display(fmt = "value stack overflow")]
    StackOverflow,
    #[display(fmt = "maximum call depth exceeded")]
    CallDepthExceeded,
    #[display(fmt = "value stack underflow")]
    StackUnderflow,
    #[display(fmt = "value is not callable")]
    NotCallable,
    #[display(fmt = "operation not supported on this type")]
    TypeMismatch,
    #[display(fmt = "invalid index")]
    InvalidIndex,
    #[display(fmt = "'{}' is not defined", _0)]
    UndefinedVariable(String),
    #[display(fmt = "invalid opcode 0x{:02x}", _0)]
    InvalidOpcode(u8),
    #[display(fmt = "invalid instruction operand")]
    InvalidOperand,
    #[display(fmt = "native function failed: {}", _0)]
    Native(String),
}

impl ExecError {
    pub fn code(&self) -> i32 {
        match self {
            ExecError::OutOfMemory => -20,
            ExecError::StackOverflow => -21,
            ExecError::CallDepthExceeded => -22,
            ExecError::StackUnderflow => -23,
            ExecError::NotCallable => -30,
            ExecError::TypeMismatch => -31,
            ExecError::InvalidIndex => -32,
            ExecError::UndefinedVariable(_) => -33,
            ExecError::InvalidOpcode(_) => -34,
            ExecError::InvalidOperand => -35,
            ExecError::Native(_) => -36,
        }
    }
}

pub type ExecResult<T> = Result<T, ExecError>;

/// Everything that can go wrong when handing code to an environment.
#[derive(Debug, Display, From)]
pub enum PandaError {
    #[display(fmt = "{}", _0)]
    Parse(ParseError),
    #[display(fmt = "{}", _0)]
    Image(ImageError),
    #[display(fmt = "{}", _0)]
    Exec(ExecError),
    #[display(fmt = "{}", _0)]
    Io(std::io::Error),
}

impl PandaError {
    /// Negative status code reported to the embedding application.
    pub fn code(&self) -> i32 {
        match self {
            PandaError::Parse(e) => e.code(),
            PandaError::Image(e) => e.code(),
            PandaError::Exec(e) => e.code(),
            PandaError::Io(_) => -40,
        }
    }
}

impl std::error::Error for PandaError {}
