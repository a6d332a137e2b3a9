pub mod input_source;
pub(crate) mod tokens;
pub(crate) mod lexer;
pub mod bytecode;
pub mod image;
pub(crate) mod parser;

#[cfg(test)] mod tests;

use serde::{Deserialize, Serialize};

use input_source::{InputSource, ParseError};

/// Limits the compiler enforces on a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub max_locals: usize,
    pub max_expr_depth: usize,
    pub max_constants: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self{
            max_locals: 64,
            max_expr_depth: 48,
            max_constants: 1024,
        }
    }
}

/// A compiled function. Slots `0..arg_count` of its frame hold the arguments,
/// the remaining `var_count - arg_count` slots the declared locals.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub var_count: u16,
    pub arg_count: u16,
    pub stack_high: u16,
    pub is_closure: bool,
    pub code: Vec<u8>,
}

/// Output of a compilation, or the owned contents of a loaded image.
/// `functions[0]` is the unit's top level code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub numbers: Vec<f64>,
    pub strings: Vec<Box<str>>,
    pub functions: Vec<FunctionDef>,
}

impl Program {
    /// Bytes of code space the program occupies once loaded into an
    /// environment: code blobs, constants and per-function metadata.
    pub fn footprint(&self) -> usize {
        let numbers = self.numbers.len() * 8;
        let strings: usize = self.strings.iter().map(|s| s.len() + 4).sum();
        let functions: usize = self.functions.iter().map(|f| f.code.len() + 8).sum();
        numbers + strings + functions
    }

    pub fn string(&self, index: u16) -> Option<&str> {
        self.strings.get(index as usize).map(|s| &**s)
    }

    pub fn number(&self, index: u16) -> Option<f64> {
        self.numbers.get(index as usize).copied()
    }

    pub fn function(&self, index: u16) -> Option<&FunctionDef> {
        self.functions.get(index as usize)
    }
}

/// Compiles a single unit. `is_known_global` tells the compiler which global
/// names already exist in the environment the unit will run in, so that
/// assignments to them are accepted.
pub fn compile(
    source: &InputSource, options: &CompileOptions, is_known_global: &dyn Fn(&str) -> bool
) -> Result<Program, ParseError> {
    parser::Parser::new(source, options, is_known_global).compile()
}
