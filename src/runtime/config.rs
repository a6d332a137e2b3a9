use serde::{Deserialize, Serialize};

use crate::lang::CompileOptions;

/// One size class of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub block_size: usize,
    pub block_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    pub pools: Vec<PoolConfig>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self{
            pools: vec![
                PoolConfig{ block_size: 64, block_count: 32 },
                PoolConfig{ block_size: 128, block_count: 16 },
                PoolConfig{ block_size: 512, block_count: 4 },
            ]
        }
    }
}

/// Sizes every fixed resource of an environment. Nothing grows beyond these
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub heap: HeapConfig,
    /// Value stack slots
    pub stack_size: usize,
    pub max_call_depth: usize,
    /// Bytes of compiled code and constants the environment may hold
    pub code_space: usize,
    pub compile: CompileOptions,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self{
            heap: HeapConfig::default(),
            stack_size: 256,
            max_call_depth: 32,
            code_space: 32 * 1024,
            compile: CompileOptions::default(),
        }
    }
}

impl EnvConfig {
    pub fn with_heap(mut self, heap: HeapConfig) -> Self {
        self.heap = heap;
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_code_space(mut self, code_space: usize) -> Self {
        self.code_space = code_space;
        self
    }

    pub fn with_compile_options(mut self, compile: CompileOptions) -> Self {
        self.compile = compile;
        self
    }
}
