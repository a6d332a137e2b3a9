pub mod builtins;
pub mod config;
pub mod error;
pub mod heap;
pub mod logging;
pub mod native;
pub mod timeout;
pub mod value;

mod executor;
mod operators;
pub(crate) mod stack;


use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::common::*;
use crate::lang::image::Image;
use config::EnvConfig;
use error::PandaError;
use heap::PoolStats;
use logging::{DummyLogger, Logger};
use native::{NativeEntry, NativeFn, NativeRegistry};
use stack::Stack;
use timeout::{Ticks, TimeoutList, TimerId};

static NEXT_ENV_ID: AtomicU32 = AtomicU32::new(0);

/// An activation of a script function.
pub(crate) struct Frame {
    pub(crate) unit: u32,
    pub(crate) func: u16,
    /// Resume position, only up to date while the frame is not on top
    pub(crate) pc: usize,
    /// Stack index of the first argument
    pub(crate) base: usize,
    pub(crate) closure: Option<BlockRef>,
    pub(crate) program: Rc<Program>,
}

/// A program loaded into an environment. Units are never unloaded: their
/// functions and string constants may be referenced by values.
pub(crate) struct Unit {
    pub(crate) program: Rc<Program>,
    /// Resolved global slot per string constant
    pub(crate) global_slots: Vec<Option<u32>>,
}

/// A self contained interpreter instance: its own heap, value stack, globals,
/// natives and timers. Environments share nothing and may live on different
/// threads, but a single environment is not thread safe. The only part meant
/// to be touched from elsewhere is the tick counter, see `Env::ticks`.
pub struct Env {
    id: u32,
    config: EnvConfig,
    pub(crate) heap: Heap,
    pub(crate) stack: Stack,
    pub(crate) frames: Vec<Frame>,
    pub(crate) units: Vec<Unit>,
    code_used: usize,
    pub(crate) globals: Vec<Value>,
    pub(crate) global_names: HashMap<Box<str>, u32>,
    pub(crate) natives: NativeRegistry,
    pub(crate) native_args: Vec<Value>,
    timeouts: TimeoutList,
    ticks: Arc<Ticks>,
    logger: Box<dyn Logger>,
    output: Box<dyn Write>,
}

impl Env {
    /// Creates an empty environment: no natives, no globals. Output goes to
    /// stdout and logging is off.
    pub fn new(config: EnvConfig) -> Self {
        let id = NEXT_ENV_ID.fetch_add(1, Ordering::Relaxed);
        Self{
            id,
            heap: Heap::new(&config.heap),
            stack: Stack::new(config.stack_size),
            frames: Vec::with_capacity(config.max_call_depth),
            units: Vec::new(),
            code_used: 0,
            globals: Vec::new(),
            global_names: HashMap::new(),
            natives: NativeRegistry::default(),
            native_args: Vec::new(),
            timeouts: TimeoutList::default(),
            ticks: Arc::new(Ticks::new()),
            logger: Box::new(DummyLogger),
            output: Box::new(std::io::stdout()),
            config,
        }
    }

    /// Creates an environment with the builtin natives installed.
    pub fn with_builtins(config: EnvConfig) -> Self {
        let mut env = Self::new(config);
        env.native_set(builtins::BUILTINS);
        env
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Where `print` writes to.
    pub fn set_output(&mut self, output: Box<dyn Write>) {
        self.output = output;
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    pub fn set_logger(&mut self, logger: Box<dyn Logger>) {
        self.logger = logger;
    }

    /// The tick counter driving the timers. The handle may be given to
    /// another thread (e.g. one emulating a timer interrupt) to advance it.
    pub fn ticks(&self) -> Arc<Ticks> {
        self.ticks.clone()
    }

    // --- Natives and globals

    /// Installs natives as globals under their names. A name that is
    /// already registered keeps its id and gets the new function.
    pub fn native_set(&mut self, entries: &[NativeEntry]) {
        for entry in entries {
            self.native_register(entry.name, entry.func);
        }
    }

    pub fn native_register(&mut self, name: &str, func: NativeFn) -> NativeId {
        let id = self.natives.register(name, func);
        log!(self.logger, "registered native '{}' as {}", name, id.0);
        self.define_global(name, Value::Native(id));
        id
    }

    pub fn native_name(&self, id: NativeId) -> Option<&str> {
        self.natives.name(id)
    }

    pub fn native_lookup(&self, name: &str) -> Option<NativeId> {
        self.natives.lookup(name)
    }

    /// Binds a global, taking over the caller's reference to `value` and
    /// releasing the previous value.
    pub fn define_global(&mut self, name: &str, value: Value) {
        match self.global_names.get(name) {
            Some(slot) => {
                let old = std::mem::replace(&mut self.globals[*slot as usize], value);
                self.heap.release(old);
            },
            None => {
                let slot = self.globals.len() as u32;
                self.globals.push(value);
                self.global_names.insert(name.into(), slot);
            }
        }
    }

    /// Current value of a global, without taking a reference.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.global_names.get(name).map(|slot| self.globals[*slot as usize])
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.global_names.contains_key(name)
    }

    // --- Compilation and execution

    /// Compiles a unit against the globals this environment knows about.
    pub fn compile(&self, source: &InputSource) -> Result<Program, ParseError> {
        let known = |name: &str| self.global_names.contains_key(name);
        crate::lang::compile(source, &self.config.compile, &known)
    }

    /// Compiles and runs source text. Returns the value of the last top level
    /// expression statement, owned by the caller.
    pub fn execute_source(&mut self, source: &InputSource) -> Result<Value, PandaError> {
        let program = match self.compile(source) {
            Ok(program) => program,
            Err(e) => {
                log!(self.logger, "compilation of '{}' failed: {}", source.filename, e.message());
                return Err(e.into());
            }
        };
        Ok(self.execute_program(program)?)
    }

    pub fn execute_string(&mut self, text: &str) -> Result<Value, PandaError> {
        let source = InputSource::from_str("string", text);
        self.execute_source(&source)
    }

    /// Validates and runs a compiled image.
    pub fn execute_image(&mut self, bytes: &[u8]) -> Result<Value, PandaError> {
        let image = match Image::load(bytes) {
            Ok(image) => image,
            Err(e) => {
                log!(self.logger, "rejected image of {} bytes: {}", bytes.len(), e);
                return Err(e.into());
            }
        };
        let program = Program::from_image(&image);
        Ok(self.execute_program(program)?)
    }

    /// Loads a program as a new unit and runs its top level code.
    pub fn execute_program(&mut self, program: Program) -> ExecResult<Value> {
        let unit = self.load_program(program)?;
        log!(self.logger, "executing unit {}", unit);
        let result = self.call_value(Value::Function(FuncRef{ unit, index: 0 }), &[]);
        match &result {
            Ok(_) => log!(self.logger, "unit {} finished", unit),
            Err(e) => log!(self.logger, "unit {} failed with {}: {}", unit, e.code(), e),
        }
        result
    }

    fn load_program(&mut self, program: Program) -> ExecResult<u32> {
        if program.functions.is_empty() {
            return Err(ExecError::InvalidOperand);
        }
        let footprint = program.footprint();
        if self.code_used + footprint > self.config.code_space {
            log!(
                self.logger, "no code space for {} bytes ({} of {} used)",
                footprint, self.code_used, self.config.code_space
            );
            return Err(ExecError::OutOfMemory);
        }

        self.code_used += footprint;
        let unit = self.units.len() as u32;
        let global_slots = vec![None; program.strings.len()];
        self.units.push(Unit{ program: Rc::new(program), global_slots });
        Ok(unit)
    }

    /// Bytes of code space taken by the loaded units.
    pub fn code_used(&self) -> usize {
        self.code_used
    }

    /// Calls a function value with the given arguments. Used by the host and
    /// by natives to call back into scripts. The arguments stay owned by the
    /// caller, the result is owned by the caller.
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> ExecResult<Value> {
        let entry_frames = self.frames.len();
        let entry_stack = self.stack.len();
        let result = self.call_value_inner(callee, args, entry_frames, entry_stack);
        if result.is_err() {
            self.unwind(entry_frames, entry_stack);
        }
        result
    }

    fn call_value_inner(&mut self, callee: Value, args: &[Value], entry_frames: usize, entry_stack: usize) -> ExecResult<Value> {
        if !callee.is_function() {
            return Err(ExecError::NotCallable);
        }
        if !self.stack.has_room(args.len() + 1) {
            return Err(ExecError::StackOverflow);
        }

        let callee = self.heap.retain(callee);
        self.push(callee)?;
        for arg in args {
            let arg = self.heap.retain(*arg);
            self.push(arg)?;
        }

        self.call(args.len())?;
        self.run(entry_frames)?;
        self.stack.pop_above(entry_stack)
    }

    /// Drops everything an aborted execution left behind.
    fn unwind(&mut self, entry_frames: usize, entry_stack: usize) {
        self.frames.truncate(entry_frames);
        for value in self.stack.drain_from(entry_stack) {
            self.heap.release(value);
        }
    }

    // --- Values owned by the host

    pub fn retain(&mut self, value: Value) -> Value {
        self.heap.retain(value)
    }

    pub fn release(&mut self, value: Value) {
        self.heap.release(value)
    }

    pub fn alloc_string(&mut self, text: &str) -> ExecResult<Value> {
        self.heap.alloc_str(text).map_err(|e| self.report_alloc_failure(e))
    }

    /// Wraps a host owned string without copying it.
    pub fn alloc_foreign(&mut self, text: Rc<str>, handle: usize) -> ExecResult<Value> {
        self.heap.alloc_foreign(text, handle).map_err(|e| self.report_alloc_failure(e))
    }

    pub fn foreign_handle(&self, value: Value) -> Option<usize> {
        self.heap.foreign_handle(value)
    }

    fn report_alloc_failure(&mut self, error: ExecError) -> ExecError {
        log!(self.logger, "allocation failed, pools: {:?}", self.heap.stats());
        error
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_stats(&self) -> Vec<PoolStats> {
        self.heap.stats()
    }

    /// Values currently on the value stack. Zero whenever no execution is in
    /// progress.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // --- Timers

    /// Registers `callback` to be called with `param` once `wait` ticks have
    /// passed, and every `wait` ticks after that if `repeat` is set.
    pub fn timeout_register(&mut self, wait: u32, callback: Value, repeat: bool, param: Value) -> ExecResult<TimerId> {
        if !callback.is_function() {
            return Err(ExecError::NotCallable);
        }
        let block = self.heap.alloc_timer().map_err(|e| self.report_alloc_failure(e))?;
        let callback = self.heap.retain(callback);
        let param = self.heap.retain(param);
        let now = self.ticks.now();
        let id = self.timeouts.insert(wait, now, repeat, callback, param, block);
        log!(self.logger, "registered timer {} (wait {}, repeat {}) at {}", id, wait, repeat, now);
        Ok(id)
    }

    /// Removes a timer. Returns whether it was registered.
    pub fn timeout_unregister(&mut self, id: TimerId) -> bool {
        match self.timeouts.remove(id) {
            Some(node) => {
                self.heap.release(node.callback);
                self.heap.release(node.param);
                self.heap.release_block(node.block);
                log!(self.logger, "unregistered timer {}", id);
                true
            },
            None => false,
        }
    }

    /// Removes every timer, returning how many there were.
    pub fn timeout_clear_all(&mut self) -> usize {
        let removed = self.timeouts.remove_where(|_| true);
        let count = removed.len();
        for node in removed {
            self.heap.release(node.callback);
            self.heap.release(node.param);
            self.heap.release_block(node.block);
        }
        if count > 0 {
            log!(self.logger, "cleared {} timers", count);
        }
        count
    }

    pub fn timeout_count(&self) -> usize {
        self.timeouts.len()
    }

    /// Fires every timer due at tick `now`, in registration order. Returns
    /// the number of callbacks run. The first failing callback aborts the
    /// poll; timers not yet fired are retried on the next poll if repeating,
    /// and dropped if one-shot.
    pub fn timeout_poll(&mut self, now: u32) -> ExecResult<usize> {
        let fired = self.timeouts.collect_due(now);

        // Repeating timers still own their values, and a callback may
        // unregister a timer that is about to fire
        for entry in fired.iter() {
            if entry.block.is_none() {
                self.heap.retain(entry.callback);
                self.heap.retain(entry.param);
            }
        }

        let mut count = 0;
        let mut result = Ok(());
        for entry in fired {
            let active = entry.block.is_some() || self.timeouts.contains(entry.id);
            if active && result.is_ok() {
                log!(self.logger, "timer {} fired at {}", entry.id, now);
                match self.call_value(entry.callback, &[entry.param]) {
                    Ok(value) => {
                        self.heap.release(value);
                        count += 1;
                    },
                    Err(e) => {
                        log!(self.logger, "timer {} failed with {}: {}", entry.id, e.code(), e);
                        result = Err(e);
                    }
                }
            }

            self.heap.release(entry.callback);
            self.heap.release(entry.param);
            if let Some(block) = entry.block {
                self.heap.release_block(block);
            }
        }

        result.map(|_| count)
    }

    /// Polls the timers against the environment's own tick counter.
    pub fn timeout_poll_now(&mut self) -> ExecResult<usize> {
        let now = self.ticks.now();
        self.timeout_poll(now)
    }
}

impl Debug for Env {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("id", &self.id)
            .field("units", &self.units.len())
            .field("globals", &self.globals.len())
            .field("timers", &self.timeouts.len())
            .field("code_used", &self.code_used)
            .finish()
    }
}
