/// executor.rs
///
/// The dispatch loop. Frames live on a separate frame stack, their locals and
/// operands on the shared value stack:
///
///   [ ... | callee | arg_0 .. arg_n | locals .. | operands .. ]
///                    ^ base          ^ base + arg_count
///
/// Every value on the stack holds a reference. Returning from a frame
/// releases everything from the callee slot upwards and leaves the result in
/// its place.

use crate::common::*;
use crate::lang::bytecode::decode;
use crate::lang::FunctionDef;

use super::Frame;

macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "exec", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "exec", $format, $($args),*);
    };
}

impl Env {
    #[inline]
    pub(crate) fn push(&mut self, value: Value) -> ExecResult<()> {
        match self.stack.push(value) {
            Ok(()) => Ok(()),
            Err(value) => {
                self.heap.release(value);
                Err(ExecError::StackOverflow)
            }
        }
    }

    /// Calls the callee found below the topmost `argc` values. Script
    /// functions get a new frame which `run` picks up, natives run to
    /// completion and leave their result in the callee's slot.
    pub(crate) fn call(&mut self, argc: usize) -> ExecResult<()> {
        let callee_at = self.stack.len().checked_sub(argc + 1).ok_or(ExecError::StackUnderflow)?;
        let callee = self.stack.get(callee_at)?;
        match callee {
            Value::Function(func) => self.enter_function(func, None, callee_at),
            Value::Closure(block) => {
                let func = self.heap.closure_func(block).ok_or(ExecError::TypeMismatch)?;
                self.enter_function(func, Some(block), callee_at)
            },
            Value::Native(id) => self.call_native(id, callee_at),
            _ => Err(ExecError::NotCallable),
        }
    }

    fn enter_function(&mut self, func: FuncRef, closure: Option<BlockRef>, callee_at: usize) -> ExecResult<()> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(ExecError::CallDepthExceeded);
        }

        let program = self.units.get(func.unit as usize).ok_or(ExecError::InvalidOperand)?.program.clone();
        let def = program.function(func.index).ok_or(ExecError::InvalidOperand)?;
        let var_count = def.var_count as usize;
        let arg_count = def.arg_count as usize;
        if arg_count > var_count {
            return Err(ExecError::InvalidOperand);
        }

        let base = callee_at + 1;
        if base + var_count + def.stack_high as usize > self.stack.capacity() {
            return Err(ExecError::StackOverflow);
        }

        // Surplus arguments are dropped, missing ones and the locals start
        // out undefined
        while self.stack.len() > base + arg_count {
            let surplus = self.stack.pop_above(base + arg_count)?;
            self.heap.release(surplus);
        }
        while self.stack.len() < base + var_count {
            self.push(Value::Undefined)?;
        }

        debug_log!("enter {}:{} base {}", func.unit, func.index, base);
        self.frames.push(Frame{ unit: func.unit, func: func.index, pc: 0, base, closure, program });
        Ok(())
    }

    fn call_native(&mut self, id: NativeId, callee_at: usize) -> ExecResult<()> {
        let func = self.natives.get(id).ok_or(ExecError::NotCallable)?;

        // The stack keeps the arguments alive for the duration of the call
        let mut args = std::mem::take(&mut self.native_args);
        args.clear();
        args.extend_from_slice(self.stack.slice_from(callee_at + 1));
        let result = func(self, &args);
        args.clear();
        self.native_args = args;

        for value in self.stack.drain_from(callee_at) {
            self.heap.release(value);
        }
        self.push(result?)
    }

    /// Runs until the frame stack is back at `entry_frames` frames. The
    /// result of the last returning frame is left on top of the stack.
    pub(crate) fn run(&mut self, entry_frames: usize) -> ExecResult<()> {
        'frames: while self.frames.len() > entry_frames {
            let frame_idx = self.frames.len() - 1;
            let (program, unit, func_idx, base, closure, mut pc) = {
                let frame = &self.frames[frame_idx];
                (frame.program.clone(), frame.unit, frame.func, frame.base, frame.closure, frame.pc)
            };
            let def: &FunctionDef = program.function(func_idx).ok_or(ExecError::InvalidOperand)?;
            let code = &def.code[..];
            let var_count = def.var_count as usize;
            let floor = base + var_count;

            loop {
                let inst = decode(code, pc)?;
                debug_log!("{}:{} {:04} {}", unit, func_idx, pc, inst);
                pc += inst.size();
                let a = inst.a;

                match inst.op {
                    OpCode::Nop => {},
                    OpCode::PushUndefined => self.push(Value::Undefined)?,
                    OpCode::PushNaN => self.push(Value::NaN)?,
                    OpCode::PushTrue => self.push(Value::Boolean(true))?,
                    OpCode::PushFalse => self.push(Value::Boolean(false))?,
                    OpCode::PushZero => self.push(Value::Number(0.0))?,
                    OpCode::PushInt => self.push(Value::Number(a as f64))?,
                    OpCode::PushNumber => {
                        let number = program.number(a).ok_or(ExecError::InvalidOperand)?;
                        self.push(Value::number(number))?;
                    },
                    OpCode::PushString => {
                        if a as usize >= program.strings.len() {
                            return Err(ExecError::InvalidOperand);
                        }
                        self.push(Value::StaticStr(StrRef{ unit, index: a }))?;
                    },
                    OpCode::PushFunction => {
                        if a as usize >= program.functions.len() {
                            return Err(ExecError::InvalidOperand);
                        }
                        self.push(Value::Function(FuncRef{ unit, index: a }))?;
                    },
                    OpCode::MakeClosure => {
                        if a as usize >= program.functions.len() {
                            return Err(ExecError::InvalidOperand);
                        }
                        let cells = self.pop_values(floor, inst.b as usize)?;
                        if cells.iter().any(|c| !matches!(c, Value::Cell(_))) {
                            self.heap.release_all(cells);
                            return Err(ExecError::InvalidOperand);
                        }
                        let closure = self.heap.alloc_closure(FuncRef{ unit, index: a }, cells)?;
                        self.push(closure)?;
                    },
                    OpCode::MakeArray => {
                        let items = self.pop_values(floor, a as usize)?;
                        let array = self.heap.alloc_array(items)?;
                        self.push(array)?;
                    },
                    OpCode::MakeObject => {
                        let values = self.pop_values(floor, 2 * a as usize)?;
                        let object = self.make_object(values)?;
                        self.push(object)?;
                    },
                    OpCode::Pop => {
                        let value = self.stack.pop_above(floor)?;
                        self.heap.release(value);
                    },
                    OpCode::Dup => {
                        let value = self.stack.peek_above(floor, 0)?;
                        let value = self.heap.retain(value);
                        self.push(value)?;
                    },
                    OpCode::Dup2 => {
                        let first = self.stack.peek_above(floor, 1)?;
                        let second = self.stack.peek_above(floor, 0)?;
                        let first = self.heap.retain(first);
                        self.push(first)?;
                        let second = self.heap.retain(second);
                        self.push(second)?;
                    },
                    OpCode::LoadLocal => {
                        let value = self.stack.get(Self::local(base, var_count, a)?)?;
                        let value = self.heap.retain(value);
                        self.push(value)?;
                    },
                    OpCode::StoreLocal => {
                        let slot = Self::local(base, var_count, a)?;
                        let value = self.stack.peek_above(floor, 0)?;
                        let value = self.heap.retain(value);
                        let old = self.stack.replace(slot, value)?;
                        self.heap.release(old);
                    },
                    OpCode::LoadCell => {
                        let cell = self.local_cell(base, var_count, a)?;
                        let value = self.heap.cell_get(cell).ok_or(ExecError::InvalidOperand)?;
                        let value = self.heap.retain(value);
                        self.push(value)?;
                    },
                    OpCode::StoreCell => {
                        let cell = self.local_cell(base, var_count, a)?;
                        let value = self.stack.peek_above(floor, 0)?;
                        let value = self.heap.retain(value);
                        self.heap.cell_set(cell, value)?;
                    },
                    OpCode::MakeCell => {
                        // The slot must not hold the value while the cell is
                        // allocated: a failed allocation releases it
                        let slot = Self::local(base, var_count, a)?;
                        let value = self.stack.replace(slot, Value::Undefined)?;
                        let cell = self.heap.alloc_cell(value)?;
                        self.stack.replace(slot, cell)?;
                    },
                    OpCode::PushCell => {
                        let cell = self.local_cell(base, var_count, a)?;
                        let cell = self.heap.retain(Value::Cell(cell));
                        self.push(cell)?;
                    },
                    OpCode::LoadUpvalue => {
                        let cell = self.upvalue_cell(closure, a)?;
                        let value = self.heap.cell_get(cell).ok_or(ExecError::InvalidOperand)?;
                        let value = self.heap.retain(value);
                        self.push(value)?;
                    },
                    OpCode::StoreUpvalue => {
                        let cell = self.upvalue_cell(closure, a)?;
                        let value = self.stack.peek_above(floor, 0)?;
                        let value = self.heap.retain(value);
                        self.heap.cell_set(cell, value)?;
                    },
                    OpCode::PushUpvalue => {
                        let cell = self.upvalue_cell(closure, a)?;
                        let cell = self.heap.retain(Value::Cell(cell));
                        self.push(cell)?;
                    },
                    OpCode::LoadGlobal => {
                        let slot = match self.global_slot(unit, &program, a)? {
                            Some(slot) => slot,
                            None => {
                                let name = program.string(a).unwrap_or("");
                                return Err(ExecError::UndefinedVariable(name.to_owned()));
                            }
                        };
                        let value = self.globals[slot as usize];
                        let value = self.heap.retain(value);
                        self.push(value)?;
                    },
                    OpCode::StoreGlobal => {
                        let value = self.stack.peek_above(floor, 0)?;
                        let value = self.heap.retain(value);
                        self.assign_global(unit, &program, a, value)?;
                    },
                    OpCode::DefineGlobal => {
                        let value = self.stack.pop_above(floor)?;
                        self.assign_global(unit, &program, a, value)?;
                    },
                    OpCode::DeclareGlobal => {
                        if self.global_slot(unit, &program, a)?.is_none() {
                            self.assign_global(unit, &program, a, Value::Undefined)?;
                        }
                    },
                    OpCode::GetElem => {
                        let key = self.stack.pop_above(floor)?;
                        let subject = self.stack.pop_above(floor)?;
                        let result = self.get_elem(subject, key);
                        self.heap.release(subject);
                        self.heap.release(key);
                        self.push(result?)?;
                    },
                    OpCode::SetElem => {
                        let value = self.stack.pop_above(floor)?;
                        let key = self.stack.pop_above(floor)?;
                        let subject = self.stack.pop_above(floor)?;
                        let result = self.set_elem(subject, key, value);
                        self.heap.release(subject);
                        self.heap.release(key);
                        if let Err(e) = result {
                            self.heap.release(value);
                            return Err(e);
                        }
                        self.push(value)?;
                    },
                    OpCode::Neg | OpCode::Not | OpCode::BitNot => {
                        let value = self.stack.pop_above(floor)?;
                        let result = self.unary(inst.op, value);
                        self.heap.release(value);
                        self.push(result?)?;
                    },
                    OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod |
                    OpCode::BitAnd | OpCode::BitOr | OpCode::BitXor | OpCode::Shl | OpCode::Shr |
                    OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Le | OpCode::Gt | OpCode::Ge => {
                        let rhs = self.stack.pop_above(floor)?;
                        let lhs = self.stack.pop_above(floor)?;
                        let result = self.binary(inst.op, lhs, rhs);
                        self.heap.release(lhs);
                        self.heap.release(rhs);
                        self.push(result?)?;
                    },
                    OpCode::Jump => pc = a as usize,
                    OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                        let value = self.stack.pop_above(floor)?;
                        let truthy = self.is_truthy(value);
                        self.heap.release(value);
                        if truthy == (inst.op == OpCode::JumpIfTrue) {
                            pc = a as usize;
                        }
                    },
                    OpCode::JumpIfFalseOrPop | OpCode::JumpIfTrueOrPop => {
                        let value = self.stack.peek_above(floor, 0)?;
                        if self.is_truthy(value) == (inst.op == OpCode::JumpIfTrueOrPop) {
                            pc = a as usize;
                        } else {
                            let value = self.stack.pop_above(floor)?;
                            self.heap.release(value);
                        }
                    },
                    OpCode::Call => {
                        if self.stack.len() < floor + a as usize + 1 {
                            return Err(ExecError::StackUnderflow);
                        }
                        self.frames[frame_idx].pc = pc;
                        self.call(a as usize)?;
                        continue 'frames;
                    },
                    OpCode::Return | OpCode::ReturnUndefined => {
                        let result = match inst.op {
                            OpCode::Return => self.stack.pop_above(floor)?,
                            _ => Value::Undefined,
                        };
                        for value in self.stack.drain_from(base.saturating_sub(1)) {
                            self.heap.release(value);
                        }
                        self.frames.pop();
                        debug_log!("leave {}:{}", unit, func_idx);
                        self.push(result)?;
                        continue 'frames;
                    },
                }
            }
        }

        Ok(())
    }

    #[inline]
    fn local(base: usize, var_count: usize, slot: u16) -> ExecResult<usize> {
        if slot as usize >= var_count {
            return Err(ExecError::InvalidOperand);
        }
        Ok(base + slot as usize)
    }

    fn local_cell(&self, base: usize, var_count: usize, slot: u16) -> ExecResult<BlockRef> {
        match self.stack.get(Self::local(base, var_count, slot)?)? {
            Value::Cell(cell) => Ok(cell),
            _ => Err(ExecError::InvalidOperand),
        }
    }

    fn upvalue_cell(&self, closure: Option<BlockRef>, index: u16) -> ExecResult<BlockRef> {
        let closure = closure.ok_or(ExecError::InvalidOperand)?;
        match self.heap.closure_cell(closure, index as usize) {
            Some(Value::Cell(cell)) => Ok(cell),
            _ => Err(ExecError::InvalidOperand),
        }
    }

    /// Pops the topmost `count` operands, bottom one first.
    fn pop_values(&mut self, floor: usize, count: usize) -> ExecResult<Vec<Value>> {
        let len = self.stack.len();
        if len < floor + count {
            return Err(ExecError::StackUnderflow);
        }
        Ok(self.stack.drain_from(len - count).collect())
    }

    /// Builds an object from alternating keys and values, taking ownership
    /// of all of them.
    fn make_object(&mut self, values: Vec<Value>) -> ExecResult<Value> {
        let mut props = Vec::with_capacity(values.len() / 2);
        let mut failed = false;
        let mut iter = values.into_iter();
        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            let text = if failed { None } else { self.string_of(key).map(Box::<str>::from) };
            match text {
                Some(text) => props.push((text, value)),
                None => {
                    failed = true;
                    self.heap.release(value);
                }
            }
            self.heap.release(key);
        }

        if failed {
            self.heap.release_all(props.into_iter().map(|(_, v)| v));
            return Err(ExecError::TypeMismatch);
        }
        self.heap.alloc_object(props)
    }

    // --- Globals

    /// Slot of the global named by string constant `name` of the running
    /// unit. Lookups by name are cached per unit.
    fn global_slot(&mut self, unit: u32, program: &Program, name: u16) -> ExecResult<Option<u32>> {
        let cache = &self.units[unit as usize].global_slots;
        if let Some(Some(slot)) = cache.get(name as usize) {
            return Ok(Some(*slot));
        }

        let text = program.string(name).ok_or(ExecError::InvalidOperand)?;
        let slot = match self.global_names.get(text) {
            Some(slot) => *slot,
            None => return Ok(None),
        };
        if let Some(entry) = self.units[unit as usize].global_slots.get_mut(name as usize) {
            *entry = Some(slot);
        }
        Ok(Some(slot))
    }

    /// Stores an owned value in a global, creating it when needed.
    fn assign_global(&mut self, unit: u32, program: &Program, name: u16, value: Value) -> ExecResult<()> {
        match self.global_slot(unit, program, name) {
            Ok(Some(slot)) => {
                let old = std::mem::replace(&mut self.globals[slot as usize], value);
                self.heap.release(old);
                Ok(())
            },
            Ok(None) => {
                let text = program.string(name).unwrap_or("");
                self.define_global(text, value);
                Ok(())
            },
            Err(e) => {
                self.heap.release(value);
                Err(e)
            }
        }
    }
}
