/// emitter.rs
///
/// Collects the instructions of one function while it is being parsed. Jumps
/// refer to symbolic labels which are only turned into code offsets once the
/// function is finished, at which point the final layout is known. Finishing
/// also rewrites the accesses to locals that turned out to be captured by a
/// nested function into cell accesses, and boxes those locals on entry.

use crate::lang::bytecode::{Instruction, OpCode};
use crate::lang::FunctionDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label(u32);

struct PendingInstruction {
    op: OpCode,
    a: u16,
    b: u16,
    target: Option<Label>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EmitError {
    FunctionTooLarge,
    StackTooDeep,
}

pub(crate) struct FunctionEmitter {
    instructions: Vec<PendingInstruction>,
    // Index of the instruction a label points at
    labels: Vec<Option<usize>>,
    depth: i32,
    max_depth: i32,
}

impl FunctionEmitter {
    pub(crate) fn new() -> Self {
        Self{ instructions: Vec::new(), labels: Vec::new(), depth: 0, max_depth: 0 }
    }

    pub(crate) fn emit(&mut self, op: OpCode, a: u16, b: u16) {
        debug_assert!(!op.is_jump(), "jumps are emitted through emit_jump");
        self.push(PendingInstruction{ op, a, b, target: None });
    }

    #[inline]
    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit(op, 0, 0)
    }

    pub(crate) fn emit_jump(&mut self, op: OpCode, target: Label) {
        debug_assert!(op.is_jump());
        self.push(PendingInstruction{ op, a: 0, b: 0, target: Some(target) });
    }

    fn push(&mut self, instruction: PendingInstruction) {
        self.depth += instruction.op.stack_effect(instruction.a, instruction.b);
        debug_assert!(self.depth >= 0, "negative stack depth after {}", instruction.op);
        self.max_depth = self.max_depth.max(self.depth);
        self.instructions.push(instruction);
    }

    pub(crate) fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    /// Places the label in front of the next emitted instruction.
    pub(crate) fn place_label(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.instructions.len());
    }

    #[inline]
    pub(crate) fn depth(&self) -> i32 {
        self.depth
    }

    /// Resets the tracked depth, used when code paths join after a branch.
    #[inline]
    pub(crate) fn set_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    pub(crate) fn finish(self, var_count: usize, arg_count: u16, captured: &[bool], is_closure: bool) -> Result<FunctionDef, EmitError> {
        let stack_high = self.max_depth.max(0);
        if stack_high > u16::MAX as i32 {
            return Err(EmitError::StackTooDeep);
        }

        let mut prologue = Vec::new();
        for (slot, is_captured) in captured.iter().enumerate() {
            if *is_captured {
                prologue.push(Instruction::new(OpCode::MakeCell, slot as u16, 0));
            }
        }

        let is_captured = |slot: u16| captured.get(slot as usize).copied().unwrap_or(false);
        let prologue_size: usize = prologue.iter().map(|i| i.size()).sum();

        // Offsets of every instruction, plus one past the end for labels
        // placed after the last instruction.
        let mut offsets = Vec::with_capacity(self.instructions.len() + 1);
        let mut offset = prologue_size;
        for instruction in self.instructions.iter() {
            offsets.push(offset);
            offset += instruction.op.size();
        }
        offsets.push(offset);
        let code_size = offset;

        if code_size > u16::MAX as usize {
            return Err(EmitError::FunctionTooLarge);
        }

        let mut code = Vec::with_capacity(code_size);
        for instruction in prologue.iter() {
            instruction.encode(&mut code);
        }
        for pending in self.instructions.iter() {
            let mut instruction = Instruction::new(pending.op, pending.a, pending.b);
            match pending.op {
                OpCode::LoadLocal if is_captured(pending.a) => instruction.op = OpCode::LoadCell,
                OpCode::StoreLocal if is_captured(pending.a) => instruction.op = OpCode::StoreCell,
                _ => {},
            }
            if let Some(label) = pending.target {
                let target_idx = self.labels[label.0 as usize];
                debug_assert!(target_idx.is_some(), "unplaced label");
                let target_idx = target_idx.unwrap_or(self.instructions.len());
                instruction.a = offsets[target_idx] as u16;
            }
            instruction.encode(&mut code);
        }

        Ok(FunctionDef{
            var_count: var_count as u16,
            arg_count,
            stack_high: stack_high as u16,
            is_closure,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::bytecode::disassemble;

    fn listing(def: &FunctionDef) -> Vec<String> {
        disassemble(&def.code).unwrap().iter().map(|(_, i)| i.to_string()).collect()
    }

    #[test]
    fn test_labels_resolve_to_byte_offsets() {
        let mut emitter = FunctionEmitter::new();
        let end = emitter.new_label();
        emitter.emit_op(OpCode::PushTrue);
        emitter.emit_jump(OpCode::JumpIfFalse, end);
        emitter.emit(OpCode::PushInt, 5, 0);
        emitter.emit_op(OpCode::Pop);
        emitter.place_label(end);
        emitter.emit_op(OpCode::ReturnUndefined);

        let def = emitter.finish(0, 0, &[], false).unwrap();
        assert_eq!(listing(&def), vec![
            "push_true", "jump_if_false 8", "push_int 5", "pop", "return_undefined"
        ]);
        assert_eq!(def.stack_high, 1);
    }

    #[test]
    fn test_captured_locals_become_cells() {
        let mut emitter = FunctionEmitter::new();
        let top = emitter.new_label();
        emitter.place_label(top);
        emitter.emit(OpCode::LoadLocal, 1, 0);
        emitter.emit(OpCode::StoreLocal, 0, 0);
        emitter.emit_op(OpCode::Pop);
        emitter.emit_jump(OpCode::Jump, top);

        let def = emitter.finish(2, 1, &[false, true], false).unwrap();
        assert_eq!(listing(&def), vec![
            "make_cell 1", "load_cell 1", "store_local 0", "pop", "jump 3"
        ]);
    }

    #[test]
    fn test_oversized_function() {
        let mut emitter = FunctionEmitter::new();
        for _ in 0..22000 {
            emitter.emit(OpCode::PushInt, 1, 0);
            emitter.emit_op(OpCode::Pop);
        }
        assert_eq!(emitter.finish(0, 0, &[], false).err(), Some(EmitError::FunctionTooLarge));
    }
}
