use super::error::{ExecError, ExecResult};
use super::value::Value;

/// Value stack with a fixed number of slots. Frames address their locals
/// by absolute index, operands are pushed and popped at the top.
pub(crate) struct Stack {
    values: Vec<Value>,
    capacity: usize,
}

impl Stack {
    pub(crate) fn new(capacity: usize) -> Self {
        Self{ values: Vec::with_capacity(capacity), capacity }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `slots` more values fit.
    #[inline]
    pub(crate) fn has_room(&self, slots: usize) -> bool {
        self.values.len() + slots <= self.capacity
    }

    /// Pushes a value, handing it back when the stack is full so the caller
    /// can release it.
    #[inline]
    pub(crate) fn push(&mut self, value: Value) -> Result<(), Value> {
        if self.values.len() >= self.capacity {
            return Err(value);
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops an operand, never reaching below `floor`.
    #[inline]
    pub(crate) fn pop_above(&mut self, floor: usize) -> ExecResult<Value> {
        if self.values.len() <= floor {
            return Err(ExecError::StackUnderflow);
        }
        self.values.pop().ok_or(ExecError::StackUnderflow)
    }

    /// Value `depth` slots below the top, not removed.
    #[inline]
    pub(crate) fn peek_above(&self, floor: usize, depth: usize) -> ExecResult<Value> {
        let len = self.values.len();
        if len < floor + depth + 1 {
            return Err(ExecError::StackUnderflow);
        }
        Ok(self.values[len - 1 - depth])
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> ExecResult<Value> {
        self.values.get(index).copied().ok_or(ExecError::InvalidOperand)
    }

    /// Overwrites a slot, returning the previous value.
    #[inline]
    pub(crate) fn replace(&mut self, index: usize, value: Value) -> ExecResult<Value> {
        match self.values.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(ExecError::InvalidOperand),
        }
    }

    /// Removes every value from `from` upwards, in no particular order.
    pub(crate) fn drain_from(&mut self, from: usize) -> std::vec::Drain<'_, Value> {
        let from = from.min(self.values.len());
        self.values.drain(from..)
    }

    /// Values from `from` to the top.
    pub(crate) fn slice_from(&self, from: usize) -> &[Value] {
        let from = from.min(self.values.len());
        &self.values[from..]
    }
}
