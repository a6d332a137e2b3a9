/// timeout.rs
///
/// Timers driven by an external tick counter. The host advances the counter
/// (typically from a timer interrupt) and calls the environment's poll
/// function from its main loop; due callbacks run synchronously from there,
/// never in the middle of an instruction.

use std::sync::atomic::{AtomicU32, Ordering};

use super::heap::BlockRef;
use super::value::Value;

pub type TimerId = u32;

/// The system tick counter. Wraps around; all tick arithmetic is modular.
#[derive(Debug, Default)]
pub struct Ticks(AtomicU32);

impl Ticks {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn now(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Advances the counter, returning the new value.
    pub fn advance(&self, ticks: u32) -> u32 {
        self.0.fetch_add(ticks, Ordering::AcqRel).wrapping_add(ticks)
    }

    pub fn set(&self, now: u32) {
        self.0.store(now, Ordering::Release)
    }
}

/// A registered timer. The node owns a reference to its callback and
/// parameter, and the heap block accounting for it.
pub(crate) struct TimeoutNode {
    pub(crate) id: TimerId,
    pub(crate) wait: u32,
    pub(crate) origin: u32,
    pub(crate) repeat: bool,
    pub(crate) callback: Value,
    pub(crate) param: Value,
    pub(crate) block: BlockRef,
}

impl TimeoutNode {
    #[inline]
    fn is_due(&self, now: u32) -> bool {
        now.wrapping_sub(self.origin) >= self.wait
    }
}

/// A timer selected for firing. For a one-shot timer the values and block
/// were taken over from the removed node. For a repeating timer they are
/// still owned by the node and `block` is `None`.
pub(crate) struct Fired {
    pub(crate) id: TimerId,
    pub(crate) callback: Value,
    pub(crate) param: Value,
    pub(crate) block: Option<BlockRef>,
}

/// Active timers in registration order
#[derive(Default)]
pub(crate) struct TimeoutList {
    nodes: Vec<TimeoutNode>,
    next_id: TimerId,
}

impl TimeoutList {
    pub(crate) fn insert(&mut self, wait: u32, origin: u32, repeat: bool, callback: Value, param: Value, block: BlockRef) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        while self.next_id == 0 || self.contains(self.next_id) {
            self.next_id = self.next_id.wrapping_add(1);
        }

        let id = self.next_id;
        self.nodes.push(TimeoutNode{ id, wait, origin, repeat, callback, param, block });
        id
    }

    pub(crate) fn contains(&self, id: TimerId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub(crate) fn remove(&mut self, id: TimerId) -> Option<TimeoutNode> {
        let position = self.nodes.iter().position(|n| n.id == id)?;
        Some(self.nodes.remove(position))
    }

    /// Removes the timers matching the filter, keeping the others in order.
    pub(crate) fn remove_where<F: Fn(&TimeoutNode) -> bool>(&mut self, filter: F) -> Vec<TimeoutNode> {
        let mut removed = Vec::new();
        let mut idx = 0;
        while idx < self.nodes.len() {
            if filter(&self.nodes[idx]) {
                removed.push(self.nodes.remove(idx));
            } else {
                idx += 1;
            }
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Selects every due timer in registration order. One-shot timers are
    /// removed from the list, repeating timers have their origin advanced by
    /// a whole number of intervals, so they fire at most once per call.
    pub(crate) fn collect_due(&mut self, now: u32) -> Vec<Fired> {
        let mut fired = Vec::new();
        let mut idx = 0;
        while idx < self.nodes.len() {
            if !self.nodes[idx].is_due(now) {
                idx += 1;
                continue;
            }

            if self.nodes[idx].repeat {
                let node = &mut self.nodes[idx];
                let elapsed = now.wrapping_sub(node.origin);
                if node.wait == 0 {
                    node.origin = now;
                } else {
                    node.origin = node.origin.wrapping_add(elapsed / node.wait * node.wait);
                }
                fired.push(Fired{ id: node.id, callback: node.callback, param: node.param, block: None });
                idx += 1;
            } else {
                let node = self.nodes.remove(idx);
                fired.push(Fired{ id: node.id, callback: node.callback, param: node.param, block: Some(node.block) });
            }
        }
        fired
    }
}
