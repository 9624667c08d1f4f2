//! Effect Queue
//!
//! Propagation never runs user code. Instead, every effect reached by a write
//! is appended here and the runtime drains the queue once the outermost batch
//! (or the write itself, outside a batch) finishes.
//!
//! # Ordering
//!
//! Effects are queued in the order the propagation walk reaches them: direct
//! subscribers in insertion order, transitive ones depth-first. The queue is
//! FIFO so that order is the notification order.

use std::collections::VecDeque;

use super::node::NodeId;

/// FIFO of effects waiting for `notify()`.
#[derive(Debug, Default)]
pub(crate) struct EffectQueue {
    pending: VecDeque<NodeId>,
}

impl EffectQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, effect: NodeId) {
        self.pending.push_back(effect);
    }

    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        self.pending.pop_front()
    }

    /// Forget a node that is being removed from the arena.
    pub(crate) fn purge(&mut self, node: NodeId) {
        self.pending.retain(|queued| *queued != node);
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pending.iter().copied()
    }
}
