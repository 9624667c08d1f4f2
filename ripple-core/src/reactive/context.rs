//! Tracking Context
//!
//! The tracking context records which subscriber is currently running, so a
//! read can link the value it reads to whoever is reading it.
//!
//! # Implementation
//!
//! Each runtime owns one context: an `active` cursor plus a stack of
//! suspended cursors. Running a computed or effect swaps the cursor in through
//! a [`TrackingPass`] guard, which restores the previous one and closes the
//! graph pass when dropped. Because the guard runs on unwind too, a panicking
//! getter can never leave the cursor pointing at a dead run.
//!
//! Untracked regions push the current cursor onto the suspended stack and
//! clear it; resuming pops it back.

use std::cell::{Cell, RefCell};
use std::thread;

use tracing::trace;

use super::runtime::RuntimeInner;
use crate::graph::{Flags, NodeId};

/// Per-runtime "current subscriber" state.
#[derive(Debug, Default)]
pub(crate) struct TrackingContext {
    active: Cell<Option<NodeId>>,
    suspended: RefCell<Vec<Option<NodeId>>>,
}

impl TrackingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The subscriber reads should currently link to, if any.
    pub(crate) fn active(&self) -> Option<NodeId> {
        self.active.get()
    }

    /// Install a new cursor, returning the previous one.
    pub(crate) fn replace(&self, sub: Option<NodeId>) -> Option<NodeId> {
        self.active.replace(sub)
    }

    /// Suspend tracking until the matching [`resume`](Self::resume).
    pub(crate) fn pause(&self) {
        let previous = self.active.replace(None);
        self.suspended.borrow_mut().push(previous);
    }

    /// Restore the cursor saved by the last [`pause`](Self::pause).
    ///
    /// An unmatched resume leaves tracking off.
    pub(crate) fn resume(&self) {
        let previous = self.suspended.borrow_mut().pop().flatten();
        self.active.set(previous);
    }

    pub(crate) fn is_tracking(&self) -> bool {
        self.active.get().is_some()
    }

    pub(crate) fn suspended_depth(&self) -> usize {
        self.suspended.borrow().len()
    }
}

/// Guard for one run of a subscriber.
///
/// Construction makes `node` the active subscriber and opens its tracking
/// pass. Dropping restores the previous subscriber and closes the pass,
/// pruning the links that were not read again.
pub(crate) struct TrackingPass<'a> {
    runtime: &'a RuntimeInner,
    node: NodeId,
    previous: Option<NodeId>,
    /// Opened from code that was already unwinding.
    nested_in_unwind: bool,
}

impl<'a> TrackingPass<'a> {
    pub(crate) fn new(runtime: &'a RuntimeInner, node: NodeId) -> Self {
        let previous = runtime.context.replace(Some(node));
        runtime.graph.borrow_mut().start_tracking(node);
        Self {
            runtime,
            node,
            previous,
            nested_in_unwind: thread::panicking(),
        }
    }
}

impl Drop for TrackingPass<'_> {
    fn drop(&mut self) {
        self.runtime.context.replace(self.previous);

        // A panic raised by graph code itself would still hold the borrow.
        let Ok(mut graph) = self.runtime.graph.try_borrow_mut() else {
            return;
        };
        if !graph.contains(self.node) {
            return;
        }
        let pruned = graph.end_tracking(self.node);
        // A getter that unwound produced no value: the cache and the links
        // kept so far are both unconfirmed.
        let unwound = thread::panicking() && !self.nested_in_unwind;
        if unwound && graph.node(self.node).is_computed() {
            graph.node_mut(self.node).flags.insert(Flags::DIRTY);
        }
        drop(graph);

        if pruned > 0 {
            trace!(
                runtime = self.runtime.label(),
                node = %self.node,
                pruned,
                "pruned stale dependencies"
            );
        }
    }
}

/// Guard for an untracked region. Resumes tracking when dropped.
pub(crate) struct Untracked<'a> {
    context: &'a TrackingContext,
}

impl<'a> Untracked<'a> {
    pub(crate) fn new(context: &'a TrackingContext) -> Self {
        context.pause();
        Self { context }
    }
}

impl Drop for Untracked<'_> {
    fn drop(&mut self) {
        self.context.resume();
    }
}
