//! Batching
//!
//! A batch defers effect notification until the outermost batch ends, so
//! several writes cost one flush and effects only ever observe the final
//! state.
//!
//! Batches nest by counting: only the transition back to depth zero flushes.
//! Propagation itself is not deferred; nodes are marked as each write lands,
//! which keeps computed reads inside the batch consistent.

use super::runtime::{Runtime, RuntimeInner};

impl RuntimeInner {
    pub(crate) fn start_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    pub(crate) fn end_batch(&self) {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        if depth == 0 {
            self.flush();
        }
    }
}

/// Closes a batch on drop. On unwind it only restores the counter; running
/// effects over half-applied writes would hide the original panic.
pub(crate) struct BatchGuard<'a>(&'a RuntimeInner);

impl<'a> BatchGuard<'a> {
    pub(crate) fn open(runtime: &'a RuntimeInner) -> Self {
        runtime.start_batch();
        Self(runtime)
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let depth = self.0.batch_depth.get();
            self.0.batch_depth.set(depth.saturating_sub(1));
        } else {
            self.0.end_batch();
        }
    }
}

impl Runtime {
    /// Run `f` as one batch: effects are notified once, after `f` returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::open(self.inner());
        f()
    }

    /// Open a batch by hand. Every call must be matched by
    /// [`end_batch`](Self::end_batch).
    pub fn start_batch(&self) {
        self.inner().start_batch();
    }

    /// Close a batch, flushing if it was the outermost one.
    pub fn end_batch(&self) {
        self.inner().end_batch();
    }

    /// Number of open batches.
    pub fn batch_depth(&self) -> u32 {
        self.inner().batch_depth.get()
    }
}

/// Run `f` as one batch in the current runtime.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().batch(f)
}

/// Open a batch in the current runtime.
pub fn start_batch() {
    Runtime::current().start_batch();
}

/// Close a batch in the current runtime.
pub fn end_batch() {
    Runtime::current().end_batch();
}
