//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created with [`Effect::new`], the effect runs its function
//!    immediately to establish initial dependencies.
//!
//! 2. When a dependency changes, the effect is queued and later notified.
//!    Notification re-checks dirtiness first: if the effect only depends on
//!    computeds that recomputed to the same value, nothing runs.
//!
//! 3. Each run is a tracking pass. Links read again are kept, new ones are
//!    added and the ones not read this time are dropped.
//!
//! # Scheduling
//!
//! By default a dirty effect re-runs synchronously. A scheduler installed
//! with [`Effect::set_scheduler`] is called instead; it decides when (and
//! whether) to call [`Effect::run`]. The watch layer is built on this hook.
//!
//! # Differences from Computed
//!
//! - Computeds return a cached value; effects return their function's
//!   result from `run()` but cache nothing.
//! - Computeds are lazy (compute on access); effects are eager (run when
//!   deps change).
//! - An effect lives until stopped, even with no handle left.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::TrackingPass;
use super::runtime::{release_node, Runtime, RuntimeInner};
use super::subscriber::Reactive;
use crate::graph::{Flags, Handler, NodeId, NodeKind};

type Scheduler = Rc<dyn Fn()>;

/// A side-effecting computation that re-runs when its dependencies change.
///
/// `T` is the function's return type, handed back by [`run`](Self::run).
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.stop();
/// count.set(6); // Prints nothing
/// ```
pub struct Effect<T: 'static = ()> {
    inner: Rc<EffectInner<T>>,
}

struct EffectInner<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    func: Box<dyn Fn() -> T>,
    scheduler: RefCell<Option<Scheduler>>,
    run_count: Cell<usize>,
}

impl<T> Drop for EffectInner<T> {
    fn drop(&mut self) {
        release_node(&self.runtime, self.id);
    }
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> Option<T> {
        let runtime = self.runtime.upgrade()?;
        if runtime.is_stopped(self.id) {
            return None;
        }
        let _pass = TrackingPass::new(&runtime, self.id);
        self.run_count.set(self.run_count.get() + 1);
        Some((self.func)())
    }

    fn is_dirty(&self) -> bool {
        let Some(runtime) = self.runtime.upgrade() else {
            return false;
        };
        if runtime.is_stopped(self.id) {
            return false;
        }
        let flags = runtime.graph.borrow().flags(self.id);
        flags.contains(Flags::DIRTY)
            || (flags.contains(Flags::PENDING_COMPUTED) && runtime.update_dirty_flag(self.id))
    }
}

impl<T: 'static> Reactive for EffectInner<T> {
    fn notify(&self) {
        if !self.is_dirty() {
            return;
        }
        let scheduler = self.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }

    fn dispose(&self) {
        let scheduler = self.scheduler.borrow_mut().take();
        drop(scheduler);
    }
}

impl<T: 'static> Effect<T> {
    /// Create an effect in the current runtime and run it once.
    pub fn new(f: impl Fn() -> T + 'static) -> Self {
        Runtime::current().effect(f)
    }

    /// Create an effect in the current runtime without running it.
    ///
    /// It has no dependencies until the first [`run`](Self::run).
    pub fn new_lazy(f: impl Fn() -> T + 'static) -> Self {
        Self::new_in(Runtime::current().inner(), f, false)
    }

    pub(crate) fn new_in(
        runtime: &Rc<RuntimeInner>,
        f: impl Fn() -> T + 'static,
        run_now: bool,
    ) -> Self {
        let id = runtime
            .graph
            .borrow_mut()
            .insert(NodeKind::Effect, Handler::Released);
        let inner = Rc::new(EffectInner {
            id,
            runtime: Rc::downgrade(runtime),
            func: Box::new(f),
            scheduler: RefCell::new(None),
            run_count: Cell::new(0),
        });
        let handler: Rc<dyn Reactive> = inner.clone() as Rc<dyn Reactive>;
        runtime
            .graph
            .borrow_mut()
            .set_handler(id, Handler::Effect(handler));

        if run_now {
            inner.run();
        }
        Self { inner }
    }

    /// The effect's node id in its runtime's graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the function as a tracking pass and return its result.
    ///
    /// Returns `None` once the effect is stopped.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }

    /// Re-check dirtiness and, if dirty, hand over to the scheduler (or run).
    pub fn notify(&self) {
        self.inner.notify();
    }

    /// Whether a dependency changed since the last run. Resolves pending
    /// computeds to find out.
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// Replace the default "run when dirty" behavior.
    pub fn set_scheduler(&self, scheduler: impl Fn() + 'static) {
        let previous = self.inner.scheduler.replace(Some(Rc::new(scheduler)));
        drop(previous);
    }

    /// Go back to running synchronously when dirty.
    pub fn clear_scheduler(&self) {
        self.inner.dispose();
    }

    /// Detach from every dependency. The effect never runs again.
    pub fn stop(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.stop_effect(self.inner.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.is_stopped(self.inner.id),
            None => true,
        }
    }

    /// Number of completed or in-progress runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of dependencies linked by the last run.
    pub fn dependency_count(&self) -> usize {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.graph.borrow().dependencies(self.inner.id).len(),
            None => 0,
        }
    }

    /// A type-erased handle that can stop this effect.
    pub fn handle(&self) -> EffectHandle {
        let effect: Weak<dyn Reactive> = Rc::downgrade(&self.inner) as Weak<dyn Reactive>;
        EffectHandle {
            id: self.inner.id,
            runtime: self.inner.runtime.clone(),
            effect,
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Stop capability for an effect, independent of its return type.
///
/// Holding a handle does not keep the effect alive. Once the effect is freed
/// its arena slot may go to a new node, so the handle acts only while the
/// effect itself is still allocated.
#[derive(Clone)]
pub struct EffectHandle {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    effect: Weak<dyn Reactive>,
}

impl EffectHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stop the effect. Idempotent.
    pub fn stop(&self) {
        if let Some(runtime) = self.runtime() {
            runtime.stop_effect(self.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        match self.runtime() {
            Some(runtime) => runtime.is_stopped(self.id),
            None => true,
        }
    }

    /// The runtime, while `id` still names this handle's effect.
    pub(crate) fn runtime(&self) -> Option<Rc<RuntimeInner>> {
        if self.effect.strong_count() == 0 {
            return None;
        }
        self.runtime.upgrade()
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle").field("id", &self.id).finish()
    }
}

/// Create an effect in the current runtime and run it once.
pub fn effect<T: 'static>(f: impl Fn() -> T + 'static) -> Effect<T> {
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() + Clone) {
        let count = Rc::new(Cell::new(0));
        let bump = {
            let count = count.clone();
            move || count.set(count.get() + 1)
        };
        (count, bump)
    }

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let (runs, bump) = counter();

        let effect = rt.effect(bump);

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let rt = Runtime::new();
        let (runs, bump) = counter();

        let effect = rt.enter(|| Effect::new_lazy(bump));

        assert_eq!(runs.get(), 0);
        assert_eq!(effect.run_count(), 0);

        // Manually run
        effect.run();
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_changes() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _effect = rt.effect({
            let (s, seen) = (s.clone(), seen.clone());
            move || seen.borrow_mut().push(s.get())
        });

        s.set(2);
        s.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn effect_without_dependencies_never_reruns() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let (runs, bump) = counter();

        let effect = rt.effect(bump);
        s.set(1);

        assert_eq!(runs.get(), 1);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn effect_does_not_run_after_stop() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let runs = Rc::new(Cell::new(0));

        let effect = rt.effect({
            let (s, runs) = (s.clone(), runs.clone());
            move || {
                s.get();
                runs.set(runs.get() + 1);
            }
        });
        assert_eq!(runs.get(), 1);

        effect.stop();
        assert!(effect.is_stopped());
        assert_eq!(effect.dependency_count(), 0);

        s.set(1);
        assert_eq!(runs.get(), 1);
        assert!(effect.run().is_none());
        effect.notify();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn run_returns_function_result() {
        let rt = Runtime::new();
        let s = rt.signal(20);
        let effect = rt.effect({
            let s = s.clone();
            move || s.get() + 1
        });

        assert_eq!(effect.run(), Some(21));
    }

    #[test]
    fn scheduler_replaces_default_run() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let (scheduled, bump) = counter();
        let runs = Rc::new(Cell::new(0));

        let effect = rt.effect({
            let (s, runs) = (s.clone(), runs.clone());
            move || {
                s.get();
                runs.set(runs.get() + 1);
            }
        });
        effect.set_scheduler(bump);

        s.set(1);
        assert_eq!(scheduled.get(), 1);
        assert_eq!(runs.get(), 1);
        assert!(effect.is_dirty());

        effect.run();
        assert!(!effect.is_dirty());

        effect.clear_scheduler();
        s.set(2);
        assert_eq!(scheduled.get(), 1);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn unchanged_computed_does_not_rerun_effect() {
        let rt = Runtime::new();
        let s = rt.signal(2);
        let is_even = rt.computed({
            let s = s.clone();
            move || s.get() % 2 == 0
        });
        let runs = Rc::new(Cell::new(0));

        let _effect = rt.effect({
            let (is_even, runs) = (is_even.clone(), runs.clone());
            move || {
                is_even.get();
                runs.set(runs.get() + 1);
            }
        });

        s.set(4);
        assert_eq!(runs.get(), 1);
        s.set(5);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn stop_from_inside_run_drops_dependencies() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let handle: Rc<RefCell<Option<EffectHandle>>> = Rc::new(RefCell::new(None));

        let effect = rt.effect({
            let (s, handle) = (s.clone(), handle.clone());
            move || {
                if s.get() > 0 {
                    if let Some(handle) = handle.borrow().as_ref() {
                        handle.stop();
                    }
                }
            }
        });
        *handle.borrow_mut() = Some(effect.handle());

        s.set(1);
        assert!(effect.is_stopped());
        assert_eq!(s.subscriber_count(), 0);
        rt.check_invariants().unwrap();
    }

    #[test]
    fn effect_clone_shares_state() {
        let rt = Runtime::new();
        let effect1 = rt.effect(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.run();
        assert_eq!(effect2.run_count(), 2);

        effect1.stop();
        assert!(effect2.is_stopped());
        assert!(effect2.handle().is_stopped());
    }

    #[test]
    fn stale_handle_ignores_reused_slot() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let (runs, bump) = counter();

        let first = rt.effect(|| {});
        let stale = first.handle();
        first.stop();
        drop(first);

        let next = rt.effect({
            let s = s.clone();
            move || {
                s.get();
                bump();
            }
        });
        assert_eq!(next.id(), stale.id());
        assert!(stale.is_stopped());

        stale.stop();
        assert!(!next.is_stopped());
        s.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn flush_limit_aborts_runaway_loop() {
        use crate::config::RuntimeConfig;

        let rt = Runtime::with_config(RuntimeConfig::new().with_max_flush_notifications(20));
        let s = rt.signal(0);

        // The scheduler re-runs and then writes, outside the tracking pass,
        // which re-queues the effect every time.
        let effect = rt.effect({
            let s = s.clone();
            move || s.get()
        });
        effect.set_scheduler({
            let (s, effect) = (s.clone(), effect.clone());
            move || {
                if let Some(value) = effect.run() {
                    s.set(value + 1);
                }
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| s.set(1)));
        let message = result
            .unwrap_err()
            .downcast::<String>()
            .map(|message| *message)
            .unwrap_or_default();
        assert_eq!(message, "effect flush exceeded 20 notifications");
        assert_eq!(rt.pending_effects(), 0);

        effect.stop();
    }
}
