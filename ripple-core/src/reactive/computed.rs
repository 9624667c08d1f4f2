//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change, and only when something reads it.
//!
//! # How Computeds Work
//!
//! 1. A new computed starts dirty. The first read runs the getter as the
//!    active subscriber, recording what it reads, and caches the result.
//!
//! 2. A write upstream marks the computed `DIRTY` (direct dependency) or
//!    `PENDING_COMPUTED` (reached through another computed). Nothing runs.
//!
//! 3. On the next read, a dirty computed recomputes. A pending one first
//!    pulls its upstream computeds; if none of them produced a new value it
//!    is simply marked clean and the cache is returned.
//!
//! 4. A recomputation that yields a value equal to the cached one counts as
//!    "no change", so downstream nodes are not disturbed.
//!
//! # Laziness
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::context::TrackingPass;
use super::runtime::{release_node, Runtime, RuntimeInner};
use super::subscriber::Reactive;
use crate::error::{Error, Result};
use crate::graph::{Flags, Handler, NodeId, NodeKind};

/// A cached derived value.
///
/// `T: PartialEq` is needed to detect when a recomputation actually changed
/// the value (many recomputations return the same value their inputs did).
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

type Getter<T> = Box<dyn Fn(Option<&T>) -> T>;

struct ComputedInner<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    value: RefCell<Option<T>>,
    getter: Getter<T>,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        release_node(&self.runtime, self.id);
    }
}

impl<T: PartialEq + 'static> Reactive for ComputedInner<T> {
    fn update(&self) -> bool {
        let Some(runtime) = self.runtime.upgrade() else {
            return false;
        };
        let next = {
            let _pass = TrackingPass::new(&runtime, self.id);
            let previous = self.value.borrow();
            (self.getter)(previous.as_ref())
        };

        let mut slot = self.value.borrow_mut();
        if slot.as_ref() == Some(&next) {
            return false;
        }
        *slot = Some(next);
        true
    }
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a computed in the current runtime. The getter does not run
    /// until the first read.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Runtime::current().computed(getter)
    }

    /// Create a computed whose getter receives the previously cached value
    /// (`None` on the first evaluation).
    pub fn new_with(getter: impl Fn(Option<&T>) -> T + 'static) -> Self {
        Runtime::current().computed_with(getter)
    }

    pub(crate) fn new_in(
        runtime: &Rc<RuntimeInner>,
        getter: impl Fn(Option<&T>) -> T + 'static,
    ) -> Self {
        let id = runtime
            .graph
            .borrow_mut()
            .insert(NodeKind::Computed, Handler::Released);
        let inner = Rc::new(ComputedInner {
            id,
            runtime: Rc::downgrade(runtime),
            value: RefCell::new(None),
            getter: Box::new(getter),
        });
        let handler: Weak<dyn Reactive> = Rc::downgrade(&inner) as Weak<dyn Reactive>;
        runtime
            .graph
            .borrow_mut()
            .set_handler(id, Handler::Computed(handler));
        Self { inner }
    }

    /// Get the current value, recomputing first if it is stale.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::Cycle`] if called from within its own getter.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Like [`get`](Self::get), but reports a cycle instead of panicking.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Borrow the current value, recomputing first if it is stale.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self.try_with(f) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.read(true, f)
    }

    /// Get the current value without linking it to the running subscriber.
    ///
    /// Staleness is still resolved first, so this never returns an outdated
    /// value.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        match self.try_peek() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_peek(&self) -> Result<T>
    where
        T: Clone,
    {
        self.read(false, T::clone)
    }

    fn read<R>(&self, tracked: bool, f: impl FnOnce(&T) -> R) -> Result<R> {
        let id = self.inner.id;
        let Some(runtime) = self.inner.runtime.upgrade() else {
            // Detached from its runtime: behave like a plain function.
            let next = {
                let previous = self.inner.value.borrow();
                (self.inner.getter)(previous.as_ref())
            };
            *self.inner.value.borrow_mut() = Some(next);
            return Ok(self.with_cached(f));
        };

        let flags = runtime.graph.borrow().flags(id);
        if flags.contains(Flags::TRACKING) {
            return Err(Error::Cycle(id));
        }
        // A getter that panicked on its first run left nothing cached.
        if self.inner.value.borrow().is_none() {
            runtime.graph.borrow_mut().node_mut(id).flags.insert(Flags::DIRTY);
            runtime.process_computed_update(id);
        } else if flags.intersects(Flags::PROPAGATED) {
            runtime.process_computed_update(id);
        }
        if tracked {
            runtime.track(id);
        }
        Ok(self.with_cached(f))
    }

    fn with_cached<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => f(value),
            None => unreachable!("computed {} has no value after evaluation", self.inner.id),
        }
    }
}

impl<T: 'static> Computed<T> {
    /// The computed's node id in its runtime's graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether the cached value is known or suspected to be stale.
    pub fn is_stale(&self) -> bool {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.graph.borrow().flags(self.inner.id).intersects(Flags::PROPAGATED),
            None => true,
        }
    }

    /// Number of subscribers currently linked to this computed.
    pub fn subscriber_count(&self) -> usize {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.graph.borrow().subscribers(self.inner.id).len(),
            None => 0,
        }
    }

    pub(crate) fn ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }
}

/// Handles compare by identity: two handles are equal when they refer to
/// the same computed.
impl<T: 'static> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for Computed<T> {}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Computed");
        out.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("cached", &*value),
            Err(_) => out.field("cached", &"<borrowed>"),
        };
        out.finish()
    }
}

/// Create a computed in the current runtime.
pub fn computed<T: PartialEq + 'static>(getter: impl Fn() -> T + 'static) -> Computed<T> {
    Computed::new(getter)
}

/// Create a computed in the current runtime whose getter receives the
/// previous value.
pub fn computed_with<T: PartialEq + 'static>(
    getter: impl Fn(Option<&T>) -> T + 'static,
) -> Computed<T> {
    Computed::new_with(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counted<T: PartialEq + 'static>(
        rt: &Runtime,
        f: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<u32>>) {
        let calls = Rc::new(Cell::new(0));
        let computed = rt.computed({
            let calls = calls.clone();
            move || {
                calls.set(calls.get() + 1);
                f()
            }
        });
        (computed, calls)
    }

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let (c, calls) = counted(&rt, {
            let s = s.clone();
            move || s.get() * 2
        });

        assert_eq!(calls.get(), 0);
        assert_eq!(c.get(), 2);
        assert_eq!(calls.get(), 1);

        // Cached.
        assert_eq!(c.get(), 2);
        assert_eq!(calls.get(), 1);

        // Writes mark, reads recompute.
        s.set(5);
        s.set(6);
        assert_eq!(calls.get(), 1);
        assert!(c.is_stale());
        assert_eq!(c.get(), 12);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn chain_recomputes_only_when_upstream_changed() {
        let rt = Runtime::new();
        let s = rt.signal(3);
        let parity = rt.computed({
            let s = s.clone();
            move || s.get() % 2
        });
        let (label, calls) = counted(&rt, {
            let parity = parity.clone();
            move || if parity.get() == 0 { "even" } else { "odd" }
        });

        assert_eq!(label.get(), "odd");
        assert_eq!(calls.get(), 1);

        // Parity recomputes to the same value; label does not re-run.
        s.set(5);
        assert_eq!(label.get(), "odd");
        assert_eq!(calls.get(), 1);

        s.set(6);
        assert_eq!(label.get(), "even");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn computed_with_sees_previous_value() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let history = rt.computed_with({
            let s = s.clone();
            move |previous: Option<&Vec<i32>>| {
                let mut next = previous.cloned().unwrap_or_default();
                next.push(s.get());
                next
            }
        });

        assert_eq!(history.get(), vec![1]);
        s.set(2);
        assert_eq!(history.get(), vec![1, 2]);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let seen = Rc::new(RefCell::new(None));

        let c = rt.computed({
            let (slot, seen) = (slot.clone(), seen.clone());
            move || {
                if let Some(me) = slot.borrow().as_ref() {
                    *seen.borrow_mut() = Some(me.try_get());
                }
                1
            }
        });
        *slot.borrow_mut() = Some(c.clone());

        assert_eq!(c.get(), 1);
        assert_eq!(*seen.borrow(), Some(Err(Error::Cycle(c.id()))));

        slot.borrow_mut().take();
    }

    #[test]
    fn peek_resolves_without_linking() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let c = rt.computed({
            let s = s.clone();
            move || s.get() + 1
        });
        let runs = Rc::new(Cell::new(0));

        let _effect = rt.effect({
            let (c, runs) = (c.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                c.peek()
            }
        });

        assert_eq!(c.subscriber_count(), 0);
        s.set(10);
        assert_eq!(runs.get(), 1);
        assert_eq!(c.peek(), 11);
    }

    #[test]
    fn dropping_computed_unlinks_it() {
        let rt = Runtime::new();
        let s = rt.signal(1);
        let c = rt.computed({
            let s = s.clone();
            move || s.get()
        });
        c.get();
        assert_eq!(s.subscriber_count(), 1);

        drop(c);
        assert_eq!(s.subscriber_count(), 0);
        rt.check_invariants().unwrap();
    }

    #[test]
    fn panicking_getter_retries_on_next_read() {
        let rt = Runtime::new();
        let fail = rt.signal(true);
        let c = rt.computed({
            let fail = fail.clone();
            move || {
                if fail.get() {
                    panic!("not ready");
                }
                42
            }
        });

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.get()));
        assert!(first.is_err());
        assert_eq!(rt.active_subscriber(), None);

        fail.set(false);
        assert_eq!(c.get(), 42);
        rt.check_invariants().unwrap();
    }

    #[test]
    fn panicking_rerun_leaves_computed_stale() {
        let rt = Runtime::new();
        let a = rt.signal(1);
        let b = rt.signal(10);
        let sum = rt.computed({
            let (a, b) = (a.clone(), b.clone());
            move || {
                let a = a.get();
                if a == 2 {
                    panic!("bad input");
                }
                a + b.get()
            }
        });
        assert_eq!(sum.get(), 11);

        a.set(2);
        let failed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sum.get()));
        assert!(failed.is_err());
        assert!(sum.is_stale());

        // `b` was not read by the failed run, yet the cache is not trusted.
        b.set(20);
        a.set(3);
        assert_eq!(sum.get(), 23);
        assert!(!sum.is_stale());
        assert_eq!(b.subscriber_count(), 1);
        rt.check_invariants().unwrap();
    }
}
