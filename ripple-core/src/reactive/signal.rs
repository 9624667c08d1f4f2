//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computed or effect is running, the
//!    runtime links the signal to that subscriber.
//!
//! 2. When a signal's value changes, every subscriber reachable from it is
//!    marked stale and the affected effects are notified.
//!
//! 3. Writing a value equal to the current one does nothing at all.
//!
//! # Memory Layout
//!
//! Each signal handle is one `Rc` to:
//! - Its node id in the runtime's graph
//! - A weak reference to the runtime
//! - The value, in a `RefCell`
//!
//! Subscriber bookkeeping lives in the graph, not in the signal.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use super::runtime::{release_node, Runtime, RuntimeInner};
use crate::graph::{Handler, NodeId, NodeKind};

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        release_node(&self.runtime, self.id);
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal in the current runtime.
    pub fn new(value: T) -> Self {
        Runtime::current().signal(value)
    }

    pub(crate) fn new_in(runtime: &Rc<RuntimeInner>, value: T) -> Self {
        let id = runtime
            .graph
            .borrow_mut()
            .insert(NodeKind::Signal, Handler::Signal);
        Self {
            inner: Rc::new(SignalInner {
                id,
                runtime: Rc::downgrade(runtime),
                value: RefCell::new(value),
            }),
        }
    }

    /// The signal's node id in its runtime's graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, linking it to the running subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, linking it to the running subscriber.
    ///
    /// `f` must not write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Get the current value without linking.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value without linking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Store a new value and notify subscribers. Equal values are ignored.
    pub fn set(&self, value: T)
    where
        T: PartialEq,
    {
        {
            let mut slot = self.inner.value.borrow_mut();
            if *slot == value {
                return;
            }
            *slot = value;
        }
        self.notify_changed();
    }

    /// Derive the next value from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T)
    where
        T: PartialEq,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Mutate the value in place. Always notifies, since in-place changes
    /// cannot be compared against the old value.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.notify_changed();
        result
    }

    /// Number of subscribers currently linked to this signal.
    pub fn subscriber_count(&self) -> usize {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.graph.borrow().subscribers(self.inner.id).len(),
            None => 0,
        }
    }

    pub(crate) fn ptr(&self) -> *const () {
        Rc::as_ptr(&self.inner) as *const ()
    }

    fn track(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(self.inner.id);
        }
    }

    fn notify_changed(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.propagate_from(self.inner.id);
        }
    }
}

/// Handles compare by identity: two handles are equal when they refer to
/// the same signal.
impl<T: 'static> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for Signal<T> {}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Signal");
        out.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("value", &*value),
            Err(_) => out.field("value", &"<borrowed>"),
        };
        out.finish()
    }
}

/// Create a signal in the current runtime.
pub fn signal<T: 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = rt.signal(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_mutate_always_notifies() {
        let rt = Runtime::new();
        let list = rt.signal(vec![1, 2]);
        let runs = Rc::new(Cell::new(0));

        let _effect = rt.effect({
            let (list, runs) = (list.clone(), runs.clone());
            move || {
                list.with(|items| items.len());
                runs.set(runs.get() + 1);
            }
        });

        list.mutate(|items| items.push(3));
        assert_eq!(runs.get(), 2);

        // Nothing changed, but in-place writes cannot tell.
        list.mutate(|_| ());
        assert_eq!(runs.get(), 3);
        assert_eq!(list.peek(), vec![1, 2, 3]);
    }

    #[test]
    fn equal_write_is_ignored() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        let runs = Rc::new(Cell::new(0));

        let _effect = rt.effect({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                signal.get();
                runs.set(runs.get() + 1);
            }
        });

        signal.set(1);
        assert_eq!(runs.get(), 1);
        signal.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = rt.signal(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
        assert_eq!(signal1, signal2);
        assert_ne!(signal1, rt.signal(100));
    }

    #[test]
    fn signal_ids_are_unique() {
        let rt = Runtime::new();
        let s1 = rt.signal(0);
        let s2 = rt.signal(0);
        let s3 = rt.signal(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn read_outside_tracking_never_links() {
        let rt = Runtime::new();
        let signal = rt.signal(3);
        assert_eq!(signal.get(), 3);
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(rt.link_count(), 0);
    }

    #[test]
    fn dropping_last_handle_frees_node() {
        let rt = Runtime::new();
        let signal = rt.signal("x".to_string());
        assert_eq!(rt.node_count(), 1);

        drop(signal);
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn signal_outlives_runtime_as_plain_cell() {
        let signal = {
            let rt = Runtime::new();
            rt.signal(1)
        };
        signal.set(2);
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn debug_shows_value() {
        let rt = Runtime::new();
        let signal = rt.signal(7);
        assert!(format!("{signal:?}").contains("value: 7"));
    }
}
