//! Subscriber capability.
//!
//! A subscriber is any node that reads other nodes: computeds and effects.
//! The graph stores each subscriber's evaluation capability as a
//! `dyn Reactive` so the runtime can re-run it without knowing its value type.

/// Evaluation capability of a subscriber node.
///
/// The runtime only ever calls these methods with the graph unborrowed, so
/// implementations are free to read and write other nodes.
pub(crate) trait Reactive {
    /// Recompute a computed node. Returns whether its value changed.
    fn update(&self) -> bool {
        false
    }

    /// Tell an effect that one of its dependencies may have changed.
    ///
    /// The effect re-checks dirtiness itself before doing any work.
    fn notify(&self) {}

    /// Drop anything that may reference the node's own handle (such as a
    /// scheduler closure), so a stopped effect can be freed.
    fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    #[derive(Default)]
    struct Counter {
        updates: Cell<u32>,
    }

    impl Reactive for Counter {
        fn update(&self) -> bool {
            self.updates.set(self.updates.get() + 1);
            true
        }
    }

    #[test]
    fn defaults_are_inert() {
        struct Inert;
        impl Reactive for Inert {}

        let inert = Inert;
        assert!(!inert.update());
        inert.notify();
        inert.dispose();
    }

    #[test]
    fn weak_handler_upgrades_while_owner_lives() {
        let owner = Rc::new(Counter::default());
        let weak: Weak<dyn Reactive> = Rc::downgrade(&owner) as Weak<dyn Reactive>;

        assert!(weak.upgrade().unwrap().update());
        assert_eq!(owner.updates.get(), 1);

        drop(owner);
        assert!(weak.upgrade().is_none());
    }
}
