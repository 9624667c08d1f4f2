//! Deep-reactive sources.
//!
//! A deep-reactive value is a container whose nested members are themselves
//! reactive, such as a struct of signals or a signal holding a vector of
//! signals. Wrapping one in [`Deep`] makes it a watch source that reacts to
//! any nested write, the way watching a reactive object does.

use super::traverse::{Traversal, Traverse};
use crate::reactive::Signal;

/// A container whose members can be read reactively.
pub trait DeepReactive: Traverse + Clone + 'static {
    /// Shallow containers only track their first level.
    fn is_shallow(&self) -> bool {
        false
    }
}

impl<T: Traverse + 'static> DeepReactive for Signal<T> {}

/// Marks a deep-reactive value as a watch source.
#[derive(Debug, Clone)]
pub struct Deep<R>(pub R);

impl<R: DeepReactive> Deep<R> {
    pub fn new(value: R) -> Self {
        Self(value)
    }

    pub fn get(&self) -> &R {
        &self.0
    }

    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Traverse> Traverse for Deep<R> {
    fn traverse(&self, walker: &mut Traversal) {
        self.0.traverse(walker);
    }
}

/// A deep-reactive value that only tracks its first level.
#[derive(Debug, Clone)]
pub struct Shallow<R>(pub R);

impl<R: Traverse> Traverse for Shallow<R> {
    fn traverse(&self, walker: &mut Traversal) {
        self.0.traverse(walker);
    }
}

impl<R: Traverse + Clone + 'static> DeepReactive for Shallow<R> {
    fn is_shallow(&self) -> bool {
        true
    }
}
