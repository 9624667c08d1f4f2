//! Deep Traversal
//!
//! Deep watching needs every signal nested inside a value to be read while
//! the watch effect runs, so that each one gets linked. [`Traverse`] is the
//! walk that does those reads.
//!
//! # How Traversal Works
//!
//! - Containers (sequences, sets, maps, structs, tuples) spend one level of
//!   depth to visit their members.
//! - A signal or computed met inside a container is read tracked; reading it
//!   is the container's member access, so it spends no depth of its own. Its
//!   value is then walked with whatever depth is left.
//! - Plain leaves (numbers, strings, ...) do nothing.
//! - A seen-set of addresses stops shared or cyclic structures from being
//!   walked twice.
//!
//! A depth of `None` is unbounded. `Some(1)` reaches the members of the top
//! value and the signals directly inside them, nothing deeper.

use std::any::type_name;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::reactive::{Computed, MaybeSignal, Signal};

/// State of one traversal: remaining depth and the seen-set.
#[derive(Debug)]
pub struct Traversal {
    depth: Option<u32>,
    seen: HashSet<(usize, &'static str)>,
}

impl Traversal {
    /// Start a walk. `None` means unbounded.
    pub fn new(depth: Option<u32>) -> Self {
        Self {
            depth,
            seen: HashSet::new(),
        }
    }

    /// Remaining depth.
    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    /// Visit the members of a container.
    ///
    /// Does nothing when the depth is spent or `value` was already visited;
    /// otherwise runs `visit` with one level less.
    pub fn descend<T: ?Sized>(&mut self, value: &T, visit: impl FnOnce(&mut Self)) {
        if self.depth == Some(0) || !self.first_visit(value as *const T) {
            return;
        }
        let saved = self.depth;
        self.depth = saved.map(|depth| depth - 1);
        visit(self);
        self.depth = saved;
    }

    /// Record `ptr` as visited. Returns `false` if it already was.
    ///
    /// The key includes the pointee type, so a struct and its first field
    /// (which share an address) are told apart.
    pub fn first_visit<T: ?Sized>(&mut self, ptr: *const T) -> bool {
        self.seen.insert((ptr as *const () as usize, type_name::<T>()))
    }
}

/// Values that can be walked by a deep watch.
///
/// Implement it for your own structs with [`traverse_fields!`](crate::traverse_fields),
/// or wrap a member in [`Raw`] to keep the walk out of it.
pub trait Traverse {
    fn traverse(&self, walker: &mut Traversal);
}

/// Walk `value` to the given depth, reading every reachable signal.
pub fn traverse<T: Traverse + ?Sized>(value: &T, depth: Option<u32>) {
    value.traverse(&mut Traversal::new(depth));
}

macro_rules! leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Traverse for $ty {
                #[inline]
                fn traverse(&self, _walker: &mut Traversal) {}
            }
        )*
    };
}

leaf!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    str, String,
);

impl<T: Traverse + ?Sized> Traverse for &T {
    fn traverse(&self, walker: &mut Traversal) {
        (**self).traverse(walker);
    }
}

impl<T: Traverse + ?Sized> Traverse for Box<T> {
    fn traverse(&self, walker: &mut Traversal) {
        (**self).traverse(walker);
    }
}

// Shared values are deduplicated by the container they point at.
impl<T: Traverse + ?Sized> Traverse for Rc<T> {
    fn traverse(&self, walker: &mut Traversal) {
        (**self).traverse(walker);
    }
}

impl<T: Traverse> Traverse for Option<T> {
    fn traverse(&self, walker: &mut Traversal) {
        if let Some(value) = self {
            value.traverse(walker);
        }
    }
}

macro_rules! sequence {
    ($($ty:ident),*) => {
        $(
            impl<T: Traverse> Traverse for $ty<T> {
                fn traverse(&self, walker: &mut Traversal) {
                    walker.descend(self, |walker| {
                        for item in self {
                            item.traverse(walker);
                        }
                    });
                }
            }
        )*
    };
}

sequence!(Vec, VecDeque, LinkedList, BTreeSet);

impl<T: Traverse> Traverse for [T] {
    fn traverse(&self, walker: &mut Traversal) {
        walker.descend(self, |walker| {
            for item in self {
                item.traverse(walker);
            }
        });
    }
}

impl<T: Traverse, const N: usize> Traverse for [T; N] {
    fn traverse(&self, walker: &mut Traversal) {
        self.as_slice().traverse(walker);
    }
}

impl<T: Traverse, S> Traverse for HashSet<T, S> {
    fn traverse(&self, walker: &mut Traversal) {
        walker.descend(self, |walker| {
            for item in self {
                item.traverse(walker);
            }
        });
    }
}

impl<K, V: Traverse, S> Traverse for HashMap<K, V, S> {
    fn traverse(&self, walker: &mut Traversal) {
        walker.descend(self, |walker| {
            for value in self.values() {
                value.traverse(walker);
            }
        });
    }
}

impl<K, V: Traverse> Traverse for BTreeMap<K, V> {
    fn traverse(&self, walker: &mut Traversal) {
        walker.descend(self, |walker| {
            for value in self.values() {
                value.traverse(walker);
            }
        });
    }
}

macro_rules! tuple {
    ($($name:ident . $index:tt),+) => {
        impl<$($name: Traverse),+> Traverse for ($($name,)+) {
            fn traverse(&self, walker: &mut Traversal) {
                walker.descend(self, |walker| {
                    $( self.$index.traverse(walker); )+
                });
            }
        }
    };
}

tuple!(A.0);
tuple!(A.0, B.1);
tuple!(A.0, B.1, C.2);
tuple!(A.0, B.1, C.2, D.3);
tuple!(A.0, B.1, C.2, D.3, E.4);
tuple!(A.0, B.1, C.2, D.3, E.4, F.5);

impl<T: Traverse + 'static> Traverse for Signal<T> {
    fn traverse(&self, walker: &mut Traversal) {
        if walker.first_visit(self.ptr() as *const Self) {
            self.with(|value| value.traverse(walker));
        }
    }
}

impl<T: Traverse + PartialEq + 'static> Traverse for Computed<T> {
    fn traverse(&self, walker: &mut Traversal) {
        if walker.first_visit(self.ptr() as *const Self) {
            self.with(|value| value.traverse(walker));
        }
    }
}

impl<T: Traverse + Clone + PartialEq + 'static> Traverse for MaybeSignal<T> {
    fn traverse(&self, walker: &mut Traversal) {
        match self {
            MaybeSignal::Static(value) => value.traverse(walker),
            MaybeSignal::Signal(signal) => signal.traverse(walker),
            MaybeSignal::Computed(computed) => computed.traverse(walker),
            MaybeSignal::Getter(getter) => getter().traverse(walker),
        }
    }
}

/// A value deep traversal never enters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Raw<T>(pub T);

impl<T> Raw<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Raw<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Raw<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Traverse for Raw<T> {
    fn traverse(&self, _walker: &mut Traversal) {}
}

/// Implement [`Traverse`] for a struct by walking the listed fields.
///
/// ```rust
/// use ripple_core::{traverse_fields, Signal};
///
/// struct Todo {
///     title: Signal<String>,
///     done: Signal<bool>,
/// }
///
/// traverse_fields!(Todo { title, done });
/// ```
#[macro_export]
macro_rules! traverse_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::watch::Traverse for $ty {
            fn traverse(&self, walker: &mut $crate::watch::Traversal) {
                walker.descend(self, |walker| {
                    $( $crate::watch::Traverse::traverse(&self.$field, walker); )*
                });
            }
        }
    };
}
