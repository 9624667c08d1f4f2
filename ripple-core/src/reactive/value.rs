//! Maybe-reactive values.
//!
//! APIs that accept "a value or something reactive producing one" take a
//! [`MaybeSignal`]. [`to_value`] reads any variant; [`un_signal`] unwraps
//! signals and plain values but leaves getters alone.

use std::fmt;
use std::rc::Rc;

use super::{Computed, Signal};

/// A plain value, a signal, a computed, or a getter closure.
pub enum MaybeSignal<T: 'static> {
    Static(T),
    Signal(Signal<T>),
    Computed(Computed<T>),
    Getter(Rc<dyn Fn() -> T>),
}

impl<T: 'static> MaybeSignal<T> {
    /// Wrap a getter closure.
    pub fn getter(f: impl Fn() -> T + 'static) -> Self {
        Self::Getter(Rc::new(f))
    }

    /// Whether reading this can ever register a dependency.
    pub fn is_reactive(&self) -> bool {
        !matches!(self, Self::Static(_))
    }
}

impl<T: Clone + PartialEq + 'static> MaybeSignal<T> {
    /// Read the value. Signals and computeds are read tracked; getters are
    /// called, so their reads are tracked too.
    pub fn get(&self) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Signal(signal) => signal.get(),
            Self::Computed(computed) => computed.get(),
            Self::Getter(getter) => getter(),
        }
    }
}

impl<T: 'static> Clone for MaybeSignal<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::Static(value) => Self::Static(value.clone()),
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Computed(computed) => Self::Computed(computed.clone()),
            Self::Getter(getter) => Self::Getter(getter.clone()),
        }
    }
}

impl<T: Default + 'static> Default for MaybeSignal<T> {
    fn default() -> Self {
        Self::Static(T::default())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for MaybeSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            Self::Computed(computed) => f.debug_tuple("Computed").field(computed).finish(),
            Self::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

impl<T: 'static> From<T> for MaybeSignal<T> {
    fn from(value: T) -> Self {
        Self::Static(value)
    }
}

impl<T: 'static> From<Signal<T>> for MaybeSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self::Signal(signal)
    }
}

impl<T: 'static> From<Computed<T>> for MaybeSignal<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::Computed(computed)
    }
}

/// Types that may hold a reactive reference.
pub trait IsSignal {
    /// Whether this is a signal or computed.
    fn is_signal(&self) -> bool;
}

impl<T: 'static> IsSignal for Signal<T> {
    fn is_signal(&self) -> bool {
        true
    }
}

impl<T: 'static> IsSignal for Computed<T> {
    fn is_signal(&self) -> bool {
        true
    }
}

impl<T: 'static> IsSignal for MaybeSignal<T> {
    fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_) | Self::Computed(_))
    }
}

/// Whether `value` is a signal or computed.
pub fn is_signal<S: IsSignal + ?Sized>(value: &S) -> bool {
    value.is_signal()
}

/// Read any variant, calling getters.
pub fn to_value<T: Clone + PartialEq + 'static>(source: &MaybeSignal<T>) -> T {
    source.get()
}

/// Unwrap a plain value, signal or computed. Getters are not called and
/// yield `None`.
pub fn un_signal<T: Clone + PartialEq + 'static>(source: &MaybeSignal<T>) -> Option<T> {
    match source {
        MaybeSignal::Getter(_) => None,
        other => Some(other.get()),
    }
}
