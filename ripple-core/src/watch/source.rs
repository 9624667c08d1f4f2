//! Watch Sources
//!
//! A [`WatchSource`] turns "what to watch" into a getter that runs inside the
//! watch effect, plus the change test that decides whether the callback
//! fires.
//!
//! # Supported Sources
//!
//! | Source            | Reads                                 | Fires when             |
//! |-------------------|---------------------------------------|------------------------|
//! | `Signal<T>`       | the signal                            | value changed          |
//! | `Computed<T>`     | the computed                          | value changed          |
//! | `MaybeSignal<T>`  | whichever variant it holds            | value changed          |
//! | [`from_fn`]       | the closure, tracking its reads       | return value changed   |
//! | [`Deep`]          | every nested signal (see options)     | any tracked write      |
//! | `Vec<S>`, tuples  | every element                         | any element changed    |

use super::deep::{Deep, DeepReactive};
use super::options::WatchOptions;
use super::traverse::{traverse, Traverse};
use crate::reactive::{Computed, MaybeSignal, Signal};

/// Something a watch can observe.
pub trait WatchSource: 'static {
    /// The snapshot handed to the callback.
    type Value: Clone + Traverse + 'static;

    /// Read the current value, linking whatever it depends on.
    fn read(&self, options: &WatchOptions) -> Self::Value;

    /// Whether every trigger counts as a change.
    fn force_trigger(&self) -> bool {
        false
    }

    /// Whether `new` differs from `old`.
    fn changed(&self, old: &Self::Value, new: &Self::Value) -> bool;

    /// Whether reading can ever register a dependency. Non-reactive sources
    /// are rejected by [`try_watch`](super::try_watch).
    fn is_reactive(&self) -> bool {
        true
    }
}

impl<T> WatchSource for Signal<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn read(&self, _options: &WatchOptions) -> T {
        self.get()
    }

    fn changed(&self, old: &T, new: &T) -> bool {
        old != new
    }
}

impl<T> WatchSource for Computed<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn read(&self, _options: &WatchOptions) -> T {
        self.get()
    }

    fn changed(&self, old: &T, new: &T) -> bool {
        old != new
    }
}

impl<T> WatchSource for MaybeSignal<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn read(&self, _options: &WatchOptions) -> T {
        self.get()
    }

    fn changed(&self, old: &T, new: &T) -> bool {
        old != new
    }

    fn is_reactive(&self) -> bool {
        MaybeSignal::is_reactive(self)
    }
}

impl<R: DeepReactive> WatchSource for Deep<R> {
    type Value = R;

    fn read(&self, options: &WatchOptions) -> R {
        // An explicit deep option walks later, around the whole getter.
        if !options.is_deep() {
            let explicit_shallow = options.deep.is_some();
            let depth = if explicit_shallow || self.0.is_shallow() {
                Some(1)
            } else {
                None
            };
            traverse(&self.0, depth);
        }
        self.0.clone()
    }

    fn force_trigger(&self) -> bool {
        true
    }

    fn changed(&self, _old: &R, _new: &R) -> bool {
        true
    }
}

/// A closure used as a watch source.
pub struct FnSource<F>(F);

/// Watch the return value of `f`. Every signal `f` reads is tracked.
///
/// ```rust
/// use ripple_core::{watch, watch::from_fn, Signal, WatchOptions};
///
/// let first = Signal::new("Ada".to_string());
/// let last = Signal::new("Lovelace".to_string());
///
/// let handle = watch(
///     from_fn({
///         let (first, last) = (first.clone(), last.clone());
///         move || format!("{} {}", first.get(), last.get())
///     }),
///     |name, _old, _stop| println!("now {name}"),
///     WatchOptions::default(),
/// );
///
/// last.set("Byron".to_string()); // prints "now Ada Byron"
/// handle.stop();
/// ```
pub fn from_fn<T, F>(f: F) -> FnSource<F>
where
    F: Fn() -> T + 'static,
{
    FnSource(f)
}

impl<T, F> WatchSource for FnSource<F>
where
    F: Fn() -> T + 'static,
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn read(&self, _options: &WatchOptions) -> T {
        (self.0)()
    }

    fn changed(&self, old: &T, new: &T) -> bool {
        old != new
    }
}

impl<S: WatchSource> WatchSource for Vec<S> {
    type Value = Vec<S::Value>;

    fn read(&self, options: &WatchOptions) -> Self::Value {
        self.iter().map(|source| source.read(options)).collect()
    }

    fn force_trigger(&self) -> bool {
        self.iter().any(WatchSource::force_trigger)
    }

    fn changed(&self, old: &Self::Value, new: &Self::Value) -> bool {
        old.len() != new.len()
            || self
                .iter()
                .zip(old.iter().zip(new))
                .any(|(source, (old, new))| source.changed(old, new))
    }

    fn is_reactive(&self) -> bool {
        self.iter().all(WatchSource::is_reactive)
    }
}

macro_rules! tuple_source {
    ($($name:ident . $index:tt),+) => {
        impl<$($name: WatchSource),+> WatchSource for ($($name,)+) {
            type Value = ($($name::Value,)+);

            fn read(&self, options: &WatchOptions) -> Self::Value {
                ($(self.$index.read(options),)+)
            }

            fn force_trigger(&self) -> bool {
                $(self.$index.force_trigger())||+
            }

            fn changed(&self, old: &Self::Value, new: &Self::Value) -> bool {
                $(self.$index.changed(&old.$index, &new.$index))||+
            }

            fn is_reactive(&self) -> bool {
                $(self.$index.is_reactive())&&+
            }
        }
    };
}

tuple_source!(A.0, B.1);
tuple_source!(A.0, B.1, C.2);
tuple_source!(A.0, B.1, C.2, D.3);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn signal_source_compares_values() {
        let rt = Runtime::new();
        let s = rt.signal(3);

        assert_eq!(s.read(&WatchOptions::default()), 3);
        assert!(s.changed(&1, &2));
        assert!(!s.changed(&2, &2));
        assert!(!s.force_trigger());
    }

    #[test]
    fn multi_source_compares_element_wise() {
        let rt = Runtime::new();
        let sources = vec![rt.signal(1), rt.signal(2)];

        assert_eq!(sources.read(&WatchOptions::default()), vec![1, 2]);
        assert!(!sources.changed(&vec![1, 2], &vec![1, 2]));
        assert!(sources.changed(&vec![1, 2], &vec![1, 5]));
    }

    #[test]
    fn tuple_source_mixes_types() {
        let rt = Runtime::new();
        let name = rt.signal("a".to_string());
        let count = rt.signal(1);
        let source = (name, count);

        let value = source.read(&WatchOptions::default());
        assert_eq!(value, ("a".to_string(), 1));
        assert!(source.changed(&value, &("a".to_string(), 2)));
        assert!(!source.changed(&value, &value.clone()));
    }

    #[test]
    fn static_values_are_not_reactive() {
        let rt = Runtime::new();
        let s = rt.signal(1);

        assert!(!MaybeSignal::Static(1).is_reactive());
        assert!(WatchSource::is_reactive(&MaybeSignal::Signal(s.clone())));
        assert!(!vec![MaybeSignal::Signal(s), MaybeSignal::Static(2)].is_reactive());
    }

    #[test]
    fn deep_sources_always_trigger() {
        let rt = Runtime::new();
        let source = Deep(rt.signal(vec![1, 2]));

        assert!(source.force_trigger());
        assert!(source.changed(&source.0, &source.0));
    }
}
