//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Ripple's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while a computed or effect is running, the signal is linked to that
//! subscriber. When the signal's value changes, all subscribers are marked
//! stale and effects are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changed *and* something reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change, such as logging or pushing state to an external
//! system.
//!
//! # Implementation Notes
//!
//! Every primitive is a node in its runtime's [`graph`](crate::graph). The
//! runtime keeps a "current subscriber" cursor; reads link to it, writes
//! propagate flags along the links and flush the queued effects.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;
mod value;

pub use batch::{batch, end_batch, start_batch};
pub use computed::{computed, computed_with, Computed};
pub use effect::{effect, Effect, EffectHandle};
pub use runtime::{untracked, Runtime};
pub use signal::{signal, Signal};
pub use value::{is_signal, to_value, un_signal, IsSignal, MaybeSignal};

pub(crate) use batch::BatchGuard;
pub(crate) use runtime::RuntimeInner;
pub(crate) use subscriber::Reactive;
