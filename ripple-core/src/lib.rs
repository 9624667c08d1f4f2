//! Ripple Core
//!
//! This crate provides the runtime for Ripple, a fine-grained reactive state
//! engine. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - A dependency graph with incremental, glitch-free propagation
//! - Batching of writes into a single effect flush
//! - Watchers with deep traversal, multi-source, `once` and `immediate`
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, the runtime and dependency tracking
//! - `graph`: The node/link arena and the propagation walk
//! - `watch`: Watchers built on effects, plus deep traversal
//!
//! Everything is single-threaded. Each thread has a default [`Runtime`] used
//! by `Signal::new`, `effect(..)` and the other free functions; independent
//! runtimes can be created with [`Runtime::new`].
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Computed, Effect, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let _effect = Effect::new({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```

pub mod graph;
pub mod reactive;
pub mod watch;

mod config;
mod error;

pub use config::{RuntimeConfig, DEFAULT_MAX_FLUSH_NOTIFICATIONS};
pub use error::{Error, Result};
pub use graph::{GraphSnapshot, NodeId, NodeSnapshot};
pub use reactive::{
    batch, computed, computed_with, effect, end_batch, is_signal, signal, start_batch, to_value,
    un_signal, untracked, Computed, Effect, EffectHandle, IsSignal, MaybeSignal, Runtime, Signal,
};
pub use watch::{
    try_watch, watch, watch_effect, Deep, DeepReactive, Raw, Traverse, WatchHandle, WatchOptions,
    WatchSource,
};
