//! Watchers
//!
//! A watcher observes a [`WatchSource`] and calls back when it changes,
//! handing over the new value, the previous one and a stop handle.
//!
//! # How Watchers Work
//!
//! Each watcher is an [`Effect`] whose function reads the source. The
//! effect's scheduler is the watcher's job:
//!
//! 1. A write marks the effect dirty and the flush calls the job.
//! 2. The job re-runs the effect, which reads the source again (and
//!    relinks its dependencies).
//! 3. The new value is compared with the stored one. Deep and forced
//!    sources skip the comparison.
//! 4. On a change the stored value is replaced and the callback runs inside
//!    a batch, so writes it makes are flushed once it returns.
//!
//! With `once` the watcher stops after its first callback. Without a
//! callback ([`watch_effect`]) the job just re-runs the function.
//!
//! # Deep Watching
//!
//! `deep` walks the value returned by the source with [`traverse`], so every
//! signal nested inside it becomes a dependency. `true` walks without bound,
//! a number bounds the walk, and `false`/`0` keeps a [`Deep`] source to its
//! first level.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{watch, Signal, WatchOptions};
//!
//! let count = Signal::new(1);
//!
//! let handle = watch(
//!     count.clone(),
//!     |new, old, _stop| println!("{old:?} -> {new}"),
//!     WatchOptions::default(),
//! );
//!
//! count.set(2); // prints "Some(1) -> 2"
//! handle.stop();
//! count.set(3); // prints nothing
//! ```

mod deep;
mod options;
mod source;
mod traverse;

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

pub use deep::{Deep, DeepReactive, Shallow};
pub use options::{Depth, WatchOptions};
pub use source::{from_fn, FnSource, WatchSource};
pub use traverse::{traverse, Raw, Traversal, Traverse};

use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::reactive::{BatchGuard, Effect, EffectHandle, Runtime, RuntimeInner};

type Callback<V> = Box<dyn Fn(&V, Option<&V>, &WatchHandle)>;

/// Stops a watcher.
///
/// Dropping the handle does not stop the watcher; it runs until
/// [`stop`](Self::stop) is called or its runtime is dropped.
#[derive(Clone)]
pub struct WatchHandle {
    effect: EffectHandle,
}

impl WatchHandle {
    /// The node id of the watcher's effect.
    pub fn id(&self) -> NodeId {
        self.effect.id()
    }

    /// Detach the watcher. Idempotent.
    pub fn stop(&self) {
        if self.effect.is_stopped() {
            return;
        }
        if let Some(runtime) = self.effect.runtime() {
            debug!(runtime = runtime.label(), watcher = %self.id(), "watch stopped");
        }
        self.effect.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_stopped()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct Watcher<S: WatchSource> {
    source: Rc<S>,
    effect: Effect<S::Value>,
    callback: Option<Callback<S::Value>>,
    old: RefCell<Option<S::Value>>,
    deep: bool,
    force: bool,
    once: bool,
    handle: WatchHandle,
}

impl<S: WatchSource> Watcher<S> {
    fn spawn(
        runtime: &Rc<RuntimeInner>,
        source: S,
        callback: Option<Callback<S::Value>>,
        options: WatchOptions,
    ) -> WatchHandle {
        let source = Rc::new(source);
        let has_callback = callback.is_some();

        // With a callback, a deep option walks whatever the source returns.
        let walk = options
            .deep
            .filter(|depth| has_callback && depth.is_deep())
            .map(Depth::limit);
        let effect = Effect::new_in(
            runtime,
            {
                let source = Rc::clone(&source);
                let options = options.clone();
                move || {
                    let value = source.read(&options);
                    if let Some(depth) = walk {
                        traverse(&value, depth);
                    }
                    value
                }
            },
            false,
        );

        let handle = WatchHandle {
            effect: effect.handle(),
        };
        let watcher = Rc::new(Watcher {
            force: source.force_trigger(),
            source,
            effect,
            callback,
            old: RefCell::new(None),
            deep: options.is_deep(),
            once: options.once,
            handle: handle.clone(),
        });
        watcher.effect.set_scheduler({
            let watcher = Rc::clone(&watcher);
            move || watcher.job(false)
        });

        debug!(
            runtime = runtime.label(),
            watcher = %handle.id(),
            source = type_name::<S>(),
            immediate = options.immediate,
            deep = watcher.deep,
            once = options.once,
            "watch created"
        );

        if !has_callback {
            watcher.effect.run();
        } else if options.immediate {
            watcher.job(true);
        } else {
            let initial = watcher.effect.run();
            *watcher.old.borrow_mut() = initial;
        }
        handle
    }

    fn job(&self, first_run: bool) {
        if self.effect.is_stopped() || (!first_run && !self.effect.is_dirty()) {
            return;
        }
        let Some(new) = self.effect.run() else {
            return;
        };
        let Some(callback) = &self.callback else {
            return;
        };

        let fire = self.deep
            || self.force
            || match &*self.old.borrow() {
                Some(old) => self.source.changed(old, &new),
                None => true,
            };
        if !fire {
            return;
        }

        let old = self.old.borrow().clone();
        {
            let runtime = self.handle.effect.runtime();
            let _batch = runtime.as_deref().map(BatchGuard::open);
            callback(&new, old.as_ref(), &self.handle);
            // Recorded before the batch flushes, so writes made by the
            // callback compare against this value. A panicking callback
            // leaves the previous one in place.
            *self.old.borrow_mut() = Some(new);
        }
        if self.once {
            self.handle.stop();
        }
    }
}

impl Runtime {
    /// Watch `source`, calling `callback(new, old, stop)` when it changes.
    ///
    /// A source that can never change (a plain value) is logged and watched
    /// as a constant. Use [`try_watch`](Self::try_watch) to reject it instead.
    pub fn watch<S, F>(&self, source: S, callback: F, options: WatchOptions) -> WatchHandle
    where
        S: WatchSource,
        F: Fn(&S::Value, Option<&S::Value>, &WatchHandle) + 'static,
    {
        if !source.is_reactive() {
            warn!(
                runtime = self.inner().label(),
                source = type_name::<S>(),
                "invalid watch source: it holds no signal or computed and will never change"
            );
        }
        let callback: Callback<S::Value> = Box::new(callback);
        Watcher::spawn(self.inner(), source, Some(callback), options)
    }

    /// Like [`watch`](Self::watch), but a non-reactive source is an error.
    pub fn try_watch<S, F>(
        &self,
        source: S,
        callback: F,
        options: WatchOptions,
    ) -> Result<WatchHandle>
    where
        S: WatchSource,
        F: Fn(&S::Value, Option<&S::Value>, &WatchHandle) + 'static,
    {
        if !source.is_reactive() {
            return Err(Error::InvalidSource(type_name::<S>()));
        }
        let callback: Callback<S::Value> = Box::new(callback);
        Ok(Watcher::spawn(self.inner(), source, Some(callback), options))
    }

    /// Run `f` now and again whenever something it read changes.
    pub fn watch_effect(&self, f: impl Fn() + 'static) -> WatchHandle {
        Watcher::spawn(self.inner(), from_fn(f), None, WatchOptions::default())
    }
}

/// Watch `source` in the current runtime. See [`Runtime::watch`].
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>, &WatchHandle) + 'static,
{
    Runtime::current().watch(source, callback, options)
}

/// Watch `source` in the current runtime, rejecting non-reactive sources.
pub fn try_watch<S, F>(source: S, callback: F, options: WatchOptions) -> Result<WatchHandle>
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>, &WatchHandle) + 'static,
{
    Runtime::current().try_watch(source, callback, options)
}

/// Run `f` in the current runtime now and whenever its reads change.
pub fn watch_effect(f: impl Fn() + 'static) -> WatchHandle {
    Runtime::current().watch_effect(f)
}
