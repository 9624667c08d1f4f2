//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds
//! and effects. It owns the dependency graph, the tracking context and the
//! batch counter, and it drives the pull side of the algorithm.
//!
//! # How It Works
//!
//! 1. Creating a signal, computed or effect allocates a node in the graph.
//!
//! 2. When a computed or effect reads a node, the runtime links the node to
//!    the active subscriber.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Propagates `DIRTY` / `PENDING_COMPUTED` through the graph
//!    b. Queues every reached effect
//!    c. Flushes the queue, unless a batch is open
//!    d. Computeds stay lazy: they recompute on the next read that finds
//!       them stale
//!
//! 4. Resolving `PENDING_COMPUTED` walks the subscriber's dependencies
//!    upstream, recomputing stale computeds until one of them reports a
//!    changed value (dirty) or all of them turn out unchanged (clean).
//!
//! # Threading
//!
//! A runtime is single-threaded (`!Send`). Each thread lazily creates a
//! default runtime used by the free functions; [`Runtime::enter`] overrides it
//! for the duration of a closure. Independent runtimes never share nodes.
//!
//! # Borrowing
//!
//! The graph sits in a `RefCell`. No user code (getters, effects, callbacks,
//! drop glue of user closures) ever runs while it is borrowed: handlers are
//! cloned out of the arena, the borrow is released, then they are invoked.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace};

use super::context::{TrackingContext, Untracked};
use super::{Computed, Effect, Signal};
use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::graph::{Flags, Graph, GraphSnapshot, Handler, LinkId, NodeId};

thread_local! {
    static DEFAULT_RUNTIME: Runtime = Runtime::new();
    static SCOPED_RUNTIMES: RefCell<Vec<Runtime>> = const { RefCell::new(Vec::new()) };
}

/// Shared state of one runtime.
pub(crate) struct RuntimeInner {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) context: TrackingContext,
    pub(crate) batch_depth: Cell<u32>,
    flushing: Cell<bool>,
    config: RuntimeConfig,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            context: TrackingContext::new(),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            config,
        }
    }

    pub(crate) fn label(&self) -> &str {
        self.config.display_label()
    }

    /// Link `dep` to the active subscriber, if there is one.
    pub(crate) fn track(&self, dep: NodeId) {
        if let Some(sub) = self.context.active() {
            let mut graph = self.graph.borrow_mut();
            if graph.contains(dep) && graph.contains(sub) {
                graph.link(dep, sub);
            }
        }
    }

    /// Mark everything downstream of `dep` and flush unless batching.
    pub(crate) fn propagate_from(&self, dep: NodeId) {
        let marked = {
            let mut graph = self.graph.borrow_mut();
            if !graph.contains(dep) {
                return;
            }
            match graph.node(dep).subs {
                Some(head) => graph.propagate(head),
                None => return,
            }
        };
        trace!(runtime = self.label(), node = %dep, marked, "propagated write");

        if self.batch_depth.get() == 0 {
            self.flush();
        }
    }

    // ------------------------------------------------------------------------
    // Pull side
    // ------------------------------------------------------------------------

    /// Walk a dependency list looking for a computed whose value changed.
    ///
    /// Pending computeds are resolved recursively; the first dependency that
    /// recomputes to a new value ends the walk.
    pub(crate) fn check_dirty(&self, head: Option<LinkId>) -> bool {
        let mut cursor = head;
        while let Some(link) = cursor {
            let (dep, next, flags, dep_deps) = {
                let graph = self.graph.borrow();
                let edge = graph.edge(link);
                let node = graph.node(edge.dep);
                (edge.dep, edge.next_dep, node.flags, node.deps)
            };

            if flags.contains(Flags::COMPUTED | Flags::DIRTY) {
                if self.recompute(dep) {
                    self.fan_out(dep, true);
                    return true;
                }
            } else if flags.contains(Flags::COMPUTED | Flags::PENDING_COMPUTED) {
                if self.check_dirty(dep_deps) {
                    if self.recompute(dep) {
                        self.fan_out(dep, true);
                        return true;
                    }
                } else {
                    self.graph
                        .borrow_mut()
                        .node_mut(dep)
                        .flags
                        .remove(Flags::PENDING_COMPUTED);
                }
            }

            cursor = next;
        }
        false
    }

    /// Resolve `PENDING_COMPUTED` on `sub`. Returns whether it is dirty.
    pub(crate) fn update_dirty_flag(&self, sub: NodeId) -> bool {
        let deps = self.graph.borrow().node(sub).deps;
        let dirty = self.check_dirty(deps);
        let mut graph = self.graph.borrow_mut();
        if graph.contains(sub) {
            let node = graph.node_mut(sub);
            if dirty {
                node.flags.insert(Flags::DIRTY);
            } else {
                node.flags.remove(Flags::PENDING_COMPUTED);
            }
        }
        dirty
    }

    /// Bring a stale computed up to date before it is read.
    pub(crate) fn process_computed_update(&self, id: NodeId) {
        let flags = self.graph.borrow().flags(id);
        let dirty = flags.contains(Flags::DIRTY)
            || (flags.contains(Flags::PENDING_COMPUTED) && self.update_dirty_flag(id));
        if dirty && self.recompute(id) {
            self.fan_out(id, false);
        }
    }

    /// Run a computed's getter through its handler. Returns whether the
    /// value changed.
    fn recompute(&self, id: NodeId) -> bool {
        let (handler, flags) = {
            let graph = self.graph.borrow();
            let node = graph.node(id);
            (node.computed_handler(), node.flags)
        };
        if flags.contains(Flags::TRACKING) {
            panic!("{}", Error::Cycle(id));
        }
        match handler {
            Some(handler) => handler.update(),
            None => false,
        }
    }

    /// After `id` changed, upgrade its pending subscribers to dirty.
    ///
    /// While resolving on behalf of a single subscriber, that subscriber is
    /// marked by the caller, so only multi-subscriber nodes need the walk.
    fn fan_out(&self, id: NodeId, only_if_shared: bool) {
        let mut graph = self.graph.borrow_mut();
        if let Some(head) = graph.node(id).subs {
            if !only_if_shared || graph.edge(head).next_sub.is_some() {
                graph.shallow_propagate(head);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Drain the effect queue, calling `notify()` on each queued effect.
    ///
    /// Not re-entrant: effects queued by writes made during the flush are
    /// picked up by the loop already running, so chains of effect writes do
    /// not grow the stack.
    pub(crate) fn flush(&self) {
        if self.flushing.replace(true) {
            return;
        }
        let _flushing = Flushing(self);
        trace!(runtime = self.label(), queued = self.graph.borrow().queue.len(), "flush start");

        let limit = self.config.max_flush_notifications;
        let mut notified = 0;
        loop {
            let handler = {
                let mut graph = self.graph.borrow_mut();
                let Some(id) = graph.queue.pop() else {
                    break;
                };
                let node = graph.node_mut(id);
                node.flags.remove(Flags::NOTIFIED);
                node.effect_handler()
            };
            let Some(handler) = handler else {
                continue;
            };

            notified += 1;
            if notified > limit {
                let mut graph = self.graph.borrow_mut();
                while let Some(id) = graph.queue.pop() {
                    graph.node_mut(id).flags.remove(Flags::NOTIFIED);
                }
                drop(graph);
                let err = Error::FlushLimitExceeded { limit };
                error!(runtime = self.label(), limit, "{err}");
                panic!("{err}");
            }

            handler.notify();
        }

        trace!(runtime = self.label(), notified, "flush end");
        debug_assert_eq!(self.graph.borrow().check_invariants(), Ok(()));
    }

    /// Stop an effect: detach it from all dependencies and release its
    /// handler. Idempotent.
    pub(crate) fn stop_effect(&self, id: NodeId) {
        let released = {
            let mut graph = self.graph.borrow_mut();
            if !graph.contains(id) {
                return;
            }
            let flags = graph.flags(id);
            if flags.contains(Flags::STOPPED) {
                return;
            }
            graph.set_flags(id, flags | Flags::STOPPED);
            // Mid-run, the open pass closes with nothing confirmed.
            if !flags.contains(Flags::TRACKING) {
                graph.start_tracking(id);
                graph.end_tracking(id);
            }
            graph.queue.purge(id);
            graph.release_handler(id)
        };
        debug!(runtime = self.label(), node = %id, "effect stopped");

        if let Handler::Effect(handler) = &released {
            handler.dispose();
        }
        drop(released);
    }

    pub(crate) fn is_stopped(&self, id: NodeId) -> bool {
        let graph = self.graph.borrow();
        !graph.contains(id) || graph.flags(id).contains(Flags::STOPPED)
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        // Effect handlers may own closures that own watchers that own the
        // effect again; disposing breaks those loops.
        let graph = self.graph.get_mut();
        graph.queue.clear();
        let handlers: Vec<Handler> = graph
            .node_ids()
            .into_iter()
            .map(|id| graph.release_handler(id))
            .collect();
        for handler in &handlers {
            if let Handler::Effect(effect) = handler {
                effect.dispose();
            }
        }
    }
}

struct Flushing<'a>(&'a RuntimeInner);

impl Drop for Flushing<'_> {
    fn drop(&mut self) {
        self.0.flushing.set(false);
    }
}

/// Remove a node when its owning handle is dropped.
///
/// Silently does nothing when the runtime is already gone.
pub(crate) fn release_node(runtime: &Weak<RuntimeInner>, id: NodeId) {
    let Some(runtime) = runtime.upgrade() else {
        return;
    };
    let handler = {
        let Ok(mut graph) = runtime.graph.try_borrow_mut() else {
            return;
        };
        if !graph.contains(id) {
            return;
        }
        graph.remove(id)
    };
    drop(handler);
}

// ----------------------------------------------------------------------------
// Public handle
// ----------------------------------------------------------------------------

/// Handle to a reactive runtime.
///
/// Cloning is cheap and yields another handle to the same runtime. The
/// runtime lives as long as one handle does; nodes keep only weak references
/// to it.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create an independent runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an independent runtime.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(config)),
        }
    }

    /// The runtime used by the free functions on this thread: the innermost
    /// [`enter`](Self::enter)ed runtime, or the thread's default runtime.
    pub fn current() -> Self {
        SCOPED_RUNTIMES
            .with(|scoped| scoped.borrow().last().cloned())
            .unwrap_or_else(|| DEFAULT_RUNTIME.with(Runtime::clone))
    }

    /// Make this runtime current for the free functions while `f` runs.
    pub fn enter<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Exit;
        impl Drop for Exit {
            fn drop(&mut self) {
                SCOPED_RUNTIMES.with(|scoped| scoped.borrow_mut().pop());
            }
        }

        SCOPED_RUNTIMES.with(|scoped| scoped.borrow_mut().push(self.clone()));
        let _exit = Exit;
        f()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether two handles point at the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    // ------------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------------

    /// Create a signal in this runtime.
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new_in(&self.inner, value)
    }

    /// Create a computed in this runtime.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new_in(&self.inner, move |_| getter())
    }

    /// Create a computed whose getter receives the previous value.
    pub fn computed_with<T, F>(&self, getter: F) -> Computed<T>
    where
        T: PartialEq + 'static,
        F: Fn(Option<&T>) -> T + 'static,
    {
        Computed::new_in(&self.inner, getter)
    }

    /// Create an effect in this runtime and run it once.
    pub fn effect<T, F>(&self, f: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Effect::new_in(&self.inner, f, true)
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Run `f` without linking any reads to the active subscriber.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _untracked = Untracked::new(&self.inner.context);
        f()
    }

    /// Suspend tracking until [`resume_tracking`](Self::resume_tracking).
    /// Prefer [`untracked`](Self::untracked), which cannot be left unbalanced.
    pub fn pause_tracking(&self) {
        self.inner.context.pause();
    }

    pub fn resume_tracking(&self) {
        self.inner.context.resume();
    }

    /// The subscriber currently collecting dependencies.
    pub fn active_subscriber(&self) -> Option<NodeId> {
        self.inner.context.active()
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Copy the current graph shape.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.inner.graph.borrow().snapshot()
    }

    /// Verify the link lists are consistent.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.inner.graph.borrow().check_invariants()
    }

    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    pub fn link_count(&self) -> usize {
        self.inner.graph.borrow().link_count()
    }

    /// Effects queued and not yet notified.
    pub fn pending_effects(&self) -> usize {
        self.inner.graph.borrow().queue.len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.inner.graph.try_borrow();
        f.debug_struct("Runtime")
            .field("label", &self.inner.label())
            .field("nodes", &graph.as_ref().map(|g| g.node_count()).ok())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish()
    }
}

/// Run `f` in the current runtime without tracking its reads.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untracked(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn current_defaults_to_thread_runtime() {
        assert!(Runtime::current().ptr_eq(&Runtime::current()));
    }

    #[test]
    fn enter_scopes_current_runtime() {
        let outer = Runtime::current();
        let rt = Runtime::with_config(RuntimeConfig::new().with_label("scoped"));

        rt.enter(|| {
            assert!(Runtime::current().ptr_eq(&rt));
            assert_eq!(Runtime::current().config().label.as_deref(), Some("scoped"));
        });

        assert!(Runtime::current().ptr_eq(&outer));
    }

    #[test]
    fn enter_pops_on_panic() {
        let outer = Runtime::current();
        let rt = Runtime::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            rt.enter(|| panic!("boom"));
        }));

        assert!(result.is_err());
        assert!(Runtime::current().ptr_eq(&outer));
    }

    #[test]
    fn untracked_reads_do_not_link() {
        let rt = Runtime::new();
        rt.enter(|| {
            let a = rt.signal(1);
            let b = rt.signal(2);
            let runs = Rc::new(Cell::new(0));

            let _effect = rt.effect({
                let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
                move || {
                    runs.set(runs.get() + 1);
                    a.get() + untracked(|| b.get())
                }
            });

            assert_eq!(a.subscriber_count(), 1);
            assert_eq!(b.subscriber_count(), 0);

            b.set(20);
            assert_eq!(runs.get(), 1);
            a.set(10);
            assert_eq!(runs.get(), 2);
        });
    }

    #[test]
    fn stop_effect_is_idempotent() {
        let rt = Runtime::new();
        let s = rt.signal(0);
        let effect = rt.effect({
            let s = s.clone();
            move || s.get()
        });

        effect.stop();
        effect.stop();

        assert!(effect.is_stopped());
        assert_eq!(s.subscriber_count(), 0);
        rt.check_invariants().unwrap();
    }

    #[test]
    fn dropping_runtime_frees_effects() {
        let dropped = Rc::new(Cell::new(false));

        struct Flag(Rc<Cell<bool>>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        {
            let rt = Runtime::new();
            let flag = Flag(dropped.clone());
            let s = rt.signal(0);
            rt.effect(move || {
                let _keep = &flag;
                s.get();
            });
            assert!(!dropped.get());
        }

        assert!(dropped.get());
    }

    #[test]
    fn debug_output_names_label() {
        let rt = Runtime::with_config(RuntimeConfig::new().with_label("dbg"));
        let rendered = format!("{rt:?}");
        assert!(rendered.contains("dbg"));
    }
}
