//! Graph Nodes
//!
//! This module defines the node records that live in the dependency graph
//! arena, together with their identifiers and status flags.

use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use serde::Serialize;

use super::link::LinkId;
use crate::reactive::Reactive;

/// Unique identifier for a node in the dependency graph.
///
/// This is a slot index into the runtime's node arena. It stays valid for as
/// long as the signal, computed or effect that owns it is alive.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Get the raw arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    /// A signal. Roots of the graph: subscribers only, no dependencies.
    Signal,

    /// A computed value. Has dependencies and may have subscribers.
    Computed,

    /// An effect. Leaves of the graph: dependencies only.
    Effect,
}

bitflags! {
    /// Status bits carried by every subscriber node.
    ///
    /// Kind tags and status bits share one field so a single load answers
    /// "is this a dirty computed?" style questions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
    pub struct Flags: u16 {
        /// Node is a computed.
        const COMPUTED = 1 << 0;
        /// Node is an effect.
        const EFFECT = 1 << 1;
        /// A tracking pass is open on this node.
        const TRACKING = 1 << 2;
        /// Node was reached by the current propagation and, for effects, queued.
        const NOTIFIED = 1 << 3;
        /// Node was reached while tracking, through a link confirmed in that pass.
        const RECURSED = 1 << 4;
        /// Known stale: must re-run before its value is trusted.
        const DIRTY = 1 << 5;
        /// An upstream computed may have changed; must be pulled to know.
        const PENDING_COMPUTED = 1 << 6;
        /// Effect was stopped and never runs again.
        const STOPPED = 1 << 7;

        const PROPAGATED = Self::DIRTY.bits() | Self::PENDING_COMPUTED.bits();
    }
}

/// The evaluation capability registered for a node.
///
/// Computeds are held weakly: they live as long as user handles (or closures
/// of their readers) keep them. Effects are owned by the arena until stopped.
pub(crate) enum Handler {
    Signal,
    Computed(Weak<dyn Reactive>),
    Effect(Rc<dyn Reactive>),
    Released,
}

/// A node record in the arena.
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) flags: Flags,

    /// Head and tail of the dependency-link list (links where this node is
    /// the subscriber). While tracking, `deps_tail` is the last confirmed link.
    pub(crate) deps: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,

    /// Head and tail of the subscriber-link list (links where this node is
    /// the dependency).
    pub(crate) subs: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,

    pub(crate) handler: Handler,
}

impl Node {
    /// Create a node of the given kind with its initial flags.
    ///
    /// Computeds start dirty so the first read evaluates them.
    pub(crate) fn new(kind: NodeKind, handler: Handler) -> Self {
        let flags = match kind {
            NodeKind::Signal => Flags::empty(),
            NodeKind::Computed => Flags::COMPUTED | Flags::DIRTY,
            NodeKind::Effect => Flags::EFFECT,
        };
        Self {
            kind,
            flags,
            deps: None,
            deps_tail: None,
            subs: None,
            subs_tail: None,
            handler,
        }
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.flags.contains(Flags::COMPUTED)
    }

    pub(crate) fn is_effect(&self) -> bool {
        self.flags.contains(Flags::EFFECT)
    }

    /// Clone the computed's evaluation capability, if it is still alive.
    pub(crate) fn computed_handler(&self) -> Option<Rc<dyn Reactive>> {
        match &self.handler {
            Handler::Computed(weak) => weak.upgrade(),
            _ => None,
        }
    }

    /// Clone the effect's evaluation capability, unless it was released.
    pub(crate) fn effect_handler(&self) -> Option<Rc<dyn Reactive>> {
        match &self.handler {
            Handler::Effect(rc) => Some(rc.clone()),
            _ => None,
        }
    }
}
