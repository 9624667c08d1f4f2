//! Dependency Graph
//!
//! This module implements the link structure between dependency nodes
//! (things read from) and subscriber nodes (things that read), and the
//! algorithms that walk it.
//!
//! # Overview
//!
//! - Nodes live in a slab arena and are addressed by [`NodeId`].
//! - Every dependency → subscriber edge is a [`Link`] in a second arena. A link
//!   is threaded through two intrusive doubly-linked lists: the dependency's
//!   subscriber list and the subscriber's dependency list. Insertion and
//!   removal are O(1) and links survive recomputations that read the same
//!   dependencies in the same order.
//!
//! # Read side
//!
//! A subscriber opens a tracking pass with [`Graph::start_tracking`], which
//! resets its confirmed boundary (`deps_tail`). Each read calls
//! [`Graph::link`], which either confirms the next existing link or splices a
//! new one in. [`Graph::end_tracking`] then drops everything past the
//! boundary: the dependencies that were not read this time.
//!
//! # Write side
//!
//! [`Graph::propagate`] walks outward from a changed dependency, marking
//! direct subscribers `DIRTY` and transitive ones `PENDING_COMPUTED`, and
//! queues every reached effect. No user code runs during the walk; computeds
//! are resolved later, when something pulls them.

mod link;
mod node;
mod scheduler;
mod snapshot;

pub use link::LinkId;
pub use node::{Flags, NodeId, NodeKind};
pub use snapshot::{GraphSnapshot, NodeSnapshot};

pub(crate) use link::Link;
pub(crate) use node::{Handler, Node};
pub(crate) use scheduler::EffectQueue;

use slab::Slab;
use smallvec::SmallVec;

/// The arena holding every node and link of one runtime.
pub(crate) struct Graph {
    nodes: Slab<Node>,
    links: Slab<Link>,
    pub(crate) queue: EffectQueue,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Slab::new(),
            links: Slab::new(),
            queue: EffectQueue::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Node management
    // ------------------------------------------------------------------------

    pub(crate) fn insert(&mut self, kind: NodeKind, handler: Handler) -> NodeId {
        NodeId::new(self.nodes.insert(Node::new(kind, handler)))
    }

    pub(crate) fn set_handler(&mut self, id: NodeId, handler: Handler) {
        self.node_mut(id).handler = handler;
    }

    /// Replace the handler with `Released`, handing the old one back so the
    /// caller can drop it after releasing the graph borrow.
    pub(crate) fn release_handler(&mut self, id: NodeId) -> Handler {
        std::mem::replace(&mut self.node_mut(id).handler, Handler::Released)
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id.index())
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn flags(&self, id: NodeId) -> Flags {
        self.node(id).flags
    }

    pub(crate) fn set_flags(&mut self, id: NodeId, flags: Flags) {
        self.node_mut(id).flags = flags;
    }

    pub(crate) fn edge(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    pub(crate) fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|(index, _)| NodeId::new(index)).collect()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Remove a node and every link touching it.
    ///
    /// Returns the node's handler; the caller drops it outside the borrow,
    /// since dropping an effect may drop user closures that own other nodes.
    pub(crate) fn remove(&mut self, id: NodeId) -> Handler {
        if let Some(head) = self.node_mut(id).deps.take() {
            self.node_mut(id).deps_tail = None;
            self.clear_tracking(head);
        }

        let mut cursor = self.node_mut(id).subs.take();
        self.node_mut(id).subs_tail = None;
        while let Some(link_id) = cursor {
            let link = self.links.remove(link_id.index());
            cursor = link.next_sub;
            self.detach_from_subscriber(link_id, &link);
        }

        self.queue.purge(id);
        self.nodes.remove(id.index()).handler
    }

    /// Splice a removed link out of its subscriber's dependency list.
    fn detach_from_subscriber(&mut self, link_id: LinkId, link: &Link) {
        let sub = &mut self.nodes[link.sub.index()];
        if sub.deps_tail == Some(link_id) {
            sub.deps_tail = link.prev_dep;
        }
        match link.prev_dep {
            Some(prev) => self.links[prev.index()].next_dep = link.next_dep,
            None => sub.deps = link.next_dep,
        }
        if let Some(next) = link.next_dep {
            self.links[next.index()].prev_dep = link.prev_dep;
        }
    }

    pub(crate) fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(id).deps;
        while let Some(link) = cursor {
            let link = self.edge(link);
            out.push(link.dep);
            cursor = link.next_dep;
        }
        out
    }

    pub(crate) fn subscribers(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(id).subs;
        while let Some(link) = cursor {
            let link = self.edge(link);
            out.push(link.sub);
            cursor = link.next_sub;
        }
        out
    }

    // ------------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------------

    /// Record that `sub` read `dep` during its open tracking pass.
    pub(crate) fn link(&mut self, dep: NodeId, sub: NodeId) {
        let current = self.node(sub).deps_tail;
        if let Some(current) = current {
            if self.edge(current).dep == dep {
                return;
            }
        }

        let next = match current {
            Some(current) => self.edge(current).next_dep,
            None => self.node(sub).deps,
        };
        if let Some(next) = next {
            if self.edge(next).dep == dep {
                self.node_mut(sub).deps_tail = Some(next);
                return;
            }
        }

        // Same dependency read twice in one pass, with other reads in between.
        if let Some(last) = self.node(dep).subs_tail {
            if self.edge(last).sub == sub && self.is_valid_link(last, sub) {
                return;
            }
        }

        self.link_new_dep(dep, sub, next, current);
    }

    /// Splice a fresh link between the confirmed tail and the unconfirmed rest.
    fn link_new_dep(
        &mut self,
        dep: NodeId,
        sub: NodeId,
        next_dep: Option<LinkId>,
        deps_tail: Option<LinkId>,
    ) -> LinkId {
        let prev_sub = self.node(dep).subs_tail;
        let id = LinkId::new(self.links.insert(Link {
            dep,
            sub,
            prev_sub,
            next_sub: None,
            prev_dep: deps_tail,
            next_dep,
        }));

        match deps_tail {
            Some(tail) => self.links[tail.index()].next_dep = Some(id),
            None => self.node_mut(sub).deps = Some(id),
        }
        if let Some(next) = next_dep {
            self.links[next.index()].prev_dep = Some(id);
        }
        match prev_sub {
            Some(prev) => self.links[prev.index()].next_sub = Some(id),
            None => self.node_mut(dep).subs = Some(id),
        }

        self.node_mut(sub).deps_tail = Some(id);
        self.node_mut(dep).subs_tail = Some(id);
        id
    }

    /// Whether `check` is among the links `sub` confirmed in its current pass.
    pub(crate) fn is_valid_link(&self, check: LinkId, sub: NodeId) -> bool {
        let node = self.node(sub);
        let Some(tail) = node.deps_tail else {
            return false;
        };
        let mut cursor = node.deps;
        while let Some(link) = cursor {
            if link == check {
                return true;
            }
            if link == tail {
                break;
            }
            cursor = self.edge(link).next_dep;
        }
        false
    }

    /// Open a dependency-discovery pass on `sub`.
    pub(crate) fn start_tracking(&mut self, sub: NodeId) {
        let node = self.node_mut(sub);
        node.deps_tail = None;
        node.flags = (node.flags - (Flags::NOTIFIED | Flags::RECURSED | Flags::PROPAGATED))
            | Flags::TRACKING;
    }

    /// Close the pass on `sub`, pruning every link it did not confirm.
    ///
    /// A stopped node confirms nothing, so it ends up with no dependencies
    /// even if it was stopped from inside its own run. Returns the number of
    /// links removed.
    pub(crate) fn end_tracking(&mut self, sub: NodeId) -> usize {
        let node = self.node(sub);
        let tail = if node.flags.contains(Flags::STOPPED) {
            None
        } else {
            node.deps_tail
        };

        let removed = match tail {
            Some(tail) => match self.links[tail.index()].next_dep.take() {
                Some(stale) => self.clear_tracking(stale),
                None => 0,
            },
            None => {
                let node = self.node_mut(sub);
                node.deps_tail = None;
                match node.deps.take() {
                    Some(stale) => self.clear_tracking(stale),
                    None => 0,
                }
            }
        };

        self.node_mut(sub).flags.remove(Flags::TRACKING);
        removed
    }

    /// Remove the chain of dependency links starting at `start`.
    ///
    /// The caller has already cut the chain off its subscriber's list. When a
    /// computed loses its last subscriber here it goes dirty and releases its
    /// own dependencies too, so unobserved branches do not stay wired in.
    fn clear_tracking(&mut self, start: LinkId) -> usize {
        let mut removed = 0;
        let mut cursor = Some(start);
        let mut resume: SmallVec<[LinkId; 8]> = SmallVec::new();

        loop {
            let Some(link_id) = cursor.or_else(|| resume.pop()) else {
                break;
            };
            let link = self.links.remove(link_id.index());
            removed += 1;

            let dep = link.dep;
            match link.next_sub {
                Some(next) => self.links[next.index()].prev_sub = link.prev_sub,
                None => self.node_mut(dep).subs_tail = link.prev_sub,
            }
            match link.prev_sub {
                Some(prev) => self.links[prev.index()].next_sub = link.next_sub,
                None => self.node_mut(dep).subs = link.next_sub,
            }
            cursor = link.next_dep;

            let dep_node = self.node_mut(dep);
            if dep_node.subs.is_none()
                && dep_node.is_computed()
                && !dep_node.flags.contains(Flags::TRACKING)
            {
                dep_node.flags.insert(Flags::DIRTY);
                if let Some(dep_deps) = dep_node.deps.take() {
                    dep_node.deps_tail = None;
                    if let Some(rest) = cursor {
                        resume.push(rest);
                    }
                    cursor = Some(dep_deps);
                }
            }
        }

        removed
    }

    // ------------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------------

    /// Mark everything reachable from the subscriber list starting at `head`.
    ///
    /// Direct subscribers become `DIRTY`, nodes reached through a computed
    /// become `PENDING_COMPUTED`. A computed's own subscribers are only walked
    /// the first time it is marked in this pass. Returns the number of nodes
    /// whose flags changed.
    pub(crate) fn propagate(&mut self, head: LinkId) -> usize {
        let mut marked = 0;
        let mut current = head;
        let mut branches: SmallVec<[Option<LinkId>; 8]> = SmallVec::new();
        let mut target = Flags::DIRTY;

        loop {
            let (sub, next) = {
                let link = self.edge(current);
                (link.sub, link.next_sub)
            };
            let flags = self.flags(sub);
            let mut should_notify = false;

            if !flags.intersects(Flags::TRACKING | Flags::RECURSED | Flags::PROPAGATED) {
                self.set_flags(sub, flags | target | Flags::NOTIFIED);
                should_notify = true;
            } else if flags.contains(Flags::RECURSED) && !flags.contains(Flags::TRACKING) {
                self.set_flags(sub, (flags - Flags::RECURSED) | target | Flags::NOTIFIED);
                should_notify = true;
            } else if !flags.intersects(Flags::PROPAGATED) && self.is_valid_link(current, sub) {
                // Written while `sub` is mid-run, through a link it already read.
                self.set_flags(sub, flags | Flags::RECURSED | target | Flags::NOTIFIED);
                should_notify = self.node(sub).subs.is_some();
            }

            if should_notify {
                marked += 1;
                if let Some(sub_subs) = self.node(sub).subs {
                    branches.push(next);
                    current = sub_subs;
                    target = Flags::PENDING_COMPUTED;
                    continue;
                }
                if flags.contains(Flags::EFFECT) {
                    self.queue.push(sub);
                }
            } else if !flags.intersects(Flags::TRACKING | target) {
                // Pending → dirty upgrade on an already reached node.
                marked += 1;
                self.set_flags(sub, flags | target | Flags::NOTIFIED);
                if flags & (Flags::EFFECT | Flags::NOTIFIED) == Flags::EFFECT {
                    self.queue.push(sub);
                }
            } else if !flags.intersects(target)
                && flags.intersects(Flags::PROPAGATED)
                && self.is_valid_link(current, sub)
            {
                marked += 1;
                self.set_flags(sub, flags | target);
            }

            let mut resume = next;
            loop {
                if let Some(link) = resume {
                    current = link;
                    target = if branches.is_empty() {
                        Flags::DIRTY
                    } else {
                        Flags::PENDING_COMPUTED
                    };
                    break;
                }
                match branches.pop() {
                    Some(saved) => resume = saved,
                    None => return marked,
                }
            }
        }
    }

    /// After a computed recomputed to a new value, upgrade its pending
    /// subscribers to dirty. Only one level: their own subscribers are
    /// already pending.
    pub(crate) fn shallow_propagate(&mut self, head: LinkId) {
        let mut cursor = Some(head);
        while let Some(link_id) = cursor {
            let (sub, next) = {
                let link = self.edge(link_id);
                (link.sub, link.next_sub)
            };
            let flags = self.flags(sub);
            if flags & (Flags::PENDING_COMPUTED | Flags::DIRTY) == Flags::PENDING_COMPUTED {
                self.set_flags(sub, flags | Flags::DIRTY | Flags::NOTIFIED);
                if flags & (Flags::EFFECT | Flags::NOTIFIED) == Flags::EFFECT {
                    self.queue.push(sub);
                }
            }
            cursor = next;
        }
    }

    // ------------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------------

    /// Verify link-list consistency across the whole arena.
    ///
    /// Every link must appear exactly once in its dependency's subscriber
    /// list and once in its subscriber's dependency list, with matching back
    /// pointers and tails.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        let mut seen_in_deps = 0;
        let mut seen_in_subs = 0;

        for (index, node) in self.nodes.iter() {
            let id = NodeId::new(index);

            let mut prev = None;
            let mut cursor = node.deps;
            while let Some(link_id) = cursor {
                let link = self
                    .links
                    .get(link_id.index())
                    .ok_or_else(|| format!("{id}: dangling dependency link {link_id:?}"))?;
                if link.sub != id {
                    return Err(format!("{id}: dependency link {link_id:?} belongs to {}", link.sub));
                }
                if link.prev_dep != prev {
                    return Err(format!("{id}: broken prev_dep at {link_id:?}"));
                }
                if !self.subscribers(link.dep).contains(&id) {
                    return Err(format!("{id}: missing from subscribers of {}", link.dep));
                }
                seen_in_deps += 1;
                prev = Some(link_id);
                cursor = link.next_dep;
            }
            if !node.flags.contains(Flags::TRACKING) && node.deps_tail != prev {
                return Err(format!("{id}: deps_tail does not match the list tail"));
            }

            let mut prev = None;
            let mut cursor = node.subs;
            while let Some(link_id) = cursor {
                let link = self
                    .links
                    .get(link_id.index())
                    .ok_or_else(|| format!("{id}: dangling subscriber link {link_id:?}"))?;
                if link.dep != id {
                    return Err(format!("{id}: subscriber link {link_id:?} belongs to {}", link.dep));
                }
                if link.prev_sub != prev {
                    return Err(format!("{id}: broken prev_sub at {link_id:?}"));
                }
                seen_in_subs += 1;
                prev = Some(link_id);
                cursor = link.next_sub;
            }
            if node.subs_tail != prev {
                return Err(format!("{id}: subs_tail does not match the list tail"));
            }
        }

        if seen_in_deps != self.links.len() || seen_in_subs != self.links.len() {
            return Err(format!(
                "{} links allocated, {seen_in_deps} reachable from subscribers, {seen_in_subs} from dependencies",
                self.links.len()
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
