//! Graph Links
//!
//! A link is one dependency → subscriber edge. It sits in two intrusive
//! doubly-linked lists at once: the dependency's subscriber list
//! (`prev_sub`/`next_sub`) and the subscriber's dependency list
//! (`prev_dep`/`next_dep`). Both lists are threaded through arena indices.

use serde::Serialize;

use super::node::NodeId;

/// Arena index of a link.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LinkId(u32);

impl LinkId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An edge record.
#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) dep: NodeId,
    pub(crate) sub: NodeId,

    // Position in `dep`'s subscriber list.
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,

    // Position in `sub`'s dependency list.
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,
}
