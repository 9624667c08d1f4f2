//! Watch options.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How deep a watch walks its source.
///
/// Deserializes from `true`/`false` or a level count, so
/// `{"deep": true}` and `{"deep": 2}` are both accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Depth {
    Flag(bool),
    Levels(u32),
}

impl Depth {
    /// Anything but `false` and `0` asks for deep watching.
    pub fn is_deep(self) -> bool {
        !matches!(self, Depth::Flag(false) | Depth::Levels(0))
    }

    /// Traversal limit: `None` is unbounded, `false`/`0` is one level.
    pub fn limit(self) -> Option<u32> {
        match self {
            Depth::Flag(true) => None,
            Depth::Flag(false) | Depth::Levels(0) => Some(1),
            Depth::Levels(levels) => Some(levels),
        }
    }
}

impl From<bool> for Depth {
    fn from(deep: bool) -> Self {
        Depth::Flag(deep)
    }
}

impl From<u32> for Depth {
    fn from(levels: u32) -> Self {
        Depth::Levels(levels)
    }
}

/// Options for [`watch`](super::watch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Fire the callback once on creation.
    pub immediate: bool,
    /// Deep watching. Unset means "deep if the source is deep-reactive".
    pub deep: Option<Depth>,
    /// Stop after the first callback.
    pub once: bool,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = Some(Depth::Flag(true));
        self
    }

    /// Deep watching bounded to `levels`.
    pub fn depth(mut self, levels: u32) -> Self {
        self.deep = Some(Depth::Levels(levels));
        self
    }

    /// Only the first level of a deep-reactive source.
    pub fn shallow(mut self) -> Self {
        self.deep = Some(Depth::Flag(false));
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Whether deep watching was asked for explicitly.
    pub fn is_deep(&self) -> bool {
        self.deep.is_some_and(Depth::is_deep)
    }

    /// Parse options from a JSON object such as
    /// `{"immediate": true, "deep": 2}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
