//! Error types.
//!
//! Graph operations never fail for shape reasons. The errors here cover the
//! few misuse cases that can be reported instead of silently tolerated.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors emitted by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A computed read itself, directly or through other computeds, while it
    /// was recomputing.
    #[error("cycle detected: computed {0} was read while recomputing")]
    Cycle(NodeId),

    /// A watch source that can never trigger was passed to `try_watch`.
    #[error("invalid watch source: {0}")]
    InvalidSource(&'static str),

    /// One flush notified more effects than the runtime allows. Almost always
    /// an effect that writes a signal it also reads.
    #[error("effect flush exceeded {limit} notifications")]
    FlushLimitExceeded { limit: usize },
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        assert_eq!(
            Error::Cycle(NodeId::new(3)).to_string(),
            "cycle detected: computed #3 was read while recomputing"
        );
        assert_eq!(
            Error::InvalidSource("plain value").to_string(),
            "invalid watch source: plain value"
        );
        assert_eq!(
            Error::FlushLimitExceeded { limit: 10 }.to_string(),
            "effect flush exceeded 10 notifications"
        );
    }
}
