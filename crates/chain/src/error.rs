//! Error taxonomy for the chain layer.
//!
//! Every RPC call is fallible and non-retrying; callers log failures and
//! treat the value as unknown rather than aborting the surrounding step.

use thiserror::Error;

/// Errors surfaced by [`crate::ChainClient`] and the schema adapters.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level RPC failure (connection, serialization, node error).
    #[error("rpc failure: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    /// A typed contract call failed (revert, ABI mismatch, transport).
    #[error("contract call failed: {0}")]
    Call(#[from] alloy::contract::Error),

    /// An endpoint URL could not be parsed.
    #[error("invalid endpoint url: {0}")]
    Endpoint(String),

    /// A log did not match the expected event shape.
    #[error("malformed log: {0}")]
    Decode(String),

    /// Feed scaling parameters could not be interpreted.
    #[error("invalid scale: {0}")]
    Scale(String),

    /// A call was made against a disposed adapter. Callers treat this as a
    /// no-op; no RPC is issued.
    #[error("adapter is disposed")]
    DeadSession,

    /// The capability does not exist on this aggregator schema version.
    #[error("{0} is not supported by this aggregator version")]
    Unsupported(&'static str),
}

impl ChainError {
    /// True when the error is the fail-fast marker of a disposed adapter,
    /// as opposed to a genuine RPC problem.
    pub fn is_dead_session(&self) -> bool {
        matches!(self, Self::DeadSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_session_marker() {
        assert!(ChainError::DeadSession.is_dead_session());
        assert!(!ChainError::Unsupported("round-start events").is_dead_session());
    }
}
