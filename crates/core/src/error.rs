//! Error taxonomy for the synchronizer core.

use feedsync_chain::ChainError;
use thiserror::Error;

/// Errors surfaced by session construction and teardown.
///
/// Most runtime failures never reach this type: bootstrap steps and the live
/// path log RPC failures and carry on with the value unknown, per the
/// propagation policy. What does surface here is fatal to the session being
/// constructed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The feed's contract address is not a valid address. Raised before any
    /// RPC call is made.
    #[error("invalid contract address '{0}'")]
    InvalidAddress(String),

    /// The feed names a schema version no adapter exists for.
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u8),

    /// A chain-layer failure that was fatal in context.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// An error during `dispose()`. Logged by the session itself and never
    /// propagated past it; the type exists so teardown paths stay honest
    /// about what they swallow.
    #[error("teardown failure: {0}")]
    Teardown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_errors_convert() {
        let err: SyncError = ChainError::DeadSession.into();
        assert!(matches!(err, SyncError::Chain(ChainError::DeadSession)));
    }
}
