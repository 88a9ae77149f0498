//! Feedsync synchronizer core.
//!
//! This crate reconciles point-in-time contract reads, historical event
//! logs, and live event pushes into one consistent client-side view of an
//! oracle aggregator feed: the current round, who answered, and what the
//! aggregate answer is. It is read-only and reorg-unaware by design; the
//! most recent chain state is authoritative.
//!
//! - [`FeedConfig`]: per-feed descriptor (address, schema version, scaling)
//! - [`AnswerStore`]: the UI-facing projection plus its named update events
//! - [`SyncOrchestrator`]: session lifecycle, bootstrap and live updates

mod config;
mod error;
mod orchestrator;
mod reconcile;
mod store;

pub use config::{FeedConfig, FeedsConfig};
pub use error::SyncError;
pub use orchestrator::{
    history_from_block, SessionState, SyncConfig, SyncOrchestrator, SynchronizerSession,
    BLOCKS_PER_DAY,
};
pub use reconcile::{dedup_history, merge_submission, quorum_reached, MergeOutcome};
pub use store::{AnswerHistoryEntry, AnswerStore, OracleAnswer, Projection, StoreEvent};
