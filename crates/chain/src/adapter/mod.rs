//! Aggregator schema adapters.
//!
//! Three incompatible on-chain aggregator schemas are normalized behind the
//! [`AggregatorAdapter`] capability trait. The schema switch happens exactly
//! once, in [`build_adapter`]; everything downstream of construction is
//! version-blind.
//!
//! Adapters are disposable: [`AggregatorAdapter::dispose`] marks the adapter
//! dead, and every method on a dead adapter fails fast with
//! [`ChainError::DeadSession`] instead of issuing RPC calls. In-flight calls
//! started before disposal are allowed to resolve; their results are dropped
//! by the caller's own liveness check.

mod flux;
mod legacy;
mod v2;

pub use flux::{adjust_reporting_round, FluxAdapter};
pub use legacy::LegacyAdapter;
pub use v2::V2Adapter;

use alloy::primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::client::ChainClient;
use crate::error::ChainError;
use crate::scale::Scale;

/// Upper bound for the legacy `oracles(i)` roster probe. The legacy schema
/// exposes no oracle count; the probe stops at the first reverting index.
pub(crate) const MAX_ORACLE_COUNT: u64 = 45;

/// Storage slot holding the legacy aggregator's answer counter. The slot has
/// no ABI accessor; reading it raw is a protocol quirk of that schema
/// generation, not a shortcut.
pub(crate) const NEXT_ANSWER_ID_SLOT: u64 = 13;

/// On-chain schema generation of an aggregator contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SchemaVersion {
    /// Legacy request/response aggregator
    V1,
    /// Aggregator interface
    V2,
    /// Flux aggregator
    V3,
}

impl SchemaVersion {
    /// Map a feed config's numeric version tag.
    pub fn from_config(version: u8) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }
}

/// The event families an adapter can fetch and subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// A single oracle's answer for a round
    Submission,
    /// A new round opening for submissions
    RoundStart,
    /// A round's aggregate finalizing (used for answer history)
    AnswerUpdated,
}

/// Block range for historical log queries. The window is approximate by
/// design; there is no cheap way to binary-search blocks by timestamp on
/// this RPC surface.
#[derive(Debug, Clone, Copy)]
pub struct BlockWindow {
    pub from_block: u64,
    /// `None` means "latest".
    pub to_block: Option<u64>,
}

impl BlockWindow {
    /// Open-ended window from `from_block` to the chain head.
    pub fn since(from_block: u64) -> Self {
        Self {
            from_block,
            to_block: None,
        }
    }
}

/// One oracle's answer for a round, decoded from a submission log.
#[derive(Debug, Clone)]
pub struct SubmissionLog {
    /// Submitting oracle. The v2 schema's submission event carries no oracle
    /// field; there the sender starts as `Address::ZERO` and is recovered
    /// from the transaction during enrichment.
    pub sender: Address,
    pub round_id: u64,
    pub raw_answer: I256,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
    /// Block timestamp, filled by enrichment.
    pub timestamp: Option<u64>,
    /// Gas price in wei, filled by enrichment.
    pub gas_price: Option<u128>,
}

/// A round opening for submissions.
#[derive(Debug, Clone)]
pub struct RoundStartLog {
    /// Round id, when the event carries one. The legacy schema's request
    /// event does not.
    pub round_id: Option<u64>,
    pub started_by: Option<Address>,
    /// On-chain start timestamp (flux only).
    pub started_at: Option<u64>,
    pub block_number: Option<u64>,
}

/// A finalized round's aggregate answer.
#[derive(Debug, Clone)]
pub struct AnswerLog {
    pub round_id: u64,
    pub answer: I256,
    pub updated_at: u64,
}

/// Decoded feed event, tagged by family.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Submission(SubmissionLog),
    RoundStart(RoundStartLog),
    AnswerUpdated(AnswerLog),
}

/// Boxed stream of decoded feed events from a live subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = FeedEvent> + Send>>;

/// Capability surface shared by all three schema generations.
///
/// Round ids, answer values and thresholds are normalized to host types;
/// scaling to display strings goes through [`AggregatorAdapter::scale`].
#[async_trait]
pub trait AggregatorAdapter: Send + Sync {
    /// Schema generation served by this adapter.
    fn version(&self) -> SchemaVersion;

    /// Aggregator contract address.
    fn address(&self) -> Address;

    /// Display scaling for this feed's raw answers.
    fn scale(&self) -> &Scale;

    /// Current published aggregate answer.
    async fn latest_answer(&self) -> Result<I256, ChainError>;

    /// Timestamp of the current published aggregate.
    async fn latest_timestamp(&self) -> Result<u64, ChainError>;

    /// Last round that reached quorum and was finalized on-chain.
    async fn latest_round(&self) -> Result<u64, ChainError>;

    /// Round currently accepting submissions.
    async fn reporting_round(&self) -> Result<u64, ChainError>;

    /// Distinct submissions required before the aggregate is final.
    async fn minimum_answers(&self) -> Result<u64, ChainError>;

    /// Addresses authorized to submit.
    async fn oracle_addresses(&self) -> Result<Vec<Address>, ChainError>;

    /// Human-readable feed description, where the schema exposes one.
    async fn description(&self) -> Result<String, ChainError>;

    /// Historical logs of `kind` within `window`, oldest first as returned
    /// by the node.
    async fn historical_logs(
        &self,
        kind: LogKind,
        window: BlockWindow,
    ) -> Result<Vec<FeedEvent>, ChainError>;

    /// Live subscription to logs of `kind`. Delivery is at-least-once and
    /// possibly duplicated; consumers must merge idempotently.
    async fn subscribe(&self, kind: LogKind) -> Result<EventStream, ChainError>;

    /// Mark the adapter dead. Idempotent; all subsequent calls fail fast
    /// with [`ChainError::DeadSession`].
    fn dispose(&self);

    /// Whether [`AggregatorAdapter::dispose`] has been called.
    fn is_disposed(&self) -> bool;
}

/// Construct the adapter for a feed's schema version. This is the single
/// place the version switch happens.
pub fn build_adapter(
    version: SchemaVersion,
    address: Address,
    scale: Scale,
    client: Arc<ChainClient>,
) -> Arc<dyn AggregatorAdapter> {
    match version {
        SchemaVersion::V1 => Arc::new(LegacyAdapter::new(address, scale, client)),
        SchemaVersion::V2 => Arc::new(V2Adapter::new(address, scale, client)),
        SchemaVersion::V3 => Arc::new(FluxAdapter::new(address, scale, client)),
    }
}

/// Shared liveness flag. Checked at the top of every adapter method.
#[derive(Debug, Default)]
pub(crate) struct Liveness {
    dead: AtomicBool,
}

impl Liveness {
    pub(crate) fn ensure_live(&self) -> Result<(), ChainError> {
        if self.dead.load(Ordering::Acquire) {
            Err(ChainError::DeadSession)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }
}

/// Probe the legacy `oracles(i)` roster, stopping at the first revert.
/// Shared by the v1 and v2 adapters, which use the same mechanism.
pub(crate) async fn probe_oracle_roster(
    client: &ChainClient,
    address: Address,
) -> Result<Vec<Address>, ChainError> {
    use crate::bindings::IAggregatorLegacy;

    let provider = client.http_provider()?;
    let contract = IAggregatorLegacy::new(address, &provider);

    let mut roster = Vec::new();
    for i in 0..MAX_ORACLE_COUNT {
        match contract.oracles(U256::from(i)).call().await {
            Ok(oracle) => roster.push(oracle._0),
            // First revert marks the end of the roster.
            Err(_) => break,
        }
    }

    Ok(roster)
}

/// Read the legacy "next answer id" counter from its raw storage slot and
/// derive the round currently accepting submissions.
pub(crate) async fn pending_round_from_slot(
    client: &ChainClient,
    address: Address,
) -> Result<u64, ChainError> {
    let raw = client
        .get_storage_at(address, U256::from(NEXT_ANSWER_ID_SLOT))
        .await?;
    let next_id = u64::try_from(raw).unwrap_or(u64::MAX);
    Ok(next_id.saturating_sub(1))
}

/// Decode an `AnswerUpdated(int256 indexed, uint256 indexed, uint256)` log.
/// All three schema generations emit this shape when a round finalizes.
/// Topics: [sig, current, roundId]; data: [updatedAt].
pub(crate) fn decode_answer_updated(log: &alloy::rpc::types::Log) -> Option<AnswerLog> {
    if log.topics().len() < 3 {
        tracing::warn!(address = %log.address(), "Invalid AnswerUpdated log: insufficient topics");
        return None;
    }

    let answer = I256::from_be_bytes(log.topics()[1].0);
    let round_id = u64::try_from(U256::from_be_bytes(log.topics()[2].0)).unwrap_or(u64::MAX);

    let updated_at = if log.data().data.len() >= 32 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&log.data().data[0..32]);
        u64::try_from(U256::from_be_bytes(bytes)).unwrap_or(0)
    } else {
        0
    };

    Some(AnswerLog {
        round_id,
        answer,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version_from_config() {
        assert_eq!(SchemaVersion::from_config(1), Some(SchemaVersion::V1));
        assert_eq!(SchemaVersion::from_config(2), Some(SchemaVersion::V2));
        assert_eq!(SchemaVersion::from_config(3), Some(SchemaVersion::V3));
        assert_eq!(SchemaVersion::from_config(4), None);
        assert_eq!(SchemaVersion::from_config(0), None);
    }

    #[test]
    fn test_liveness_flag() {
        let liveness = Liveness::default();
        assert!(liveness.ensure_live().is_ok());

        liveness.mark_dead();
        assert!(matches!(
            liveness.ensure_live(),
            Err(ChainError::DeadSession)
        ));

        // Idempotent.
        liveness.mark_dead();
        assert!(liveness.is_dead());
    }
}
