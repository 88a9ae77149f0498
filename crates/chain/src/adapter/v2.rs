//! Adapter for the aggregator interface (schema version 2).
//!
//! Direct accessors exist for answer, timestamp and round, but the pending
//! round still lives in the same raw storage slot as the legacy schema, and
//! the oracle roster is still discovered by probing. There is no round-start
//! event on this generation; round advances are observed through the poll.
//!
//! The submission event here is `AnswerUpdated`, which carries no oracle
//! address. The submitting oracle is recovered from the transaction sender
//! during enrichment; until then the entry is keyed by the zero address.

use alloy::primitives::{Address, I256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::warn;

use super::{
    decode_answer_updated, pending_round_from_slot, probe_oracle_roster, AggregatorAdapter,
    BlockWindow, EventStream, FeedEvent, Liveness, LogKind, SchemaVersion, SubmissionLog,
};
use crate::bindings::IAggregatorV2;
use crate::client::ChainClient;
use crate::error::ChainError;
use crate::scale::Scale;

/// Aggregator-interface adapter.
pub struct V2Adapter {
    address: Address,
    scale: Scale,
    client: Arc<ChainClient>,
    liveness: Liveness,
}

impl V2Adapter {
    pub fn new(address: Address, scale: Scale, client: Arc<ChainClient>) -> Self {
        Self {
            address,
            scale,
            client,
            liveness: Liveness::default(),
        }
    }

    fn filter_for(&self, kind: LogKind) -> Result<Filter, ChainError> {
        let signature = match kind {
            LogKind::Submission | LogKind::AnswerUpdated => {
                IAggregatorV2::AnswerUpdated::SIGNATURE_HASH
            }
            LogKind::RoundStart => return Err(ChainError::Unsupported("round-start events")),
        };
        Ok(Filter::new().address(self.address).event_signature(signature))
    }

    fn decode(kind: LogKind, log: &Log) -> Option<FeedEvent> {
        match kind {
            LogKind::Submission => decode_submission(log).map(FeedEvent::Submission),
            LogKind::AnswerUpdated => decode_answer_updated(log).map(FeedEvent::AnswerUpdated),
            LogKind::RoundStart => None,
        }
    }
}

#[async_trait]
impl AggregatorAdapter for V2Adapter {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V2
    }

    fn address(&self) -> Address {
        self.address
    }

    fn scale(&self) -> &Scale {
        &self.scale
    }

    async fn latest_answer(&self) -> Result<I256, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorV2::new(self.address, &provider);
        Ok(contract.latestAnswer().call().await?._0)
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorV2::new(self.address, &provider);
        let timestamp = contract.latestTimestamp().call().await?._0;
        Ok(u64::try_from(timestamp).unwrap_or(0))
    }

    async fn latest_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorV2::new(self.address, &provider);
        let round = contract.latestRound().call().await?._0;
        Ok(u64::try_from(round).unwrap_or(u64::MAX))
    }

    async fn reporting_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        pending_round_from_slot(&self.client, self.address).await
    }

    async fn minimum_answers(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorV2::new(self.address, &provider);
        let minimum = contract.minimumResponses().call().await?._0;
        Ok(u64::try_from(minimum).unwrap_or(u64::MAX))
    }

    async fn oracle_addresses(&self) -> Result<Vec<Address>, ChainError> {
        self.liveness.ensure_live()?;
        probe_oracle_roster(&self.client, self.address).await
    }

    async fn description(&self) -> Result<String, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorV2::new(self.address, &provider);
        Ok(contract.description().call().await?._0)
    }

    async fn historical_logs(
        &self,
        kind: LogKind,
        window: BlockWindow,
    ) -> Result<Vec<FeedEvent>, ChainError> {
        self.liveness.ensure_live()?;

        let mut filter = self.filter_for(kind)?.from_block(window.from_block);
        if let Some(to_block) = window.to_block {
            filter = filter.to_block(to_block);
        }

        let logs = self.client.get_logs(&filter).await?;
        Ok(logs
            .iter()
            .filter_map(|log| Self::decode(kind, log))
            .collect())
    }

    async fn subscribe(&self, kind: LogKind) -> Result<EventStream, ChainError> {
        self.liveness.ensure_live()?;

        let filter = self.filter_for(kind)?;
        let raw = self.client.subscribe_logs(&filter).await?;
        let stream = raw.filter_map(move |log| async move { Self::decode(kind, &log) });
        Ok(Box::pin(stream))
    }

    fn dispose(&self) {
        self.liveness.mark_dead();
    }

    fn is_disposed(&self) -> bool {
        self.liveness.is_dead()
    }
}

/// Parse an `AnswerUpdated(int256 indexed current, uint256 indexed roundId,
/// uint256 updatedAt)` log as a submission. The sender is unknown at decode
/// time; enrichment replaces the zero-address placeholder with the
/// transaction sender.
fn decode_submission(log: &Log) -> Option<SubmissionLog> {
    if log.topics().len() < 3 {
        warn!(address = %log.address(), "Invalid AnswerUpdated log: insufficient topics");
        return None;
    }

    let raw_answer = I256::from_be_bytes(log.topics()[1].0);
    let round_id = u64::try_from(U256::from_be_bytes(log.topics()[2].0)).unwrap_or(u64::MAX);

    let timestamp = if log.data().data.len() >= 32 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&log.data().data[0..32]);
        u64::try_from(U256::from_be_bytes(bytes)).ok()
    } else {
        None
    };

    Some(SubmissionLog {
        sender: Address::ZERO,
        round_id,
        raw_answer,
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
        timestamp,
        gas_price: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, LogData};

    #[test]
    fn test_decode_submission_uses_placeholder_sender() {
        let topics = vec![
            IAggregatorV2::AnswerUpdated::SIGNATURE_HASH,
            B256::from(I256::try_from(1500i64).unwrap().into_raw()),
            B256::from(U256::from(12u64)),
        ];
        let mut data = [0u8; 32];
        data[24..32].copy_from_slice(&1_700_000_000u64.to_be_bytes());

        let mut log = Log::default();
        log.inner.data = LogData::new_unchecked(topics, data.to_vec().into());

        let decoded = decode_submission(&log).unwrap();
        assert_eq!(decoded.sender, Address::ZERO);
        assert_eq!(decoded.round_id, 12);
        assert_eq!(decoded.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_round_start_is_unsupported() {
        let adapter = V2Adapter {
            address: Address::ZERO,
            scale: Scale::identity(),
            client: Arc::new(ChainClient::offline("http://localhost:1", "ws://localhost:1")),
            liveness: Liveness::default(),
        };

        assert!(matches!(
            adapter.filter_for(LogKind::RoundStart),
            Err(ChainError::Unsupported(_))
        ));
    }
}
