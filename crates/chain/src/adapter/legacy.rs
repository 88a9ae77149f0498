//! Adapter for the legacy request/response aggregator (schema version 1).
//!
//! This generation predates direct accessors for most of the capability
//! surface: the latest timestamp is derived from `updatedHeight()` plus a
//! block lookup, the oracle roster is discovered by probing `oracles(i)`
//! until the first revert, and the round currently accepting submissions is
//! read from a raw storage slot and decremented by one.

use alloy::primitives::{Address, I256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::warn;

use super::{
    decode_answer_updated, pending_round_from_slot, probe_oracle_roster, AggregatorAdapter,
    BlockWindow, EventStream, FeedEvent, Liveness, LogKind, RoundStartLog, SchemaVersion,
    SubmissionLog,
};
use crate::bindings::IAggregatorLegacy;
use crate::client::ChainClient;
use crate::error::ChainError;
use crate::scale::Scale;

/// Legacy aggregator adapter.
pub struct LegacyAdapter {
    address: Address,
    scale: Scale,
    client: Arc<ChainClient>,
    liveness: Liveness,
}

impl LegacyAdapter {
    pub fn new(address: Address, scale: Scale, client: Arc<ChainClient>) -> Self {
        Self {
            address,
            scale,
            client,
            liveness: Liveness::default(),
        }
    }

    fn filter_for(&self, kind: LogKind) -> Filter {
        let signature = match kind {
            LogKind::Submission => IAggregatorLegacy::ResponseReceived::SIGNATURE_HASH,
            LogKind::RoundStart => IAggregatorLegacy::ChainlinkRequested::SIGNATURE_HASH,
            LogKind::AnswerUpdated => IAggregatorLegacy::AnswerUpdated::SIGNATURE_HASH,
        };
        Filter::new().address(self.address).event_signature(signature)
    }

    fn decode(kind: LogKind, log: &Log) -> Option<FeedEvent> {
        match kind {
            LogKind::Submission => decode_response_received(log).map(FeedEvent::Submission),
            LogKind::RoundStart => Some(FeedEvent::RoundStart(decode_chainlink_requested(log))),
            LogKind::AnswerUpdated => decode_answer_updated(log).map(FeedEvent::AnswerUpdated),
        }
    }
}

#[async_trait]
impl AggregatorAdapter for LegacyAdapter {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V1
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
        let contract = IAggregatorLegacy::new(self.address, &provider);
        Ok(contract.currentAnswer().call().await?._0)
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorLegacy::new(self.address, &provider);

        // No timestamp accessor on this generation; resolve the update
        // height to its block timestamp.
        let height = contract.updatedHeight().call().await?._0;
        let height = u64::try_from(height).unwrap_or(u64::MAX);

        self.client
            .get_block_timestamp(height)
            .await?
            .ok_or_else(|| ChainError::Decode(format!("block {height} not found")))
    }

    async fn latest_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorLegacy::new(self.address, &provider);
        let round = contract.latestCompletedAnswer().call().await?._0;
        Ok(u64::try_from(round).unwrap_or(u64::MAX))
    }

    async fn reporting_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        pending_round_from_slot(&self.client, self.address).await
    }

    async fn minimum_answers(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IAggregatorLegacy::new(self.address, &provider);
        let minimum = contract.minimumResponses().call().await?._0;
        Ok(u64::try_from(minimum).unwrap_or(u64::MAX))
    }

    async fn oracle_addresses(&self) -> Result<Vec<Address>, ChainError> {
        self.liveness.ensure_live()?;
        probe_oracle_roster(&self.client, self.address).await
    }

    async fn description(&self) -> Result<String, ChainError> {
        self.liveness.ensure_live()?;
        Err(ChainError::Unsupported("description"))
    }

    async fn historical_logs(
        &self,
        kind: LogKind,
        window: BlockWindow,
    ) -> Result<Vec<FeedEvent>, ChainError> {
        self.liveness.ensure_live()?;

        let mut filter = self.filter_for(kind).from_block(window.from_block);
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

        let raw = self.client.subscribe_logs(&self.filter_for(kind)).await?;
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

/// Parse a `ResponseReceived(int256 indexed response, int256 indexed
/// answerId, address indexed sender)` log. All parameters are indexed.
fn decode_response_received(log: &Log) -> Option<SubmissionLog> {
    if log.topics().len() < 4 {
        warn!(address = %log.address(), "Invalid ResponseReceived log: insufficient topics");
        return None;
    }

    let raw_answer = I256::from_be_bytes(log.topics()[1].0);
    let round_id = u64::try_from(U256::from_be_bytes(log.topics()[2].0)).unwrap_or(u64::MAX);
    let sender = Address::from_slice(&log.topics()[3][12..]);

    Some(SubmissionLog {
        sender,
        round_id,
        raw_answer,
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
        timestamp: None,
        gas_price: None,
    })
}

/// Parse a `ChainlinkRequested(bytes32 indexed id)` log. The legacy schema
/// has no round-start event; the request marks the moment a new answer
/// cycle began, which is all the heartbeat display needs.
fn decode_chainlink_requested(log: &Log) -> RoundStartLog {
    RoundStartLog {
        round_id: None,
        started_by: None,
        started_at: None,
        block_number: log.block_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, LogData};

    fn response_received_log(response: i64, answer_id: u64, sender: Address) -> Log {
        let topics = vec![
            IAggregatorLegacy::ResponseReceived::SIGNATURE_HASH,
            B256::from(I256::try_from(response).unwrap().into_raw()),
            B256::from(U256::from(answer_id)),
            sender.into_word(),
        ];
        let mut log = Log::default();
        log.inner.data = LogData::new_unchecked(topics, Default::default());
        log.block_number = Some(77);
        log
    }

    #[test]
    fn test_decode_response_received() {
        let sender = Address::repeat_byte(0xAB);
        let log = response_received_log(42, 9, sender);

        let decoded = decode_response_received(&log).unwrap();
        assert_eq!(decoded.sender, sender);
        assert_eq!(decoded.round_id, 9);
        assert_eq!(decoded.raw_answer, I256::try_from(42).unwrap());
        assert_eq!(decoded.block_number, Some(77));
    }

    #[test]
    fn test_decode_rejects_short_topics() {
        let mut log = Log::default();
        log.inner.data = LogData::new_unchecked(
            vec![IAggregatorLegacy::ResponseReceived::SIGNATURE_HASH],
            Default::default(),
        );
        assert!(decode_response_received(&log).is_none());
    }
}
