//! Adapter for the flux aggregator (schema version 3).
//!
//! The most capable generation: oracles push submissions directly, rounds
//! are first-class with `NewRound` events, and the roster is a single
//! `getOracles()` call. The one quirk is `reportingRound()`: the contract
//! reports the next round id as soon as the previous one finalizes, before
//! anyone has started it, so the raw value must be decremented by one while
//! the round's `startedAt` is still zero.

use alloy::primitives::{Address, I256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::warn;

use super::{
    decode_answer_updated, AggregatorAdapter, BlockWindow, EventStream, FeedEvent, Liveness,
    LogKind, RoundStartLog, SchemaVersion, SubmissionLog,
};
use crate::bindings::IFluxAggregator;
use crate::client::ChainClient;
use crate::error::ChainError;
use crate::scale::Scale;

/// Flux aggregator adapter.
pub struct FluxAdapter {
    address: Address,
    scale: Scale,
    client: Arc<ChainClient>,
    liveness: Liveness,
}

impl FluxAdapter {
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
            LogKind::Submission => IFluxAggregator::SubmissionReceived::SIGNATURE_HASH,
            LogKind::RoundStart => IFluxAggregator::NewRound::SIGNATURE_HASH,
            LogKind::AnswerUpdated => IFluxAggregator::AnswerUpdated::SIGNATURE_HASH,
        };
        Filter::new().address(self.address).event_signature(signature)
    }

    fn decode(kind: LogKind, log: &Log) -> Option<FeedEvent> {
        match kind {
            LogKind::Submission => decode_submission_received(log).map(FeedEvent::Submission),
            LogKind::RoundStart => decode_new_round(log).map(FeedEvent::RoundStart),
            LogKind::AnswerUpdated => decode_answer_updated(log).map(FeedEvent::AnswerUpdated),
        }
    }
}

#[async_trait]
impl AggregatorAdapter for FluxAdapter {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V3
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
        let contract = IFluxAggregator::new(self.address, &provider);
        Ok(contract.latestAnswer().call().await?._0)
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);
        let timestamp = contract.latestTimestamp().call().await?._0;
        Ok(u64::try_from(timestamp).unwrap_or(0))
    }

    async fn latest_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);
        let round = contract.latestRound().call().await?._0;
        Ok(u64::try_from(round).unwrap_or(u64::MAX))
    }

    async fn reporting_round(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);

        let raw = contract.reportingRound().call().await?._0;
        let state = contract
            .oracleRoundState(Address::ZERO, raw)
            .call()
            .await?;

        Ok(adjust_reporting_round(u64::from(raw), state.startedAt))
    }

    async fn minimum_answers(&self) -> Result<u64, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);
        Ok(u64::from(contract.minAnswerCount().call().await?._0))
    }

    async fn oracle_addresses(&self) -> Result<Vec<Address>, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);
        Ok(contract.getOracles().call().await?._0)
    }

    async fn description(&self) -> Result<String, ChainError> {
        self.liveness.ensure_live()?;
        let provider = self.client.http_provider()?;
        let contract = IFluxAggregator::new(self.address, &provider);
        Ok(contract.description().call().await?._0)
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

/// A flux aggregator reports the upcoming round id before that round has
/// started. While `started_at == 0` the round accepting submissions is still
/// the previous one.
pub fn adjust_reporting_round(raw_round_id: u64, started_at: u64) -> u64 {
    if started_at == 0 {
        raw_round_id.saturating_sub(1)
    } else {
        raw_round_id
    }
}

/// Parse a `SubmissionReceived(int256 indexed submission, uint32 indexed
/// round, address indexed oracle)` log.
fn decode_submission_received(log: &Log) -> Option<SubmissionLog> {
    if log.topics().len() < 4 {
        warn!(address = %log.address(), "Invalid SubmissionReceived log: insufficient topics");
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

/// Parse a `NewRound(uint256 indexed roundId, address indexed startedBy,
/// uint256 startedAt)` log.
fn decode_new_round(log: &Log) -> Option<RoundStartLog> {
    if log.topics().len() < 3 {
        warn!(address = %log.address(), "Invalid NewRound log: insufficient topics");
        return None;
    }

    let round_id = u64::try_from(U256::from_be_bytes(log.topics()[1].0)).unwrap_or(u64::MAX);
    let started_by = Address::from_slice(&log.topics()[2][12..]);

    let started_at = if log.data().data.len() >= 32 {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&log.data().data[0..32]);
        u64::try_from(U256::from_be_bytes(bytes)).ok()
    } else {
        None
    };

    Some(RoundStartLog {
        round_id: Some(round_id),
        started_by: Some(started_by),
        started_at,
        block_number: log.block_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, LogData};

    #[test]
    fn test_adjust_reporting_round() {
        // Round not yet started: the raw id points one past the round that
        // is actually accepting submissions.
        assert_eq!(adjust_reporting_round(100, 0), 99);
        assert_eq!(adjust_reporting_round(10, 1), 10);
        assert_eq!(adjust_reporting_round(10, 1_700_000_000), 10);
        assert_eq!(adjust_reporting_round(0, 0), 0);
    }

    #[test]
    fn test_decode_submission_received() {
        let oracle = Address::repeat_byte(0x0A);
        let topics = vec![
            IFluxAggregator::SubmissionReceived::SIGNATURE_HASH,
            B256::from(I256::try_from(38_000_000_000i64).unwrap().into_raw()),
            B256::from(U256::from(7u64)),
            oracle.into_word(),
        ];
        let mut log = Log::default();
        log.inner.data = LogData::new_unchecked(topics, Default::default());

        let decoded = decode_submission_received(&log).unwrap();
        assert_eq!(decoded.sender, oracle);
        assert_eq!(decoded.round_id, 7);
        assert_eq!(decoded.raw_answer, I256::try_from(38_000_000_000i64).unwrap());
    }

    #[test]
    fn test_decode_new_round() {
        let starter = Address::repeat_byte(0x0B);
        let topics = vec![
            IFluxAggregator::NewRound::SIGNATURE_HASH,
            B256::from(U256::from(8u64)),
            starter.into_word(),
        ];
        let mut data = [0u8; 32];
        data[24..32].copy_from_slice(&1_700_000_123u64.to_be_bytes());

        let mut log = Log::default();
        log.inner.data = LogData::new_unchecked(topics, data.to_vec().into());

        let decoded = decode_new_round(&log).unwrap();
        assert_eq!(decoded.round_id, Some(8));
        assert_eq!(decoded.started_by, Some(starter));
        assert_eq!(decoded.started_at, Some(1_700_000_123));
    }
}
