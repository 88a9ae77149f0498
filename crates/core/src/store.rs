//! The UI-facing projection of synchronizer output.
//!
//! One [`AnswerStore`] holds the canonical view of a feed: latest aggregate,
//! round ids, the per-oracle answer set, and answer history. Mutations go
//! through named setters that publish a [`StoreEvent`] per field group, so a
//! consumer can subscribe narrowly instead of diffing snapshots.
//!
//! Failure never surfaces here: a value the synchronizer could not learn
//! simply stays `None`.

use alloy::primitives::{Address, B256, I256};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use feedsync_chain::SubmissionLog;

/// Named update events, one per projection field group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    OracleList,
    MinimumAnswers,
    OracleAnswers,
    PendingRound,
    LatestRound,
    LatestAnswer,
    LatestAnswerTimestamp,
    RequestTimestamp,
    History,
    Description,
}

/// One oracle's most recent observed submission for a round.
#[derive(Debug, Clone, Serialize)]
pub struct OracleAnswer {
    /// Submitting oracle; the identity key of the answer set.
    pub sender: Address,
    pub round_id: u64,
    pub raw_answer: I256,
    pub formatted_answer: String,
    pub timestamp: Option<u64>,
    /// Gas price in wei, as a decimal string for display.
    pub gas_price: Option<String>,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl OracleAnswer {
    /// Build an answer from a decoded (and possibly enriched) submission
    /// log plus its display string.
    pub fn from_log(log: &SubmissionLog, formatted_answer: String) -> Self {
        Self {
            sender: log.sender,
            round_id: log.round_id,
            raw_answer: log.raw_answer,
            formatted_answer,
            timestamp: log.timestamp,
            gas_price: log.gas_price.map(|gp| gp.to_string()),
            tx_hash: log.tx_hash,
            block_number: log.block_number,
        }
    }
}

/// A finalized round's aggregate, for charting.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerHistoryEntry {
    pub round_id: u64,
    pub answer: I256,
    pub formatted_answer: String,
    pub timestamp: u64,
}

/// Plain snapshot of everything the UI layer consumes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Projection {
    pub oracle_list: Vec<Address>,
    pub oracle_answers: Vec<OracleAnswer>,
    pub minimum_answers: Option<u64>,
    pub pending_round_id: Option<u64>,
    pub latest_round_id: Option<u64>,
    pub latest_answer: Option<I256>,
    pub latest_formatted_answer: Option<String>,
    pub latest_answer_timestamp: Option<u64>,
    pub latest_request_timestamp: Option<u64>,
    pub answer_history: Vec<AnswerHistoryEntry>,
    pub description: Option<String>,
}

/// Canonical per-feed state plus its update channel.
pub struct AnswerStore {
    state: RwLock<Projection>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for AnswerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: RwLock::new(Projection::default()),
            events,
        }
    }

    /// Subscribe to update events. Consumers read the fields they care
    /// about through [`AnswerStore::snapshot`] or the narrow getters.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Full copy of the current projection.
    pub fn snapshot(&self) -> Projection {
        self.state.read().clone()
    }

    pub fn oracle_answers(&self) -> Vec<OracleAnswer> {
        self.state.read().oracle_answers.clone()
    }

    pub fn pending_round_id(&self) -> Option<u64> {
        self.state.read().pending_round_id
    }

    pub fn minimum_answers(&self) -> Option<u64> {
        self.state.read().minimum_answers
    }

    pub fn latest_answer(&self) -> Option<I256> {
        self.state.read().latest_answer
    }

    pub fn set_oracle_list(&self, oracle_list: Vec<Address>) {
        self.state.write().oracle_list = oracle_list;
        self.publish(StoreEvent::OracleList);
    }

    pub fn set_minimum_answers(&self, minimum: u64) {
        self.state.write().minimum_answers = Some(minimum);
        self.publish(StoreEvent::MinimumAnswers);
    }

    pub fn set_pending_round(&self, round_id: u64) {
        self.state.write().pending_round_id = Some(round_id);
        self.publish(StoreEvent::PendingRound);
    }

    pub fn set_latest_round(&self, round_id: u64) {
        self.state.write().latest_round_id = Some(round_id);
        self.publish(StoreEvent::LatestRound);
    }

    pub fn set_latest_answer(&self, answer: I256, formatted: String) {
        let mut state = self.state.write();
        state.latest_answer = Some(answer);
        state.latest_formatted_answer = Some(formatted);
        drop(state);
        self.publish(StoreEvent::LatestAnswer);
    }

    pub fn set_latest_answer_timestamp(&self, timestamp: u64) {
        self.state.write().latest_answer_timestamp = Some(timestamp);
        self.publish(StoreEvent::LatestAnswerTimestamp);
    }

    pub fn set_request_timestamp(&self, timestamp: u64) {
        self.state.write().latest_request_timestamp = Some(timestamp);
        self.publish(StoreEvent::RequestTimestamp);
    }

    pub fn set_history(&self, entries: Vec<AnswerHistoryEntry>) {
        self.state.write().answer_history = entries;
        self.publish(StoreEvent::History);
    }

    pub fn set_description(&self, description: String) {
        self.state.write().description = Some(description);
        self.publish(StoreEvent::Description);
    }

    /// Read-merge-write access to the answer set. The closure runs against
    /// the state as it is *now*, not as it was when the caller's async work
    /// began; this is what keeps a slow bootstrap read from clobbering a
    /// faster live update.
    pub fn with_answers<R>(&self, f: impl FnOnce(&mut Vec<OracleAnswer>) -> R) -> R {
        let result = f(&mut self.state.write().oracle_answers);
        self.publish(StoreEvent::OracleAnswers);
        result
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is fine; the projection is still readable.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_events_per_field_group() {
        let store = AnswerStore::new();
        let mut events = store.subscribe();

        store.set_minimum_answers(3);
        store.set_pending_round(7);
        store.set_latest_answer(I256::try_from(42).unwrap(), "42.0".to_string());

        assert_eq!(events.try_recv().unwrap(), StoreEvent::MinimumAnswers);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::PendingRound);
        assert_eq!(events.try_recv().unwrap(), StoreEvent::LatestAnswer);
        assert!(events.try_recv().is_err());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.minimum_answers, Some(3));
        assert_eq!(snapshot.pending_round_id, Some(7));
        assert_eq!(snapshot.latest_formatted_answer.as_deref(), Some("42.0"));
    }

    #[test]
    fn test_unknown_values_stay_absent() {
        let store = AnswerStore::new();
        let snapshot = store.snapshot();

        assert!(snapshot.latest_answer.is_none());
        assert!(snapshot.pending_round_id.is_none());
        assert!(snapshot.oracle_answers.is_empty());
    }
}
