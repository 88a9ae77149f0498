//! Session lifecycle and state synchronization.
//!
//! The orchestrator owns at most one live [`SynchronizerSession`] at a time.
//! `init_contract` validates the feed, kills any previous session, builds
//! the schema adapter once, and runs the bootstrap sequence: parallel
//! point-in-time reads, a bounded historical log scan, then live
//! subscriptions. Bootstrap steps are independent and best-effort; a failing
//! read is logged and its value stays unknown rather than aborting the rest.
//!
//! Live updates and in-flight bootstrap reads interleave freely. Every merge
//! goes through the store's read-merge-write accessors against the state at
//! resolution time, and every async continuation re-checks session liveness
//! before applying results, so logs from a dead session are no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use feedsync_chain::{
    build_adapter, AggregatorAdapter, BlockWindow, ChainClient, ChainError, FeedEvent,
    LogEnricher, LogKind, RoundStartLog, SchemaVersion, SubmissionLog,
};

use crate::config::FeedConfig;
use crate::error::SyncError;
use crate::reconcile::{dedup_history, merge_submission, quorum_reached};
use crate::store::{AnswerHistoryEntry, AnswerStore, OracleAnswer};

/// Approximate blocks mined per day. The historical window is a heuristic,
/// not an exact time range; this RPC surface has no cheap way to look blocks
/// up by timestamp.
pub const BLOCKS_PER_DAY: u64 = 6700;

/// Compute the lower bound of the historical scan window.
pub fn history_from_block(current_block: u64, window_days: u64) -> u64 {
    current_block.saturating_sub(BLOCKS_PER_DAY * window_days)
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the pending-round storage-slot poll used by the legacy and
    /// v2 schemas.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
        }
    }
}

/// Lifecycle of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Bootstrapping,
    Live,
    Disposed,
}

/// One live synchronizer bound to one feed. Owns the adapter, the
/// projection store, the poll timer and the subscription tasks.
pub struct SynchronizerSession {
    feed: FeedConfig,
    adapter: Arc<dyn AggregatorAdapter>,
    store: Arc<AnswerStore>,
    enricher: Arc<LogEnricher>,
    client: Arc<ChainClient>,
    poll_interval: Duration,
    alive: AtomicBool,
    state: RwLock<SessionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SynchronizerSession {
    fn new(
        feed: FeedConfig,
        adapter: Arc<dyn AggregatorAdapter>,
        client: Arc<ChainClient>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            feed,
            adapter,
            store: Arc::new(AnswerStore::new()),
            enricher: Arc::new(LogEnricher::new(Arc::clone(&client))),
            client,
            poll_interval,
            alive: AtomicBool::new(true),
            state: RwLock::new(SessionState::Idle),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The feed this session serves.
    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    /// The projection this session maintains.
    pub fn store(&self) -> Arc<AnswerStore> {
        Arc::clone(&self.store)
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Tear the session down: stop the poll timer and subscription tasks
    /// and mark the adapter dead. Idempotent, safe on a session whose
    /// bootstrap never completed, and never propagates a failure; callers
    /// invoke it unconditionally before starting a replacement session.
    pub fn dispose(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            for handle in self.tasks.lock().drain(..) {
                handle.abort();
            }
            self.adapter.dispose();
            *self.state.write() = SessionState::Disposed;
            info!(feed = self.feed.name.as_deref().unwrap_or("unnamed"), "Session disposed");
        }
    }

    /// Bootstrap the session: steps are sequenced but individually
    /// best-effort, so one failed read leaves the others' values intact.
    async fn bootstrap(self: &Arc<Self>) {
        *self.state.write() = SessionState::Bootstrapping;

        // Independent point-in-time reads, issued concurrently.
        let (roster, minimum, description, pending) = tokio::join!(
            self.adapter.oracle_addresses(),
            self.adapter.minimum_answers(),
            self.adapter.description(),
            self.adapter.reporting_round(),
        );

        if !self.is_alive() {
            return;
        }

        match roster {
            Ok(oracles) => {
                info!(count = oracles.len(), "Fetched oracle roster");
                self.store.set_oracle_list(oracles);
            }
            Err(e) => warn!(error = %e, "Failed to fetch oracle roster"),
        }

        match minimum {
            Ok(minimum) => self.store.set_minimum_answers(minimum),
            Err(e) => warn!(error = %e, "Failed to fetch minimum answers"),
        }

        match description {
            Ok(description) => self.store.set_description(description),
            Err(ChainError::Unsupported(_)) => {}
            Err(e) => warn!(error = %e, "Failed to fetch description"),
        }

        match pending {
            Ok(pending) => self.store.set_pending_round(pending),
            Err(e) => warn!(error = %e, "Failed to fetch reporting round"),
        }

        match self.adapter.latest_round().await {
            Ok(round) => self.store.set_latest_round(round),
            Err(e) => warn!(error = %e, "Failed to fetch latest round"),
        }

        let window = match self.client.block_number().await {
            Ok(current) => BlockWindow::since(history_from_block(current, self.feed.window_days())),
            Err(e) => {
                warn!(error = %e, "Failed to fetch current block; scanning from genesis");
                BlockWindow::since(0)
            }
        };

        self.replay_submissions(window).await;
        self.refresh_aggregate().await;

        if self.feed.heartbeat().is_some() {
            self.seed_request_timestamp(window).await;
        }

        if self.feed.wants_history() {
            self.load_history(window).await;
        }

        self.spawn_live_tasks().await;

        if self.is_alive() {
            *self.state.write() = SessionState::Live;
            info!(
                feed = self.feed.name.as_deref().unwrap_or("unnamed"),
                "Session live"
            );
        }
    }

    /// Replay the window's submission logs for the current and previous
    /// reporting round through the same merge the live path uses.
    async fn replay_submissions(&self, window: BlockWindow) {
        let events = match self
            .adapter
            .historical_logs(LogKind::Submission, window)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Failed to fetch submission history");
                return;
            }
        };

        // Only the current and previous reporting rounds are worth showing.
        let pending = self.store.pending_round_id();
        for event in events {
            if let FeedEvent::Submission(log) = event {
                let relevant = match pending {
                    Some(p) => log.round_id == p || log.round_id + 1 == p,
                    None => true,
                };
                if relevant {
                    self.merge_log(log).await;
                }
            }
        }
    }

    /// Enrich and merge one submission into the answer set. Returns the
    /// affected round, or `None` when the session died underneath us.
    async fn merge_log(&self, mut log: SubmissionLog) -> Option<u64> {
        if !self.is_alive() {
            return None;
        }

        self.enricher.enrich(&mut log).await;

        // Re-check after the await: enrichment may have outlived the session.
        if !self.is_alive() {
            return None;
        }

        let formatted = self.adapter.scale().format(log.raw_answer);
        let incoming = OracleAnswer::from_log(&log, formatted);
        let round_id = incoming.round_id;
        let outcome = self
            .store
            .with_answers(|answers| merge_submission(answers, incoming));

        debug!(?outcome, round = round_id, "Merged submission");
        Some(round_id)
    }

    /// Live-path submission handling: merge, then evaluate the quorum
    /// trigger. Evaluated after every submission; the aggregate refresh is
    /// idempotent, so re-reaching quorum only republishes.
    pub(crate) async fn apply_submission(&self, log: SubmissionLog) {
        if !self.is_alive() {
            return;
        }

        // The flux path only accepts answers for the round most recently
        // completed relative to the locally tracked pending id; anything
        // older or already applied is dropped here.
        if self.adapter.version() == SchemaVersion::V3 {
            if let Some(pending) = self.store.pending_round_id() {
                if Some(log.round_id) != pending.checked_sub(1) {
                    debug!(
                        round = log.round_id,
                        pending, "Ignoring submission outside the completed round"
                    );
                    return;
                }
            }
        }

        let Some(round_id) = self.merge_log(log).await else {
            return;
        };

        if let Some(minimum) = self.store.minimum_answers() {
            let answers = self.store.oracle_answers();
            if quorum_reached(&answers, round_id, minimum) {
                self.refresh_aggregate().await;
            }
        }
    }

    /// Round-start handling: refresh the finalized round id, move the
    /// pending round forward, and reset the heartbeat countdown to the
    /// event's start time when it carries one, otherwise to now.
    pub(crate) async fn apply_round_start(&self, log: RoundStartLog) {
        if !self.is_alive() {
            return;
        }

        match self.adapter.latest_round().await {
            Ok(round) => {
                if !self.is_alive() {
                    return;
                }
                self.store.set_latest_round(round);
            }
            Err(e) if e.is_dead_session() => return,
            Err(e) => warn!(error = %e, "Failed to refresh latest round"),
        }

        if let Some(round_id) = log.round_id {
            self.store.set_pending_round(round_id);
        }

        self.store
            .set_request_timestamp(log.started_at.unwrap_or_else(unix_now));
    }

    /// Refetch and republish the aggregate answer and its timestamp.
    pub(crate) async fn refresh_aggregate(&self) {
        if !self.is_alive() {
            return;
        }

        let (answer, timestamp) = tokio::join!(
            self.adapter.latest_answer(),
            self.adapter.latest_timestamp(),
        );

        if !self.is_alive() {
            return;
        }

        match answer {
            Ok(answer) => {
                let formatted = self.adapter.scale().format(answer);
                self.store.set_latest_answer(answer, formatted);
            }
            Err(e) if e.is_dead_session() => {}
            Err(e) => warn!(error = %e, "Failed to fetch latest answer"),
        }

        match timestamp {
            Ok(timestamp) => self.store.set_latest_answer_timestamp(timestamp),
            Err(e) if e.is_dead_session() => {}
            Err(e) => warn!(error = %e, "Failed to fetch latest answer timestamp"),
        }
    }

    /// Seed the heartbeat countdown from the most recent round-start log in
    /// the window.
    async fn seed_request_timestamp(&self, window: BlockWindow) {
        let events = match self
            .adapter
            .historical_logs(LogKind::RoundStart, window)
            .await
        {
            Ok(events) => events,
            Err(ChainError::Unsupported(_)) => {
                debug!("No round-start history on this schema");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch round-start history");
                return;
            }
        };

        let last = events.iter().rev().find_map(|event| match event {
            FeedEvent::RoundStart(log) => Some(log.clone()),
            _ => None,
        });

        if let Some(log) = last {
            let timestamp = match log.started_at {
                Some(timestamp) => Some(timestamp),
                None => match log.block_number {
                    Some(number) => self.enricher.block_timestamp(number).await,
                    None => None,
                },
            };

            if let Some(timestamp) = timestamp {
                if self.is_alive() {
                    self.store.set_request_timestamp(timestamp);
                }
            }
        }
    }

    /// Fetch finalized-round logs over the window and publish them as the
    /// feed's answer history, deduplicated by round.
    async fn load_history(&self, window: BlockWindow) {
        let events = match self
            .adapter
            .historical_logs(LogKind::AnswerUpdated, window)
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Failed to fetch answer history");
                return;
            }
        };

        let entries: Vec<AnswerHistoryEntry> = events
            .into_iter()
            .filter_map(|event| match event {
                FeedEvent::AnswerUpdated(log) => Some(AnswerHistoryEntry {
                    round_id: log.round_id,
                    answer: log.answer,
                    formatted_answer: self.adapter.scale().format(log.answer),
                    timestamp: log.updated_at,
                }),
                _ => None,
            })
            .collect();

        if self.is_alive() {
            self.store.set_history(dedup_history(entries));
        }
    }

    /// One tick of the pending-round poll used by the storage-slot schemas.
    /// An observed advance is the round-start notification for those
    /// generations.
    pub(crate) async fn poll_pending_round(&self) {
        if !self.is_alive() {
            return;
        }

        match self.adapter.reporting_round().await {
            Ok(pending) => {
                if !self.is_alive() {
                    return;
                }
                if self.store.pending_round_id() != Some(pending) {
                    info!(pending, "Reporting round advanced");
                    self.apply_round_start(RoundStartLog {
                        round_id: Some(pending),
                        started_by: None,
                        started_at: None,
                        block_number: None,
                    })
                    .await;
                }
            }
            Err(e) if e.is_dead_session() => {}
            Err(e) => warn!(error = %e, "Failed to poll reporting round"),
        }
    }

    /// Attach live subscriptions and, for the storage-slot schemas, the
    /// pending-round poll timer.
    async fn spawn_live_tasks(self: &Arc<Self>) {
        if !self.is_alive() {
            return;
        }

        match self.adapter.subscribe(LogKind::Submission).await {
            Ok(mut stream) => {
                let session = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if !session.is_alive() {
                            break;
                        }
                        if let FeedEvent::Submission(log) = event {
                            session.apply_submission(log).await;
                        }
                    }
                });
                self.tasks.lock().push(handle);
            }
            Err(e) => warn!(error = %e, "Failed to subscribe to submissions"),
        }

        match self.adapter.subscribe(LogKind::RoundStart).await {
            Ok(mut stream) => {
                let session = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if !session.is_alive() {
                            break;
                        }
                        if let FeedEvent::RoundStart(log) = event {
                            session.apply_round_start(log).await;
                        }
                    }
                });
                self.tasks.lock().push(handle);
            }
            Err(ChainError::Unsupported(_)) => {
                debug!("Round-start subscription not supported; relying on poll");
            }
            Err(e) => warn!(error = %e, "Failed to subscribe to round starts"),
        }

        if matches!(
            self.adapter.version(),
            SchemaVersion::V1 | SchemaVersion::V2
        ) {
            let session = Arc::clone(self);
            let period = self.poll_interval;
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if !session.is_alive() {
                        break;
                    }
                    session.poll_pending_round().await;
                }
            });
            self.tasks.lock().push(handle);
        }
    }
}

/// Owner of the one-live-session-at-a-time invariant.
pub struct SyncOrchestrator {
    client: Arc<ChainClient>,
    config: SyncConfig,
    current: Mutex<Option<Arc<SynchronizerSession>>>,
}

impl SyncOrchestrator {
    pub fn new(client: Arc<ChainClient>) -> Self {
        Self::with_config(client, SyncConfig::default())
    }

    pub fn with_config(client: Arc<ChainClient>, config: SyncConfig) -> Self {
        Self {
            client,
            config,
            current: Mutex::new(None),
        }
    }

    /// Start synchronizing a feed. Validates the config before any RPC call
    /// is issued, kills the previous session before constructing the new
    /// one, and returns once bootstrap has run and live subscriptions are
    /// attached.
    pub async fn init_contract(
        &self,
        feed: FeedConfig,
    ) -> Result<Arc<SynchronizerSession>, SyncError> {
        let address = feed.address()?;
        let version = feed.version()?;
        let scale = feed.scale()?;

        let adapter = build_adapter(version, address, scale, Arc::clone(&self.client));
        Ok(self.start_session(feed, adapter).await)
    }

    /// Session construction behind the version switch; also the seam the
    /// tests drive with scripted adapters.
    pub(crate) async fn start_session(
        &self,
        feed: FeedConfig,
        adapter: Arc<dyn AggregatorAdapter>,
    ) -> Arc<SynchronizerSession> {
        self.dispose();

        let session = Arc::new(SynchronizerSession::new(
            feed,
            adapter,
            Arc::clone(&self.client),
            self.config.poll_interval,
        ));
        *self.current.lock() = Some(Arc::clone(&session));

        session.bootstrap().await;
        session
    }

    /// Kill the current session, if any. Never propagates.
    pub fn dispose(&self) {
        if let Some(previous) = self.current.lock().take() {
            previous.dispose();
        }
    }

    /// The live session, if any.
    pub fn current(&self) -> Option<Arc<SynchronizerSession>> {
        self.current.lock().clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, I256};
    use async_trait::async_trait;
    use feedsync_chain::{EventStream, Scale};
    use std::sync::atomic::AtomicBool;

    fn feed(version: u8) -> FeedConfig {
        FeedConfig {
            name: Some("TEST / USD".to_string()),
            contract_address: "0x0000000000000000000000000000000000000011".to_string(),
            network_id: 1,
            contract_version: version,
            multiply: "1".to_string(),
            decimal_places: 0,
            format_decimal_places: 0,
            heartbeat_secs: None,
            history_days: None,
            threshold: 1.0,
        }
    }

    fn submission(sender: Address, round_id: u64, value: i64) -> SubmissionLog {
        SubmissionLog {
            sender,
            round_id,
            raw_answer: I256::try_from(value).unwrap(),
            block_number: None,
            tx_hash: None,
            timestamp: Some(1_700_000_000),
            gas_price: None,
        }
    }

    /// Scripted adapter recording every capability call.
    struct MockAdapter {
        version: SchemaVersion,
        minimum: u64,
        pending: u64,
        oracles: Vec<Address>,
        history: Vec<FeedEvent>,
        calls: Mutex<Vec<&'static str>>,
        disposed: AtomicBool,
        scale: Scale,
    }

    impl MockAdapter {
        fn new(version: SchemaVersion, minimum: u64, pending: u64) -> Self {
            Self {
                version,
                minimum,
                pending,
                oracles: vec![Address::repeat_byte(0x0A), Address::repeat_byte(0x0B)],
                history: Vec::new(),
                calls: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
                scale: Scale::identity(),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().push(call);
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().iter().filter(|c| **c == call).count()
        }
    }

    #[async_trait]
    impl AggregatorAdapter for MockAdapter {
        fn version(&self) -> SchemaVersion {
            self.version
        }

        fn address(&self) -> Address {
            Address::repeat_byte(0x11)
        }

        fn scale(&self) -> &Scale {
            &self.scale
        }

        async fn latest_answer(&self) -> Result<I256, ChainError> {
            self.record("latest_answer");
            Ok(I256::try_from(100).unwrap())
        }

        async fn latest_timestamp(&self) -> Result<u64, ChainError> {
            self.record("latest_timestamp");
            Ok(1_700_000_000)
        }

        async fn latest_round(&self) -> Result<u64, ChainError> {
            self.record("latest_round");
            Ok(self.pending.saturating_sub(1))
        }

        async fn reporting_round(&self) -> Result<u64, ChainError> {
            self.record("reporting_round");
            Ok(self.pending)
        }

        async fn minimum_answers(&self) -> Result<u64, ChainError> {
            self.record("minimum_answers");
            Ok(self.minimum)
        }

        async fn oracle_addresses(&self) -> Result<Vec<Address>, ChainError> {
            self.record("oracle_addresses");
            Ok(self.oracles.clone())
        }

        async fn description(&self) -> Result<String, ChainError> {
            self.record("description");
            Err(ChainError::Unsupported("description"))
        }

        async fn historical_logs(
            &self,
            kind: LogKind,
            _window: BlockWindow,
        ) -> Result<Vec<FeedEvent>, ChainError> {
            self.record(match kind {
                LogKind::Submission => "historical_submissions",
                LogKind::RoundStart => "historical_round_starts",
                LogKind::AnswerUpdated => "historical_answers",
            });
            Ok(self.history.clone())
        }

        async fn subscribe(&self, kind: LogKind) -> Result<EventStream, ChainError> {
            self.record(match kind {
                LogKind::Submission => "subscribe_submissions",
                LogKind::RoundStart => "subscribe_round_starts",
                LogKind::AnswerUpdated => "subscribe_answers",
            });
            Ok(Box::pin(futures::stream::pending()))
        }

        fn dispose(&self) {
            self.disposed.store(true, Ordering::Release);
        }

        fn is_disposed(&self) -> bool {
            self.disposed.load(Ordering::Acquire)
        }
    }

    fn orchestrator() -> SyncOrchestrator {
        SyncOrchestrator::new(Arc::new(ChainClient::offline(
            "http://localhost:1",
            "ws://localhost:1",
        )))
    }

    #[test]
    fn test_history_window_bounds() {
        assert_eq!(history_from_block(5000, 1), 0);
        assert_eq!(history_from_block(100_000, 1), 93_300);
        assert_eq!(history_from_block(100_000, 2), 86_600);
    }

    #[tokio::test]
    async fn test_bootstrap_populates_projection() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V2, 3, 12));
        let session = orchestrator.start_session(feed(2), adapter.clone()).await;

        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(adapter.count("oracle_addresses"), 1);
        assert_eq!(adapter.count("minimum_answers"), 1);
        assert_eq!(adapter.count("reporting_round"), 1);
        assert_eq!(adapter.count("historical_submissions"), 1);
        assert_eq!(adapter.count("subscribe_submissions"), 1);
        // Bootstrap's single aggregate fetch.
        assert_eq!(adapter.count("latest_answer"), 1);
        assert_eq!(adapter.count("latest_timestamp"), 1);

        let snapshot = session.store().snapshot();
        assert_eq!(snapshot.minimum_answers, Some(3));
        assert_eq!(snapshot.pending_round_id, Some(12));
        assert_eq!(snapshot.oracle_list.len(), 2);
        assert_eq!(snapshot.latest_formatted_answer.as_deref(), Some("100.0"));
    }

    #[tokio::test]
    async fn test_quorum_triggers_exactly_one_refresh() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V2, 2, 7));
        let session = orchestrator.start_session(feed(2), adapter.clone()).await;

        let after_bootstrap = adapter.count("latest_answer");

        // Arrival order 0xB then 0xA.
        session
            .apply_submission(submission(Address::repeat_byte(0x0B), 7, 100))
            .await;
        assert_eq!(adapter.count("latest_answer"), after_bootstrap);

        session
            .apply_submission(submission(Address::repeat_byte(0x0A), 7, 101))
            .await;
        assert_eq!(adapter.count("latest_answer"), after_bootstrap + 1);

        let answers = session.store().oracle_answers();
        assert_eq!(answers.len(), 2);
        let mut senders: Vec<Address> = answers.iter().map(|a| a.sender).collect();
        senders.sort();
        assert_eq!(
            senders,
            vec![Address::repeat_byte(0x0A), Address::repeat_byte(0x0B)]
        );
    }

    #[tokio::test]
    async fn test_duplicate_delivery_leaves_answer_set_unchanged() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V2, 5, 7));
        let session = orchestrator.start_session(feed(2), adapter).await;

        let log = submission(Address::repeat_byte(0x0B), 7, 100);
        session.apply_submission(log.clone()).await;
        session.apply_submission(log).await;

        let answers = session.store().oracle_answers();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].round_id, 7);
    }

    #[tokio::test]
    async fn test_flux_gate_accepts_only_completed_round() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V3, 5, 8));
        let session = orchestrator.start_session(feed(3), adapter).await;

        // pending == 8: only round 7 submissions merge.
        session
            .apply_submission(submission(Address::repeat_byte(0x0A), 7, 100))
            .await;
        session
            .apply_submission(submission(Address::repeat_byte(0x0B), 5, 90))
            .await;
        session
            .apply_submission(submission(Address::repeat_byte(0x0C), 8, 110))
            .await;

        let answers = session.store().oracle_answers();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].round_id, 7);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_blocks_late_logs() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V2, 2, 7));
        let session = orchestrator.start_session(feed(2), adapter.clone()).await;

        session.dispose();
        session.dispose();
        assert_eq!(session.state(), SessionState::Disposed);
        assert!(adapter.is_disposed());

        // A log from the dead session's subscription is a no-op.
        session
            .apply_submission(submission(Address::repeat_byte(0x0A), 7, 100))
            .await;
        assert!(session.store().oracle_answers().is_empty());
    }

    #[tokio::test]
    async fn test_new_session_kills_previous_first() {
        let orchestrator = orchestrator();
        let first_adapter = Arc::new(MockAdapter::new(SchemaVersion::V2, 2, 7));
        let first = orchestrator
            .start_session(feed(2), first_adapter.clone())
            .await;

        let second_adapter = Arc::new(MockAdapter::new(SchemaVersion::V3, 2, 9));
        let second = orchestrator.start_session(feed(3), second_adapter).await;

        assert!(!first.is_alive());
        assert!(first_adapter.is_disposed());
        assert!(second.is_alive());
        assert!(orchestrator.current().unwrap().is_alive());
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_any_rpc() {
        let orchestrator = orchestrator();
        let mut bad = feed(2);
        bad.contract_address = "definitely-not-an-address".to_string();

        let result = orchestrator.init_contract(bad).await;
        assert!(matches!(result, Err(SyncError::InvalidAddress(_))));
        assert!(orchestrator.current().is_none());

        // Disposing after a failed construction is a no-op, not a panic.
        orchestrator.dispose();
        orchestrator.dispose();
    }

    #[tokio::test]
    async fn test_round_start_moves_pending_forward_and_resets_countdown() {
        let orchestrator = orchestrator();
        let adapter = Arc::new(MockAdapter::new(SchemaVersion::V3, 2, 8));
        let session = orchestrator.start_session(feed(3), adapter).await;

        session
            .apply_round_start(RoundStartLog {
                round_id: Some(9),
                started_by: Some(Address::repeat_byte(0x0A)),
                started_at: Some(1_700_000_555),
                block_number: Some(1000),
            })
            .await;

        let snapshot = session.store().snapshot();
        assert_eq!(snapshot.pending_round_id, Some(9));
        assert_eq!(snapshot.latest_request_timestamp, Some(1_700_000_555));
    }

    #[tokio::test]
    async fn test_bootstrap_replays_only_reporting_rounds() {
        let orchestrator = orchestrator();
        let mut adapter = MockAdapter::new(SchemaVersion::V2, 5, 7);
        adapter.history = vec![
            FeedEvent::Submission(submission(Address::repeat_byte(0x0A), 7, 100)),
            FeedEvent::Submission(submission(Address::repeat_byte(0x0B), 6, 90)),
            FeedEvent::Submission(submission(Address::repeat_byte(0x0C), 3, 50)),
        ];
        let session = orchestrator.start_session(feed(2), Arc::new(adapter)).await;

        let answers = session.store().oracle_answers();
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().all(|a| a.round_id == 7 || a.round_id == 6));
    }
}
