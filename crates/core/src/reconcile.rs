//! Reconciliation of submission logs into the per-oracle answer set.
//!
//! Live subscriptions deliver at-least-once, possibly duplicated, possibly
//! out of order; bootstrap replays a window of history on top. These
//! functions make that safe: merging is keyed by sender, idempotent under
//! redelivery, and never lets the set hold two entries for one oracle.

use tracing::debug;

use crate::store::{AnswerHistoryEntry, OracleAnswer};

/// What a merge did to the answer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First answer seen from this sender.
    Inserted,
    /// Same sender, same round: metadata refreshed in place.
    Refreshed,
    /// Same sender, newer round: entry replaced.
    Replaced,
    /// Same sender, older round: stale redelivery dropped.
    Ignored,
}

/// Merge one submission into the answer set, keyed by sender.
///
/// Replacement is conditional on the incoming round id not being older than
/// the recorded one, so a redelivered stale log cannot walk a sender's entry
/// backwards.
pub fn merge_submission(
    answers: &mut Vec<OracleAnswer>,
    incoming: OracleAnswer,
) -> MergeOutcome {
    match answers.iter_mut().find(|a| a.sender == incoming.sender) {
        None => {
            answers.push(incoming);
            MergeOutcome::Inserted
        }
        Some(existing) if incoming.round_id == existing.round_id => {
            *existing = incoming;
            MergeOutcome::Refreshed
        }
        Some(existing) if incoming.round_id > existing.round_id => {
            *existing = incoming;
            MergeOutcome::Replaced
        }
        Some(existing) => {
            debug!(
                sender = %incoming.sender,
                incoming_round = incoming.round_id,
                recorded_round = existing.round_id,
                "Dropping stale submission redelivery"
            );
            MergeOutcome::Ignored
        }
    }
}

/// Whether a round has accumulated enough distinct answers to be final.
pub fn quorum_reached(answers: &[OracleAnswer], round_id: u64, minimum_answers: u64) -> bool {
    let count = answers.iter().filter(|a| a.round_id == round_id).count() as u64;
    count >= minimum_answers
}

/// Deduplicate finalized-round history by round id, keeping the last entry
/// seen for each round, ordered by round id for charting.
pub fn dedup_history(entries: Vec<AnswerHistoryEntry>) -> Vec<AnswerHistoryEntry> {
    let mut deduped: Vec<AnswerHistoryEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match deduped.iter_mut().find(|e| e.round_id == entry.round_id) {
            Some(existing) => *existing = entry,
            None => deduped.push(entry),
        }
    }

    deduped.sort_by_key(|e| e.round_id);
    deduped
}
