//! Log enrichment: block timestamps and gas prices for history display.
//!
//! A decoded submission log carries only what the event itself holds; the
//! timestamp and gas price each cost one extra round-trip. Enrichment is
//! best-effort: failures are logged and the field stays unset. Block
//! timestamps are cached since one round's submissions cluster in a handful
//! of blocks.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

use crate::adapter::SubmissionLog;
use crate::client::ChainClient;

/// Best-effort enricher over one [`ChainClient`].
pub struct LogEnricher {
    client: Arc<ChainClient>,
    /// Block number → timestamp cache
    block_timestamps: DashMap<u64, u64>,
}

impl LogEnricher {
    pub fn new(client: Arc<ChainClient>) -> Self {
        Self {
            client,
            block_timestamps: DashMap::new(),
        }
    }

    /// Fill a submission log's timestamp, gas price, and (where the event
    /// left a placeholder) sender. Never fails; missing data stays missing.
    pub async fn enrich(&self, log: &mut SubmissionLog) {
        if log.timestamp.is_none() {
            if let Some(number) = log.block_number {
                log.timestamp = self.block_timestamp(number).await;
            }
        }

        let needs_tx = log.gas_price.is_none() || log.sender == Address::ZERO;
        if needs_tx {
            if let Some(hash) = log.tx_hash {
                match self.client.get_transaction_meta(hash).await {
                    Ok(Some(meta)) => {
                        log.gas_price = meta.gas_price;
                        if log.sender == Address::ZERO {
                            log.sender = meta.from;
                        }
                    }
                    Ok(None) => {
                        warn!(tx = %hash, "Transaction not found during enrichment");
                    }
                    Err(e) => {
                        warn!(tx = %hash, error = %e, "Failed to fetch transaction for enrichment");
                    }
                }
            }
        }
    }

    /// Cached block-timestamp lookup.
    pub async fn block_timestamp(&self, number: u64) -> Option<u64> {
        if let Some(cached) = self.block_timestamps.get(&number) {
            return Some(*cached);
        }

        match self.client.get_block_timestamp(number).await {
            Ok(Some(timestamp)) => {
                self.block_timestamps.insert(number, timestamp);
                Some(timestamp)
            }
            Ok(None) => {
                warn!(block = number, "Block not found during enrichment");
                None
            }
            Err(e) => {
                warn!(block = number, error = %e, "Failed to fetch block for enrichment");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_starts_empty() {
        let enricher = LogEnricher::new(Arc::new(ChainClient::offline(
            "http://localhost:1",
            "ws://localhost:1",
        )));
        assert!(enricher.block_timestamps.is_empty());
    }
}
