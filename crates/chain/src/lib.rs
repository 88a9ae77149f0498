//! Feedsync chain interaction layer.
//!
//! This crate provides:
//! - Provider management for HTTP and WebSocket connections
//! - Typed bindings for the three on-chain aggregator schema generations
//! - Schema adapters normalizing those generations behind one capability trait
//! - Log enrichment (block timestamps, gas prices) for history display
//! - Exact decimal scaling of raw answers into display strings
//!
//! No transactions are ever signed or submitted; every RPC call is read-only.

pub mod adapter;
mod bindings;
mod client;
mod enricher;
mod error;
mod scale;

pub use adapter::{
    build_adapter, AggregatorAdapter, AnswerLog, BlockWindow, EventStream, FeedEvent, LogKind,
    RoundStartLog, SchemaVersion, SubmissionLog,
};
pub use bindings::{IAggregatorLegacy, IAggregatorV2, IFluxAggregator};
pub use client::{ChainClient, LogStream, TransactionMeta};
pub use enricher::LogEnricher;
pub use error::ChainError;
pub use scale::{format_answer, Scale};
