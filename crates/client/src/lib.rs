//! Client-side runtime for the folio offline worker.
//!
//! This crate provides the network layer, request classification, the
//! three cache strategies, and the `Worker` that ties them to the
//! lifecycle controller and the message protocol.

pub mod fetch;
pub mod request;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchClient, FetchConfig, Network, canonicalize};
pub use request::{ResponseSource, WorkerRequest, WorkerResponse};
pub use strategy::{RequestClass, Strategy, StrategyContext, StrategyTable, classify};
pub use worker::{
    ANALYTICS_SYNC_TAG, ActivationReport, AnalyticsSink, ClientHandle, ClientMessage, IgnoreReason, InstallReport,
    LogSink, MessageEvent, MessageOutcome, Route, Worker, WorkerMessage, WorkerState, WorkerStatus,
};
