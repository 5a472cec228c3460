//! Core types and shared functionality for the folio offline worker.
//!
//! This crate provides:
//! - Durable cache partitions with a SQLite backend
//! - The bounded analytics log and its single-owner store
//! - Unified error types
//! - Layered configuration

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;

pub use analytics::{AnalyticsLimits, AnalyticsLog, AnalyticsRecord, AnalyticsStore};
pub use cache::{CacheDb, CacheEntry, PartitionInfo};
pub use config::{AppConfig, ConfigError, PartitionNames};
pub use error::Error;
