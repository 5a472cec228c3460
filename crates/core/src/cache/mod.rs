//! SQLite-backed partitions for cached responses and worker bookkeeping.
//!
//! This module provides durable, named partitions using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - URL-keyed entries (SHA-256 of the canonical URL)
//! - Atomic bulk insertion for install-time pre-population
//! - Whole-partition deletion with cascading entry removal
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod hash;
pub mod meta;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use partitions::{CacheEntry, PartitionInfo};
