//! Local visitor analytics persisted by the worker.
//!
//! Records arrive through the message protocol and are appended to one
//! bounded document stored in the analytics partition.

pub mod model;
pub mod store;

pub use model::{AnalyticsLimits, AnalyticsLog, AnalyticsRecord, Interaction, SkillsMatch, Visit};
pub use store::{ANALYTICS_PATH, AnalyticsStore, now_ms};
