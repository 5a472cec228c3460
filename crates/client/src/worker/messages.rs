//! Page → worker message protocol.
//!
//! ### Envelope
//! `{ "type": "TRACK_VISIT" | "TRACK_INTERACTION" | "TRACK_SKILLS_MATCHING" | "GET_ANALYTICS", "data": {...} }`
//!
//! ### Handling
//! 1. Messages from any origin other than the worker's are dropped.
//! 2. Unknown types and malformed payloads are dropped.
//! 3. `TRACK_*` appends one record; nothing is sent back.
//! 4. `GET_ANALYTICS` replies with the whole log over the caller's port.

use folio_core::AnalyticsLog;
use folio_core::AnalyticsRecord;
use folio_core::analytics::{Interaction, SkillsMatch, Visit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use url::Url;

use super::Worker;

/// Reply channel supplied with `GET_ANALYTICS`.
pub type ReplyPort = oneshot::Sender<AnalyticsLog>;

/// A typed page → worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    TrackVisit(Visit),
    TrackInteraction(Interaction),
    TrackSkillsMatching(SkillsMatch),
    GetAnalytics,
}

impl WorkerMessage {
    /// Decode an envelope.
    ///
    /// Any `timestamp` in the payload is discarded; the worker stamps
    /// records itself.
    pub fn parse(envelope: Value) -> Result<Self, IgnoreReason> {
        let Value::Object(mut envelope) = envelope else {
            return Err(IgnoreReason::MalformedPayload);
        };
        let kind = match envelope.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Err(IgnoreReason::UnknownType),
        };

        let mut data = match envelope.remove("data") {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(data) => data,
        };
        if let Value::Object(fields) = &mut data {
            fields.remove("timestamp");
        }

        let decoded = match kind.as_str() {
            "TRACK_VISIT" => serde_json::from_value(data).map(WorkerMessage::TrackVisit),
            "TRACK_INTERACTION" => serde_json::from_value(data).map(WorkerMessage::TrackInteraction),
            "TRACK_SKILLS_MATCHING" => serde_json::from_value(data).map(WorkerMessage::TrackSkillsMatching),
            "GET_ANALYTICS" => return Ok(WorkerMessage::GetAnalytics),
            _ => return Err(IgnoreReason::UnknownType),
        };
        decoded.map_err(|e| {
            tracing::debug!(kind, error = %e, "malformed message payload");
            IgnoreReason::MalformedPayload
        })
    }

    /// The record to append, for `TRACK_*` messages.
    pub fn into_record(self) -> Option<AnalyticsRecord> {
        match self {
            WorkerMessage::TrackVisit(v) => Some(AnalyticsRecord::Visit(v)),
            WorkerMessage::TrackInteraction(i) => Some(AnalyticsRecord::Interaction(i)),
            WorkerMessage::TrackSkillsMatching(s) => Some(AnalyticsRecord::SkillsMatch(s)),
            WorkerMessage::GetAnalytics => None,
        }
    }
}

/// A message as delivered to the worker.
#[derive(Debug)]
pub struct MessageEvent {
    /// Origin of the sending page, e.g. `http://localhost:8080`.
    pub origin: String,
    pub data: Value,
    pub reply: Option<ReplyPort>,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self { origin: origin.into(), data, reply: None }
    }

    pub fn with_reply(mut self, reply: ReplyPort) -> Self {
        self.reply = Some(reply);
        self
    }
}

/// Why a message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    ForeignOrigin,
    UnknownType,
    MalformedPayload,
    NoReplyPort,
    StorageFailure,
}

/// What the worker did with a message. Never sent to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum MessageOutcome {
    Recorded,
    Replied,
    Ignored(IgnoreReason),
}

impl Worker {
    fn is_own_origin(&self, origin: &str) -> bool {
        Url::parse(origin).is_ok_and(|url| url.origin() == self.origin.origin())
    }

    /// Handle one message from a page context.
    pub async fn handle_message(&self, event: MessageEvent) -> MessageOutcome {
        let MessageEvent { origin, data, reply } = event;

        if !self.is_own_origin(&origin) {
            tracing::debug!(origin = %origin, "dropping message from foreign origin");
            return MessageOutcome::Ignored(IgnoreReason::ForeignOrigin);
        }

        let message = match WorkerMessage::parse(data) {
            Ok(message) => message,
            Err(reason) => {
                tracing::debug!(?reason, "ignoring message");
                return MessageOutcome::Ignored(reason);
            }
        };

        match message.into_record() {
            Some(record) => match self.analytics.append(record).await {
                Ok(()) => MessageOutcome::Recorded,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to record analytics");
                    MessageOutcome::Ignored(IgnoreReason::StorageFailure)
                }
            },
            None => {
                let Some(reply) = reply else {
                    tracing::debug!("GET_ANALYTICS without a reply port");
                    return MessageOutcome::Ignored(IgnoreReason::NoReplyPort);
                };
                let log = self.analytics.snapshot().await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "analytics snapshot failed, replying with an empty log");
                    AnalyticsLog::default()
                });
                if reply.send(log).is_err() {
                    tracing::debug!("reply port closed before the snapshot was sent");
                }
                MessageOutcome::Replied
            }
        }
    }
}
