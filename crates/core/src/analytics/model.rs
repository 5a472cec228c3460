//! Analytics records and the bounded log that holds them.
//!
//! Field names serialize in camelCase so the snapshot handed back to page
//! scripts keeps the shape they already read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Retention bounds for each record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnalyticsLimits {
    pub visits: usize,
    pub interactions: usize,
    pub skills_matching: usize,
}

impl Default for AnalyticsLimits {
    fn default() -> Self {
        Self { visits: 1000, interactions: 500, skills_matching: 200 }
    }
}

/// A page visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// A user interaction with a page element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// The outcome of one skills-compatibility evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkillsMatch {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Free-form, comma-separated as typed by the visitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default)]
    pub project_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compatibility_score: Option<f64>,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
}

/// One record destined for the log.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyticsRecord {
    Visit(Visit),
    Interaction(Interaction),
    SkillsMatch(SkillsMatch),
}

impl AnalyticsRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalyticsRecord::Visit(_) => "visit",
            AnalyticsRecord::Interaction(_) => "interaction",
            AnalyticsRecord::SkillsMatch(_) => "skills_match",
        }
    }

    /// Overwrite the record's timestamp with the worker clock.
    pub fn stamp(&mut self, now_ms: i64) {
        match self {
            AnalyticsRecord::Visit(v) => v.timestamp = now_ms,
            AnalyticsRecord::Interaction(i) => i.timestamp = now_ms,
            AnalyticsRecord::SkillsMatch(s) => s.timestamp = now_ms,
        }
    }
}

/// The single persisted analytics document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsLog {
    #[serde(default)]
    pub visits: Vec<Visit>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    #[serde(default)]
    pub skills_matching: Vec<SkillsMatch>,
    #[serde(default)]
    pub last_update: i64,
}

fn push_bounded<T>(items: &mut Vec<T>, item: T, limit: usize) {
    items.push(item);
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}

impl AnalyticsLog {
    /// An empty log stamped with `now_ms`.
    pub fn empty(now_ms: i64) -> Self {
        Self { last_update: now_ms, ..Default::default() }
    }

    /// Append a record, evicting the oldest entries of its kind past the bound.
    pub fn append(&mut self, record: AnalyticsRecord, limits: &AnalyticsLimits, now_ms: i64) {
        match record {
            AnalyticsRecord::Visit(v) => push_bounded(&mut self.visits, v, limits.visits),
            AnalyticsRecord::Interaction(i) => push_bounded(&mut self.interactions, i, limits.interactions),
            AnalyticsRecord::SkillsMatch(s) => push_bounded(&mut self.skills_matching, s, limits.skills_matching),
        }
        self.last_update = now_ms;
    }

    /// Total number of records across all kinds.
    pub fn len(&self) -> usize {
        self.visits.len() + self.interactions.len() + self.skills_matching.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(page: &str) -> AnalyticsRecord {
        AnalyticsRecord::Visit(Visit { page: Some(page.into()), ..Default::default() })
    }

    #[test]
    fn test_append_keeps_most_recent_in_order() {
        let limits = AnalyticsLimits { visits: 3, ..Default::default() };
        let mut log = AnalyticsLog::default();
        for i in 0..5 {
            log.append(visit(&format!("/p{i}")), &limits, i);
        }

        let pages: Vec<_> = log.visits.iter().map(|v| v.page.clone().unwrap()).collect();
        assert_eq!(pages, vec!["/p2", "/p3", "/p4"]);
        assert_eq!(log.last_update, 4);
    }

    #[test]
    fn test_bounds_are_per_kind() {
        let limits = AnalyticsLimits { visits: 1, interactions: 2, skills_matching: 1 };
        let mut log = AnalyticsLog::default();
        for _ in 0..3 {
            log.append(visit("/"), &limits, 1);
            log.append(AnalyticsRecord::Interaction(Interaction::default()), &limits, 1);
        }

        assert_eq!(log.visits.len(), 1);
        assert_eq!(log.interactions.len(), 2);
        assert!(log.skills_matching.is_empty());
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_serializes_with_page_field_names() {
        let mut log = AnalyticsLog::empty(42);
        log.append(
            AnalyticsRecord::Interaction(Interaction { kind: Some("click".into()), ..Default::default() }),
            &AnalyticsLimits::default(),
            43,
        );
        log.append(
            AnalyticsRecord::SkillsMatch(SkillsMatch { compatibility_score: Some(87.0), ..Default::default() }),
            &AnalyticsLimits::default(),
            44,
        );

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["lastUpdate"], 44);
        assert_eq!(json["interactions"][0]["type"], "click");
        assert_eq!(json["skillsMatching"][0]["compatibilityScore"], 87.0);
        assert!(json["skillsMatching"][0].get("domain").is_none());
    }

    #[test]
    fn test_deserializes_partial_document() {
        let log: AnalyticsLog = serde_json::from_str(r#"{"visits":[{"page":"/","userAgent":"ua"}]}"#).unwrap();
        assert_eq!(log.visits[0].user_agent.as_deref(), Some("ua"));
        assert!(log.interactions.is_empty());
        assert_eq!(log.last_update, 0);
    }

    #[test]
    fn test_stamp_overwrites_client_timestamp() {
        let mut record = AnalyticsRecord::Visit(Visit { timestamp: 1, ..Default::default() });
        record.stamp(99);
        assert_eq!(record, AnalyticsRecord::Visit(Visit { timestamp: 99, ..Default::default() }));
        assert_eq!(record.kind(), "visit");
    }
}
