// src/types.rs
//! Core data model shared across the pipeline: documents, entity sets,
//! event records, queries, ranked results, and the tagged stream messages
//! consumed by the transport layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::event_type::EventType;

/// Normalized text + metadata unit derived from one fetched URL.
/// Created by the scraper; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub title: String,
    pub body: String,
    /// Canonical absolute URL the document was fetched from.
    pub url: String,
    /// Source id from the SourceSpec that produced this document.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Named entities found in one document. Produced once per document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EntitySet {
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub locations: Vec<String>,
    pub dates: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.organizations.is_empty()
            && self.locations.is_empty()
            && self.dates.is_empty()
    }
}

/// Where an event took place. All fields optional; the model often only
/// knows a city or a country.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl EventLocation {
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.region.is_none() && self.country.is_none()
    }

    /// Case-insensitive containment against any populated field.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.city, &self.region, &self.country]
            .into_iter()
            .flatten()
            .any(|f| {
                let f = f.to_lowercase();
                f.contains(&needle) || needle.contains(&f)
            })
    }
}

/// Casualty counts when the model reports them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Casualties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub killed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injured: Option<u32>,
}

/// Structured occurrence derived from one Document via the generative model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_type: EventType,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub location: EventLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casualties: Option<Casualties>,
    /// Model-reported confidence, clamped to <0.0, 1.0>.
    pub confidence: f32,
    /// URL of the document this event was extracted from.
    pub source_url: String,
}

/// Free-text search query with optional structured filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Query {
    pub phrase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            ..Self::default()
        }
    }
}

/// An EventRecord annotated with its relevance score against a Query.
/// Only events at or above the configured minimum score survive ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: EventRecord,
    pub score: f32,
}

/// Terminal status of a non-streaming search run. Zero-result conditions
/// are statuses, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Success,
    NoSources,
    NoArticles,
    NoEvents,
    Error,
}

/// Aggregate result of a non-streaming search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    pub status: SearchStatus,
    pub total_events: usize,
    pub articles_processed: usize,
    pub sources_searched: usize,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub events: Vec<RankedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One unit emitted over the streaming boundary. The transport layer
/// (SSE, queue, ...) forwards these verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Progress {
        session_id: String,
        current: usize,
        total: usize,
        percent: u8,
        status: String,
    },
    Event {
        session_id: String,
        event: RankedEvent,
    },
    Complete {
        session_id: String,
        total_events: usize,
    },
    Cancelled {
        session_id: String,
        events_emitted: usize,
    },
    Error {
        session_id: String,
        message: String,
    },
}

pub(crate) fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_message_serializes_with_type_tag() {
        let msg = StreamMessage::Progress {
            session_id: "abc".into(),
            current: 2,
            total: 5,
            percent: 40,
            status: "processing article 2 of 5".into(),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], serde_json::json!("progress"));
        assert_eq!(v["percent"], serde_json::json!(40));

        let msg = StreamMessage::Cancelled {
            session_id: "abc".into(),
            events_emitted: 2,
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], serde_json::json!("cancelled"));
        assert_eq!(v["events_emitted"], serde_json::json!(2));
    }

    #[test]
    fn location_match_is_case_insensitive_and_partial() {
        let loc = EventLocation {
            city: Some("Mumbai".into()),
            region: None,
            country: Some("India".into()),
        };
        assert!(loc.matches("mumbai"));
        assert!(loc.matches("INDIA"));
        assert!(loc.matches("Mumbai, India"));
        assert!(!loc.matches("Delhi"));
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(0.42), 0.42);
    }
}
