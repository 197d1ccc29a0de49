// src/matcher.rs
//! Relevance scoring of extracted events against the original query:
//! a weighted composite of keyword similarity, location match, event-type
//! match, and date-range membership.

use std::collections::HashSet;

use strsim::normalized_levenshtein;

use crate::types::{clamp01, EventRecord, Query, RankedEvent};

pub const DEFAULT_MIN_SCORE: f32 = 0.3;
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.40;
pub const DEFAULT_LOCATION_WEIGHT: f32 = 0.25;
pub const DEFAULT_TYPE_WEIGHT: f32 = 0.20;
pub const DEFAULT_DATE_WEIGHT: f32 = 0.15;

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    /// Events scoring below this are dropped entirely.
    pub min_score: f32,
    pub keyword_weight: f32,
    pub location_weight: f32,
    pub type_weight: f32,
    pub date_weight: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            location_weight: DEFAULT_LOCATION_WEIGHT,
            type_weight: DEFAULT_TYPE_WEIGHT,
            date_weight: DEFAULT_DATE_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryMatcher {
    config: MatcherConfig,
}

impl QueryMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Composite relevance of one event against the query, in <0.0, 1.0>.
    ///
    /// The weighted sum is normalized over the components the query actually
    /// specifies: keyword similarity always participates; location, type,
    /// and date only when the query carries that filter. A specified filter
    /// the event fails contributes zero, which is what makes a
    /// location+type+date match strictly outscore a keyword-only match.
    pub fn score_event(&self, event: &EventRecord, query: &Query) -> f32 {
        let c = &self.config;
        let mut weighted = c.keyword_weight * keyword_similarity(&query.phrase, event);
        let mut total_weight = c.keyword_weight;

        if let Some(loc) = &query.location {
            total_weight += c.location_weight;
            if event.location.matches(loc) {
                weighted += c.location_weight;
            }
        }
        if let Some(et) = query.event_type {
            total_weight += c.type_weight;
            if event.event_type == et {
                weighted += c.type_weight;
            }
        }
        if query.date_from.is_some() || query.date_to.is_some() {
            total_weight += c.date_weight;
            if date_in_range(event, query) {
                weighted += c.date_weight;
            }
        }

        if total_weight <= 0.0 {
            return 0.0;
        }
        clamp01(weighted / total_weight)
    }

    /// Score one event; `None` if it falls below the minimum.
    pub fn score_one(&self, event: EventRecord, query: &Query) -> Option<RankedEvent> {
        let score = self.score_event(&event, query);
        (score >= self.config.min_score).then_some(RankedEvent { event, score })
    }

    /// Score and rank a batch. Events below the minimum are dropped;
    /// survivors sort by descending score. Equal scores tie-break on the
    /// more recent event timestamp (missing timestamps last), then title.
    pub fn match_events(&self, events: Vec<EventRecord>, query: &Query) -> Vec<RankedEvent> {
        let mut ranked: Vec<RankedEvent> = events
            .into_iter()
            .filter_map(|ev| self.score_one(ev, query))
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.event.occurred_at.cmp(&a.event.occurred_at))
                .then_with(|| a.event.title.cmp(&b.event.title))
        });
        ranked
    }
}

/// Token coverage of the query phrase in the event's title+summary, blended
/// with edit-distance similarity against the title so that near-verbatim
/// titles still rank well when tokenization splits differently.
fn keyword_similarity(phrase: &str, event: &EventRecord) -> f32 {
    let query_tokens = tokenize(phrase);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text = format!("{} {}", event.title, event.summary);
    let event_tokens: HashSet<String> = tokenize(&text).into_iter().collect();
    let hits = query_tokens
        .iter()
        .filter(|t| event_tokens.contains(*t))
        .count();
    let coverage = hits as f32 / query_tokens.len() as f32;

    let lev = normalized_levenshtein(&phrase.to_lowercase(), &event.title.to_lowercase()) as f32;
    coverage.max(lev)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn date_in_range(event: &EventRecord, query: &Query) -> bool {
    let Some(occurred) = event.occurred_at else {
        return false;
    };
    if let Some(from) = query.date_from {
        if occurred < from {
            return false;
        }
    }
    if let Some(to) = query.date_to {
        if occurred > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::event_type::EventType;
    use crate::types::EventLocation;
    use chrono::{TimeZone, Utc};

    fn event(title: &str, summary: &str) -> EventRecord {
        EventRecord {
            event_type: EventType::Protest,
            title: title.into(),
            summary: summary.into(),
            location: EventLocation::default(),
            occurred_at: None,
            participants: vec![],
            organizations: vec![],
            casualties: None,
            confidence: 0.8,
            source_url: "https://news.example.com/a".into(),
        }
    }

    fn full_query() -> Query {
        Query {
            phrase: "protest in Mumbai".into(),
            location: Some("Mumbai".into()),
            event_type: Some(EventType::Protest),
            date_from: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            date_to: Some(Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn filters_matching_beats_keyword_only() {
        let query = full_query();

        let mut matching = event("Protest in Mumbai", "Crowds marched through Mumbai.");
        matching.location.city = Some("Mumbai".into());
        matching.occurred_at = Some(Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap());

        // Same keyword text, but fails location/type/date filters.
        let mut keyword_only = matching.clone();
        keyword_only.location = EventLocation::default();
        keyword_only.event_type = EventType::Riot;
        keyword_only.occurred_at = None;

        let m = QueryMatcher::default();
        let s_full = m.score_event(&matching, &query);
        let s_kw = m.score_event(&keyword_only, &query);
        assert!(
            s_full > s_kw,
            "full match {s_full} must strictly exceed keyword-only {s_kw}"
        );
    }

    #[test]
    fn below_threshold_events_are_dropped() {
        let query = Query::new("protest in Mumbai");
        let relevant = event("Protest in Mumbai", "March through the city.");
        let irrelevant = event("Flower show opens", "Orchids on display downtown.");

        let ranked = QueryMatcher::default().match_events(vec![irrelevant, relevant], &query);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].event.title, "Protest in Mumbai");
    }

    #[test]
    fn ranking_is_descending_with_recency_tiebreak() {
        let query = Query::new("protest in Mumbai");
        let mut older = event("Protest in Mumbai", "Crowds marched.");
        older.occurred_at = Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let mut newer = older.clone();
        newer.occurred_at = Some(Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).unwrap());

        let ranked = QueryMatcher::default().match_events(vec![older.clone(), newer.clone()], &query);
        assert_eq!(ranked.len(), 2);
        // Identical scores: the more recent event comes first.
        assert_eq!(ranked[0].event.occurred_at, newer.occurred_at);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn unspecified_filters_do_not_penalize() {
        let query = Query::new("protest in Mumbai");
        let ev = event("Protest in Mumbai", "March through the city.");
        let score = QueryMatcher::default().score_event(&ev, &query);
        // Keyword-only query against keyword-perfect event: full marks.
        assert!(score > 0.95, "got {score}");
    }
}
