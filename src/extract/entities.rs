// src/extract/entities.rs
//! Lightweight named-entity extraction: text → sets of persons,
//! organizations, locations, and date mentions.
//!
//! Pattern-based and deliberately conservative. The extractor is a fast,
//! synchronous, side-effect-free collaborator of the event pipeline; the
//! generative model does the heavy lifting and these sets are used to
//! cross-check the actors it reports.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EntitySet;

/// Cap per entity list so a pathological page cannot bloat the prompt.
const MAX_PER_KIND: usize = 20;

pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> EntitySet;
}

static RE_PERSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:Mr|Mrs|Ms|Dr|Gen|Col|President|Prime Minister|Minister|Chancellor|Senator|Governor|Mayor|Chief|General|Colonel|Captain|Commander|Spokesman|Spokeswoman)\.?\s+((?:[A-Z][a-z]+)(?:\s+[A-Z][a-z]+){0,2})",
    )
    .expect("person regex")
});

static RE_ORG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b((?:[A-Z][A-Za-z&'-]+\s+){0,3}(?:Police|Army|Navy|Ministry|Department|Agency|Bureau|Corporation|Company|Party|Union|University|Council|Authority|Commission|Committee|Group|Force|Forces|Front|Brigade|Militia|Organization|Organisation|Association|Nations))\b",
    )
    .expect("org regex")
});

static RE_ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]{2,6})\b").expect("acronym regex"));

static RE_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in|at|near|outside|across|from)\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)")
        .expect("location regex")
});

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:\d{4}-\d{2}-\d{2}|\d{1,2}\s+(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{4}|(?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4})\b",
    )
    .expect("date regex")
});

/// Words an acronym scan must never report as organizations.
const ACRONYM_STOPLIST: [&str; 8] = ["THE", "AND", "FOR", "BUT", "NOT", "WAS", "HAS", "ITS"];

/// Location captures that are really just sentence furniture.
const LOCATION_STOPLIST: [&str; 6] = ["The", "This", "That", "Monday", "Tuesday", "Friday"];

/// Built-in pattern-based extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexEntityExtractor;

impl EntityExtractor for RegexEntityExtractor {
    fn extract(&self, text: &str) -> EntitySet {
        let mut persons = Vec::new();
        for caps in RE_PERSON.captures_iter(text) {
            push_unique(&mut persons, caps[1].trim());
        }

        let mut organizations = Vec::new();
        for caps in RE_ORG.captures_iter(text) {
            push_unique(&mut organizations, caps[1].trim());
        }
        for caps in RE_ACRONYM.captures_iter(text) {
            let acro = &caps[1];
            if !ACRONYM_STOPLIST.contains(&acro) {
                push_unique(&mut organizations, acro);
            }
        }

        let mut locations = Vec::new();
        for caps in RE_LOCATION.captures_iter(text) {
            let loc = caps[1].trim();
            if !LOCATION_STOPLIST.contains(&loc) {
                push_unique(&mut locations, loc);
            }
        }

        let mut dates = Vec::new();
        for m in RE_DATE.find_iter(text) {
            push_unique(&mut dates, m.as_str());
        }

        EntitySet {
            persons,
            organizations,
            locations,
            dates,
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if list.len() >= MAX_PER_KIND {
        return;
    }
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}
