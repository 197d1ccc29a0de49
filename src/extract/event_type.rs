// src/extract/event_type.rs
//! Closed event-category enumeration and the fuzzy classifier that maps the
//! model's free-text type declarations onto it.

use serde::{Deserialize, Serialize};

/// Closed set of event categories. Anything the classifier cannot place
/// lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Bombing,
    Shooting,
    Attack,
    ArmedClash,
    Protest,
    Riot,
    Kidnapping,
    Assassination,
    Cyberattack,
    NaturalDisaster,
    Other,
}

/// Generic tokens that must never count as a fuzzy match on their own.
const STOPLIST: [&str; 3] = ["event", "type", "other"];

impl EventType {
    /// Declared order doubles as classification priority for equal-length
    /// fuzzy matches.
    pub const ALL: [EventType; 11] = [
        EventType::Bombing,
        EventType::Shooting,
        EventType::Attack,
        EventType::ArmedClash,
        EventType::Protest,
        EventType::Riot,
        EventType::Kidnapping,
        EventType::Assassination,
        EventType::Cyberattack,
        EventType::NaturalDisaster,
        EventType::Other,
    ];

    /// Canonical label, e.g. "ARMED_CLASH".
    pub fn label(&self) -> &'static str {
        match self {
            EventType::Bombing => "BOMBING",
            EventType::Shooting => "SHOOTING",
            EventType::Attack => "ATTACK",
            EventType::ArmedClash => "ARMED_CLASH",
            EventType::Protest => "PROTEST",
            EventType::Riot => "RIOT",
            EventType::Kidnapping => "KIDNAPPING",
            EventType::Assassination => "ASSASSINATION",
            EventType::Cyberattack => "CYBERATTACK",
            EventType::NaturalDisaster => "NATURAL_DISASTER",
            EventType::Other => "OTHER",
        }
    }

    /// Lowercased label with underscores as spaces, for substring matching.
    fn label_words(&self) -> String {
        self.label().to_lowercase().replace('_', " ")
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a free-text event-type declaration onto the closed enum.
///
/// Three tiers: (a) exact case-insensitive label match; (b) fuzzy substring
/// match across labels, ignoring stoplisted generic tokens, with the longest
/// matching label winning and declared order breaking length ties;
/// (c) `Other`.
pub fn classify_event_type(raw: &str) -> EventType {
    let needle = raw.trim().to_lowercase().replace(['-', '_'], " ");
    if needle.is_empty() {
        return EventType::Other;
    }

    // (a) exact match against the canonical label.
    for et in EventType::ALL {
        if needle == et.label_words() {
            return et;
        }
    }

    // (b) longest-label substring match. A label appearing inside the text
    // ("suicide bombing attack" → BOMBING over ATTACK), or the whole text
    // appearing inside a label ("bomb" → BOMBING), both count.
    let mut best: Option<(usize, EventType)> = None;
    for et in EventType::ALL {
        if et == EventType::Other {
            continue;
        }
        let label = et.label_words();
        let hit = needle.contains(&label)
            || (!STOPLIST.contains(&needle.as_str()) && label.contains(&needle));
        if hit && best.map_or(true, |(len, _)| label.len() > len) {
            best = Some((label.len(), et));
        }
    }

    best.map(|(_, et)| et).unwrap_or(EventType::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_label_matches_case_insensitively() {
        assert_eq!(classify_event_type("BOMBING"), EventType::Bombing);
        assert_eq!(classify_event_type("bombing"), EventType::Bombing);
        assert_eq!(classify_event_type("Armed_Clash"), EventType::ArmedClash);
        assert_eq!(classify_event_type("natural disaster"), EventType::NaturalDisaster);
    }

    #[test]
    fn longest_label_wins_over_shorter_ones() {
        // Contains both "bombing" and "attack"; the longer label wins.
        assert_eq!(
            classify_event_type("suicide bombing attack"),
            EventType::Bombing
        );
        assert_eq!(classify_event_type("drone attack"), EventType::Attack);
    }

    #[test]
    fn partial_token_matches_a_label() {
        assert_eq!(classify_event_type("bomb"), EventType::Bombing);
        assert_eq!(classify_event_type("riots"), EventType::Riot);
    }

    #[test]
    fn generic_tokens_and_unknowns_fall_back_to_other() {
        assert_eq!(classify_event_type("xyz-unknown"), EventType::Other);
        assert_eq!(classify_event_type("event"), EventType::Other);
        assert_eq!(classify_event_type("type"), EventType::Other);
        assert_eq!(classify_event_type(""), EventType::Other);
        assert_eq!(classify_event_type("other"), EventType::Other);
    }
}
