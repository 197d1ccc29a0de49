// src/extract/mod.rs
//! Event extraction: build a prompt from a document plus its entities,
//! invoke the generative model, parse and validate the structured result,
//! and classify it into the closed event-type set.

pub mod ai_client;
pub mod entities;
pub mod event_type;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{clamp01, Casualties, Document, EntitySet, EventLocation, EventRecord};
use ai_client::{DynGenerativeClient, GenerationParams};
use entities::EntityExtractor;
use event_type::classify_event_type;

/// Byte budget for the document body inside the prompt.
const PROMPT_BODY_BUDGET: usize = 12_000;

/// Default cap on documents per batch, bounding total latency of the
/// strictly sequential model stage.
pub const DEFAULT_MAX_DOCUMENTS: usize = 25;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("extract_events_total", "Events successfully extracted.");
        describe_counter!("extract_unparseable_total", "Model responses that failed schema parsing.");
        describe_counter!("extract_model_failures_total", "Model calls that errored or timed out.");
        describe_histogram!("extract_model_ms", "Generative model call duration in milliseconds.");
    });
}

/// Outcome of extracting one document. Parse failures and model failures
/// are tagged outcomes, not errors: the batch continues without them.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Extracted(Box<EventRecord>),
    /// Model responded, but the response did not parse into the schema.
    Unparseable(String),
    /// Model call failed or timed out.
    ModelFailure(String),
}

/// Strict intermediate schema for the model's JSON reply. Every field is
/// optional or defaulted so that validation, not field access, decides
/// what survives.
#[derive(Debug, Default, Deserialize)]
struct RawEventJson {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<RawLocation>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    casualties: Option<RawCasualties>,
    #[serde(default)]
    key_actors: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCasualties {
    #[serde(default)]
    killed: Option<u32>,
    #[serde(default)]
    injured: Option<u32>,
}

/// Derives one EventRecord per document via the generative model.
pub struct EventExtractor {
    model: DynGenerativeClient,
    entity_extractor: Box<dyn EntityExtractor>,
    params: GenerationParams,
    max_documents: usize,
}

impl EventExtractor {
    pub fn new(model: DynGenerativeClient, entity_extractor: Box<dyn EntityExtractor>) -> Self {
        Self {
            model,
            entity_extractor,
            params: GenerationParams::default(),
            max_documents: DEFAULT_MAX_DOCUMENTS,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = max;
        self
    }

    pub fn entity_extractor(&self) -> &dyn EntityExtractor {
        self.entity_extractor.as_ref()
    }

    /// Extract a single event from one document, using its precomputed
    /// entity set for actor cross-referencing.
    pub async fn extract(&self, doc: &Document, entities: &EntitySet) -> ExtractionOutcome {
        ensure_metrics_described();
        let prompt = build_prompt(doc, entities);

        let t0 = std::time::Instant::now();
        let raw = match self.model.generate(&prompt, &self.params).await {
            Ok(raw) => raw,
            Err(e) => {
                counter!("extract_model_failures_total").increment(1);
                warn!(url = %doc.url, error = ?e, "model call failed, skipping document");
                return ExtractionOutcome::ModelFailure(e.to_string());
            }
        };
        histogram!("extract_model_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let parsed: RawEventJson = match serde_json::from_str(strip_code_fences(&raw)) {
            Ok(p) => p,
            Err(e) => {
                counter!("extract_unparseable_total").increment(1);
                warn!(url = %doc.url, error = %e, "unparseable model output, skipping document");
                return ExtractionOutcome::Unparseable(e.to_string());
            }
        };

        counter!("extract_events_total").increment(1);
        ExtractionOutcome::Extracted(Box::new(self.validate(parsed, doc, entities)))
    }

    /// Process documents strictly sequentially. The model is a shared,
    /// low-throughput resource; concurrent calls would not improve
    /// wall-clock time. Capped at `max_documents`.
    pub async fn extract_batch(&self, docs: &[Document]) -> Result<Vec<EventRecord>> {
        let mut events = Vec::new();
        for doc in docs.iter().take(self.max_documents) {
            let entities = self.entity_extractor.extract(&doc.body);
            if let ExtractionOutcome::Extracted(ev) = self.extract(doc, &entities).await {
                events.push(*ev);
            }
        }
        debug!(
            documents = docs.len().min(self.max_documents),
            events = events.len(),
            "extraction batch finished"
        );
        Ok(events)
    }

    fn validate(&self, raw: RawEventJson, doc: &Document, entities: &EntitySet) -> EventRecord {
        let event_type = classify_event_type(&raw.event_type);

        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| doc.title.clone());
        let summary = raw
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| truncate_chars(&doc.body, 280));

        let location = raw
            .location
            .map(|l| EventLocation {
                city: non_empty(l.city),
                region: non_empty(l.region),
                country: non_empty(l.country),
            })
            .unwrap_or_default();

        let occurred_at = raw
            .date
            .as_deref()
            .and_then(parse_event_date)
            .or(doc.published_at);

        let (participants, organizations) = cross_reference_actors(&raw.key_actors, entities);

        let casualties = raw.casualties.and_then(|c| {
            if c.killed.is_none() && c.injured.is_none() {
                None
            } else {
                Some(Casualties {
                    killed: c.killed,
                    injured: c.injured,
                })
            }
        });

        // Missing confidence falls back on the declared severity; absent
        // both, stay neutral.
        let confidence = clamp01(raw.confidence.unwrap_or_else(|| {
            match raw.severity.as_deref().map(str::to_lowercase).as_deref() {
                Some("critical") | Some("high") => 0.75,
                Some("medium") => 0.6,
                Some("low") => 0.45,
                _ => 0.5,
            }
        }));

        EventRecord {
            event_type,
            title,
            summary,
            location,
            occurred_at,
            participants,
            organizations,
            casualties,
            confidence,
            source_url: doc.url.clone(),
        }
    }
}

/// Cross-reference each key actor the model reported against the entity
/// sets: persons become participants, organizations stay organizations,
/// and actors matching neither are discarded rather than guessed.
fn cross_reference_actors(actors: &[String], entities: &EntitySet) -> (Vec<String>, Vec<String>) {
    let mut participants = Vec::new();
    let mut organizations = Vec::new();
    for actor in actors {
        let actor = actor.trim();
        if actor.is_empty() {
            continue;
        }
        if name_in_set(actor, &entities.persons) {
            participants.push(actor.to_string());
        } else if name_in_set(actor, &entities.organizations) {
            organizations.push(actor.to_string());
        }
    }
    (participants, organizations)
}

fn name_in_set(name: &str, set: &[String]) -> bool {
    let name = name.to_lowercase();
    set.iter().any(|candidate| {
        let c = candidate.to_lowercase();
        c == name || c.contains(&name) || name.contains(&c)
    })
}

fn build_prompt(doc: &Document, entities: &EntitySet) -> String {
    let body = truncate_to_char_boundary(&doc.body, PROMPT_BODY_BUDGET);
    format!(
        "Extract the single most significant event from this news article.\n\
         Return ONE JSON object with exactly these fields:\n\
         {{\"event_type\": string (one of BOMBING, SHOOTING, ATTACK, ARMED_CLASH, PROTEST, RIOT, KIDNAPPING, ASSASSINATION, CYBERATTACK, NATURAL_DISASTER, OTHER),\n\
         \"title\": string, \"description\": string,\n\
         \"location\": {{\"city\": string|null, \"region\": string|null, \"country\": string|null}},\n\
         \"date\": string|null (ISO 8601), \"severity\": string|null (low|medium|high|critical),\n\
         \"casualties\": {{\"killed\": number|null, \"injured\": number|null}}|null,\n\
         \"key_actors\": [string], \"confidence\": number (0.0-1.0)}}\n\n\
         Known persons: {persons}\n\
         Known organizations: {orgs}\n\
         Known locations: {locations}\n\
         Date mentions: {dates}\n\n\
         Title: {title}\n\n\
         Article:\n{body}",
        persons = entities.persons.join(", "),
        orgs = entities.organizations.join(", "),
        locations = entities.locations.join(", "),
        dates = entities.dates.join(", "),
        title = doc.title,
    )
}

/// Strip markdown code-fence wrapping if the model added any.
fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Truncate to at most `max_bytes` bytes at a char boundary.
fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

fn parse_event_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{DateTime, NaiveDate, Utc};
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}
