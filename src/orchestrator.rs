// src/orchestrator.rs
//! End-to-end search pipeline: scrape → extract → rank, either as one
//! batch run or as an incremental, cancellable stream.
//!
//! Cancellation is cooperative: the session flag is polled before each
//! source, before each document, and before/after each model call, so the
//! cancellation latency is bounded by at most one outstanding fetch or
//! model call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::extract::{EventExtractor, ExtractionOutcome};
use crate::matcher::QueryMatcher;
use crate::scrape::ScraperManager;
use crate::session::{Session, SessionState};
use crate::sources::{LimitOverrides, SourceSpec};
use crate::types::{Query, SearchReport, SearchStatus, StreamMessage};

pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 300;
/// Bounded channel between the producer task and the transport consumer.
const STREAM_CHANNEL_CAPACITY: usize = 16;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("search_runs_total", "Search pipeline runs started.");
        describe_counter!("search_cancelled_total", "Streaming runs stopped by cancellation.");
        describe_histogram!("search_run_ms", "Full pipeline run duration in milliseconds.");
    });
}

/// Anonymized query fingerprint for logs (never log raw query text).
fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

/// Drives the retrieval → extraction → ranking → streaming pipeline.
pub struct SearchOrchestrator {
    scraper: Arc<ScraperManager>,
    extractor: Arc<EventExtractor>,
    matcher: QueryMatcher,
    sources: Vec<SourceSpec>,
    pipeline_timeout: Duration,
}

impl SearchOrchestrator {
    pub fn new(
        scraper: Arc<ScraperManager>,
        extractor: Arc<EventExtractor>,
        matcher: QueryMatcher,
        sources: Vec<SourceSpec>,
    ) -> Self {
        Self {
            scraper,
            extractor,
            matcher,
            sources,
            pipeline_timeout: Duration::from_secs(DEFAULT_PIPELINE_TIMEOUT_SECS),
        }
    }

    pub fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    /// Run the pipeline to completion and return one aggregate result.
    /// Zero-result conditions are statuses; unexpected failures are caught
    /// here and converted, never propagated as raw faults.
    pub async fn search(&self, query: &Query) -> SearchReport {
        ensure_metrics_described();
        counter!("search_runs_total").increment(1);
        let t0 = Instant::now();
        info!(query = %anon_hash(&query.phrase), "batch search started");

        let outcome = tokio::time::timeout(self.pipeline_timeout, self.run_batch(query)).await;
        let mut report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(error = ?e, "search pipeline failed");
                error_report(format!("{e:#}"))
            }
            Err(_) => {
                warn!(timeout = ?self.pipeline_timeout, "search pipeline timed out");
                error_report(format!(
                    "pipeline timed out after {}s",
                    self.pipeline_timeout.as_secs()
                ))
            }
        };
        report.elapsed_ms = t0.elapsed().as_millis() as u64;
        histogram!("search_run_ms").record(report.elapsed_ms as f64);
        report
    }

    async fn run_batch(&self, query: &Query) -> Result<SearchReport> {
        if self.sources.is_empty() {
            return Ok(status_report(SearchStatus::NoSources, 0, 0));
        }

        let docs = self.scraper.scrape_sources(&self.sources, &query.phrase).await;
        let sources_searched = self.sources.len();
        if docs.is_empty() {
            return Ok(status_report(SearchStatus::NoArticles, 0, sources_searched));
        }

        let events = self.extractor.extract_batch(&docs).await?;
        if events.is_empty() {
            return Ok(status_report(
                SearchStatus::NoEvents,
                docs.len(),
                sources_searched,
            ));
        }

        let ranked = self.matcher.match_events(events, query);
        if ranked.is_empty() {
            return Ok(status_report(
                SearchStatus::NoEvents,
                docs.len(),
                sources_searched,
            ));
        }

        Ok(SearchReport {
            status: SearchStatus::Success,
            total_events: ranked.len(),
            articles_processed: docs.len(),
            sources_searched,
            elapsed_ms: 0,
            events: ranked,
            message: None,
        })
    }

    /// Start the incremental pipeline for `session`. Messages arrive on the
    /// returned receiver; events above threshold are also appended to the
    /// session, so partial results survive cancellation and errors.
    pub fn search_stream(self: Arc<Self>, session: Arc<Session>) -> mpsc::Receiver<StreamMessage> {
        ensure_metrics_described();
        counter!("search_runs_total").increment(1);
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let orchestrator = self;
        tokio::spawn(async move {
            orchestrator.run_stream(session, tx).await;
        });
        rx
    }

    async fn run_stream(&self, session: Arc<Session>, tx: mpsc::Sender<StreamMessage>) {
        let sid = session.id.clone();
        info!(session_id = %sid, query = %anon_hash(&session.query.phrase), "streaming search started");

        match self.stream_inner(&session, &tx).await {
            Ok(StreamEnd::Completed(count)) => {
                let _ = tx
                    .send(StreamMessage::Complete {
                        session_id: sid,
                        total_events: count,
                    })
                    .await;
                session.finish(SessionState::Completed);
            }
            Ok(StreamEnd::Cancelled(count)) => {
                counter!("search_cancelled_total").increment(1);
                let _ = tx
                    .send(StreamMessage::Cancelled {
                        session_id: sid,
                        events_emitted: count,
                    })
                    .await;
                session.finish(SessionState::Cancelled);
            }
            Ok(StreamEnd::ConsumerGone) => {
                // Transport hung up; nothing left to emit to.
                session.finish(SessionState::Completed);
            }
            Err(e) => {
                error!(session_id = %sid, error = ?e, "streaming pipeline failed");
                let _ = tx
                    .send(StreamMessage::Error {
                        session_id: sid,
                        message: format!("{e:#}"),
                    })
                    .await;
                session.finish(SessionState::Failed);
            }
        }
    }

    async fn stream_inner(
        &self,
        session: &Arc<Session>,
        tx: &mpsc::Sender<StreamMessage>,
    ) -> Result<StreamEnd> {
        let sid = &session.id;
        let query = session.query.clone();
        let deadline = Instant::now() + self.pipeline_timeout;
        let mut emitted = 0usize;

        for spec in &self.sources {
            // Checkpoint: before starting the next source.
            if session.cancel_requested() {
                return Ok(StreamEnd::Cancelled(emitted));
            }

            let docs = match self
                .scraper
                .scrape_search_results(spec, &query.phrase, &LimitOverrides::default())
                .await
            {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(source = %spec.id, error = ?e, "source failed, continuing with the rest");
                    continue;
                }
            };

            let total = docs.len();
            for (idx, doc) in docs.iter().enumerate() {
                let percent = if total == 0 {
                    100
                } else {
                    ((idx * 100) / total) as u8
                };
                let progress = StreamMessage::Progress {
                    session_id: sid.clone(),
                    current: idx + 1,
                    total,
                    percent,
                    status: format!("processing article {} of {} from {}", idx + 1, total, spec.id),
                };
                if tx.send(progress).await.is_err() {
                    return Ok(StreamEnd::ConsumerGone);
                }

                // Checkpoint: before starting the next document / model call.
                if session.cancel_requested() {
                    return Ok(StreamEnd::Cancelled(emitted));
                }
                if Instant::now() >= deadline {
                    anyhow::bail!(
                        "pipeline timed out after {}s",
                        self.pipeline_timeout.as_secs()
                    );
                }

                let entities = self.extractor.entity_extractor().extract(&doc.body);
                let outcome = self.extractor.extract(doc, &entities).await;

                // Checkpoint: after the model call. An in-flight call ran to
                // completion; its result is simply not emitted.
                if session.cancel_requested() {
                    return Ok(StreamEnd::Cancelled(emitted));
                }

                let event = match outcome {
                    ExtractionOutcome::Extracted(ev) => *ev,
                    ExtractionOutcome::Unparseable(_) | ExtractionOutcome::ModelFailure(_) => {
                        continue;
                    }
                };

                if let Some(ranked) = self.matcher.score_one(event, &query) {
                    session.append_event(ranked.clone());
                    emitted += 1;
                    let msg = StreamMessage::Event {
                        session_id: sid.clone(),
                        event: ranked,
                    };
                    if tx.send(msg).await.is_err() {
                        return Ok(StreamEnd::ConsumerGone);
                    }
                }
            }
        }

        Ok(StreamEnd::Completed(emitted))
    }
}

enum StreamEnd {
    Completed(usize),
    Cancelled(usize),
    ConsumerGone,
}

fn status_report(status: SearchStatus, articles: usize, sources: usize) -> SearchReport {
    SearchReport {
        status,
        total_events: 0,
        articles_processed: articles,
        sources_searched: sources,
        elapsed_ms: 0,
        events: Vec::new(),
        message: None,
    }
}

fn error_report(message: String) -> SearchReport {
    SearchReport {
        status: SearchStatus::Error,
        total_events: 0,
        articles_processed: 0,
        sources_searched: 0,
        elapsed_ms: 0,
        events: Vec::new(),
        message: Some(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("protest in Mumbai");
        let b = anon_hash("protest in Mumbai");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
        assert_ne!(a, anon_hash("something else"));
    }

    #[tokio::test]
    async fn empty_source_list_reports_no_sources() {
        let scraper = Arc::new(ScraperManager::new().unwrap());
        let extractor = Arc::new(EventExtractor::new(
            Arc::new(crate::extract::ai_client::MockClient::new("{}")),
            Box::new(crate::extract::entities::RegexEntityExtractor),
        ));
        let orch = SearchOrchestrator::new(scraper, extractor, QueryMatcher::default(), vec![]);
        let report = orch.search(&Query::new("anything")).await;
        assert_eq!(report.status, SearchStatus::NoSources);
        assert_eq!(report.total_events, 0);
    }
}
