// src/scrape/mod.rs
//! Fetch-with-retry, link discovery, and per-source scrape orchestration,
//! built on the per-domain rate limiter and the content extractor.

pub mod content;
pub mod rate_limiter;

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::sources::{LimitOverrides, SourceSpec};
use crate::types::Document;
use rate_limiter::RateLimiter;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
/// Total attempts per URL, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Minimum character count for an article body to count as real content.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 200;

const USER_AGENT: &str = concat!("news-event-search/", env!("CARGO_PKG_VERSION"));

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("scrape_fetch_retries_total", "Fetch attempts retried after timeout/5xx.");
        describe_counter!("scrape_fetch_failures_total", "Fetches that failed terminally.");
        describe_counter!("scrape_documents_total", "Documents successfully scraped.");
        describe_counter!("scrape_invalid_content_total", "Pages discarded by the content gate.");
        describe_counter!("scrape_source_errors_total", "Sources that failed wholesale.");
        describe_histogram!("scrape_fetch_ms", "Single fetch duration in milliseconds.");
    });
}

/// Fetch orchestration for all configured sources.
pub struct ScraperManager {
    client: reqwest::Client,
    limiter: RateLimiter,
    max_attempts: u32,
    min_content_chars: usize,
}

impl ScraperManager {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// `fetch_timeout` is the per-fetch network timeout; retries and the
    /// pipeline deadline are layered on top of it, independently.
    pub fn with_timeout(fetch_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(4).min(fetch_timeout))
            .timeout(fetch_timeout)
            .build()
            .context("building scrape HTTP client")?;
        Ok(Self {
            client,
            limiter: RateLimiter::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch `url` with per-domain rate limiting and bounded retries.
    ///
    /// Timeouts and HTTP 5xx retry with backoff `min_delay * 2^(attempt-1)`;
    /// HTTP 4xx is terminal for this URL with no retry. Never returns empty
    /// markup as success.
    pub async fn fetch_url(
        &self,
        url: &str,
        headers: &[(String, String)],
        min_delay: Duration,
    ) -> Result<String> {
        ensure_metrics_described();
        let domain = domain_of(url)?;

        let mut attempt: u32 = 1;
        loop {
            self.limiter.wait_if_needed(&domain, min_delay).await;

            let t0 = std::time::Instant::now();
            let mut req = self.client.get(url);
            for (k, v) in headers {
                req = req.header(k.as_str(), v.as_str());
            }
            let outcome = req.send().await;
            histogram!("scrape_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp
                            .text()
                            .await
                            .with_context(|| format!("reading body of {url}"))?;
                        if body.trim().is_empty() {
                            counter!("scrape_fetch_failures_total").increment(1);
                            bail!("empty response body from {url}");
                        }
                        return Ok(body);
                    }
                    if status.is_client_error() {
                        // Auth/not-found/forbidden are terminal, not transient.
                        counter!("scrape_fetch_failures_total").increment(1);
                        bail!("terminal HTTP {status} fetching {url}");
                    }
                    if attempt >= self.max_attempts {
                        counter!("scrape_fetch_failures_total").increment(1);
                        bail!("HTTP {status} fetching {url} after {attempt} attempts");
                    }
                    debug!(%url, %status, attempt, "retryable HTTP status");
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        counter!("scrape_fetch_failures_total").increment(1);
                        return Err(anyhow!(e))
                            .with_context(|| format!("fetching {url} after {attempt} attempts"));
                    }
                    debug!(%url, error = %e, attempt, "retryable fetch error");
                }
            }

            // Exponential backoff anchored to the domain's own rate limit.
            let backoff = min_delay * 2u32.saturating_pow(attempt - 1);
            counter!("scrape_fetch_retries_total").increment(1);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Scrape one source: fetch its search page for `phrase`, resolve up to
    /// `max_search_results` candidate links, then fetch and extract up to
    /// `max_articles_to_process` of them as Documents. Pages failing the
    /// content gate are skipped, not fatal.
    pub async fn scrape_search_results(
        &self,
        spec: &SourceSpec,
        phrase: &str,
        overrides: &LimitOverrides,
    ) -> Result<Vec<Document>> {
        ensure_metrics_described();
        let (max_results, max_articles) = spec.effective_limits(overrides);
        let min_delay = Duration::from_millis(spec.min_delay_ms);

        let search_url = spec.search_url.replace("{query}", &encode_query(phrase));
        let html = self
            .fetch_url(&search_url, &[], min_delay)
            .await
            .with_context(|| format!("fetching search page for source {}", spec.id))?;

        let base = Url::parse(&spec.base_url)
            .with_context(|| format!("invalid base_url for source {}", spec.id))?;
        let mut links = content::extract_links(&html, &spec.link_selector, &base);
        links.truncate(max_results);
        debug!(source = %spec.id, candidates = links.len(), "search page scraped");

        let mut docs = Vec::new();
        for link in &links {
            if docs.len() >= max_articles {
                break;
            }
            match self.fetch_article(spec, link, min_delay).await {
                Ok(Some(doc)) => {
                    counter!("scrape_documents_total").increment(1);
                    docs.push(doc);
                }
                Ok(None) => {
                    counter!("scrape_invalid_content_total").increment(1);
                }
                Err(e) => {
                    // One bad article never aborts the source.
                    warn!(source = %spec.id, url = %link, error = ?e, "article fetch failed");
                }
            }
        }
        Ok(docs)
    }

    /// Scrape every spec, accumulating Documents. A failing source logs a
    /// warning and does not abort the others; partial results are returned.
    pub async fn scrape_sources(&self, specs: &[SourceSpec], phrase: &str) -> Vec<Document> {
        let mut all = Vec::new();
        for spec in specs {
            match self
                .scrape_search_results(spec, phrase, &LimitOverrides::default())
                .await
            {
                Ok(mut docs) => all.append(&mut docs),
                Err(e) => {
                    warn!(source = %spec.id, error = ?e, "source failed, continuing with the rest");
                    counter!("scrape_source_errors_total").increment(1);
                }
            }
        }
        all
    }

    async fn fetch_article(
        &self,
        spec: &SourceSpec,
        url: &str,
        min_delay: Duration,
    ) -> Result<Option<Document>> {
        let html = self.fetch_url(url, &[], min_delay).await?;

        let body = if spec.content_selectors.trim().is_empty() {
            content::extract_generic(&html)
        } else {
            content::extract_by_selectors(&html, &spec.content_selectors)
                .or_else(|| content::extract_generic(&html))
        };
        let Some(body) = body else {
            return Ok(None);
        };
        if !content::is_valid_content(&body, self.min_content_chars) {
            return Ok(None);
        }

        let title = content::extract_title(&html, &spec.title_selectors)
            .unwrap_or_else(|| url.to_string());

        Ok(Some(Document {
            title,
            body,
            url: url.to_string(),
            source: spec.id.clone(),
            published_at: content::extract_published(&html),
        }))
    }
}

fn domain_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("invalid URL {url}"))?;
    parsed
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| anyhow!("URL {url} has no host"))
}

fn encode_query(phrase: &str) -> String {
    url::form_urlencoded::byte_serialize(phrase.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction() {
        assert_eq!(domain_of("https://news.example.com/a/b").unwrap(), "news.example.com");
        assert!(domain_of("not a url").is_err());
    }

    #[test]
    fn query_encoding_escapes_spaces() {
        assert_eq!(encode_query("protest in Mumbai"), "protest+in+Mumbai");
    }
}
