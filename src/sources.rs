// src/sources.rs
//! Source configuration: which news sites to search, their selector lists,
//! per-domain delays, and result limits. Supports TOML or JSON formats.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const ENV_PATH: &str = "SOURCES_CONFIG_PATH";

pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 10;
pub const DEFAULT_MAX_ARTICLES_TO_PROCESS: usize = 5;
pub const DEFAULT_MIN_DELAY_MS: u64 = 1_000;

fn default_min_delay_ms() -> u64 {
    DEFAULT_MIN_DELAY_MS
}
fn default_max_search_results() -> usize {
    DEFAULT_MAX_SEARCH_RESULTS
}
fn default_max_articles() -> usize {
    DEFAULT_MAX_ARTICLES_TO_PROCESS
}
fn default_link_selector() -> String {
    "a[href]".to_string()
}
fn default_enabled() -> bool {
    true
}

/// One configured news source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSpec {
    /// Short identifier, e.g. "reuters".
    pub id: String,
    pub base_url: String,
    /// Search URL template; `{query}` is replaced with the URL-encoded phrase.
    pub search_url: String,
    /// Comma-separated CSS selector priority list for candidate links on the
    /// search page.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Comma-separated CSS selector priority list for the article body.
    /// Empty means: use the generic heading+paragraph fallback.
    #[serde(default)]
    pub content_selectors: String,
    /// Comma-separated CSS selector priority list for the article title.
    #[serde(default)]
    pub title_selectors: String,
    /// Minimum interval between fetches against this source's domain.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    #[serde(default = "default_max_articles")]
    pub max_articles_to_process: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SourceSpec {
    /// Enforce `max_search_results >= max_articles_to_process`. A violation
    /// sets both to the larger value.
    pub fn enforce_limit_invariant(&mut self) {
        if self.max_search_results < self.max_articles_to_process {
            let larger = self.max_articles_to_process.max(self.max_search_results);
            warn!(
                source = %self.id,
                max_search_results = self.max_search_results,
                max_articles = self.max_articles_to_process,
                "max_search_results < max_articles_to_process, correcting both to the larger value"
            );
            self.max_search_results = larger;
            self.max_articles_to_process = larger;
        }
    }

    /// Resolve effective `(max_search_results, max_articles_to_process)`:
    /// explicit override > SourceSpec value > global default, then the
    /// invariant is re-applied to the resolved pair.
    pub fn effective_limits(&self, overrides: &LimitOverrides) -> (usize, usize) {
        let mut results = overrides.max_search_results.unwrap_or(self.max_search_results);
        let mut articles = overrides
            .max_articles_to_process
            .unwrap_or(self.max_articles_to_process);
        if results < articles {
            let larger = results.max(articles);
            results = larger;
            articles = larger;
        }
        (results, articles)
    }
}

/// Per-call limit overrides, highest priority in the resolution chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimitOverrides {
    pub max_search_results: Option<usize>,
    pub max_articles_to_process: Option<usize>,
}

/// The full source configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

impl SourcesConfig {
    pub fn enabled(&self) -> Vec<SourceSpec> {
        self.sources.iter().filter(|s| s.enabled).cloned().collect()
    }
}

/// Load source config from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load source config using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<SourcesConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("SOURCES_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(SourcesConfig::default())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesConfig> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(cfg) = parse_toml(s) {
            return Ok(cfg);
        }
    }
    if let Ok(cfg) = parse_json(s) {
        return Ok(cfg);
    }
    if !try_toml {
        if let Ok(cfg) = parse_toml(s) {
            return Ok(cfg);
        }
    }
    Err(anyhow!("unsupported sources config format"))
}

fn parse_toml(s: &str) -> Result<SourcesConfig> {
    let mut cfg: SourcesConfig = toml::from_str(s)?;
    sanitize(&mut cfg);
    Ok(cfg)
}

fn parse_json(s: &str) -> Result<SourcesConfig> {
    let mut cfg: SourcesConfig = serde_json::from_str(s)?;
    sanitize(&mut cfg);
    Ok(cfg)
}

fn sanitize(cfg: &mut SourcesConfig) {
    for spec in &mut cfg.sources {
        spec.id = spec.id.trim().to_string();
        spec.enforce_limit_invariant();
    }
    cfg.sources.retain(|s| !s.id.is_empty());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(results: usize, articles: usize) -> SourceSpec {
        SourceSpec {
            id: "test".into(),
            base_url: "https://news.example.com".into(),
            search_url: "https://news.example.com/search?q={query}".into(),
            link_selector: default_link_selector(),
            content_selectors: String::new(),
            title_selectors: String::new(),
            min_delay_ms: 10,
            max_search_results: results,
            max_articles_to_process: articles,
            enabled: true,
        }
    }

    #[test]
    fn limit_invariant_corrects_to_larger_value() {
        let mut s = spec(3, 5);
        s.enforce_limit_invariant();
        assert_eq!(
            (s.max_search_results, s.max_articles_to_process),
            (5, 5)
        );

        // Already valid pair is untouched.
        let mut ok = spec(10, 4);
        ok.enforce_limit_invariant();
        assert_eq!((ok.max_search_results, ok.max_articles_to_process), (10, 4));
    }

    #[test]
    fn effective_limits_prefer_override_then_spec() {
        let s = spec(10, 4);
        let none = LimitOverrides::default();
        assert_eq!(s.effective_limits(&none), (10, 4));

        let ov = LimitOverrides {
            max_search_results: Some(2),
            max_articles_to_process: None,
        };
        // Override pulls results below articles; invariant re-applies.
        assert_eq!(s.effective_limits(&ov), (4, 4));

        let both = LimitOverrides {
            max_search_results: Some(8),
            max_articles_to_process: Some(3),
        };
        assert_eq!(s.effective_limits(&both), (8, 3));
    }

    #[test]
    fn toml_and_json_formats_parse_and_sanitize() {
        let toml_src = r#"
            [[sources]]
            id = " local-news "
            base_url = "https://news.example.com"
            search_url = "https://news.example.com/search?q={query}"
            max_search_results = 3
            max_articles_to_process = 5
        "#;
        let cfg = parse_sources(toml_src, "toml").unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert_eq!(cfg.sources[0].id, "local-news");
        assert_eq!(cfg.sources[0].max_search_results, 5);
        assert_eq!(cfg.sources[0].max_articles_to_process, 5);
        assert!(cfg.sources[0].enabled);

        let json_src = r#"{"sources":[{"id":"wire","base_url":"https://w.example.com","search_url":"https://w.example.com/s?q={query}","enabled":false}]}"#;
        let cfg = parse_sources(json_src, "json").unwrap();
        assert_eq!(cfg.sources.len(), 1);
        assert!(!cfg.sources[0].enabled);
        assert!(cfg.enabled().is_empty());
    }
}
