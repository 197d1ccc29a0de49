// src/extract/ai_client.rs
//! Generative model adapter: provider abstraction, OpenAI provider, a
//! disabled client, and a deterministic mock for tests.
//!
//! The pipeline treats the model as an opaque, possibly-slow,
//! possibly-failing function from prompt to raw text.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling parameters for one generation call. Extraction wants
/// determinism over creativity, hence the low default temperature.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-model-call timeout, enforced independently of the network layer.
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Trait object used by the extractor and tests.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Run one generation call. Errors cover transport failures, non-2xx
    /// provider responses, and the per-call timeout.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynGenerativeClient = Arc<dyn GenerativeClient>;

/// Model config loaded from `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" (others may be added later)
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.1
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".into(),
            model: default_model(),
            api_key: default_api_key(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading ai config from {}", path.as_ref().display()))?;
        let mut cfg: AiConfig = serde_json::from_str(&data).context("parsing ai config")?;

        cfg.provider = cfg.provider.to_lowercase();

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                other => bail!("Unsupported provider in config: {other}"),
            };
        }

        if !(0.0..=2.0).contains(&cfg.temperature) {
            cfg.temperature = default_temperature();
        }
        if cfg.max_tokens == 0 {
            cfg.max_tokens = default_max_tokens();
        }
        Ok(cfg)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Factory: build a client according to config and environment.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the configured provider.
pub fn build_client_from_config(config: &AiConfig) -> DynGenerativeClient {
    if std::env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false) {
        return Arc::new(MockClient::new(r#"{"event_type":"OTHER","title":"Mock event","description":"Deterministic mock output.","confidence":0.5}"#));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => Arc::new(OpenAiClient::new(&config.api_key, &config.model)),
        _ => Arc::new(DisabledClient),
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are a precise information extraction engine. \
Respond with exactly the single JSON object requested, no prose, no markdown.";

/// OpenAI provider (Chat Completions API).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-event-search/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl GenerativeClient for OpenAiClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("OpenAI API key not configured");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let send = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send();

        let resp = tokio::time::timeout(params.timeout, send)
            .await
            .map_err(|_| anyhow!("model call timed out after {:?}", params.timeout))?
            .context("model request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("model provider returned HTTP {status}");
        }
        let body: Resp = resp.json().await.context("decoding model response")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            bail!("model returned an empty completion");
        }
        Ok(content)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; used when the model is disabled. Documents then skip
/// extraction rather than the pipeline aborting.
pub struct DisabledClient;

#[async_trait]
impl GenerativeClient for DisabledClient {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        bail!("generative model is disabled")
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed-output mock for tests and local runs.
#[derive(Clone)]
pub struct MockClient {
    fixed: String,
}

impl MockClient {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self { fixed: fixed.into() }
    }
}

#[async_trait]
impl GenerativeClient for MockClient {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        Ok(self.fixed.clone())
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_client_returns_fixed_output() {
        let client = MockClient::new("{\"x\":1}");
        let out = client
            .generate("anything", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out, "{\"x\":1}");
    }

    #[tokio::test]
    async fn disabled_client_always_errors() {
        let client = DisabledClient;
        assert!(client
            .generate("anything", &GenerationParams::default())
            .await
            .is_err());
    }
}
