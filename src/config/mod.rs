//! Configuration management.
//!
//! Configuration is assembled from defaults, builder methods, and
//! environment variables. Environment overrides use the `FABLEGRAPH_`
//! prefix, except the provider API key which follows the provider's own
//! convention (`ANTHROPIC_API_KEY`).

use crate::extraction::ExtractionStrategy;
use std::path::PathBuf;

/// Default per-job wall-clock timeout in milliseconds.
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 120_000;
/// Default per-project lock acquisition timeout in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;
/// Default cap on scenes accepted by one batch request.
pub const DEFAULT_BATCH_CAP: usize = 500;
/// Default estimated-cost threshold (USD) above which paid batch
/// extraction requires explicit confirmation.
pub const DEFAULT_COST_THRESHOLD_USD: f64 = 1.0;
/// Default confidence below which extraction candidates are dropped.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding per-project graph documents.
    pub data_dir: PathBuf,
    /// Extraction and job orchestration settings.
    pub extraction: ExtractionConfig,
    /// LLM provider settings.
    pub llm: LlmConfig,
}

/// Extraction pipeline and orchestrator settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Strategy used when a request does not name one.
    pub default_strategy: ExtractionStrategy,
    /// Wall-clock budget for a single extraction job, in milliseconds.
    pub job_timeout_ms: u64,
    /// How long a job waits for the per-project lock before failing
    /// with a concurrency error, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Maximum scenes accepted by one batch request; the excess is
    /// reported back as skipped.
    pub batch_cap: usize,
    /// Estimated batch cost (USD) above which paid strategies require
    /// confirmation before any job starts.
    pub cost_threshold_usd: f64,
    /// Extraction candidates below this confidence are dropped before
    /// merging into the graph.
    pub min_confidence: f32,
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier sent to the provider.
    pub model: String,
    /// API key. Read from `ANTHROPIC_API_KEY` when absent.
    pub api_key: Option<String>,
    /// Override for the provider base URL (self-hosted gateways).
    pub base_url: Option<String>,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum tokens requested per completion.
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_strategy: ExtractionStrategy::Semantic,
            job_timeout_ms: DEFAULT_JOB_TIMEOUT_MS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            batch_cap: DEFAULT_BATCH_CAP,
            cost_threshold_usd: DEFAULT_COST_THRESHOLD_USD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: None,
            base_url: None,
            request_timeout_ms: 60_000,
            max_tokens: 4096,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fablegraph"),
            extraction: ExtractionConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the environment, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// Recognized variables:
    /// - `FABLEGRAPH_DATA_DIR`
    /// - `FABLEGRAPH_MODEL`
    /// - `FABLEGRAPH_STRATEGY`
    /// - `FABLEGRAPH_JOB_TIMEOUT_MS`
    /// - `FABLEGRAPH_BATCH_CAP`
    /// - `FABLEGRAPH_COST_THRESHOLD_USD`
    /// - `ANTHROPIC_API_KEY`
    /// - `ANTHROPIC_BASE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FABLEGRAPH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("FABLEGRAPH_MODEL") {
            config.llm.model = model;
        }
        if let Ok(strategy) = std::env::var("FABLEGRAPH_STRATEGY") {
            if let Ok(parsed) = strategy.parse() {
                config.extraction.default_strategy = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("FABLEGRAPH_JOB_TIMEOUT_MS") {
            if let Ok(parsed) = timeout.parse() {
                config.extraction.job_timeout_ms = parsed;
            }
        }
        if let Ok(cap) = std::env::var("FABLEGRAPH_BATCH_CAP") {
            if let Ok(parsed) = cap.parse() {
                config.extraction.batch_cap = parsed;
            }
        }
        if let Ok(threshold) = std::env::var("FABLEGRAPH_COST_THRESHOLD_USD") {
            if let Ok(parsed) = threshold.parse() {
                config.extraction.cost_threshold_usd = parsed;
            }
        }
        if let Ok(confidence) = std::env::var("FABLEGRAPH_MIN_CONFIDENCE") {
            if let Ok(parsed) = confidence.parse() {
                config.extraction.min_confidence = parsed;
            }
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
            config.llm.base_url = Some(url);
        }

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the default extraction strategy.
    #[must_use]
    pub const fn with_default_strategy(mut self, strategy: ExtractionStrategy) -> Self {
        self.extraction.default_strategy = strategy;
        self
    }

    /// Sets the per-job timeout.
    #[must_use]
    pub const fn with_job_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.extraction.job_timeout_ms = timeout_ms;
        self
    }

    /// Sets the batch scene cap.
    #[must_use]
    pub const fn with_batch_cap(mut self, cap: usize) -> Self {
        self.extraction.batch_cap = cap;
        self
    }

    /// Sets the cost confirmation threshold.
    #[must_use]
    pub const fn with_cost_threshold_usd(mut self, threshold: f64) -> Self {
        self.extraction.cost_threshold_usd = threshold;
        self
    }

    /// Sets the minimum extraction candidate confidence.
    #[must_use]
    pub const fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.extraction.min_confidence = threshold;
        self
    }

    /// Sets the LLM model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.llm.model = model.into();
        self
    }
}
