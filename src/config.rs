use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use study_forge_core::models::{ContentKind, SkillLevel};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_request_timeout_secs() -> u64 {
    180
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL. Defaults to the provider's public endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Cap on simultaneous outbound model calls.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: default_api_key_env(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_max_concurrency() -> usize {
    4
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Sampling and timeout parameters for one content kind.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct CallParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl CallParams {
    const fn new(temperature: f32, max_tokens: u32, timeout_secs: u64) -> Self {
        Self {
            temperature,
            max_tokens,
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GenerationConfig {
    pub summary: CallParams,
    pub study_guide: CallParams,
    pub key_concepts: CallParams,
    pub quiz: CallParams,
    pub explanation: CallParams,
    pub adjustment: CallParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            summary: CallParams::new(0.7, 1500, 60),
            study_guide: CallParams::new(0.5, 3000, 120),
            key_concepts: CallParams::new(0.4, 2000, 120),
            quiz: CallParams::new(0.2, 3000, 120),
            explanation: CallParams::new(0.5, 1500, 60),
            adjustment: CallParams::new(0.3, 3000, 90),
        }
    }
}

impl GenerationConfig {
    pub fn params(&self, kind: ContentKind) -> CallParams {
        match kind {
            ContentKind::Summary => self.summary,
            ContentKind::StudyGuideSection => self.study_guide,
            ContentKind::KeyConcepts => self.key_concepts,
            ContentKind::QuizSection => self.quiz,
            ContentKind::Explanation => self.explanation,
            ContentKind::DifficultyAdjustment => self.adjustment,
        }
    }

    fn all(&self) -> [(&'static str, CallParams); 6] {
        [
            ("summary", self.summary),
            ("study_guide", self.study_guide),
            ("key_concepts", self.key_concepts),
            ("quiz", self.quiz),
            ("explanation", self.explanation),
            ("adjustment", self.adjustment),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub summary_chunk_size: usize,
    pub summary_overlap: usize,
    pub guide_chunk_size: usize,
    pub guide_overlap: usize,
    pub quiz_section_count: usize,
    pub default_question_count: usize,
    pub max_question_count: usize,
    /// Attempts per quiz section before the run fails.
    pub max_attempts: u32,
    /// Documents longer than this are clipped and flagged as truncated.
    pub max_document_chars: usize,
    /// Concurrent study-guide section calls per request.
    pub guide_concurrency: usize,
    /// Generate at `base_level` and rewrite to the requested level.
    pub adjust_difficulty: bool,
    pub base_level: SkillLevel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            summary_chunk_size: 4000,
            summary_overlap: 200,
            guide_chunk_size: 8000,
            guide_overlap: 400,
            quiz_section_count: 3,
            default_question_count: 10,
            max_question_count: 50,
            max_attempts: 3,
            max_document_chars: 100_000,
            guide_concurrency: 3,
            adjust_difficulty: false,
            base_level: SkillLevel::Intermediate,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let p = &config.pipeline;

    for (name, size, overlap) in [
        ("summary", p.summary_chunk_size, p.summary_overlap),
        ("guide", p.guide_chunk_size, p.guide_overlap),
    ] {
        if size == 0 {
            anyhow::bail!("pipeline.{}_chunk_size must be > 0", name);
        }
        if overlap >= size {
            anyhow::bail!(
                "pipeline.{}_overlap ({}) must be smaller than pipeline.{}_chunk_size ({})",
                name,
                overlap,
                name,
                size
            );
        }
    }

    if p.quiz_section_count == 0 {
        anyhow::bail!("pipeline.quiz_section_count must be >= 1");
    }
    if p.max_attempts == 0 {
        anyhow::bail!("pipeline.max_attempts must be >= 1");
    }
    if p.default_question_count == 0 || p.default_question_count > p.max_question_count {
        anyhow::bail!(
            "pipeline.default_question_count must be in [1, {}]",
            p.max_question_count
        );
    }
    if p.guide_concurrency == 0 {
        anyhow::bail!("pipeline.guide_concurrency must be >= 1");
    }
    if p.max_document_chars == 0 {
        anyhow::bail!("pipeline.max_document_chars must be > 0");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if config.model.max_concurrency == 0 {
        anyhow::bail!("model.max_concurrency must be >= 1");
    }

    for (name, params) in config.generation.all() {
        if !(0.0..=2.0).contains(&params.temperature) {
            anyhow::bail!("generation.{}.temperature must be in [0.0, 2.0]", name);
        }
        if params.timeout_secs == 0 {
            anyhow::bail!("generation.{}.timeout_secs must be > 0", name);
        }
    }

    match config.model.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.model.model.is_none() {
                anyhow::bail!(
                    "model.model must be specified when provider is '{}'",
                    config.model.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("logging.format must be pretty or json, got '{}'", other),
    }

    Ok(())
}
