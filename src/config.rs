//! Configuration for the RAG server and the evaluation harness.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Generation Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name used for answer synthesis
    pub model: String,

    /// Maximum tokens for a response
    pub max_tokens: u32,

    /// Temperature for answer synthesis
    pub temperature: f32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Index Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the Index Service
    pub base_url: String,

    /// Number of chunks retrieved per question
    pub top_k: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8100".to_string(),
            top_k: 2,
            timeout_secs: 120,
        }
    }
}

/// Prompt used for answer synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// Context and question only.
    Baseline,
    /// Grounding, language, and refusal rules.
    Improved,
}

impl FromStr for PromptStyle {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "improved" => Ok(Self::Improved),
            other => Err(RagError::Config(format!("Unknown prompt style: {}", other))),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Directory uploads are staged in before indexing
    pub data_dir: PathBuf,

    /// Static chat page served at `/`
    pub chat_page: PathBuf,

    pub prompt_style: PromptStyle,

    /// Language the answers must be written in
    pub language: String,

    /// Token budget for one synthesis prompt
    pub context_window: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            data_dir: PathBuf::from("data"),
            chat_page: PathBuf::from("chat_interface.html"),
            prompt_style: PromptStyle::Improved,
            language: "Deutsch".to_string(),
            context_window: 3000,
        }
    }
}

/// Evaluation harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Base URL of the running Query Service
    pub base_url: String,

    /// Golden dataset (semicolon-delimited CSV)
    pub dataset_path: PathBuf,

    /// Report path for keyword runs
    pub keyword_output_path: PathBuf,

    /// Report path for judge runs
    pub judge_output_path: PathBuf,

    /// Model used by the semantic judge
    pub judge_model: String,

    /// Minimum spacing between judge calls in milliseconds
    pub delay_ms: u64,

    /// Timeout for one question in seconds
    pub request_timeout_secs: u64,

    /// Timeout for the pre-flight probe in seconds
    pub preflight_timeout_secs: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            dataset_path: PathBuf::from("cloudbase-testfragen.csv"),
            keyword_output_path: PathBuf::from("evaluation_results.csv"),
            judge_output_path: PathBuf::from("evaluation_results_llm.csv"),
            judge_model: "gpt-4o-mini".to_string(),
            delay_ms: 500,
            request_timeout_secs: 60,
            preflight_timeout_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub server: ServerConfig,
    pub eval: EvalConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_KEY, INDEX_SERVICE_URL, EVAL_DATASET, ...)
    /// 2. Config file (`RAG_CONFIG`, or ~/.config/rag-evaluator/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let explicit = env::var("RAG_CONFIG").ok().map(PathBuf::from);
        if let Some(config_path) = explicit.or_else(Self::config_file_path) {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| RagError::Config(format!("Failed to parse config file: {}", e)))
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }
        if let Ok(api_key) = env::var("LLM_API_KEY").or_else(|_| env::var("OPENAI_API_KEY")) {
            self.llm.api_key = api_key;
        }
        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        parse_env("LLM_MAX_TOKENS", &mut self.llm.max_tokens)?;
        parse_env("LLM_TEMPERATURE", &mut self.llm.temperature)?;
        parse_env("LLM_TIMEOUT_SECS", &mut self.llm.timeout_secs)?;

        if let Ok(url) = env::var("INDEX_SERVICE_URL") {
            self.index.base_url = url;
        }
        parse_env("INDEX_TOP_K", &mut self.index.top_k)?;
        parse_env("INDEX_TIMEOUT_SECS", &mut self.index.timeout_secs)?;

        if let Ok(host) = env::var("RAG_HOST") {
            self.server.host = host;
        }
        parse_env("RAG_PORT", &mut self.server.port)?;
        if let Ok(dir) = env::var("RAG_DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        if let Ok(page) = env::var("RAG_CHAT_PAGE") {
            self.server.chat_page = PathBuf::from(page);
        }
        if let Ok(style) = env::var("RAG_PROMPT_STYLE") {
            self.server.prompt_style = style.parse()?;
        }
        if let Ok(language) = env::var("RAG_LANGUAGE") {
            self.server.language = language;
        }
        parse_env("RAG_CONTEXT_WINDOW", &mut self.server.context_window)?;

        if let Ok(url) = env::var("EVAL_BASE_URL") {
            self.eval.base_url = url;
        }
        if let Ok(path) = env::var("EVAL_DATASET") {
            self.eval.dataset_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("EVAL_OUTPUT") {
            self.eval.keyword_output_path = PathBuf::from(&path);
            self.eval.judge_output_path = PathBuf::from(path);
        }
        if let Ok(model) = env::var("EVAL_JUDGE_MODEL") {
            self.eval.judge_model = model;
        }
        parse_env("EVAL_DELAY_MS", &mut self.eval.delay_ms)?;
        parse_env("EVAL_TIMEOUT_SECS", &mut self.eval.request_timeout_secs)?;

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }

        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-evaluator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the settings the server needs to answer questions.
    pub fn validate(&self) -> Result<()> {
        self.validate_llm()?;

        if self.index.base_url.is_empty() {
            return Err(RagError::Config(
                "Index Service URL is required. Set INDEX_SERVICE_URL environment variable or add to config file.".to_string(),
            ));
        }

        if self.index.top_k == 0 {
            return Err(RagError::Config("index.top_k must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Validate the Generation Service settings.
    pub fn validate_llm(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(RagError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(RagError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.model.is_empty() {
            return Err(RagError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// LLM settings for the semantic judge: same endpoint, judge model.
    pub fn judge_llm(&self) -> LlmConfig {
        LlmConfig {
            model: self.eval.judge_model.clone(),
            temperature: 0.0,
            ..self.llm.clone()
        }
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_env<T: FromStr>(key: &str, target: &mut T) -> Result<()> {
    if let Ok(raw) = env::var(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| RagError::Config(format!("{} has an invalid value: {}", key, raw)))?;
    }
    Ok(())
}
