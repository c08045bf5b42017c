//! Configuration parsing and validation.
//!
//! Task Context is configured by a TOML file (default `config/tctx.toml`).
//! Only `[db]` is required; every other section has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/tctx.sqlite"
//!
//! [tasks]
//! code_prefix = "TASK"      # generated codes look like TASK-001
//! code_width = 3
//!
//! [context]
//! default_scope = "self"    # self | subtasks | inherit | tree
//! max_documents = 6
//! snippet_words = 40
//!
//! [search]
//! provider = "keyword"      # keyword | disabled
//!
//! [answer]
//! provider = "openai"       # openai | disabled
//! model = "gpt-4o-mini"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use task_context_core::context::Scope;
use task_context_core::hierarchy::CodeFormat;
use task_context_core::EngineOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// SQLite file; parent directories are created on connect.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
    /// Zero-padded digits in generated codes.
    #[serde(default = "default_code_width")]
    pub code_width: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            code_prefix: default_code_prefix(),
            code_width: default_code_width(),
        }
    }
}

fn default_code_prefix() -> String {
    "TASK".to_string()
}
fn default_code_width() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_scope")]
    pub default_scope: String,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_snippet_words")]
    pub snippet_words: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_scope: default_scope(),
            max_documents: default_max_documents(),
            snippet_words: default_snippet_words(),
        }
    }
}

fn default_scope() -> String {
    "self".to_string()
}
fn default_max_documents() -> usize {
    6
}
fn default_snippet_words() -> usize {
    40
}

impl ContextConfig {
    /// The configured default scope. Validated by [`load_config`].
    pub fn scope(&self) -> Scope {
        self.default_scope.parse().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// `keyword` (SQLite FTS5) or `disabled`.
    #[serde(default = "default_search_provider")]
    pub provider: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
        }
    }
}

fn default_search_provider() -> String {
    "keyword".to_string()
}

/// Answer-generation backend for `tctx ask`.
#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `disabled`.
    #[serde(default = "default_answer_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: default_answer_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_answer_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl AnswerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            code_format: CodeFormat {
                prefix: self.tasks.code_prefix.clone(),
                width: self.tasks.code_width,
            },
            snippet_words: self.context.snippet_words,
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

fn validate(config: &Config) -> Result<()> {
    // Validate tasks
    let prefix = &config.tasks.code_prefix;
    if prefix.is_empty() || prefix.contains('/') || prefix.chars().any(char::is_whitespace) {
        anyhow::bail!("tasks.code_prefix must be non-empty without '/' or whitespace");
    }
    if !(1..=9).contains(&config.tasks.code_width) {
        anyhow::bail!("tasks.code_width must be between 1 and 9");
    }

    // Validate context
    if let Err(e) = config.context.default_scope.parse::<Scope>() {
        anyhow::bail!("context.default_scope: {}", e);
    }
    if config.context.max_documents < 1 {
        anyhow::bail!("context.max_documents must be >= 1");
    }
    if config.context.snippet_words < 1 {
        anyhow::bail!("context.snippet_words must be >= 1");
    }

    match config.search.provider.as_str() {
        "disabled" | "keyword" => {}
        other => anyhow::bail!(
            "Unknown search provider: '{}'. Must be disabled or keyword.",
            other
        ),
    }

    match config.answer.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.answer.model.is_none() {
                anyhow::bail!(
                    "answer.model must be specified when provider is '{}'",
                    config.answer.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown answer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}
