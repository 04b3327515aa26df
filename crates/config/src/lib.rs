//! Configuration loading, validation, and management for Toolwright.
//!
//! Loads configuration from `~/.toolwright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use toolwright_core::EstimationStrategy;

/// The root configuration structure.
///
/// Maps directly to `~/.toolwright/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Conversation cost budget and compaction settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Model service connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Built-in capability settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_true() -> bool {
    true
}

/// How many decision cycles a task may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationLimit {
    Bounded(u32),
    /// Only an external cancellation signal (or completion/failure) ends the
    /// loop. Callers must supply one.
    Unbounded,
}

impl IterationLimit {
    /// Whether `completed` cycles have used up the limit.
    pub fn exhausted(&self, completed: u32) -> bool {
        match self {
            IterationLimit::Bounded(max) => completed >= *max,
            IterationLimit::Unbounded => false,
        }
    }
}

impl Default for IterationLimit {
    fn default() -> Self {
        IterationLimit::Bounded(10)
    }
}

impl Serialize for IterationLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IterationLimit::Bounded(n) => serializer.serialize_u32(*n),
            IterationLimit::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for IterationLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u32),
            Word(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(IterationLimit::Bounded(n)),
            Raw::Word(w) => match w.to_ascii_lowercase().as_str() {
                "unbounded" | "infinite" | "inf" => Ok(IterationLimit::Unbounded),
                other => Err(serde::de::Error::custom(format!(
                    "max_iterations must be an integer or \"unbounded\", got \"{other}\""
                ))),
            },
        }
    }
}

/// What to do when the summarizer fails during automatic compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionFailurePolicy {
    /// End the task as failed
    #[default]
    Abort,
    /// Send uncompacted if the request still fits under the ceiling
    Proceed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub max_iterations: IterationLimit,

    /// Require approval for risky capabilities
    #[serde(default = "default_true")]
    pub safe_mode: bool,

    /// Timeout for each model service call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Replies longer than this are treated as a fatal parse error
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,

    #[serde(default)]
    pub on_compaction_failure: CompactionFailurePolicy,
}

fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_response_chars() -> usize {
    200_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: IterationLimit::default(),
            safe_mode: true,
            request_timeout_secs: default_request_timeout_secs(),
            max_response_chars: default_max_response_chars(),
            on_compaction_failure: CompactionFailurePolicy::default(),
        }
    }
}

/// Named estimation strategies as written in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    #[default]
    Conservative,
    Standard,
    Code,
}

/// How the cost of describing capabilities to the model is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOverheadMode {
    /// Estimate the rendered catalogue text
    #[default]
    Calibrated,
    /// `base + per_capability * enabled_capabilities`
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling: u64,

    #[serde(default = "default_compact_at_fraction")]
    pub compact_at_fraction: f64,

    #[serde(default = "default_warning_fraction")]
    pub warning_fraction: f64,

    #[serde(default = "default_preserve_recent_pairs")]
    pub preserve_recent_pairs: usize,

    #[serde(default = "default_true")]
    pub auto_compact: bool,

    #[serde(default)]
    pub estimation_strategy: StrategyName,

    /// Only used by the conservative strategy; must exceed 1.0
    #[serde(default = "default_safety_multiplier")]
    pub safety_multiplier: f64,

    #[serde(default)]
    pub tool_overhead: ToolOverheadMode,

    #[serde(default = "default_tool_overhead_base")]
    pub tool_overhead_base: u64,

    #[serde(default = "default_tool_overhead_per_capability")]
    pub tool_overhead_per_capability: u64,
}

fn default_cost_ceiling() -> u64 {
    200_000
}
fn default_compact_at_fraction() -> f64 {
    0.85
}
fn default_warning_fraction() -> f64 {
    0.80
}
fn default_preserve_recent_pairs() -> usize {
    2
}
fn default_safety_multiplier() -> f64 {
    toolwright_core::cost::DEFAULT_SAFETY_MULTIPLIER
}
fn default_tool_overhead_base() -> u64 {
    200
}
fn default_tool_overhead_per_capability() -> u64 {
    120
}

impl BudgetConfig {
    /// The configured estimation strategy as a core value.
    pub fn strategy(&self) -> EstimationStrategy {
        match self.estimation_strategy {
            StrategyName::Conservative => EstimationStrategy::Conservative {
                safety_multiplier: self.safety_multiplier,
            },
            StrategyName::Standard => EstimationStrategy::Standard,
            StrategyName::Code => EstimationStrategy::Code,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            cost_ceiling: default_cost_ceiling(),
            compact_at_fraction: default_compact_at_fraction(),
            warning_fraction: default_warning_fraction(),
            preserve_recent_pairs: default_preserve_recent_pairs(),
            auto_compact: true,
            estimation_strategy: StrategyName::default(),
            safety_multiplier: default_safety_multiplier(),
            tool_overhead: ToolOverheadMode::default(),
            tool_overhead_base: default_tool_overhead_base(),
            tool_overhead_per_capability: default_tool_overhead_per_capability(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field(
                "api_key",
                &match self.api_key {
                    Some(_) => "[REDACTED]",
                    None => "None",
                },
            )
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Base commands `run_command` may execute. Empty = allow all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "echo", "pwd", "wc", "grep", "git", "cargo"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolwright/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `TOOLWRIGHT_API_KEY`, falling back to `OPENAI_API_KEY`
    /// - `TOOLWRIGHT_MODEL`
    /// - `TOOLWRIGHT_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("TOOLWRIGHT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("TOOLWRIGHT_MODEL") {
            config.provider.model = model;
        }

        if let Ok(url) = std::env::var("TOOLWRIGHT_BASE_URL") {
            config.provider.base_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolwright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.budget;
        if b.cost_ceiling == 0 {
            return Err(ConfigError::ValidationError(
                "budget.cost_ceiling must be > 0".into(),
            ));
        }
        if !(b.compact_at_fraction > 0.0 && b.compact_at_fraction <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.compact_at_fraction must be in (0.0, 1.0]".into(),
            ));
        }
        if !(b.warning_fraction > 0.0 && b.warning_fraction < b.compact_at_fraction) {
            return Err(ConfigError::ValidationError(
                "budget.warning_fraction must be > 0.0 and below compact_at_fraction".into(),
            ));
        }
        if b.safety_multiplier <= 1.0 {
            return Err(ConfigError::ValidationError(
                "budget.safety_multiplier must be > 1.0".into(),
            ));
        }
        if self.agent.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
