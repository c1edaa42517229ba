//! Configuration management for diagbridge

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::serializer::DEFAULT_MAX_DEPTH;

/// A message is ignored when it contains every fragment of a rule
///
/// Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnoreRule {
    /// Fragments that must all appear in the message
    pub all_of: Vec<String>,
}

impl IgnoreRule {
    /// Create a rule from its fragments
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: fragments.into_iter().map(Into::into).collect(),
        }
    }
}

/// How dev-tool build diagnostics are recognized and rendered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDiagnostics {
    /// Marker string the dev tool prefixes its console output with
    #[serde(default = "default_tool_marker")]
    pub marker: String,

    /// Prefix of every rendered diagnostic line
    #[serde(default = "default_tool_line_prefix")]
    pub line_prefix: String,

    /// Label sent ahead of payloads from the dev-time error channel
    #[serde(default = "default_tool_event_label")]
    pub event_label: String,
}

impl Default for ToolDiagnostics {
    fn default() -> Self {
        Self {
            marker: default_tool_marker(),
            line_prefix: default_tool_line_prefix(),
            event_label: default_tool_event_label(),
        }
    }
}

/// Settings for the stock HTTP sink
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SinkConfig {
    /// URL records are POSTed to; no HTTP sink is built without one
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in milliseconds (default: 5000)
    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,

    /// Records waiting for the dispatch worker before new ones are dropped (default: 1024)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Deliveries allowed to be in progress at once (default: 128)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_sink_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl SinkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum message length in characters before truncation (default: 12000)
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Nesting ceiling for value serialization (default: 5)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Window in which an identical (level, message) pair is dropped (default: 1500)
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Appended to truncated messages
    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,

    /// Messages matching any of these rules are never forwarded
    #[serde(default = "default_ignore_rules")]
    pub ignore_rules: Vec<IgnoreRule>,

    /// Chain a panic hook on install (default: true)
    #[serde(default = "default_capture_panics")]
    pub capture_panics: bool,

    #[serde(default)]
    pub tool_diagnostics: ToolDiagnostics,

    #[serde(default)]
    pub sink: SinkConfig,
}

fn default_max_message_length() -> usize {
    12_000
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_dedup_window_ms() -> u64 {
    1500
}

fn default_truncation_marker() -> String {
    "… [truncated]".to_string()
}

fn default_ignore_rules() -> Vec<IgnoreRule> {
    // The dev server prints this after the detailed error it already logged
    vec![IgnoreRule::new(["[vite] failed to reload", "see errors above"])]
}

fn default_capture_panics() -> bool {
    true
}

fn default_tool_marker() -> String {
    "[vite]".to_string()
}

fn default_tool_line_prefix() -> String {
    "[vite:error]".to_string()
}

fn default_tool_event_label() -> String {
    "[vite:error:event]".to_string()
}

fn default_sink_timeout_ms() -> u64 {
    5000
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    128
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            max_depth: default_max_depth(),
            dedup_window_ms: default_dedup_window_ms(),
            truncation_marker: default_truncation_marker(),
            ignore_rules: default_ignore_rules(),
            capture_panics: default_capture_panics(),
            tool_diagnostics: ToolDiagnostics::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file, or return defaults if not found
    pub fn load() -> Result<Self> {
        match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Dedup window as a duration
    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

/// Get the path to the config file (`<config dir>/diagbridge/config.toml`)
///
/// Returns None if the platform config directory cannot be determined.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("diagbridge").join("config.toml"))
}
