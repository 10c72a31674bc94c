// Configuration File Support
//
// This module provides configuration file parsing for scanguard.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/scanguard/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::scanner::{
    OptionAllowList, DEFAULT_BINARY, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS,
};

/// Smallest accepted output capture limit
const MIN_OUTPUT_BYTES: usize = 1024;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Scanner invocation configuration
    pub scanner: ScannerConfig,

    /// HTTP service configuration
    pub server: ServerConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scanner executable (name on PATH or absolute path)
    pub binary: String,

    /// Deadline applied when the caller gives none
    pub default_timeout_secs: u64,

    /// Cap on caller-requested deadlines
    pub max_timeout_secs: u64,

    /// Capture limit for stdout and stderr, each
    pub max_output_bytes: usize,

    /// Additional allowed flags mapped to their argument count
    pub extra_options: BTreeMap<String, usize>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_timeout_secs: DEFAULT_MAX_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            extra_options: BTreeMap::new(),
        }
    }
}

/// HTTP service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,

    /// Port to listen on
    pub port: u16,

    /// Scans allowed to run at once; further requests wait
    pub max_concurrent_scans: usize,

    /// Allow cross-origin requests from any origin
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5000,
            max_concurrent_scans: 4,
            cors_allow_any: true,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the result fails [`Config::validate`].
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/scanguard/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "scanguard", "scanguard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("scanguard").join("config.toml")
        }
    }

    /// Apply `SCANGUARD_*` environment variable overrides
    fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`:
    /// - SCANGUARD_LOG_LEVEL, SCANGUARD_LOG_FORMAT
    /// - SCANGUARD_NMAP_BINARY
    /// - SCANGUARD_DEFAULT_TIMEOUT_SECS, SCANGUARD_MAX_TIMEOUT_SECS
    /// - SCANGUARD_BIND, SCANGUARD_PORT, SCANGUARD_MAX_CONCURRENT_SCANS
    /// - SCANGUARD_METRICS_ENABLED
    ///
    /// Unparsable numeric values are ignored.
    fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("SCANGUARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("SCANGUARD_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(binary) = lookup("SCANGUARD_NMAP_BINARY") {
            self.scanner.binary = binary;
        }
        if let Some(secs) = lookup("SCANGUARD_DEFAULT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.scanner.default_timeout_secs = secs;
        }
        if let Some(secs) = lookup("SCANGUARD_MAX_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.scanner.max_timeout_secs = secs;
        }

        if let Some(bind) = lookup("SCANGUARD_BIND") {
            self.server.bind = bind;
        }
        if let Some(port) = lookup("SCANGUARD_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(n) = lookup("SCANGUARD_MAX_CONCURRENT_SCANS").and_then(|v| v.parse().ok()) {
            self.server.max_concurrent_scans = n;
        }

        if let Some(enabled) = lookup("SCANGUARD_METRICS_ENABLED").and_then(|v| v.parse().ok()) {
            self.metrics.enabled = enabled;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}. Must be one of: trace, debug, info, warn, error", self.logging.level),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!("Invalid log format: {}. Must be one of: json, pretty, compact", self.logging.format),
        }

        if self.scanner.binary.trim().is_empty() {
            anyhow::bail!("Scanner binary must not be empty");
        }
        if self.scanner.default_timeout_secs == 0 {
            anyhow::bail!("Default scan timeout must be > 0");
        }
        if self.scanner.max_timeout_secs < self.scanner.default_timeout_secs {
            anyhow::bail!(
                "Maximum scan timeout ({}s) must be >= default timeout ({}s)",
                self.scanner.max_timeout_secs,
                self.scanner.default_timeout_secs
            );
        }
        if self.scanner.max_output_bytes < MIN_OUTPUT_BYTES {
            anyhow::bail!("Scanner output limit must be at least {} bytes", MIN_OUTPUT_BYTES);
        }
        OptionAllowList::with_extra(&self.scanner.extra_options)
            .context("Invalid scanner.extra_options")?;

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }
        if self.server.max_concurrent_scans == 0 {
            anyhow::bail!("Server max_concurrent_scans must be > 0");
        }

        Ok(())
    }
}
