//! Configuration management with TOML, environment variables, and CLI overrides.

use crate::page::selectors::defaults;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Product page to track
    #[serde(default)]
    pub url: Option<String>,

    /// Symbol prefixed to the displayed price
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// CSS selectors for each field
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Fractional change that triggers an alert (0.01 = 1%)
    #[serde(default = "default_price_change_threshold")]
    pub price_change_threshold: f64,

    /// Number of recent observations fetched for comparison
    #[serde(default = "default_history_lookback")]
    pub history_lookback: usize,

    /// Seconds to wait between tracking cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Proxy URL (e.g., socks5://host:port)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Base delay before each page request in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Random jitter added to delay (0 to this value)
    #[serde(default = "default_delay_jitter_ms")]
    pub delay_jitter_ms: u64,

    /// MongoDB connection string; history goes to the CSV log only when unset
    #[serde(default)]
    pub mongodb_uri: Option<String>,

    #[serde(default = "default_mongodb_database")]
    pub mongodb_database: String,

    #[serde(default = "default_mongodb_collection")]
    pub mongodb_collection: String,

    /// CSV history log; None disables it
    #[serde(default = "default_csv_path")]
    pub csv_path: Option<PathBuf>,

    /// Model used for fallback structured extraction
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// API key for fallback structured extraction; disabled when unset
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
}

/// CSS selectors for each extracted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_price_selector")]
    pub price: String,
    #[serde(default = "default_name_selector")]
    pub name: String,
    #[serde(default = "default_discount_selector")]
    pub discount: String,
    #[serde(default = "default_rating_selector")]
    pub rating: String,
    #[serde(default = "default_rating_count_selector")]
    pub rating_count: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            price: default_price_selector(),
            name: default_name_selector(),
            discount: default_discount_selector(),
            rating: default_rating_selector(),
            rating_count: default_rating_count_selector(),
        }
    }
}

fn default_price_selector() -> String {
    defaults::PRICE.to_string()
}

fn default_name_selector() -> String {
    defaults::NAME.to_string()
}

fn default_discount_selector() -> String {
    defaults::DISCOUNT.to_string()
}

fn default_rating_selector() -> String {
    defaults::RATING.to_string()
}

fn default_rating_count_selector() -> String {
    defaults::RATING_COUNT.to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_price_change_threshold() -> f64 {
    0.01
}

fn default_history_lookback() -> usize {
    2
}

fn default_interval_secs() -> u64 {
    10
}

fn default_delay_ms() -> u64 {
    500
}

fn default_delay_jitter_ms() -> u64 {
    1000
}

fn default_mongodb_database() -> String {
    "price_tracker_db".to_string()
}

fn default_mongodb_collection() -> String {
    "price_history".to_string()
}

fn default_csv_path() -> Option<PathBuf> {
    Some(PathBuf::from("competitor_history.csv"))
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: None,
            currency_symbol: default_currency_symbol(),
            selectors: SelectorConfig::default(),
            price_change_threshold: default_price_change_threshold(),
            history_lookback: default_history_lookback(),
            interval_secs: default_interval_secs(),
            proxy: None,
            delay_ms: default_delay_ms(),
            delay_jitter_ms: default_delay_jitter_ms(),
            mongodb_uri: None,
            mongodb_database: default_mongodb_database(),
            mongodb_collection: default_mongodb_collection(),
            csv_path: default_csv_path(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            format: OutputFormat::Table,
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // 1. Explicit path takes precedence
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // 2. Try current directory
        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        // 3. Try XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("price-tracker").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        // 4. Return default config
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TRACKER_URL") {
            self.url = Some(url);
        }

        if let Ok(proxy) = std::env::var("TRACKER_PROXY") {
            self.proxy = Some(proxy);
        }

        if let Ok(delay) = std::env::var("TRACKER_DELAY") {
            if let Ok(d) = delay.parse() {
                self.delay_ms = d;
            }
        }

        if let Ok(interval) = std::env::var("TRACKER_INTERVAL") {
            if let Ok(i) = interval.parse() {
                self.interval_secs = i;
            }
        }

        if let Ok(uri) = std::env::var("MONGODB_URI") {
            if !uri.trim().is_empty() {
                self.mongodb_uri = Some(uri);
            }
        }

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm_api_key = Some(key);
            }
        }

        self
    }

    /// CSV log path, treating an empty path as disabled.
    pub fn csv_log_path(&self) -> Option<&Path> {
        self.csv_path.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    /// Returns the tracked URL or an error explaining how to set one.
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .context("No product URL configured. Pass a URL, set TRACKER_URL, or add `url` to config.toml")
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Markdown,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use: table, json, markdown, csv", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}
