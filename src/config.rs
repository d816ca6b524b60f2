//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The proxy list, probe limits and timeouts of the scraped source are
//! configuration so each deployment can swap them. Secrets (API keys)
//! are referenced by env-var name and resolved at runtime.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: AppSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
    /// Seconds between background resyncs. 0 disables the loop.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { history_path: default_history_path() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub scraped: ScrapedSourceConfig,
    #[serde(default)]
    pub csv: CsvSourceConfig,
}

/// Scraped HTML source: where to fetch, through which proxies, and how
/// to probe for upstream size caps.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScrapedSourceConfig {
    pub enabled: bool,
    /// Query endpoint without the `limit`/`sort` parameters.
    pub base_url: String,
    /// Proxy prefixes tried in order. The URL-encoded target is appended.
    /// An empty string means a direct request.
    pub proxies: Vec<String>,
    /// Record-count limits probed per proxy, largest first.
    pub limits: Vec<u32>,
    pub timeout_secs: u64,
    /// A page must yield more than this many well-formed rows.
    pub min_records: usize,
    /// At least one of these must appear in the page body.
    pub markers: Vec<String>,
}

impl Default for ScrapedSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://datachart.500.com/dlt/history/newinc/history.php".to_string(),
            proxies: vec![
                "https://corsproxy.io/?".to_string(),
                "https://api.allorigins.win/raw?url=".to_string(),
                "https://thingproxy.freeboard.io/fetch/".to_string(),
            ],
            limits: vec![2000, 1000, 500, 100],
            timeout_secs: 15,
            min_records: 5,
            markers: vec!["cfont2".to_string(), "t_tr1".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CsvSourceConfig {
    /// Remote CSV location. `None` disables the stage.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self { url: None, timeout_secs: 20 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdvisorConfig {
    pub enabled: bool,
    pub model: String,
    pub fallback_model: Option<String>,
    pub api_key_env: String,
    pub max_tokens: u32,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "google/gemini-2.5-pro".to_string(),
            fallback_model: Some("google/gemini-2.5-flash".to_string()),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_tokens: 2048,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: true, port: 8080 }
    }
}

fn default_resync_interval() -> u64 {
    6 * 60 * 60
}

fn default_history_path() -> String {
    crate::storage::DEFAULT_HISTORY_FILE.to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        // Probing must go from the largest page down.
        config.sources.scraped.limits.sort_unstable_by(|a, b| b.cmp(a));
        config.sources.scraped.limits.dedup();
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let scraped = &self.sources.scraped;
        if scraped.enabled {
            if scraped.proxies.is_empty() {
                bail!("sources.scraped.proxies must list at least one entry (use \"\" for direct)");
            }
            if scraped.limits.is_empty() || scraped.limits.contains(&0) {
                bail!("sources.scraped.limits must be non-empty and positive");
            }
            if scraped.timeout_secs == 0 {
                bail!("sources.scraped.timeout_secs must be positive");
            }
        }
        if self.sources.csv.url.is_some() && self.sources.csv.timeout_secs == 0 {
            bail!("sources.csv.timeout_secs must be positive");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
