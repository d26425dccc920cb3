use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable consulted when `gateway.subscription_key` is unset.
pub const SUBSCRIPTION_KEY_ENV: &str = "NS_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Candidate mirror base URLs, tried in order after the preferred one.
    pub base_urls: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upstream subscription key. Falls back to the `NS_API_KEY` env var.
    #[serde(default)]
    pub subscription_key: Option<String>,
    /// Ceiling applied to upstream-derived cache TTLs.
    #[serde(default = "default_cache_max_ttl_seconds")]
    pub cache_max_ttl_seconds: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}
fn default_cache_max_ttl_seconds() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_mode")]
    pub mode: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_gap")]
    pub min_gap: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: default_resolver_mode(),
            min_confidence: default_min_confidence(),
            min_gap: default_min_gap(),
            max_candidates: default_max_candidates(),
        }
    }
}

fn default_resolver_mode() -> String {
    "normalized".to_string()
}
fn default_min_confidence() -> f64 {
    0.85
}
fn default_min_gap() -> f64 {
    0.15
}
fn default_max_candidates() -> usize {
    10
}

impl GatewayConfig {
    /// The subscription key from config, or from the environment.
    pub fn resolve_subscription_key(&self) -> Result<String> {
        if let Some(key) = &self.subscription_key {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var(SUBSCRIPTION_KEY_ENV).with_context(|| {
            format!(
                "gateway.subscription_key not set and {} not in environment",
                SUBSCRIPTION_KEY_ENV
            )
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Validate a parsed config. Split out so in-memory configs (tests, embedding
/// callers) go through the same checks as file-loaded ones.
pub fn validate(config: &Config) -> Result<()> {
    if config.gateway.base_urls.is_empty() {
        anyhow::bail!("gateway.base_urls must list at least one mirror");
    }

    if config.gateway.timeout_ms == 0 {
        anyhow::bail!("gateway.timeout_ms must be > 0");
    }

    if !(0.0..=1.0).contains(&config.resolver.min_confidence) {
        anyhow::bail!("resolver.min_confidence must be in [0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.resolver.min_gap) {
        anyhow::bail!("resolver.min_gap must be in [0.0, 1.0]");
    }

    if config.resolver.max_candidates == 0 {
        anyhow::bail!("resolver.max_candidates must be >= 1");
    }

    match config.resolver.mode.as_str() {
        "exact" | "case_insensitive" | "normalized" | "fuzzy" => {}
        other => anyhow::bail!(
            "Unknown resolver mode: '{}'. Must be exact, case_insensitive, normalized, or fuzzy.",
            other
        ),
    }

    Ok(())
}
