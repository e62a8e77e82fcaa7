//! Service configuration: file (TOML or JSON) + env overrides.
//!
//! Resolution order:
//! 1) `$NEWS_DIGEST_CONFIG`
//! 2) `config/news_digest.toml`
//! 3) `config/news_digest.json`
//! 4) built-in defaults
//!
//! Env overrides are applied on top, using the variable names the service
//! has always read (`AI_PROVIDER`, `OLLAMA_MODEL`, `GOOGLE_API_KEY`, ...).

pub mod ai;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::config::ai::{AiConfig, AiProvider, FailMode};
use crate::error::{Error, Result};
use crate::freshness::FreshnessPolicy;
use crate::ingest::google_news::FeedLocale;
use crate::scheduler::SchedulerConfig;

pub const ENV_CONFIG_PATH: &str = "NEWS_DIGEST_CONFIG";
pub const DEFAULT_TOML_PATH: &str = "config/news_digest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/news_digest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("news.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Freshness window of a topic snapshot.
    pub expiration_secs: u64,
    pub page_size: usize,
    /// Maximum items taken from one source fetch.
    pub fetch_count: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiration_secs: 900,
            page_size: 6,
            fetch_count: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub busy_delay_ms: u64,
    pub idle_delay_ms: u64,
    pub startup_delay_ms: u64,
    pub summarize_timeout_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            busy_delay_ms: 2_000,
            idle_delay_ms: 15_000,
            startup_delay_ms: 10_000,
            summarize_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

fn default_filter_topics() -> Vec<String> {
    [
        "Technology",
        "Cricket",
        "Business",
        "Bollywood",
        "Politics",
        "Stock Market",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub scheduler: SchedulerSection,
    pub source: FeedLocale,
    pub ai: AiConfig,
    pub server: ServerConfig,
    /// Quick-filter topics offered to the front end.
    pub filter_topics: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerSection::default(),
            source: FeedLocale::default(),
            ai: AiConfig::default(),
            server: ServerConfig::default(),
            filter_topics: default_filter_topics(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: AppConfig = if ext == "json" {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing json config {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("parsing toml config {}", path.display()))?
        };
        Ok(cfg)
    }

    /// File lookup (env path, then `config/` fallbacks, then defaults),
    /// followed by env overrides and validation.
    pub fn load_default() -> anyhow::Result<Self> {
        let mut cfg = Self::load_file_default()?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn load_file_default() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any lookup (the process env in production).
    pub fn apply_overrides_from<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_FILE") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = get("BIND_ADDR") {
            self.server.bind = v;
        }
        if let Some(v) = get("CACHE_EXPIRATION_SECONDS") {
            self.cache.expiration_secs = parse_num("CACHE_EXPIRATION_SECONDS", &v)?;
        }
        if let Some(v) = get("PAGE_SIZE") {
            self.cache.page_size = parse_num("PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("FEED_FETCH_COUNT") {
            self.cache.fetch_count = parse_num("FEED_FETCH_COUNT", &v)?;
        }
        if let Some(v) = get("SUMMARIZE_TIMEOUT_SECS") {
            self.scheduler.summarize_timeout_secs = parse_num("SUMMARIZE_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("AI_PROVIDER") {
            self.ai.provider = AiProvider::parse(&v)
                .ok_or_else(|| Error::Config(format!("unsupported AI_PROVIDER '{v}'")))?;
        }
        if get("AI_TEST_MODE").as_deref() == Some("mock") {
            self.ai.provider = AiProvider::Mock;
        }
        let model_var = match self.ai.provider {
            AiProvider::Ollama => Some("OLLAMA_MODEL"),
            AiProvider::Google => Some("GOOGLE_MODEL"),
            AiProvider::OpenAi => Some("OPENAI_MODEL"),
            AiProvider::Mock | AiProvider::Disabled => None,
        };
        if let Some(v) = model_var.and_then(|var| get(var)) {
            self.ai.model = Some(v);
        }
        if let Some(v) = get("OLLAMA_HOST") {
            self.ai.host = v;
        }
        if let Some(v) = get("AI_FAIL_MODE") {
            self.ai.fail_mode = FailMode::parse(&v)
                .ok_or_else(|| Error::Config(format!("unsupported AI_FAIL_MODE '{v}'")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.page_size == 0 {
            return Err(Error::Config("cache.page_size must be > 0".into()));
        }
        if self.cache.fetch_count == 0 {
            return Err(Error::Config("cache.fetch_count must be > 0".into()));
        }
        if self.cache.expiration_secs == 0 {
            return Err(Error::Config("cache.expiration_secs must be > 0".into()));
        }
        if self.scheduler.summarize_timeout_secs == 0 {
            return Err(Error::Config(
                "scheduler.summarize_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            window: chrono::Duration::seconds(self.cache.expiration_secs as i64),
            max_items: self.cache.fetch_count,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            busy_delay: Duration::from_millis(s.busy_delay_ms),
            idle_delay: Duration::from_millis(s.idle_delay_ms),
            startup_delay: Duration::from_millis(s.startup_delay_ms),
            summarize_timeout: Duration::from_secs(s.summarize_timeout_secs),
        }
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_service_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.cache.expiration_secs, 900);
        assert_eq!(cfg.cache.page_size, 6);
        assert_eq!(cfg.cache.fetch_count, 30);
        assert_eq!(cfg.ai.provider, AiProvider::Ollama);
        assert_eq!(cfg.filter_topics.len(), 6);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [cache]
            page_size = 10

            [ai]
            provider = "google"
            fail_mode = "soft"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.cache.page_size, 10);
        assert_eq!(cfg.cache.fetch_count, 30);
        assert_eq!(cfg.ai.provider, AiProvider::Google);
        assert_eq!(cfg.ai.fail_mode, FailMode::Soft);
        assert_eq!(cfg.ai.model(), "gemini-1.5-flash");
    }

    #[test]
    fn env_overrides_pick_provider_specific_model() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(env_of(&[
            ("AI_PROVIDER", "google"),
            ("OLLAMA_MODEL", "llama3"),
            ("GOOGLE_MODEL", "gemini-2.0-flash"),
            ("PAGE_SIZE", "12"),
        ]))
        .unwrap();
        assert_eq!(cfg.ai.provider, AiProvider::Google);
        assert_eq!(cfg.ai.model(), "gemini-2.0-flash");
        assert_eq!(cfg.cache.page_size, 12);
    }

    #[test]
    fn test_mode_mock_overrides_provider() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides_from(env_of(&[("AI_PROVIDER", "openai"), ("AI_TEST_MODE", "mock")]))
            .unwrap();
        assert_eq!(cfg.ai.provider, AiProvider::Mock);
    }

    #[test]
    fn bad_values_are_config_errors() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_overrides_from(env_of(&[("AI_PROVIDER", "claude")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = cfg
            .apply_overrides_from(env_of(&[("PAGE_SIZE", "six")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        cfg.cache.page_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_and_scheduler_conversions() {
        let cfg = AppConfig::default();
        let p = cfg.freshness_policy();
        assert_eq!(p.window, chrono::Duration::minutes(15));
        assert_eq!(p.max_items, 30);
        let s = cfg.scheduler_config();
        assert_eq!(s.busy_delay, Duration::from_secs(2));
        assert_eq!(s.idle_delay, Duration::from_secs(15));
    }
}
