// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

/// Summarization backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Ollama,
    Google,
    OpenAi,
    Mock,
    Disabled,
}

impl AiProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "google" | "gemini" => Some(Self::Google),
            "openai" => Some(Self::OpenAi),
            "mock" => Some(Self::Mock),
            "disabled" | "off" | "none" => Some(Self::Disabled),
            _ => None,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "gemma3n",
            Self::Google => "gemini-1.5-flash",
            Self::OpenAi => "gpt-4o-mini",
            Self::Mock => "mock",
            Self::Disabled => "none",
        }
    }

    /// Env var holding the API key when `api_key = "ENV"`.
    pub fn key_env_var(self) -> Option<&'static str> {
        match self {
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

/// What to do when the configured backend cannot be built at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Refuse to start.
    #[default]
    Strict,
    /// Start anyway; every enrichment ends in `error` with a config diagnostic.
    Soft,
}

impl FailMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "soft" => Some(Self::Soft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    /// Model name; provider default when absent.
    pub model: Option<String>,
    /// Ollama base URL.
    pub host: String,
    /// Literal key, or "ENV" to read the provider's env var.
    pub api_key: Option<String>,
    pub fail_mode: FailMode,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            model: None,
            host: "http://127.0.0.1:11434".to_string(),
            api_key: Some("ENV".to_string()),
            fail_mode: FailMode::default(),
        }
    }
}

impl AiConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Resolve the API key: "ENV" (any case) reads the provider's env var;
    /// empty values count as missing.
    pub fn resolved_api_key(&self) -> Option<String> {
        let raw = self.api_key.as_deref().map(str::trim).unwrap_or_default();
        let key = if raw.eq_ignore_ascii_case("env") || raw.is_empty() {
            env::var(self.provider.key_env_var()?).ok()?
        } else {
            raw.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    /// Human label for the active backend, e.g. "Ollama Gemma3n".
    pub fn display_label(&self) -> String {
        match self.provider {
            AiProvider::Google => format!("Google {}", self.model()),
            AiProvider::OpenAi => format!("OpenAI {}", self.model()),
            AiProvider::Ollama => format!("Ollama {}", title_case(self.model())),
            AiProvider::Mock => "Mock summarizer".to_string(),
            AiProvider::Disabled => "Summaries disabled".to_string(),
        }
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for ch in s.chars() {
        if start {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
        start = !ch.is_alphanumeric();
    }
    out
}
