//! Concrete summarization backends.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{SummarizeError, SummarizeFuture, Summarizer};

const USER_AGENT: &str = concat!("news-digest/", env!("CARGO_PKG_VERSION"));

/// Generation can legitimately take a while on local models; the scheduler
/// applies its own, usually tighter, bound on top.
fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(300))
        .build()
        .context("building summarizer http client")
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Object { message: String },
}

impl ErrorDetail {
    fn message(self) -> String {
        match self {
            ErrorDetail::Text(s) | ErrorDetail::Object { message: s } => s,
        }
    }
}

/// Send a JSON request and decode the reply, turning non-2xx statuses and
/// `{"error": ...}` bodies into [`SummarizeError`]s.
async fn send_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T, SummarizeError> {
    let resp = req
        .send()
        .await
        .map_err(|e| SummarizeError::Transport(e.to_string()))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| SummarizeError::Transport(e.to_string()))?;

    let error_message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| b.error.message());

    if !status.is_success() {
        let message = error_message.unwrap_or_else(|| truncate(&body, 200));
        return Err(SummarizeError::Backend {
            status: status.as_u16(),
            message,
        });
    }
    if let Some(message) = error_message {
        return Err(SummarizeError::Backend {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_str(&body).map_err(|e| SummarizeError::Malformed(e.to_string()))
}

fn truncate(s: &str, max: usize) -> String {
    let t: String = s.trim().chars().take(max).collect();
    if t.is_empty() {
        "<empty body>".to_string()
    } else {
        t
    }
}

fn non_empty(text: Option<String>) -> Result<String, SummarizeError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        _ => Err(SummarizeError::Empty),
    }
}

// ------------------------------------------------------------
// Ollama (local models)
// ------------------------------------------------------------

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

/// Ollama `/api/chat`, non-streaming.
pub struct OllamaProvider {
    http: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(host: &str, model: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client()?,
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    async fn chat(&self, prompt: &str) -> Result<String, SummarizeError> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<ChatMsg<'a>>,
            stream: bool,
        }
        #[derive(Deserialize)]
        struct Resp {
            message: Option<RespMsg>,
        }
        #[derive(Deserialize)]
        struct RespMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![ChatMsg {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        let resp: Resp =
            send_json(self.http.post(format!("{}/api/chat", self.host)).json(&req)).await?;
        non_empty(resp.message.map(|m| m.content))
    }
}

impl Summarizer for OllamaProvider {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a> {
        Box::pin(self.chat(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

// ------------------------------------------------------------
// Google Gemini
// ------------------------------------------------------------

/// Gemini `generateContent` REST endpoint.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, SummarizeError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<CandidateContent>,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp: Resp = send_json(
            self.http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&req),
        )
        .await?;

        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            });
        non_empty(text)
    }
}

impl Summarizer for GeminiProvider {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a> {
        Box::pin(self.generate(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "google"
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model: model.to_string(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, SummarizeError> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<ChatMsg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![ChatMsg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
        };
        let resp: Resp = send_json(
            self.http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req),
        )
        .await?;
        non_empty(resp.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

impl Summarizer for OpenAiProvider {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a> {
        Box::pin(self.complete(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Disabled / mock
// ------------------------------------------------------------

/// Always fails with [`SummarizeError::NotConfigured`].
pub struct DisabledSummarizer {
    reason: String,
}

impl DisabledSummarizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Summarizer for DisabledSummarizer {
    fn summarize<'a>(&'a self, _prompt: &'a str) -> SummarizeFuture<'a> {
        let err = SummarizeError::NotConfigured(self.reason.clone());
        Box::pin(async move { Err(err) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic summarizer for tests/local runs.
#[derive(Clone)]
pub struct MockSummarizer {
    reply: Result<String, SummarizeError>,
}

impl MockSummarizer {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
        }
    }

    pub fn failing(err: SummarizeError) -> Self {
        Self { reply: Err(err) }
    }
}

impl Summarizer for MockSummarizer {
    fn summarize<'a>(&'a self, _prompt: &'a str) -> SummarizeFuture<'a> {
        let out = self.reply.clone();
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_detail_accepts_string_and_object() {
        let a: ErrorBody = serde_json::from_str(r#"{"error":"model not found"}"#).unwrap();
        assert_eq!(a.error.message(), "model not found");
        let b: ErrorBody =
            serde_json::from_str(r#"{"error":{"code":400,"message":"API key not valid"}}"#)
                .unwrap();
        assert_eq!(b.error.message(), "API key not valid");
    }

    #[test]
    fn non_empty_rejects_blank() {
        assert_eq!(non_empty(Some("  ".into())), Err(SummarizeError::Empty));
        assert_eq!(non_empty(None), Err(SummarizeError::Empty));
        assert_eq!(non_empty(Some(" ok ".into())).unwrap(), "ok");
    }

    #[tokio::test]
    async fn mock_failing_returns_its_error() {
        let m = MockSummarizer::failing(SummarizeError::Transport("refused".into()));
        assert_eq!(
            m.summarize("x").await,
            Err(SummarizeError::Transport("refused".into()))
        );
    }

    #[test]
    fn ollama_host_is_normalized() {
        let p = OllamaProvider::new("http://localhost:11434/", "gemma3n").unwrap();
        assert_eq!(p.host, "http://localhost:11434");
        assert_eq!(p.provider_name(), "ollama");
    }
}
