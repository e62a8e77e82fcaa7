use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use reqwest::Url;
use serde::Deserialize;

use crate::ingest::types::ItemSource;
use crate::model::{RawItem, DEFAULT_TOPIC, UNKNOWN_SOURCE};

pub const DEFAULT_BASE_URL: &str = "https://news.google.com/rss";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    source: Option<EntrySource>,
    #[serde(rename = "media:content", alias = "content", default)]
    media: Vec<MediaContent>,
}

#[derive(Debug, Deserialize)]
struct EntrySource {
    #[serde(rename = "$text", default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaContent {
    #[serde(rename = "@url")]
    url: Option<String>,
}

/// Locale query parameters appended to every feed URL.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct FeedLocale {
    pub hl: String,
    pub gl: String,
    pub ceid: String,
}

impl Default for FeedLocale {
    fn default() -> Self {
        Self {
            hl: "en-IN".to_string(),
            gl: "IN".to_string(),
            ceid: "IN:en".to_string(),
        }
    }
}

enum Mode {
    // Owned copy so tests can pass any &str.
    Fixture(String),
    Http {
        client: reqwest::Client,
        base_url: String,
    },
}

/// Google News RSS: the trending feed for [`DEFAULT_TOPIC`], the search feed
/// for everything else.
pub struct GoogleNewsRss {
    mode: Mode,
    locale: FeedLocale,
    max_items: usize,
}

impl GoogleNewsRss {
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            locale: FeedLocale::default(),
            max_items: usize::MAX,
        }
    }

    pub fn http(locale: FeedLocale, max_items: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("news-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http {
                client,
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            locale,
            max_items,
        })
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        if let Mode::Http { base_url, .. } = &mut self.mode {
            *base_url = url.into();
        }
        self
    }

    /// Feed URL for a topic, with the topic as the form-encoded `q` parameter.
    pub fn feed_url(&self, topic: &str) -> Result<Url> {
        let base = match &self.mode {
            Mode::Http { base_url, .. } => base_url.as_str(),
            Mode::Fixture(_) => DEFAULT_BASE_URL,
        };
        let locale = [
            ("hl", self.locale.hl.as_str()),
            ("gl", self.locale.gl.as_str()),
            ("ceid", self.locale.ceid.as_str()),
        ];
        let url = if topic == DEFAULT_TOPIC {
            Url::parse_with_params(base, locale)
        } else {
            let search = format!("{}/search", base.trim_end_matches('/'));
            Url::parse_with_params(
                &search,
                std::iter::once(("q", topic)).chain(locale),
            )
        };
        url.with_context(|| format!("building feed url for '{topic}'"))
    }

    /// Parse an RSS document into raw items, at most `max` of them. Text is
    /// returned as found in the feed; see [`crate::ingest::clean_batch`].
    pub fn parse_items_from_str(s: &str, max: usize) -> Result<Vec<RawItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing news rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len().min(max));
        for it in rss.channel.item {
            if out.len() >= max {
                break;
            }
            let (Some(link), Some(title)) = (it.link, it.title) else {
                continue;
            };
            let source_name = it
                .source
                .and_then(|s| s.name)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

            out.push(RawItem {
                key: link.trim().to_string(),
                title,
                source_name,
                excerpt: it.description.unwrap_or_default(),
                image_url: it.media.into_iter().find_map(|m| m.url),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl ItemSource for GoogleNewsRss {
    async fn fetch_items(&self, topic: &str) -> Result<Vec<RawItem>> {
        crate::ingest::ensure_metrics_described();
        counter!("ingest_fetch_total").increment(1);

        let res = match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s, self.max_items),
            Mode::Http { client, .. } => {
                let url = self.feed_url(topic)?;
                tracing::info!(target: "ingest", topic, %url, "fetching feed");
                match fetch_body(client, url).await {
                    Ok(body) => Self::parse_items_from_str(&body, self.max_items),
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(e) = &res {
            tracing::warn!(target: "ingest", error = ?e, provider = self.name(), topic, "provider error");
            counter!("ingest_provider_errors_total").increment(1);
        }
        res
    }

    fn name(&self) -> &'static str {
        "google-news"
    }
}

async fn fetch_body(client: &reqwest::Client, url: Url) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .context("news http get()")?
        .error_for_status()
        .context("news http status")?;
    resp.text().await.context("news http .text()")
}

/// HTML entities that are not valid XML and would abort the parser.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
