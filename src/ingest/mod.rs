// src/ingest/mod.rs
pub mod google_news;
pub mod types;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::model::RawItem;

/// Maximum characters kept from a feed excerpt.
pub const EXCERPT_MAX_CHARS: usize = 1500;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetch_total", "Feed fetches issued to sources.");
        describe_counter!(
            "ingest_items_total",
            "Items parsed from source responses."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Source fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize feed text: decode entities, strip tags, fold quotes and whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (includes NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > EXCERPT_MAX_CHARS {
        out = out.chars().take(EXCERPT_MAX_CHARS).collect();
    }

    out
}

/// Clean a fetched batch: normalize text fields, drop entries without a key
/// or title, and keep at most `max` entries in source order.
pub fn clean_batch(raw: Vec<RawItem>, max: usize) -> Vec<RawItem> {
    raw.into_iter()
        .filter_map(|mut it| {
            it.key = it.key.trim().to_string();
            it.title = normalize_text(&it.title);
            it.excerpt = normalize_text(&it.excerpt);
            it.source_name = normalize_text(&it.source_name);
            if it.source_name.is_empty() {
                it.source_name = crate::model::UNKNOWN_SOURCE.to_string();
            }
            (!it.key.is_empty() && !it.title.is_empty()).then_some(it)
        })
        .take(max)
        .collect()
}
