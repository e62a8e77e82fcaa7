// tests/metrics.rs
//
// One test per binary: the Prometheus recorder is process-global.

mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{cache_over, policy, StubSource};
use news_digest::hints::PriorityHints;
use news_digest::metrics::Metrics;
use news_digest::query::QueryService;
use news_digest::scheduler::{EnrichmentScheduler, SchedulerConfig, Tick};
use news_digest::summarize::MockSummarizer;
use news_digest::AppState;

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init(900).expect("recorder installs once");

    let (cache, store) = cache_over(StubSource::numbered("m", 3), policy(900, 30)).await;
    let hints = Arc::new(PriorityHints::new());
    let query = Arc::new(QueryService::new(cache, Arc::clone(&hints), 2));

    // One miss, one hit.
    query.get_page(Some("Tech"), 1).await.unwrap();
    query.get_page(Some("Tech"), 2).await.unwrap();

    let scheduler = EnrichmentScheduler::new(
        store,
        hints,
        Arc::new(MockSummarizer::fixed("S")),
        SchedulerConfig::default(),
    );
    assert!(matches!(scheduler.run_once().await.unwrap(), Tick::Enriched { .. }));

    let app = news_digest::router(AppState {
        query,
        model_label: "Mock summarizer".into(),
        topics: Vec::new(),
    })
    .merge(metrics.router());

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap(); // 1 MiB
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "cache_refresh_total",
        "cache_hits_total",
        "enrich_done_total",
        "enrich_duration_ms",
        "hint_queue_len",
        "cache_freshness_window_secs",
    ] {
        assert!(text.contains(needle), "missing series {needle} in:\n{text}");
    }
}
