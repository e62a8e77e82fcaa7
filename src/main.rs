//! news-digest binary entrypoint.
//! Boots the store, the enrichment worker and the Axum HTTP server.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_digest::config::AppConfig;
use news_digest::freshness::FreshnessCache;
use news_digest::hints::PriorityHints;
use news_digest::ingest::google_news::GoogleNewsRss;
use news_digest::metrics::Metrics;
use news_digest::query::QueryService;
use news_digest::scheduler::EnrichmentScheduler;
use news_digest::store::ItemStore;
use news_digest::{ai_bootstrap, summarize, AppState};

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_digest=info,tower_http=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default()?;
    info!(
        db = %cfg.database.path.display(),
        bind = %cfg.server.bind,
        ai = %cfg.ai.display_label(),
        window_secs = cfg.cache.expiration_secs,
        "config loaded"
    );

    let store = ItemStore::open(&cfg.database.path)
        .await
        .with_context(|| format!("opening database {}", cfg.database.path.display()))?;

    let summarizer = summarize::build_summarizer(&cfg.ai)?;
    let metrics = Metrics::init(cfg.cache.expiration_secs)?;

    let hints = Arc::new(PriorityHints::new());
    let scheduler = EnrichmentScheduler::new(
        store.clone(),
        Arc::clone(&hints),
        Arc::clone(&summarizer),
        cfg.scheduler_config(),
    );
    // Orphaned claims go back to pending before any request can see them.
    scheduler.recover().await?;

    let source = GoogleNewsRss::http(cfg.source.clone(), cfg.cache.fetch_count)?;
    let cache = Arc::new(FreshnessCache::new(
        store.clone(),
        Arc::new(source),
        cfg.freshness_policy(),
    ));
    let query = Arc::new(QueryService::new(cache, hints, cfg.cache.page_size));

    let cancel = CancellationToken::new();
    let worker = scheduler.spawn(cancel.clone());
    tokio::spawn(ai_bootstrap::warm_up(
        Arc::clone(&summarizer),
        cfg.scheduler_config().summarize_timeout,
    ));

    let state = AppState {
        query,
        model_label: cfg.ai.display_label(),
        topics: cfg.filter_topics.clone(),
    };
    let app = news_digest::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!(addr = %cfg.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    cancel.cancel();
    if let Err(e) = worker.await {
        warn!(error = %e, "enrichment worker ended abnormally");
    }
    store.close().await;
    info!("bye");
    Ok(())
}
