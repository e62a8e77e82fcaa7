use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::error::Error;
use crate::model::ItemView;
use crate::query::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    /// Human-readable summarizer label, e.g. "Ollama Gemma3n".
    pub model_label: String,
    /// Quick-filter topics offered to the front end.
    pub topics: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/items", get(items))
        .route("/info", get(info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemsResp {
    items: Vec<ItemView>,
    has_more: bool,
    page: i64,
    topic: String,
}

#[derive(Serialize)]
struct InfoResp {
    model: String,
    topics: Vec<String>,
}

/// Error body: `{error}` plus the topic for ingestion failures.
#[derive(Serialize)]
struct ErrorResp {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, topic) = match &self.0 {
            Error::Ingestion { topic, .. } => {
                warn!(topic = %topic, error = %self.0, "page request failed upstream");
                (StatusCode::BAD_GATEWAY, Some(topic.clone()))
            }
            other => {
                error!(error = %other, "page request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, None)
            }
        };
        let body = ErrorResp {
            error: self.0.to_string(),
            topic,
        };
        (status, Json(body)).into_response()
    }
}

/// Non-numeric or missing `page` means page 1.
fn parse_page(raw: Option<&String>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .max(1)
}

async fn items(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<ItemsResp>, ApiError> {
    let page = parse_page(q.get("page"));
    let topic = q.get("topic").map(String::as_str);

    let p = state.query.get_page(topic, page).await?;
    Ok(Json(ItemsResp {
        items: p.items.into_iter().map(ItemView::from).collect(),
        has_more: p.has_more,
        page: p.page,
        topic: p.topic,
    }))
}

async fn info(State(state): State<AppState>) -> Json<InfoResp> {
    Json(InfoResp {
        model: state.model_label.clone(),
        topics: state.topics.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_param_is_defensive() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some(&"abc".to_string())), 1);
        assert_eq!(parse_page(Some(&"0".to_string())), 1);
        assert_eq!(parse_page(Some(&"-4".to_string())), 1);
        assert_eq!(parse_page(Some(&" 3 ".to_string())), 3);
    }
}
