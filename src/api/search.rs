//! Search query routes

use crate::error::{Error, Result};
use crate::models::RecipeFilters;
use crate::services::embedding::Embedder;
use crate::services::search_index::{QueryParams, SearchIndex, SearchMode};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// State shared across query handlers
#[derive(Clone)]
pub struct ApiState {
    pub search: Arc<SearchIndex>,
    pub embedder: Option<Arc<dyn Embedder>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    q: Option<String>,
    mode: Option<String>,
    limit: Option<i64>,
    from: Option<i64>,
    cuisine_type: Option<String>,
}

async fn search(
    State(state): State<ApiState>,
    Query(request): Query<SearchRequest>,
) -> Result<Json<Value>> {
    let mode = match request.mode.as_deref() {
        None => SearchMode::Text,
        Some(raw) => SearchMode::parse(raw)
            .ok_or_else(|| Error::Validation(format!("unknown search mode '{}'", raw)))?,
    };

    let text = request.q.as_deref().filter(|q| !q.trim().is_empty());

    // Semantic and hybrid modes embed the query text.
    let vector = match mode {
        SearchMode::Text => None,
        SearchMode::Semantic | SearchMode::Hybrid => {
            let text = text
                .ok_or_else(|| Error::Validation("query text 'q' is required".to_string()))?;
            let embedder = state
                .embedder
                .as_ref()
                .ok_or_else(|| Error::Config("no embedding sidecar configured".to_string()))?;
            Some(embedder.embed(text).await?)
        }
    };

    let filters = RecipeFilters {
        cuisine_type: request.cuisine_type.clone(),
        ..Default::default()
    };

    let hits = state
        .search
        .query(QueryParams {
            text,
            vector: vector.as_deref(),
            mode,
            filters: &filters,
            from: request.from.unwrap_or(0),
            size: request.limit.unwrap_or(10).clamp(1, 100),
        })
        .await?;

    let results: Vec<Value> = hits
        .iter()
        .map(|h| json!({"id": h.id, "score": h.score, "recipe": h.source}))
        .collect();
    Ok(Json(json!({ "count": results.len(), "hits": results })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;

    #[test]
    fn router_builds_with_minimal_state() {
        let search = SearchIndex::new(&SearchConfig {
            url: "http://localhost:9200".to_string(),
            index: "recipes".to_string(),
            username: None,
            password: None,
        })
        .unwrap();
        let state = ApiState {
            search: Arc::new(search),
            embedder: None,
        };
        let _router = router(state);
    }
}
