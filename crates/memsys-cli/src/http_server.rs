//! HTTP API transport (§6): a thin axum front end over the same
//! `Orchestrator` the stdio MCP server uses. No teacher precedent existed
//! for this surface — the teacher declared axum/tower-http/reqwest but
//! never wired a router — so this is modeled on the corpus's own
//! axum-router-plus-tower-http-layers convention.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use memsys_core::injector::{ContextInjectionRequest, InjectionMode};
use memsys_core::model::Conversation;
use memsys_core::orchestrator::Orchestrator;
use memsys_core::retriever::{QueryType, SearchQuery};
use memsys_core::ErrorPayload;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

struct ApiError(memsys_core::CoreError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = ErrorPayload::from(&self.0);
        let status = match &self.0 {
            memsys_core::CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            memsys_core::CoreError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            memsys_core::CoreError::TransientExternal(_) => StatusCode::BAD_GATEWAY,
            memsys_core::CoreError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            memsys_core::CoreError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(payload)).into_response()
    }
}

impl From<memsys_core::CoreError> for ApiError {
    fn from(e: memsys_core::CoreError) -> Self {
        Self(e)
    }
}

pub async fn serve(orchestrator: Arc<Orchestrator>, bind: &str) -> anyhow::Result<()> {
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("HTTP API listening on {bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/conversation/store", post(store_conversation))
        .route("/memory/search", post(search))
        .route("/memory/inject", post(inject))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(orchestrator)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_s: u64,
    conversations_processed: u64,
    memories_created: u64,
    searches: u64,
    injections: u64,
}

async fn status(State(orchestrator): State<Arc<Orchestrator>>) -> Json<StatusResponse> {
    let report = orchestrator.status().await;
    Json(StatusResponse {
        uptime_s: report.uptime_s,
        conversations_processed: report.conversations_processed,
        memories_created: report.memories_created,
        searches: report.searches,
        injections: report.injections,
    })
}

async fn store_conversation(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(conversation): Json<Conversation>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = orchestrator.store_conversation(conversation).await?;
    Ok(Json(serde_json::json!({
        "memory_unit_ids": result.memory_unit_ids,
        "warnings": result.warnings,
    })))
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    project_id: Option<String>,
    limit: Option<usize>,
    min_score: Option<f64>,
}

async fn search(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = SearchQuery {
        text: body.query,
        query_type: QueryType::Hybrid,
        limit: body.limit.unwrap_or(memsys_core::constants::DEFAULT_SEARCH_LIMIT),
        min_score: body.min_score.unwrap_or(memsys_core::constants::DEFAULT_MIN_SCORE),
        project_id: body.project_id,
    };
    let outcome = orchestrator.search_memories(query).await?;
    Ok(Json(serde_json::json!({
        "results": outcome.results,
        "warnings": outcome.warnings,
    })))
}

#[derive(Deserialize)]
struct InjectBody {
    prompt: String,
    query_text: Option<String>,
    mode: Option<String>,
    max_tokens: Option<u32>,
    project_id: Option<String>,
}

async fn inject(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(body): Json<InjectBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mode = match body.mode.as_deref() {
        Some("minimal") => InjectionMode::Minimal,
        Some("comprehensive") => InjectionMode::Comprehensive,
        _ => InjectionMode::Balanced,
    };
    let request = ContextInjectionRequest {
        original_prompt: body.prompt,
        query_text: body.query_text,
        injection_mode: mode,
        max_tokens: body.max_tokens.unwrap_or(4_000),
        project_id: body.project_id,
    };
    let result = orchestrator.inject_context(request).await?;
    Ok(Json(serde_json::json!({
        "enhanced_prompt": result.enhanced_prompt,
        "tokens_used": result.tokens_used,
        "warnings": result.warnings,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt as _;

    async fn test_app() -> Router {
        let orchestrator = crate::wiring::test_orchestrator().await;
        router(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_search_empty_store_returns_empty_results() {
        let app = test_app().await;
        let body = serde_json::json!({ "query": "anything" });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/memory/search")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
