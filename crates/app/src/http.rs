use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use nutrition_rag_core::{
    ChatPayload, HttpEmbeddingClient, HttpGenerationClient, NoUserContext, PostgresStore,
    RagEngine, RagError, RecommendationPayload, SearchFilters,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

type Engine = RagEngine<HttpEmbeddingClient, HttpGenerationClient, PostgresStore, NoUserContext>;

/// Uniform response envelope. `data` is present on success, `message`
/// carries the error text otherwise.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }
}

type ApiError = (StatusCode, Json<Envelope<()>>);

fn api_error(error: RagError) -> ApiError {
    let status = match &error {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RagError::Forbidden(_) => StatusCode::FORBIDDEN,
        RagError::NotFound(_) => StatusCode::NOT_FOUND,
        RagError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(Envelope {
            success: false,
            data: None,
            message: Some(error.to_string()),
        }),
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    top_k: Option<usize>,
    #[serde(flatten)]
    filters: SearchFilters,
}

#[derive(Serialize)]
struct SearchData {
    results: Vec<nutrition_rag_core::SearchResult>,
}

#[derive(Serialize)]
struct RecommendationData {
    recommendation: nutrition_rag_core::RecommendationRecord,
}

pub async fn serve(bind: &str, engine: Engine) -> anyhow::Result<()> {
    let app = router(Arc::new(engine));
    let addr: SocketAddr = bind.parse()?;
    info!(%addr, "http server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rag/search", get(search_get).post(search_post))
        .route("/rag/chat", post(chat))
        .route("/recommendation", post(recommend))
        .with_state(engine)
}

async fn health() -> Json<Envelope<&'static str>> {
    Envelope::ok("ok")
}

async fn search_post(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let results = engine
        .search(&request.query, request.top_k, &request.filters)
        .await
        .map_err(api_error)?;
    Ok(Envelope::ok(SearchData { results }))
}

// Flat struct for the query-string form; `Query` cannot drive
// serde(flatten) the way the JSON body can.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(rename = "q")]
    query: String,
    top_k: Option<usize>,
    source: Option<String>,
    language: Option<String>,
    topic: Option<String>,
    chapter: Option<String>,
}

async fn search_get(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Envelope<SearchData>>, ApiError> {
    let filters = SearchFilters {
        source: params.source,
        language: params.language,
        topic: params.topic,
        chapter: params.chapter,
    };
    let results = engine
        .search(&params.query, params.top_k, &filters)
        .await
        .map_err(api_error)?;
    Ok(Envelope::ok(SearchData { results }))
}

async fn chat(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<Envelope<nutrition_rag_core::ChatResponse>>, ApiError> {
    let user_id = caller_id(&headers);
    let response = engine
        .chat(user_id.as_deref(), &payload)
        .await
        .map_err(api_error)?;
    Ok(Envelope::ok(response))
}

async fn recommend(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Json(payload): Json<RecommendationPayload>,
) -> Result<Json<Envelope<RecommendationData>>, ApiError> {
    let user_id = caller_id(&headers).ok_or_else(|| {
        api_error(RagError::Unauthorized(
            "x-user-id header is required".to_string(),
        ))
    })?;
    let recommendation = engine
        .recommend(&user_id, &payload)
        .await
        .map_err(api_error)?;
    Ok(Envelope::ok(RecommendationData { recommendation }))
}

/// Caller identity comes from the `x-user-id` header; the gateway in
/// front of this service is expected to have authenticated it.
fn caller_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-user-id")?.to_str().ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
