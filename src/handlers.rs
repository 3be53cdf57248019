use crate::errors::AppError;
use crate::models::{
    AcceptRequest, Case, DetailResponse, FeedResponse, OpenCaseRequest, SendMessageRequest,
    StatusResponse,
};
use crate::pipeline::{FeedFilters, FilterUpdate};
use crate::service::FeedService;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// The volunteer session and its backend.
    pub service: FeedService,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rota-feed",
            "version": env!("CARGO_PKG_VERSION"),
            "offline": state.service.is_offline(),
        })),
    )
}

/// GET /api/v1/status
///
/// Online/offline mode, the offline notice and the current load error.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(state.service.status().await)
}

/// GET /api/v1/feed
pub async fn get_feed(State(state): State<Arc<AppState>>) -> Json<FeedResponse> {
    Json(state.service.feed().await)
}

/// GET /api/v1/feed/filters
pub async fn get_filters(State(state): State<Arc<AppState>>) -> Json<FeedFilters> {
    Json(state.service.filters().await)
}

/// PUT /api/v1/feed/filters
///
/// Changes search, status, categories, radius, sort or viewer. Fields left
/// out keep their value. Returns the recomputed feed; nothing is fetched.
pub async fn update_filters(
    State(state): State<Arc<AppState>>,
    Json(update): Json<FilterUpdate>,
) -> Json<FeedResponse> {
    tracing::info!("PUT /feed/filters - {:?}", update);
    Json(state.service.update_filters(update).await)
}

/// POST /api/v1/feed/next
pub async fn load_next_page(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeedResponse>, AppError> {
    Ok(Json(state.service.load_next_page().await?))
}

/// POST /api/v1/feed/reload
///
/// Drops the loaded list and local dismissals, then loads the first page.
pub async fn reload_feed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FeedResponse>, AppError> {
    tracing::info!("POST /feed/reload");
    Ok(Json(state.service.reload().await?))
}

/// DELETE /api/v1/feed/error
pub async fn dismiss_error(State(state): State<Arc<AppState>>) -> StatusCode {
    state.service.dismiss_error().await;
    StatusCode::NO_CONTENT
}

/// POST /api/v1/cases/:id/dismiss
pub async fn dismiss_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<FeedResponse> {
    Json(state.service.dismiss(&id).await)
}

/// POST /api/v1/cases/:id/accept
pub async fn accept_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AcceptRequest>,
) -> Result<Json<Case>, AppError> {
    tracing::info!("POST /cases/{}/accept", id);
    Ok(Json(state.service.accept(&id, &payload.volunteer_name).await?))
}

/// POST /api/v1/cases/:id/complete
pub async fn complete_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Case>, AppError> {
    tracing::info!("POST /cases/{}/complete", id);
    Ok(Json(state.service.complete(&id).await?))
}

/// POST /api/v1/cases/:id/call
///
/// Records a simulated call as a system message. The message itself shows
/// up through the open panel's subscription.
pub async fn simulate_call(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    tracing::info!("POST /cases/{}/call", id);
    state.service.simulate_call(&id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/cases/:id/open
///
/// Opens the detail panel on the requested tab. A body is optional.
pub async fn open_case(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<OpenCaseRequest>>,
) -> Result<Json<DetailResponse>, AppError> {
    let tab = payload.map(|Json(p)| p.tab).unwrap_or_default();
    tracing::info!("POST /cases/{}/open - tab {:?}", id, tab);
    Ok(Json(state.service.open_case(&id, tab).await?))
}

/// GET /api/v1/detail
pub async fn get_detail(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DetailResponse>, AppError> {
    Ok(Json(state.service.detail().await?))
}

/// DELETE /api/v1/detail
pub async fn close_detail(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.service.close_panel().await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// POST /api/v1/detail/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<StatusCode, AppError> {
    state.service.send_message(&payload.content).await?;
    Ok(StatusCode::ACCEPTED)
}
