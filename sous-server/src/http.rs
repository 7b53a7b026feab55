//! SousChef HTTP API
//!
//! Axum-based server exposing the sous-chef pipeline over HTTP.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET    /health          storage status
//! - GET    /version         server version info
//! - POST   /chef            streamed chat completion (text/plain)
//! - POST   /nutrition       nutrition estimate for an ingredient list
//! - POST   /parse-recipe    extract + validate a recipe from assistant text
//! - GET    /recipes         public recipes, or the caller's with `?user_id=`
//! - POST   /recipes         create a recipe
//! - GET    /recipes/:id     read one recipe
//! - PATCH  /recipes/:id     partial update (owner only)
//! - DELETE /recipes/:id     delete (owner only)
//! - GET    /goals, PUT /goals
//! - GET    /intake          intake, goals and remaining macros for a day
//! - GET    /meals, POST /meals

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use sous_core::{ChatBackend, ChefRequest, NutritionEstimator, SousConfig, SousError, Store};

use crate::subsystems::{chef, nutrition, parse, recipes, tracking};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn Store>,
    pub chat: Arc<dyn ChatBackend>,
    pub estimator: Arc<dyn NutritionEstimator>,
    pub config: SousConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/chef", post(chef_handler))
        .route("/nutrition", post(nutrition_handler))
        .route("/parse-recipe", post(parse_recipe_handler))
        .route("/recipes", get(list_recipes_handler).post(create_recipe_handler))
        .route(
            "/recipes/:id",
            get(get_recipe_handler)
                .patch(update_recipe_handler)
                .delete(delete_recipe_handler),
        )
        .route("/goals", get(get_goals_handler).put(update_goals_handler))
        .route("/intake", get(intake_handler))
        .route("/meals", get(list_meals_handler).post(log_meal_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("SousChef HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct UserQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub date: Option<chrono::NaiveDate>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

/// Map a domain error onto a status code and the user-facing message.
pub fn error_response(e: &SousError) -> (StatusCode, serde_json::Value) {
    let status = match e {
        SousError::Auth(_) => StatusCode::UNAUTHORIZED,
        SousError::Forbidden(_) => StatusCode::FORBIDDEN,
        SousError::Network(_) => StatusCode::BAD_GATEWAY,
        SousError::Parse(_) | SousError::MissingFields { .. } | SousError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        SousError::NotFound(_) => StatusCode::NOT_FOUND,
        SousError::Persistence(_)
        | SousError::Database(_)
        | SousError::Config(_)
        | SousError::Io(_)
        | SousError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
    } else {
        tracing::debug!(error = %e, "Request rejected");
    }

    let body = serde_json::to_value(ErrorResponse::new(e.user_message()))
        .unwrap_or_else(|_| serde_json::json!({"error": e.user_message()}));
    (status, body)
}

/// Serialize a success body, folding serialization failures into a 500.
pub fn ok_json<T: Serialize>(status: StatusCode, value: &T) -> (StatusCode, serde_json::Value) {
    match serde_json::to_value(value) {
        Ok(v) => (status, v),
        Err(e) => error_response(&SousError::Other(e.to_string())),
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Inner health check: asks storage for its status.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    match state.store.health().await {
        Ok(storage) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "storage": storage,
                "chat_backend": state.chat.name(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "sous",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

type Shared = State<Arc<HttpState>>;

pub async fn health_handler(State(state): Shared) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn chef_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<ChefRequest>,
) -> Response {
    match chef::chef_inner(&state, &headers, req).await {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn nutrition_handler(
    State(state): Shared,
    Json(req): Json<nutrition::NutritionRequest>,
) -> impl IntoResponse {
    let (status, body) = nutrition::nutrition_inner(&state, req).await;
    (status, Json(body))
}

pub async fn parse_recipe_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<parse::ParseRecipeRequest>,
) -> impl IntoResponse {
    let (status, body) = parse::parse_recipe_inner(&state, &headers, req).await;
    (status, Json(body))
}

pub async fn list_recipes_handler(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let (status, body) = recipes::list_inner(&state, &headers, query.user_id).await;
    (status, Json(body))
}

pub async fn create_recipe_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<sous_core::models::NewRecipe>,
) -> impl IntoResponse {
    let (status, body) = recipes::create_inner(&state, &headers, req).await;
    (status, Json(body))
}

pub async fn get_recipe_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = recipes::get_inner(&state, &headers, id).await;
    (status, Json(body))
}

pub async fn update_recipe_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(update): Json<sous_core::models::RecipeUpdate>,
) -> impl IntoResponse {
    let (status, body) = recipes::update_inner(&state, &headers, id, update).await;
    (status, Json(body))
}

pub async fn delete_recipe_handler(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = recipes::delete_inner(&state, &headers, id).await;
    (status, Json(body))
}

pub async fn get_goals_handler(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let (status, body) = tracking::goals_inner(&state, &headers, query.user_id).await;
    (status, Json(body))
}

pub async fn update_goals_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(req): Json<tracking::GoalsRequest>,
) -> impl IntoResponse {
    let (status, body) = tracking::update_goals_inner(&state, &headers, req).await;
    (status, Json(body))
}

pub async fn intake_handler(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let (status, body) = tracking::intake_inner(&state, &headers, query.user_id, query.date).await;
    (status, Json(body))
}

pub async fn log_meal_handler(
    State(state): Shared,
    headers: HeaderMap,
    Json(meal): Json<sous_core::models::NewMeal>,
) -> impl IntoResponse {
    let (status, body) = tracking::log_meal_inner(&state, &headers, meal).await;
    (status, Json(body))
}

pub async fn list_meals_handler(
    State(state): Shared,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let (status, body) =
        tracking::list_meals_inner(&state, &headers, query.user_id, query.limit).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
