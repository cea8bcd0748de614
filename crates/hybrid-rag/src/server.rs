//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | `{query, image?}` → `{answer, sources}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `image` is a path readable by the server process, as with `hrag ask
//! --image`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `encoding_failed` (400),
//! `generator_error` (502), `internal` (500).
//!
//! Query encoding runs on the blocking thread pool; each request gets a
//! fresh prompt session.

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use hybrid_rag_core::query::{HybridQueryBuilder, QuerySpec};
use hybrid_rag_core::retrieval::{self, Retrieved};
use hybrid_rag_core::store::Store;

use crate::chat::{self, ChatAnswer};
use crate::config::Config;
use crate::encoders::{create_encoders, Encoders};
use crate::generator::{create_generator, Generator};
use crate::sqlite_store::SqliteStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub encoders: Encoders,
    pub generator: Arc<dyn Generator>,
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map a query-building failure to a client or server error.
fn classify_query_error(err: hybrid_rag_core::Error) -> AppError {
    use hybrid_rag_core::Error;
    match err {
        Error::Encoding { .. } => {
            AppError::new(StatusCode::BAD_REQUEST, "encoding_failed", err.to_string())
        }
        Error::Config { .. } => bad_request(err.to_string()),
        other => internal(other.to_string()),
    }
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub image: Option<PathBuf>,
}

async fn build_spec(state: &AppState, req: &ChatRequest) -> Result<QuerySpec, AppError> {
    let config = state.config.clone();
    let encoders = state.encoders.clone();
    let query = req.query.clone();
    let image = req.image.clone();

    tokio::task::spawn_blocking(move || {
        let schema = config.schema();
        let adapter = encoders.adapter();
        let builder = HybridQueryBuilder::new(&adapter, &schema, config.index.name.clone());
        builder.build_query(&query, image.as_deref(), config.retrieval.top_k)
    })
    .await
    .map_err(|e| internal(format!("query encoding task failed: {}", e)))?
    .map_err(classify_query_error)
}

pub async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAnswer>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let spec = build_spec(&state, &req).await?;
    let hits = retrieval::execute(state.store.as_ref(), &spec)
        .await
        .map_err(|e| internal(e.to_string()))?;
    let retrieved = Retrieved::from_hits(hits);

    let mut session = chat::new_session(&state.config);
    let reply = chat::complete(
        &state.config,
        &mut session,
        state.generator.as_ref(),
        &req.query,
        &retrieved,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "generation failed");
        AppError::new(StatusCode::BAD_GATEWAY, "generator_error", format!("{:#}", e))
    })?;

    Ok(Json(reply))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Routes with permissive CORS.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Entry point for `hrag serve`.
pub async fn run_server(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let encoders = create_encoders(&config.embedding)?;
    let generator = create_generator(&config.generator)?;

    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
        encoders,
        generator: Arc::from(generator),
    };

    let bind_addr = config.server.bind.clone();
    let app = router(state);

    println!("Chat server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, index = %config.index.name, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
