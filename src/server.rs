//! HTTP surface of the analyzer.
//!
//! | Route                       | Purpose                                    |
//! |-----------------------------|--------------------------------------------|
//! | `POST /api/analyze/stream`  | run an analysis, stream its log as SSE     |
//! | `POST /api/analyze`         | run an analysis, answer with the artifact  |
//! | `GET /api/config`           | upstream URLs and default platforms        |
//! | `GET /api/health`           | liveness                                   |
//!
//! Only one analysis runs at a time; a request arriving while one is in
//! flight gets `409 conflict`.

use crate::config::ServerConfig;
use crate::relay::{run_buffered, spawn_relay, RelayCommand, RelayEvent, RunRequest};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Held by the relay task for the lifetime of a run.
    pub run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    ollama_api: &'a str,
    hot_search_api: &'a str,
    default_platforms: &'a [String],
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/analyze", post(analyze))
        .route("/api/analyze/stream", post(analyze_stream))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors())
        .with_state(state)
}

/// Bind, serve until ctrl-c or SIGTERM, then drain in-flight requests.
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn Error>> {
    let bind = config.bind;
    let app = build_app(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    Json(ConfigView {
        ollama_api: &config.ollama_api,
        hot_search_api: &config.hot_search_api,
        default_platforms: &config.default_platforms,
    })
    .into_response()
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, ApiError> {
    let events = start_run(&state, request)?;
    match run_buffered(events).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!(error = %e, "Analysis request failed");
            Err(ApiError::new("run_failed", e.to_string()))
        }
    }
}

async fn analyze_stream(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let events = start_run(&state, request)?;
    let stream = ReceiverStream::new(events).map(|event| Event::default().json_data(event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE)))
}

/// Validate the request, take the run lock and launch the child.
fn start_run(
    state: &AppState,
    request: RunRequest,
) -> Result<mpsc::Receiver<RelayEvent>, ApiError> {
    let plan = request
        .resolve(&state.config)
        .map_err(|message| ApiError::new("validation_error", message))?;
    let guard = state.run_lock.clone().try_lock_owned().map_err(|_| {
        warn!("Rejected analysis request, a run is already in progress");
        ApiError::new("conflict", "an analysis run is already in progress")
    })?;

    info!(
        model = %plan.model,
        topics_per_platform = plan.topics_per_platform,
        platforms = ?plan.platforms,
        "Starting analysis run"
    );
    let command = RelayCommand::for_run(&state.config, &plan);
    Ok(spawn_relay(command, state.config.save_dir.clone(), guard))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("received shutdown signal, starting graceful shutdown");
}
