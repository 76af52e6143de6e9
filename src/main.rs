use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod analysis;
mod annotate;
mod config;
mod detection;
mod error;
mod estimate;
mod infer;
mod inference;
mod models;
mod reconcile;
mod scaled;
mod storage;

use analysis::Analyzer;
use annotate::AnnotationStyle;
use config::AppConfig;
use detection::Detection;
use error::UploadError;
use estimate::CleanupEstimate;
use inference::InferenceContext;
use storage::{ImageStore, LocalImageStore};

#[derive(Clone)]
struct AppState {
    analyzer: Arc<Analyzer>,
    store: Arc<LocalImageStore>,
    config: Arc<AppConfig>,
}

impl AppState {
    fn new(config: AppConfig, inference: Arc<InferenceContext>, style: AnnotationStyle) -> Self {
        let analyzer = Analyzer::new(inference, config.scales.clone(), style, config.people_count_basis);
        let store = LocalImageStore::new(config.upload_dir.clone(), config.public_url.clone());
        Self { analyzer: Arc::new(analyzer), store: Arc::new(store), config: Arc::new(config) }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    detector_loaded: bool,
    selected: Option<models::ModelSelection>,
}

#[derive(Serialize)]
struct ConfigResponse {
    config: AppConfig,
    models: Vec<models::ModelCatalogEntry>,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    status: &'static str,
    trash_items: Vec<Detection>,
    cleanup_estimate: CleanupEstimate,
    original_image_url: String,
    annotated_image: String,
}

#[derive(Error, Debug)]
enum ApiError {
    #[error("No image uploaded")]
    NoImage,
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoImage => StatusCode::BAD_REQUEST,
            // 413 when the body limit is hit
            ApiError::Multipart(err) => err.status(),
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upload(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("event" = "request.fail", error = %self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,axum=info,hyper=info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "event" = "config.invalid");
            std::process::exit(2);
        }
    };
    let inference = Arc::new(InferenceContext::load(&config.models_dir));
    let style = AnnotationStyle::load(config.font_path.as_deref(), config.jpeg_quality);
    let addr = config.addr;
    info!("event" = "config.loaded", scales = ?config.scales, basis = %config.people_count_basis);

    let app = router(AppState::new(config, inference, style));
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, "listening" = %addr, "event" = "server.bind_fail");
            std::process::exit(1);
        }
    };
    info!("listening" = %addr, "event" = "server.start");
    if let Err(err) = axum::serve(listener, app).await {
        error!(%err, "server error");
    }
}

fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config_info))
        .route("/analyze", post(analyze_trash))
        .route("/uploads/:name", get(get_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let inference = state.analyzer.inference();
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        detector_loaded: inference.detector.is_some(),
        selected: inference.selected_model.clone(),
    };
    (StatusCode::OK, Json(body))
}

async fn config_info(State(state): State<AppState>) -> impl IntoResponse {
    let body = ConfigResponse {
        config: state.config.as_ref().clone(),
        models: models::inspect_models_dir(&state.config.models_dir),
    };
    (StatusCode::OK, Json(body))
}

async fn analyze_trash(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            image = Some(field.bytes().await?);
            break;
        }
    }
    let bytes = image.filter(|b| !b.is_empty()).ok_or_else(|| {
        warn!("event" = "analyze.no_image");
        ApiError::NoImage
    })?;

    let span = info_span!("analyze", request_id = %uuid::Uuid::new_v4(), bytes = bytes.len());
    // decoding and inference are CPU bound
    let (url, analysis) = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let url = state
            .store
            .store(&bytes)
            .inspect_err(|err| error!("event" = "upload.fail", error = %err))?;
        Ok::<_, UploadError>((url, state.analyzer.analyze(&bytes)))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(AnalyzeResponse {
        status: "success",
        trash_items: analysis.trash_items,
        cleanup_estimate: analysis.cleanup_estimate,
        annotated_image: analysis.annotated_image.unwrap_or_else(|| url.clone()),
        original_image_url: url,
    }))
}

async fn get_upload(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let path = state.store.resolve(&name).ok_or(ApiError::NotFound)?;
    let bytes = tokio::fs::read(&path).await.map_err(|_| ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, storage::content_type_for(&name))], bytes))
}
