use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::forward::ChatForwarder;
use crate::config::ProxyConfig;
use crate::convert::ConversionService;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "POST, GET, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type";

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub converter: Arc<ConversionService>,
    pub forwarder: Arc<ChatForwarder>,
    pub static_root: PathBuf,
}

impl AppState {
    pub fn new(
        config: &ProxyConfig,
        converter: Arc<ConversionService>,
        forwarder: Arc<ChatForwarder>,
    ) -> Self {
        Self {
            service_name: "heicbridge",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            converter,
            forwarder,
            static_root: config.static_root.clone(),
        }
    }
}

pub fn build_router(config: &ProxyConfig) -> Router {
    let converter = Arc::new(ConversionService::with_default_adapters());
    let forwarder = Arc::new(ChatForwarder::new(config.upstream.clone()));
    build_router_with_services(config, converter, forwarder)
}

pub fn build_router_with_services(
    config: &ProxyConfig,
    converter: Arc<ConversionService>,
    forwarder: Arc<ChatForwarder>,
) -> Router {
    let state = AppState::new(config, converter, forwarder);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/convert-heic",
            post(crate::api::convert::convert_heic_handler),
        )
        .route(
            "/api/convert",
            post(crate::api::convert::convert_image_handler),
        )
        .route("/api/openai", post(crate::api::forward::forward_chat_handler))
        .fallback(static_file_handler)
        .layer(middleware::from_fn(cors_middleware))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, config: ProxyConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(&config);
    info!(bind = %addr, static_root = %config.static_root.display(), "starting heicbridge HTTP surface");
    axum::serve(listener, app).await
}

/// Responds to any `OPTIONS` request with the permissive preflight headers and
/// tags every `/api` (and `/health`) response with the same CORS header set.
/// The static-file path is left untouched.
async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }
    let wants_cors =
        request.uri().path().starts_with("/api") || request.uri().path() == "/health";
    let mut response = next.run(request).await;
    if wants_cors {
        apply_cors_headers(&mut response);
    }
    response
}

pub fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

fn preflight_response() -> Response {
    let mut response = StatusCode::OK.into_response();
    apply_cors_headers(&mut response);
    response
}

/// `GET`/`HEAD` falls through to the static file server rooted at the
/// configured directory; every other unmatched request is a plain 404.
async fn static_file_handler(State(state): State<AppState>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }

    let mut static_files =
        ServeDir::new(state.static_root.as_path()).append_index_html_on_directories(true);
    match static_files.try_call(request).await {
        Ok(response) => response.map(Body::new),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("static file error: {error}"),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "started_unix_ms": state.started_unix_ms,
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
