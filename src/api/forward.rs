use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::api::server::AppState;
use crate::config::UpstreamConfig;

const HEIC_MIME_PREFIX: &str = "data:image/heic;";
const HEIF_MIME_PREFIX: &str = "data:image/heif;";
const JPEG_MIME_PREFIX: &str = "data:image/jpeg;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("API key not configured on server")]
    NotConfigured,
    #[error("upstream request failed: {0}")]
    Transport(String),
}

/// Upstream HTTP seam; tests substitute a recording stub.
pub trait UpstreamTransport: Send + Sync + 'static {
    fn post_json(
        &self,
        endpoint: &str,
        bearer_token: &str,
        body: &Value,
    ) -> Result<UpstreamReply, ForwardError>;
}

pub struct ReqwestTransport {
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl UpstreamTransport for ReqwestTransport {
    fn post_json(
        &self,
        endpoint: &str,
        bearer_token: &str,
        body: &Value,
    ) -> Result<UpstreamReply, ForwardError> {
        // `None` disables reqwest's default timeout, keeping the upstream call
        // unbounded unless configured otherwise.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ForwardError::Transport(format!("http client init failed: {e}")))?;

        let response = client
            .post(endpoint)
            .bearer_auth(bearer_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| ForwardError::Transport(format!("upstream body read failed: {e}")))?
            .to_vec();
        Ok(UpstreamReply { status, body })
    }
}

/// Relabels HEIC/HEIF data URLs inside `messages[*].content[*]` image blocks
/// as JPEG, in place. Only the MIME segment changes; the base64 payload stays
/// byte-for-byte HEIC. The upstream API does not officially accept HEIC and
/// this shim relies on it tolerating the mismatch. Returns how many URLs were
/// rewritten.
pub fn rewrite_heic_image_urls(body: &mut Value) -> usize {
    let mut rewritten = 0;
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return 0;
    };
    for message in messages {
        let Some(content) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for block in content {
            if block.get("type").and_then(Value::as_str) != Some("image_url") {
                continue;
            }
            let Some(url) = block.get_mut("image_url").and_then(|v| v.get_mut("url")) else {
                continue;
            };
            let Some(current) = url.as_str() else {
                continue;
            };
            let relabeled = current
                .strip_prefix(HEIC_MIME_PREFIX)
                .or_else(|| current.strip_prefix(HEIF_MIME_PREFIX))
                .map(|rest| format!("{JPEG_MIME_PREFIX}{rest}"));
            if let Some(next) = relabeled {
                *url = Value::String(next);
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Rewrites HEIC MIME markers in a chat request and forwards it verbatim to
/// the upstream endpoint with the server-held bearer credential.
pub struct ChatForwarder {
    config: UpstreamConfig,
    transport: Arc<dyn UpstreamTransport>,
}

impl ChatForwarder {
    pub fn new(config: UpstreamConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.timeout));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: UpstreamConfig, transport: Arc<dyn UpstreamTransport>) -> Self {
        Self { config, transport }
    }

    pub fn forward(&self, mut body: Value) -> Result<UpstreamReply, ForwardError> {
        let rewritten = rewrite_heic_image_urls(&mut body);
        if rewritten > 0 {
            info!(rewritten, "relabeled HEIC image URLs as JPEG for upstream compatibility");
        }

        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ForwardError::NotConfigured);
        };
        self.transport
            .post_json(self.config.endpoint.as_str(), api_key, &body)
    }
}

/// `POST /api/openai`: forward a chat-completion request upstream. The
/// upstream status and body propagate verbatim on success and error alike.
pub async fn forward_chat_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Response {
    let forwarder = state.forwarder.clone();
    let result = tokio::task::spawn_blocking(move || forwarder.forward(body)).await;

    match result {
        Ok(Ok(reply)) => upstream_response(reply),
        Ok(Err(error)) => {
            error!(error = %error, "chat forwarding failed");
            forward_error_response(&error)
        }
        Err(join_error) => {
            error!(error = %join_error, "chat forwarding task failed");
            forward_error_response(&ForwardError::Transport(format!(
                "forward task failed: {join_error}"
            )))
        }
    }
}

fn upstream_response(reply: UpstreamReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    if !status.is_success() {
        warn!(status = reply.status, "upstream returned an error status");
    }
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(reply.body))
        .expect("upstream response should build")
}

fn forward_error_response(error: &ForwardError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": error.to_string()})),
    )
        .into_response()
}
