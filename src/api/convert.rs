use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::api::server::AppState;
use crate::convert::ConvertError;

type ApiObject<T> = (StatusCode, Json<T>);

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertHeicRequest {
    #[serde(rename = "heicDataUrl")]
    pub heic_data_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ConvertHeicResponse {
    success: bool,
    #[serde(rename = "jpegDataUrl")]
    jpeg_data_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertImageRequest {
    #[serde(rename = "imageData")]
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ConvertImageResponse {
    success: bool,
    #[serde(rename = "dataUrl")]
    data_url: String,
    message: &'static str,
}

/// `POST /api/convert-heic`: strict HEIC/HEIF data URL in, JPEG data URL out.
pub async fn convert_heic_handler(
    State(state): State<AppState>,
    Json(payload): Json<ConvertHeicRequest>,
) -> ApiObject<Value> {
    let Some(raw) = payload.heic_data_url else {
        return bad_request("Missing heicDataUrl");
    };

    let converter = state.converter.clone();
    let result =
        tokio::task::spawn_blocking(move || converter.convert_heic_data_url(raw.as_str())).await;

    match result {
        Ok(Ok(jpeg_data_url)) => (
            StatusCode::OK,
            into_json(ConvertHeicResponse {
                success: true,
                jpeg_data_url,
            }),
        ),
        Ok(Err(error)) if error.is_bad_request() => bad_request(error.to_string()),
        Ok(Err(error)) => conversion_failed(&error),
        Err(join_error) => {
            error!(error = %join_error, "heic conversion task failed");
            conversion_failed(&ConvertError::AllMethodsFailed)
        }
    }
}

/// `POST /api/convert`: the single-function variant. Accepts a data URL of any
/// subtype or a bare base64 string and answers in the function's own response
/// shape.
pub async fn convert_image_handler(
    State(state): State<AppState>,
    Json(payload): Json<ConvertImageRequest>,
) -> ApiObject<Value> {
    let Some(raw) = payload.image_data else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No image data provided"})),
        );
    };

    let converter = state.converter.clone();
    let result =
        tokio::task::spawn_blocking(move || converter.convert_image_payload(raw.as_str())).await;

    match result {
        Ok(Ok(data_url)) => (
            StatusCode::OK,
            into_json(ConvertImageResponse {
                success: true,
                data_url,
                message: "HEIC converted to JPEG successfully",
            }),
        ),
        Ok(Err(error)) if error.is_bad_request() => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": error.to_string()})),
        ),
        Ok(Err(error)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "HEIC conversion failed",
                "details": error.to_string(),
            })),
        ),
        Err(join_error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "HEIC conversion failed",
                "details": format!("conversion task failed: {join_error}"),
            })),
        ),
    }
}

fn bad_request(message: impl Into<String>) -> ApiObject<Value> {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": message.into()})),
    )
}

fn conversion_failed(error: &ConvertError) -> ApiObject<Value> {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "error": error.to_string()})),
    )
}

fn into_json(payload: impl Serialize) -> Json<Value> {
    Json(serde_json::to_value(payload).expect("api payload should serialize"))
}
