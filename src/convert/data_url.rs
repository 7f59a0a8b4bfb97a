use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

pub const HEIC_DATA_URL_PREFIX: &str = "data:image/heic;base64,";
pub const HEIF_DATA_URL_PREFIX: &str = "data:image/heif;base64,";
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("Missing image payload")]
    Empty,
    #[error("Invalid HEIC data URL format")]
    UnsupportedMime,
    #[error("Invalid base64 payload: {0}")]
    Base64(String),
}

/// Strict parser for the proxy endpoint. Only `data:image/heic;base64,` and
/// `data:image/heif;base64,` prefixes are accepted; anything else is rejected
/// before any decode attempt.
pub fn decode_heic_data_url(raw: &str) -> Result<Vec<u8>, DataUrlError> {
    if raw.trim().is_empty() {
        return Err(DataUrlError::Empty);
    }
    let payload = raw
        .strip_prefix(HEIC_DATA_URL_PREFIX)
        .or_else(|| raw.strip_prefix(HEIF_DATA_URL_PREFIX))
        .ok_or(DataUrlError::UnsupportedMime)?;
    decode_base64(payload)
}

/// Lenient parser for the single-function endpoint: a data URL of any subtype
/// or a bare base64 string.
pub fn decode_image_payload(raw: &str) -> Result<Vec<u8>, DataUrlError> {
    if raw.trim().is_empty() {
        return Err(DataUrlError::Empty);
    }
    let payload = if raw.starts_with("data:") {
        raw.split_once(',')
            .map(|(_, rest)| rest)
            .ok_or(DataUrlError::UnsupportedMime)?
    } else {
        raw
    };
    decode_base64(payload)
}

pub fn jpeg_data_url(jpeg_bytes: &[u8]) -> String {
    format!("{JPEG_DATA_URL_PREFIX}{}", BASE64_STANDARD.encode(jpeg_bytes))
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, DataUrlError> {
    if payload.is_empty() {
        return Err(DataUrlError::Empty);
    }
    BASE64_STANDARD
        .decode(payload.as_bytes())
        .map_err(|error| DataUrlError::Base64(error.to_string()))
}
