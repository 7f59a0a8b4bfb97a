pub mod data_url;
pub mod decoder;
pub mod magick;

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use self::data_url::{decode_heic_data_url, decode_image_payload, jpeg_data_url, DataUrlError};
use self::decoder::{JpegTranscoder, LibheifTranscoder};
use self::magick::MagickConverter;

/// JPEG quality for the proxy `/api/convert-heic` path.
pub const PROXY_JPEG_QUALITY: u8 = 85;
/// JPEG quality for the single-function `/api/convert` path. The proxy and
/// function entry points use different literals; they are kept distinct rather
/// than unified.
pub const FUNCTION_JPEG_QUALITY: u8 = 90;
/// `-quality` argument passed to ImageMagick on the server fallback path.
pub const MAGICK_FALLBACK_QUALITY: u8 = 85;
/// `-quality` argument passed to ImageMagick by the batch driver.
pub const BATCH_MAGICK_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    BadRequest(#[from] DataUrlError),
    /// Both the native decoder and the external tool failed. Deliberately does
    /// not identify which method ran last.
    #[error("Server-side HEIC conversion failed")]
    AllMethodsFailed,
}

impl ConvertError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }
}

/// Orchestrates decode, RGB normalization and JPEG encode: the native decoder
/// runs first, the ImageMagick fallback runs exactly once when it fails, and
/// exhausting both yields the aggregate failure.
#[derive(Clone)]
pub struct ConversionService {
    transcoder: Arc<dyn JpegTranscoder>,
    magick: MagickConverter,
}

impl ConversionService {
    pub fn new(transcoder: Arc<dyn JpegTranscoder>, magick: MagickConverter) -> Self {
        Self { transcoder, magick }
    }

    pub fn with_default_adapters() -> Self {
        Self::new(Arc::new(LibheifTranscoder), MagickConverter::with_std_runner())
    }

    /// Proxy entry point: strict HEIC/HEIF data URL in, JPEG data URL out.
    pub fn convert_heic_data_url(&self, raw: &str) -> Result<String, ConvertError> {
        let input = decode_heic_data_url(raw)?;
        let jpeg = self.convert_bytes(input.as_slice(), PROXY_JPEG_QUALITY)?;
        Ok(jpeg_data_url(jpeg.as_slice()))
    }

    /// Function entry point: any image data URL or bare base64 in, JPEG data
    /// URL out.
    pub fn convert_image_payload(&self, raw: &str) -> Result<String, ConvertError> {
        let input = decode_image_payload(raw)?;
        let jpeg = self.convert_bytes(input.as_slice(), FUNCTION_JPEG_QUALITY)?;
        Ok(jpeg_data_url(jpeg.as_slice()))
    }

    fn convert_bytes(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, ConvertError> {
        let decode_failure = match self.transcoder.transcode_to_jpeg(input, quality) {
            Ok(jpeg) => return Ok(jpeg),
            Err(error) => error,
        };
        warn!(error = %decode_failure, "native decode failed, trying imagemagick fallback");

        match self.magick.convert_bytes(input, MAGICK_FALLBACK_QUALITY) {
            Ok(jpeg) => Ok(jpeg),
            Err(tool_failure) => {
                warn!(error = %tool_failure, "imagemagick fallback also failed");
                Err(ConvertError::AllMethodsFailed)
            }
        }
    }
}
