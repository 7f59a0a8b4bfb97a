use std::io::Cursor;
use std::sync::Once;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("jpeg encode failed: {0}")]
    Encode(String),
}

/// Decodes an input image and re-encodes it as JPEG at the given quality.
pub trait JpegTranscoder: Send + Sync + 'static {
    fn transcode_to_jpeg(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, TranscodeError>;
}

/// libheif-backed transcoder. Registering the libheif decoding hooks teaches
/// the `image` crate to read HEIC/HEIF containers alongside its built-in
/// formats, so a single decode path covers both.
#[derive(Debug, Default, Clone)]
pub struct LibheifTranscoder;

fn register_heif_hooks() {
    static HOOKS: Once = Once::new();
    HOOKS.call_once(libheif_rs::integration::image::register_all_decoding_hooks);
}

impl JpegTranscoder for LibheifTranscoder {
    fn transcode_to_jpeg(&self, input: &[u8], quality: u8) -> Result<Vec<u8>, TranscodeError> {
        register_heif_hooks();
        let reader = ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|error| TranscodeError::Decode(error.to_string()))?;
        let decoded = reader
            .decode()
            .map_err(|error| TranscodeError::Decode(error.to_string()))?;
        encode_jpeg(&decoded, quality)
    }
}

/// JPEG carries no alpha channel, so anything that is not already 8-bit RGB is
/// flattened to RGB before encoding.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let rgb = match image {
        DynamicImage::ImageRgb8(rgb) => rgb.clone(),
        other => other.to_rgb8(),
    };
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|error| TranscodeError::Encode(error.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_fixture() -> Vec<u8> {
        let mut image = RgbaImage::new(4, 4);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([200, 40, 90, 128]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("png fixture should encode");
        bytes
    }

    #[test]
    fn transcode_produces_jpeg_bytes() {
        let jpeg = LibheifTranscoder
            .transcode_to_jpeg(png_fixture().as_slice(), 85)
            .expect("png input should transcode");
        assert_eq!(
            image::guess_format(jpeg.as_slice()).expect("output format should be recognizable"),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn alpha_input_is_flattened_to_rgb() {
        let jpeg = LibheifTranscoder
            .transcode_to_jpeg(png_fixture().as_slice(), 85)
            .expect("rgba input should transcode");
        let decoded = image::load_from_memory(jpeg.as_slice()).expect("jpeg should decode back");
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn garbage_input_reports_a_decode_failure() {
        let error = LibheifTranscoder
            .transcode_to_jpeg(b"definitely not an image", 85)
            .expect_err("garbage input should fail");
        assert!(matches!(error, TranscodeError::Decode(_)));
    }
}
