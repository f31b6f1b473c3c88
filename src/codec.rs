// ============================================================================
// IMAGE CODEC: source decoding, JPEG artifact encoding, edit payload ingress
// ============================================================================

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::io::{Limits, Reader};
use image::{DynamicImage, ImageError, RgbaImage};

use crate::error::{Error, Result};

/// Quality used when none is configured for composites.
pub const DEFAULT_COMPOSITE_QUALITY: u8 = 90;
/// Backgrounds are re-edited by clients, so they are stored near-lossless.
pub const DEFAULT_BACKGROUND_QUALITY: u8 = 100;

/// Largest accepted image side, checked against the header before any
/// pixel data is decoded.
const MAX_IMAGE_DIM: u32 = 32_768;

fn limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIM);
    limits.max_image_height = Some(MAX_IMAGE_DIM);
    limits
}

/// Decode any supported raster into RGBA.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, ImageError> {
    let mut reader = Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(limits());
    let img = reader.decode()?;
    check_not_empty(&img)?;
    Ok(img.to_rgba8())
}

/// Decode the source image behind an instance.
pub fn decode_file(path: &Path) -> Result<RgbaImage> {
    let unreadable = |reason: String| Error::SourceImageUnreadable {
        path: path.to_path_buf(),
        reason,
    };
    let mut reader = Reader::open(path)
        .and_then(Reader::with_guessed_format)
        .map_err(|e| unreadable(e.to_string()))?;
    reader.limits(limits());
    let img = reader.decode().map_err(|e| unreadable(e.to_string()))?;
    check_not_empty(&img).map_err(|e| unreadable(e.to_string()))?;
    Ok(img.to_rgba8())
}

fn check_not_empty(img: &DynamicImage) -> Result<(), ImageError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ImageError::IoError(std::io::Error::other(format!(
            "unsupported image dimensions {}x{}",
            img.width(),
            img.height()
        ))));
    }
    Ok(())
}

/// Encode to JPEG. Alpha is dropped; the artifact codec has no alpha channel.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Vec::with_capacity(rgb_image.as_raw().len() / 8);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode(
            rgb_image.as_raw(),
            rgb_image.width(),
            rgb_image.height(),
            image::ColorType::Rgb8,
        )?;
    }
    Ok(out)
}

// ============================================================================
// Edit payloads
// ============================================================================

/// Normalise an inbound edit into encoded image bytes.
///
/// Accepted shapes:
/// - raw encoded image bytes
/// - a data-URI, `data:image/jpeg;base64,<payload>`
/// - bare base64 text of an encoded image
///
/// The result is guaranteed to decode; anything else is
/// [`Error::MalformedImagePayload`].
pub fn normalize_payload(payload: &[u8]) -> Result<Vec<u8>> {
    let malformed = |e: ImageError| Error::MalformedImagePayload(format!("payload does not decode: {}", e));

    let text = std::str::from_utf8(payload);
    if image::guess_format(payload).is_ok() {
        match decode(payload) {
            Ok(_) => return Ok(payload.to_vec()),
            // Text that merely starts with a magic number gets a second chance below.
            Err(e) if text.is_err() => return Err(malformed(e)),
            Err(_) => {}
        }
    }

    let text = text
        .map_err(|_| Error::MalformedImagePayload("payload is neither an image nor text".into()))?
        .trim();
    let encoded = match text.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| Error::MalformedImagePayload("data URI has no ',' separator".into()))?;
            if !header.ends_with(";base64") {
                return Err(Error::MalformedImagePayload(format!(
                    "data URI '{}' is not base64 encoded",
                    header
                )));
            }
            data
        }
        None => text,
    };
    let cleaned: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| Error::MalformedImagePayload(format!("invalid base64: {}", e)))?;

    decode(&bytes).map_err(malformed)?;
    Ok(bytes)
}
