//! Image acquisition and encoding utilities.
//!
//! This module turns a user-selected file into an [`EncodedImage`], the
//! transferable form every provider client consumes, and converts provider
//! output (base64 or data URLs) back into bytes that can be decoded,
//! displayed or saved.
//!
//! # Mime detection
//!
//! The mime type is sniffed from the leading bytes via [`image::guess_format`].
//! When the format is not recognized the image is still accepted and labelled
//! `application/octet-stream`; the provider decides whether it can use it.

use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Mime type used when the encoded format cannot be detected.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Encoded image bytes paired with their mime type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl EncodedImage {
    /// Wraps raw encoded bytes, sniffing the mime type.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::EmptyImage`] if `bytes` is empty.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mime_type = detect_mime_type(&bytes).to_string();
        Self::with_mime_type(bytes, mime_type)
    }

    /// Wraps raw encoded bytes with an explicit mime type.
    ///
    /// A blank mime type falls back to [`OCTET_STREAM`].
    pub fn with_mime_type(bytes: Vec<u8>, mime_type: impl Into<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AppError::EmptyImage);
        }
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            OCTET_STREAM.to_string()
        } else {
            mime_type
        };
        Ok(Self { bytes, mime_type })
    }

    /// Reads a file from disk into an encoded image.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), len = bytes.len(), "read input image");
        Self::from_bytes(bytes)
    }

    /// Decodes a base64 payload, accepting either bare base64 or a `data:` URL.
    pub fn from_base64(payload: &str) -> Result<Self> {
        match parse_data_url(payload) {
            Some((mime, data)) => {
                let bytes = BASE64.decode(data.trim())?;
                Self::with_mime_type(bytes, mime)
            }
            None => Self::from_bytes(BASE64.decode(payload.trim())?),
        }
    }

    /// Encodes a decoded image as PNG.
    pub fn encode_png(image: &DynamicImage) -> Result<Self> {
        let mut buffer: Vec<u8> = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to encode image: {}", e)))?;
        Self::with_mime_type(buffer, "image/png")
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// Renders the image as a `data:<mime>;base64,<payload>` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Decodes the bytes into pixels.
    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes)
            .map_err(|e| AppError::image(format!("Failed to decode image: {}", e)))
    }

    /// File extension matching the mime type, `bin` when unknown.
    pub fn extension(&self) -> &'static str {
        ImageFormat::from_mime_type(&self.mime_type)
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("bin")
    }

    /// Writes the encoded bytes unchanged to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Sniffs the mime type of encoded image bytes.
pub fn detect_mime_type(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(OCTET_STREAM)
}

/// Splits a base64 `data:` URL into its mime type and payload.
///
/// Returns `None` for anything that is not a base64 data URL.
pub fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.trim().strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn tiny_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255])));
        EncodedImage::encode_png(&img).unwrap().into_bytes()
    }

    #[test]
    fn empty_bytes_are_rejected() {
        assert!(matches!(EncodedImage::from_bytes(Vec::new()), Err(AppError::EmptyImage)));
    }

    #[test]
    fn png_is_detected() {
        let image = EncodedImage::from_bytes(tiny_png()).unwrap();
        assert_eq!(image.mime_type(), "image/png");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn unknown_bytes_default_to_octet_stream() {
        let image = EncodedImage::from_bytes(b"not an image".to_vec()).unwrap();
        assert_eq!(image.mime_type(), OCTET_STREAM);
        assert_eq!(image.extension(), "bin");
    }

    #[test]
    fn data_url_keeps_declared_mime() {
        let original = EncodedImage::from_bytes(tiny_png()).unwrap();
        let url = original.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let parsed = EncodedImage::from_base64(&url).unwrap();
        assert_eq!(parsed, original);
        let pixels = parsed.decode().unwrap();
        assert_eq!((pixels.width(), pixels.height()), (3, 2));
    }

    #[test]
    fn parse_data_url_rejects_plain_urls() {
        assert!(parse_data_url("https://example.com/a.png").is_none());
        assert!(parse_data_url("data:image/png,rawbytes").is_none());
        assert_eq!(parse_data_url("data:image/jpeg;base64,AAAA"), Some(("image/jpeg", "AAAA")));
    }
}
