//! Captured screenshots: raw bytes plus the metadata the loop needs.

use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, ImageReader};
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// An encoded screenshot as returned by the remote browser.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    bytes: Vec<u8>,
    mime: &'static str,
    dimensions: Option<(u32, u32)>,
    digest: blake3::Hash,
}

impl Screenshot {
    /// Wrap encoded image bytes. Only the header is decoded, to learn the
    /// format and pixel dimensions.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let format = image::guess_format(&bytes).ok();
        let mime = match format {
            Some(ImageFormat::Jpeg) => "image/jpeg",
            Some(ImageFormat::WebP) => "image/webp",
            Some(ImageFormat::Gif) => "image/gif",
            _ => "image/png",
        };
        let dimensions = match ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())
            .and_then(|reader| reader.into_dimensions().map_err(|e| e.to_string()))
        {
            Ok(dims) => Some(dims),
            Err(e) => {
                debug!("[screenshot] Could not read image dimensions: {}", e);
                None
            }
        };
        let digest = blake3::hash(&bytes);
        Self {
            bytes,
            mime,
            dimensions,
            digest,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    /// `(width, height)` in pixels, when the header could be read.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Content hash, used as the screenshot's identity.
    pub fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form accepted by most model APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.to_base64())
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("len", &self.bytes.len())
            .field("mime", &self.mime)
            .field("dimensions", &self.dimensions)
            .field("digest", &self.digest.to_hex().as_str())
            .finish()
    }
}

/// Whether the visible state moved between two captures. A first capture
/// always counts as a change.
pub fn state_changed(previous: Option<&Screenshot>, current: &Screenshot) -> bool {
    previous.map_or(true, |prev| prev.digest() != current.digest())
}

/// Encode a solid-color PNG for tests and fakes.
#[cfg(any(test, feature = "test-util"))]
pub fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> image::ImageResult<Vec<u8>> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}
