use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CardError, Result};

pub const PNG_MIME: &str = "image/png";

/// Formats the SVG rasteriser can embed directly; anything else is re-encoded as PNG.
const EMBEDDABLE_MIMES: [&str; 4] = [PNG_MIME, "image/jpeg", "image/gif", "image/webp"];

/// A decoded card template: the embeddable image bytes and their native pixel size.
#[derive(Debug, Clone)]
pub struct TemplateImage {
    bytes: Arc<[u8]>,
    mime: &'static str,
    width: u32,
    height: u32,
}

impl TemplateImage {
    /// Decodes raw upload bytes. Fails with `DecodeFailure` before any card exists.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(CardError::DecodeFailure("template is empty".to_string()));
        }
        let image = image::load_from_memory(&bytes)
            .map_err(|err| CardError::DecodeFailure(err.to_string()))?;
        let (width, height) = (image.width(), image.height());

        let sniffed = infer::get(&bytes).map(|kind| kind.mime_type());
        let embeddable = sniffed.filter(|mime| EMBEDDABLE_MIMES.contains(mime));
        let (bytes, mime) = match embeddable {
            Some(mime) => (bytes, mime),
            None => {
                debug!(
                    "re-encoding template ({}) as png",
                    sniffed.unwrap_or("unknown")
                );
                let mut encoded = Vec::new();
                image
                    .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
                    .map_err(|err| CardError::DecodeFailure(err.to_string()))?;
                (encoded, PNG_MIME)
            }
        };

        Ok(Self {
            bytes: bytes.into(),
            mime,
            width,
            height,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|err| {
            CardError::DecodeFailure(format!("failed to read {}: {}", path.display(), err))
        })?;
        Self::decode(bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    #[cfg(test)]
    pub(crate) fn from_parts(bytes: Vec<u8>, mime: &'static str, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            width,
            height,
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_test_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([240, 230, 200, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode test image");
    bytes
}
