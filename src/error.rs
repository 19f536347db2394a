//! Error types for card generation.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading templates, rendering cards and handing them off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CardError {
    /// Template bytes are not a decodable raster image. Fatal to a batch.
    #[error("failed to decode template image: {0}")]
    DecodeFailure(String),

    /// No drawing surface could be allocated for the template size.
    #[error("render surface unavailable for {width}x{height}")]
    RenderSurfaceUnavailable { width: u32, height: u32 },

    /// The platform cannot share this card; downloading still works.
    #[error("sharing is not supported: {0}")]
    ShareUnsupported(String),

    /// Generation requested without a template or without names.
    #[error("nothing to generate: {0}")]
    EmptyInput(&'static str),

    /// Composition or encoding failed after the surface was acquired.
    #[error("rendering failed: {0}")]
    RenderFailed(String),

    #[error("rendering timed out after {}ms", .elapsed.as_millis())]
    RenderTimeout { elapsed: Duration },

    /// Export requested for a card that has no image yet.
    #[error("card '{0}' is not ready")]
    CardNotReady(String),

    /// A batch was started outside a tokio runtime.
    #[error("no async runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CardError {
    fn from(err: std::io::Error) -> Self {
        CardError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CardError>;
