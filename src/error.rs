//! Error types for medxai.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by decoding, extraction, model loading and inference.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required file, directory or registry key is missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A label table (or other text artifact) could not be parsed.
    #[error("parse error in {path}: {reason}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Volumetric input was malformed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Header did not carry a NIfTI magic string.
    #[error("invalid NIfTI magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// Voxel datatype code is not supported.
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(i16),

    /// Header dimensions or spacing are inconsistent.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// gzip payload could not be inflated.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Two volumes that must share a grid do not.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The classifier itself failed while predicting.
    #[error("classifier invocation failed: {0}")]
    ClassifierInvocation(String),

    /// A classifier artifact has an unrecognised layout.
    #[error("invalid classifier artifact: {0}")]
    Artifact(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether this error means the input volume could not be decoded.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::InvalidMagic(_)
                | Self::UnsupportedDataType(_)
                | Self::InvalidDimensions(_)
                | Self::Decompression(_)
        )
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
