//! Error types for the trash scanning core

use thiserror::Error;

/// Result type alias for the scanner library
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors that can occur while scanning frames
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Frame preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Invalid frame dimensions: need at least {expected:?}, got {actual:?}")]
    InvalidDimensions {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ScanError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceError(msg.into())
    }

    pub fn preprocessing<S: Into<String>>(msg: S) -> Self {
        Self::PreprocessingError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::SessionError(msg.into())
    }

    /// Per-frame failures are dropped and the next frame is tried instead
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Self::InferenceError(_)
                | Self::PreprocessingError(_)
                | Self::InvalidDimensions { .. }
                | Self::UnsupportedImageFormat(_)
                | Self::ImageError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_errors() {
        assert!(ScanError::inference("bad tensor").is_per_frame());
        assert!(ScanError::InvalidDimensions {
            expected: (480, 480),
            actual: (320, 240),
        }
        .is_per_frame());
        assert!(!ScanError::model_load("missing").is_per_frame());
        assert!(!ScanError::session("executor gone").is_per_frame());
    }
}
