//! Error Handling Module
//!
//! Defines the error type shared by the classifier, the prediction service
//! and the dataset splitter. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for strain classification operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The checkpoint file does not exist
    #[error("Model file not found: {}", .0.display())]
    MissingModelFile(PathBuf),

    /// Checkpoint parameters do not fit the constructed classifier
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The checkpoint could not be decoded in any supported layout
    #[error("Failed to load checkpoint: {0}")]
    CheckpointLoad(String),

    /// Prediction input is neither a string nor an image
    #[error("Unsupported image format: {0}")]
    UnsupportedInputFormat(String),

    /// Malformed base64, corrupt bytes, unreadable file or unreachable URL
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// Invalid configuration (split ratios, config files)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error with dataset preparation
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error reading back inference results
    #[error("Inference error: {0}")]
    Inference(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ClassifierError {
    fn from(err: image::ImageError) -> Self {
        ClassifierError::ImageDecode(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Configuration(err.to_string())
    }
}

impl From<toml::de::Error> for ClassifierError {
    fn from(err: toml::de::Error) -> Self {
        ClassifierError::Configuration(err.to_string())
    }
}

impl From<toml::ser::Error> for ClassifierError {
    fn from(err: toml::ser::Error) -> Self {
        ClassifierError::Configuration(err.to_string())
    }
}

impl ClassifierError {
    /// Whether the error only affects a single prediction call.
    ///
    /// Setup-time errors abort the service; per-call errors leave it usable.
    pub fn is_per_call(&self) -> bool {
        matches!(
            self,
            ClassifierError::UnsupportedInputFormat(_)
                | ClassifierError::ImageDecode(_)
                | ClassifierError::Inference(_)
        )
    }
}

/// Convenience Result type for strain classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;
