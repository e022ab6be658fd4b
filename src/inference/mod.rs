//! Inference module for strain prediction
//!
//! This module provides:
//! - Prediction inputs (URL, data URI, file path, decoded image)
//! - Checkpoint loading for PyTorch and native burn weights
//! - The prediction service and its lazy wrapper
//!
//! ## Usage
//!
//! ```no_run
//! use strain_classifier::backend::{default_device, DefaultBackend};
//! use strain_classifier::inference::{Predictor, PredictorConfig};
//!
//! let mut predictor = Predictor::<DefaultBackend>::new(PredictorConfig::default(), default_device());
//! let result = predictor.predict("photos/leaf.jpg")?;
//! println!("{}", result.display());
//! # Ok::<(), strain_classifier::ClassifierError>(())
//! ```

pub mod checkpoint;
pub mod config;
pub mod input;
pub mod labels;
pub mod predictor;

// Re-export main types for convenience
pub use checkpoint::{load_record, save_checkpoint, CheckpointFormat, CheckpointLayout};
pub use config::PredictorConfig;
pub use input::PredictionInput;
pub use labels::ClassNames;
pub use predictor::{LabelConfidence, PredictionResult, PredictionService, Predictor};
