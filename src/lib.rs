//! # Strain Classifier
//!
//! Cannabis strain classification from photographs with a fine-tuned
//! ResNet-50, built on the Burn framework.
//!
//! ## Features
//!
//! - **ResNet-50 backbone** in the torchvision layout, with a small replacement head
//! - **PyTorch checkpoints** loaded directly through `burn-import`
//! - **Flexible inputs**: URLs, `data:image` URIs, file paths or decoded images
//! - **Dataset splitter** producing reproducible train/val/test folders
//!
//! ## Modules
//!
//! - `model`: Backbone, classifier head and preprocessing
//! - `inference`: Checkpoint loading and the prediction service
//! - `dataset`: Archive extraction and train/val/test splitting
//! - `backend`: Compile-time backend selection (CPU, WGPU, CUDA)
//! - `utils`: Errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strain_classifier::backend::{default_device, DefaultBackend};
//! use strain_classifier::inference::{PredictionService, PredictorConfig};
//!
//! let config = PredictorConfig::from_model_dir("models".as_ref());
//! let service = PredictionService::<DefaultBackend>::load(&config, &default_device())?;
//!
//! let result = service.predict("https://example.com/bud.jpg")?;
//! println!("{} ({:.1}%)", result.predicted_label, result.confidence * 100.0);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{extract_from_zips, prepare_dataset, SplitRatios, SplitReport};
pub use inference::{
    ClassNames, PredictionInput, PredictionResult, PredictionService, Predictor, PredictorConfig,
};
pub use model::{get_transforms, StrainClassifier, StrainClassifierConfig};
pub use utils::error::{ClassifierError, Result};

/// Default number of strain classes
pub const NUM_CLASSES: usize = 100;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
