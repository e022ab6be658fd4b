//! Dataset module for preparing training data
//!
//! This module provides functionality for:
//! - Extracting per-class ZIP downloads
//! - Splitting a per-class image folder into train/val/test
//!
//! ## Expected Layout
//!
//! The source folder holds one sub-folder per strain, named after it. The
//! output gets `train/`, `val/` and `test/`, each with the same sub-folders,
//! which is what an `ImageFolder`-style loader consumes during training.

pub mod archive;
pub mod split;

// Re-export main types for convenience
pub use archive::{extract_from_zips, find_archives};
pub use split::{
    copy_with_metadata, is_image_file, prepare_dataset, ClassSplit, Split, SplitCounts,
    SplitRatios, SplitReport, DEFAULT_SEED, IMAGE_EXTENSIONS,
};

/// Folder inside the source that receives extracted archives
pub const EXTRACTED_DIR: &str = "_extracted";
