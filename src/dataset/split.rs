//! Train/validation/test splitting
//!
//! Partitions a per-class image folder into `train/`, `val/` and `test/`
//! trees with the same class sub-folders:
//!
//! ```text
//! source/                    output/
//!   strain-a/img1.jpg   ->     train/strain-a/...
//!   strain-b/...               val/strain-a/...
//!                              test/strain-a/...
//! ```
//!
//! Files are copied, never moved; the source tree is left untouched.

use std::fmt;
use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{ClassifierError, Result};

/// Accepted image extensions (case-sensitive)
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "JPG", "JPEG", "PNG"];

/// Allowed deviation of the ratio sum from 1.0
pub const RATIO_TOLERANCE: f64 = 0.01;

/// Default seed used by the command line tool
pub const DEFAULT_SEED: u64 = 42;

/// One of the three output partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Fractions of each class assigned to each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Self {
        Self { train, val, test }
    }

    /// Check that the ratios are usable
    ///
    /// Each must lie in [0, 1] and their sum must be within
    /// `RATIO_TOLERANCE` of 1.0.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ClassifierError::Configuration(format!(
                    "{} ratio must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(ClassifierError::Configuration(format!(
                "Ratios must sum to 1.0 (got {:.3})",
                sum
            )));
        }

        Ok(())
    }
}

/// Number of images per split for one class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    /// `floor(n * train)` and `floor(n * val)`; test takes the remainder
    pub fn from_len(n: usize, ratios: &SplitRatios) -> Self {
        let train = ((n as f64 * ratios.train).floor() as usize).min(n);
        let val = ((n as f64 * ratios.val).floor() as usize).min(n - train);

        Self {
            train,
            val,
            test: n - train - val,
        }
    }

    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }

    pub fn get(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train,
            Split::Val => self.val,
            Split::Test => self.test,
        }
    }

    fn add(&mut self, other: &SplitCounts) {
        self.train += other.train;
        self.val += other.val;
        self.test += other.test;
    }
}

/// Outcome for a single class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSplit {
    pub name: String,
    pub counts: SplitCounts,
}

/// Summary of a splitting run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitReport {
    /// Processed classes, in name order
    pub classes: Vec<ClassSplit>,
    /// Classes that had no matching images
    pub skipped: Vec<String>,
}

impl SplitReport {
    pub fn totals(&self) -> SplitCounts {
        let mut totals = SplitCounts::default();
        for class in &self.classes {
            totals.add(&class.counts);
        }
        totals
    }

    pub fn total_images(&self) -> usize {
        self.totals().total()
    }

    /// At least one class was split
    pub fn succeeded(&self) -> bool {
        !self.classes.is_empty()
    }
}

/// Whether a path carries one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Immediate subdirectories of `source`, sorted by name
pub fn discover_classes(source: &Path) -> Result<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(ClassifierError::Dataset(format!(
            "Source directory not found: {}",
            source.display()
        )));
    }

    let mut classes = Vec::new();
    for entry in WalkDir::new(source)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ClassifierError::Dataset(e.to_string()))?;
        if entry.file_type().is_dir() {
            classes.push(entry.into_path());
        }
    }

    if classes.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "No class directories found in {} (expected {}/<class-name>/<images>)",
            source.display(),
            source.display()
        )));
    }

    Ok(classes)
}

/// Image files directly inside a class directory, sorted by name
pub fn collect_images(class_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(class_dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ClassifierError::Dataset(e.to_string()))?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }
    Ok(images)
}

/// Copy a file, keeping permission bits and access/modify times
pub fn copy_with_metadata(src: &Path, dest: &Path) -> Result<()> {
    let metadata = fs::metadata(src)?;
    let times = FileTimes::new()
        .set_accessed(metadata.accessed()?)
        .set_modified(metadata.modified()?);

    let mut reader = File::open(src)?;
    let mut writer = File::create(dest)?;
    io::copy(&mut reader, &mut writer)?;
    writer.set_times(times)?;

    // Permissions last, a read-only source would block the writes above
    fs::set_permissions(dest, metadata.permissions())?;

    Ok(())
}

/// Split every class under `source` into `output/{train,val,test}/<class>`
///
/// Images are sorted before shuffling so the result only depends on the
/// RNG state, not on directory iteration order. Classes without images are
/// skipped with a warning. Output directories are created as needed and
/// existing files with the same name are overwritten.
pub fn prepare_dataset<R: Rng + ?Sized>(
    source: &Path,
    output: &Path,
    ratios: &SplitRatios,
    rng: &mut R,
) -> Result<SplitReport> {
    ratios.validate()?;

    let class_dirs = discover_classes(source)?;
    info!(
        "Found {} classes, splitting {:.0}% train, {:.0}% val, {:.0}% test",
        class_dirs.len(),
        ratios.train * 100.0,
        ratios.val * 100.0,
        ratios.test * 100.0
    );

    let mut report = SplitReport::default();

    for class_dir in class_dirs {
        let class_name = class_dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| ClassifierError::Dataset(format!("Invalid class directory: {:?}", class_dir)))?;

        let mut images = collect_images(&class_dir)?;
        if images.is_empty() {
            warn!("Skipping {}: no images found", class_name);
            report.skipped.push(class_name);
            continue;
        }

        images.shuffle(rng);
        let counts = SplitCounts::from_len(images.len(), ratios);

        let (train, rest) = images.split_at(counts.train);
        let (val, test) = rest.split_at(counts.val);

        for (split, files) in Split::ALL.into_iter().zip([train, val, test]) {
            let dest_dir = output.join(split.dir_name()).join(&class_name);
            fs::create_dir_all(&dest_dir)?;

            for file in files {
                if let Some(file_name) = file.file_name() {
                    copy_with_metadata(file, &dest_dir.join(file_name))?;
                }
            }
            debug!("{}/{}: {} files", split, class_name, files.len());
        }

        info!(
            "{}: {} train, {} val, {} test ({} total)",
            class_name,
            counts.train,
            counts.val,
            counts.test,
            counts.total()
        );
        report.classes.push(ClassSplit {
            name: class_name,
            counts,
        });
    }

    Ok(report)
}
