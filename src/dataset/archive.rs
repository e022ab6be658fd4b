//! ZIP extraction for raw per-class downloads
//!
//! Image scrapes usually arrive as one archive per class. Each `*.zip`
//! directly inside the input folder becomes `output/<archive stem>/`, which
//! is the layout the splitter expects.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::info;
use zip::ZipArchive;

use crate::utils::error::{ClassifierError, Result};

/// `*.zip` files directly inside `dir`, sorted by name
pub fn find_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().map(|ext| ext == "zip").unwrap_or(false))
        .collect();
    archives.sort();
    Ok(archives)
}

/// Extract every archive in `zip_dir` into `output_dir/<stem>`
///
/// Returns the number of archives extracted.
pub fn extract_from_zips(zip_dir: &Path, output_dir: &Path) -> Result<usize> {
    if !zip_dir.is_dir() {
        return Err(ClassifierError::Dataset(format!(
            "Archive directory not found: {}",
            zip_dir.display()
        )));
    }

    let archives = find_archives(zip_dir)?;
    if archives.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "No archives found in {}",
            zip_dir.display()
        )));
    }

    info!("Found {} ZIP files", archives.len());

    for path in &archives {
        let stem = path
            .file_stem()
            .ok_or_else(|| ClassifierError::Dataset(format!("Invalid archive name: {:?}", path)))?;
        let dest = output_dir.join(stem);

        info!("Extracting {:?} -> {:?}", path.file_name().unwrap_or_default(), dest);

        let mut archive = ZipArchive::new(File::open(path)?)
            .map_err(|e| ClassifierError::Dataset(format!("{}: {}", path.display(), e)))?;
        fs::create_dir_all(&dest)?;
        archive
            .extract(&dest)
            .map_err(|e| ClassifierError::Dataset(format!("{}: {}", path.display(), e)))?;
    }

    Ok(archives.len())
}
