//! Class name list
//!
//! Index `i` of the classifier output corresponds to the name at position
//! `i`. Names come from a sidecar text file written during training, or are
//! synthesized when that file is absent.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

/// Prefix used for synthesized class names
pub const PLACEHOLDER_PREFIX: &str = "Strain_";

/// Ordered, immutable list of class names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    /// Wrap an ordered list of names
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Parse one name per line, trimming surrounding whitespace
    pub fn parse(content: &str) -> Self {
        Self::new(content.lines().map(|line| line.trim().to_string()).collect())
    }

    /// Read a class names file (UTF-8, one name per line, order-significant)
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// `{prefix}0 .. {prefix}{count-1}`
    pub fn placeholders(count: usize, prefix: &str) -> Self {
        Self::new((0..count).map(|i| format!("{}{}", prefix, i)).collect())
    }

    /// Get the name for an output index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_trims_lines() {
        let names = ClassNames::parse("  Blue Dream \nOG Kush\r\n\tSour Diesel\n");
        assert_eq!(names.len(), 3);
        assert_eq!(names.get(0), Some("Blue Dream"));
        assert_eq!(names.get(1), Some("OG Kush"));
        assert_eq!(names.get(2), Some("Sour Diesel"));
        assert_eq!(names.get(3), None);
    }

    #[test]
    fn test_parse_keeps_order_and_inner_blank_lines() {
        let names = ClassNames::parse("b\n\na\n");
        assert_eq!(names.iter().collect::<Vec<_>>(), vec!["b", "", "a"]);
    }

    #[test]
    fn test_placeholders() {
        let names = ClassNames::placeholders(100, PLACEHOLDER_PREFIX);
        assert_eq!(names.len(), 100);
        assert_eq!(names.get(0), Some("Strain_0"));
        assert_eq!(names.get(99), Some("Strain_99"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("class_names.txt");
        fs::write(&path, "Gelato\nZkittlez\n").unwrap();

        let names = ClassNames::load(&path).unwrap();
        assert_eq!(names, ClassNames::new(vec!["Gelato".into(), "Zkittlez".into()]));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(ClassNames::load(Path::new("/nonexistent/class_names.txt")).is_err());
    }
}
