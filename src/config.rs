//! Builder-style configuration for registry bring-up and cardiac extraction.

use crate::aha::DEFAULT_ZONE_CACHE_SIZE;
use crate::error::{Error, Result};
use crate::features::heart::DEFAULT_HEART_SPACING;
use std::path::{Path, PathBuf};

/// Where cardiac voxel spacing comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpacingPolicy {
    /// Always use this spacing, whatever the mask header says.
    Fixed([f64; 3]),
    /// Use the spacing decoded from the ED mask header.
    FromHeader,
}

impl Default for SpacingPolicy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_HEART_SPACING)
    }
}

/// Options for the heart pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartOptions {
    /// Spacing used for volumes and mass.
    pub spacing: SpacingPolicy,
}

impl HeartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed spacing in mm.
    pub fn spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = SpacingPolicy::Fixed(spacing);
        self
    }

    /// Take spacing from the decoded header instead.
    pub fn header_spacing(mut self) -> Self {
        self.spacing = SpacingPolicy::FromHeader;
        self
    }

    /// Spacing to use given the spacing found in the ED mask.
    pub fn resolve(&self, header_spacing: [f64; 3]) -> [f64; 3] {
        match self.spacing {
            SpacingPolicy::Fixed(spacing) => spacing,
            SpacingPolicy::FromHeader => header_spacing,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let SpacingPolicy::Fixed(spacing) = self.spacing {
            if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err(Error::Configuration(format!(
                    "heart spacing must be positive, got {spacing:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for scanning a model directory tree.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root holding `<organ>/<disease>/` directories.
    pub models_root: PathBuf,
    /// Grid shapes kept in the AHA zone cache (0 disables caching).
    pub zone_cache_size: usize,
    /// Directory for staged mask files (None = system temp dir).
    pub staging_dir: Option<PathBuf>,
    /// Heart pipeline options shared by every heart entry.
    pub heart: HeartOptions,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            zone_cache_size: DEFAULT_ZONE_CACHE_SIZE,
            staging_dir: None,
            heart: HeartOptions::default(),
        }
    }
}

impl RegistryConfig {
    /// Config rooted at `models_root`.
    pub fn new<P: AsRef<Path>>(models_root: P) -> Self {
        Self {
            models_root: models_root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn zone_cache_size(mut self, size: usize) -> Self {
        self.zone_cache_size = size;
        self
    }

    pub fn staging_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.staging_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn heart(mut self, heart: HeartOptions) -> Self {
        self.heart = heart;
        self
    }

    /// Check the settings before any directory is touched.
    pub fn validate(&self) -> Result<()> {
        self.heart.validate()?;
        if let Some(dir) = &self.staging_dir {
            if !dir.is_dir() {
                return Err(Error::Configuration(format!(
                    "staging directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}
