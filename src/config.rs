//! Export configuration: mipmap levels per view and cell compression

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::downsample::downsampled_dimensions;
use crate::error::{ExportError, ExportResult};
use crate::types::Triple;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One pyramid level: downsampling factors and the cell shape used to store it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSpec {
    pub factor: Triple,
    pub cell_shape: Triple,
}

impl ResolutionSpec {
    pub fn new(factor: Triple, cell_shape: Triple) -> Self {
        Self { factor, cell_shape }
    }
}

/// Resolutions and subdivisions for one view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MipmapConfig {
    pub resolutions: Vec<Triple>,
    pub subdivisions: Vec<Triple>,
}

impl MipmapConfig {
    pub fn new(resolutions: Vec<Triple>, subdivisions: Vec<Triple>) -> Self {
        Self {
            resolutions,
            subdivisions,
        }
    }

    /// Pair resolutions with subdivisions, checking the lists are usable
    pub fn levels(&self) -> ExportResult<Vec<ResolutionSpec>> {
        if self.resolutions.is_empty() {
            return Err(ExportError::Configuration(
                "at least one resolution level is required".to_string(),
            ));
        }
        if self.resolutions.len() != self.subdivisions.len() {
            return Err(ExportError::Configuration(format!(
                "{} resolutions but {} subdivisions",
                self.resolutions.len(),
                self.subdivisions.len()
            )));
        }

        self.resolutions
            .iter()
            .zip(&self.subdivisions)
            .enumerate()
            .map(|(level, (&factor, &cell_shape))| {
                if factor.contains(&0) {
                    return Err(ExportError::Configuration(format!(
                        "level {} has a zero downsampling factor {:?}",
                        level, factor
                    )));
                }
                if cell_shape.contains(&0) {
                    return Err(ExportError::Configuration(format!(
                        "level {} has a zero cell shape {:?}",
                        level, cell_shape
                    )));
                }
                Ok(ResolutionSpec::new(factor, cell_shape))
            })
            .collect()
    }
}

impl Default for MipmapConfig {
    fn default() -> Self {
        Self::new(
            vec![[1, 1, 1], [2, 2, 1], [4, 4, 2]],
            vec![[32, 32, 4], [16, 16, 8], [8, 8, 8]],
        )
    }
}

/// Mipmap layouts commonly used for light-sheet data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MipmapPreset {
    /// Reduces z at the coarsest level, cells become cubic as x/y shrink
    Balanced,
    /// Never reduces z, keeps thin cells on every level
    Planar,
}

impl MipmapPreset {
    pub fn config(&self) -> MipmapConfig {
        match self {
            MipmapPreset::Balanced => MipmapConfig::default(),
            MipmapPreset::Planar => MipmapConfig::new(
                vec![[1, 1, 1], [2, 2, 1], [4, 4, 1]],
                vec![[32, 32, 4], [32, 32, 4], [16, 16, 4]],
            ),
        }
    }
}

/// Cell payload compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub method: CompressionMethod,
    pub level: u8,
}

impl CompressionConfig {
    pub fn compression_level(&self) -> CompressionLevel {
        CompressionLevel::new(self.level)
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: CompressionLevel::default().value(),
        }
    }
}

/// Complete export configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Downsampling factors used by every view without an override
    pub resolutions: Vec<Triple>,

    /// Cell shapes matching `resolutions`
    pub subdivisions: Vec<Triple>,

    /// Per-view level lists, keyed by view id
    #[serde(default)]
    pub overrides: BTreeMap<usize, MipmapConfig>,

    #[serde(default)]
    pub compression: CompressionConfig,
}

impl ExportConfig {
    pub fn new(mipmaps: MipmapConfig) -> Self {
        Self {
            resolutions: mipmaps.resolutions,
            subdivisions: mipmaps.subdivisions,
            overrides: BTreeMap::new(),
            compression: CompressionConfig::default(),
        }
    }

    pub fn from_preset(preset: MipmapPreset) -> Self {
        Self::new(preset.config())
    }

    /// Load a JSON configuration file
    pub fn from_json_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Override the levels of one view
    pub fn with_view_override(mut self, view: usize, mipmaps: MipmapConfig) -> Self {
        self.overrides.insert(view, mipmaps);
        self
    }

    pub fn with_compression(mut self, method: CompressionMethod, level: u8) -> Self {
        self.compression = CompressionConfig { method, level };
        self
    }

    /// Mipmap configuration that applies to `view`
    pub fn mipmaps_for(&self, view: usize) -> MipmapConfig {
        match self.overrides.get(&view) {
            Some(mipmaps) => mipmaps.clone(),
            None => MipmapConfig::new(self.resolutions.clone(), self.subdivisions.clone()),
        }
    }

    /// Validated levels for every view in `0..num_views`
    pub fn levels_per_view(&self, num_views: usize) -> ExportResult<Vec<Vec<ResolutionSpec>>> {
        if let Some(&view) = self.overrides.keys().find(|&&v| v >= num_views) {
            return Err(ExportError::Configuration(format!(
                "override for view {} but only {} views exist",
                view, num_views
            )));
        }
        (0..num_views)
            .map(|view| {
                self.mipmaps_for(view).levels().map_err(|e| match e {
                    ExportError::Configuration(msg) => {
                        ExportError::Configuration(format!("view {}: {}", view, msg))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::new(MipmapConfig::default())
    }
}

/// Check that `dimensions` can be reduced by every level without truncation
pub fn validate_dimensions(dimensions: Triple, levels: &[ResolutionSpec]) -> ExportResult<()> {
    if dimensions.contains(&0) {
        return Err(ExportError::Configuration(format!(
            "volume dimensions {:?} contain a zero-length axis",
            dimensions
        )));
    }
    for (level, spec) in levels.iter().enumerate() {
        for d in 0..3 {
            if dimensions[d] % spec.factor[d] != 0 {
                return Err(ExportError::Configuration(format!(
                    "level {}: dimension {} ({}) is not divisible by factor {}",
                    level, d, dimensions[d], spec.factor[d]
                )));
            }
        }
        let reduced = downsampled_dimensions(dimensions, spec.factor);
        if reduced.contains(&0) {
            return Err(ExportError::Configuration(format!(
                "level {}: factor {:?} reduces {:?} to a zero-length axis",
                level, spec.factor, dimensions
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        let levels = MipmapConfig::default().levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[2], ResolutionSpec::new([4, 4, 2], [8, 8, 8]));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let config = MipmapConfig::new(vec![[1, 1, 1], [2, 2, 2]], vec![[4, 4, 4]]);
        assert!(matches!(config.levels(), Err(ExportError::Configuration(_))));
        let empty = MipmapConfig::new(vec![], vec![]);
        assert!(empty.levels().is_err());
    }

    #[test]
    fn test_zero_factor_rejected() {
        let config = MipmapConfig::new(vec![[1, 0, 1]], vec![[4, 4, 4]]);
        assert!(config.levels().is_err());
    }

    #[test]
    fn test_view_override() {
        let config = ExportConfig::default().with_view_override(
            1,
            MipmapConfig::new(vec![[1, 1, 1]], vec![[64, 64, 64]]),
        );
        let levels = config.levels_per_view(2).unwrap();
        assert_eq!(levels[0].len(), 3);
        assert_eq!(levels[1].len(), 1);
        assert!(config.levels_per_view(1).is_err());
    }

    #[test]
    fn test_validate_dimensions() {
        let levels = MipmapConfig::default().levels().unwrap();
        assert!(validate_dimensions([64, 64, 32], &levels).is_ok());
        assert!(validate_dimensions([66, 64, 32], &levels).is_err());
        assert!(validate_dimensions([64, 64, 3], &levels).is_err());
        assert!(validate_dimensions([64, 0, 32], &levels).is_err());

        let too_coarse = [ResolutionSpec::new([8, 1, 1], [4, 4, 4])];
        assert!(validate_dimensions([4, 4, 4], &too_coarse).is_err());
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let json = r#"{
            "resolutions": [[1, 1, 1], [2, 2, 2]],
            "subdivisions": [[16, 16, 16], [8, 8, 8]],
            "compression": { "method": "Zstd", "level": 3 }
        }"#;
        let config: ExportConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.resolutions.len(), 2);
        assert!(config.overrides.is_empty());
        assert_eq!(config.compression.method, CompressionMethod::Zstd);
    }

    #[test]
    fn test_preset_planar_keeps_z() {
        let levels = MipmapPreset::Planar.config().levels().unwrap();
        assert!(levels.iter().all(|l| l.factor[2] == 1));
    }
}
