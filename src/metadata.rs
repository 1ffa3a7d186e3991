//! Pyramid metadata, store key naming and stored headers

use crate::axis::SinkTriple;
use crate::compression::CompressionMethod;
use crate::config::ResolutionSpec;
use crate::types::{DataType, Triple};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key of the global timepoint count
pub const NUM_TIMEPOINTS_KEY: &str = "numTimepoints";

/// Key of the global view (setup) count
pub const NUM_SETUPS_KEY: &str = "numSetups";

/// Key of the completion marker holding the full [`PyramidMetadata`]
pub const PYRAMID_KEY: &str = "pyramid.json";

/// Name of the dataset header inside a cells dataset
pub const DATASET_HEADER_NAME: &str = "dataset.json";

/// Per-view resolution matrix: `s{setup:02}/resolutions`
pub fn resolutions_path(setup: usize) -> String {
    format!("s{:02}/resolutions", setup)
}

/// Per-view cell shape matrix: `s{setup:02}/subdivisions`
pub fn subdivisions_path(setup: usize) -> String {
    format!("s{:02}/subdivisions", setup)
}

/// Group of one level: `t{timepoint:05}/s{setup:02}/{level}`
pub fn group_path(timepoint: usize, setup: usize, level: usize) -> String {
    format!("t{:05}/s{:02}/{}", timepoint, setup, level)
}

/// Cells dataset of one level: `t{timepoint:05}/s{setup:02}/{level}/cells`
pub fn cells_path(timepoint: usize, setup: usize, level: usize) -> String {
    format!("{}/cells", group_path(timepoint, setup, level))
}

/// Header object of a cells dataset
pub fn dataset_header_path(dataset: &str) -> String {
    format!("{}/{}", dataset, DATASET_HEADER_NAME)
}

/// Object holding one cell, addressed by its grid index in sink order
pub fn cell_key(dataset: &str, grid_index: SinkTriple) -> String {
    let [a, b, c] = grid_index.get();
    format!("{}/{}/{}/{}", dataset, a, b, c)
}

/// Store format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatVersion {
    pub major: u16,
    pub minor: u16,
}

impl FormatVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 0 };

    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_compatible(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Resolution levels of one view, in native (x, y, z) order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMipmaps {
    /// Downsampling factor per level, stored as floats like the resolution matrix
    pub resolutions: Vec<[f64; 3]>,
    /// Cell shape per level
    pub subdivisions: Vec<Triple>,
}

impl ViewMipmaps {
    pub fn new(resolutions: &[Triple], subdivisions: &[Triple]) -> Self {
        Self {
            resolutions: resolution_matrix(resolutions),
            subdivisions: subdivisions.to_vec(),
        }
    }

    pub fn num_levels(&self) -> usize {
        self.resolutions.len()
    }

    /// Levels with integer factors
    pub fn levels(&self) -> Vec<ResolutionSpec> {
        self.resolutions
            .iter()
            .zip(&self.subdivisions)
            .map(|(r, &s)| ResolutionSpec::new(r.map(|f| f.round() as usize), s))
            .collect()
    }
}

/// Integer factors as the float matrix persisted for readers
pub fn resolution_matrix(resolutions: &[Triple]) -> Vec<[f64; 3]> {
    resolutions.iter().map(|r| r.map(|f| f as f64)).collect()
}

/// Complete description of a written pyramid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidMetadata {
    /// Format version
    pub version: FormatVersion,

    /// Unique id of the export run that produced the store
    pub export_id: Uuid,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Sample type of all cells
    pub data_type: DataType,

    /// Compression used for cell payloads
    pub compression: CompressionMethod,

    pub num_timepoints: usize,

    /// Levels of each view, indexed by view id
    pub views: Vec<ViewMipmaps>,
}

impl PyramidMetadata {
    pub fn new(data_type: DataType, compression: CompressionMethod) -> Self {
        Self {
            version: FormatVersion::default(),
            export_id: Uuid::new_v4(),
            created_at: Utc::now(),
            data_type,
            compression,
            num_timepoints: 0,
            views: Vec::new(),
        }
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Number of cells datasets the pyramid contains
    pub fn num_datasets(&self) -> usize {
        self.num_timepoints * self.views.iter().map(|v| v.num_levels()).sum::<usize>()
    }
}

/// Header stored next to the cells of a dataset (sink order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub dimensions: SinkTriple,
    pub cell_shape: SinkTriple,
    pub data_type: DataType,
    pub compression: CompressionMethod,
}

/// Header preceding each stored cell payload (sink order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellHeader {
    pub extent: SinkTriple,
    pub offset: SinkTriple,
    pub data_type: DataType,
    pub compression: CompressionMethod,
    pub uncompressed_len: u64,
    pub checksum: u32,
}
