//! Pyramid reader - random access to the cells of a completed store

use crate::axis::{from_sink_order, to_sink_order};
use crate::compression::get_compressor;
use crate::config::ResolutionSpec;
use crate::error::{Result, StorageError};
use crate::io::{create_io_manager, IOManager};
use crate::metadata::{
    cell_key, cells_path, dataset_header_path, DatasetHeader, PyramidMetadata,
    FormatVersion, NUM_SETUPS_KEY, NUM_TIMEPOINTS_KEY, PYRAMID_KEY,
};
use crate::partition::CellGrid;
use crate::store::native_grid;
use crate::types::{CellBuffer, Sample, Triple};
use crate::utils::verify_checksum;
use crate::volume::ArrayVolume;
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One decoded cell, in native order
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCell {
    pub min: Triple,
    pub extent: Triple,
    /// Samples with x fastest, then y, then z
    pub buffer: CellBuffer,
}

/// Read access to a pyramid store written by [`crate::ChunkStoreSink`]
pub struct PyramidReader {
    metadata: PyramidMetadata,
    io: Arc<dyn IOManager>,
    headers: RwLock<HashMap<String, DatasetHeader>>,
}

impl PyramidReader {
    /// Open the store at `url`
    pub async fn open(url: &str) -> Result<Self> {
        Self::open_with(create_io_manager(url)?).await
    }

    /// Open a store through an existing I/O manager.
    ///
    /// Fails with [`StorageError::Incomplete`] when the completion marker is
    /// missing, i.e. the export never finished.
    pub async fn open_with(io: Arc<dyn IOManager>) -> Result<Self> {
        let marker = match io.read(PYRAMID_KEY).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(StorageError::Incomplete(
                    "completion marker missing".to_string(),
                ))
            }
            Err(e) => return Err(e),
        };
        let metadata: PyramidMetadata = serde_json::from_slice(&marker)?;

        if !metadata.version.is_compatible(&FormatVersion::CURRENT) {
            return Err(StorageError::UnsupportedVersion(
                metadata.version.major as u32,
            ));
        }

        let num_timepoints: usize = serde_json::from_slice(&io.read(NUM_TIMEPOINTS_KEY).await?)?;
        let num_setups: usize = serde_json::from_slice(&io.read(NUM_SETUPS_KEY).await?)?;
        if num_timepoints != metadata.num_timepoints || num_setups != metadata.num_views() {
            return Err(StorageError::InvalidFormat(format!(
                "global counts ({}, {}) disagree with pyramid metadata ({}, {})",
                num_timepoints,
                num_setups,
                metadata.num_timepoints,
                metadata.num_views()
            )));
        }

        Ok(Self {
            metadata,
            io,
            headers: RwLock::new(HashMap::new()),
        })
    }

    pub fn metadata(&self) -> &PyramidMetadata {
        &self.metadata
    }

    /// Resolution levels of `view`
    pub fn levels(&self, view: usize) -> Option<Vec<ResolutionSpec>> {
        self.metadata.views.get(view).map(|v| v.levels())
    }

    fn check_indices(&self, timepoint: usize, view: usize, level: usize) -> Result<()> {
        let levels = self
            .metadata
            .views
            .get(view)
            .map(|v| v.num_levels())
            .unwrap_or(0);
        if timepoint >= self.metadata.num_timepoints || level >= levels {
            return Err(StorageError::NotFound(format!(
                "timepoint {}, view {}, level {}",
                timepoint, view, level
            )));
        }
        Ok(())
    }

    /// Header of one level's dataset
    pub async fn dataset(
        &self,
        timepoint: usize,
        view: usize,
        level: usize,
    ) -> Result<DatasetHeader> {
        self.check_indices(timepoint, view, level)?;
        let path = cells_path(timepoint, view, level);
        if let Some(header) = self.headers.read().get(&path) {
            return Ok(*header);
        }

        let bytes = self.io.read(&dataset_header_path(&path)).await?;
        let header: DatasetHeader = serde_json::from_slice(&bytes)?;
        self.headers.write().insert(path, header);
        Ok(header)
    }

    /// Native-order cell grid of one level
    pub async fn grid(&self, timepoint: usize, view: usize, level: usize) -> Result<CellGrid> {
        let header = self.dataset(timepoint, view, level).await?;
        native_grid(&header)
    }

    /// Read and decode the cell at native grid `position`
    pub async fn read_cell(
        &self,
        timepoint: usize,
        view: usize,
        level: usize,
        position: Triple,
    ) -> Result<StoredCell> {
        let header = self.dataset(timepoint, view, level).await?;
        let grid = native_grid(&header)?;
        let expected = grid.cell(position).ok_or_else(|| {
            StorageError::NotFound(format!("cell {:?} of level {}", position, level))
        })?;

        let key = cell_key(&cells_path(timepoint, view, level), to_sink_order(position));
        let object = self.io.read(&key).await?;
        let mut rest: &[u8] = &object;
        let cell_header: crate::metadata::CellHeader = bincode::deserialize_from(&mut rest)?;

        if from_sink_order(cell_header.offset) != expected.min
            || from_sink_order(cell_header.extent) != expected.extent
        {
            return Err(StorageError::InvalidFormat(format!(
                "cell {} does not match its grid position",
                key
            )));
        }

        let compressor = get_compressor(cell_header.compression, cell_header.data_type);
        let raw = compressor.decompress(rest, Some(cell_header.uncompressed_len as usize))?;
        if raw.len() as u64 != cell_header.uncompressed_len
            || !verify_checksum(&raw, cell_header.checksum)
        {
            return Err(StorageError::Checksum(key));
        }

        Ok(StoredCell {
            min: expected.min,
            extent: expected.extent,
            buffer: CellBuffer::from_bytes(cell_header.data_type, raw)?,
        })
    }

    /// Read several cells of one level concurrently
    pub async fn read_cells(
        &self,
        timepoint: usize,
        view: usize,
        level: usize,
        positions: &[Triple],
    ) -> Result<Vec<StoredCell>> {
        let futures: Vec<_> = positions
            .iter()
            .map(|&position| self.read_cell(timepoint, view, level, position))
            .collect();
        try_join_all(futures).await
    }

    /// Assemble a whole level into a dense volume
    pub async fn read_level<T: Sample>(
        &self,
        timepoint: usize,
        view: usize,
        level: usize,
    ) -> Result<ArrayVolume<T>> {
        let header = self.dataset(timepoint, view, level).await?;
        if header.data_type != T::DATA_TYPE {
            return Err(StorageError::DataTypeMismatch {
                expected: T::DATA_TYPE,
                found: header.data_type,
            });
        }

        let grid = native_grid(&header)?;
        let positions: Vec<Triple> = grid.iter().map(|c| c.position).collect();
        let cells = self.read_cells(timepoint, view, level, &positions).await?;

        let mut volume = ArrayVolume::zeros(grid.dimensions());
        for cell in cells {
            let samples = cell.buffer.samples::<T>()?;
            let [ex, ey, _] = cell.extent;
            for (i, value) in samples.into_iter().enumerate() {
                let x = i % ex;
                let y = (i / ex) % ey;
                let z = i / (ex * ey);
                volume.set([cell.min[0] + x, cell.min[1] + y, cell.min[2] + z], value);
            }
        }
        Ok(volume)
    }
}
