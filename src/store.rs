//! Chunk store sink: writes a pyramid as objects through an [`IOManager`]
//!
//! Metadata keys follow the BigDataViewer layout (`s00/resolutions`,
//! `numTimepoints`, `t00000/s00/0/cells`, ...). Each cell is one object holding
//! a bincode [`CellHeader`] followed by the compressed samples. The full
//! [`PyramidMetadata`] is written to `pyramid.json` only when `close()` finds
//! every dataset complete, so its presence marks a usable store.

use crate::axis::{self, SinkTriple};
use crate::compression::{get_compressor, Compressor};
use crate::config::{CompressionConfig, ExportConfig};
use crate::error::{Result, StorageError};
use crate::io::{create_io_manager, IOManager};
use crate::metadata::{
    cell_key, dataset_header_path, resolutions_path, subdivisions_path, CellHeader,
    DatasetHeader, PyramidMetadata, ViewMipmaps, NUM_SETUPS_KEY, NUM_TIMEPOINTS_KEY,
    PYRAMID_KEY,
};
use crate::partition::CellGrid;
use crate::sink::ExportSink;
use crate::types::{CellBuffer, DataType, Triple};
use crate::utils::{calculate_checksum, format_bytes};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Bookkeeping for one created dataset
struct DatasetState {
    header: DatasetHeader,
    /// Grid over the sink-order dimensions
    grid: CellGrid,
    written: Vec<bool>,
    num_written: usize,
    closed: bool,
}

/// [`ExportSink`] writing a pyramid store.
///
/// The sink is synchronous: each call blocks on a private current-thread
/// runtime, so it must not be used from inside an async task.
pub struct ChunkStoreSink {
    io: Arc<dyn IOManager>,
    runtime: Runtime,
    compression: CompressionConfig,
    compressor: Box<dyn Compressor>,
    metadata: PyramidMetadata,
    views: BTreeMap<usize, ViewMipmaps>,
    num_views: Option<usize>,
    datasets: HashMap<String, DatasetState>,
    bytes_written: usize,
    closed: bool,
}

impl ChunkStoreSink {
    /// Create a store at `url` (`file://...`, a plain path, or `memory://`)
    /// compressing cells as `config.compression` requests
    pub fn create(url: &str, data_type: DataType, config: &ExportConfig) -> Result<Self> {
        Self::with_io(create_io_manager(url)?, data_type, config)
    }

    /// Create a store on an existing I/O manager.
    ///
    /// Objects left by an earlier export into the same store are deleted
    /// first. A non-empty store holding no pyramid keys is refused.
    pub fn with_io(
        io: Arc<dyn IOManager>,
        data_type: DataType,
        config: &ExportConfig,
    ) -> Result<Self> {
        let compression = config.compression;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(prepare_store(io.as_ref()))?;

        Ok(Self {
            io,
            runtime,
            compression,
            compressor: get_compressor(compression.method, data_type),
            metadata: PyramidMetadata::new(data_type, compression.method),
            views: BTreeMap::new(),
            num_views: None,
            datasets: HashMap::new(),
            bytes_written: 0,
            closed: false,
        })
    }

    /// Metadata that will be written as the completion marker
    pub fn metadata(&self) -> &PyramidMetadata {
        &self.metadata
    }

    /// Total bytes of objects written so far
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn put(&mut self, key: &str, data: &[u8]) -> Result<()> {
        self.block_on(self.io.write(key, data))?;
        self.bytes_written += data.len();
        Ok(())
    }

    fn put_json<T: serde::Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        self.put(key, &json)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn open_dataset(&mut self, path: &str) -> Result<&mut DatasetState> {
        let dataset = self
            .datasets
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound(format!("dataset {}", path)))?;
        if dataset.closed {
            return Err(StorageError::DatasetState(format!(
                "dataset {} is already closed",
                path
            )));
        }
        Ok(dataset)
    }

    /// Problems that keep the store from being complete
    fn completeness_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self.num_views {
            None => problems.push("global counts were never written".to_string()),
            Some(n) if n != self.views.len() => problems.push(format!(
                "{} views counted but metadata for {}",
                n,
                self.views.len()
            )),
            Some(_) => {}
        }
        let open: Vec<&str> = self
            .datasets
            .iter()
            .filter(|(_, d)| !d.closed)
            .map(|(p, _)| p.as_str())
            .collect();
        if !open.is_empty() {
            problems.push(format!("{} datasets left open", open.len()));
        }
        let expected = self.metadata.num_datasets();
        if self.datasets.len() != expected {
            problems.push(format!(
                "{} datasets written, {} expected",
                self.datasets.len(),
                expected
            ));
        }
        problems
    }
}

impl ExportSink for ChunkStoreSink {
    fn write_metadata(
        &mut self,
        view: usize,
        resolutions: &[Triple],
        subdivisions: &[Triple],
    ) -> Result<()> {
        self.ensure_open()?;
        let mipmaps = ViewMipmaps::new(resolutions, subdivisions);
        self.put_json(&resolutions_path(view), &mipmaps.resolutions)?;
        self.put_json(&subdivisions_path(view), &mipmaps.subdivisions)?;
        self.views.insert(view, mipmaps);
        Ok(())
    }

    fn write_global_counts(&mut self, num_timepoints: usize, num_views: usize) -> Result<()> {
        self.ensure_open()?;
        self.put_json(NUM_TIMEPOINTS_KEY, &num_timepoints)?;
        self.put_json(NUM_SETUPS_KEY, &num_views)?;
        self.metadata.num_timepoints = num_timepoints;
        self.num_views = Some(num_views);
        Ok(())
    }

    fn create_dataset(
        &mut self,
        path: &str,
        dimensions: SinkTriple,
        cell_shape: SinkTriple,
        data_type: DataType,
    ) -> Result<()> {
        self.ensure_open()?;
        if data_type != self.metadata.data_type {
            return Err(StorageError::DataTypeMismatch {
                expected: self.metadata.data_type,
                found: data_type,
            });
        }
        if self.datasets.contains_key(path) {
            return Err(StorageError::DatasetState(format!(
                "dataset {} already exists",
                path
            )));
        }
        let grid = CellGrid::new(dimensions.get(), cell_shape.get())
            .map_err(|e| StorageError::InvalidWrite(e.to_string()))?;

        let header = DatasetHeader {
            dimensions,
            cell_shape,
            data_type,
            compression: self.compression.method,
        };
        self.put_json(&dataset_header_path(path), &header)?;
        debug!(path, %dimensions, %cell_shape, cells = grid.len(), "created dataset");

        self.datasets.insert(
            path.to_string(),
            DatasetState {
                header,
                grid,
                written: vec![false; grid.len()],
                num_written: 0,
                closed: false,
            },
        );
        Ok(())
    }

    fn write_cell(
        &mut self,
        path: &str,
        buffer: &CellBuffer,
        extent: SinkTriple,
        offset: SinkTriple,
    ) -> Result<()> {
        self.ensure_open()?;
        let dataset = self.open_dataset(path)?;
        let header = dataset.header;

        if buffer.data_type() != header.data_type {
            return Err(StorageError::DataTypeMismatch {
                expected: header.data_type,
                found: buffer.data_type(),
            });
        }
        if buffer.len() != extent.volume() {
            return Err(StorageError::InvalidWrite(format!(
                "{} samples for extent {} in {}",
                buffer.len(),
                extent,
                path
            )));
        }

        let shape = header.cell_shape.get();
        let raw_offset = offset.get();
        if (0..3).any(|d| raw_offset[d] % shape[d] != 0) {
            return Err(StorageError::InvalidWrite(format!(
                "offset {} is not aligned to cell shape {} in {}",
                offset, header.cell_shape, path
            )));
        }
        let position = [
            raw_offset[0] / shape[0],
            raw_offset[1] / shape[1],
            raw_offset[2] / shape[2],
        ];
        let cell = dataset.grid.cell(position).ok_or_else(|| {
            StorageError::InvalidWrite(format!("offset {} is outside {}", offset, path))
        })?;
        if cell.extent != extent.get() {
            return Err(StorageError::InvalidWrite(format!(
                "extent {} does not match the cell at {} (expected {:?})",
                extent, offset, cell.extent
            )));
        }
        let index = dataset.grid.position_to_index(position);
        if dataset.written[index] {
            return Err(StorageError::InvalidWrite(format!(
                "cell at {} of {} written twice",
                offset, path
            )));
        }

        let raw = buffer.as_bytes();
        let payload = self
            .compressor
            .compress(raw, self.compression.compression_level())?;
        let cell_header = CellHeader {
            extent,
            offset,
            data_type: header.data_type,
            compression: header.compression,
            uncompressed_len: raw.len() as u64,
            checksum: calculate_checksum(raw),
        };
        let mut object = bincode::serialize(&cell_header)?;
        object.extend_from_slice(&payload);

        let key = cell_key(path, SinkTriple::from_sink_order(position));
        self.put(&key, &object)?;

        let dataset = self.open_dataset(path)?;
        dataset.written[index] = true;
        dataset.num_written += 1;
        Ok(())
    }

    fn close_dataset(&mut self, path: &str) -> Result<()> {
        self.ensure_open()?;
        let dataset = self.open_dataset(path)?;
        if dataset.num_written != dataset.grid.len() {
            return Err(StorageError::DatasetState(format!(
                "dataset {} closed with {} of {} cells written",
                path,
                dataset.num_written,
                dataset.grid.len()
            )));
        }
        dataset.closed = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.metadata.views = self.views.values().cloned().collect();
        let problems = self.completeness_problems();
        if !problems.is_empty() {
            warn!(?problems, "closing incomplete pyramid store without completion marker");
            return Err(StorageError::Incomplete(problems.join("; ")));
        }

        let marker = serde_json::to_vec_pretty(&self.metadata)?;
        self.block_on(self.io.write(PYRAMID_KEY, &marker))?;
        self.bytes_written += marker.len();

        info!(
            export_id = %self.metadata.export_id,
            datasets = self.datasets.len(),
            size = %format_bytes(self.bytes_written),
            "pyramid store complete"
        );
        Ok(())
    }
}

/// Clear a store left by an earlier export; refuse one holding anything else
async fn prepare_store(io: &dyn IOManager) -> Result<()> {
    let existing = io.list("").await?;
    if existing.is_empty() {
        return Ok(());
    }
    let root_keys = [PYRAMID_KEY, NUM_SETUPS_KEY, NUM_TIMEPOINTS_KEY];
    let is_pyramid = existing
        .iter()
        .any(|name| root_keys.contains(&name.as_str()));
    if !is_pyramid {
        return Err(StorageError::InvalidWrite(format!(
            "store is not empty and holds no pyramid ({} entries)",
            existing.len()
        )));
    }
    warn!(entries = existing.len(), "clearing objects of a previous export");
    io.clear().await
}

/// Native-order grid of a stored dataset
pub(crate) fn native_grid(header: &DatasetHeader) -> Result<CellGrid> {
    CellGrid::new(
        axis::from_sink_order(header.dimensions),
        axis::from_sink_order(header.cell_shape),
    )
    .map_err(|e| StorageError::InvalidFormat(e.to_string()))
}
