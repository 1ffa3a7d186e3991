//! The export sink: destination of dataset creation and cell writes

use crate::axis::SinkTriple;
use crate::error::{Result, StorageError};
use crate::types::{CellBuffer, DataType, Triple};

/// Destination of a pyramid export.
///
/// Calls arrive in a fixed order: `write_metadata` for every view and
/// `write_global_counts` before any image data, then for every
/// (timepoint, view, level) `create_dataset`, one `write_cell` per cell and
/// `close_dataset`, and finally `close`. All coordinate triples are in sink
/// order.
pub trait ExportSink {
    /// Persist the resolution factors and cell shapes of one view (native order)
    fn write_metadata(
        &mut self,
        view: usize,
        resolutions: &[Triple],
        subdivisions: &[Triple],
    ) -> Result<()>;

    /// Persist the number of timepoints and views
    fn write_global_counts(&mut self, num_timepoints: usize, num_views: usize) -> Result<()>;

    /// Create a chunked dataset at `path`
    fn create_dataset(
        &mut self,
        path: &str,
        dimensions: SinkTriple,
        cell_shape: SinkTriple,
        data_type: DataType,
    ) -> Result<()>;

    /// Write one cell; `buffer` holds `extent.volume()` samples, last axis fastest
    fn write_cell(
        &mut self,
        path: &str,
        buffer: &CellBuffer,
        extent: SinkTriple,
        offset: SinkTriple,
    ) -> Result<()>;

    /// Finish the dataset at `path`
    fn close_dataset(&mut self, path: &str) -> Result<()>;

    /// Flush and release the container. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// A call received by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Metadata {
        view: usize,
        resolutions: Vec<Triple>,
        subdivisions: Vec<Triple>,
    },
    GlobalCounts {
        num_timepoints: usize,
        num_views: usize,
    },
    CreateDataset {
        path: String,
        dimensions: SinkTriple,
        cell_shape: SinkTriple,
        data_type: DataType,
    },
    WriteCell {
        path: String,
        buffer: CellBuffer,
        extent: SinkTriple,
        offset: SinkTriple,
    },
    CloseDataset {
        path: String,
    },
    Close,
}

/// Sink that records every call, for dry runs and inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<SinkEvent>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls in order
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recorded cell writes as `(path, extent, offset, buffer)`
    pub fn cell_writes(&self) -> impl Iterator<Item = (&str, SinkTriple, SinkTriple, &CellBuffer)> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::WriteCell {
                path,
                buffer,
                extent,
                offset,
            } => Some((path.as_str(), *extent, *offset, buffer)),
            _ => None,
        })
    }

    /// Dimensions the dataset at `path` was created with
    pub fn dataset_dimensions(&self, path: &str) -> Option<SinkTriple> {
        self.events.iter().find_map(|e| match e {
            SinkEvent::CreateDataset {
                path: p,
                dimensions,
                ..
            } if p == path => Some(*dimensions),
            _ => None,
        })
    }

    fn record(&mut self, event: SinkEvent) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        self.events.push(event);
        Ok(())
    }
}

impl ExportSink for MemorySink {
    fn write_metadata(
        &mut self,
        view: usize,
        resolutions: &[Triple],
        subdivisions: &[Triple],
    ) -> Result<()> {
        self.record(SinkEvent::Metadata {
            view,
            resolutions: resolutions.to_vec(),
            subdivisions: subdivisions.to_vec(),
        })
    }

    fn write_global_counts(&mut self, num_timepoints: usize, num_views: usize) -> Result<()> {
        self.record(SinkEvent::GlobalCounts {
            num_timepoints,
            num_views,
        })
    }

    fn create_dataset(
        &mut self,
        path: &str,
        dimensions: SinkTriple,
        cell_shape: SinkTriple,
        data_type: DataType,
    ) -> Result<()> {
        self.record(SinkEvent::CreateDataset {
            path: path.to_string(),
            dimensions,
            cell_shape,
            data_type,
        })
    }

    fn write_cell(
        &mut self,
        path: &str,
        buffer: &CellBuffer,
        extent: SinkTriple,
        offset: SinkTriple,
    ) -> Result<()> {
        if buffer.len() != extent.volume() {
            return Err(StorageError::InvalidWrite(format!(
                "{} samples for extent {}",
                buffer.len(),
                extent
            )));
        }
        self.record(SinkEvent::WriteCell {
            path: path.to_string(),
            buffer: buffer.clone(),
            extent,
            offset,
        })
    }

    fn close_dataset(&mut self, path: &str) -> Result<()> {
        self.record(SinkEvent::CloseDataset {
            path: path.to_string(),
        })
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.events.push(SinkEvent::Close);
            self.closed = true;
        }
        Ok(())
    }
}
