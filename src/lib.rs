//! volpyramid - multi-resolution chunked volume export
//!
//! Turns time series of multi-view 3D scalar volumes into resolution
//! pyramids: each level is a box-averaged downsampling of the
//! full-resolution volume, partitioned into fixed-shape cells and streamed to
//! an export sink.
//!
//! # Features
//!
//! - Per-view mipmap definitions with strict divisibility validation
//! - Synchronous, bounded-memory pipeline with progress and cancellation
//! - Chunk store backend on the local filesystem or in memory
//! - Cell compression (Deflate, Zstd, RLE) with CRC32 verification
//! - Async reader for completed stores
//!
//! # Axis order
//!
//! Volumes are addressed in native (x, y, z) order with x fastest. Sinks
//! receive dimensions, cell shapes, extents and offsets in reversed (z, y, x)
//! order; [`axis`] is the only place that conversion happens.
//!
//! # Example
//!
//! ```rust,ignore
//! use volpyramid::{ArrayVolume, ChunkStoreSink, ExportConfig, PyramidWriter, VolumeSeries};
//! use volpyramid::{CompressionMethod, DataType};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let volume = ArrayVolume::<u16>::zeros([256, 256, 64]);
//! let mut source = VolumeSeries::single(volume);
//!
//! let config = ExportConfig::default().with_compression(CompressionMethod::Zstd, 3);
//! let sink = ChunkStoreSink::create("file:///data/pyramid", DataType::U16, &config)?;
//! let mut writer = PyramidWriter::new(sink, config)
//!     .with_progress(|done, total| println!("{done}/{total}"));
//! writer.export(&mut source)?;
//! # Ok(())
//! # }
//! ```

pub mod axis;
pub mod catalog;
pub mod compression;
pub mod config;
pub mod downsample;
pub mod error;
pub mod io;
pub mod metadata;
pub mod partition;
pub mod progress;
pub mod reader;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;
pub mod utils;
pub mod volume;
pub mod writer;

// Re-exports
pub use axis::{from_sink_order, reorder, to_sink_order, SinkTriple};
pub use catalog::{CatalogEvent, VolumeCatalog};
pub use compression::{CompressionMethod, Compressor};
pub use config::{ExportConfig, MipmapConfig, MipmapPreset, ResolutionSpec};
pub use downsample::downsample;
pub use error::{ExportError, ExportResult, Result, StorageError, WorkUnit};
pub use io::{IOManager, StorageBackend};
pub use metadata::PyramidMetadata;
pub use partition::{partition, CellDescriptor, CellGrid};
pub use progress::{CancellationToken, ProgressListener};
pub use reader::{PyramidReader, StoredCell};
pub use sink::{ExportSink, MemorySink, SinkEvent};
pub use source::{ImageSource, RawFileSource, VolumeSeries};
pub use store::ChunkStoreSink;
pub use types::{CellBuffer, DataType, Sample, Triple};
pub use volume::{ArrayVolume, VolumeSource};
pub use writer::{ExportSummary, PyramidWriter, WriterState};

/// Version of the volpyramid implementation
pub const VOLPYRAMID_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VOLPYRAMID_VERSION.is_empty());
    }
}
