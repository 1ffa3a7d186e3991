//! Pyramid writer - streams every level of every view and timepoint to a sink
//!
//! The writer runs strictly sequentially: for each timepoint and view it loads
//! the source volume once, derives each level from that full-resolution
//! volume, and writes the level cell by cell. Only one level and one cell are
//! resident besides the source volume.

use crate::axis::to_sink_order;
use crate::config::{validate_dimensions, ExportConfig, ResolutionSpec};
use crate::downsample::level_source;
use crate::error::{ExportError, ExportResult, StorageError, WorkUnit};
use crate::metadata::cells_path;
use crate::partition::partition;
use crate::progress::{total_units, CancellationToken, ProgressListener, ProgressTracker};
use crate::sink::ExportSink;
use crate::source::ImageSource;
use crate::types::{CellBuffer, Sample, Triple};
use crate::utils::format_bytes;
use crate::volume::VolumeSource;
use tracing::{debug, info, trace, warn};

/// Lifecycle of a [`PyramidWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Created, nothing validated or written
    Init,
    /// Writing per-view levels and global counts
    WritingMetadata,
    /// Writing image data
    Writing,
    /// Export finished and sink closed, or writer closed explicitly
    Closed,
    /// Export aborted; the sink was left unfinalized
    Failed,
}

/// Counts of what an export wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub num_timepoints: usize,
    pub num_views: usize,
    pub datasets: usize,
    pub cells: usize,
    /// Uncompressed sample bytes handed to the sink
    pub bytes: usize,
}

/// Writes multi-resolution, chunked pyramids of an [`ImageSource`] to an [`ExportSink`]
pub struct PyramidWriter<K: ExportSink> {
    sink: K,
    config: ExportConfig,
    state: WriterState,
    progress: Option<Box<dyn ProgressListener>>,
    cancellation: Option<CancellationToken>,
}

fn sink_error(unit: WorkUnit) -> impl FnOnce(StorageError) -> ExportError {
    move |source| ExportError::SinkWrite { unit, source }
}

impl<K: ExportSink> PyramidWriter<K> {
    /// Writer in the `Init` state exporting into `sink` with `config`
    pub fn new(sink: K, config: ExportConfig) -> Self {
        Self {
            sink,
            config,
            state: WriterState::Init,
            progress: None,
            cancellation: None,
        }
    }

    /// Report `(completed, total)` after metadata, each source load and each level
    pub fn with_progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.progress = Some(Box::new(listener));
        self
    }

    /// Stop at the next cell once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Export configuration in effect
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Borrow the sink, e.g. to inspect what was written
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Consume the writer and return its sink
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run the whole export and close the sink.
    ///
    /// Any error aborts immediately and leaves the writer `Failed`; nothing
    /// already written is cleaned up and the sink is not finalized.
    pub fn export<S: ImageSource>(&mut self, source: &mut S) -> ExportResult<ExportSummary> {
        if self.state != WriterState::Init {
            return Err(ExportError::Closed);
        }

        match self.run(source) {
            Ok(summary) => {
                self.state = WriterState::Closed;
                info!(
                    datasets = summary.datasets,
                    cells = summary.cells,
                    size = %format_bytes(summary.bytes),
                    "export finished"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "export aborted");
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    /// Close the writer. A writer that never completed an export does not
    /// finalize its sink. Closing twice is a no-op.
    pub fn close(&mut self) -> ExportResult<()> {
        if self.state != WriterState::Closed {
            debug!(state = ?self.state, "closing writer without finalizing sink");
            self.state = WriterState::Closed;
        }
        Ok(())
    }

    fn validate<S: ImageSource>(&self, source: &S) -> ExportResult<Vec<Vec<ResolutionSpec>>> {
        let num_timepoints = source.num_timepoints();
        let num_views = source.num_views();
        if num_timepoints == 0 || num_views == 0 {
            return Err(ExportError::Configuration(format!(
                "nothing to export: {} timepoints, {} views",
                num_timepoints, num_views
            )));
        }

        let levels = self.config.levels_per_view(num_views)?;
        for timepoint in 0..num_timepoints {
            for (view, view_levels) in levels.iter().enumerate() {
                let dimensions = source.dimensions(timepoint, view).map_err(|e| {
                    ExportError::SourceLoad {
                        unit: WorkUnit::view(timepoint, view),
                        source: e,
                    }
                })?;
                validate_dimensions(dimensions, view_levels).map_err(|e| match e {
                    ExportError::Configuration(msg) => ExportError::Configuration(format!(
                        "timepoint {}, view {}: {}",
                        timepoint, view, msg
                    )),
                    other => other,
                })?;
            }
        }
        Ok(levels)
    }

    fn run<S: ImageSource>(&mut self, source: &mut S) -> ExportResult<ExportSummary> {
        let levels = self.validate(source)?;
        let num_timepoints = source.num_timepoints();
        let num_views = source.num_views();

        let mut progress =
            ProgressTracker::new(self.progress.take(), total_units(num_timepoints, &levels));
        progress.start();

        self.state = WriterState::WritingMetadata;
        for (view, view_levels) in levels.iter().enumerate() {
            let resolutions: Vec<Triple> = view_levels.iter().map(|l| l.factor).collect();
            let subdivisions: Vec<Triple> = view_levels.iter().map(|l| l.cell_shape).collect();
            self.sink
                .write_metadata(view, &resolutions, &subdivisions)
                .map_err(sink_error(WorkUnit::metadata()))?;
        }
        self.sink
            .write_global_counts(num_timepoints, num_views)
            .map_err(sink_error(WorkUnit::metadata()))?;
        progress.tick();

        self.state = WriterState::Writing;
        let mut summary = ExportSummary {
            num_timepoints,
            num_views,
            ..ExportSummary::default()
        };

        for timepoint in 0..num_timepoints {
            info!("processing timepoint {} / {}", timepoint + 1, num_timepoints);
            for (view, view_levels) in levels.iter().enumerate() {
                let unit = WorkUnit::view(timepoint, view);
                debug!("loading view {} / {}", view + 1, num_views);

                let volume = source
                    .load_volume(timepoint, view)
                    .map_err(|e| ExportError::SourceLoad { unit, source: e })?;
                let expected = source
                    .dimensions(timepoint, view)
                    .map_err(|e| ExportError::SourceLoad { unit, source: e })?;
                if volume.dimensions() != expected {
                    return Err(ExportError::SourceLoad {
                        unit,
                        source: anyhow::anyhow!(
                            "loaded volume has dimensions {:?}, expected {:?}",
                            volume.dimensions(),
                            expected
                        ),
                    });
                }
                progress.tick();

                for (level, spec) in view_levels.iter().enumerate() {
                    self.write_level::<S::Sample>(
                        &volume,
                        timepoint,
                        view,
                        level,
                        spec,
                        &mut summary,
                    )?;
                    progress.tick();
                }
            }
        }

        self.sink.close().map_err(sink_error(WorkUnit::metadata()))?;
        debug!(units = progress.completed(), "all work units complete");
        self.progress = progress.into_listener();
        Ok(summary)
    }

    fn write_level<T: Sample>(
        &mut self,
        source: &dyn VolumeSource<T>,
        timepoint: usize,
        view: usize,
        level: usize,
        spec: &ResolutionSpec,
        summary: &mut ExportSummary,
    ) -> ExportResult<()> {
        let unit = WorkUnit::view(timepoint, view).with_level(level);

        let level_volume = level_source(source, spec.factor);
        let dimensions = level_volume.dimensions();
        let grid = partition(dimensions, spec.cell_shape)?;
        let path = cells_path(timepoint, view, level);
        debug!(
            level,
            ?dimensions,
            cell_shape = ?spec.cell_shape,
            cells = grid.len(),
            "writing level"
        );

        self.sink
            .create_dataset(
                &path,
                to_sink_order(dimensions),
                to_sink_order(spec.cell_shape),
                T::DATA_TYPE,
            )
            .map_err(sink_error(unit))?;

        for cell in &grid {
            let cell_unit = unit.with_cell(cell.position);
            if let Some(token) = &self.cancellation {
                if token.is_cancelled() {
                    return Err(ExportError::Cancelled { unit: cell_unit });
                }
            }

            let mut buffer = CellBuffer::with_capacity::<T>(cell.num_voxels());
            level_volume.copy_cell(&cell, &mut buffer);
            self.sink
                .write_cell(
                    &path,
                    &buffer,
                    to_sink_order(cell.extent),
                    to_sink_order(cell.min),
                )
                .map_err(sink_error(cell_unit))?;
            trace!(position = ?cell.position, extent = ?cell.extent, "wrote cell");

            summary.cells += 1;
            summary.bytes += buffer.as_bytes().len();
        }

        self.sink.close_dataset(&path).map_err(sink_error(unit))?;
        summary.datasets += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MipmapConfig;
    use crate::sink::{MemorySink, SinkEvent};
    use crate::source::VolumeSeries;
    use crate::types::DataType;
    use crate::volume::ArrayVolume;

    fn config(resolutions: Vec<Triple>, subdivisions: Vec<Triple>) -> ExportConfig {
        ExportConfig::new(MipmapConfig::new(resolutions, subdivisions))
    }

    #[test]
    fn test_call_order() {
        let mut source = VolumeSeries::single(ArrayVolume::<u16>::zeros([4, 4, 2]));
        let mut writer = PyramidWriter::new(
            MemorySink::new(),
            config(vec![[1, 1, 1], [2, 2, 1]], vec![[4, 4, 2], [2, 2, 2]]),
        );
        writer.export(&mut source).unwrap();
        let events = writer.sink().events();

        assert!(matches!(events[0], SinkEvent::Metadata { view: 0, .. }));
        assert!(matches!(
            events[1],
            SinkEvent::GlobalCounts {
                num_timepoints: 1,
                num_views: 1
            }
        ));
        assert!(matches!(
            &events[2],
            SinkEvent::CreateDataset { path, data_type: DataType::U16, .. }
                if path == "t00000/s00/0/cells"
        ));
        assert!(matches!(events[3], SinkEvent::WriteCell { .. }));
        assert!(matches!(events[4], SinkEvent::CloseDataset { .. }));
        assert!(matches!(
            &events[5],
            SinkEvent::CreateDataset { path, .. } if path == "t00000/s00/1/cells"
        ));
        assert!(matches!(events.last(), Some(SinkEvent::Close)));
        assert_eq!(writer.state(), WriterState::Closed);
    }

    #[test]
    fn test_metadata_written_before_image_data() {
        let volume = ArrayVolume::<u8>::zeros([4, 4, 4]);
        let mut source = VolumeSeries::new(vec![
            vec![volume.clone(), volume.clone()],
            vec![volume.clone(), volume],
        ])
        .unwrap();
        let mut writer = PyramidWriter::new(
            MemorySink::new(),
            config(vec![[1, 1, 1]], vec![[2, 2, 2]]),
        );
        writer.export(&mut source).unwrap();

        let events = writer.sink().events();
        let first_dataset = events
            .iter()
            .position(|e| matches!(e, SinkEvent::CreateDataset { .. }))
            .unwrap();
        let metadata_calls = events[..first_dataset]
            .iter()
            .filter(|e| matches!(e, SinkEvent::Metadata { .. }))
            .count();
        assert_eq!(metadata_calls, 2);
        assert!(matches!(events[first_dataset - 1], SinkEvent::GlobalCounts { .. }));
    }

    #[test]
    fn test_configuration_errors_before_io() {
        let mut source = VolumeSeries::single(ArrayVolume::<u16>::zeros([10, 10, 4]));

        let mut writer = PyramidWriter::new(
            MemorySink::new(),
            config(vec![[1, 1, 1], [4, 4, 1]], vec![[4, 4, 4], [4, 4, 4]]),
        );
        assert!(matches!(
            writer.export(&mut source),
            Err(ExportError::Configuration(_))
        ));
        assert!(writer.sink().events().is_empty());
        assert_eq!(writer.state(), WriterState::Failed);

        let mut writer = PyramidWriter::new(MemorySink::new(), config(vec![[1, 1, 1]], vec![]));
        assert!(matches!(
            writer.export(&mut source),
            Err(ExportError::Configuration(_))
        ));
        assert!(writer.sink().events().is_empty());
    }

    #[test]
    fn test_export_twice_is_rejected_and_close_is_idempotent() {
        let mut source = VolumeSeries::single(ArrayVolume::<u16>::zeros([2, 2, 2]));
        let mut writer = PyramidWriter::new(
            MemorySink::new(),
            config(vec![[1, 1, 1]], vec![[2, 2, 2]]),
        );
        writer.export(&mut source).unwrap();
        assert!(matches!(writer.export(&mut source), Err(ExportError::Closed)));
        writer.close().unwrap();
        writer.close().unwrap();
        let closes = writer
            .sink()
            .events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Close))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_cancellation_stops_at_cell_boundary() {
        let mut source = VolumeSeries::single(ArrayVolume::<u16>::zeros([8, 8, 8]));
        let token = CancellationToken::new();
        token.cancel();
        let mut writer = PyramidWriter::new(
            MemorySink::new(),
            config(vec![[1, 1, 1]], vec![[4, 4, 4]]),
        )
        .with_cancellation(token);

        let err = writer.export(&mut source).unwrap_err();
        match err {
            ExportError::Cancelled { unit } => {
                assert_eq!(unit.level, Some(0));
                assert_eq!(unit.cell, Some([0, 0, 0]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(writer.sink().cell_writes().count(), 0);
        assert!(!writer.sink().is_closed());
    }
}
