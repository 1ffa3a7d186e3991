//! Image sources: where the writer gets the volume of each (timepoint, view)

use crate::types::{Sample, Triple};
use crate::volume::{ArrayVolume, VolumeSource};
use anyhow::{bail, Context};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

/// Provider of full-resolution volumes for every (timepoint, view) pair
pub trait ImageSource {
    type Sample: Sample;
    type Volume: VolumeSource<Self::Sample>;

    fn num_timepoints(&self) -> usize;

    fn num_views(&self) -> usize;

    /// Dimensions of a volume without loading it
    fn dimensions(&self, timepoint: usize, view: usize) -> anyhow::Result<Triple>;

    /// Load the volume; may block on disk or network I/O
    fn load_volume(&mut self, timepoint: usize, view: usize) -> anyhow::Result<Self::Volume>;
}

/// In-memory series of volumes indexed `[timepoint][view]`
#[derive(Debug, Clone)]
pub struct VolumeSeries<T> {
    volumes: Vec<Vec<Arc<ArrayVolume<T>>>>,
}

impl<T: Sample> VolumeSeries<T> {
    /// Every timepoint must hold the same number of views
    pub fn new(volumes: Vec<Vec<ArrayVolume<T>>>) -> anyhow::Result<Self> {
        if let Some(first) = volumes.first() {
            if volumes.iter().any(|views| views.len() != first.len()) {
                bail!("timepoints hold different numbers of views");
            }
        }
        Ok(Self {
            volumes: volumes
                .into_iter()
                .map(|views| views.into_iter().map(Arc::new).collect())
                .collect(),
        })
    }

    /// A single timepoint with a single view
    pub fn single(volume: ArrayVolume<T>) -> Self {
        Self {
            volumes: vec![vec![Arc::new(volume)]],
        }
    }

    fn get(&self, timepoint: usize, view: usize) -> anyhow::Result<&Arc<ArrayVolume<T>>> {
        self.volumes
            .get(timepoint)
            .and_then(|views| views.get(view))
            .with_context(|| format!("no volume for timepoint {}, view {}", timepoint, view))
    }
}

impl<T: Sample> ImageSource for VolumeSeries<T> {
    type Sample = T;
    type Volume = Arc<ArrayVolume<T>>;

    fn num_timepoints(&self) -> usize {
        self.volumes.len()
    }

    fn num_views(&self) -> usize {
        self.volumes.first().map_or(0, |views| views.len())
    }

    fn dimensions(&self, timepoint: usize, view: usize) -> anyhow::Result<Triple> {
        Ok(self.get(timepoint, view)?.dimensions())
    }

    fn load_volume(&mut self, timepoint: usize, view: usize) -> anyhow::Result<Self::Volume> {
        self.get(timepoint, view).cloned()
    }
}

/// Headerless little-endian raw files, one per (timepoint, view).
///
/// The file name pattern may contain `{t}` and `{v}`, optionally with a
/// zero-padding width such as `{t:3}`.
#[derive(Debug, Clone)]
pub struct RawFileSource<T> {
    pattern: String,
    dimensions: Triple,
    num_timepoints: usize,
    num_views: usize,
    _sample: PhantomData<T>,
}

impl<T: Sample> RawFileSource<T> {
    pub fn new(
        pattern: impl Into<String>,
        dimensions: Triple,
        num_timepoints: usize,
        num_views: usize,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            dimensions,
            num_timepoints,
            num_views,
            _sample: PhantomData,
        }
    }

    /// File holding the volume of `(timepoint, view)`
    pub fn path(&self, timepoint: usize, view: usize) -> PathBuf {
        let name = substitute(&self.pattern, 't', timepoint);
        PathBuf::from(substitute(&name, 'v', view))
    }
}

/// Replace `{key}` or `{key:width}` with a zero-padded `value`
fn substitute(pattern: &str, key: char, value: usize) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let inner = &tail[1..end];
        let mut parts = inner.splitn(2, ':');
        let name = parts.next().unwrap_or_default();
        let width = parts.next().and_then(|w| w.parse::<usize>().ok());

        if name.len() == 1 && name.starts_with(key) {
            match width {
                Some(w) => out.push_str(&format!("{:0w$}", value, w = w)),
                None => out.push_str(&value.to_string()),
            }
        } else {
            out.push_str(&tail[..=end]);
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

impl<T: Sample> ImageSource for RawFileSource<T> {
    type Sample = T;
    type Volume = ArrayVolume<T>;

    fn num_timepoints(&self) -> usize {
        self.num_timepoints
    }

    fn num_views(&self) -> usize {
        self.num_views
    }

    fn dimensions(&self, _timepoint: usize, _view: usize) -> anyhow::Result<Triple> {
        Ok(self.dimensions)
    }

    fn load_volume(&mut self, timepoint: usize, view: usize) -> anyhow::Result<Self::Volume> {
        let path = self.path(timepoint, view);
        let bytes =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;

        let width = T::DATA_TYPE.size_in_bytes();
        let expected = self.dimensions.iter().product::<usize>() * width;
        if bytes.len() != expected {
            bail!(
                "{} holds {} bytes, expected {} for {:?} {} samples",
                path.display(),
                bytes.len(),
                expected,
                self.dimensions,
                T::DATA_TYPE
            );
        }

        let samples = bytes.chunks_exact(width).map(T::read_le).collect();
        Ok(ArrayVolume::from_vec(self.dimensions, samples)?)
    }
}
