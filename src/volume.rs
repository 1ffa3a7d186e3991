//! Random-access volumes

use crate::error::{Result, StorageError};
use crate::partition::CellDescriptor;
use crate::types::{CellBuffer, Sample, Triple};
use ndarray::{s, Array3};
use std::sync::Arc;

/// A fully resolved, randomly addressable 3D scalar volume
pub trait VolumeSource<T: Sample> {
    /// Dimensions in native (x, y, z) order
    fn dimensions(&self) -> Triple;

    /// Sample at `position`; callers stay within `dimensions()`
    fn sample(&self, position: Triple) -> T;

    /// Append the samples of `cell` to `out`, x fastest, then y, then z.
    ///
    /// That order is row-major in sink order (z, y, x), so the buffer can be
    /// handed to a sink unchanged.
    fn copy_cell(&self, cell: &CellDescriptor, out: &mut CellBuffer) {
        let max = cell.max();
        for z in cell.min[2]..max[2] {
            for y in cell.min[1]..max[1] {
                for x in cell.min[0]..max[0] {
                    out.push(self.sample([x, y, z]));
                }
            }
        }
    }
}

/// Dense in-memory volume backed by an ndarray indexed `[z, y, x]`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayVolume<T> {
    data: Array3<T>,
}

impl<T: Sample> ArrayVolume<T> {
    /// Volume of the given native dimensions filled with `T::default()`
    pub fn zeros(dimensions: Triple) -> Self {
        let [x, y, z] = dimensions;
        Self {
            data: Array3::from_elem((z, y, x), T::default()),
        }
    }

    /// Build a volume by evaluating `f` at every native position
    pub fn from_fn(dimensions: Triple, mut f: impl FnMut(Triple) -> T) -> Self {
        let [x, y, z] = dimensions;
        Self {
            data: Array3::from_shape_fn((z, y, x), |(k, j, i)| f([i, j, k])),
        }
    }

    /// Wrap samples stored x fastest, then y, then z
    pub fn from_vec(dimensions: Triple, samples: Vec<T>) -> Result<Self> {
        let [x, y, z] = dimensions;
        let data = Array3::from_shape_vec((z, y, x), samples).map_err(|e| {
            StorageError::InvalidFormat(format!(
                "samples do not match dimensions {:?}: {}",
                dimensions, e
            ))
        })?;
        Ok(Self { data })
    }

    /// Set the sample at a native position
    pub fn set(&mut self, position: Triple, value: T) {
        let [x, y, z] = position;
        self.data[[z, y, x]] = value;
    }

    /// Underlying array, indexed `[z, y, x]`
    pub fn as_array(&self) -> &Array3<T> {
        &self.data
    }

    pub fn as_array_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    /// Number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Sample> VolumeSource<T> for ArrayVolume<T> {
    fn dimensions(&self) -> Triple {
        let (z, y, x) = self.data.dim();
        [x, y, z]
    }

    fn sample(&self, position: Triple) -> T {
        let [x, y, z] = position;
        self.data[[z, y, x]]
    }

    fn copy_cell(&self, cell: &CellDescriptor, out: &mut CellBuffer) {
        let max = cell.max();
        let block = self.data.slice(s![
            cell.min[2]..max[2],
            cell.min[1]..max[1],
            cell.min[0]..max[0]
        ]);
        for &value in block.iter() {
            out.push(value);
        }
    }
}

impl<T: Sample, V: VolumeSource<T> + ?Sized> VolumeSource<T> for Box<V> {
    fn dimensions(&self) -> Triple {
        (**self).dimensions()
    }

    fn sample(&self, position: Triple) -> T {
        (**self).sample(position)
    }

    fn copy_cell(&self, cell: &CellDescriptor, out: &mut CellBuffer) {
        (**self).copy_cell(cell, out)
    }
}

impl<T: Sample, V: VolumeSource<T> + ?Sized> VolumeSource<T> for Arc<V> {
    fn dimensions(&self) -> Triple {
        (**self).dimensions()
    }

    fn sample(&self, position: Triple) -> T {
        (**self).sample(position)
    }

    fn copy_cell(&self, cell: &CellDescriptor, out: &mut CellBuffer) {
        (**self).copy_cell(cell, out)
    }
}

/// The source of one resolution level: either the full-resolution volume
/// itself or a downsampled copy owned by the writer
pub enum LevelSource<'a, T: Sample> {
    Borrowed(&'a dyn VolumeSource<T>),
    Owned(ArrayVolume<T>),
}

impl<'a, T: Sample> LevelSource<'a, T> {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, LevelSource::Borrowed(_))
    }

    fn inner(&self) -> &dyn VolumeSource<T> {
        match self {
            LevelSource::Borrowed(source) => *source,
            LevelSource::Owned(volume) => volume,
        }
    }
}

impl<T: Sample> VolumeSource<T> for LevelSource<'_, T> {
    fn dimensions(&self) -> Triple {
        self.inner().dimensions()
    }

    fn sample(&self, position: Triple) -> T {
        self.inner().sample(position)
    }

    fn copy_cell(&self, cell: &CellDescriptor, out: &mut CellBuffer) {
        self.inner().copy_cell(cell, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::partition;

    /// Volume without a specialized `copy_cell`
    struct Ramp([usize; 3]);

    impl VolumeSource<u16> for Ramp {
        fn dimensions(&self) -> Triple {
            self.0
        }

        fn sample(&self, p: Triple) -> u16 {
            (p[0] + 10 * p[1] + 100 * p[2]) as u16
        }
    }

    #[test]
    fn test_array_volume_addressing() {
        let volume = ArrayVolume::from_fn([4, 3, 2], |[x, y, z]| (x + 10 * y + 100 * z) as u16);
        assert_eq!(volume.dimensions(), [4, 3, 2]);
        assert_eq!(volume.sample([3, 2, 1]), 123);
        assert_eq!(volume.as_array()[[1, 2, 3]], 123);
    }

    #[test]
    fn test_from_vec_is_x_fastest() {
        let volume = ArrayVolume::from_vec([2, 2, 1], vec![1u8, 2, 3, 4]).unwrap();
        assert_eq!(volume.sample([1, 0, 0]), 2);
        assert_eq!(volume.sample([0, 1, 0]), 3);
        assert!(ArrayVolume::from_vec([2, 2, 2], vec![0u8; 7]).is_err());
    }

    #[test]
    fn test_copy_cell_matches_generic_path() {
        let dims = [7, 5, 3];
        let ramp = Ramp(dims);
        let array = ArrayVolume::from_fn(dims, |p| ramp.sample(p));
        let grid = partition(dims, [3, 2, 2]).unwrap();

        for cell in &grid {
            let mut generic = CellBuffer::with_capacity::<u16>(cell.num_voxels());
            ramp.copy_cell(&cell, &mut generic);
            let mut sliced = CellBuffer::with_capacity::<u16>(cell.num_voxels());
            array.copy_cell(&cell, &mut sliced);
            assert_eq!(generic, sliced);
            assert_eq!(sliced.len(), cell.num_voxels());
        }
    }

    #[test]
    fn test_copy_cell_order() {
        let volume = ArrayVolume::from_fn([4, 4, 2], |[x, y, z]| (x + 10 * y + 100 * z) as u16);
        let grid = partition([4, 4, 2], [2, 2, 2]).unwrap();
        let cell = grid.cell([1, 1, 0]).unwrap();
        let mut out = CellBuffer::with_capacity::<u16>(8);
        volume.copy_cell(&cell, &mut out);
        assert_eq!(
            out.samples::<u16>().unwrap(),
            vec![22, 23, 32, 33, 122, 123, 132, 133]
        );
    }
}
