//! Box-filter downsampling by independent integer factors per axis

use crate::types::{Sample, Triple};
use crate::volume::{ArrayVolume, LevelSource, VolumeSource};
use ndarray::Array3;

/// Dimensions after reducing `dimensions` by `factor` (remainders truncated)
pub fn downsampled_dimensions(dimensions: Triple, factor: Triple) -> Triple {
    [
        dimensions[0] / factor[0].max(1),
        dimensions[1] / factor[1].max(1),
        dimensions[2] / factor[2].max(1),
    ]
}

/// Whether `factor` leaves the volume untouched
pub fn is_identity(factor: Triple) -> bool {
    factor == [1, 1, 1]
}

/// Reduce `source` by `factor`.
///
/// Each output voxel is the mean of its `fx * fy * fz` input block, rounded to
/// nearest for integer types. Voxels beyond the last whole block are ignored.
/// The result does not depend on the order of values within a block.
pub fn downsample<T: Sample>(source: &dyn VolumeSource<T>, factor: Triple) -> ArrayVolume<T> {
    let factor = factor.map(|f| f.max(1));
    let dimensions = downsampled_dimensions(source.dimensions(), factor);
    if T::DATA_TYPE.is_float() {
        sorted_block_means(source, factor, dimensions)
    } else {
        summed_block_means(source, factor, dimensions)
    }
}

/// Integer samples sum exactly in `f64`, so the input is read once in storage
/// order while block sums accumulate in an output-sized buffer.
fn summed_block_means<T: Sample>(
    source: &dyn VolumeSource<T>,
    factor: Triple,
    [ox, oy, oz]: Triple,
) -> ArrayVolume<T> {
    let mut sums = Array3::<f64>::zeros((oz, oy, ox));

    for z in 0..oz * factor[2] {
        for y in 0..oy * factor[1] {
            for x in 0..ox * factor[0] {
                let value = source.sample([x, y, z]).to_f64().unwrap_or(0.0);
                sums[[z / factor[2], y / factor[1], x / factor[0]]] += value;
            }
        }
    }

    let block = (factor[0] * factor[1] * factor[2]) as f64;
    let mut output = ArrayVolume::zeros([ox, oy, oz]);
    output
        .as_array_mut()
        .zip_mut_with(&sums, |out, &sum| *out = T::from_mean(sum / block));
    output
}

/// Float addition is not associative: each block is gathered and summed in
/// `total_cmp` order.
fn sorted_block_means<T: Sample>(
    source: &dyn VolumeSource<T>,
    factor: Triple,
    dimensions: Triple,
) -> ArrayVolume<T> {
    let [fx, fy, fz] = factor;
    let block_len = fx * fy * fz;
    let mut block = Vec::with_capacity(block_len);

    ArrayVolume::from_fn(dimensions, |[bx, by, bz]| {
        block.clear();
        for z in bz * fz..(bz + 1) * fz {
            for y in by * fy..(by + 1) * fy {
                for x in bx * fx..(bx + 1) * fx {
                    block.push(source.sample([x, y, z]).to_f64().unwrap_or(0.0));
                }
            }
        }
        block.sort_by(f64::total_cmp);
        let sum: f64 = block.iter().sum();
        T::from_mean(sum / block_len as f64)
    })
}

/// Source for one pyramid level; a `(1, 1, 1)` factor borrows `source` without copying
pub fn level_source<T: Sample>(source: &dyn VolumeSource<T>, factor: Triple) -> LevelSource<'_, T> {
    if is_identity(factor) {
        LevelSource::Borrowed(source)
    } else {
        LevelSource::Owned(downsample(source, factor))
    }
}
