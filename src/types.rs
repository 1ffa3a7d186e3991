//! Core data types: scalar type tags, the `Sample` trait and cell buffers

use crate::error::{Result, StorageError};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 3D coordinate, extent or factor triple in native (x, y, z) order
pub type Triple = [usize; 3];

/// Scalar sample types that can be stored in a pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8 = 1,
    /// Unsigned 16-bit integer
    U16 = 2,
    /// Unsigned 32-bit integer
    U32 = 3,
    /// Signed 8-bit integer
    I8 = 5,
    /// Signed 16-bit integer
    I16 = 6,
    /// Signed 32-bit integer
    I32 = 7,
    /// 32-bit floating point
    F32 = 9,
    /// 64-bit floating point
    F64 = 10,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A scalar voxel value.
///
/// Every implementation carries its `DataType` tag so that one generic writer
/// serves all sample widths.
pub trait Sample:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + ToPrimitive + FromPrimitive + 'static
{
    const DATA_TYPE: DataType;

    /// Append the little-endian encoding of this sample
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode a sample from exactly `DATA_TYPE.size_in_bytes()` bytes
    fn read_le(bytes: &[u8]) -> Self;

    /// Convert a block mean back into a sample, rounding integer types to nearest
    fn from_mean(mean: f64) -> Self {
        let value = if Self::DATA_TYPE.is_float() {
            mean
        } else {
            mean.round()
        };
        Self::from_f64(value).unwrap_or_default()
    }
}

macro_rules! impl_sample {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const DATA_TYPE: DataType = DataType::$tag;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_sample!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    f32 => F32,
    f64 => F64,
);

/// A dense cell payload: little-endian samples tagged with their type
#[derive(Debug, Clone, PartialEq)]
pub struct CellBuffer {
    data_type: DataType,
    bytes: Vec<u8>,
}

impl CellBuffer {
    /// Allocate an empty buffer with room for `num_samples` samples of `T`
    pub fn with_capacity<T: Sample>(num_samples: usize) -> Self {
        Self {
            data_type: T::DATA_TYPE,
            bytes: Vec::with_capacity(num_samples * T::DATA_TYPE.size_in_bytes()),
        }
    }

    /// Encode a slice of samples
    pub fn from_samples<T: Sample>(samples: &[T]) -> Self {
        let mut buffer = Self::with_capacity::<T>(samples.len());
        for &s in samples {
            buffer.push(s);
        }
        buffer
    }

    /// Wrap raw little-endian bytes
    pub fn from_bytes(data_type: DataType, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() % data_type.size_in_bytes() != 0 {
            return Err(StorageError::InvalidFormat(format!(
                "{} bytes is not a whole number of {} samples",
                bytes.len(),
                data_type
            )));
        }
        Ok(Self { data_type, bytes })
    }

    /// Append one sample; the sample type must match the buffer's tag
    pub fn push<T: Sample>(&mut self, sample: T) {
        debug_assert_eq!(T::DATA_TYPE, self.data_type);
        sample.write_le(&mut self.bytes);
    }

    /// Sample type of the buffered values
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.bytes.len() / self.data_type.size_in_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw little-endian sample bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the raw sample bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decode the samples as `T`, failing if the tag does not match
    pub fn samples<T: Sample>(&self) -> Result<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return Err(StorageError::DataTypeMismatch {
                expected: T::DATA_TYPE,
                found: self.data_type,
            });
        }
        Ok(self
            .bytes
            .chunks_exact(self.data_type.size_in_bytes())
            .map(T::read_le)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::U8.size_in_bytes(), 1);
        assert_eq!(DataType::U16.size_in_bytes(), 2);
        assert_eq!(DataType::F32.size_in_bytes(), 4);
        assert_eq!(DataType::F64.size_in_bytes(), 8);
        assert!(DataType::F32.is_float());
        assert!(!DataType::I16.is_float());
    }

    #[test]
    fn test_sample_tags() {
        assert_eq!(<u16 as Sample>::DATA_TYPE, DataType::U16);
        assert_eq!(<f64 as Sample>::DATA_TYPE, DataType::F64);
    }

    #[test]
    fn test_from_mean_rounds_integers() {
        assert_eq!(u16::from_mean(2.5), 3);
        assert_eq!(u16::from_mean(2.49), 2);
        assert_eq!(i8::from_mean(-1.5), -2);
        assert_eq!(f32::from_mean(2.5), 2.5);
    }

    #[test]
    fn test_cell_buffer_samples() {
        let buffer = CellBuffer::from_samples(&[1u16, 500, 65535]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.as_bytes(), &[1, 0, 244, 1, 255, 255]);
        assert_eq!(buffer.samples::<u16>().unwrap(), vec![1, 500, 65535]);
        assert!(matches!(
            buffer.samples::<u8>(),
            Err(StorageError::DataTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_cell_buffer_from_misaligned_bytes() {
        assert!(CellBuffer::from_bytes(DataType::U32, vec![0; 6]).is_err());
        assert_eq!(
            CellBuffer::from_bytes(DataType::U32, vec![0; 8])
                .unwrap()
                .len(),
            2
        );
    }
}
