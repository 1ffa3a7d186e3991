//! Compression of cell payloads

use crate::error::{Result, StorageError};
use crate::types::DataType;
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;

/// Compression methods for stored cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// Deflate/ZIP compression
    Deflate = 1,
    /// Run-length encoding of whole samples
    RLE = 2,
    /// Zstandard compression
    Zstd = 3,
}

impl CompressionMethod {
    /// Get the method from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Deflate),
            2 => Some(CompressionMethod::RLE),
            3 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

impl FromStr for CompressionMethod {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(CompressionMethod::None),
            "deflate" | "zip" => Ok(CompressionMethod::Deflate),
            "rle" => Ok(CompressionMethod::RLE),
            "zstd" => Ok(CompressionMethod::Zstd),
            other => Err(StorageError::Compression(format!(
                "unknown compression method '{}'",
                other
            ))),
        }
    }
}

/// Compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

/// Trait for compression/decompression of cell payloads
pub trait Compressor: Send + Sync {
    /// Compress data
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>>;

    /// Get the compression method
    fn method(&self) -> CompressionMethod;
}

/// No compression
#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _expected_size: Option<usize>) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

/// Deflate compression
#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(data, FlateCompression::new(level.value() as u32));
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| StorageError::Compression(e.to_string()))?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut decompressed = Vec::with_capacity(expected_size.unwrap_or(0));
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| StorageError::Decompression(e.to_string()))?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

/// Zstandard compression
#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::encode_all(data, level.value() as i32)
            .map_err(|e| StorageError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], _expected_size: Option<usize>) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| StorageError::Decompression(e.to_string()))
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// Run-length encoding over whole samples.
///
/// Runs are encoded as a count byte followed by one sample, so a 16-bit
/// background region compresses regardless of its byte pattern.
#[derive(Debug)]
pub struct RLECompressor {
    sample_width: usize,
}

impl RLECompressor {
    pub fn new(data_type: DataType) -> Self {
        Self {
            sample_width: data_type.size_in_bytes(),
        }
    }

    fn compress_internal(&self, data: &[u8]) -> Result<Vec<u8>> {
        let width = self.sample_width;
        if data.len() % width != 0 {
            return Err(StorageError::Compression(format!(
                "RLE input of {} bytes is not a multiple of the {}-byte sample width",
                data.len(),
                width
            )));
        }

        let samples: Vec<&[u8]> = data.chunks_exact(width).collect();
        let mut compressed = Vec::new();
        let mut i = 0;

        while i < samples.len() {
            let sample = samples[i];
            let mut count = 1usize;

            while i + count < samples.len() && samples[i + count] == sample && count < 255 {
                count += 1;
            }

            compressed.push(count as u8);
            compressed.extend_from_slice(sample);

            i += count;
        }

        Ok(compressed)
    }

    fn decompress_internal(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let record = self.sample_width + 1;
        if data.len() % record != 0 {
            return Err(StorageError::Decompression(format!(
                "RLE data must consist of {}-byte records",
                record
            )));
        }

        let mut decompressed = Vec::with_capacity(expected_size.unwrap_or(0));

        for chunk in data.chunks_exact(record) {
            let count = chunk[0] as usize;
            if count == 0 {
                return Err(StorageError::Decompression(
                    "RLE run of length zero".to_string(),
                ));
            }
            for _ in 0..count {
                decompressed.extend_from_slice(&chunk[1..]);
            }
        }

        Ok(decompressed)
    }
}

impl Compressor for RLECompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        self.compress_internal(data)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        self.decompress_internal(data, expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::RLE
    }
}

/// Get a compressor for cells of `data_type`
pub fn get_compressor(method: CompressionMethod, data_type: DataType) -> Box<dyn Compressor> {
    match method {
        CompressionMethod::None => Box::new(NoneCompressor),
        CompressionMethod::Deflate => Box::new(DeflateCompressor),
        CompressionMethod::RLE => Box::new(RLECompressor::new(data_type)),
        CompressionMethod::Zstd => Box::new(ZstdCompressor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CellBuffer;

    fn background_cell() -> Vec<u8> {
        let mut samples = vec![100u16; 500];
        samples.extend(vec![1200u16; 500]);
        CellBuffer::from_samples(&samples).into_bytes()
    }

    #[test]
    fn test_deflate() {
        let compressor = DeflateCompressor;
        let data = background_cell();
        let compressed = compressor
            .compress(&data, CompressionLevel::default())
            .unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = compressor
            .decompress(&compressed, Some(data.len()))
            .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_zstd() {
        let compressor = ZstdCompressor;
        let data = background_cell();
        let compressed = compressor.compress(&data, CompressionLevel::fast()).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(compressor.decompress(&compressed, None).unwrap(), data);
    }

    #[test]
    fn test_rle_runs_whole_samples() {
        let compressor = RLECompressor::new(DataType::U16);
        // Alternating bytes, so only sample-wise runs collapse
        let data = CellBuffer::from_samples(&[0x0102u16; 10]).into_bytes();
        let compressed = compressor.compress(&data, CompressionLevel::default()).unwrap();
        assert_eq!(compressed, vec![10, 0x02, 0x01]);
        assert_eq!(compressor.decompress(&compressed, None).unwrap(), data);
    }

    #[test]
    fn test_rle_long_and_mixed_runs() {
        let compressor = RLECompressor::new(DataType::U16);
        let data = background_cell();
        let compressed = compressor.compress(&data, CompressionLevel::default()).unwrap();
        // 500 = 255 + 245 for each value
        assert_eq!(compressed.len(), 4 * 3);
        assert_eq!(compressor.decompress(&compressed, None).unwrap(), data);
    }

    #[test]
    fn test_rle_rejects_malformed() {
        let compressor = RLECompressor::new(DataType::U16);
        assert!(compressor.compress(&[1, 2, 3], CompressionLevel::default()).is_err());
        assert!(compressor.decompress(&[1, 2], None).is_err());
        assert!(compressor.decompress(&[0, 2, 3], None).is_err());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("zstd".parse::<CompressionMethod>().unwrap(), CompressionMethod::Zstd);
        assert_eq!("RAW".parse::<CompressionMethod>().unwrap(), CompressionMethod::None);
        assert!("lz4".parse::<CompressionMethod>().is_err());
        assert_eq!(CompressionMethod::from_u8(2), Some(CompressionMethod::RLE));
        assert_eq!(
            get_compressor(CompressionMethod::RLE, DataType::U8).method(),
            CompressionMethod::RLE
        );
    }
}
