//! Compression algorithms available for file-buffer records.

use std::fmt;

/// The compression algorithm recorded in a record's frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
    Snappy,
    Zstd,
}

impl Compression {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Lz4),
            2 => Some(Compression::Snappy),
            3 => Some(Compression::Zstd),
            _ => None,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Snappy => 2,
            Compression::Zstd => 3,
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => Ok(lz4_flex::block::compress(data)),
            Compression::Snappy => {
                let mut encoder = snap::raw::Encoder::new();
                encoder.compress_vec(data).map_err(|e| CompressionError(e.to_string()))
            }
            Compression::Zstd => {
                zstd::bulk::compress(data, 0).map_err(|e| CompressionError(e.to_string()))
            }
        }
    }

    pub fn decompress(&self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => lz4_flex::block::decompress(data, uncompressed_size)
                .map_err(|e| CompressionError(e.to_string())),
            Compression::Snappy => {
                let mut decoder = snap::raw::Decoder::new();
                decoder.decompress_vec(data).map_err(|e| CompressionError(e.to_string()))
            }
            Compression::Zstd => zstd::bulk::decompress(data, uncompressed_size)
                .map_err(|e| CompressionError(e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompressionError(pub String);

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compression error: {}", self.0)
    }
}

impl std::error::Error for CompressionError {}

/// Minimum uncompressed payload size before compression is even attempted (§4.4).
pub const COMPRESSION_MIN_SIZE: usize = 1024;

/// Apply the write-time compression policy: only use the compressed form if it is
/// strictly smaller than the uncompressed encoding, and only attempt compression at all
/// once the payload clears [`COMPRESSION_MIN_SIZE`].
pub fn compress_for_write(
    algorithm: Option<Compression>,
    uncompressed: &[u8],
) -> Result<(Compression, Vec<u8>), CompressionError> {
    let Some(algo) = algorithm else {
        return Ok((Compression::None, uncompressed.to_vec()));
    };
    if uncompressed.len() <= COMPRESSION_MIN_SIZE {
        return Ok((Compression::None, uncompressed.to_vec()));
    }
    let compressed = algo.compress(uncompressed)?;
    if compressed.len() < uncompressed.len() {
        Ok((algo, compressed))
    } else {
        Ok((Compression::None, uncompressed.to_vec()))
    }
}
