//! Zstandard chunks (compression code 14)

use std::io::Read;
use log::{trace, warn};

use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;

/// Level used for band copies
const WRITE_LEVEL: i32 = 3;

/// Zstandard codec
#[derive(Default)]
pub struct ZstdHandler;

impl ZstdHandler {
    pub fn new() -> Self {
        ZstdHandler
    }
}

impl CompressionHandler for ZstdHandler {
    fn decompress(&self, data: &[u8], limit: usize) -> TiffResult<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let decoder = zstd::stream::read::Decoder::new(data)?;
        let mut decoded = Vec::with_capacity(limit);
        decoder.take(limit as u64).read_to_end(&mut decoded).map_err(|e| {
            warn!("ZSTD decompression error: {}", e);
            TiffError::GenericError(format!("ZSTD decompression error: {}", e))
        })?;
        Ok(decoded)
    }

    fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        trace!("ZSTD compressing {} bytes at level {}", data.len(), WRITE_LEVEL);
        zstd::encode_all(data, WRITE_LEVEL)
            .map_err(|e| TiffError::GenericError(format!("ZSTD compression error: {}", e)))
    }

    fn name(&self) -> &'static str {
        "ZSTD"
    }

    fn code(&self) -> u16 {
        compression::ZSTD
    }
}
