//! Deflate (zlib) chunks, Adobe code 8 and legacy code 32946

use std::io::{Read, Write};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;

/// Deflate compression handler
///
/// Serves both the Adobe code (8) and the legacy code (32946); the stream
/// format is the same, only the tag value differs.
pub struct DeflateHandler {
    code: u16,
}

impl DeflateHandler {
    /// Handler writing the Adobe Deflate code
    pub fn new() -> Self {
        DeflateHandler { code: compression::DEFLATE }
    }

    /// Handler that reports the given deflate code
    pub fn with_code(code: u16) -> Self {
        DeflateHandler { code }
    }
}

impl Default for DeflateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionHandler for DeflateHandler {
    fn decompress(&self, data: &[u8], limit: usize) -> TiffResult<Vec<u8>> {
        let mut decoded = Vec::with_capacity(limit);
        ZlibDecoder::new(data)
            .take(limit as u64)
            .read_to_end(&mut decoded)
            .map_err(TiffError::IoError)?;
        Ok(decoded)
    }

    fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(TiffError::IoError)?;
        encoder.finish().map_err(TiffError::IoError)
    }

    fn name(&self) -> &'static str {
        if self.code == compression::DEFLATE_LEGACY {
            "Deflate (legacy)"
        } else {
            "Adobe Deflate"
        }
    }

    fn code(&self) -> u16 {
        self.code
    }
}
