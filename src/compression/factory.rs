//! Factory for creating compression handlers

use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;
use super::uncompressed::UncompressedHandler;
use super::deflate::DeflateHandler;
use super::lzw::LzwHandler;
use super::zstd::ZstdHandler;

/// Factory for creating compression handlers
pub struct CompressionFactory;

impl CompressionFactory {
    /// Create a compression handler for the given compression code
    ///
    /// # Arguments
    /// * `code` - Value of the Compression tag
    ///
    /// # Returns
    /// The handler, or `UnsupportedCompression` for codes this crate cannot decode
    pub fn create_handler(code: u64) -> TiffResult<Box<dyn CompressionHandler>> {
        let code16 = u16::try_from(code).map_err(|_| TiffError::UnsupportedCompression(code))?;
        match code16 {
            compression::NONE => Ok(Box::new(UncompressedHandler)),
            compression::LZW => Ok(Box::new(LzwHandler::new())),
            compression::DEFLATE | compression::DEFLATE_LEGACY => Ok(Box::new(DeflateHandler::with_code(code16))),
            compression::ZSTD => Ok(Box::new(ZstdHandler::new())),
            _ => Err(TiffError::UnsupportedCompression(code)),
        }
    }

    /// Handler used when writing a single-band copy
    ///
    /// Keeps the source compression when it can be re-encoded, else writes
    /// uncompressed. The legacy deflate code is normalised to the Adobe one.
    pub fn create_writer_handler(source_code: u64) -> Box<dyn CompressionHandler> {
        match Self::create_handler(source_code) {
            Ok(handler) if handler.code() == compression::DEFLATE_LEGACY => Box::new(DeflateHandler::new()),
            Ok(handler) => handler,
            Err(_) => Box::new(UncompressedHandler),
        }
    }

    /// Whether a compression code can be decoded
    pub fn is_supported(code: u64) -> bool {
        Self::create_handler(code).is_ok()
    }
}
