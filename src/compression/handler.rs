//! Codec trait shared by band decoding and the single-band writer

use crate::tiff::errors::TiffResult;

/// One TIFF compression scheme
pub trait CompressionHandler: Send + Sync {
    /// Decodes one strip or tile
    ///
    /// # Arguments
    /// * `data` - The chunk as stored in the file
    /// * `limit` - Bytes the pixel layout needs; output never exceeds this
    ///
    /// # Returns
    /// Up to `limit` decoded bytes. Fewer means the chunk was short.
    fn decompress(&self, data: &[u8], limit: usize) -> TiffResult<Vec<u8>>;

    /// Encodes one strip
    fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>>;

    fn name(&self) -> &'static str;

    /// Value written to the Compression tag
    fn code(&self) -> u16;
}
