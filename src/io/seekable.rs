//! Seekable reader trait
//!
//! Raster decoding jumps around the file (IFDs, tag payloads, strips),
//! so every reader used by the decoders must support both reading and seeking.

use std::io::{Read, Seek, SeekFrom};

/// Trait for readers that can both read and seek
pub trait SeekableReader: Read + Seek + Send + Sync {
    /// Total length of the underlying stream, restoring the current position
    fn total_len(&mut self) -> std::io::Result<u64> {
        let position = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(position))?;
        Ok(len)
    }
}

// Blanket implementation for any type that implements the required traits
impl<T: Read + Seek + Send + Sync> SeekableReader for T {}
