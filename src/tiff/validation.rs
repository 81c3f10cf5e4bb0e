//! TIFF validation utilities
//!
//! Bounds checks applied while walking a possibly malformed file, before
//! anything is decoded from it.

use log::{debug, error, warn};

use crate::io::byte_order::ByteOrderHandler;
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::header;
use crate::tiff::errors::{TiffError, TiffResult};

/// Validates an IFD offset to ensure it's within reasonable bounds
pub fn validate_ifd_offset(offset: u64, file_size: u64) -> TiffResult<()> {
    if offset >= file_size || offset < header::TIFF_HEADER_SIZE {
        return Err(TiffError::GenericError(format!(
            "Invalid IFD offset: {} (file size: {})",
            offset, file_size
        )));
    }

    Ok(())
}

/// Validates that a data chunk lies entirely inside the file
pub fn validate_chunk(offset: u64, byte_count: u64, file_size: u64) -> TiffResult<()> {
    match offset.checked_add(byte_count) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(TiffError::GenericError(format!(
            "Chunk at offset {} with {} bytes exceeds file size {}",
            offset, byte_count, file_size
        ))),
    }
}

/// Validates a strip or tile table against the image layout
///
/// # Arguments
/// * `offsets` - StripOffsets or TileOffsets values
/// * `byte_counts` - The matching byte counts
/// * `expected` - Chunks the layout needs, across all planes
/// * `file_size` - Size of the file the table points into
pub fn validate_chunk_table(offsets: &[u64], byte_counts: &[u64], expected: usize, file_size: u64) -> TiffResult<()> {
    if offsets.len() != byte_counts.len() {
        return Err(TiffError::GenericError(format!(
            "{} chunk offsets but {} byte counts", offsets.len(), byte_counts.len()
        )));
    }
    if offsets.len() < expected {
        return Err(TiffError::GenericError(format!(
            "Expected {} chunks, file lists {}", expected, offsets.len()
        )));
    }

    let outside = offsets.iter()
        .zip(byte_counts)
        .filter(|(offset, count)| validate_chunk(**offset, **count, file_size).is_err())
        .count();
    if outside > 0 {
        // Reported per band when the chunk is actually read
        warn!("{} of {} chunks point past the end of the file", outside, offsets.len());
    }

    Ok(())
}

/// Validates the BigTIFF header
///
/// After the version number (43) BigTIFF stores the offset size, which
/// must be 8, followed by a reserved zero word.
pub fn validate_bigtiff_header(
    reader: &mut dyn SeekableReader,
    byte_order_handler: &dyn ByteOrderHandler
) -> TiffResult<()> {
    let offset_size = byte_order_handler.read_u16(reader)?;
    let zeros = byte_order_handler.read_u16(reader)?;

    debug!("BigTIFF offset size: {}, reserved: {}", offset_size, zeros);

    if offset_size != header::BIGTIFF_OFFSET_SIZE || zeros != 0 {
        error!("Invalid BigTIFF header: offset_size={}, zeros={}", offset_size, zeros);
        return Err(TiffError::InvalidBigTIFFHeader);
    }

    Ok(())
}
