//! TIFF file format module
//!
//! Reading of TIFF and BigTIFF directories in either byte order, and writing
//! of little-endian single-image files.

pub mod errors;
pub mod ifd;
pub mod types;
pub mod reader;
pub mod writer;
pub mod constants;
pub(crate) mod validation;
#[cfg(test)]
pub(crate) mod tests;

pub use crate::io::byte_order::{BigEndianHandler, ByteOrder, ByteOrderHandler, LittleEndianHandler};
pub use errors::{TiffError, TiffResult};
pub use ifd::{IFD, IFDEntry};
pub use reader::TiffReader;
pub use types::TIFF;
pub use writer::{TagPayload, TiffWriter};
