//! I/O utilities for raster file handling
//!
//! Byte-order strategies for decoding TIFF structures and the seekable
//! reader trait every decoder in the crate reads through.

pub mod seekable;
pub mod byte_order;
