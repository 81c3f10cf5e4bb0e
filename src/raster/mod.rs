//! Raster layer on top of the TIFF container
//!
//! A [`RasterDataset`] opens a multi-band GeoTIFF, exposes its
//! [`RasterProfile`] and decodes one band at a time into little-endian
//! samples; [`write_single_band`] turns such a band back into a file.

pub mod profile;
pub mod dataset;
pub mod band_writer;

pub use profile::RasterProfile;
pub use dataset::RasterDataset;
pub use band_writer::write_single_band;
