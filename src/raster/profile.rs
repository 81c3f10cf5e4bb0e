//! Raster profile: everything about a raster except its pixels

use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use crate::io::byte_order::LittleEndianHandler;
use crate::io::seekable::SeekableReader;
use crate::io::byte_order::ByteOrderHandler;
use crate::tiff::constants::{compression, photometric, planar_config, predictor, sample_format, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;
use crate::tiff::reader::TiffReader;
use crate::tiff::writer::TagPayload;

/// Tags that georeference a raster and are carried into every band output
pub const GEO_TAGS: [u16; 8] = [
    tags::MODEL_PIXEL_SCALE_TAG,
    tags::MODEL_TIEPOINT_TAG,
    tags::MODEL_TRANSFORMATION_TAG,
    tags::GEO_KEY_DIRECTORY_TAG,
    tags::GEO_DOUBLE_PARAMS_TAG,
    tags::GEO_ASCII_PARAMS_TAG,
    tags::GDAL_NODATA,
    tags::GDAL_METADATA,
];

/// GeoKey holding the EPSG code of a projected CRS
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
/// GeoKey holding the EPSG code of a geographic CRS
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;

/// Geospatial and encoding metadata of a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterProfile {
    pub width: u32,
    pub height: u32,
    pub band_count: usize,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub photometric: u16,
    pub planar_config: u16,
    pub predictor: u16,
    /// Whether the source was a BigTIFF
    pub is_big_tiff: bool,
    /// Georeferencing tags as little-endian payloads, keyed by tag
    pub geo_tags: BTreeMap<u16, TagPayload>,
}

impl RasterProfile {
    /// Reads the profile of the image described by `ifd`
    ///
    /// # Arguments
    /// * `reader` - Reader that parsed the file, for its byte order
    /// * `source` - The file itself, for out-of-line tag values
    /// * `ifd` - Directory of the image
    ///
    /// # Returns
    /// The profile, or an error when the image is not a plain
    /// uniformly-sampled raster
    pub fn from_ifd(reader: &TiffReader, source: &mut dyn SeekableReader, ifd: &IFD) -> TiffResult<Self> {
        let (width, height) = ifd.get_dimensions().ok_or(TiffError::MissingDimensions)?;
        let band_count = ifd.get_samples_per_pixel() as usize;

        let bits = Self::uniform(reader, source, ifd, tags::BITS_PER_SAMPLE, 1)?;
        let format = Self::uniform(reader, source, ifd, tags::SAMPLE_FORMAT, sample_format::UNSIGNED as u64)?;

        let mut geo_tags = BTreeMap::new();
        for tag in GEO_TAGS {
            if let Some(entry) = ifd.get_entry(tag) {
                let bytes = reader.read_entry_bytes_le(source, entry)?;
                geo_tags.insert(tag, TagPayload::raw(entry.field_type, entry.count, bytes));
            }
        }
        debug!("Carrying {} georeferencing tags", geo_tags.len());

        Ok(RasterProfile {
            width: width as u32,
            height: height as u32,
            band_count,
            bits_per_sample: bits as u16,
            sample_format: format as u16,
            compression: ifd.get_tag_value(tags::COMPRESSION).unwrap_or(compression::NONE as u64) as u16,
            photometric: ifd.get_tag_value(tags::PHOTOMETRIC_INTERPRETATION)
                .unwrap_or(photometric::BLACK_IS_ZERO as u64) as u16,
            planar_config: ifd.get_tag_value(tags::PLANAR_CONFIGURATION)
                .unwrap_or(planar_config::CHUNKY as u64) as u16,
            predictor: ifd.get_tag_value(tags::PREDICTOR).unwrap_or(predictor::NONE as u64) as u16,
            is_big_tiff: reader.is_big_tiff(),
            geo_tags,
        })
    }

    /// A tag with one value per sample that must be the same for all samples
    fn uniform(reader: &TiffReader, source: &mut dyn SeekableReader, ifd: &IFD, tag: u16, default: u64) -> TiffResult<u64> {
        if !ifd.has_tag(tag) {
            return Ok(default);
        }
        let values = reader.read_tag_values(source, ifd, tag)?;
        let first = values.first().copied().unwrap_or(default);
        if values.iter().any(|&v| v != first) {
            return Err(TiffError::GenericError(format!(
                "Mixed per-sample values for tag {}: {:?}", tag, values
            )));
        }
        Ok(first)
    }

    /// Profile of a one-band copy of this raster
    ///
    /// Dimensions, sample type, compression and georeferencing stay the same.
    pub fn single_band(&self) -> Self {
        RasterProfile {
            band_count: 1,
            photometric: photometric::BLACK_IS_ZERO,
            planar_config: planar_config::CHUNKY,
            predictor: predictor::NONE,
            ..self.clone()
        }
    }

    /// Size of one sample in bytes
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Size in bytes of one decoded band
    pub fn band_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_sample()
    }

    /// Sample type name in the usual raster vocabulary
    pub fn dtype(&self) -> String {
        let prefix = match self.sample_format {
            sample_format::SIGNED => "int",
            sample_format::IEEEFP => "float",
            _ => "uint",
        };
        format!("{}{}", prefix, self.bits_per_sample)
    }

    /// Affine transform `[a, b, c, d, e, f]` mapping pixel to model space
    ///
    /// Taken from ModelTransformation when present, else from the pixel
    /// scale and the first tie point.
    pub fn geo_transform(&self) -> Option<[f64; 6]> {
        if let Some(matrix) = self.doubles(tags::MODEL_TRANSFORMATION_TAG) {
            if matrix.len() >= 8 {
                return Some([matrix[0], matrix[1], matrix[3], matrix[4], matrix[5], matrix[7]]);
            }
        }

        let scale = self.doubles(tags::MODEL_PIXEL_SCALE_TAG)?;
        let tiepoint = self.doubles(tags::MODEL_TIEPOINT_TAG)?;
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        Some([scale[0], 0.0, origin_x, 0.0, -scale[1], origin_y])
    }

    /// EPSG code from the GeoKey directory, if the CRS is given as one
    pub fn epsg(&self) -> Option<u16> {
        let keys = self.shorts(tags::GEO_KEY_DIRECTORY_TAG)?;
        // Header is four shorts; each key is four more
        let key_count = *keys.get(3)? as usize;
        keys.get(4..4 + key_count * 4)?
            .chunks_exact(4)
            .find(|key| {
                (key[0] == PROJECTED_CS_TYPE_KEY || key[0] == GEOGRAPHIC_TYPE_KEY) && key[1] == 0
            })
            .map(|key| key[3])
    }

    fn doubles(&self, tag: u16) -> Option<Vec<f64>> {
        let payload = self.geo_tags.get(&tag)?;
        let mut cursor = Cursor::new(&payload.bytes[..]);
        (0..payload.count)
            .map(|_| LittleEndianHandler.read_f64(&mut cursor).ok())
            .collect()
    }

    fn shorts(&self, tag: u16) -> Option<Vec<u16>> {
        let payload = self.geo_tags.get(&tag)?;
        let mut cursor = Cursor::new(&payload.bytes[..]);
        (0..payload.count)
            .map(|_| LittleEndianHandler.read_u16(&mut cursor).ok())
            .collect()
    }
}

impl fmt::Display for RasterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Raster profile:")?;
        writeln!(f, "  Size: {}x{}", self.width, self.height)?;
        writeln!(f, "  Bands: {}", self.band_count)?;
        writeln!(f, "  Data type: {}", self.dtype())?;
        writeln!(f, "  Compression: {}", self.compression)?;
        writeln!(f, "  Planar configuration: {}", self.planar_config)?;
        writeln!(f, "  Format: {}", if self.is_big_tiff { "BigTIFF" } else { "TIFF" })?;
        match self.geo_transform() {
            Some(t) => writeln!(f, "  Transform: [{}, {}, {}, {}, {}, {}]", t[0], t[1], t[2], t[3], t[4], t[5])?,
            None => writeln!(f, "  Transform: none")?,
        }
        match self.epsg() {
            Some(code) => writeln!(f, "  CRS: EPSG:{}", code)?,
            None => writeln!(f, "  CRS: unknown")?,
        }
        Ok(())
    }
}
