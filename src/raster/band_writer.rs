//! Writes one decoded band as its own GeoTIFF

use log::debug;
use std::path::Path;

use crate::compression::CompressionFactory;
use crate::raster::profile::RasterProfile;
use crate::tiff::constants::{planar_config, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::writer::{TagPayload, TiffWriter};

/// Target size of one uncompressed strip
const STRIP_TARGET_BYTES: usize = 64 * 1024;

/// Writes a single-band raster
///
/// # Arguments
/// * `output_path` - File to create (overwritten if present)
/// * `profile` - Profile of the output; must describe exactly one band
/// * `data` - The band's samples, row-major and little-endian
///
/// # Returns
/// Number of bytes written
pub fn write_single_band(output_path: &Path, profile: &RasterProfile, data: &[u8]) -> TiffResult<u64> {
    if profile.band_count != 1 {
        return Err(TiffError::GenericError(format!(
            "Single-band writer given a profile with {} bands", profile.band_count
        )));
    }
    if data.len() != profile.band_size() {
        return Err(TiffError::TruncatedData { expected: profile.band_size(), actual: data.len() });
    }

    let row_bytes = (profile.width as usize * profile.bytes_per_sample()).max(1);
    let rows_per_strip = (STRIP_TARGET_BYTES / row_bytes).clamp(1, profile.height.max(1) as usize);
    let codec = CompressionFactory::create_writer_handler(profile.compression as u64);

    let strips = data
        .chunks(rows_per_strip * row_bytes)
        .map(|strip| codec.compress(strip))
        .collect::<TiffResult<Vec<_>>>()?;
    debug!("Encoded {} strips of {} rows with {}", strips.len(), rows_per_strip, codec.name());

    let mut writer = TiffWriter::new(profile.is_big_tiff);
    writer.set_tag(tags::IMAGE_WIDTH, TagPayload::longs(&[profile.width]));
    writer.set_tag(tags::IMAGE_LENGTH, TagPayload::longs(&[profile.height]));
    writer.set_tag(tags::BITS_PER_SAMPLE, TagPayload::shorts(&[profile.bits_per_sample]));
    writer.set_tag(tags::COMPRESSION, TagPayload::shorts(&[codec.code()]));
    writer.set_tag(tags::PHOTOMETRIC_INTERPRETATION, TagPayload::shorts(&[profile.photometric]));
    writer.set_tag(tags::SAMPLES_PER_PIXEL, TagPayload::shorts(&[1]));
    writer.set_tag(tags::PLANAR_CONFIGURATION, TagPayload::shorts(&[planar_config::CHUNKY]));
    writer.set_tag(tags::SAMPLE_FORMAT, TagPayload::shorts(&[profile.sample_format]));
    for (tag, payload) in &profile.geo_tags {
        writer.set_tag(*tag, payload.clone());
    }
    writer.set_strips(rows_per_strip as u32, strips);

    writer.write(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::raster::dataset::RasterDataset;
    use crate::tiff::tests::test_utils::{band_u16_le, base_tags, chunky_u16, geo_tags, FixtureBuilder, Value};

    fn source(compression: u16) -> tempfile::NamedTempFile {
        let codec = CompressionFactory::create_handler(compression as u64).unwrap();
        let bytes = geo_tags(base_tags(FixtureBuilder::new(true), 6, 5, 3, 1))
            .tag(tags::COMPRESSION, Value::Shorts(vec![compression]))
            .strips(vec![codec.compress(&chunky_u16(6, 5, 3, true)).unwrap()])
            .build();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    #[test]
    fn band_round_trips_with_profile() {
        for compression in [1u16, 5, 8, 14, 32946] {
            let src = source(compression);
            let mut dataset = RasterDataset::open(src.path()).unwrap();
            let profile = dataset.profile().single_band();
            let band = dataset.read_band(2).unwrap();

            let out = tempfile::NamedTempFile::new().unwrap();
            write_single_band(out.path(), &profile, &band).unwrap();

            let mut written = RasterDataset::open(out.path()).unwrap();
            assert_eq!(written.band_count(), 1);
            assert_eq!(written.read_band(1).unwrap(), band_u16_le(6, 5, 1));

            let out_profile = written.profile();
            assert_eq!(out_profile.geo_transform(), dataset.profile().geo_transform());
            assert_eq!(out_profile.epsg(), Some(32633));
            assert_eq!(out_profile.dtype(), "uint16");
            assert_eq!((out_profile.width, out_profile.height), (6, 5));
        }
    }

    #[test]
    fn lzw_source_is_copied_as_lzw() {
        let src = source(5);
        let mut dataset = RasterDataset::open(src.path()).unwrap();
        let band = dataset.read_band(3).unwrap();
        assert_eq!(band, band_u16_le(6, 5, 3));

        let out = tempfile::NamedTempFile::new().unwrap();
        write_single_band(out.path(), &dataset.profile().single_band(), &band).unwrap();
        let mut written = RasterDataset::open(out.path()).unwrap();
        assert_eq!(written.profile().compression, 5);
        assert_eq!(written.read_band(1).unwrap(), band);
    }

    #[test]
    fn legacy_deflate_is_written_as_adobe_deflate() {
        let src = source(32946);
        let mut dataset = RasterDataset::open(src.path()).unwrap();
        let band = dataset.read_band(1).unwrap();

        let out = tempfile::NamedTempFile::new().unwrap();
        write_single_band(out.path(), &dataset.profile().single_band(), &band).unwrap();
        assert_eq!(RasterDataset::open(out.path()).unwrap().profile().compression, 8);
    }

    #[test]
    fn rejects_multi_band_profiles_and_short_data() {
        let src = source(1);
        let dataset = RasterDataset::open(src.path()).unwrap();
        let out = tempfile::NamedTempFile::new().unwrap();

        assert!(write_single_band(out.path(), dataset.profile(), &[0u8; 60]).is_err());
        assert!(matches!(
            write_single_band(out.path(), &dataset.profile().single_band(), &[0u8; 10]),
            Err(TiffError::TruncatedData { expected: 60, actual: 10 })
        ));
    }
}
