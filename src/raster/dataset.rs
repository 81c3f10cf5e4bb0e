//! Band-by-band access to a multi-band raster file

use log::{debug, info, trace};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::compression::CompressionFactory;
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{planar_config, predictor, sample_format, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::IFD;
use crate::tiff::reader::TiffReader;
use crate::tiff::validation;
use crate::raster::profile::RasterProfile;

/// Where the pixel chunks (strips or tiles) of the image are
#[derive(Debug, Clone)]
struct ChunkLayout {
    tiled: bool,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    chunks_down: usize,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl ChunkLayout {
    fn read(reader: &TiffReader, source: &mut dyn SeekableReader, ifd: &IFD, profile: &RasterProfile) -> TiffResult<Self> {
        let width = profile.width as usize;
        let height = profile.height as usize;

        let (tiled, chunk_width, chunk_height, offsets_tag, counts_tag) = if ifd.is_tiled() {
            let tile_width = ifd.get_tag_value(tags::TILE_WIDTH).unwrap_or(0) as usize;
            let tile_height = ifd.get_tag_value(tags::TILE_LENGTH).unwrap_or(0) as usize;
            (true, tile_width, tile_height, tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
        } else {
            let rows = ifd.get_tag_value(tags::ROWS_PER_STRIP)
                .map(|rows| (rows as usize).min(height))
                .unwrap_or(height);
            (false, width, rows, tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };

        if chunk_width == 0 || chunk_height == 0 {
            return Err(TiffError::GenericError("Zero-sized strip or tile".to_string()));
        }

        let offsets = reader.read_tag_values(source, ifd, offsets_tag)?;
        let byte_counts = reader.read_tag_values(source, ifd, counts_tag)?;

        Ok(ChunkLayout {
            tiled,
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            chunks_down: height.div_ceil(chunk_height),
            offsets,
            byte_counts,
        })
    }

    fn chunks_per_plane(&self) -> usize {
        self.chunks_across * self.chunks_down
    }
}

/// An open raster file
pub struct RasterDataset {
    path: PathBuf,
    reader: TiffReader,
    source: BufReader<File>,
    profile: RasterProfile,
    layout: ChunkLayout,
}

impl RasterDataset {
    /// Opens the first full-resolution image of a TIFF file
    ///
    /// # Arguments
    /// * `path` - Location of the file
    ///
    /// # Returns
    /// The dataset, with profile and chunk layout already read
    pub fn open(path: &Path) -> TiffResult<Self> {
        let mut reader = TiffReader::new();
        let tiff = reader.load(path)?;
        let ifd = tiff.primary_image()
            .ok_or_else(|| TiffError::GenericError("No image in file".to_string()))?
            .clone();

        let mut source = BufReader::with_capacity(1024 * 1024, File::open(path)?);
        let profile = RasterProfile::from_ifd(&reader, &mut source, &ifd)?;
        let layout = ChunkLayout::read(&reader, &mut source, &ifd, &profile)?;

        let planes = if profile.planar_config == planar_config::PLANAR { profile.band_count } else { 1 };
        validation::validate_chunk_table(
            &layout.offsets,
            &layout.byte_counts,
            layout.chunks_per_plane() * planes,
            source.total_len()?,
        )?;

        info!("Opened {}: {}x{} with {} bands ({})",
              path.display(), profile.width, profile.height, profile.band_count, profile.dtype());

        Ok(RasterDataset {
            path: path.to_path_buf(),
            reader,
            source,
            profile,
            layout,
        })
    }

    /// The raster's profile
    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    /// Number of bands in the raster
    pub fn band_count(&self) -> usize {
        self.profile.band_count
    }

    /// Path the dataset was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads one band fully into memory
    ///
    /// # Arguments
    /// * `band` - 1-based band index
    ///
    /// # Returns
    /// `width * height` samples in row-major order, little-endian
    pub fn read_band(&mut self, band: usize) -> TiffResult<Vec<u8>> {
        let count = self.profile.band_count;
        if band == 0 || band > count {
            return Err(TiffError::BandOutOfRange { band, count });
        }
        self.check_decodable()?;

        let codec = CompressionFactory::create_handler(self.profile.compression as u64)?;
        let handler = self.reader.get_byte_order_handler()
            .ok_or_else(|| TiffError::GenericError("Byte order not yet determined".to_string()))?;

        let planar = self.profile.planar_config == planar_config::PLANAR;
        let samples_per_chunk_pixel = if planar { 1 } else { count };
        let sample_in_pixel = if planar { 0 } else { band - 1 };
        let first_chunk = if planar { (band - 1) * self.layout.chunks_per_plane() } else { 0 };

        let bytes_per_sample = self.profile.bytes_per_sample();
        let width = self.profile.width as usize;
        let height = self.profile.height as usize;
        let row_bytes = self.layout.chunk_width * samples_per_chunk_pixel * bytes_per_sample;
        let file_size = self.source.total_len()?;

        let mut band_data = vec![0u8; self.profile.band_size()];

        for chunk_y in 0..self.layout.chunks_down {
            for chunk_x in 0..self.layout.chunks_across {
                let index = first_chunk + chunk_y * self.layout.chunks_across + chunk_x;
                let offset = self.layout.offsets[index];
                let byte_count = self.layout.byte_counts[index];
                validation::validate_chunk(offset, byte_count, file_size)?;

                let mut raw = vec![0u8; byte_count as usize];
                self.source.seek(SeekFrom::Start(offset))?;
                self.source.read_exact(&mut raw)?;

                let y0 = chunk_y * self.layout.chunk_height;
                let x0 = chunk_x * self.layout.chunk_width;
                let rows = self.layout.chunk_height.min(height - y0);
                let cols = self.layout.chunk_width.min(width - x0);
                // Tiles are always stored full size; the last strip may be short
                let stored_rows = if self.layout.tiled { self.layout.chunk_height } else { rows };

                let expected = stored_rows * row_bytes;
                let mut data = codec.decompress(&raw, expected)?;
                if data.len() < expected {
                    return Err(TiffError::TruncatedData { expected, actual: data.len() });
                }
                handler.to_little_endian(&mut data, bytes_per_sample);

                if self.profile.predictor == predictor::HORIZONTAL_DIFFERENCING {
                    for row in data.chunks_exact_mut(row_bytes) {
                        undo_horizontal_differencing(row, samples_per_chunk_pixel, bytes_per_sample);
                    }
                }

                for r in 0..rows {
                    let src_row = r * row_bytes;
                    let dst_row = ((y0 + r) * width + x0) * bytes_per_sample;
                    for c in 0..cols {
                        let src = src_row + (c * samples_per_chunk_pixel + sample_in_pixel) * bytes_per_sample;
                        let dst = dst_row + c * bytes_per_sample;
                        band_data[dst..dst + bytes_per_sample].copy_from_slice(&data[src..src + bytes_per_sample]);
                    }
                }
                trace!("Decoded chunk {} of band {}", index, band);
            }
        }

        debug!("Read band {} of {} ({} bytes)", band, self.path.display(), band_data.len());
        Ok(band_data)
    }

    /// Rejects sample layouts the decoder cannot split into bands
    fn check_decodable(&self) -> TiffResult<()> {
        if !matches!(self.profile.bits_per_sample, 8 | 16 | 32 | 64) {
            return Err(TiffError::UnsupportedBitDepth(self.profile.bits_per_sample));
        }
        match self.profile.predictor {
            predictor::NONE => Ok(()),
            predictor::HORIZONTAL_DIFFERENCING if self.profile.sample_format != sample_format::IEEEFP => Ok(()),
            other => Err(TiffError::UnsupportedPredictor(other as u64)),
        }
    }
}

/// Reverses TIFF predictor 2 on one row of little-endian samples
///
/// Each sample holds the difference to the same sample of the previous pixel.
fn undo_horizontal_differencing(row: &mut [u8], samples_per_pixel: usize, bytes_per_sample: usize) {
    let stride = samples_per_pixel * bytes_per_sample;
    for i in stride..row.len() {
        // Only the first byte of each sample starts an element
        if (i % bytes_per_sample) != 0 {
            continue;
        }
        let prev = i - stride;
        match bytes_per_sample {
            1 => row[i] = row[i].wrapping_add(row[prev]),
            2 => {
                let v = u16::from_le_bytes([row[i], row[i + 1]])
                    .wrapping_add(u16::from_le_bytes([row[prev], row[prev + 1]]));
                row[i..i + 2].copy_from_slice(&v.to_le_bytes());
            }
            4 => {
                let mut a = [0u8; 4];
                let mut b = [0u8; 4];
                a.copy_from_slice(&row[i..i + 4]);
                b.copy_from_slice(&row[prev..prev + 4]);
                let v = u32::from_le_bytes(a).wrapping_add(u32::from_le_bytes(b));
                row[i..i + 4].copy_from_slice(&v.to_le_bytes());
            }
            8 => {
                let mut a = [0u8; 8];
                let mut b = [0u8; 8];
                a.copy_from_slice(&row[i..i + 8]);
                b.copy_from_slice(&row[prev..prev + 8]);
                let v = u64::from_le_bytes(a).wrapping_add(u64::from_le_bytes(b));
                row[i..i + 8].copy_from_slice(&v.to_le_bytes());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Write;
    use crate::tiff::tests::test_utils::{band_u16_le, base_tags, chunky_u16, geo_tags, sample, FixtureBuilder, Value};

    fn write_fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn planar_u16(width: usize, height: usize, band: usize, big_endian: bool) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let v = sample(band, i % width, i / width);
                if big_endian { v.to_be_bytes() } else { v.to_le_bytes() }
            })
            .collect()
    }

    #[test]
    fn splits_chunky_strips_in_both_byte_orders() {
        for big_endian in [false, true] {
            let pixels = chunky_u16(5, 4, 3, big_endian);
            // Two strips of two rows each
            let half = pixels.len() / 2;
            let bytes = geo_tags(base_tags(FixtureBuilder::new(big_endian), 5, 4, 3, 1))
                .tag(tags::ROWS_PER_STRIP, Value::Longs(vec![2]))
                .strips(vec![pixels[..half].to_vec(), pixels[half..].to_vec()])
                .build();
            let file = write_fixture(&bytes);

            let mut dataset = RasterDataset::open(file.path()).unwrap();
            assert_eq!(dataset.band_count(), 3);
            for band in 1..=3 {
                assert_eq!(dataset.read_band(band).unwrap(), band_u16_le(5, 4, band - 1));
            }
        }
    }

    #[test]
    fn splits_planar_strips() {
        let strips = (0..3).map(|band| planar_u16(4, 2, band, true)).collect();
        let bytes = base_tags(FixtureBuilder::new(true), 4, 2, 3, 2)
            .strips(strips)
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        assert_eq!(dataset.read_band(2).unwrap(), band_u16_le(4, 2, 1));
        assert_eq!(dataset.read_band(3).unwrap(), band_u16_le(4, 2, 2));
    }

    #[test]
    fn splits_padded_tiles() {
        // 3x3 image in 2x2 tiles: edge tiles carry padding
        let (width, height, tile) = (3usize, 3usize, 2usize);
        let mut tiles = Vec::new();
        for ty in 0..2 {
            for tx in 0..2 {
                let mut chunk = Vec::new();
                for r in 0..tile {
                    for c in 0..tile {
                        let (x, y) = (tx * tile + c, ty * tile + r);
                        for band in 0..2 {
                            let v = if x < width && y < height { sample(band, x, y) } else { 0xFFFF };
                            chunk.write_u16::<LittleEndian>(v).unwrap();
                        }
                    }
                }
                tiles.push(chunk);
            }
        }
        let bytes = base_tags(FixtureBuilder::new(false), 3, 3, 2, 1)
            .tag(tags::TILE_WIDTH, Value::Longs(vec![2]))
            .tag(tags::TILE_LENGTH, Value::Longs(vec![2]))
            .tiles(tiles)
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        assert_eq!(dataset.read_band(1).unwrap(), band_u16_le(3, 3, 0));
        assert_eq!(dataset.read_band(2).unwrap(), band_u16_le(3, 3, 1));
    }

    #[test]
    fn undoes_predictor_on_deflate_strips() {
        let width = 4usize;
        let mut row = Vec::new();
        let values: Vec<u16> = vec![100, 110, 90, 300];
        // Two samples per pixel; second band is value + 1
        let mut prev = (0u16, 0u16);
        for (i, v) in values.iter().enumerate() {
            let current = (*v, *v + 1);
            let diff = if i == 0 { current } else { (current.0.wrapping_sub(prev.0), current.1.wrapping_sub(prev.1)) };
            row.write_u16::<LittleEndian>(diff.0).unwrap();
            row.write_u16::<LittleEndian>(diff.1).unwrap();
            prev = current;
        }
        let codec = CompressionFactory::create_handler(8).unwrap();
        let bytes = base_tags(FixtureBuilder::new(false), width as u32, 1, 2, 1)
            .tag(tags::COMPRESSION, Value::Shorts(vec![8]))
            .tag(tags::PREDICTOR, Value::Shorts(vec![2]))
            .strips(vec![codec.compress(&row).unwrap()])
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        let band2 = dataset.read_band(2).unwrap();
        let decoded: Vec<u16> = band2.chunks(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
        assert_eq!(decoded, vec![101, 111, 91, 301]);
    }

    #[test]
    fn band_index_is_checked() {
        let bytes = base_tags(FixtureBuilder::new(false), 2, 2, 2, 1)
            .strips(vec![chunky_u16(2, 2, 2, false)])
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        assert!(matches!(dataset.read_band(0), Err(TiffError::BandOutOfRange { band: 0, count: 2 })));
        assert!(matches!(dataset.read_band(3), Err(TiffError::BandOutOfRange { band: 3, count: 2 })));
    }

    #[test]
    fn unsupported_compression_fails_the_read_not_the_open() {
        let bytes = base_tags(FixtureBuilder::new(false), 2, 2, 2, 1)
            .tag(tags::COMPRESSION, Value::Shorts(vec![7]))
            .strips(vec![vec![0u8; 4]])
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        assert!(matches!(dataset.read_band(1), Err(TiffError::UnsupportedCompression(7))));
    }

    #[test]
    fn short_strip_is_truncated_data() {
        let bytes = base_tags(FixtureBuilder::new(false), 2, 2, 2, 1)
            .strips(vec![vec![0u8; 10]])
            .build();
        let file = write_fixture(&bytes);

        let mut dataset = RasterDataset::open(file.path()).unwrap();
        assert!(matches!(dataset.read_band(1), Err(TiffError::TruncatedData { expected: 16, actual: 10 })));
    }
}
