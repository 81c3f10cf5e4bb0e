//! Hand-built TIFF fixtures
//!
//! The builder lays out a classic TIFF in either byte order so the reader
//! and band decoder can be tested against files this crate did not write.

use std::collections::BTreeMap;
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use crate::tiff::constants::{field_types, tags};

/// Tag values a fixture can carry
#[derive(Debug, Clone)]
pub enum Value {
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    Doubles(Vec<f64>),
    Ascii(String),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Shorts(_) => field_types::SHORT,
            Value::Longs(_) => field_types::LONG,
            Value::Doubles(_) => field_types::DOUBLE,
            Value::Ascii(_) => field_types::ASCII,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Shorts(v) => v.len() as u32,
            Value::Longs(v) => v.len() as u32,
            Value::Doubles(v) => v.len() as u32,
            Value::Ascii(s) => s.len() as u32 + 1,
        }
    }

    fn encode(&self, big_endian: bool) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Value::Shorts(values) => for v in values {
                if big_endian { out.write_u16::<BigEndian>(*v).unwrap() } else { out.write_u16::<LittleEndian>(*v).unwrap() }
            },
            Value::Longs(values) => for v in values {
                if big_endian { out.write_u32::<BigEndian>(*v).unwrap() } else { out.write_u32::<LittleEndian>(*v).unwrap() }
            },
            Value::Doubles(values) => for v in values {
                if big_endian { out.write_f64::<BigEndian>(*v).unwrap() } else { out.write_f64::<LittleEndian>(*v).unwrap() }
            },
            Value::Ascii(text) => {
                out.extend_from_slice(text.as_bytes());
                out.push(0);
            }
        }
        out
    }
}

/// Builder for a single-IFD classic TIFF
pub struct FixtureBuilder {
    big_endian: bool,
    tags: BTreeMap<u16, Value>,
    chunks: Vec<Vec<u8>>,
    tiled: bool,
}

impl FixtureBuilder {
    pub fn new(big_endian: bool) -> Self {
        FixtureBuilder { big_endian, tags: BTreeMap::new(), chunks: Vec::new(), tiled: false }
    }

    pub fn tag(mut self, tag: u16, value: Value) -> Self {
        self.tags.insert(tag, value);
        self
    }

    pub fn strips(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self.tiled = false;
        self
    }

    pub fn tiles(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self.tiled = true;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let (offsets_tag, counts_tag) = if self.tiled {
            (tags::TILE_OFFSETS, tags::TILE_BYTE_COUNTS)
        } else {
            (tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };

        let mut entries = self.tags.clone();
        if !self.chunks.is_empty() {
            entries.insert(offsets_tag, Value::Longs(vec![0; self.chunks.len()]));
            entries.insert(counts_tag, Value::Longs(self.chunks.iter().map(|c| c.len() as u32).collect()));
        }

        let ifd_size = 2 + 12 * entries.len() as u32 + 4;
        let mut cursor = 8 + ifd_size;
        let mut external = BTreeMap::new();
        for (tag, value) in &entries {
            let len = value.encode(self.big_endian).len() as u32;
            if len > 4 {
                cursor += cursor % 2;
                external.insert(*tag, cursor);
                cursor += len;
            }
        }

        let mut chunk_offsets = Vec::new();
        for chunk in &self.chunks {
            cursor += cursor % 2;
            chunk_offsets.push(cursor);
            cursor += chunk.len() as u32;
        }
        if !self.chunks.is_empty() {
            entries.insert(offsets_tag, Value::Longs(chunk_offsets.clone()));
        }

        let mut out = Vec::new();
        let be = self.big_endian;
        let put16 = |out: &mut Vec<u8>, v: u16| {
            if be { out.write_u16::<BigEndian>(v).unwrap() } else { out.write_u16::<LittleEndian>(v).unwrap() }
        };
        let put32 = |out: &mut Vec<u8>, v: u32| {
            if be { out.write_u32::<BigEndian>(v).unwrap() } else { out.write_u32::<LittleEndian>(v).unwrap() }
        };

        out.extend_from_slice(if be { b"MM" } else { b"II" });
        put16(&mut out, 42);
        put32(&mut out, 8);

        put16(&mut out, entries.len() as u16);
        for (tag, value) in &entries {
            put16(&mut out, *tag);
            put16(&mut out, value.field_type());
            put32(&mut out, value.count());
            match external.get(tag) {
                Some(offset) => put32(&mut out, *offset),
                None => {
                    let mut inline = value.encode(be);
                    inline.resize(4, 0);
                    out.extend_from_slice(&inline);
                }
            }
        }
        put32(&mut out, 0);

        for (tag, value) in &entries {
            if let Some(offset) = external.get(tag) {
                out.resize(*offset as usize, 0);
                out.extend_from_slice(&value.encode(be));
            }
        }
        for (chunk, offset) in self.chunks.iter().zip(&chunk_offsets) {
            out.resize(*offset as usize, 0);
            out.extend_from_slice(chunk);
        }

        out
    }
}

/// Sample value used by fixtures: unique per band and pixel
pub fn sample(band: usize, x: usize, y: usize) -> u16 {
    (band * 1000 + y * 10 + x) as u16
}

/// Chunky 16-bit pixel data for `bands` bands in the given byte order
pub fn chunky_u16(width: usize, height: usize, bands: usize, big_endian: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for y in 0..height {
        for x in 0..width {
            for band in 0..bands {
                let v = sample(band, x, y);
                if big_endian { out.write_u16::<BigEndian>(v).unwrap() } else { out.write_u16::<LittleEndian>(v).unwrap() }
            }
        }
    }
    out
}

/// Expected little-endian bytes of one band
pub fn band_u16_le(width: usize, height: usize, band: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for y in 0..height {
        for x in 0..width {
            out.write_u16::<LittleEndian>(sample(band, x, y)).unwrap();
        }
    }
    out
}

/// Core image tags for a 16-bit unsigned raster
pub fn base_tags(builder: FixtureBuilder, width: u32, height: u32, bands: u16, planar: u16) -> FixtureBuilder {
    builder
        .tag(tags::IMAGE_WIDTH, Value::Longs(vec![width]))
        .tag(tags::IMAGE_LENGTH, Value::Longs(vec![height]))
        .tag(tags::BITS_PER_SAMPLE, Value::Shorts(vec![16; bands as usize]))
        .tag(tags::COMPRESSION, Value::Shorts(vec![1]))
        .tag(tags::PHOTOMETRIC_INTERPRETATION, Value::Shorts(vec![1]))
        .tag(tags::SAMPLES_PER_PIXEL, Value::Shorts(vec![bands]))
        .tag(tags::PLANAR_CONFIGURATION, Value::Shorts(vec![planar]))
        .tag(tags::SAMPLE_FORMAT, Value::Shorts(vec![1; bands as usize]))
}

/// Pixel scale and tie point of a north-up raster
pub fn geo_tags(builder: FixtureBuilder) -> FixtureBuilder {
    builder
        .tag(tags::MODEL_PIXEL_SCALE_TAG, Value::Doubles(vec![10.0, 10.0, 0.0]))
        .tag(tags::MODEL_TIEPOINT_TAG, Value::Doubles(vec![0.0, 0.0, 0.0, 500000.0, 4649776.0, 0.0]))
        .tag(tags::GEO_KEY_DIRECTORY_TAG, Value::Shorts(vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32633]))
}
