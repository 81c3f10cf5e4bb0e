//! Single-image TIFF writer
//!
//! Lays a file out as header, one IFD, out-of-line tag payloads (word
//! aligned) and finally the strips. Output is always little-endian; BigTIFF
//! is used when asked for or when a classic file could not address the data.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::tiff::constants::{field_types, header, tags};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd;

/// Largest offset a classic TIFF can hold
const CLASSIC_LIMIT: u64 = u32::MAX as u64;

/// A tag value ready to be written, stored as little-endian bytes
#[derive(Debug, Clone, PartialEq)]
pub struct TagPayload {
    /// TIFF field type
    pub field_type: u16,
    /// Number of values
    pub count: u64,
    /// Payload bytes in little-endian order
    pub bytes: Vec<u8>,
}

impl TagPayload {
    /// Payload of SHORT values
    pub fn shorts(values: &[u16]) -> Self {
        TagPayload {
            field_type: field_types::SHORT,
            count: values.len() as u64,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Payload of LONG values
    pub fn longs(values: &[u32]) -> Self {
        TagPayload {
            field_type: field_types::LONG,
            count: values.len() as u64,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Payload of LONG8 values (BigTIFF only)
    pub fn long8s(values: &[u64]) -> Self {
        TagPayload {
            field_type: field_types::LONG8,
            count: values.len() as u64,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Payload of DOUBLE values
    pub fn doubles(values: &[f64]) -> Self {
        TagPayload {
            field_type: field_types::DOUBLE,
            count: values.len() as u64,
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// NUL-terminated ASCII payload
    pub fn ascii(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        TagPayload {
            field_type: field_types::ASCII,
            count: bytes.len() as u64,
            bytes,
        }
    }

    /// Payload carried over verbatim from another file
    pub fn raw(field_type: u16, count: u64, bytes: Vec<u8>) -> Self {
        TagPayload { field_type, count, bytes }
    }
}

/// Writer for a TIFF holding a single image stored in strips
#[derive(Debug, Default)]
pub struct TiffWriter {
    prefer_big_tiff: bool,
    tags: BTreeMap<u16, TagPayload>,
    rows_per_strip: u32,
    strips: Vec<Vec<u8>>,
}

impl TiffWriter {
    /// Creates a writer
    ///
    /// # Arguments
    /// * `prefer_big_tiff` - Write BigTIFF even when classic TIFF would do
    pub fn new(prefer_big_tiff: bool) -> Self {
        TiffWriter {
            prefer_big_tiff,
            ..Default::default()
        }
    }

    /// Sets a tag, replacing any previous value
    ///
    /// Strip layout tags are managed by the writer and are ignored here.
    pub fn set_tag(&mut self, tag: u16, payload: TagPayload) {
        if matches!(tag, tags::STRIP_OFFSETS | tags::STRIP_BYTE_COUNTS | tags::ROWS_PER_STRIP) {
            debug!("Ignoring managed tag {} ({})", tag, ifd::tag_name(tag));
            return;
        }
        self.tags.insert(tag, payload);
    }

    /// Sets the encoded strips
    ///
    /// # Arguments
    /// * `rows_per_strip` - Image rows held by each strip (the last may hold fewer)
    /// * `strips` - Strip payloads, already compressed
    pub fn set_strips(&mut self, rows_per_strip: u32, strips: Vec<Vec<u8>>) {
        self.rows_per_strip = rows_per_strip;
        self.strips = strips;
    }

    /// Whether the file will be written as BigTIFF
    pub fn will_write_big_tiff(&self) -> bool {
        self.prefer_big_tiff || self.planned_size(false) > CLASSIC_LIMIT
    }

    /// Writes the file to `output_path`
    ///
    /// # Returns
    /// Number of bytes written
    pub fn write(&self, output_path: &Path) -> TiffResult<u64> {
        info!("Writing TIFF to {}", output_path.display());
        let file = File::create(output_path)?;
        let mut writer = BufWriter::with_capacity(1024 * 1024, file);
        let written = self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(written)
    }

    /// Writes the file to any byte sink
    pub fn write_to(&self, writer: &mut dyn Write) -> TiffResult<u64> {
        let is_big_tiff = self.will_write_big_tiff();
        let layout = self.plan(is_big_tiff);

        if !is_big_tiff && layout.total_size > CLASSIC_LIMIT {
            return Err(TiffError::GenericError(format!(
                "{} bytes cannot be addressed by a classic TIFF", layout.total_size
            )));
        }

        let mut sink = CountingWriter { inner: writer, position: 0 };
        Self::write_header(&mut sink, is_big_tiff, layout.ifd_offset)?;
        Self::write_ifd(&mut sink, &layout, is_big_tiff)?;

        for (tag, payload) in &layout.entries {
            if let Some(&offset) = layout.external_offsets.get(tag) {
                sink.pad_to(offset)?;
                sink.write_all(&payload.bytes)?;
            }
        }

        for (strip, &offset) in self.strips.iter().zip(&layout.strip_offsets) {
            sink.pad_to(offset)?;
            sink.write_all(strip)?;
        }

        debug!("Wrote {} bytes ({} strips, BigTIFF: {})", sink.position, self.strips.len(), is_big_tiff);
        Ok(sink.position)
    }

    fn planned_size(&self, is_big_tiff: bool) -> u64 {
        self.plan(is_big_tiff).total_size
    }

    /// Assigns an offset to every out-of-line payload and every strip
    fn plan(&self, is_big_tiff: bool) -> Layout {
        let inline_size = if is_big_tiff { 8 } else { 4 };
        let header_size = if is_big_tiff { header::BIG_TIFF_HEADER_SIZE } else { header::TIFF_HEADER_SIZE };

        let mut entries = self.tags.clone();
        let byte_counts: Vec<u64> = self.strips.iter().map(|s| s.len() as u64).collect();
        let placeholder = vec![0u64; self.strips.len()];
        entries.insert(tags::ROWS_PER_STRIP, TagPayload::longs(&[self.rows_per_strip]));
        entries.insert(tags::STRIP_OFFSETS, Self::offset_payload(&placeholder, is_big_tiff));
        entries.insert(tags::STRIP_BYTE_COUNTS, Self::offset_payload(&byte_counts, is_big_tiff));

        let ifd_size = if is_big_tiff {
            8 + 20 * entries.len() as u64 + 8
        } else {
            2 + 12 * entries.len() as u64 + 4
        };

        let mut cursor = header_size + ifd_size;
        let mut external_offsets = BTreeMap::new();
        for (tag, payload) in &entries {
            if payload.bytes.len() > inline_size {
                cursor = align_to_word(cursor);
                external_offsets.insert(*tag, cursor);
                cursor += payload.bytes.len() as u64;
            }
        }

        let mut strip_offsets = Vec::with_capacity(self.strips.len());
        for strip in &self.strips {
            cursor = align_to_word(cursor);
            strip_offsets.push(cursor);
            cursor += strip.len() as u64;
        }
        entries.insert(tags::STRIP_OFFSETS, Self::offset_payload(&strip_offsets, is_big_tiff));

        Layout {
            ifd_offset: header_size,
            entries,
            external_offsets,
            strip_offsets,
            total_size: cursor,
        }
    }

    fn offset_payload(values: &[u64], is_big_tiff: bool) -> TagPayload {
        if is_big_tiff {
            TagPayload::long8s(values)
        } else {
            let narrowed: Vec<u32> = values.iter().map(|&v| v as u32).collect();
            TagPayload::longs(&narrowed)
        }
    }

    fn write_header(writer: &mut CountingWriter<'_>, is_big_tiff: bool, ifd_offset: u64) -> TiffResult<()> {
        writer.write_all(&header::LITTLE_ENDIAN_MARKER)?;

        if is_big_tiff {
            writer.write_all(&header::BIG_TIFF_VERSION.to_le_bytes())?;
            writer.write_all(&header::BIGTIFF_OFFSET_SIZE.to_le_bytes())?;
            writer.write_all(&[0u8, 0])?;  // Reserved (always 0)
            writer.write_all(&ifd_offset.to_le_bytes())?;
        } else {
            writer.write_all(&header::TIFF_VERSION.to_le_bytes())?;
            writer.write_all(&(ifd_offset as u32).to_le_bytes())?;
        }

        Ok(())
    }

    fn write_ifd(writer: &mut CountingWriter<'_>, layout: &Layout, is_big_tiff: bool) -> TiffResult<()> {
        let inline_size = if is_big_tiff { 8 } else { 4 };

        match is_big_tiff {
            true => writer.write_all(&(layout.entries.len() as u64).to_le_bytes())?,
            false => writer.write_all(&(layout.entries.len() as u16).to_le_bytes())?,
        }

        for (tag, payload) in &layout.entries {
            writer.write_all(&tag.to_le_bytes())?;
            writer.write_all(&payload.field_type.to_le_bytes())?;
            match is_big_tiff {
                true => writer.write_all(&payload.count.to_le_bytes())?,
                false => writer.write_all(&(payload.count as u32).to_le_bytes())?,
            }

            let mut value = vec![0u8; inline_size];
            match layout.external_offsets.get(tag) {
                Some(&offset) => value.copy_from_slice(&offset.to_le_bytes()[..inline_size]),
                None => value[..payload.bytes.len()].copy_from_slice(&payload.bytes),
            }
            writer.write_all(&value)?;
        }

        // Single image, so no next IFD
        writer.write_all(&vec![0u8; inline_size])?;
        Ok(())
    }
}

/// Offsets computed before anything is written
struct Layout {
    ifd_offset: u64,
    entries: BTreeMap<u16, TagPayload>,
    external_offsets: BTreeMap<u16, u64>,
    strip_offsets: Vec<u64>,
    total_size: u64,
}

/// Tracks the write position so padding can be emitted without seeking
struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    position: u64,
}

impl CountingWriter<'_> {
    fn write_all(&mut self, data: &[u8]) -> TiffResult<()> {
        self.inner.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    fn pad_to(&mut self, offset: u64) -> TiffResult<()> {
        if offset < self.position {
            return Err(TiffError::GenericError(format!(
                "Layout error: offset {} is behind write position {}", offset, self.position
            )));
        }
        let padding = vec![0u8; (offset - self.position) as usize];
        self.write_all(&padding)
    }
}

/// Rounds up to the next 4-byte boundary
fn align_to_word(offset: u64) -> u64 {
    (offset + 3) & !3
}
