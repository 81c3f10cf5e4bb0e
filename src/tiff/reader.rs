//! TIFF file reader implementation
//!
//! This module implements the TIFF/BigTIFF file reader that uses the
//! Strategy pattern to handle different byte orders.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use crate::io::byte_order::{ByteOrder, ByteOrderHandler};
use crate::io::seekable::SeekableReader;
use crate::tiff::constants::{field_types, header};
use crate::tiff::errors::{TiffError, TiffResult};
use crate::tiff::ifd::{self, IFDEntry, IFD};
use crate::tiff::types::TIFF;
use crate::tiff::validation;

/// Upper bound on the number of IFDs followed in one file
const MAX_IFDS: usize = 100;

/// Reader for TIFF and BigTIFF files
pub struct TiffReader {
    /// Current byte order handler
    byte_order_handler: Option<Box<dyn ByteOrderHandler>>,
    /// Current file path
    current_file: Option<String>,
    /// Whether currently reading BigTIFF format
    is_big_tiff: bool,
}

impl Default for TiffReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TiffReader {
    /// Creates a new TIFF reader
    pub fn new() -> Self {
        TiffReader {
            byte_order_handler: None,
            current_file: None,
            is_big_tiff: false,
        }
    }

    fn handler(&self) -> TiffResult<&dyn ByteOrderHandler> {
        self.byte_order_handler
            .as_deref()
            .ok_or_else(|| TiffError::GenericError("Byte order not yet determined".to_string()))
    }

    /// Loads a TIFF file from the given path
    ///
    /// # Arguments
    /// * `filepath` - Path to the TIFF file to load
    ///
    /// # Returns
    /// A TIFF structure describing every IFD in the file
    pub fn load(&mut self, filepath: &Path) -> TiffResult<TIFF> {
        info!("Loading TIFF file: {}", filepath.display());
        self.current_file = Some(filepath.display().to_string());

        let file = File::open(filepath)?;
        let mut reader = BufReader::with_capacity(1024 * 1024, file);

        self.read(&mut reader)
    }

    /// Reads a TIFF file from the given reader
    ///
    /// The header is decoded first (byte order, then TIFF or BigTIFF),
    /// followed by the chain of Image File Directories.
    ///
    /// # Arguments
    /// * `reader` - Any struct implementing the SeekableReader trait
    ///
    /// # Returns
    /// A TIFF structure containing the file's directories
    pub fn read(&mut self, reader: &mut dyn SeekableReader) -> TiffResult<TIFF> {
        reader.seek(SeekFrom::Start(0))?;

        let byte_order = ByteOrder::detect(reader)?;
        debug!("Detected byte order: {}", byte_order.name());
        self.byte_order_handler = Some(byte_order.create_handler());

        let handler = self.handler()?;
        let version = handler.read_u16(reader)?;
        let is_big_tiff = match version {
            header::TIFF_VERSION => false,
            header::BIG_TIFF_VERSION => {
                validation::validate_bigtiff_header(reader, handler)?;
                true
            }
            other => return Err(TiffError::UnsupportedVersion(other)),
        };

        let first_ifd_offset = if is_big_tiff {
            handler.read_u64(reader)?
        } else {
            handler.read_u32(reader)? as u64
        };
        self.is_big_tiff = is_big_tiff;
        debug!("First IFD offset: {} (BigTIFF: {})", first_ifd_offset, is_big_tiff);

        let file_size = reader.total_len()?;
        validation::validate_ifd_offset(first_ifd_offset, file_size)?;

        let mut tiff = TIFF::new(is_big_tiff, byte_order);
        tiff.ifds = self.read_ifd_chain(reader, first_ifd_offset, file_size)?;

        if tiff.ifds.is_empty() {
            return Err(TiffError::GenericError("No readable IFD in file".to_string()));
        }

        info!("Read {} IFDs from TIFF file", tiff.ifds.len());
        Ok(tiff)
    }

    /// Reads a chain of IFDs starting from the given offset
    ///
    /// A broken link ends the chain; IFDs read so far are kept.
    fn read_ifd_chain(
        &self,
        reader: &mut dyn SeekableReader,
        first_ifd_offset: u64,
        file_size: u64,
    ) -> TiffResult<Vec<IFD>> {
        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut ifd_offset = first_ifd_offset;

        while ifd_offset != 0 && ifds.len() < MAX_IFDS {
            if !visited.insert(ifd_offset) {
                warn!("IFD offset {} already visited, stopping IFD chain", ifd_offset);
                break;
            }
            if ifd_offset >= file_size {
                warn!("IFD offset {} exceeds file size {}, stopping IFD chain", ifd_offset, file_size);
                break;
            }

            let ifd = match self.read_ifd(reader, ifd_offset, ifds.len()) {
                Ok(ifd) => ifd,
                Err(e) => {
                    warn!("Error reading IFD {}: {}", ifds.len(), e);
                    break;
                }
            };

            // The reader sits right after the last entry, where the next offset lives
            let next = if self.is_big_tiff {
                self.handler()?.read_u64(reader)
            } else {
                self.handler()?.read_u32(reader).map(u64::from)
            };
            ifds.push(ifd);

            ifd_offset = match next {
                Ok(offset) => offset,
                Err(e) => {
                    warn!("Error reading next IFD offset: {}", e);
                    break;
                }
            };
            debug!("Next IFD offset: {}", ifd_offset);
        }

        Ok(ifds)
    }

    /// Reads an IFD from the reader
    ///
    /// # Arguments
    /// * `reader` - The seekable reader to use
    /// * `offset` - Offset in the file where the IFD starts
    /// * `number` - The index of this IFD in the file
    ///
    /// # Returns
    /// The parsed IFD structure
    pub fn read_ifd(&self, reader: &mut dyn SeekableReader, offset: u64, number: usize) -> TiffResult<IFD> {
        reader.seek(SeekFrom::Start(offset))?;
        let handler = self.handler()?;

        let entry_count = if self.is_big_tiff {
            handler.read_u64(reader)?
        } else {
            handler.read_u16(reader)? as u64
        };
        debug!("IFD entry count: {}", entry_count);

        let mut ifd = IFD::new(number, offset);
        for _ in 0..entry_count {
            let entry = self.read_ifd_entry(reader)?;
            ifd.add_entry(entry);
        }

        debug!("Read IFD #{} with {} entries", number, ifd.entries.len());
        Ok(ifd)
    }

    /// Reads a single IFD entry, keeping its value field undecoded
    fn read_ifd_entry(&self, reader: &mut dyn SeekableReader) -> TiffResult<IFDEntry> {
        let handler = self.handler()?;

        let tag = handler.read_u16(reader)?;
        let field_type = handler.read_u16(reader)?;
        let count = if self.is_big_tiff {
            handler.read_u64(reader)?
        } else {
            handler.read_u32(reader)? as u64
        };

        let mut raw = [0u8; 8];
        let field_len = if self.is_big_tiff { 8 } else { 4 };
        reader.read_exact(&mut raw[..field_len])?;

        let probe = IFDEntry::with_raw(tag, field_type, count, 0, raw);
        let value_offset = if probe.is_value_inline(self.is_big_tiff) {
            if count == 0 {
                0
            } else {
                let mut cursor = Cursor::new(&raw[..]);
                read_value(handler, &mut cursor, field_type).unwrap_or(0)
            }
        } else {
            let mut cursor = Cursor::new(&raw[..field_len]);
            if self.is_big_tiff {
                handler.read_u64(&mut cursor)?
            } else {
                handler.read_u32(&mut cursor)? as u64
            }
        };

        Ok(IFDEntry::with_raw(tag, field_type, count, value_offset, raw))
    }

    /// Reads a tag's value as a vector of u64
    ///
    /// Inline payloads are decoded from the entry itself, so multi-value
    /// inline tags (e.g. BitsPerSample of a 3-band file) are complete.
    ///
    /// # Arguments
    /// * `reader` - The seekable reader to use
    /// * `ifd` - The IFD containing the tag
    /// * `tag` - The tag number to read
    ///
    /// # Returns
    /// A vector of u64 values
    pub fn read_tag_values(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<Vec<u64>> {
        let entry = ifd.get_entry(tag).ok_or(TiffError::TagNotFound(tag))?;
        let handler = self.handler()?;
        let count = self.checked_count(reader, entry)?;

        let mut values = Vec::with_capacity(count);
        if entry.is_value_inline(self.is_big_tiff) {
            let mut cursor = Cursor::new(&entry.raw[..]);
            for _ in 0..count {
                values.push(read_value(handler, &mut cursor, entry.field_type)?);
            }
        } else {
            reader.seek(SeekFrom::Start(entry.value_offset))?;
            for _ in 0..count {
                values.push(read_value(handler, reader, entry.field_type)?);
            }
        }

        Ok(values)
    }

    /// Reads a numeric tag's values as f64
    pub fn read_tag_f64_values(&self, reader: &mut dyn SeekableReader, ifd: &IFD, tag: u16) -> TiffResult<Vec<f64>> {
        let entry = ifd.get_entry(tag).ok_or(TiffError::TagNotFound(tag))?;
        let handler = self.handler()?;
        let count = self.checked_count(reader, entry)?;

        let mut values = Vec::with_capacity(count);
        if entry.is_value_inline(self.is_big_tiff) {
            let mut cursor = Cursor::new(&entry.raw[..]);
            for _ in 0..count {
                values.push(read_f64_value(handler, &mut cursor, entry.field_type)?);
            }
        } else {
            reader.seek(SeekFrom::Start(entry.value_offset))?;
            for _ in 0..count {
                values.push(read_f64_value(handler, reader, entry.field_type)?);
            }
        }

        Ok(values)
    }

    /// Reads the payload of an entry as little-endian bytes
    ///
    /// Used to carry tags verbatim into files written by this crate, which
    /// are always little-endian.
    pub fn read_entry_bytes_le(&self, reader: &mut dyn SeekableReader, entry: &IFDEntry) -> TiffResult<Vec<u8>> {
        let handler = self.handler()?;
        let size = entry.data_size() as usize;

        let mut bytes = if entry.is_value_inline(self.is_big_tiff) {
            entry.raw[..size].to_vec()
        } else {
            let file_size = reader.total_len()?;
            validation::validate_chunk(entry.value_offset, entry.data_size(), file_size)?;
            reader.seek(SeekFrom::Start(entry.value_offset))?;
            let mut buffer = vec![0u8; size];
            reader.read_exact(&mut buffer)?;
            buffer
        };

        handler.to_little_endian(&mut bytes, ifd::field_element_size(entry.field_type));
        Ok(bytes)
    }

    /// Number of values an entry holds, refusing payloads past the end of file
    fn checked_count(&self, reader: &mut dyn SeekableReader, entry: &IFDEntry) -> TiffResult<usize> {
        if !entry.is_value_inline(self.is_big_tiff) {
            let file_size = reader.total_len()?;
            validation::validate_chunk(entry.value_offset, entry.data_size(), file_size)?;
        }
        Ok(entry.count as usize)
    }

    /// Gets the file path if available
    pub fn get_file_path(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    /// Returns whether the current file is a BigTIFF
    pub fn is_big_tiff(&self) -> bool {
        self.is_big_tiff
    }

    /// Gets the current byte order handler
    ///
    /// # Returns
    /// The handler for the last file read, or None before any read
    pub fn get_byte_order_handler(&self) -> Option<&dyn ByteOrderHandler> {
        self.byte_order_handler.as_deref()
    }
}

/// Reads one value of `field_type` widened to u64
fn read_value(handler: &dyn ByteOrderHandler, reader: &mut dyn SeekableReader, field_type: u16) -> TiffResult<u64> {
    let value = match field_type {
        field_types::BYTE | field_types::ASCII | field_types::SBYTE | field_types::UNDEFINED => {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            byte[0] as u64
        }
        field_types::SHORT | field_types::SSHORT => handler.read_u16(reader)? as u64,
        field_types::LONG | field_types::SLONG => handler.read_u32(reader)? as u64,
        field_types::LONG8 | field_types::SLONG8 | field_types::IFD8 => handler.read_u64(reader)?,
        other => return Err(TiffError::UnsupportedFieldType(other)),
    };
    Ok(value)
}

/// Reads one value of `field_type` as f64
fn read_f64_value(handler: &dyn ByteOrderHandler, reader: &mut dyn SeekableReader, field_type: u16) -> TiffResult<f64> {
    match field_type {
        field_types::DOUBLE => Ok(handler.read_f64(reader)?),
        field_types::FLOAT => Ok(f32::from_bits(handler.read_u32(reader)?) as f64),
        field_types::RATIONAL => {
            let numerator = handler.read_u32(reader)? as f64;
            let denominator = handler.read_u32(reader)? as f64;
            Ok(if denominator == 0.0 { 0.0 } else { numerator / denominator })
        }
        other => read_value(handler, reader, other).map(|v| v as f64),
    }
}
