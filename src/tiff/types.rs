//! Core TIFF data structures

use crate::io::byte_order::ByteOrder;
use crate::tiff::constants::tags;
use crate::tiff::ifd::IFD;
use std::fmt;

/// Bit in NewSubfileType marking a reduced-resolution (overview) image
const REDUCED_RESOLUTION: u64 = 1;

/// Represents a TIFF file with its Image File Directories (IFDs)
#[derive(Debug)]
pub struct TIFF {
    /// Image File Directories in the TIFF file
    pub ifds: Vec<IFD>,
    /// Whether this is a BigTIFF format
    pub is_big_tiff: bool,
    /// Byte order the file was written in
    pub byte_order: ByteOrder,
}

impl TIFF {
    /// Creates a new empty TIFF structure
    pub fn new(is_big_tiff: bool, byte_order: ByteOrder) -> Self {
        TIFF {
            ifds: Vec::new(),
            is_big_tiff,
            byte_order,
        }
    }

    /// Returns the main (first) IFD if available
    pub fn main_ifd(&self) -> Option<&IFD> {
        self.ifds.first()
    }

    /// Returns the first full-resolution image, skipping overviews
    pub fn primary_image(&self) -> Option<&IFD> {
        self.ifds
            .iter()
            .find(|ifd| !Self::is_overview(ifd))
            .or_else(|| self.main_ifd())
    }

    /// Returns the number of IFDs in the TIFF file
    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    /// Returns all overview IFDs (reduced resolution subfiles)
    pub fn overviews(&self) -> Vec<&IFD> {
        self.ifds.iter().filter(|ifd| Self::is_overview(ifd)).collect()
    }

    fn is_overview(ifd: &IFD) -> bool {
        ifd.get_tag_value(tags::NEW_SUBFILE_TYPE)
            .map(|subfile_type| subfile_type & REDUCED_RESOLUTION == REDUCED_RESOLUTION)
            .unwrap_or(false)
    }
}

impl fmt::Display for TIFF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TIFF File:")?;
        writeln!(f, "  Format: {}", if self.is_big_tiff { "BigTIFF" } else { "TIFF" })?;
        writeln!(f, "  Byte order: {}", self.byte_order.name())?;
        writeln!(f, "  Number of IFDs: {}", self.ifds.len())?;

        if let Some(ifd) = self.primary_image() {
            write!(f, "{}", ifd)?;
        }

        Ok(())
    }
}
