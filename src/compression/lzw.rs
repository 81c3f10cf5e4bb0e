//! LZW chunks (compression code 5)
//!
//! TIFF LZW packs codes most significant bit first and widens the code size
//! one code early, which `weezl` calls the TIFF size switch.

use log::warn;
use weezl::decode::Decoder;
use weezl::encode::Encoder;
use weezl::{BitOrder, LzwStatus};

use crate::tiff::constants::compression;
use crate::tiff::errors::{TiffError, TiffResult};
use super::handler::CompressionHandler;

const MIN_CODE_SIZE: u8 = 8;

/// LZW codec
#[derive(Default)]
pub struct LzwHandler;

impl LzwHandler {
    pub fn new() -> Self {
        LzwHandler
    }
}

impl CompressionHandler for LzwHandler {
    fn decompress(&self, data: &[u8], limit: usize) -> TiffResult<Vec<u8>> {
        let mut decoder = Decoder::with_tiff_size_switch(BitOrder::Msb, MIN_CODE_SIZE);
        let mut decoded = vec![0u8; limit];
        let mut read = 0;
        let mut written = 0;

        // Many writers omit the end-of-information code, so running out of input is not an error
        while written < limit {
            let result = decoder.decode_bytes(&data[read..], &mut decoded[written..]);
            read += result.consumed_in;
            written += result.consumed_out;
            match result.status {
                Ok(LzwStatus::Ok) => {}
                Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => break,
                Err(e) => {
                    warn!("LZW decompression error after {} bytes: {}", written, e);
                    return Err(TiffError::GenericError(format!("LZW decompression error: {}", e)));
                }
            }
        }

        decoded.truncate(written);
        Ok(decoded)
    }

    fn compress(&self, data: &[u8]) -> TiffResult<Vec<u8>> {
        Encoder::with_tiff_size_switch(BitOrder::Msb, MIN_CODE_SIZE)
            .encode(data)
            .map_err(|e| TiffError::GenericError(format!("LZW compression error: {}", e)))
    }

    fn name(&self) -> &'static str {
        "LZW"
    }

    fn code(&self) -> u16 {
        compression::LZW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_stream_without_end_code() {
        let handler = LzwHandler::new();
        let data: Vec<u8> = b"TOBEORNOTTOBEORTOBEORNOT".repeat(40);
        let mut packed = handler.compress(&data).unwrap();

        // Drop the trailing end-of-information code bits
        packed.truncate(packed.len() - 1);
        let decoded = handler.decompress(&packed, data.len()).unwrap();
        assert!(decoded.len() <= data.len());
        assert_eq!(decoded[..], data[..decoded.len()]);
    }

    #[test]
    fn corrupt_stream_is_an_error() {
        // 0xFF.. starts with a code far beyond the table
        let result = LzwHandler::new().decompress(&[0xFF, 0xFF, 0xFF, 0xFF], 64);
        assert!(result.is_err());
    }
}
