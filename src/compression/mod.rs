//! Compression handling for TIFF pixel chunks
//!
//! Each supported TIFF compression code maps to a handler; the factory picks
//! one when a band is decoded and again when the single-band copy is written.

mod handler;
mod uncompressed;
mod deflate;
mod lzw;
mod factory;
mod zstd;

pub use handler::CompressionHandler;
pub use uncompressed::UncompressedHandler;
pub use deflate::DeflateHandler;
pub use lzw::LzwHandler;
pub use factory::CompressionFactory;
pub use zstd::ZstdHandler;
