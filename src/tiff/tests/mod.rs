//! Unit tests for the TIFF layer

pub(crate) mod test_utils;
mod byte_order_tests;
