//! Tests for the byte order module

use std::io::Cursor;
use byteorder::{LittleEndian, BigEndian, WriteBytesExt};
use crate::io::byte_order::{ByteOrder, ByteOrderHandler, LittleEndianHandler, BigEndianHandler};
use crate::tiff::errors::TiffError;

#[test]
fn test_byte_order_detection_little_endian() {
    let mut cursor = Cursor::new(b"II".to_vec());
    assert_eq!(ByteOrder::detect(&mut cursor).unwrap(), ByteOrder::LittleEndian);
}

#[test]
fn test_byte_order_detection_big_endian() {
    let mut cursor = Cursor::new(b"MM".to_vec());
    assert_eq!(ByteOrder::detect(&mut cursor).unwrap(), ByteOrder::BigEndian);
}

#[test]
fn test_byte_order_detection_invalid() {
    let mut buffer = Vec::new();
    buffer.write_u16::<LittleEndian>(0x1234).unwrap();
    let mut cursor = Cursor::new(buffer);

    match ByteOrder::detect(&mut cursor) {
        Err(TiffError::InvalidByteOrder(0x1234)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_handlers_read_their_order() {
    let mut le = Vec::new();
    le.write_u16::<LittleEndian>(0x1234).unwrap();
    le.write_u32::<LittleEndian>(0x12345678).unwrap();
    le.write_f64::<LittleEndian>(2.5).unwrap();
    let mut cursor = Cursor::new(le);
    assert_eq!(LittleEndianHandler.read_u16(&mut cursor).unwrap(), 0x1234);
    assert_eq!(LittleEndianHandler.read_u32(&mut cursor).unwrap(), 0x12345678);
    assert_eq!(LittleEndianHandler.read_f64(&mut cursor).unwrap(), 2.5);

    let mut be = Vec::new();
    be.write_u64::<BigEndian>(0x1234567890ABCDEF).unwrap();
    let mut cursor = Cursor::new(be);
    assert_eq!(BigEndianHandler.read_u64(&mut cursor).unwrap(), 0x1234567890ABCDEF);
}

#[test]
fn test_to_little_endian_swaps_per_element() {
    let mut data = vec![0x12, 0x34, 0x56, 0x78];
    BigEndianHandler.to_little_endian(&mut data, 2);
    assert_eq!(data, vec![0x34, 0x12, 0x78, 0x56]);

    let mut data = vec![0x12, 0x34, 0x56, 0x78];
    LittleEndianHandler.to_little_endian(&mut data, 2);
    assert_eq!(data, vec![0x12, 0x34, 0x56, 0x78]);

    let mut bytes = vec![1, 2, 3];
    BigEndianHandler.to_little_endian(&mut bytes, 1);
    assert_eq!(bytes, vec![1, 2, 3]);
}
