use bitstream::{BitReader, BitWriter};

#[test]
fn writer_roundtrip_header_like_layout() {
    let mut writer = BitWriter::new();
    writer.write_bits(1234, 32).unwrap();
    writer.write_bits(2047, 11).unwrap();
    writer.write_bit(true);
    writer.write_ubitvar(3);
    writer.write_bit(false);
    writer.write_bit(true);
    let len = writer.bits_written();
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_bits(32).unwrap(), 1234);
    assert_eq!(reader.read_bits(11).unwrap(), 2047);
    assert!(reader.read_bit().unwrap());
    assert_eq!(reader.read_ubitvar().unwrap(), 3);
    assert!(!reader.read_bit().unwrap());
    assert!(reader.read_bit().unwrap());
    assert_eq!(reader.bit_position(), len);
}

#[test]
fn appended_segments_keep_order() {
    let mut payload = BitWriter::new();
    payload.write_varu32(300);
    payload.write_vars32(-7);
    let payload_len = payload.bits_written();
    let payload = payload.finish();

    let mut writer = BitWriter::new();
    writer.write_bits(0b11, 2).unwrap();
    writer.append_bits(&payload, payload_len).unwrap();
    writer.write_bit(true);
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    assert_eq!(reader.read_bits(2).unwrap(), 0b11);
    assert_eq!(reader.read_varu32().unwrap(), 300);
    assert_eq!(reader.read_vars32().unwrap(), -7);
    assert!(reader.read_bit().unwrap());
}
