/// The Dallas/Maxim polynomial x^8 + x^5 + x^4 + 1, bit-reversed.
pub const CRC8_POLYNOMIAL: u8 = 0x8C;

/// Returned for buffers that contain nothing but zeros.
///
/// A line that is stuck low reads as all zeros, and the true CRC of an all-zero buffer is also
/// zero, so such a capture would otherwise always pass.
pub const ALL_ZERO_CRC: u8 = 0xFF;

/// Computes the 1-Wire CRC-8 of `data`, shifting each byte in least-significant bit first.
///
/// Returns [`ALL_ZERO_CRC`] if every byte is zero, including for an empty buffer.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    let mut any_set = false;
    for &byte in data {
        any_set |= byte != 0;
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= CRC8_POLYNOMIAL;
            }
            byte >>= 1;
        }
    }
    if !any_set {
        return ALL_ZERO_CRC;
    }
    crc
}

/// Checks that the last byte of `frame` is the CRC-8 of the bytes before it.
pub fn check_crc8(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&expected, data)) => crc8(data) == expected,
        None => false,
    }
}
