//! Checksums used to sign the records. Headers and the configuration are protected by a CRC-16,
//! DSP profile payloads by a CRC-32.

/// CRC-16/ARC: polynomial 0x8005 (bit-reversed 0xA001), init 0, no final xor.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// CRC-32/ISO-HDLC, the common IEEE 802.3 checksum.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
