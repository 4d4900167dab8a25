//! On-device layout of the V1 records. All multi-byte values are stored little-endian and every
//! field is a plain byte array, so the packed structs have an alignment of one and any bit
//! pattern read from the device is a valid value.

use core::mem::{offset_of, size_of, transmute};

pub const HEADER_ADDRESS: u16 = 0x0000;
pub const HEADER_SIZE: usize = 128;

pub const CONFIG_ADDRESS: u16 = HEADER_ADDRESS + HEADER_SIZE as u16;
pub const CONFIG_SIZE: usize = 256;

/// DSP profile payloads live between the end of the configuration and the end of the device.
pub const PROFILE_REGION_START: u16 = CONFIG_ADDRESS + CONFIG_SIZE as u16;
pub const PROFILE_SLOTS: usize = 8;

/// Placeholder for the header CRC field while the header CRC is computed.
pub const HEADER_CRC_SENTINEL: u16 = 0xAAAA;

pub(crate) const TIMESTAMP_SIZE: usize = 7;
pub(crate) const DEVICE_NAME_SIZE: usize = 100;
pub(crate) const CONFIG_TAIL_SIZE: usize = 114;
pub(crate) const POWER_PROFILES: usize = 2;
pub(crate) const LED_BANKS: usize = 4;

// Compile-time assertions to ensure the records fill whole 64 byte pages and the CRC fields stay
// where existing devices have them.
const _: () = assert!(size_of::<RawHeader>() == HEADER_SIZE, "header must be 128 bytes");
const _: () = assert!(size_of::<RawConfig>() == CONFIG_SIZE, "config must be 256 bytes");
const _: () = assert!(offset_of!(RawHeader, header_crc) == HEADER_CRC_OFFSET);
const _: () = assert!(offset_of!(RawHeader, profiles) == 64);
const _: () = assert!(offset_of!(RawConfig, equalizer) == DEVICE_NAME_SIZE);
const _: () = assert!(offset_of!(RawConfig, power_profiles) == 132);

pub(crate) const HEADER_CRC_OFFSET: usize = 38;

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub(crate) struct RawHeader {
    pub(crate) _reserved0: u8,
    pub(crate) data_version: [u8; 3],
    pub(crate) last_write: [u8; TIMESTAMP_SIZE],
    pub(crate) hardware_version: [u8; 2],
    pub(crate) bom_version: [u8; 2],
    pub(crate) serial: [u8; 8],
    pub(crate) _reserved1: [u8; 8],
    pub(crate) production: [u8; TIMESTAMP_SIZE],
    pub(crate) header_crc: [u8; 2],
    pub(crate) config_crc: [u8; 2],
    pub(crate) _reserved2: [u8; 8],
    pub(crate) profile_mask: u8,
    pub(crate) _reserved3: [u8; 13],
    pub(crate) profiles: [RawProfileDescriptor; PROFILE_SLOTS],
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub(crate) struct RawProfileDescriptor {
    pub(crate) address: [u8; 2],
    pub(crate) len: [u8; 2],
    pub(crate) crc: [u8; 4],
}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub(crate) struct RawConfig {
    pub(crate) name: [u8; DEVICE_NAME_SIZE],
    pub(crate) equalizer: [u8; 10],
    pub(crate) dac: [u8; 8],
    pub(crate) _reserved0: u8,
    pub(crate) amplifiers: [u8; 3],
    pub(crate) leds: [[u8; 2]; LED_BANKS],
    pub(crate) capacitive: [u8; 2],
    pub(crate) power_profiles: [[u8; 5]; POWER_PROFILES],
    pub(crate) _reserved1: [u8; CONFIG_TAIL_SIZE],
}

impl RawHeader {
    pub(crate) fn from_bytes(buf: [u8; HEADER_SIZE]) -> Self {
        // Safety: RawHeader consists of byte arrays only and has the same size as the buffer
        unsafe { transmute::<[u8; HEADER_SIZE], RawHeader>(buf) }
    }

    pub(crate) fn into_bytes(self) -> [u8; HEADER_SIZE] {
        // Safety: see from_bytes
        unsafe { transmute::<RawHeader, [u8; HEADER_SIZE]>(self) }
    }
}

impl RawConfig {
    pub(crate) fn from_bytes(buf: [u8; CONFIG_SIZE]) -> Self {
        // Safety: RawConfig consists of byte arrays only and has the same size as the buffer
        unsafe { transmute::<[u8; CONFIG_SIZE], RawConfig>(buf) }
    }

    pub(crate) fn into_bytes(self) -> [u8; CONFIG_SIZE] {
        // Safety: see from_bytes
        unsafe { transmute::<RawConfig, [u8; CONFIG_SIZE]>(self) }
    }
}

/// CRC-16 over a serialized header with its own CRC field replaced by [`HEADER_CRC_SENTINEL`].
/// Signing and verification both go through here so the substitution can't diverge.
pub(crate) fn header_checksum(bytes: &[u8; HEADER_SIZE]) -> u16 {
    let mut buf = *bytes;
    buf[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 2].copy_from_slice(&HEADER_CRC_SENTINEL.to_le_bytes());
    crate::crc::crc16(&buf)
}

/// Reads the CRC field of a serialized header.
pub(crate) fn stored_header_crc(bytes: &[u8; HEADER_SIZE]) -> u16 {
    u16::from_le_bytes([bytes[HEADER_CRC_OFFSET], bytes[HEADER_CRC_OFFSET + 1]])
}
