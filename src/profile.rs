//! Index of the DSP profiles stored behind the configuration. The index itself lives in the header:
//! one descriptor per slot plus a bitmask of the used slots.

use crate::crc::crc32;
use crate::error::{Error, Record};
use crate::header::HeaderStore;
use crate::page_writer::{read_exact, write_chunked};
use crate::platform::{PageOps, Platform};
use crate::raw::{PROFILE_REGION_START, PROFILE_SLOTS, RawProfileDescriptor};
use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Length of the null padded name at the start of every profile payload.
pub const PROFILE_NAME_SIZE: usize = 30;

/// Location and checksum of one profile payload. A length of zero marks an unused slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileDescriptor {
    pub address: u16,
    pub len: u16,
    pub crc: u32,
}

impl ProfileDescriptor {
    pub const EMPTY: ProfileDescriptor = ProfileDescriptor {
        address: 0,
        len: 0,
        crc: 0,
    };

    fn range(&self) -> Range<usize> {
        self.address as usize..self.address as usize + self.len as usize
    }
}

impl From<RawProfileDescriptor> for ProfileDescriptor {
    fn from(raw: RawProfileDescriptor) -> Self {
        Self {
            address: u16::from_le_bytes(raw.address),
            len: u16::from_le_bytes(raw.len),
            crc: u32::from_le_bytes(raw.crc),
        }
    }
}

impl From<ProfileDescriptor> for RawProfileDescriptor {
    fn from(descriptor: ProfileDescriptor) -> Self {
        Self {
            address: descriptor.address.to_le_bytes(),
            len: descriptor.len.to_le_bytes(),
            crc: descriptor.crc.to_le_bytes(),
        }
    }
}

/// The profile layouts understood by the DAC: a name, two coefficient buffers and the
/// instruction memory, sized for 256, 512 or 1024 instructions.
#[derive(strum::FromRepr, strum::Display, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ProfileSize {
    Small = 1438,
    Medium = 2846,
    Large = 5662,
}

impl ProfileSize {
    pub fn bytes(self) -> u16 {
        self as u16
    }

    /// Classifies a stored profile by its length.
    pub fn from_len(len: u16) -> Option<Self> {
        Self::from_repr(len)
    }
}

fn check_slot(slot: u8) -> Result<usize, Error> {
    if (slot as usize) < PROFILE_SLOTS {
        Ok(slot as usize)
    } else {
        Err(Error::OutOfRange)
    }
}

/// Returns the descriptor of a used slot.
fn used_descriptor(headers: &HeaderStore, slot: u8) -> Result<ProfileDescriptor, Error> {
    let index = check_slot(slot)?;
    let header = headers.require_valid()?;
    if !header.is_profile_used(slot) {
        return Err(Error::EmptySlot(slot));
    }
    Ok(header.profiles[index])
}

fn try_buffer(len: usize) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailure)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Checks that `range` lies in the profile region of the device and doesn't overlap the payload
/// of another used slot.
fn check_space(
    headers: &HeaderStore,
    capacity: usize,
    slot: u8,
    range: &Range<usize>,
) -> Result<(), Error> {
    if range.is_empty() || range.start < PROFILE_REGION_START as usize || range.end > capacity {
        return Err(Error::OutOfRange);
    }

    let overlaps = headers
        .header()
        .profiles()
        .filter(|&(other, _)| other != slot)
        .any(|(_, descriptor)| {
            let other = descriptor.range();
            other.start < range.end && range.start < other.end
        });
    if overlaps {
        return Err(Error::OutOfRange);
    }

    Ok(())
}

/// Writes `payload` at `address`, records it in `slot` and stores the header. An existing profile
/// in the same slot is replaced.
pub fn install<T: Platform>(
    hal: &mut T,
    headers: &mut HeaderStore,
    slot: u8,
    address: u16,
    payload: &[u8],
) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("install profile {}: @{:#x} [{}]", slot, address, payload.len());

    let index = check_slot(slot)?;
    headers.require_valid()?;
    let len = u16::try_from(payload.len()).map_err(|_| Error::OutOfRange)?;
    let range = address as usize..address as usize + payload.len();
    check_space(headers, hal.capacity(), slot, &range)?;

    let crc = crc32(payload);
    write_chunked(hal, address, payload)?;

    let header = headers.header_mut();
    header.profiles[index] = ProfileDescriptor { address, len, crc };
    header.profile_mask |= 1 << slot;
    headers.commit(hal)
}

/// Reads the payload of `slot` and compares its CRC-32 with the descriptor.
pub fn verify<T: Platform>(hal: &mut T, headers: &HeaderStore, slot: u8) -> Result<(), Error> {
    read(hal, headers, slot).map(|_| ())
}

/// Returns the CRC-verified payload of `slot`.
pub fn read<T: Platform>(hal: &mut T, headers: &HeaderStore, slot: u8) -> Result<Vec<u8>, Error> {
    #[cfg(feature = "defmt")]
    trace!("read profile {}", slot);

    let descriptor = used_descriptor(headers, slot)?;
    let mut buf = try_buffer(descriptor.len as usize)?;
    read_exact(hal, descriptor.address, &mut buf)?;

    if crc32(&buf) != descriptor.crc {
        #[cfg(feature = "defmt")]
        warn!("profile {} crc mismatch", slot);
        return Err(Error::IntegrityMismatch(Record::Profile(slot)));
    }

    Ok(buf)
}

/// Reads the name prefix of the profile in `slot`. The payload itself isn't verified.
pub fn name<T: Platform>(hal: &mut T, headers: &HeaderStore, slot: u8) -> Result<String, Error> {
    let descriptor = used_descriptor(headers, slot)?;
    let mut buf = [0u8; PROFILE_NAME_SIZE];
    let len = PROFILE_NAME_SIZE.min(descriptor.len as usize);
    read_exact(hal, descriptor.address, &mut buf[..len])?;

    let end = buf[..len].iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Clears the descriptor and the bitmask bit of `slot` and stores the header. The payload bytes
/// stay on the device, the slot keeps its address for the next profile. Removing an unused slot
/// is a no-op.
pub fn remove<T: Platform>(hal: &mut T, headers: &mut HeaderStore, slot: u8) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("remove profile {}", slot);

    let index = check_slot(slot)?;
    if !headers.require_valid()?.is_profile_used(slot) {
        return Ok(());
    }

    let header = headers.header_mut();
    header.profile_mask &= !(1 << slot);
    header.profiles[index].len = 0;
    header.profiles[index].crc = 0;
    headers.commit(hal)
}

/// Finds room for a profile of `len` bytes: the first unused slot and the first page aligned
/// address behind the payloads of all used slots.
pub fn allocate<T: Platform>(hal: &T, headers: &HeaderStore, len: usize) -> Result<(u8, u16), Error> {
    let header = headers.require_valid()?;

    let slot = (0..PROFILE_SLOTS as u8)
        .find(|&slot| !header.is_profile_used(slot))
        .ok_or(Error::OutOfRange)?;

    let end_of_used = header
        .profiles()
        .map(|(_, descriptor)| descriptor.range().end)
        .max()
        .unwrap_or(PROFILE_REGION_START as usize);
    let address = T::align_page_ceil(end_of_used);

    if len == 0 || address + len > hal.capacity() {
        return Err(Error::OutOfRange);
    }

    Ok((slot, address as u16))
}
