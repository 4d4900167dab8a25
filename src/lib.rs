#![doc = include_str ! ("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod config;
pub mod crc;
pub mod error;
pub mod header;
pub mod migrate;
pub mod page_writer;
pub mod platform;
pub mod profile;
pub mod raw;

extern crate alloc;

pub use config::Configuration;
pub use header::{Header, HeaderState, HeaderStore, Timestamp};
pub use profile::{ProfileDescriptor, ProfileSize};

use crate::error::Error;
use crate::platform::{PageOps, Platform};
use crate::raw::{
    CONFIG_ADDRESS, CONFIG_SIZE, HEADER_SIZE, PROFILE_REGION_START, PROFILE_SLOTS,
};
use alloc::string::String;
use alloc::vec::Vec;
#[cfg(feature = "defmt")]
use defmt::warn;

/// Largest device the 16 bit profile addresses can cover.
const MAX_CAPACITY: usize = 0x1_0000;

/// What to do when the header on the device doesn't validate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Report the integrity error.
    #[default]
    Strict,
    /// Overwrite the device header with the compiled-in default. Meant for factory programming
    /// and recovery, the profile index and configuration CRC of the old header are lost.
    ForceDefault,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProfileStatistics {
    pub used_slots: u8,
    pub free_slots: u8,
    /// Sum of the payload lengths of all used slots.
    pub used_bytes: u32,
    /// Bytes between the end of the last payload and the end of the device.
    pub free_bytes: u32,
}

/// Single owner of an EEPROM holding the header, the configuration and the DSP profiles.
///
/// Every operation blocks until the transport and the device write cycles are done. The header is
/// cached from [`Store::open`] on and is the sole source of truth for the validity of the
/// configuration and the profiles.
pub struct Store<T: Platform> {
    pub(crate) hal: T,
    pub(crate) headers: HeaderStore,
}

impl<T: Platform> Store<T> {
    /// Validates the device geometry and loads the header.
    ///
    /// With [`OpenMode::ForceDefault`] an integrity error of the header is answered by writing
    /// the default header. Failing to write it fails the open. Transport errors while reading
    /// and headers of an unsupported data version are reported in either mode.
    pub fn open(hal: T, mode: OpenMode) -> Result<Store<T>, Error> {
        if T::PAGE_SIZE == 0
            || !HEADER_SIZE.is_multiple_of(T::PAGE_SIZE)
            || !CONFIG_SIZE.is_multiple_of(T::PAGE_SIZE)
            || !T::is_page_aligned(CONFIG_ADDRESS as usize)
        {
            return Err(Error::InvalidGeometry);
        }

        let capacity = hal.capacity();
        if capacity < PROFILE_REGION_START as usize || capacity > MAX_CAPACITY {
            return Err(Error::InvalidGeometry);
        }

        let mut store = Self {
            hal,
            headers: HeaderStore::new(),
        };

        match store.headers.load(&mut store.hal) {
            Ok(_) => Ok(store),
            Err(Error::IntegrityMismatch(_record)) if mode == OpenMode::ForceDefault => {
                #[cfg(feature = "defmt")]
                warn!("invalid header ({}), writing the default one", _record);

                store.headers.store(&mut store.hal, Header::default())?;
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    /// Gives back the transport.
    pub fn release(self) -> T {
        self.hal
    }

    pub fn header(&self) -> &Header {
        self.headers.header()
    }

    pub fn header_state(&self) -> HeaderState {
        self.headers.state()
    }

    /// Reads and validates the header again, e.g. after a failed write.
    pub fn reload_header(&mut self) -> Result<Header, Error> {
        self.headers.load(&mut self.hal)
    }

    /// Changes the identity fields of the cached header and stores it. The data version, the CRCs
    /// and the profile index are maintained by the store and can't be touched here.
    pub fn update_header<F: FnOnce(&mut Header)>(&mut self, f: F) -> Result<(), Error> {
        let mut header = *self.headers.require_valid()?;
        f(&mut header);
        self.headers.store(&mut self.hal, header)
    }

    /// Stamps the cached header. The stamp is persisted with the next header store, i.e. with the
    /// next configuration or profile write.
    pub fn set_last_write(&mut self, timestamp: Timestamp) {
        self.headers.header_mut().last_write = timestamp;
    }

    /// Reads the configuration. An [`Error::IntegrityMismatch`] is reported as is, the caller
    /// decides whether to continue with [`Configuration::default`] or [`Store::reset_config`].
    pub fn read_config(&mut self) -> Result<Configuration, Error> {
        config::read(&mut self.hal, &self.headers)
    }

    pub fn write_config(&mut self, config: &Configuration) -> Result<(), Error> {
        config::write(&mut self.hal, &mut self.headers, config)
    }

    /// Writes the compiled-in default configuration and returns it.
    pub fn reset_config(&mut self) -> Result<Configuration, Error> {
        let config = Configuration::default();
        self.write_config(&config)?;
        Ok(config)
    }

    /// Writes `payload` at `address` and records it in `slot`.
    pub fn install_profile(&mut self, slot: u8, address: u16, payload: &[u8]) -> Result<(), Error> {
        profile::install(&mut self.hal, &mut self.headers, slot, address, payload)
    }

    /// Stores `payload` in the first free slot behind the existing profiles and returns the slot.
    pub fn add_profile(&mut self, payload: &[u8]) -> Result<u8, Error> {
        let (slot, address) = profile::allocate(&self.hal, &self.headers, payload.len())?;
        self.install_profile(slot, address, payload)?;
        Ok(slot)
    }

    pub fn verify_profile(&mut self, slot: u8) -> Result<(), Error> {
        profile::verify(&mut self.hal, &self.headers, slot)
    }

    pub fn read_profile(&mut self, slot: u8) -> Result<Vec<u8>, Error> {
        profile::read(&mut self.hal, &self.headers, slot)
    }

    pub fn profile_name(&mut self, slot: u8) -> Result<String, Error> {
        profile::name(&mut self.hal, &self.headers, slot)
    }

    /// Drops `slot` from the index. The payload bytes are not erased.
    pub fn remove_profile(&mut self, slot: u8) -> Result<(), Error> {
        profile::remove(&mut self.hal, &mut self.headers, slot)
    }

    /// Iterates over the used profile slots.
    pub fn profiles(&self) -> impl Iterator<Item = (u8, &ProfileDescriptor)> {
        self.headers.header().profiles()
    }

    pub fn statistics(&self) -> ProfileStatistics {
        let header = self.headers.header();
        let (used_slots, used_bytes, end_of_used) = header.profiles().fold(
            (0u8, 0u32, PROFILE_REGION_START as usize),
            |(slots, bytes, end), (_, descriptor)| {
                (
                    slots + 1,
                    bytes + descriptor.len as u32,
                    end.max(descriptor.address as usize + descriptor.len as usize),
                )
            },
        );

        ProfileStatistics {
            used_slots,
            free_slots: PROFILE_SLOTS as u8 - used_slots,
            used_bytes,
            free_bytes: self.hal.capacity().saturating_sub(end_of_used) as u32,
        }
    }
}
