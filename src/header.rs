use crate::error::{Error, Record};
use crate::migrate::{self, LegacyHeader};
use crate::page_writer::{read_exact, write_chunked};
use crate::platform::Platform;
use crate::profile::ProfileDescriptor;
use crate::raw::{
    HEADER_ADDRESS, HEADER_SIZE, PROFILE_REGION_START, PROFILE_SLOTS, RawHeader,
    RawProfileDescriptor, TIMESTAMP_SIZE, header_checksum, stored_header_crc,
};
use core::fmt;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Data format revision `major.median.minor`. Only a change of `major` breaks the layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataVersion {
    pub major: u8,
    pub median: u8,
    pub minor: u8,
}

impl DataVersion {
    pub const CURRENT: DataVersion = DataVersion {
        major: 1,
        median: 0,
        minor: 0,
    };

    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

/// Hardware or bill-of-materials revision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Revision {
    pub major: u8,
    pub minor: u8,
}

/// Calendar timestamp as kept by the header. The year is split into century and year of century
/// (`19`, `70` for 1970).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    pub century: u8,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    /// 1970-01-01 00:00:01, the factory value.
    pub const EPOCH: Timestamp = Timestamp {
        century: 19,
        year: 70,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 1,
    };

    /// Years past 25599 don't fit the century byte and are clamped to it.
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = if year > Self::MAX_YEAR {
            Self::MAX_YEAR
        } else {
            year
        };
        Self {
            century: (year / 100) as u8,
            year: (year % 100) as u8,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub const MAX_YEAR: u16 = 255 * 100 + 99;

    pub fn full_year(&self) -> u16 {
        self.century as u16 * 100 + self.year as u16
    }

    fn from_bytes(raw: [u8; TIMESTAMP_SIZE]) -> Self {
        let [century, year, month, day, hour, minute, second] = raw;
        Self {
            century,
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    fn to_bytes(self) -> [u8; TIMESTAMP_SIZE] {
        [
            self.century,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }
}

/// Serial number made of two ASCII letters followed by six ASCII digits, e.g. `SP000042`.
#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialNumber(pub [u8; 8]);

impl SerialNumber {
    /// Usage: `SerialNumber::new(*b"SP", 42)`. Numbers above 999999 are truncated to six digits.
    pub const fn new(letters: [u8; 2], number: u32) -> Self {
        let mut raw = [letters[0], letters[1], b'0', b'0', b'0', b'0', b'0', b'0'];
        let mut rest = number % 1_000_000;
        let mut i = 7;
        while i >= 2 {
            raw[i] = b'0' + (rest % 10) as u8;
            rest /= 10;
            i -= 1;
        }
        Self(raw)
    }

    pub fn letters(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }

    /// Returns `None` if the digit part contains anything but ASCII digits.
    pub fn number(&self) -> Option<u32> {
        self.0[2..].iter().try_fold(0u32, |acc, &digit| {
            digit
                .is_ascii_digit()
                .then(|| acc * 10 + (digit - b'0') as u32)
        })
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber(\"")?;
        for &byte in &self.0 {
            write!(f, "{}", core::ascii::escape_default(byte))?;
        }
        write!(f, "\")")
    }
}

/// Reserved bytes of the header. They are zero on every device written by this crate, but are
/// carried along so that a header read from a device is written back unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct HeaderPadding {
    leading: u8,
    after_serial: [u8; 8],
    after_crc: [u8; 8],
    after_mask: [u8; 13],
}

/// Identity, versioning and integrity information stored at the very start of the EEPROM.
///
/// The profile index (bitmask and descriptors) and both CRCs are owned by the store and can only
/// be changed through the profile and configuration operations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub(crate) data_version: DataVersion,
    pub last_write: Timestamp,
    pub hardware_version: Revision,
    pub bom_version: Revision,
    pub serial: SerialNumber,
    pub production: Timestamp,
    pub(crate) crc: u16,
    pub(crate) config_crc: u16,
    pub(crate) profile_mask: u8,
    pub(crate) profiles: [ProfileDescriptor; PROFILE_SLOTS],
    pub(crate) padding: HeaderPadding,
}

impl Default for Header {
    /// The compiled-in factory header. Its CRC field is only filled in when it is stored.
    fn default() -> Self {
        let mut profiles = [ProfileDescriptor::EMPTY; PROFILE_SLOTS];
        profiles[0].address = PROFILE_REGION_START;

        Self {
            data_version: DataVersion::CURRENT,
            last_write: Timestamp::EPOCH,
            hardware_version: Revision { major: 1, minor: 0 },
            bom_version: Revision { major: 1, minor: 0 },
            serial: SerialNumber(*b"SP000000"),
            production: Timestamp::EPOCH,
            crc: 0,
            config_crc: 0,
            profile_mask: 0,
            profiles,
            padding: HeaderPadding::default(),
        }
    }
}

impl Header {
    /// Layout version of the records on the device. Only set from the factory default or a loaded
    /// header.
    pub fn data_version(&self) -> DataVersion {
        self.data_version
    }

    /// CRC-16 of the header as last stored or loaded.
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// CRC-16 of the configuration record this header vouches for.
    pub fn config_crc(&self) -> u16 {
        self.config_crc
    }

    /// Bit `n` is set when profile slot `n` is in use.
    pub fn profile_mask(&self) -> u8 {
        self.profile_mask
    }

    pub fn profile(&self, slot: u8) -> Option<&ProfileDescriptor> {
        self.profiles.get(slot as usize)
    }

    /// Iterates over the used profile slots.
    pub fn profiles(&self) -> impl Iterator<Item = (u8, &ProfileDescriptor)> {
        self.profiles
            .iter()
            .enumerate()
            .filter(|&(slot, _)| self.profile_mask & (1u8 << slot) != 0)
            .map(|(slot, descriptor)| (slot as u8, descriptor))
    }

    pub fn is_profile_used(&self, slot: u8) -> bool {
        (slot as usize) < PROFILE_SLOTS && self.profile_mask & (1u8 << slot) != 0
    }

    /// The bitmask and the descriptor lengths have to agree: a slot is in use iff its length is
    /// not zero.
    pub fn profile_index_is_consistent(&self) -> bool {
        self.profiles
            .iter()
            .enumerate()
            .all(|(slot, descriptor)| (self.profile_mask & (1u8 << slot) != 0) == (descriptor.len != 0))
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        RawHeader::from(self).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        RawHeader::from_bytes(*bytes).into()
    }

    /// Returns a copy with the CRC field computed over the record, the field itself being
    /// replaced by the sentinel during the computation.
    pub(crate) fn signed(mut self) -> Self {
        self.crc = header_checksum(&self.to_bytes());
        self
    }
}

impl From<RawHeader> for Header {
    fn from(raw: RawHeader) -> Self {
        let [major, median, minor] = raw.data_version;
        let [hw_major, hw_minor] = raw.hardware_version;
        let [bom_major, bom_minor] = raw.bom_version;
        let raw_profiles = raw.profiles;

        Header {
            data_version: DataVersion {
                major,
                median,
                minor,
            },
            last_write: Timestamp::from_bytes(raw.last_write),
            hardware_version: Revision {
                major: hw_major,
                minor: hw_minor,
            },
            bom_version: Revision {
                major: bom_major,
                minor: bom_minor,
            },
            serial: SerialNumber(raw.serial),
            production: Timestamp::from_bytes(raw.production),
            crc: u16::from_le_bytes(raw.header_crc),
            config_crc: u16::from_le_bytes(raw.config_crc),
            profile_mask: raw.profile_mask,
            profiles: raw_profiles.map(ProfileDescriptor::from),
            padding: HeaderPadding {
                leading: raw._reserved0,
                after_serial: raw._reserved1,
                after_crc: raw._reserved2,
                after_mask: raw._reserved3,
            },
        }
    }
}

impl From<&Header> for RawHeader {
    fn from(header: &Header) -> Self {
        let version = header.data_version;

        RawHeader {
            _reserved0: header.padding.leading,
            data_version: [version.major, version.median, version.minor],
            last_write: header.last_write.to_bytes(),
            hardware_version: [header.hardware_version.major, header.hardware_version.minor],
            bom_version: [header.bom_version.major, header.bom_version.minor],
            serial: header.serial.0,
            _reserved1: header.padding.after_serial,
            production: header.production.to_bytes(),
            header_crc: header.crc.to_le_bytes(),
            config_crc: header.config_crc.to_le_bytes(),
            _reserved2: header.padding.after_crc,
            profile_mask: header.profile_mask,
            _reserved3: header.padding.after_mask,
            profiles: header.profiles.map(RawProfileDescriptor::from),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderState {
    /// Nothing has been read from the device yet.
    Unloaded,
    /// The cached header matches the device.
    Valid,
    /// The last load failed validation or the last store did not complete.
    Invalid,
}

/// Owns the cached header between loading it from the device and storing it back.
pub struct HeaderStore {
    header: Header,
    state: HeaderState,
}

impl HeaderStore {
    pub(crate) fn new() -> Self {
        Self {
            header: Header::default(),
            state: HeaderState::Unloaded,
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    /// The cached header. Only meaningful in state [`HeaderState::Valid`].
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Fails with [`Record::Header`] unless the cache reflects a validated device header.
    pub(crate) fn require_valid(&self) -> Result<&Header, Error> {
        match self.state {
            HeaderState::Valid => Ok(&self.header),
            _ => Err(Error::IntegrityMismatch(Record::Header)),
        }
    }

    /// Reads the header from the device and verifies its CRC. A header with a foreign data
    /// version is handed to the schema migration.
    pub fn load<T: Platform>(&mut self, hal: &mut T) -> Result<Header, Error> {
        #[cfg(feature = "defmt")]
        trace!("load header: @{:#x}", HEADER_ADDRESS);

        let mut buf = [0u8; HEADER_SIZE];
        read_exact(hal, HEADER_ADDRESS, &mut buf)?;

        let stored = stored_header_crc(&buf);
        let computed = header_checksum(&buf);
        if stored != computed {
            #[cfg(feature = "defmt")]
            warn!(
                "header crc mismatch: stored {:#x}, computed {:#x}",
                stored, computed
            );
            self.state = HeaderState::Invalid;
            return Err(Error::IntegrityMismatch(Record::Header));
        }

        let mut header = Header::from_bytes(&buf);
        if !header.data_version.is_compatible() {
            self.state = HeaderState::Invalid;
            header = migrate::migrate_header(&LegacyHeader {
                version: header.data_version,
                bytes: buf,
            })?;
        }

        if !header.profile_index_is_consistent() {
            #[cfg(feature = "defmt")]
            warn!("header profile index inconsistent: mask {:#x}", header.profile_mask);
            self.state = HeaderState::Invalid;
            return Err(Error::IntegrityMismatch(Record::ProfileIndex));
        }

        self.header = header;
        self.state = HeaderState::Valid;
        Ok(header)
    }

    /// Signs `header` and writes it page by page. The cache is replaced even if the write fails,
    /// in which case the state becomes [`HeaderState::Invalid`] as the device now holds a partial
    /// record.
    pub fn store<T: Platform>(&mut self, hal: &mut T, header: Header) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("store header: @{:#x}", HEADER_ADDRESS);

        let header = header.signed();
        self.header = header;

        match write_chunked(hal, HEADER_ADDRESS, &header.to_bytes()) {
            Ok(()) => {
                self.state = HeaderState::Valid;
                Ok(())
            }
            Err(e) => {
                self.state = HeaderState::Invalid;
                Err(e)
            }
        }
    }

    /// Stores the cached header, e.g. after [`HeaderStore::set_config_crc`].
    pub fn commit<T: Platform>(&mut self, hal: &mut T) -> Result<(), Error> {
        let header = self.header;
        self.store(hal, header)
    }

    /// Updates the cache only, a [`HeaderStore::commit`] is required to persist it.
    pub fn set_config_crc(&mut self, crc: u16) {
        self.header.config_crc = crc;
    }

    pub fn config_crc(&self) -> u16 {
        self.header.config_crc
    }
}
