use embedded_storage::nor_flash::NorFlashErrorKind;
use thiserror::Error;

/// The record whose checksum (or index) failed to validate.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Record {
    Header,
    Configuration,
    /// The profile bitmask and the descriptor lengths of a header disagree.
    ProfileIndex,
    /// Payload of the DSP profile in the given slot.
    Profile(u8),
}

/// Condensed form of the error reported by the transport.
#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportErrorKind {
    NotAligned,
    OutOfBounds,
    Other,
}

impl From<NorFlashErrorKind> for TransportErrorKind {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => TransportErrorKind::NotAligned,
            NorFlashErrorKind::OutOfBounds => TransportErrorKind::OutOfBounds,
            _ => TransportErrorKind::Other,
        }
    }
}

/// Errors that can occur during EEPROM operations. None of them is recovered from automatically,
/// except for an invalid header when the store was opened with `OpenMode::ForceDefault`.
#[derive(Error, Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A buffer for a profile payload could not be allocated.
    #[error("allocation failure")]
    AllocationFailure,

    /// The transport reported an error while reading.
    #[error("read failure at {address:#06x}: {kind}")]
    ReadFailure {
        address: u16,
        kind: TransportErrorKind,
    },

    /// The transport reported an error while writing. `offset` is the position inside the payload
    /// at which the failed page write started, everything before it has been written already.
    /// The record must be considered corrupt until it is written again in full.
    #[error("write failure at {address:#06x} (payload offset {offset}): {kind}")]
    WriteFailure {
        address: u16,
        offset: u16,
        kind: TransportErrorKind,
    },

    /// The computed checksum differs from the stored one.
    #[error("integrity mismatch: {0}")]
    IntegrityMismatch(Record),

    /// A slot, address or length violates the capacity of the device or the profile table.
    #[error("out of range")]
    OutOfRange,

    /// The profile slot does not hold a profile.
    #[error("profile slot {0} is empty")]
    EmptySlot(u8),

    /// The device geometry doesn't fit the record layout: the page size has to divide the header
    /// and configuration regions and the device has to hold both of them.
    #[error("invalid device geometry")]
    InvalidGeometry,

    /// No migration path exists from the reported data version.
    #[error("no migration from data version {major}.{median}.{minor}")]
    Unimplemented { major: u8, median: u8, minor: u8 },
}

impl Error {
    /// Both read and write failures originate from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::ReadFailure { .. } | Error::WriteFailure { .. })
    }
}
