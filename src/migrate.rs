//! Conversion of records written with an older data format.
//!
//! Only the first on-device schema exists so far, hence there is nothing to convert from yet.
//! Every request fails with [`Error::Unimplemented`] instead of handing back the input, which
//! would be misread with the current layout.

use crate::config::Configuration;
use crate::error::Error;
use crate::header::{DataVersion, Header};
use crate::raw::{CONFIG_SIZE, HEADER_SIZE};

/// A CRC-valid header whose data version isn't compatible with the current layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyHeader {
    pub version: DataVersion,
    pub bytes: [u8; HEADER_SIZE],
}

/// A configuration record written alongside a header of an older data version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyConfig {
    pub version: DataVersion,
    pub bytes: [u8; CONFIG_SIZE],
}

pub fn migrate_header(old: &LegacyHeader) -> Result<Header, Error> {
    Err(unimplemented(old.version))
}

pub fn migrate_config(old: &LegacyConfig) -> Result<Configuration, Error> {
    Err(unimplemented(old.version))
}

fn unimplemented(version: DataVersion) -> Error {
    Error::Unimplemented {
        major: version.major,
        median: version.median,
        minor: version.minor,
    }
}
