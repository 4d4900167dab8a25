//! The configuration record and its storage. The record carries no checksum of its own, its CRC
//! is kept in the header which therefore has to be loaded first.

use crate::crc::crc16;
use crate::error::{Error, Record};
use crate::header::HeaderStore;
use crate::page_writer::{read_exact, write_chunked};
use crate::platform::Platform;
use crate::raw::{
    CONFIG_ADDRESS, CONFIG_SIZE, CONFIG_TAIL_SIZE, DEVICE_NAME_SIZE, LED_BANKS, POWER_PROFILES,
    RawConfig,
};
use alloc::string::String;
use core::fmt;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

/// Maximum number of UTF-16 code units of the device name.
pub const MAX_NAME_UNITS: usize = DEVICE_NAME_SIZE / 2;

/// User friendly device name, stored as null padded UTF-16LE.
#[derive(Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceName([u8; DEVICE_NAME_SIZE]);

impl DeviceName {
    /// Fails with [`Error::OutOfRange`] if `name` needs more than [`MAX_NAME_UNITS`] UTF-16 code
    /// units or contains a null character, which would end the stored name early.
    pub fn new(name: &str) -> Result<Self, Error> {
        let mut raw = [0u8; DEVICE_NAME_SIZE];
        for (i, unit) in name.encode_utf16().enumerate() {
            if i >= MAX_NAME_UNITS || unit == 0 {
                return Err(Error::OutOfRange);
            }
            raw[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        Ok(Self(raw))
    }

    pub const fn from_raw(raw: [u8; DEVICE_NAME_SIZE]) -> Self {
        Self(raw)
    }

    pub const fn as_bytes(&self) -> &[u8; DEVICE_NAME_SIZE] {
        &self.0
    }

    /// Decodes the name up to the first null unit. Unpaired surrogates are replaced.
    pub fn to_string_lossy(&self) -> String {
        let units = self
            .0
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0);

        char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

impl fmt::Debug for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceName({:?})", self.to_string_lossy())
    }
}

/// Analog equalizer. Gains and filter potentiometers are kept per channel to trim component
/// tolerances.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Equalizer {
    pub bass_gain: u8,
    pub medium_gain_right: u8,
    pub medium_gain_left: u8,
    pub high_gain_right: u8,
    pub high_gain_left: u8,
    pub low_pass_left: u8,
    pub low_pass_right: u8,
    pub high_pass_left: u8,
    pub high_pass_right: u8,
    pub balance: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Dac {
    pub automute_delay: u8,
    pub global_volume: u8,
    pub left_volume: u8,
    pub right_volume: u8,
    pub left_data_path: u8,
    pub right_data_path: u8,
    /// -6 dB of analog attenuation when not zero. The byte is kept as stored, see
    /// [`Dac::left_attenuated`].
    pub left_attenuation: u8,
    pub right_attenuation: u8,
}

impl Dac {
    pub fn left_attenuated(&self) -> bool {
        self.left_attenuation != 0
    }

    pub fn right_attenuated(&self) -> bool {
        self.right_attenuation != 0
    }

    pub fn set_left_attenuated(&mut self, on: bool) {
        self.left_attenuation = on as u8;
    }

    pub fn set_right_attenuated(&mut self, on: bool) {
        self.right_attenuation = on as u8;
    }
}

/// Potentiometer values limiting the output power of each amplifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AmplifierLimits {
    pub bass: u8,
    pub left: u8,
    pub right: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedBank {
    pub brightness: u8,
    pub max_brightness: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapacitiveSensor {
    pub threshold: u8,
    pub sensitivity: u8,
}

/// Voltage or current as an integer part plus a number of fractional steps: 20 mV for voltages,
/// 50 mA for currents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PdQuantity {
    pub integer: u8,
    pub steps: u8,
}

/// USB-C power delivery object requested from the source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerProfile {
    pub voltage: PdQuantity,
    pub current: PdQuantity,
    /// Programmable power supply when not zero
    pub pps: u8,
}

impl PowerProfile {
    pub fn millivolts(&self) -> u32 {
        self.voltage.integer as u32 * 1000 + self.voltage.steps as u32 * 20
    }

    pub fn milliamps(&self) -> u32 {
        self.current.integer as u32 * 1000 + self.current.steps as u32 * 50
    }

    pub fn is_pps(&self) -> bool {
        self.pps != 0
    }

    pub fn set_pps(&mut self, on: bool) {
        self.pps = on as u8;
    }

    fn from_bytes(raw: [u8; 5]) -> Self {
        let [v_int, v_steps, i_int, i_steps, pps] = raw;
        Self {
            voltage: PdQuantity {
                integer: v_int,
                steps: v_steps,
            },
            current: PdQuantity {
                integer: i_int,
                steps: i_steps,
            },
            pps,
        }
    }

    fn to_bytes(self) -> [u8; 5] {
        [
            self.voltage.integer,
            self.voltage.steps,
            self.current.integer,
            self.current.steps,
            self.pps,
        ]
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct ConfigPadding {
    after_dac: u8,
    tail: [u8; CONFIG_TAIL_SIZE],
}

impl Default for ConfigPadding {
    fn default() -> Self {
        Self {
            after_dac: 0,
            tail: [0; CONFIG_TAIL_SIZE],
        }
    }
}

/// Device settings. The record is always read and written as a whole, partial updates are done
/// by the caller in memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Configuration {
    pub name: DeviceName,
    pub equalizer: Equalizer,
    pub dac: Dac,
    pub amplifiers: AmplifierLimits,
    /// Back, top 1, top 2, top 3
    pub leds: [LedBank; LED_BANKS],
    pub capacitive: CapacitiveSensor,
    pub power_profiles: [PowerProfile; POWER_PROFILES],
    pub(crate) padding: ConfigPadding,
}

impl Default for Configuration {
    /// The compiled-in factory configuration.
    fn default() -> Self {
        let led = LedBank {
            brightness: 0xC0,
            max_brightness: 0xFF,
        };
        let mut name = [0u8; DEVICE_NAME_SIZE];
        for (i, &c) in b"WIRELESS SPEAKER !".iter().enumerate() {
            name[i * 2] = c;
        }

        Self {
            name: DeviceName(name),
            equalizer: Equalizer {
                bass_gain: 0x80,
                medium_gain_right: 0x80,
                medium_gain_left: 0x80,
                high_gain_right: 0x80,
                high_gain_left: 0x80,
                low_pass_left: 0x20,
                low_pass_right: 0x20,
                high_pass_left: 0x20,
                high_pass_right: 0x20,
                balance: 0x00,
            },
            dac: Dac {
                automute_delay: 0x04,
                global_volume: 0x30,
                left_volume: 0x30,
                right_volume: 0x30,
                left_data_path: 0x01,
                right_data_path: 0x01,
                left_attenuation: 0,
                right_attenuation: 0,
            },
            amplifiers: AmplifierLimits {
                bass: 0xFF,
                left: 0xFF,
                right: 0xFF,
            },
            leds: [led; LED_BANKS],
            capacitive: CapacitiveSensor {
                threshold: 0x04,
                sensitivity: 0x03,
            },
            power_profiles: [
                PowerProfile {
                    voltage: PdQuantity {
                        integer: 20,
                        steps: 0,
                    },
                    current: PdQuantity {
                        integer: 5,
                        steps: 0,
                    },
                    pps: 0,
                },
                PowerProfile {
                    voltage: PdQuantity {
                        integer: 20,
                        steps: 0,
                    },
                    current: PdQuantity {
                        integer: 3,
                        steps: 6,
                    },
                    pps: 0,
                },
            ],
            padding: ConfigPadding::default(),
        }
    }
}

impl Configuration {
    pub fn to_bytes(&self) -> [u8; CONFIG_SIZE] {
        RawConfig::from(self).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8; CONFIG_SIZE]) -> Self {
        RawConfig::from_bytes(*bytes).into()
    }

    /// CRC-16 over the serialized record, as kept in the header.
    pub fn crc(&self) -> u16 {
        crc16(&self.to_bytes())
    }
}

impl From<RawConfig> for Configuration {
    fn from(raw: RawConfig) -> Self {
        let [
            bass_gain,
            medium_gain_right,
            medium_gain_left,
            high_gain_right,
            high_gain_left,
            low_pass_left,
            low_pass_right,
            high_pass_left,
            high_pass_right,
            balance,
        ] = raw.equalizer;
        let [
            automute_delay,
            global_volume,
            left_volume,
            right_volume,
            left_data_path,
            right_data_path,
            left_attenuation,
            right_attenuation,
        ] = raw.dac;
        let [bass, left, right] = raw.amplifiers;
        let [threshold, sensitivity] = raw.capacitive;
        let leds = raw.leds;
        let power_profiles = raw.power_profiles;

        Configuration {
            name: DeviceName(raw.name),
            equalizer: Equalizer {
                bass_gain,
                medium_gain_right,
                medium_gain_left,
                high_gain_right,
                high_gain_left,
                low_pass_left,
                low_pass_right,
                high_pass_left,
                high_pass_right,
                balance,
            },
            dac: Dac {
                automute_delay,
                global_volume,
                left_volume,
                right_volume,
                left_data_path,
                right_data_path,
                left_attenuation,
                right_attenuation,
            },
            amplifiers: AmplifierLimits { bass, left, right },
            leds: leds.map(|[brightness, max_brightness]| LedBank {
                brightness,
                max_brightness,
            }),
            capacitive: CapacitiveSensor {
                threshold,
                sensitivity,
            },
            power_profiles: power_profiles.map(PowerProfile::from_bytes),
            padding: ConfigPadding {
                after_dac: raw._reserved0,
                tail: raw._reserved1,
            },
        }
    }
}

impl From<&Configuration> for RawConfig {
    fn from(config: &Configuration) -> Self {
        let eq = &config.equalizer;
        let dac = &config.dac;

        RawConfig {
            name: config.name.0,
            equalizer: [
                eq.bass_gain,
                eq.medium_gain_right,
                eq.medium_gain_left,
                eq.high_gain_right,
                eq.high_gain_left,
                eq.low_pass_left,
                eq.low_pass_right,
                eq.high_pass_left,
                eq.high_pass_right,
                eq.balance,
            ],
            dac: [
                dac.automute_delay,
                dac.global_volume,
                dac.left_volume,
                dac.right_volume,
                dac.left_data_path,
                dac.right_data_path,
                dac.left_attenuation,
                dac.right_attenuation,
            ],
            _reserved0: config.padding.after_dac,
            amplifiers: [
                config.amplifiers.bass,
                config.amplifiers.left,
                config.amplifiers.right,
            ],
            leds: config
                .leds
                .map(|led| [led.brightness, led.max_brightness]),
            capacitive: [config.capacitive.threshold, config.capacitive.sensitivity],
            power_profiles: config.power_profiles.map(PowerProfile::to_bytes),
            _reserved1: config.padding.tail,
        }
    }
}

/// Reads the configuration and checks it against the CRC of the cached header. A mismatch is
/// always reported, falling back to [`Configuration::default`] is up to the caller.
pub fn read<T: Platform>(hal: &mut T, headers: &HeaderStore) -> Result<Configuration, Error> {
    #[cfg(feature = "defmt")]
    trace!("read config: @{:#x}", CONFIG_ADDRESS);

    let expected = headers.require_valid()?.config_crc();

    let mut buf = [0u8; CONFIG_SIZE];
    read_exact(hal, CONFIG_ADDRESS, &mut buf)?;

    let computed = crc16(&buf);
    if computed != expected {
        #[cfg(feature = "defmt")]
        warn!(
            "config crc mismatch: header {:#x}, computed {:#x}",
            expected, computed
        );
        return Err(Error::IntegrityMismatch(Record::Configuration));
    }

    Ok(Configuration::from_bytes(&buf))
}

/// Writes the configuration. The header is stored first with the new configuration CRC, so an
/// interruption in between leaves a header that rejects the old configuration bytes instead of
/// accepting half written ones.
pub fn write<T: Platform>(
    hal: &mut T,
    headers: &mut HeaderStore,
    config: &Configuration,
) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("write config: @{:#x}", CONFIG_ADDRESS);

    headers.require_valid()?;
    let bytes = config.to_bytes();
    headers.set_config_crc(crc16(&bytes));
    headers.commit(hal)?;

    write_chunked(hal, CONFIG_ADDRESS, &bytes)
}
