use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::ReadNorFlash;

/// A byte addressable EEPROM with page granular writes, e.g. the ST M95256.
///
/// Reads come from [`ReadNorFlash`] and may span any number of pages. Writes are handed to
/// [`Eeprom::write_page`] one page at a time and must be followed by a wait of
/// [`Eeprom::WRITE_CYCLE_NS`] before the device accepts the next command.
pub trait Eeprom: ReadNorFlash {
    /// Bytes per physical write unit.
    const PAGE_SIZE: usize;

    /// Minimum wait after a page write before the next transport operation.
    const WRITE_CYCLE_NS: u32;

    /// Writes `bytes` at `offset`. The range never crosses a page boundary.
    fn write_page(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error>;
}

impl<T: Eeprom> Eeprom for &mut T {
    const PAGE_SIZE: usize = T::PAGE_SIZE;
    const WRITE_CYCLE_NS: u32 = T::WRITE_CYCLE_NS;

    fn write_page(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        T::write_page(self, offset, bytes)
    }
}

/// See README.md for an example implementation.
pub trait Platform: Eeprom + DelayNs {}

impl<T: Eeprom + DelayNs> Platform for T {}

pub trait PageOps: Platform {
    /// Number of bytes left in the page containing `address`.
    fn page_remaining(address: usize) -> usize {
        Self::PAGE_SIZE - address % Self::PAGE_SIZE
    }

    fn align_page_ceil(size: usize) -> usize {
        align_ceil(size, Self::PAGE_SIZE)
    }

    fn is_page_aligned(address: usize) -> bool {
        address.is_multiple_of(Self::PAGE_SIZE)
    }
}

#[inline(always)]
const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

impl<T: Platform> PageOps for T {}
