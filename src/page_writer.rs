use crate::error::{Error, TransportErrorKind};
use crate::platform::{PageOps, Platform};
use core::cmp;
#[cfg(feature = "defmt")]
use defmt::trace;
use embedded_storage::nor_flash::NorFlashError;

/// Reads `buf.len()` bytes starting at `address` with a single transport request. Only writes are
/// page constrained.
pub(crate) fn read_exact<T: Platform>(
    hal: &mut T,
    address: u16,
    buf: &mut [u8],
) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("read_exact @{:#x}: [{}]", address, buf.len());

    if address as usize + buf.len() > hal.capacity() {
        return Err(Error::OutOfRange);
    }

    hal.read(address as u32, buf)
        .map_err(|e| Error::ReadFailure {
            address,
            kind: TransportErrorKind::from(e.kind()),
        })
}

/// Writes `payload` at `base` one page at a time and waits for the write cycle of the device after
/// every page. A page write never crosses a page boundary, so an unaligned `base` results in a
/// shorter first chunk.
///
/// The first failing page aborts the operation. Pages written before are not rolled back, the
/// caller has to treat the record as corrupt until it is written again in full.
pub fn write_chunked<T: Platform>(hal: &mut T, base: u16, payload: &[u8]) -> Result<(), Error> {
    #[cfg(feature = "defmt")]
    trace!("write_chunked @{:#x}: [{}]", base, payload.len());

    if base as usize + payload.len() > hal.capacity() {
        return Err(Error::OutOfRange);
    }

    let mut offset = 0;
    while offset < payload.len() {
        let address = base as usize + offset;
        let chunk = cmp::min(T::page_remaining(address), payload.len() - offset);

        hal.write_page(address as u32, &payload[offset..offset + chunk])
            .map_err(|e| Error::WriteFailure {
                address: address as u16,
                offset: offset as u16,
                kind: TransportErrorKind::from(e.kind()),
            })?;
        hal.delay_ns(T::WRITE_CYCLE_NS);

        offset += chunk;
    }

    Ok(())
}
