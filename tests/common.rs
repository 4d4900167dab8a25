#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use audio_eeprom::platform::Eeprom;
use embedded_hal::delay::DelayNs;
use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

// ST M95256
pub const CAPACITY: usize = 32 * 1024;
pub const PAGE_SIZE: usize = 64;
pub const WRITE_CYCLE_NS: u32 = 5_000_000;

#[derive(Default)]
pub struct MockEeprom {
    pub buf: Vec<u8>,
    /// Number of transport operations (reads and page writes) that succeed before every further
    /// one fails. Delays never fail.
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Delay { ns: u32 },
}

impl MockEeprom {
    /// A blank device as shipped, every byte 0xFF.
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0xffu8; capacity],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::new()
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn transport_operations(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| !matches!(op, Operation::Delay { .. }))
            .count()
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn flip_bit(&mut self, address: usize, bit: u8) {
        self.buf[address] ^= 1 << bit;
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn fault(&self) -> bool {
        if self.transport_operations() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return true;
        }
        false
    }
}

#[derive(Debug)]
pub struct EepromError;

impl NorFlashError for EepromError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for MockEeprom {
    type Error = EepromError;
}

impl ReadNorFlash for MockEeprom {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: read:  0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        if self.fault() {
            return Err(EepromError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Eeprom for MockEeprom {
    const PAGE_SIZE: usize = PAGE_SIZE;
    const WRITE_CYCLE_NS: u32 = WRITE_CYCLE_NS;

    fn write_page(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        assert!(!bytes.is_empty());
        // the device wraps around inside the page instead of crossing into the next one
        assert_eq!(
            offset as usize / PAGE_SIZE,
            (offset as usize + bytes.len() - 1) / PAGE_SIZE,
            "page write crosses a page boundary"
        );
        if let Some(Operation::Write { .. }) = self.operations.last() {
            panic!("page write without waiting for the write cycle");
        }

        if self.fault() {
            return Err(EepromError);
        }
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl DelayNs for MockEeprom {
    fn delay_ns(&mut self, ns: u32) {
        self.operations.push(Operation::Delay { ns });
    }
}

/// Same device with a page size that doesn't divide the record layout.
pub struct OddPageEeprom(pub MockEeprom);

impl ErrorType for OddPageEeprom {
    type Error = EepromError;
}

impl ReadNorFlash for OddPageEeprom {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.0.capacity()
    }
}

impl Eeprom for OddPageEeprom {
    const PAGE_SIZE: usize = 48;
    const WRITE_CYCLE_NS: u32 = WRITE_CYCLE_NS;

    fn write_page(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write_page(offset, bytes)
    }
}

impl DelayNs for OddPageEeprom {
    fn delay_ns(&mut self, ns: u32) {
        self.0.delay_ns(ns)
    }
}

/// Expected operations of writing `len` bytes at the page aligned `base`.
pub fn page_writes(base: u32, len: usize) -> Vec<Operation> {
    let mut ops = Vec::new();
    let mut offset = 0;
    while offset < len {
        let chunk = PAGE_SIZE.min(len - offset);
        ops.push(Operation::Write {
            offset: base + offset as u32,
            len: chunk,
        });
        ops.push(Operation::Delay { ns: WRITE_CYCLE_NS });
        offset += chunk;
    }
    ops
}

/// A profile payload starting with a null padded name.
pub fn profile_payload(name: &str, len: usize) -> Vec<u8> {
    let mut payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    payload[..30].fill(0);
    payload[..name.len()].copy_from_slice(name.as_bytes());
    payload
}

/// Recomputes the header CRC after the header bytes were changed in place.
pub fn sign_header(eeprom: &mut MockEeprom) {
    let mut signed = [0u8; 128];
    signed.copy_from_slice(&eeprom.buf[..128]);
    signed[38..40].copy_from_slice(&0xAAAAu16.to_le_bytes());
    let crc = audio_eeprom::crc::crc16(&signed);
    eeprom.buf[38..40].copy_from_slice(&crc.to_le_bytes());
}
