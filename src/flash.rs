//! Blocking flash driver for one bank.

use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};

use crate::bank::{BankId, BankLayout};
use crate::low_level;
use crate::regs::{FlashRegs, MmioRegs, SR_BSY, SR_QW};
use crate::{Config, Error, ERASED_BYTE, READ_SIZE, SECTOR_SIZE, WRITE_SIZE};

/// Internal flash driver for one bank.
///
/// All erase/program entry points run the whole unlock → operate → re-lock
/// sequence inside a single critical section, so interrupt handlers cannot
/// reach the controller while an operation is in flight, and the bank is
/// re-locked (and interrupts restored) on every exit path, including errors
/// and timeouts.
///
/// NOTE: offsets passed to the blocking methods are relative to the start of
/// *this bank*, not to the start of flash. To touch address `0x0810_1234` go
/// through the bank 2 driver with offset `0x1234`.
pub struct Flash<R: FlashRegs> {
    regs: R,
    layout: BankLayout,
    poll_limit: u32,
}

impl Flash<MmioRegs> {
    /// Create a driver for one on-chip bank.
    ///
    /// # Safety
    ///
    /// The caller must guarantee this is the only live driver for `bank` and
    /// that nothing else touches the bank's register block or flash array
    /// while it exists.
    pub const unsafe fn new(bank: BankId, config: Config) -> Self {
        Self {
            regs: MmioRegs::new(bank.regs_base()),
            layout: bank.layout(),
            poll_limit: config.poll_limit,
        }
    }
}

impl<R: FlashRegs> Flash<R> {
    /// Create a driver over an arbitrary register file and geometry.
    ///
    /// This is the seam host tests use to run the driver against a simulated
    /// bank; hardware users want `Flash::<MmioRegs>::new`.
    pub const fn with_regs(regs: R, layout: BankLayout, config: Config) -> Self {
        Self {
            regs,
            layout,
            poll_limit: config.poll_limit,
        }
    }

    /// Geometry of the bank this driver controls.
    pub const fn layout(&self) -> BankLayout {
        self.layout
    }

    /// Whether the controller currently reports an operation in flight.
    pub fn is_busy(&self) -> bool {
        self.regs.sr() & (SR_BSY | SR_QW) != 0
    }

    /// Blocking read.
    pub fn blocking_read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error> {
        if !self.layout.contains(offset, bytes.len() as u32) {
            return Err(Error::Size);
        }

        let mut address = self.layout.base + offset;
        for byte in bytes.iter_mut() {
            let word = self.regs.read_flash(address & !3);
            *byte = (word >> ((address & 3) * 8)) as u8;
            address += 1;
        }
        Ok(())
    }

    /// Blocking write of whole flash words.
    ///
    /// `offset` and `bytes.len()` must be multiples of [`WRITE_SIZE`]; the
    /// target range must have been erased. The first failing flash word
    /// aborts the remaining ones.
    pub fn blocking_write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        if !self.layout.contains(offset, bytes.len() as u32) {
            return Err(Error::Size);
        }
        if offset % WRITE_SIZE as u32 != 0 || bytes.len() % WRITE_SIZE != 0 {
            return Err(Error::Unaligned);
        }

        let mut address = self.layout.base + offset;
        trace!("Programming {} bytes at 0x{:x}", bytes.len(), address);

        self.with_unlocked(|regs, poll_limit| {
            for chunk in bytes.chunks_exact(WRITE_SIZE) {
                low_level::program_flash_word(regs, address, chunk, poll_limit)?;
                address += WRITE_SIZE as u32;
            }
            Ok(())
        })
    }

    /// Blocking write that pads the final partial flash word with the erased
    /// pattern, so callers need not size buffers to the write granularity.
    pub fn blocking_write_padded(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        let padded_len = bytes.len().div_ceil(WRITE_SIZE) * WRITE_SIZE;
        if !self.layout.contains(offset, padded_len as u32) {
            return Err(Error::Size);
        }
        if offset % WRITE_SIZE as u32 != 0 {
            return Err(Error::Unaligned);
        }

        let mut address = self.layout.base + offset;

        self.with_unlocked(|regs, poll_limit| {
            for chunk in bytes.chunks(WRITE_SIZE) {
                let mut word = [ERASED_BYTE; WRITE_SIZE];
                word[..chunk.len()].copy_from_slice(chunk);
                low_level::program_flash_word(regs, address, &word, poll_limit)?;
                address += WRITE_SIZE as u32;
            }
            Ok(())
        })
    }

    /// Blocking erase of `count` sectors starting at sector `first`.
    ///
    /// The bank must be idle before the first sector is started; the first
    /// failing sector aborts the remaining ones.
    pub fn blocking_erase_sectors(&mut self, first: u32, count: u32) -> Result<(), Error> {
        if count == 0 || first.checked_add(count).map_or(true, |end| end > self.layout.sectors) {
            return Err(Error::Size);
        }

        self.with_unlocked(|regs, poll_limit| {
            low_level::wait_ready(regs, poll_limit)?;

            for sector in first..first + count {
                trace!("Erasing sector {}", sector);
                low_level::erase_sector(regs, sector, poll_limit)?;
            }
            Ok(())
        })
    }

    /// Blocking erase of the sectors covering `[from, to)`.
    ///
    /// Both offsets must be sector aligned.
    pub fn blocking_erase(&mut self, from: u32, to: u32) -> Result<(), Error> {
        if from % self.layout.sector_size != 0 || to % self.layout.sector_size != 0 || from >= to {
            return Err(Error::Unaligned);
        }

        let first = self.layout.sector_index(from);
        let count = self.layout.sector_index(to) - first;
        trace!("Erasing from 0x{:x} to 0x{:x}", self.layout.base + from, self.layout.base + to);
        self.blocking_erase_sectors(first, count)
    }

    /// Run `f` with the bank unlocked, inside one critical section.
    ///
    /// The bank is re-locked whatever `f` returns; a lock verification
    /// failure outranks the operation's own error because it means the
    /// hardware was left writable.
    fn with_unlocked(
        &mut self,
        f: impl FnOnce(&R, u32) -> Result<(), Error>,
    ) -> Result<(), Error> {
        critical_section::with(|_| {
            low_level::unlock(&self.regs)?;
            let result = f(&self.regs, self.poll_limit);
            low_level::lock(&self.regs).and(result)
        })
    }
}

impl<R: FlashRegs> ErrorType for Flash<R> {
    type Error = Error;
}

impl<R: FlashRegs> ReadNorFlash for Flash<R> {
    const READ_SIZE: usize = READ_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Error> {
        self.blocking_read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.layout.size() as usize
    }
}

impl<R: FlashRegs> NorFlash for Flash<R> {
    const WRITE_SIZE: usize = WRITE_SIZE;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        self.blocking_write(offset, bytes)
    }

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Error> {
        self.blocking_erase(from, to)
    }
}
