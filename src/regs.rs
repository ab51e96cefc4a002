//! Register-level view of one flash bank.
//!
//! The embedded flash controller replicates one register block per bank
//! (KEYR/CR/SR/CCR at fixed offsets). [`FlashRegs`] abstracts that block so
//! the erase/program sequences run unchanged against real hardware
//! ([`MmioRegs`]) or a simulated register file in host tests.

use core::ptr::{read_volatile, write_volatile};

// Register offsets within a bank block (RM0433, section 4.9).
pub(crate) const KEYR_OFFSET: u32 = 0x04;
pub(crate) const CR_OFFSET: u32 = 0x0C;
pub(crate) const SR_OFFSET: u32 = 0x10;
pub(crate) const CCR_OFFSET: u32 = 0x14;

// Unlock key sequence, written to KEYR in this order.
pub(crate) const KEY1: u32 = 0x4567_0123;
pub(crate) const KEY2: u32 = 0xCDEF_89AB;

// Control register bits.
pub(crate) const CR_LOCK: u32 = 1 << 0;
pub(crate) const CR_PG: u32 = 1 << 1;
pub(crate) const CR_SER: u32 = 1 << 2;
pub(crate) const CR_PSIZE: u32 = 0x3 << 4;
pub(crate) const CR_START: u32 = 1 << 7;
pub(crate) const CR_SNB_SHIFT: u32 = 8;
pub(crate) const CR_SNB: u32 = 0x7 << CR_SNB_SHIFT;

// Status register bits. Flags at bit 16 and above are latched and cleared
// by writing 1 to the same position in CCR.
pub(crate) const SR_BSY: u32 = 1 << 0;
pub(crate) const SR_QW: u32 = 1 << 2;
pub(crate) const SR_EOP: u32 = 1 << 16;
pub(crate) const SR_WRPERR: u32 = 1 << 17;
pub(crate) const SR_PGSERR: u32 = 1 << 18;
pub(crate) const SR_STRBERR: u32 = 1 << 19;
pub(crate) const SR_INCERR: u32 = 1 << 21;
pub(crate) const SR_OPERR: u32 = 1 << 22;
pub(crate) const SR_RDPERR: u32 = 1 << 23;
pub(crate) const SR_RDSERR: u32 = 1 << 24;
pub(crate) const SR_DBECCERR: u32 = 1 << 26;

/// Aggregate of every error flag the controller can latch.
pub(crate) const SR_ERRORS: u32 = SR_WRPERR
    | SR_PGSERR
    | SR_STRBERR
    | SR_INCERR
    | SR_OPERR
    | SR_RDPERR
    | SR_RDSERR
    | SR_DBECCERR;

/// Register and memory access for one flash bank.
///
/// Implementations must behave like the hardware: every access is a single,
/// un-cached, un-reordered read or write of the named register, and
/// `read_flash`/`write_flash` touch the memory-mapped flash array itself.
pub trait FlashRegs {
    /// Read the bank control register.
    fn cr(&self) -> u32;
    /// Write the bank control register.
    fn set_cr(&self, value: u32);
    /// Read the bank status register.
    fn sr(&self) -> u32;
    /// Write the bank flag-clear register (write-1-to-clear).
    fn set_ccr(&self, value: u32);
    /// Write the bank key register.
    fn set_keyr(&self, value: u32);
    /// Read one 32-bit word from the flash array at an absolute address.
    fn read_flash(&self, address: u32) -> u32;
    /// Write one 32-bit word to the flash array at an absolute address.
    fn write_flash(&self, address: u32, value: u32);
}

impl<T: FlashRegs + ?Sized> FlashRegs for &T {
    fn cr(&self) -> u32 {
        (**self).cr()
    }
    fn set_cr(&self, value: u32) {
        (**self).set_cr(value)
    }
    fn sr(&self) -> u32 {
        (**self).sr()
    }
    fn set_ccr(&self, value: u32) {
        (**self).set_ccr(value)
    }
    fn set_keyr(&self, value: u32) {
        (**self).set_keyr(value)
    }
    fn read_flash(&self, address: u32) -> u32 {
        (**self).read_flash(address)
    }
    fn write_flash(&self, address: u32, value: u32) {
        (**self).write_flash(address, value)
    }
}

/// Memory-mapped register block of one hardware flash bank.
///
/// All accesses are volatile 32-bit reads/writes at `base + offset`; nothing
/// is cached or batched.
pub struct MmioRegs {
    base: u32,
}

impl MmioRegs {
    /// Create a view of the register block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the word-aligned start of a flash bank register block
    /// on this device, and the caller must guarantee no other code accesses
    /// that block or the bank's flash array while this view is in use.
    pub const unsafe fn new(base: u32) -> Self {
        assert!(base % 4 == 0);
        Self { base }
    }

    #[inline]
    fn read(&self, offset: u32) -> u32 {
        // SAFETY: constructor contract puts `base + offset` inside a valid,
        // exclusively owned register block.
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write(&self, offset: u32, value: u32) {
        // SAFETY: as in `read`.
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl FlashRegs for MmioRegs {
    fn cr(&self) -> u32 {
        self.read(CR_OFFSET)
    }

    fn set_cr(&self, value: u32) {
        self.write(CR_OFFSET, value);
    }

    fn sr(&self) -> u32 {
        self.read(SR_OFFSET)
    }

    fn set_ccr(&self, value: u32) {
        self.write(CCR_OFFSET, value);
    }

    fn set_keyr(&self, value: u32) {
        self.write(KEYR_OFFSET, value);
    }

    fn read_flash(&self, address: u32) -> u32 {
        // SAFETY: constructor contract covers the bank's flash array.
        unsafe { read_volatile(address as *const u32) }
    }

    fn write_flash(&self, address: u32, value: u32) {
        // SAFETY: as in `read_flash`.
        unsafe { write_volatile(address as *mut u32, value) }
    }
}
