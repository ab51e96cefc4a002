//! Dual-bank internal flash driver for STM32H7 series microcontrollers.
//!
//! The H7 flash controller exposes two independent banks, each with its own
//! lock/unlock, control, status and flag-clear registers. This crate drives
//! the erase/program sequences of one bank at a time: key-sequence unlock
//! with verification, busy-polling with a bounded iteration budget, latched
//! error-flag decoding, and flash-word (256-bit) programming, all inside a
//! single critical section so interrupt handlers cannot touch the controller
//! mid-operation.
//!
//! Register access goes through the [`FlashRegs`] trait. On hardware that is
//! [`MmioRegs`], a volatile view of one bank's register block; host tests run
//! the same driver against a simulated register file.
#![cfg_attr(not(test), no_std)]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

mod bank;
mod flash;
mod low_level;
mod regs;

#[cfg(test)]
mod sim;

pub use bank::{BankId, BankLayout};
pub use flash::Flash;
pub use regs::{FlashRegs, MmioRegs};

/// Number of 32-bit words in one flash word, the smallest programmable unit.
pub const WORDS_PER_FLASH_WORD: usize = 8;
/// Write granularity in bytes (one 256-bit flash word).
pub const WRITE_SIZE: usize = WORDS_PER_FLASH_WORD * 4;
/// Read size (always 1).
pub const READ_SIZE: usize = 1;
/// Erase granularity of an on-chip bank in bytes.
pub const SECTOR_SIZE: usize = 128 * 1024;
/// Sectors per bank.
pub const SECTORS_PER_BANK: u32 = 8;

/// Value flash cells hold after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

/// Default busy-polling budget, in status-register reads.
///
/// The controller gives no cycle-accurate completion bound, so the budget is
/// an iteration count, not a wall-clock timeout. The default is sized so a
/// worst-case 128 KiB sector erase (about two seconds) completes well within
/// it on a 480 MHz part; tune [`Config::poll_limit`] for slower clocks or
/// tighter failure detection.
pub const DEFAULT_POLL_LIMIT: u32 = 64_000_000;

/// Driver configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Busy-polling budget for a single erase or program step, in
    /// status-register reads. Exceeding it yields [`Error::Timeout`].
    pub poll_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_limit: DEFAULT_POLL_LIMIT,
        }
    }
}

/// Flash error.
///
/// Hardware-reported variants map one latched status flag each; see RM0433
/// section 4.7. The remaining variants are raised by the driver itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Erase/program attempted on a write-protected sector (WRPERR).
    WriteProtection,
    /// Incorrect programming sequence (PGSERR).
    ProgrammingSequence,
    /// The same flash-word byte was written more than once (STRBERR).
    Strobe,
    /// Write before the previous one completed, or a burst straddling two
    /// flash words (INCERR).
    Inconsistency,
    /// The controller reported a write/erase failure (OPERR).
    Operation,
    /// Read from a protected area (RDPERR).
    ReadProtection,
    /// Read from a secure-only area (RDSERR).
    ReadSecure,
    /// Uncorrectable double ECC error (DBECCERR).
    EccDetection,
    /// Address range falls outside the bank.
    Size,
    /// Offset or length not flash-word / sector aligned.
    Unaligned,
    /// The busy flag did not clear within the polling budget. The operation
    /// may still complete later; flash contents are undefined until
    /// re-verified.
    Timeout,
    /// The lock bit stayed set after the key sequence. The bank cannot be
    /// written until the next system reset.
    Unlock,
    /// The lock bit did not latch when re-locking the bank.
    Lock,
}

impl NorFlashError for Error {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::Size => NorFlashErrorKind::OutOfBounds,
            Self::Unaligned => NorFlashErrorKind::NotAligned,
            _ => NorFlashErrorKind::Other,
        }
    }
}
