//! Flash bank descriptors.

use crate::{SECTORS_PER_BANK, SECTOR_SIZE};

/// Flash array base address (bank 1).
pub const FLASH_BASE_BANK1: u32 = 0x0800_0000;
/// Flash array base address (bank 2).
pub const FLASH_BASE_BANK2: u32 = 0x0810_0000;

/// Flash controller register block base (bank 1).
pub const FLASH_REGS_BANK1: u32 = 0x5200_2000;
/// Flash controller register block base (bank 2).
pub const FLASH_REGS_BANK2: u32 = 0x5200_2100;

/// One of the two independent on-chip flash banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BankId {
    /// Bank 1 (0x0800_0000..0x0810_0000).
    Bank1,
    /// Bank 2 (0x0810_0000..0x0820_0000).
    Bank2,
}

impl BankId {
    /// Register block base for this bank.
    pub const fn regs_base(self) -> u32 {
        match self {
            BankId::Bank1 => FLASH_REGS_BANK1,
            BankId::Bank2 => FLASH_REGS_BANK2,
        }
    }

    /// Flash array geometry of this bank.
    pub const fn layout(self) -> BankLayout {
        let base = match self {
            BankId::Bank1 => FLASH_BASE_BANK1,
            BankId::Bank2 => FLASH_BASE_BANK2,
        };
        BankLayout {
            base,
            sectors: SECTORS_PER_BANK,
            sector_size: SECTOR_SIZE as u32,
        }
    }

    /// Bank holding `address`, if any.
    pub const fn from_address(address: u32) -> Option<Self> {
        let bank_size = SECTORS_PER_BANK * SECTOR_SIZE as u32;
        if address >= FLASH_BASE_BANK1 && address < FLASH_BASE_BANK1 + bank_size {
            Some(BankId::Bank1)
        } else if address >= FLASH_BASE_BANK2 && address < FLASH_BASE_BANK2 + bank_size {
            Some(BankId::Bank2)
        } else {
            None
        }
    }
}

/// Geometry of one bank's flash array.
///
/// Carried on the driver handle rather than baked into the sequences, so the
/// same driver runs against the fixed on-chip layout or a small simulated
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BankLayout {
    /// Absolute address of the first byte of the bank.
    pub base: u32,
    /// Number of erase sectors.
    pub sectors: u32,
    /// Sector size in bytes.
    pub sector_size: u32,
}

impl BankLayout {
    /// Total size of the bank in bytes.
    pub const fn size(&self) -> u32 {
        self.sectors * self.sector_size
    }

    /// Whether `[offset, offset + len)` lies within the bank.
    pub const fn contains(&self, offset: u32, len: u32) -> bool {
        match offset.checked_add(len) {
            Some(end) => end <= self.size(),
            None => false,
        }
    }

    /// Sector index holding the byte at `offset`.
    pub const fn sector_index(&self, offset: u32) -> u32 {
        offset / self.sector_size
    }

    /// Absolute address of the first byte of sector `index`.
    pub const fn sector_address(&self, index: u32) -> u32 {
        self.base + index * self.sector_size
    }
}
