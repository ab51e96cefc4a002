//! Simulated flash bank for host tests.
//!
//! Implements [`FlashRegs`] over an in-memory register file and flash array,
//! reproducing the controller behaviour the driver depends on: the key
//! sequence, the lock bit gating control writes, the wait-queue flag staying
//! asserted for a few status reads per operation, latched write-1-to-clear
//! flags, and the 256-bit program row buffer. Tests can also inject the
//! failure modes the hardware can produce (stuck busy, rejected keys,
//! per-operation error flags).

use core::cell::RefCell;

use crate::bank::BankLayout;
use crate::regs::{
    FlashRegs, CR_LOCK, CR_PG, CR_SER, CR_SNB, CR_SNB_SHIFT, CR_START, KEY1, KEY2, SR_EOP,
    SR_ERRORS, SR_INCERR, SR_PGSERR, SR_QW,
};
use crate::{ERASED_BYTE, WRITE_SIZE};

pub(crate) const SIM_SECTORS: usize = 4;
pub(crate) const SIM_SECTOR_SIZE: usize = 256;
const SIM_BASE: u32 = 0x0800_0000;
const SIM_BYTES: usize = SIM_SECTORS * SIM_SECTOR_SIZE;

/// Status reads an operation stays busy for before completing.
const BUSY_READS_PER_OP: u32 = 3;

pub(crate) struct SimBank {
    state: RefCell<State>,
}

struct State {
    cr: u32,
    sr: u32,
    key_stage: u8,
    key_writes: u32,
    reject_unlock: bool,
    stuck_busy: bool,
    busy_reads: u32,
    pending: Option<Pending>,
    ops_started: u32,
    fail_op: Option<(u32, u32)>,
    row: [u8; WRITE_SIZE],
    row_len: usize,
    row_address: u32,
    mem: [u8; SIM_BYTES],
}

struct Pending {
    kind: Kind,
    fail_flags: u32,
}

enum Kind {
    Erase { sector: u32 },
    Program { address: u32 },
}

impl SimBank {
    pub(crate) const LAYOUT: BankLayout = BankLayout {
        base: SIM_BASE,
        sectors: SIM_SECTORS as u32,
        sector_size: SIM_SECTOR_SIZE as u32,
    };

    pub(crate) fn new() -> Self {
        Self {
            state: RefCell::new(State {
                cr: CR_LOCK,
                sr: 0,
                key_stage: 0,
                key_writes: 0,
                reject_unlock: false,
                stuck_busy: false,
                busy_reads: 0,
                pending: None,
                ops_started: 0,
                fail_op: None,
                row: [ERASED_BYTE; WRITE_SIZE],
                row_len: 0,
                row_address: 0,
                mem: [ERASED_BYTE; SIM_BYTES],
            }),
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.state.borrow().cr & CR_LOCK != 0
    }

    pub(crate) fn key_writes(&self) -> u32 {
        self.state.borrow().key_writes
    }

    /// Status register contents without the read side effects of `sr()`.
    pub(crate) fn sr_raw(&self) -> u32 {
        let state = self.state.borrow();
        if state.stuck_busy || state.busy_reads > 0 {
            state.sr | SR_QW
        } else {
            state.sr
        }
    }

    /// Ignore key writes, leaving the bank locked.
    pub(crate) fn reject_unlock(&self) {
        self.state.borrow_mut().reject_unlock = true;
    }

    /// Report the wait queue as busy forever.
    pub(crate) fn stick_busy(&self) {
        self.state.borrow_mut().stuck_busy = true;
    }

    /// Latch status flags directly, as hardware would.
    pub(crate) fn latch_flags(&self, flags: u32) {
        self.state.borrow_mut().sr |= flags;
    }

    /// Complete the `n`-th started operation (1-based, erases and program
    /// rows both count) with `flags` latched instead of a memory effect.
    pub(crate) fn fail_operation(&self, n: u32, flags: u32) {
        self.state.borrow_mut().fail_op = Some((n, flags));
    }

    /// Seed the flash array behind the controller's back.
    pub(crate) fn preload(&self, offset: u32, bytes: &[u8]) {
        let offset = offset as usize;
        self.state.borrow_mut().mem[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn preload_all(&self, byte: u8) {
        self.state.borrow_mut().mem.fill(byte);
    }

    fn start_operation(state: &mut State, kind: Kind) {
        state.ops_started += 1;
        let fail_flags = match state.fail_op {
            Some((n, flags)) if n == state.ops_started => flags,
            _ => 0,
        };
        state.pending = Some(Pending { kind, fail_flags });
        state.busy_reads = BUSY_READS_PER_OP;
    }

    fn finish_operation(state: &mut State) {
        let Some(op) = state.pending.take() else {
            return;
        };

        if op.fail_flags != 0 {
            state.sr |= op.fail_flags;
            return;
        }

        match op.kind {
            Kind::Erase { sector } => {
                assert!((sector as usize) < SIM_SECTORS, "erase of nonexistent sector");
                let start = sector as usize * SIM_SECTOR_SIZE;
                state.mem[start..start + SIM_SECTOR_SIZE].fill(ERASED_BYTE);
            }
            Kind::Program { address } => {
                let offset = (address - SIM_BASE) as usize;
                // NOR programming can only clear bits.
                for (cell, byte) in state.mem[offset..offset + WRITE_SIZE]
                    .iter_mut()
                    .zip(state.row.iter())
                {
                    *cell &= byte;
                }
            }
        }
        state.sr |= SR_EOP;
    }
}

impl FlashRegs for SimBank {
    fn cr(&self) -> u32 {
        self.state.borrow().cr
    }

    fn set_cr(&self, value: u32) {
        let mut state = self.state.borrow_mut();

        if state.cr & CR_LOCK != 0 {
            // A locked control register only accepts the lock bit itself.
            state.cr |= value & CR_LOCK;
            return;
        }

        let start = value & CR_START != 0;
        state.cr = value & !CR_START;
        if state.cr & CR_PG == 0 {
            state.row_len = 0;
        }

        if start && value & CR_SER != 0 {
            let sector = (value & CR_SNB) >> CR_SNB_SHIFT;
            Self::start_operation(&mut state, Kind::Erase { sector });
        }
    }

    fn sr(&self) -> u32 {
        let mut state = self.state.borrow_mut();

        if state.stuck_busy {
            return state.sr | SR_QW;
        }
        if state.busy_reads > 0 {
            state.busy_reads -= 1;
            if state.busy_reads == 0 {
                Self::finish_operation(&mut state);
            }
            return state.sr | SR_QW;
        }
        state.sr
    }

    fn set_ccr(&self, value: u32) {
        let mut state = self.state.borrow_mut();
        state.sr &= !(value & (SR_ERRORS | SR_EOP));
    }

    fn set_keyr(&self, value: u32) {
        let mut state = self.state.borrow_mut();
        state.key_writes += 1;

        if state.reject_unlock || state.cr & CR_LOCK == 0 {
            return;
        }
        state.key_stage = match (state.key_stage, value) {
            (0, KEY1) => 1,
            (1, KEY2) => {
                state.cr &= !CR_LOCK;
                0
            }
            _ => 0,
        };
    }

    fn read_flash(&self, address: u32) -> u32 {
        let state = self.state.borrow();
        let offset = (address - SIM_BASE) as usize;
        u32::from_le_bytes([
            state.mem[offset],
            state.mem[offset + 1],
            state.mem[offset + 2],
            state.mem[offset + 3],
        ])
    }

    fn write_flash(&self, address: u32, value: u32) {
        let mut state = self.state.borrow_mut();

        if state.cr & CR_LOCK != 0 || state.cr & CR_PG == 0 {
            // Data write without programming enabled.
            state.sr |= SR_PGSERR;
            return;
        }

        if state.row_len == 0 {
            state.row_address = address;
        } else if address != state.row_address + state.row_len as u32 {
            state.sr |= SR_INCERR;
            state.row_len = 0;
            return;
        }

        let row_len = state.row_len;
        state.row[row_len..row_len + 4].copy_from_slice(&value.to_le_bytes());
        state.row_len += 4;

        if state.row_len == WRITE_SIZE {
            state.row_len = 0;
            let address = state.row_address;
            Self::start_operation(&mut state, Kind::Program { address });
        }
    }
}
