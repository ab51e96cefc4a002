//! Raw erase/program sequences for one flash bank.
//!
//! Everything here assumes the caller already holds the bank exclusively
//! (the public driver runs these inside a critical section) and restores the
//! lock itself; these functions only sequence register writes and polls.

use core::sync::atomic::{fence, Ordering};

use crate::regs::{
    FlashRegs, CR_LOCK, CR_PG, CR_PSIZE, CR_SER, CR_SNB, CR_SNB_SHIFT, CR_START, KEY1, KEY2,
    SR_DBECCERR, SR_EOP, SR_ERRORS, SR_INCERR, SR_OPERR, SR_PGSERR, SR_QW, SR_RDPERR, SR_RDSERR,
    SR_STRBERR, SR_WRPERR,
};
use crate::{Error, WRITE_SIZE};

/// Unlock the bank's control register.
///
/// No-op when already unlocked. A key sequence the controller rejects leaves
/// the lock bit set; that is surfaced as [`Error::Unlock`] rather than a
/// fault halt so callers (and host tests) can observe it.
pub(crate) fn unlock<R: FlashRegs>(regs: &R) -> Result<(), Error> {
    if regs.cr() & CR_LOCK == 0 {
        return Ok(());
    }

    regs.set_keyr(KEY1);
    fence(Ordering::SeqCst);
    regs.set_keyr(KEY2);
    fence(Ordering::SeqCst);

    if regs.cr() & CR_LOCK != 0 {
        error!("flash bank rejected the unlock key sequence");
        return Err(Error::Unlock);
    }
    Ok(())
}

/// Re-lock the bank's control register and verify the bit latched.
pub(crate) fn lock<R: FlashRegs>(regs: &R) -> Result<(), Error> {
    regs.set_cr(regs.cr() | CR_LOCK);

    if regs.cr() & CR_LOCK == 0 {
        error!("flash bank lock bit did not latch");
        return Err(Error::Lock);
    }
    Ok(())
}

/// Wait for the current operation to finish, then decode its outcome.
///
/// Polls the wait-queue flag at most `poll_limit` times. On completion any
/// latched error flags are cleared (write-1-to-clear) and reported; a clean
/// finish clears the end-of-operation flag. On timeout the flags are left
/// untouched because the operation may still be in flight.
pub(crate) fn wait_ready<R: FlashRegs>(regs: &R, poll_limit: u32) -> Result<(), Error> {
    let mut polls: u32 = 0;
    while regs.sr() & SR_QW != 0 {
        if polls >= poll_limit {
            return Err(Error::Timeout);
        }
        polls += 1;
    }

    let flags = regs.sr() & SR_ERRORS;
    if flags != 0 {
        regs.set_ccr(flags);
        return Err(decode_error(flags));
    }

    if regs.sr() & SR_EOP != 0 {
        regs.set_ccr(SR_EOP);
    }
    Ok(())
}

/// Map latched error flags to the highest-priority error they contain.
fn decode_error(flags: u32) -> Error {
    if flags & SR_PGSERR != 0 {
        Error::ProgrammingSequence
    } else if flags & SR_WRPERR != 0 {
        Error::WriteProtection
    } else if flags & SR_STRBERR != 0 {
        Error::Strobe
    } else if flags & SR_INCERR != 0 {
        Error::Inconsistency
    } else if flags & SR_OPERR != 0 {
        Error::Operation
    } else if flags & SR_RDPERR != 0 {
        Error::ReadProtection
    } else if flags & SR_RDSERR != 0 {
        Error::ReadSecure
    } else if flags & SR_DBECCERR != 0 {
        Error::EccDetection
    } else {
        Error::Operation
    }
}

/// Erase one sector of an unlocked bank.
///
/// Clears the erase configuration first, then selects and starts the erase
/// in a single control-register write. The sector-select bits are cleared
/// again whatever the outcome.
pub(crate) fn erase_sector<R: FlashRegs>(
    regs: &R,
    sector: u32,
    poll_limit: u32,
) -> Result<(), Error> {
    regs.set_cr(regs.cr() & !(CR_PSIZE | CR_SNB));
    regs.set_cr(regs.cr() | CR_SER | CR_PSIZE | (sector << CR_SNB_SHIFT) | CR_START);

    let ret = wait_ready(regs, poll_limit);

    regs.set_cr(regs.cr() & !(CR_SER | CR_SNB));
    ret
}

/// Program one flash word into an unlocked bank.
///
/// The write buffer latches a full 256-bit row; all eight words are written
/// back to back, bracketed by fences so the programming-enable write is
/// visible to the controller before the first data word and the status polls
/// start only after the last one.
pub(crate) fn program_flash_word<R: FlashRegs>(
    regs: &R,
    address: u32,
    data: &[u8],
    poll_limit: u32,
) -> Result<(), Error> {
    debug_assert_eq!(data.len(), WRITE_SIZE);
    debug_assert_eq!(address % WRITE_SIZE as u32, 0);

    wait_ready(regs, poll_limit)?;

    regs.set_cr(regs.cr() | CR_PG);
    fence(Ordering::SeqCst);

    let mut word_address = address;
    for word in data.chunks_exact(4) {
        regs.write_flash(
            word_address,
            u32::from_le_bytes([word[0], word[1], word[2], word[3]]),
        );
        word_address += 4;
    }
    fence(Ordering::SeqCst);

    let ret = wait_ready(regs, poll_limit);

    regs.set_cr(regs.cr() & !CR_PG);
    ret
}
