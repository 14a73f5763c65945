//! Two-phase flash/option unlock sequencer
//!
//! Both locks must be cleared, flash first, before any option-byte
//! modification — clearing OPTLOCK alone does not grant write permission on
//! this controller family. Each key pair is written in order exactly once
//! per unlock cycle; when the lock bit is already clear the sequence is
//! skipped entirely to avoid wasted bus transactions.

use crate::error::{Error, Result};
use crate::poll::{wait_bank1_free, wait_config_free, PollConfig};
use crate::probe::Target;
use crate::regs::{self, Cr};

/// Unlock the main flash interface if FLASH_CR.LOCK is set
///
/// Idempotent: a no-op (logged, not an error) when already unlocked.
pub fn unlock_flash<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    log::debug!("FLASH_CR = {:#010x}", cr.bits());

    if !cr.contains(Cr::LOCK) {
        log::info!("flash already unlocked, skipping key sequence");
        return Ok(());
    }

    log::info!("unlocking flash");
    target.write32(regs::FLASH_KEYR, regs::KEY1)?;
    target.write32(regs::FLASH_KEYR, regs::KEY2)?;

    wait_bank1_free(target, poll)?;
    wait_config_free(target, poll)?;

    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    if cr.contains(Cr::LOCK) {
        log::error!("FLASH_CR.LOCK still set after key sequence");
        return Err(Error::UnlockFailed {
            register: "FLASH_CR.LOCK",
        });
    }

    Ok(())
}

/// Unlock the option bytes if FLASH_CR.OPTLOCK is set
///
/// Requires [`unlock_flash`] to have completed first.
pub fn unlock_options<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    log::debug!("FLASH_CR = {:#010x}", cr.bits());

    if !cr.contains(Cr::OPTLOCK) {
        log::info!("options already unlocked, skipping key sequence");
        return Ok(());
    }

    log::info!("unlocking option bytes");
    target.write32(regs::FLASH_OPTKEYR, regs::OPTKEY1)?;
    target.write32(regs::FLASH_OPTKEYR, regs::OPTKEY2)?;

    wait_bank1_free(target, poll)?;
    wait_config_free(target, poll)?;

    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    if cr.contains(Cr::OPTLOCK) {
        log::error!("FLASH_CR.OPTLOCK still set after key sequence");
        return Err(Error::UnlockFailed {
            register: "FLASH_CR.OPTLOCK",
        });
    }

    Ok(())
}
