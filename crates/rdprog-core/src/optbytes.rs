//! Option-byte editing: RDP level read/modify/write, commit and load
//!
//! The RDP field is the low byte of FLASH_OPTR; the remaining 24 bits are
//! opaque to this module and preserved bit-for-bit across every
//! read-modify-write cycle.
//!
//! Callers must have completed the unlock sequence (flash, then options)
//! before [`set_rdp_level`] / [`commit_option_change`] /
//! [`launch_option_load`]; these functions do not re-check the lock bits.

use crate::error::{Error, Result};
use crate::poll::{wait_bank1_free, wait_config_free, PollConfig};
use crate::probe::Target;
use crate::regs::{self, Cr, Sr};
use serde::Deserialize;
use std::fmt;

/// Read-out protection level of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ReadProtectionLevel {
    /// Level 0 (`0xAA`): protection disabled
    Level0,
    /// Level 1 (`0xBB`): protected, reversible
    Level1,
    /// Level 2 (`0xCC`): protected, irreversible. Terminal — no operation
    /// may attempt to clear it.
    Level2,
}

impl ReadProtectionLevel {
    /// The option-byte value encoding this level
    pub const fn byte(self) -> u8 {
        match self {
            Self::Level0 => 0xAA,
            Self::Level1 => 0xBB,
            Self::Level2 => 0xCC,
        }
    }

    /// Decode an RDP byte; anything outside the three known values is
    /// treated as fatal (corrupted option bytes or unsupported silicon)
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0xAA => Ok(Self::Level0),
            0xBB => Ok(Self::Level1),
            0xCC => Ok(Self::Level2),
            _ => Err(Error::UnknownProtectionLevel { byte }),
        }
    }
}

impl fmt::Display for ReadProtectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level0 => write!(f, "level 0 (0xAA, disabled)"),
            Self::Level1 => write!(f, "level 1 (0xBB, enabled)"),
            Self::Level2 => write!(f, "level 2 (0xCC, locked)"),
        }
    }
}

/// Read FLASH_OPTR
pub fn read_option_register<T: Target + ?Sized>(target: &mut T) -> Result<u32> {
    let optr = target.read32(regs::FLASH_OPTR)?;
    log::debug!("FLASH_OPTR = {:#010x}", optr);
    Ok(optr)
}

/// Read the raw RDP byte from FLASH_OPTR
pub fn read_rdp_byte<T: Target + ?Sized>(target: &mut T) -> Result<u8> {
    let byte = (read_option_register(target)? & regs::OPTR_RDP_MASK) as u8;
    log::debug!("RDP byte = {:#04x}", byte);
    Ok(byte)
}

/// Read and decode the current RDP level
pub fn read_rdp_level<T: Target + ?Sized>(target: &mut T) -> Result<ReadProtectionLevel> {
    ReadProtectionLevel::from_byte(read_rdp_byte(target)?)
}

/// Stage a new RDP level in FLASH_OPTR, preserving the other 24 option bits
///
/// Refuses with [`Error::DeviceLocked`] if the device already reads level 2,
/// or if level 2 is requested as the target — staging it would brick the
/// device.
pub fn set_rdp_level<T: Target + ?Sized>(
    target: &mut T,
    level: ReadProtectionLevel,
    poll: &PollConfig,
) -> Result<()> {
    if level == ReadProtectionLevel::Level2 {
        log::error!("refusing to stage RDP level 2");
        return Err(Error::DeviceLocked);
    }

    let optr = read_option_register(target)?;
    if (optr & regs::OPTR_RDP_MASK) as u8 == ReadProtectionLevel::Level2.byte() {
        log::error!("device reads RDP level 2, refusing to touch option bytes");
        return Err(Error::DeviceLocked);
    }

    let new_optr = (optr & regs::OPTR_WITHOUT_RDP_MASK) | level.byte() as u32;
    log::info!("setting RDP level to {:#04x}", level.byte());
    target.write32(regs::FLASH_OPTR, new_optr)?;

    wait_bank1_free(target, poll)?;
    wait_config_free(target, poll)
}

/// Latch the staged option bytes by setting FLASH_CR.OPTSTRT
pub fn commit_option_change<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    log::debug!("FLASH_CR = {:#010x}", cr.bits());

    log::info!("committing option byte modification");
    target.write32(regs::FLASH_CR, (cr | Cr::OPTSTRT).bits())?;

    wait_bank1_free(target, poll)?;
    wait_config_free(target, poll)?;

    let sr = Sr::from_bits_retain(target.read32(regs::FLASH_SR)?);
    if sr.contains(Sr::PGSERR) {
        log::warn!("programming sequence error flagged after option commit (FLASH_SR = {:#010x})",
            sr.bits());
    }

    Ok(())
}

/// Reload the option bytes by setting FLASH_CR.OBL_LAUNCH
///
/// Waits for both busy flags BEFORE the write: the launch is irreversible
/// and must not race a pending erase/program cycle. The write itself resets
/// the MCU — the caller must not expect further register access until a
/// fresh session is established.
pub fn launch_option_load<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    wait_bank1_free(target, poll)?;
    wait_config_free(target, poll)?;

    let cr = Cr::from_bits_retain(target.read32(regs::FLASH_CR)?);
    log::debug!("FLASH_CR = {:#010x}", cr.bits());

    log::info!("launching option byte reload, target will reset");
    target.write32(regs::FLASH_CR, (cr | Cr::OBL_LAUNCH).bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_bytes_decode() {
        assert_eq!(
            ReadProtectionLevel::from_byte(0xAA).unwrap(),
            ReadProtectionLevel::Level0
        );
        assert_eq!(
            ReadProtectionLevel::from_byte(0xBB).unwrap(),
            ReadProtectionLevel::Level1
        );
        assert_eq!(
            ReadProtectionLevel::from_byte(0xCC).unwrap(),
            ReadProtectionLevel::Level2
        );
    }

    #[test]
    fn unknown_bytes_are_fatal() {
        for byte in [0x00, 0x5A, 0xAB, 0xFF] {
            match ReadProtectionLevel::from_byte(byte) {
                Err(Error::UnknownProtectionLevel { byte: b }) => assert_eq!(b, byte),
                other => panic!("expected UnknownProtectionLevel, got {:?}", other),
            }
        }
    }

    #[test]
    fn byte_roundtrip() {
        for level in [
            ReadProtectionLevel::Level0,
            ReadProtectionLevel::Level1,
            ReadProtectionLevel::Level2,
        ] {
            assert_eq!(
                ReadProtectionLevel::from_byte(level.byte()).unwrap(),
                level
            );
        }
    }
}
