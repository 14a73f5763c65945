//! STM32G030 flash peripheral register map
//!
//! Addresses, bit masks and key constants for the FLASH controller as
//! defined by the RM0454 reference manual. These are target-specific
//! configuration, never mutable state.
//!
//! Note: the LOCK/OPTLOCK assignment follows the datasheet — CR bit 31 is
//! the main flash lock, bit 30 the option-byte lock.

use bitflags::bitflags;

/// Flash peripheral base address
pub const FLASH_BASE: u32 = 0x4002_2000;

/// Flash key register (FLASH_KEYR) — accepts the flash unlock key sequence
pub const FLASH_KEYR: u32 = FLASH_BASE + 0x08;
/// Option key register (FLASH_OPTKEYR) — accepts the option unlock key sequence
pub const FLASH_OPTKEYR: u32 = FLASH_BASE + 0x0C;
/// Status register (FLASH_SR)
pub const FLASH_SR: u32 = FLASH_BASE + 0x10;
/// Control register (FLASH_CR)
pub const FLASH_CR: u32 = FLASH_BASE + 0x14;
/// Option register (FLASH_OPTR) — low byte holds the RDP level
pub const FLASH_OPTR: u32 = FLASH_BASE + 0x20;

/// First word of the flash unlock key sequence
pub const KEY1: u32 = 0x4567_0123;
/// Second word of the flash unlock key sequence
pub const KEY2: u32 = 0xCDEF_89AB;
/// First word of the option-byte unlock key sequence
pub const OPTKEY1: u32 = 0x0819_2A3B;
/// Second word of the option-byte unlock key sequence
pub const OPTKEY2: u32 = 0x4C5D_6E7F;

/// RDP level field in FLASH_OPTR (bits 7:0)
pub const OPTR_RDP_MASK: u32 = 0x0000_00FF;
/// Everything in FLASH_OPTR except the RDP field; preserved bit-for-bit
/// across a read-modify-write of the RDP level
pub const OPTR_WITHOUT_RDP_MASK: u32 = 0xFFFF_FF00;

/// Address of the 96-bit device unique ID
pub const UUID_ADDR: u32 = 0x1FFF_7590;
/// Number of 32-bit words in the unique ID
pub const UUID_WORDS: usize = 3;

bitflags! {
    /// FLASH_SR bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sr: u32 {
        /// Programming sequence error (any of PROGERR, SIZERR, PGAERR,
        /// WRPERR, MISSERR, FASTERR)
        const PGSERR = 1 << 7;
        /// Bank 1 busy
        const BSY1 = 1 << 16;
        /// Programming or erase configuration busy
        const CFGBSY = 1 << 18;
    }
}

bitflags! {
    /// FLASH_CR bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cr: u32 {
        /// Mass erase request
        const MER1 = 1 << 2;
        /// Start erase operation
        const STRT = 1 << 16;
        /// Start option-byte modification
        const OPTSTRT = 1 << 17;
        /// Option-byte load launch; writing this resets the MCU
        const OBL_LAUNCH = 1 << 27;
        /// Option-byte lock
        const OPTLOCK = 1 << 30;
        /// Main flash lock
        const LOCK = 1 << 31;
    }
}
