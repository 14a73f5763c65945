//! Error types for rdprog-core

use crate::optbytes::ReadProtectionLevel;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the protocol core
#[derive(Debug, Error)]
pub enum Error {
    /// RDP level 2 observed; the device is irreversibly protected.
    /// Terminal: no write is attempted after observing this.
    #[error("device is locked with RDP level 2; this cannot be reverted")]
    DeviceLocked,

    /// The RDP byte matched none of the three known values; indicates
    /// corrupted option bytes or an unsupported silicon revision
    #[error("unknown RDP level byte {byte:#04x} in FLASH_OPTR")]
    UnknownProtectionLevel {
        /// The byte read from the RDP field
        byte: u8,
    },

    /// `check_rdp` expectation failed
    #[error("RDP level mismatch: expected {expected}, found {actual}")]
    ProtectionLevelMismatch {
        /// The level the caller asked to verify
        expected: ReadProtectionLevel,
        /// The level actually read from the device
        actual: ReadProtectionLevel,
    },

    /// Firmware image path missing; checked before any transport I/O
    #[error("firmware image not found: {0}")]
    FileNotFound(PathBuf),

    /// A busy-wait or halt-wait exceeded its deadline
    #[error("timed out waiting for {operation}")]
    TransportTimeout {
        /// What the poll was waiting on
        operation: &'static str,
    },

    /// A lock bit was still set after its key sequence completed
    #[error("{register} still set after key sequence")]
    UnlockFailed {
        /// The lock bit that failed to clear
        register: &'static str,
    },

    /// Probe link failure reported by a transport implementation
    #[error("probe transport error: {0}")]
    Transport(String),

    /// I/O failure while reading a firmware image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be loaded or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;
