//! rdprog-core - STM32G030 flash option-byte and read-protection driver
//!
//! This crate drives the STM32G030 flash controller over a debug-probe link
//! to program the device and to toggle its Read-Data-Protection (RDP) level.
//! The probe transport and the flash loader are consumed as capabilities
//! through the [`probe::Probe`] and [`programmer::FileProgrammer`] traits;
//! the crate itself owns only the unlock/option-modification protocol and
//! its ordering invariants.
//!
//! These operations manipulate a real, non-reentrant hardware state machine
//! with no partial-completion recovery. In particular, RDP level 2 is
//! irreversible: every code path that observes it fails fast instead of
//! attempting a write.
//!
//! # Example
//!
//! ```ignore
//! use rdprog_core::{Device, DeviceConfig, ReadProtectionLevel};
//!
//! fn protect<P: rdprog_core::probe::Probe>(probe: P) -> rdprog_core::Result<()> {
//!     let mut device = Device::new(probe);
//!     device.enable_rdp()?;
//!     device.check_rdp(ReadProtectionLevel::Level1)
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod device;
pub mod error;
pub mod optbytes;
pub mod poll;
pub mod probe;
pub mod programmer;
pub mod regs;
pub mod unlock;

pub use device::{run_each, Device, DeviceConfig, DeviceUuid};
pub use error::{Error, Result};
pub use optbytes::ReadProtectionLevel;
pub use poll::PollConfig;
pub use probe::SessionOptions;
