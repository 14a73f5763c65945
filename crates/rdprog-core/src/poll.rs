//! Deadline-bounded busy-wait primitives
//!
//! The flash controller signals progress through status bits that must be
//! polled until they clear. Hardware gives no completion interrupt over the
//! debug port, so these are blocking polls — but always with a deadline, so
//! a wedged or disconnected target surfaces as [`Error::TransportTimeout`]
//! instead of hanging the process.
//!
//! [`Error::TransportTimeout`]: crate::Error::TransportTimeout

use crate::error::{Error, Result};
use crate::probe::Target;
use crate::regs::{self, Sr};
use serde::Deserialize;

/// Poll interval and deadline for one class of wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between polls in microseconds
    pub poll_delay_us: u32,
    /// Maximum time to wait before giving up
    pub timeout_us: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        // Generous deadline: option-byte commits ride on erase cycles that
        // can take whole seconds on a slow part.
        Self {
            poll_delay_us: 100,
            timeout_us: 5_000_000,
        }
    }
}

impl PollConfig {
    /// Number of polls the deadline allows
    fn max_polls(&self) -> u32 {
        if self.poll_delay_us > 0 {
            (self.timeout_us / self.poll_delay_us).max(1)
        } else {
            self.timeout_us.max(1)
        }
    }
}

/// Poll FLASH_SR until every bit in `mask` reads zero
fn wait_status_clear<T: Target + ?Sized>(
    target: &mut T,
    mask: Sr,
    operation: &'static str,
    poll: &PollConfig,
) -> Result<()> {
    for _ in 0..poll.max_polls() {
        let sr = Sr::from_bits_retain(target.read32(regs::FLASH_SR)?);
        if !sr.intersects(mask) {
            return Ok(());
        }
        log::debug!("waiting for {} (FLASH_SR = {:#010x})", operation, sr.bits());
        if poll.poll_delay_us > 0 {
            target.delay_us(poll.poll_delay_us);
        }
    }

    log::error!("deadline expired waiting for {}", operation);
    Err(Error::TransportTimeout { operation })
}

/// Block until bank 1 is free for read/write
pub fn wait_bank1_free<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    wait_status_clear(target, Sr::BSY1, "bank 1 to become free", poll)
}

/// Block until no programming or erase operation is in flight
pub fn wait_config_free<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    wait_status_clear(
        target,
        Sr::CFGBSY,
        "programming/erase operations to finish",
        poll,
    )
}

/// Block until the core reports halted
pub fn wait_halted<T: Target + ?Sized>(target: &mut T, poll: &PollConfig) -> Result<()> {
    for _ in 0..poll.max_polls() {
        if target.is_halted()? {
            return Ok(());
        }
        log::debug!("waiting for target to halt");
        if poll.poll_delay_us > 0 {
            target.delay_us(poll.poll_delay_us);
        }
    }

    log::error!("deadline expired waiting for target to halt");
    Err(Error::TransportTimeout {
        operation: "target to halt",
    })
}
