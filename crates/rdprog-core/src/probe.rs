//! Probe transport traits
//!
//! The protocol core never talks to a physical debug link directly; it is
//! written against these traits. A backend (ST-Link, J-Link, an emulator)
//! implements them and maps its own failures to [`Error::Transport`].
//!
//! [`Error::Transport`]: crate::Error::Transport

use crate::error::Result;
use serde::Deserialize;

/// A halted debug target reachable through an open session
pub trait Target {
    /// Read a 32-bit word from the target address space
    fn read32(&mut self, addr: u32) -> Result<u32>;

    /// Write a 32-bit word to the target address space
    fn write32(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Reset the core and halt it at the reset vector
    fn reset_and_halt(&mut self) -> Result<()>;

    /// Whether the core is currently halted
    fn is_halted(&mut self) -> Result<bool>;

    /// Read `count` consecutive 32-bit words starting at `addr`
    fn read_memory_block32(&mut self, addr: u32, count: usize) -> Result<Vec<u32>>;

    /// Delay for the specified number of microseconds
    ///
    /// Backends with no better clock source may sleep the calling thread;
    /// emulators typically make this a no-op so polls run instantly.
    fn delay_us(&mut self, us: u32);
}

/// One open connection to a target
///
/// A session is exclusively owned by the workflow that opened it and must be
/// closed on every exit path. The orchestrator guarantees this by running
/// workflow bodies in a closure and closing before propagating errors.
pub trait Session {
    /// The target type reachable through this session
    type Target: Target;

    /// Access the target
    fn target(&mut self) -> &mut Self::Target;

    /// Release the transport
    fn close(self) -> Result<()>;
}

/// A debug probe that can open sessions against its attached target
pub trait Probe {
    /// The session type produced by this probe
    type Session: Session;

    /// Open a session with the given options
    fn open(&mut self, options: &SessionOptions) -> Result<Self::Session>;
}

/// How the probe connects to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectMode {
    /// Attach while holding the target in reset
    #[default]
    UnderReset,
    /// Attach to the running target
    Attach,
}

/// Which reset line the probe uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResetType {
    /// Drive the physical NRST pin
    #[default]
    Hardware,
    /// Request a reset through the debug port
    Software,
}

/// Session parameters passed to [`Probe::open`]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Target variant string, e.g. `stm32g030f6px`
    pub target: String,
    /// Connection mode
    pub connect_mode: ConnectMode,
    /// Reset type
    pub reset_type: ResetType,
    /// SWD clock frequency in Hz
    pub frequency_hz: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            target: String::from("stm32g030f6px"),
            connect_mode: ConnectMode::UnderReset,
            reset_type: ResetType::Hardware,
            frequency_hz: 24_000_000,
        }
    }
}
