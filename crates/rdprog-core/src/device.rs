//! RDP workflow orchestrator
//!
//! Ties the unlock sequencer, option-byte editor and commit/load launcher
//! together into the five public operations. Every workflow follows the
//! same entry protocol: open a session, reset and halt the core, wait
//! (bounded) for the halt, run the workflow body, close the session on
//! every exit path, then settle.

use crate::error::{Error, Result};
use crate::optbytes::{self, ReadProtectionLevel};
use crate::poll::{self, PollConfig};
use crate::probe::{Probe, Session, SessionOptions, Target};
use crate::programmer::{FileProgrammer, ProgressReport};
use crate::regs;
use crate::unlock;
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// All knobs of a [`Device`], loadable from TOML
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Session parameters handed to the probe
    pub session: SessionOptions,
    /// Poll interval/deadline for flash busy flags
    pub busy_wait: PollConfig,
    /// Poll interval/deadline for the post-reset halt
    pub halt_wait: PollConfig,
    /// Delay after closing a session, giving the target time to come back
    /// up after a reset before the next workflow attaches
    pub settle_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            busy_wait: PollConfig::default(),
            halt_wait: PollConfig {
                poll_delay_us: 1_000,
                timeout_us: 2_000_000,
            },
            settle_delay_ms: 500,
        }
    }
}

impl DeviceConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// The 96-bit device unique ID, three words in read order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceUuid(pub [u32; 3]);

impl DeviceUuid {
    /// The three ID words in read order
    pub fn words(&self) -> &[u32; 3] {
        &self.0
    }
}

impl fmt::Display for DeviceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}-{:08x}-{:08x}", self.0[0], self.0[1], self.0[2])
    }
}

/// One target device reachable through an exclusively owned probe
pub struct Device<P: Probe> {
    probe: P,
    config: DeviceConfig,
}

impl<P: Probe> Device<P> {
    /// Create a device with the default configuration
    pub fn new(probe: P) -> Self {
        Self::with_config(probe, DeviceConfig::default())
    }

    /// Create a device with an explicit configuration
    pub fn with_config(probe: P, config: DeviceConfig) -> Self {
        Self { probe, config }
    }

    /// The active configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Release the probe
    pub fn into_probe(self) -> P {
        self.probe
    }

    /// Shared workflow entry protocol
    ///
    /// Opens a session, resets and halts the target, runs `body`, and
    /// closes the session whether or not `body` succeeded. The settle
    /// delay runs on the success path only, mirroring how an error aborts
    /// the workflow immediately.
    fn with_session<T>(
        &mut self,
        body: impl FnOnce(&mut P::Session) -> Result<T>,
    ) -> Result<T> {
        let mut session = self.probe.open(&self.config.session)?;

        let result: Result<T> = (|| {
            let target = session.target();
            target.reset_and_halt()?;
            poll::wait_halted(target, &self.config.halt_wait)?;
            body(&mut session)
        })();

        let close_result = session.close();
        let value = result?;
        close_result?;

        if self.config.settle_delay_ms > 0 {
            log::debug!("settling for {} ms", self.config.settle_delay_ms);
            std::thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
        }

        Ok(value)
    }

    /// Enable read protection (level 1) if the device is at level 0
    ///
    /// The final option-byte load resets the MCU and terminates the
    /// workflow. A device already at level 1 is a logged no-op; level 2
    /// fails with [`Error::DeviceLocked`] before any write.
    pub fn enable_rdp(&mut self) -> Result<()> {
        log::info!("enabling read protection");
        let busy = self.config.busy_wait;

        self.with_session(|session| {
            let target = session.target();
            let level = optbytes::read_rdp_level(target)?;
            log::info!("current RDP level: {}", level);

            match level {
                ReadProtectionLevel::Level2 => {
                    log::error!("device is locked with level 2, aborting");
                    Err(Error::DeviceLocked)
                }
                ReadProtectionLevel::Level1 => {
                    log::info!("read protection already enabled, skipping");
                    Ok(())
                }
                ReadProtectionLevel::Level0 => {
                    apply_rdp_level(target, ReadProtectionLevel::Level1, &busy)
                }
            }
        })
    }

    /// Disable read protection if the device is at level 1
    ///
    /// Mirror of [`enable_rdp`]; the level-1-to-0 transition mass-erases
    /// the flash as a hardware side effect.
    ///
    /// [`enable_rdp`]: Device::enable_rdp
    pub fn disable_rdp(&mut self) -> Result<()> {
        log::info!("disabling read protection");
        let busy = self.config.busy_wait;

        self.with_session(|session| {
            let target = session.target();
            let level = optbytes::read_rdp_level(target)?;
            log::info!("current RDP level: {}", level);

            match level {
                ReadProtectionLevel::Level2 => {
                    log::error!("device is locked with level 2, aborting");
                    Err(Error::DeviceLocked)
                }
                ReadProtectionLevel::Level0 => {
                    log::info!("read protection not enabled, skipping");
                    Ok(())
                }
                ReadProtectionLevel::Level1 => {
                    apply_rdp_level(target, ReadProtectionLevel::Level0, &busy)
                }
            }
        })
    }

    /// Verify that the device reads the expected RDP level
    pub fn check_rdp(&mut self, expected: ReadProtectionLevel) -> Result<()> {
        log::info!("checking RDP level, expecting {}", expected);

        self.with_session(|session| {
            let target = session.target();
            let actual = optbytes::read_rdp_level(target)?;
            log::info!("current RDP level: {}", actual);

            if actual == ReadProtectionLevel::Level2 {
                log::error!("device is locked with level 2, aborting");
                return Err(Error::DeviceLocked);
            }

            if actual == expected {
                Ok(())
            } else {
                log::error!("RDP level does not match the requested level");
                Err(Error::ProtectionLevelMismatch { expected, actual })
            }
        })
    }

    /// Program the device with the binary image at `path`
    ///
    /// Independent of the RDP machinery; the path is checked before any
    /// transport I/O is attempted.
    pub fn program_device<F>(
        &mut self,
        path: &Path,
        programmer: &mut F,
        progress: &mut dyn ProgressReport,
    ) -> Result<()>
    where
        F: FileProgrammer<P::Session>,
    {
        if !path.exists() {
            log::error!("firmware image not found: {}", path.display());
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        log::info!("programming device with {}", path.display());
        let busy = self.config.busy_wait;

        self.with_session(|session| {
            {
                let target = session.target();
                poll::wait_bank1_free(target, &busy)?;
                poll::wait_config_free(target, &busy)?;
            }

            programmer.program(session, path, progress)?;
            log::info!("device programmed successfully");
            Ok(())
        })
    }

    /// Read the 96-bit device unique ID
    ///
    /// Does not mutate any controller state.
    pub fn read_uuid(&mut self) -> Result<DeviceUuid> {
        log::info!("reading UUID from device");

        self.with_session(|session| {
            let target = session.target();
            let words = target.read_memory_block32(regs::UUID_ADDR, regs::UUID_WORDS)?;
            if words.len() != regs::UUID_WORDS {
                return Err(Error::Transport(format!(
                    "expected {} UUID words, transport returned {}",
                    regs::UUID_WORDS,
                    words.len()
                )));
            }

            let uuid = DeviceUuid([words[0], words[1], words[2]]);
            for (idx, word) in uuid.words().iter().enumerate() {
                log::info!("UUID word [{}]: {:#010x}", idx, word);
            }
            Ok(uuid)
        })
    }
}

/// Full unlock / stage / commit / launch sequence for one target level
///
/// Either runs through the commit step or aborts before any write that
/// would leave the option register ambiguous.
fn apply_rdp_level<T: Target + ?Sized>(
    target: &mut T,
    level: ReadProtectionLevel,
    busy: &PollConfig,
) -> Result<()> {
    unlock::unlock_flash(target, busy)?;
    unlock::unlock_options(target, busy)?;
    optbytes::set_rdp_level(target, level, busy)?;
    optbytes::commit_option_change(target, busy)?;
    // Triggers an immediate MCU reset; no register access after this.
    optbytes::launch_option_load(target, busy)
}

/// Drive one workflow per probe through independently owned devices
///
/// Entry point for multi-device programming rigs: the caller supplies the
/// discovered probes and a workflow, and gets one outcome per probe. No
/// process-wide state is involved; each probe gets its own session and
/// unlock cycle.
pub fn run_each<P, F, T>(
    probes: impl IntoIterator<Item = P>,
    config: &DeviceConfig,
    mut work: F,
) -> Vec<Result<T>>
where
    P: Probe,
    F: FnMut(&mut Device<P>) -> Result<T>,
{
    probes
        .into_iter()
        .map(|probe| {
            let mut device = Device::with_config(probe, config.clone());
            work(&mut device)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ConnectMode, ResetType};

    #[test]
    fn config_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.session.target, "stm32g030f6px");
        assert_eq!(config.session.frequency_hz, 24_000_000);
        assert_eq!(config.busy_wait.timeout_us, 5_000_000);
        assert_eq!(config.settle_delay_ms, 500);
    }

    #[test]
    fn config_from_toml() {
        let config = DeviceConfig::from_toml_str(
            r#"
            settle_delay_ms = 100

            [session]
            target = "stm32g030k8"
            connect_mode = "under-reset"
            reset_type = "hardware"
            frequency_hz = 4000000

            [busy_wait]
            poll_delay_us = 50
            timeout_us = 2000000
            "#,
        )
        .unwrap();

        assert_eq!(config.session.target, "stm32g030k8");
        assert_eq!(config.session.connect_mode, ConnectMode::UnderReset);
        assert_eq!(config.session.reset_type, ResetType::Hardware);
        assert_eq!(config.session.frequency_hz, 4_000_000);
        assert_eq!(config.busy_wait.poll_delay_us, 50);
        assert_eq!(config.busy_wait.timeout_us, 2_000_000);
        assert_eq!(config.settle_delay_ms, 100);
        // Unspecified sections keep their defaults
        assert_eq!(config.halt_wait, DeviceConfig::default().halt_wait);
    }

    #[test]
    fn config_rejects_bad_toml() {
        match DeviceConfig::from_toml_str("settle_delay_ms = \"soon\"") {
            Err(Error::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn uuid_display() {
        let uuid = DeviceUuid([0x11223344, 0x55667788, 0x99AABBCC]);
        assert_eq!(uuid.to_string(), "11223344-55667788-99aabbcc");
    }
}
