//! rdprog-dummy - In-memory STM32G030 flash-controller emulator
//!
//! This crate provides a dummy probe that emulates the G030 flash
//! controller's lock/option-byte state machine in memory. It's useful for
//! testing and development without real hardware: key sequences, busy
//! flags, the option commit/reload cycle and the reset triggered by
//! OBL_LAUNCH all behave like the real peripheral, and every register
//! write is recorded so tests can assert exact bus traffic.

use rdprog_core::error::{Error, Result};
use rdprog_core::probe::{Probe, Session, SessionOptions, Target};
use rdprog_core::programmer::{FileProgrammer, ProgressReport};
use rdprog_core::regs::{self, Cr, Sr};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for the emulated controller
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// RDP byte committed in the option bytes
    pub rdp_byte: u8,
    /// Upper 24 bits of the committed option register
    pub optr_upper: u32,
    /// The 96-bit unique ID
    pub uuid: [u32; 3],
    /// How many FLASH_SR reads report busy after an operation starts
    pub busy_polls: u32,
    /// How many `is_halted` polls report running after a reset-and-halt
    pub halt_polls: u32,
    /// Emulated flash size in bytes
    pub flash_size: usize,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            rdp_byte: 0xAA,
            optr_upper: 0xFFFF_FE00,
            uuid: [0x1122_3344, 0x5566_7788, 0x99AA_BBCC],
            busy_polls: 2,
            halt_polls: 1,
            flash_size: 32 * 1024,
        }
    }
}

/// Progress of a two-word key sequence on a key register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStage {
    Idle,
    FirstKey,
    /// Wrong key or wrong order; the lock stays set until the next reset
    Faulted,
}

/// Emulated controller state, shared by probe, sessions and handles
struct DummyState {
    config: DummyConfig,
    cr: u32,
    /// Live option register (shadow the controller works from)
    optr: u32,
    /// Committed option bytes, reloaded on every reset
    nvm_optr: u32,
    key_stage: KeyStage,
    optkey_stage: KeyStage,
    /// FLASH_SR reads left before the busy flags clear
    busy_reads: u32,
    /// `is_halted` polls left before the core reports halted
    halt_pending: u32,
    halted: bool,
    flash: Vec<u8>,
    /// Every `write32`, in issue order
    writes: Vec<(u32, u32)>,
    sessions_opened: u32,
    session_active: bool,
}

impl DummyState {
    fn new(config: DummyConfig) -> Self {
        let nvm_optr = (config.optr_upper & regs::OPTR_WITHOUT_RDP_MASK) | config.rdp_byte as u32;
        let flash = vec![0xFF; config.flash_size];
        let mut state = Self {
            config,
            cr: 0,
            optr: 0,
            nvm_optr,
            key_stage: KeyStage::Idle,
            optkey_stage: KeyStage::Idle,
            busy_reads: 0,
            halt_pending: 0,
            halted: false,
            flash,
            writes: Vec::new(),
            sessions_opened: 0,
            session_active: false,
        };
        state.reset();
        state
    }

    /// Power-on / OBL_LAUNCH reset: locks set, option bytes reloaded
    fn reset(&mut self) {
        self.cr = (Cr::LOCK | Cr::OPTLOCK).bits();
        self.optr = self.nvm_optr;
        self.key_stage = KeyStage::Idle;
        self.optkey_stage = KeyStage::Idle;
        self.busy_reads = 0;
        self.halted = false;
    }

    fn start_busy(&mut self) {
        self.busy_reads = self.config.busy_polls;
    }

    fn cr_flags(&self) -> Cr {
        Cr::from_bits_retain(self.cr)
    }

    fn handle_key_write(&mut self, value: u32) {
        if !self.cr_flags().contains(Cr::LOCK) {
            log::debug!("dummy: key write while flash already unlocked, ignored");
            return;
        }
        self.key_stage = match (self.key_stage, value) {
            (KeyStage::Idle, regs::KEY1) => KeyStage::FirstKey,
            (KeyStage::FirstKey, regs::KEY2) => {
                self.cr &= !Cr::LOCK.bits();
                self.start_busy();
                KeyStage::Idle
            }
            _ => {
                log::debug!("dummy: bad flash key sequence, locked until reset");
                KeyStage::Faulted
            }
        };
    }

    fn handle_optkey_write(&mut self, value: u32) {
        let cr = self.cr_flags();
        if cr.contains(Cr::LOCK) {
            log::debug!("dummy: option key write while flash still locked, ignored");
            return;
        }
        if !cr.contains(Cr::OPTLOCK) {
            log::debug!("dummy: option key write while options already unlocked, ignored");
            return;
        }
        self.optkey_stage = match (self.optkey_stage, value) {
            (KeyStage::Idle, regs::OPTKEY1) => KeyStage::FirstKey,
            (KeyStage::FirstKey, regs::OPTKEY2) => {
                self.cr &= !Cr::OPTLOCK.bits();
                self.start_busy();
                KeyStage::Idle
            }
            _ => {
                log::debug!("dummy: bad option key sequence, locked until reset");
                KeyStage::Faulted
            }
        };
    }

    fn handle_optr_write(&mut self, value: u32) {
        let cr = self.cr_flags();
        if cr.contains(Cr::LOCK) || cr.contains(Cr::OPTLOCK) {
            log::debug!("dummy: FLASH_OPTR write while locked, ignored");
            return;
        }
        self.optr = value;
        self.start_busy();
    }

    fn handle_cr_write(&mut self, value: u32) {
        let requested = Cr::from_bits_retain(value);
        if self.cr_flags().contains(Cr::OPTLOCK) {
            if requested.intersects(Cr::OPTSTRT | Cr::OBL_LAUNCH) {
                log::debug!("dummy: option operation requested while OPTLOCK set, ignored");
            }
            return;
        }
        if requested.contains(Cr::OPTSTRT) {
            self.nvm_optr = self.optr;
            self.start_busy();
        }
        if requested.contains(Cr::OBL_LAUNCH) {
            // Reloading option bytes resets the MCU; the core comes back
            // up running, with both locks set again.
            self.reset();
        }
        // OPTSTRT and OBL_LAUNCH self-clear; only the lock bits persist in CR.
    }
}

/// Handle for inspecting emulator state from tests
///
/// Clone it off the probe before handing the probe to a `Device`.
#[derive(Clone)]
pub struct DummyHandle {
    state: Arc<Mutex<DummyState>>,
}

impl DummyHandle {
    fn state(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().expect("dummy controller mutex poisoned")
    }

    /// Every `write32` issued so far, in order
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state().writes.clone()
    }

    /// The values written to one address, in order
    pub fn writes_to(&self, addr: u32) -> Vec<u32> {
        self.state()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of writes issued to one address
    pub fn write_count(&self, addr: u32) -> usize {
        self.writes_to(addr).len()
    }

    /// Live FLASH_OPTR value
    pub fn optr(&self) -> u32 {
        self.state().optr
    }

    /// Committed option-byte value (what a reset reloads)
    pub fn committed_optr(&self) -> u32 {
        self.state().nvm_optr
    }

    /// Live RDP byte
    pub fn rdp_byte(&self) -> u8 {
        (self.state().optr & regs::OPTR_RDP_MASK) as u8
    }

    /// Live FLASH_CR value
    pub fn cr(&self) -> u32 {
        self.state().cr
    }

    /// Whether both lock bits are set
    pub fn is_locked(&self) -> bool {
        self.state()
            .cr_flags()
            .contains(Cr::LOCK | Cr::OPTLOCK)
    }

    /// How many sessions have been opened against this probe
    pub fn sessions_opened(&self) -> u32 {
        self.state().sessions_opened
    }

    /// Copy of the emulated flash contents
    pub fn flash(&self) -> Vec<u8> {
        self.state().flash.clone()
    }
}

/// Emulated debug probe attached to one emulated G030
pub struct DummyProbe {
    state: Arc<Mutex<DummyState>>,
}

impl DummyProbe {
    /// Create a probe with the given controller configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(DummyState::new(config))),
        }
    }

    /// Create a probe with the default configuration (unprotected device)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Inspection handle sharing this probe's state
    pub fn handle(&self) -> DummyHandle {
        DummyHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Probe for DummyProbe {
    type Session = DummySession;

    fn open(&mut self, options: &SessionOptions) -> Result<Self::Session> {
        let mut state = self.state.lock().expect("dummy controller mutex poisoned");
        if state.session_active {
            return Err(Error::Transport(String::from(
                "a session is already open against this probe",
            )));
        }
        log::debug!(
            "dummy: opening session (target {}, {} Hz)",
            options.target,
            options.frequency_hz
        );
        state.session_active = true;
        state.sessions_opened += 1;
        drop(state);

        Ok(DummySession {
            target: DummyTarget {
                state: Arc::clone(&self.state),
            },
        })
    }
}

/// One open session against the emulated device
pub struct DummySession {
    target: DummyTarget,
}

impl Session for DummySession {
    type Target = DummyTarget;

    fn target(&mut self) -> &mut Self::Target {
        &mut self.target
    }

    fn close(self) -> Result<()> {
        let mut state = self
            .target
            .state
            .lock()
            .expect("dummy controller mutex poisoned");
        state.session_active = false;
        log::debug!("dummy: session closed");
        Ok(())
    }
}

/// Register-level view of the emulated controller
pub struct DummyTarget {
    state: Arc<Mutex<DummyState>>,
}

impl DummyTarget {
    fn state(&self) -> MutexGuard<'_, DummyState> {
        self.state.lock().expect("dummy controller mutex poisoned")
    }
}

impl Target for DummyTarget {
    fn read32(&mut self, addr: u32) -> Result<u32> {
        let mut state = self.state();
        match addr {
            regs::FLASH_SR => {
                if state.busy_reads > 0 {
                    state.busy_reads -= 1;
                    Ok((Sr::BSY1 | Sr::CFGBSY).bits())
                } else {
                    Ok(0)
                }
            }
            regs::FLASH_CR => Ok(state.cr),
            regs::FLASH_OPTR => Ok(state.optr),
            _ => Err(Error::Transport(format!(
                "read from unmapped address {:#010x}",
                addr
            ))),
        }
    }

    fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        let mut state = self.state();
        state.writes.push((addr, value));
        match addr {
            regs::FLASH_KEYR => state.handle_key_write(value),
            regs::FLASH_OPTKEYR => state.handle_optkey_write(value),
            regs::FLASH_OPTR => state.handle_optr_write(value),
            regs::FLASH_CR => state.handle_cr_write(value),
            _ => {
                return Err(Error::Transport(format!(
                    "write to unmapped address {:#010x}",
                    addr
                )))
            }
        }
        Ok(())
    }

    fn reset_and_halt(&mut self) -> Result<()> {
        let mut state = self.state();
        state.reset();
        state.halt_pending = state.config.halt_polls;
        Ok(())
    }

    fn is_halted(&mut self) -> Result<bool> {
        let mut state = self.state();
        if state.halt_pending > 0 {
            state.halt_pending -= 1;
            Ok(false)
        } else {
            state.halted = true;
            Ok(state.halted)
        }
    }

    fn read_memory_block32(&mut self, addr: u32, count: usize) -> Result<Vec<u32>> {
        let state = self.state();
        if addr == regs::UUID_ADDR && count <= state.config.uuid.len() {
            return Ok(state.config.uuid[..count].to_vec());
        }
        Err(Error::Transport(format!(
            "block read from unmapped address {:#010x}",
            addr
        )))
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for in-memory operations
    }
}

/// File programmer writing images into the emulated flash
///
/// Reports progress once per page, as a fraction of the image written.
pub struct DummyFileProgrammer {
    page_size: usize,
}

impl DummyFileProgrammer {
    /// Create a programmer with the given page size
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }
}

impl Default for DummyFileProgrammer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl FileProgrammer<DummySession> for DummyFileProgrammer {
    fn program(
        &mut self,
        session: &mut DummySession,
        path: &Path,
        progress: &mut dyn ProgressReport,
    ) -> Result<()> {
        let image = std::fs::read(path)?;
        let mut state = session.target.state();

        if image.len() > state.flash.len() {
            return Err(Error::Transport(format!(
                "image of {} bytes does not fit in {} bytes of flash",
                image.len(),
                state.flash.len()
            )));
        }

        let total = image.len();
        let mut written = 0;
        for chunk in image.chunks(self.page_size) {
            state.flash[written..written + chunk.len()].copy_from_slice(chunk);
            written += chunk.len();
            progress.progress(written as f64 / total as f64);
        }

        Ok(())
    }
}
