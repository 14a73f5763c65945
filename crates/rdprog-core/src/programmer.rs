//! File programmer capability
//!
//! Mass-programming rides on existing debug/flash-loader machinery; the
//! core only specifies the contract. Implementations receive an open,
//! halted session whose busy flags have already been waited out.

use crate::error::Result;
use crate::probe::Session;
use std::path::Path;

/// Receives fractional progress while an image is being programmed
pub trait ProgressReport {
    /// Called with a fraction in `[0, 1]`
    fn progress(&mut self, fraction: f64);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgressReport for NoProgress {
    fn progress(&mut self, _fraction: f64) {}
}

/// Logs progress as a percentage at info level
pub struct LogProgress;

impl ProgressReport for LogProgress {
    fn progress(&mut self, fraction: f64) {
        log::info!("programming progress: {:.2}%", fraction * 100.0);
    }
}

/// Writes a binary image into target flash through an open session
pub trait FileProgrammer<S: Session> {
    /// Program the image at `path`, reporting fractional progress
    ///
    /// The image format is owned by the implementation; the core treats it
    /// as opaque.
    fn program(
        &mut self,
        session: &mut S,
        path: &Path,
        progress: &mut dyn ProgressReport,
    ) -> Result<()>;
}
