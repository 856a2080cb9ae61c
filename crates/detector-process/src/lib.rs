//! Runs the external elimination detector, decodes its output stream and
//! drives clip export.

mod error;
mod export;
mod protocol;
mod run;

pub use error::{DetectorError, Result};
pub use export::{ExportArgs, run_export};
pub use protocol::{DetectorMessage, DetectorOutput, parse_message};
pub use run::{DetectorArgs, DetectorEvent, run_detector};

/// Number of worker threads offered to the detector by default.
pub fn max_thread_count() -> usize {
    std::thread::available_parallelism()
        .map_or(4, |count| count.get())
        .max(1)
}
