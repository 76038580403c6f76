//! Routing-engine error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading an oracle schedule
///
/// Malformed lines are not errors; they are skipped while parsing. Only
/// failing to read the source at all is reported.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The schedule file could not be read
    #[error("Failed to read schedule {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
