//! Human-readable run and worker text logs.
//!
//! These files are for people, not for the pipeline: a write that fails is
//! reported through `tracing` and otherwise ignored.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// Append-only text log that never fails the caller.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
}

impl RunLog {
    /// Truncate (or create) the log at `path` and write its first line.
    pub fn begin(path: impl Into<PathBuf>, first_line: &str) -> Self {
        let path = path.into();
        let file = match File::create(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open text log, lines will be dropped");
                None
            }
        };

        let mut log = Self { path, file };
        log.append(first_line);
        log
    }

    pub fn append(&mut self, line: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), error = %e, "text log write failed");
            // Stop after the first fault instead of warning on every line.
            self.file = None;
        }
    }
}
