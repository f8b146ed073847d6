//! On-disk naming of partial and combined artifacts.
//!
//! ```text
//! <out_dir>/
//! ├── 1.csv, 2.csv, ...             partial success files (transient)
//! └── onboarded-records.csv         combined success artifact
//! <log_dir>/
//! ├── 1-errors.csv, 2-errors.csv    partial error files (transient)
//! ├── 1-results.txt, ...            per-worker text logs
//! ├── 0-total-execution-time.txt    run-level text log
//! └── output-errors.csv             combined error artifact
//! ```

use std::path::{Path, PathBuf};

use fanout_shared::{FanoutError, Result, WorkerId};

const COMBINED_OUTPUT_FILE: &str = "onboarded-records.csv";
const COMBINED_ERROR_FILE: &str = "output-errors.csv";
const RUN_LOG_FILE: &str = "0-total-execution-time.txt";

const WRITE_CHECK_FILE: &str = ".fanout-write-check";

/// Where one run reads and writes its artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub out_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(out_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    pub fn partial_output(&self, worker: WorkerId) -> PathBuf {
        self.out_dir.join(format!("{worker}.csv"))
    }

    pub fn partial_errors(&self, worker: WorkerId) -> PathBuf {
        self.log_dir.join(format!("{worker}-errors.csv"))
    }

    pub fn worker_log(&self, worker: WorkerId) -> PathBuf {
        self.log_dir.join(format!("{worker}-results.txt"))
    }

    pub fn combined_output(&self) -> PathBuf {
        self.out_dir.join(COMBINED_OUTPUT_FILE)
    }

    pub fn combined_errors(&self) -> PathBuf {
        self.log_dir.join(COMBINED_ERROR_FILE)
    }

    pub fn run_log(&self) -> PathBuf {
        self.log_dir.join(RUN_LOG_FILE)
    }

    /// Create both directories and check they accept new files.
    ///
    /// Called before any worker starts so an unwritable directory stops the
    /// run up front instead of inside a worker.
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.out_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|e| FanoutError::io(dir, e))?;
            check_writable(dir)?;
        }
        Ok(())
    }
}

fn check_writable(dir: &Path) -> Result<()> {
    let marker = dir.join(WRITE_CHECK_FILE);
    std::fs::write(&marker, b"").map_err(|e| FanoutError::io(&marker, e))?;
    std::fs::remove_file(&marker).map_err(|e| FanoutError::io(&marker, e))
}
