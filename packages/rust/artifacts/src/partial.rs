//! Per-worker partial artifact writers.
//!
//! Each worker owns exactly one [`PartialOutputWriter`] and one
//! [`PartialErrorWriter`]; no path is ever shared between workers. Every row
//! is flushed as soon as it is written.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::Writer;
use tracing::debug;

use fanout_shared::{ErrorEntry, FanoutError, Header, OutputRow, Result};

fn create_writer(path: &Path) -> Result<Writer<File>> {
    let file = File::create(path).map_err(|e| FanoutError::io(path, e))?;
    Ok(csv::WriterBuilder::new().from_writer(file))
}

fn flush(writer: &mut Writer<File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| FanoutError::io(path, e))
}

// ---------------------------------------------------------------------------
// Success rows
// ---------------------------------------------------------------------------

/// Writes a worker's enriched rows, preceded by the output header.
#[derive(Debug)]
pub struct PartialOutputWriter {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl PartialOutputWriter {
    /// Create (or truncate) the file and write `header` as its first row.
    pub fn create(path: impl Into<PathBuf>, header: &Header) -> Result<Self> {
        let path = path.into();
        let mut writer = create_writer(&path)?;
        writer
            .write_record(header.raw())
            .map_err(|e| FanoutError::csv(&path, e))?;
        flush(&mut writer, &path)?;

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn write_row(&mut self, row: &OutputRow) -> Result<()> {
        self.writer
            .write_record(row.fields())
            .map_err(|e| FanoutError::csv(&self.path, e))?;
        flush(&mut self.writer, &self.path)?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<usize> {
        flush(&mut self.writer, &self.path)?;
        Ok(self.rows)
    }
}

// ---------------------------------------------------------------------------
// Error rows
// ---------------------------------------------------------------------------

/// Writes a worker's error rows. The file is only created once the first
/// error arrives, so a worker without failures leaves no error partial.
#[derive(Debug)]
pub struct PartialErrorWriter {
    path: PathBuf,
    writer: Option<Writer<File>>,
    rows: usize,
}

impl PartialErrorWriter {
    /// Prepare the writer, removing any file left at `path` by an earlier run.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale partial error file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(FanoutError::io(&path, e)),
        }

        Ok(Self {
            path,
            writer: None,
            rows: 0,
        })
    }

    pub fn write_entry(&mut self, entry: &ErrorEntry) -> Result<()> {
        let writer = match &mut self.writer {
            Some(writer) => writer,
            slot @ None => slot.insert(create_writer(&self.path)?),
        };
        writer
            .write_record(entry.to_row())
            .map_err(|e| FanoutError::csv(&self.path, e))?;
        flush(writer, &self.path)?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        if let Some(writer) = self.writer.as_mut() {
            flush(writer, &self.path)?;
        }
        Ok(self.rows)
    }
}
