//! Fold per-worker partials into the two combined artifacts.
//!
//! Runs strictly after every worker has finished. Partials are visited in
//! worker-id order, so the combined rows follow input order no matter which
//! worker finished first.

use std::fs::File;
use std::path::Path;

use csv::{ByteRecord, Writer};
use tracing::{debug, info, instrument, warn};

use fanout_shared::{ERROR_HEADER, FanoutError, Header, Result, WorkerId};

use crate::layout::ArtifactLayout;

/// Row counts produced by [`aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Data rows in the combined success artifact (header excluded).
    pub output_rows: usize,
    /// Data rows in the combined error artifact (header excluded).
    pub error_rows: usize,
    /// Partial files folded in and deleted.
    pub partials_merged: usize,
}

/// Merge the partials of workers `1..=workers` and delete them.
///
/// The success header is taken from the first partial that has one; later
/// partial headers are skipped. When no partial exists, `fallback_header`
/// (if given) becomes the only row of the success artifact. A missing partial
/// counts as an empty contribution.
#[instrument(skip_all, fields(workers = workers))]
pub fn aggregate(
    layout: &ArtifactLayout,
    workers: u32,
    fallback_header: Option<&Header>,
) -> Result<AggregateSummary> {
    let combined_output = layout.combined_output();
    let combined_errors = layout.combined_errors();

    let mut output = create_combined(&combined_output)?;
    let mut errors = create_combined(&combined_errors)?;
    errors
        .write_record(ERROR_HEADER)
        .map_err(|e| FanoutError::csv(&combined_errors, e))?;

    let mut summary = AggregateSummary::default();
    let mut header_written = false;

    for id in 1..=workers {
        let worker = WorkerId::new(id);
        let output_partial = layout.partial_output(worker);
        let error_partial = layout.partial_errors(worker);

        let out_rows = fold_partial(
            &output_partial,
            &mut output,
            &combined_output,
            Some(&mut header_written),
        )?;
        let err_rows = fold_partial(&error_partial, &mut errors, &combined_errors, None)?;

        flush(&mut output, &combined_output)?;
        flush(&mut errors, &combined_errors)?;

        for (rows, path) in [(out_rows, &output_partial), (err_rows, &error_partial)] {
            if rows.is_some() {
                summary.partials_merged += 1;
                remove_partial(path);
            }
        }
        summary.output_rows += out_rows.unwrap_or(0);
        summary.error_rows += err_rows.unwrap_or(0);

        debug!(
            %worker,
            output_rows = out_rows.unwrap_or(0),
            error_rows = err_rows.unwrap_or(0),
            "worker partials folded"
        );
    }

    if !header_written {
        if let Some(header) = fallback_header {
            output
                .write_record(header.raw())
                .map_err(|e| FanoutError::csv(&combined_output, e))?;
        }
    }
    flush(&mut output, &combined_output)?;

    info!(
        output_rows = summary.output_rows,
        error_rows = summary.error_rows,
        partials_merged = summary.partials_merged,
        output = %combined_output.display(),
        errors = %combined_errors.display(),
        "aggregation complete"
    );

    Ok(summary)
}

fn create_combined(path: &Path) -> Result<Writer<File>> {
    let file = File::create(path).map_err(|e| FanoutError::io(path, e))?;
    Ok(csv::WriterBuilder::new().from_writer(file))
}

fn flush(writer: &mut Writer<File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| FanoutError::io(path, e))
}

/// Append one partial's rows to `dest`. Returns `None` when the partial does
/// not exist, otherwise the number of data rows copied.
///
/// With `header_written` set, the partial's first row is a header: it is
/// copied only if no header has been written yet.
fn fold_partial(
    partial: &Path,
    dest: &mut Writer<File>,
    dest_path: &Path,
    mut header_written: Option<&mut bool>,
) -> Result<Option<usize>> {
    let file = match File::open(partial) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %partial.display(), "no partial file, nothing to fold");
            return Ok(None);
        }
        Err(e) => return Err(FanoutError::io(partial, e)),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut record = ByteRecord::new();
    let mut first = true;
    let mut rows = 0;

    while reader
        .read_byte_record(&mut record)
        .map_err(|e| FanoutError::csv(partial, e))?
    {
        if first {
            first = false;
            if let Some(written) = header_written.as_deref_mut() {
                if !*written {
                    dest.write_byte_record(&record)
                        .map_err(|e| FanoutError::csv(dest_path, e))?;
                    *written = true;
                }
                continue;
            }
        }
        dest.write_byte_record(&record)
            .map_err(|e| FanoutError::csv(dest_path, e))?;
        rows += 1;
    }

    Ok(Some(rows))
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to delete partial file");
    }
}
