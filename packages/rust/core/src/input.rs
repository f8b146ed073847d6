//! Two-pass CSV input.
//!
//! Pass 1 ([`open_input`]) reads the header, validates the schema and counts
//! data rows. Pass 2 ([`InputTable::read_partitions`]) re-reads the file and
//! cuts it into the partitions computed from that count. The file is only
//! ever read here, before any worker starts.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, Reader};
use tracing::{debug, info, instrument};

use fanout_shared::{FanoutError, Header, Record, Result, SchemaConfig};

use crate::partition::{PartitionBounds, PartitionPlan};
use crate::schema::Schema;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// The records handed to one worker.
#[derive(Debug, Clone)]
pub struct Partition {
    pub bounds: PartitionBounds,
    pub records: Vec<Record>,
}

/// A validated input file whose data rows have been counted.
#[derive(Debug)]
pub struct InputTable {
    path: PathBuf,
    schema: Schema,
    total_rows: usize,
}

/// Pass 1: read the header, check the schema, count the data rows.
///
/// An empty file has an empty header and therefore fails schema validation.
/// Rows with a different field count than the header are a fatal
/// [`FanoutError::Csv`].
#[instrument(skip_all, fields(path = %path.display()))]
pub fn open_input(path: &Path, config: &SchemaConfig) -> Result<InputTable> {
    let mut reader = open_reader(path)?;
    let mut record = ByteRecord::new();

    let header = if read_row(&mut reader, &mut record, path)? {
        decode_header(&record)
    } else {
        Header::new(Vec::new())
    };
    let schema = Schema::from_header(header, config)?;

    let mut total_rows = 0;
    while read_row(&mut reader, &mut record, path)? {
        total_rows += 1;
    }

    info!(
        total_rows,
        columns = schema.header().len(),
        "input validated"
    );

    Ok(InputTable {
        path: path.to_path_buf(),
        schema,
        total_rows,
    })
}

impl InputTable {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Data rows counted by pass 1 (header excluded).
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Pass 2: materialize one [`Partition`] per planned worker.
    ///
    /// Fails if the file no longer has the row count pass 1 saw.
    #[instrument(skip_all, fields(path = %self.path.display(), workers = plan.effective_workers()))]
    pub fn read_partitions(&self, plan: &PartitionPlan) -> Result<Vec<Partition>> {
        if plan.total_rows != self.total_rows {
            return Err(FanoutError::validation(format!(
                "partition plan covers {} rows but the input has {}",
                plan.total_rows, self.total_rows
            )));
        }

        let mut reader = open_reader(&self.path)?;
        let mut row = ByteRecord::new();

        // Header, already validated.
        read_row(&mut reader, &mut row, &self.path)?;

        let mut partitions = Vec::with_capacity(plan.bounds().len());
        for bounds in plan.bounds() {
            let mut records = Vec::with_capacity(bounds.len());
            for number in bounds.record_numbers() {
                if !read_row(&mut reader, &mut row, &self.path)? {
                    return Err(FanoutError::csv(
                        &self.path,
                        format!(
                            "input ended at row {} while reading worker {}'s partition",
                            number - 1,
                            bounds.worker
                        ),
                    ));
                }
                records.push(Record::new(number, raw_fields(&row)));
            }
            debug!(worker = %bounds.worker, records = records.len(), "partition materialized");
            partitions.push(Partition {
                bounds: *bounds,
                records,
            });
        }

        Ok(partitions)
    }
}

fn open_reader(path: &Path) -> Result<Reader<File>> {
    let file = File::open(path).map_err(|e| FanoutError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(file))
}

fn read_row(reader: &mut Reader<File>, row: &mut ByteRecord, path: &Path) -> Result<bool> {
    reader
        .read_byte_record(row)
        .map_err(|e| FanoutError::csv(path, e))
}

/// Input is 8-bit text in no particular encoding. Fields are kept as bytes;
/// only the columns that get parsed are ever decoded.
fn raw_fields(row: &ByteRecord) -> Vec<Vec<u8>> {
    row.iter().map(<[u8]>::to_vec).collect()
}

fn decode_header(row: &ByteRecord) -> Header {
    let mut columns = raw_fields(row);
    if let Some(first) = columns.first_mut() {
        if first.starts_with(UTF8_BOM) {
            first.drain(..UTF8_BOM.len());
        }
    }
    Header::from_raw(columns)
}
