//! Record Processor: enrich one partition, one record at a time.
//!
//! Each record ends up in exactly one place: an [`OutputRow`] in the worker's
//! partial success file, or an [`ErrorEntry`] in its partial error file. A
//! record that fails never stops the worker. Failing to write either partial
//! file does, and the error is returned to the pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use fanout_artifacts::{ArtifactLayout, PartialErrorWriter, PartialOutputWriter};
use fanout_enrichment::{EnrichmentClient, EnrichmentError};
use fanout_shared::{ErrorEntry, OutputRow, Record, Result, WorkerId, timestamp_now};

use crate::input::Partition;
use crate::run_log::RunLog;
use crate::schema::Schema;

/// Operation name on error rows for records rejected before any call.
pub const PARSE_OPERATION: &str = "parse_record";
/// Operation name on error rows for failed enrichment calls.
pub const ENRICH_OPERATION: &str = "enrich_record";

/// Why a single record was not enriched.
#[derive(Debug, thiserror::Error)]
pub enum RecordFault {
    #[error("record has no \"{column}\" field")]
    MissingField { column: String },

    #[error("\"{column}\" is not a valid {expected}: {value:?}")]
    InvalidNumber {
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

impl RecordFault {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Enrichment(_) => ENRICH_OPERATION,
            _ => PARSE_OPERATION,
        }
    }

    /// Build the error row for `record`, processed by `worker`.
    pub fn to_entry(&self, worker: WorkerId, record: &Record, schema: &Schema) -> ErrorEntry {
        let record_identifier = record
            .field_str(schema.positions().id)
            .unwrap_or_default()
            .into_owned();

        let mut entry = ErrorEntry {
            worker,
            request_id: None,
            record_identifier,
            record_number: record.number,
            operation: self.operation().to_string(),
            endpoint: String::new(),
            status: None,
            request_body: String::new(),
            response_body: None,
            message: self.to_string(),
            timestamp: timestamp_now(),
        };

        if let Self::Enrichment(err) = self {
            entry.request_id = Some(err.request_id);
            entry.endpoint = err.endpoint.clone();
            entry.status = err.status;
            entry.request_body = err.request_body.clone();
            entry.response_body = err.response_body.clone();
            entry.message = err.message.clone();
        }

        entry
    }
}

/// The typed values a record is enriched with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichInput {
    pub identifier: i64,
    /// `count × rate`.
    pub value: f64,
}

/// Extract and validate the identifier, count and rate of one record.
///
/// Numbers are trimmed before parsing. A rate or derived value that is not
/// finite is rejected like any other unparseable number.
pub fn prepare_record(
    record: &Record,
    schema: &Schema,
) -> std::result::Result<EnrichInput, RecordFault> {
    let positions = schema.positions();
    let names = schema.names();

    let identifier: i64 = parse_field(record, positions.id, &names.id_column, "integer")?;
    let count: i64 = parse_field(record, positions.count, &names.count_column, "integer")?;
    let rate: f64 = parse_field(record, positions.rate, &names.rate_column, "number")?;
    if !rate.is_finite() {
        return Err(invalid(record, positions.rate, &names.rate_column, "finite number"));
    }

    let value = count as f64 * rate;
    if !value.is_finite() {
        return Err(invalid(record, positions.rate, &names.rate_column, "finite number"));
    }

    Ok(EnrichInput { identifier, value })
}

fn parse_field<T: std::str::FromStr>(
    record: &Record,
    idx: usize,
    column: &str,
    expected: &'static str,
) -> std::result::Result<T, RecordFault> {
    let raw = record.field_str(idx).ok_or_else(|| RecordFault::MissingField {
        column: column.to_string(),
    })?;
    raw.trim()
        .parse()
        .map_err(|_| invalid(record, idx, column, expected))
}

fn invalid(record: &Record, idx: usize, column: &str, expected: &'static str) -> RecordFault {
    RecordFault::InvalidNumber {
        column: column.to_string(),
        value: record.field_str(idx).unwrap_or_default().into_owned(),
        expected,
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Everything one worker needs. The schema and client are shared read-only.
#[derive(Clone)]
pub struct WorkerContext {
    pub worker: WorkerId,
    pub schema: Arc<Schema>,
    pub client: Arc<dyn EnrichmentClient>,
    pub layout: ArtifactLayout,
}

/// Outcome of one worker's partition.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSummary {
    pub worker: WorkerId,
    pub records: usize,
    pub enriched: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Process every record of `partition` in order, awaiting each enrichment
/// call before starting the next.
#[instrument(skip_all, fields(worker = %ctx.worker, records = partition.records.len()))]
pub async fn process_partition(ctx: WorkerContext, partition: Partition) -> Result<WorkerSummary> {
    let start = Instant::now();
    let worker = ctx.worker;

    let mut log = RunLog::begin(
        ctx.layout.worker_log(worker),
        &format!("Start All Records from Routine #{worker}: {}\n", timestamp_now()),
    );

    let mut output =
        PartialOutputWriter::create(ctx.layout.partial_output(worker), ctx.schema.output_header())?;
    let mut errors = PartialErrorWriter::new(ctx.layout.partial_errors(worker))?;

    info!(first = partition.bounds.start + 1, last = partition.bounds.end, "worker started");

    let total = partition.records.len();
    for record in partition.records {
        let number = record.number;

        match enrich_record(&ctx, &record).await {
            Ok((result_id, latency)) => {
                log.append(&format!(
                    "Record #{number} ({}) returned id {result_id} in {} ms",
                    record.field_str(ctx.schema.positions().id).unwrap_or_default(),
                    latency.as_millis()
                ));
                output.write_row(&OutputRow::new(record, result_id))?;
            }
            Err(fault) => {
                warn!(record = number, operation = fault.operation(), error = %fault, "record failed");
                let entry = fault.to_entry(worker, &record, &ctx.schema);
                errors.write_entry(&entry)?;
            }
        }
    }

    let enriched = output.finish()?;
    let failed = errors.finish()?;
    let elapsed = start.elapsed();

    log.append(&format!(
        "Finished All Records for routine #{worker} \nNum of Records Processed: {enriched} \nTotal Execution Time: {} seconds \n",
        elapsed.as_secs()
    ));
    info!(enriched, failed, elapsed_ms = elapsed.as_millis() as u64, "worker finished");

    Ok(WorkerSummary {
        worker,
        records: total,
        enriched,
        failed,
        elapsed,
    })
}

async fn enrich_record(
    ctx: &WorkerContext,
    record: &Record,
) -> std::result::Result<(i64, Duration), RecordFault> {
    let input = prepare_record(record, &ctx.schema)?;
    let result = ctx.client.enrich(input.identifier, input.value).await?;
    debug!(
        record = record.number,
        request_id = %result.request_id,
        status = result.status,
        id = result.id,
        "record enriched"
    );
    Ok((result.id, result.latency))
}
