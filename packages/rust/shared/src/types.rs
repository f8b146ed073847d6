//! Core domain types shared by every stage of the pipeline.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header of the combined error artifact. Partial error files carry no header.
pub const ERROR_HEADER: [&str; 11] = [
    "worker_id",
    "request_id",
    "record_identifier",
    "record_number",
    "operation",
    "endpoint",
    "http_status",
    "request_body",
    "response_body",
    "error_message",
    "timestamp",
];

/// Display format for timestamps written to error rows and text logs.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %-I:%M:%S %p";

// ---------------------------------------------------------------------------
// WorkerId
// ---------------------------------------------------------------------------

/// 1-based identity of a worker. Also keys that worker's partial artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 trace id attached to every enrichment call (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Header / ColumnIndex
// ---------------------------------------------------------------------------

/// Ordered column names from the first input row.
///
/// The raw bytes are what the success artifacts write back out; the decoded
/// names are only used to look columns up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    raw: Vec<Vec<u8>>,
    names: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            raw: columns.iter().map(|c| c.clone().into_bytes()).collect(),
            names: columns,
        }
    }

    /// Build from undecoded header fields. Names are decoded lossily.
    pub fn from_raw(raw: Vec<Vec<u8>>) -> Self {
        let names = raw
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
        Self { raw, names }
    }

    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn raw(&self) -> &[Vec<u8>] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Header of the success artifact: these columns plus the result column.
    pub fn with_appended(&self, column: &str) -> Header {
        let mut raw = self.raw.clone();
        let mut names = self.names.clone();
        raw.push(column.as_bytes().to_vec());
        names.push(column.to_string());
        Header { raw, names }
    }
}

/// Column name to positional offset. When a name repeats, the first
/// occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    pub fn from_header(header: &Header) -> Self {
        let mut map = HashMap::with_capacity(header.len());
        for (idx, name) in header.columns().iter().enumerate() {
            map.entry(name.clone()).or_insert(idx);
        }
        Self(map)
    }

    pub fn get(&self, column: &str) -> Option<usize> {
        self.0.get(column).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }
}

// ---------------------------------------------------------------------------
// Record / OutputRow
// ---------------------------------------------------------------------------

/// One data row of the input, positionally aligned to the [`Header`].
///
/// Fields stay as the bytes read from the input so they reach the success
/// artifacts unchanged, whatever their encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based row position, header excluded.
    pub number: usize,
    pub fields: Vec<Vec<u8>>,
}

impl Record {
    pub fn new(number: usize, fields: Vec<Vec<u8>>) -> Self {
        Self { number, fields }
    }

    pub fn field(&self, idx: usize) -> Option<&[u8]> {
        self.fields.get(idx).map(Vec::as_slice)
    }

    /// The field decoded for parsing or display; invalid UTF-8 is replaced.
    pub fn field_str(&self, idx: usize) -> Option<Cow<'_, str>> {
        self.field(idx).map(String::from_utf8_lossy)
    }
}

/// An enriched record: the original fields plus the returned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow(Vec<Vec<u8>>);

impl OutputRow {
    pub fn new(record: Record, result_id: i64) -> Self {
        let mut fields = record.fields;
        fields.push(result_id.to_string().into_bytes());
        Self(fields)
    }

    pub fn fields(&self) -> &[Vec<u8>] {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// ErrorEntry
// ---------------------------------------------------------------------------

/// One failed record, as written to a worker's partial error file.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub worker: WorkerId,
    /// Absent when the record failed before any call was attempted.
    pub request_id: Option<RequestId>,
    pub record_identifier: String,
    pub record_number: usize,
    pub operation: String,
    pub endpoint: String,
    pub status: Option<u16>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub message: String,
    pub timestamp: String,
}

impl ErrorEntry {
    /// Fields in [`ERROR_HEADER`] order.
    pub fn to_row(&self) -> [String; 11] {
        [
            self.worker.to_string(),
            self.request_id.map(|id| id.to_string()).unwrap_or_default(),
            self.record_identifier.clone(),
            self.record_number.to_string(),
            self.operation.clone(),
            self.endpoint.clone(),
            self.status.map(|s| s.to_string()).unwrap_or_default(),
            self.request_body.clone(),
            self.response_body.clone().unwrap_or_default(),
            self.message.clone(),
            self.timestamp.clone(),
        ]
    }
}

/// Format a local time the way error rows and text logs display it.
pub fn format_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The current local time, formatted with [`format_timestamp`].
pub fn timestamp_now() -> String {
    format_timestamp(Local::now())
}
