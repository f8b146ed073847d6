//! Record enrichment client.
//!
//! The pipeline only sees the [`EnrichmentClient`] trait: one call per
//! record, one network attempt per call, no retries. [`HttpEnrichmentClient`]
//! is the production adapter that POSTs each record to a JSON endpoint.

mod http;

use std::time::Duration;

use async_trait::async_trait;
use fanout_shared::RequestId;

pub use http::{HttpClientOptions, HttpEnrichmentClient, REQUEST_ID_HEADER};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Successful enrichment of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    /// Trace id sent with the call.
    pub request_id: RequestId,
    /// Identifier returned by the service.
    pub id: i64,
    /// HTTP status of the response.
    pub status: u16,
    /// Wall time of the call.
    pub latency: Duration,
}

/// Which step of the call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentErrorKind {
    /// The request body could not be built.
    Encode,
    /// The request never produced a response (connect, TLS, timeout).
    Transport,
    /// The service answered with a non-2xx status.
    Status,
    /// A 2xx response body did not contain an integer `id`.
    Decode,
}

impl std::fmt::Display for EnrichmentErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Encode => "encode error",
            Self::Transport => "transport error",
            Self::Status => "http status error",
            Self::Decode => "decode error",
        };
        f.write_str(s)
    }
}

/// A failed enrichment call, with enough context to fill an error row.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} calling {endpoint} (request {request_id}): {message}")]
pub struct EnrichmentError {
    pub kind: EnrichmentErrorKind,
    pub request_id: RequestId,
    pub endpoint: String,
    pub status: Option<u16>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Enriches one record per call.
///
/// Implementations generate a fresh [`RequestId`] for every call and report
/// it on both the success and the error path.
#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    /// Send `identifier` and the derived `value`, returning the service's id.
    async fn enrich(&self, identifier: i64, value: f64)
    -> Result<EnrichmentResult, EnrichmentError>;

    /// Target endpoint, recorded on error rows.
    fn endpoint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_kind_and_endpoint() {
        let err = EnrichmentError {
            kind: EnrichmentErrorKind::Status,
            request_id: RequestId::new(),
            endpoint: "https://api.example.com/records".into(),
            status: Some(503),
            request_body: "{}".into(),
            response_body: Some("busy".into()),
            message: "HTTP 503 Service Unavailable".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("http status error calling https://api.example.com/records"));
        assert!(msg.ends_with("HTTP 503 Service Unavailable"));
    }
}
