//! HTTP adapter: one JSON POST per record with bearer auth and a trace header.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use fanout_shared::{FanoutError, RequestId, Result};

use crate::{EnrichmentClient, EnrichmentError, EnrichmentErrorKind, EnrichmentResult};

/// Header carrying the per-call trace id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// User-Agent string for enrichment requests.
const USER_AGENT: &str = concat!("fanout/", env!("CARGO_PKG_VERSION"));

/// Body of each enrichment request.
#[derive(Debug, Serialize)]
struct RequestBody {
    #[serde(rename = "colID")]
    col_id: i64,
    #[serde(rename = "processedVar")]
    processed_var: f64,
}

/// The only part of a 2xx response the pipeline uses.
#[derive(Debug, Deserialize)]
struct ResponseBody {
    id: i64,
}

/// Settings for [`HttpEnrichmentClient`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub endpoint: Url,
    pub token: String,
    /// `None` means no deadline on a call.
    pub timeout: Option<Duration>,
}

/// Production [`EnrichmentClient`] backed by `reqwest`.
pub struct HttpEnrichmentClient {
    client: Client,
    endpoint: Url,
    endpoint_str: String,
    token: String,
}

impl HttpEnrichmentClient {
    /// Build the client. Fails only if the TLS backend cannot be initialised.
    pub fn new(opts: HttpClientOptions) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FanoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint_str: opts.endpoint.to_string(),
            endpoint: opts.endpoint,
            token: opts.token,
        })
    }

    fn error(
        &self,
        kind: EnrichmentErrorKind,
        request_id: RequestId,
        request_body: &str,
        message: impl Into<String>,
    ) -> EnrichmentError {
        EnrichmentError {
            kind,
            request_id,
            endpoint: self.endpoint_str.clone(),
            status: None,
            request_body: request_body.to_string(),
            response_body: None,
            message: message.into(),
        }
    }
}

#[async_trait]
impl EnrichmentClient for HttpEnrichmentClient {
    async fn enrich(
        &self,
        identifier: i64,
        value: f64,
    ) -> std::result::Result<EnrichmentResult, EnrichmentError> {
        let request_id = RequestId::new();
        let body = RequestBody {
            col_id: identifier,
            processed_var: value,
        };
        let request_body = serde_json::to_string(&body).map_err(|e| {
            self.error(EnrichmentErrorKind::Encode, request_id, "", e.to_string())
        })?;

        let start = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .body(request_body.clone())
            .send()
            .await
            .map_err(|e| {
                self.error(
                    EnrichmentErrorKind::Transport,
                    request_id,
                    &request_body,
                    e.to_string(),
                )
            })?;

        let status = response.status();
        debug!(%request_id, identifier, %status, "enrichment response");

        // A body that cannot be read is reported with whatever we have.
        let text = response.text().await;

        if !status.is_success() {
            let mut err = self.error(
                EnrichmentErrorKind::Status,
                request_id,
                &request_body,
                format!("HTTP {status}"),
            );
            err.status = Some(status.as_u16());
            err.response_body = text.ok();
            return Err(err);
        }

        let text = text.map_err(|e| {
            let mut err = self.error(
                EnrichmentErrorKind::Transport,
                request_id,
                &request_body,
                format!("failed to read body: {e}"),
            );
            err.status = Some(status.as_u16());
            err
        })?;

        let parsed: ResponseBody = serde_json::from_str(&text).map_err(|e| {
            let mut err = self.error(
                EnrichmentErrorKind::Decode,
                request_id,
                &request_body,
                format!("response has no integer id: {e}"),
            );
            err.status = Some(status.as_u16());
            err.response_body = Some(text.clone());
            err
        })?;

        Ok(EnrichmentResult {
            request_id,
            id: parsed.id,
            status: status.as_u16(),
            latency: start.elapsed(),
        })
    }

    fn endpoint(&self) -> &str {
        &self.endpoint_str
    }
}
