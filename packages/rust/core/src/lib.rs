//! Core pipeline orchestration and domain logic for fanout.
//!
//! This crate ties together schema validation, partitioning, per-record
//! enrichment and aggregation into one end-to-end [`run`].

pub mod input;
pub mod partition;
pub mod pipeline;
pub mod processor;
pub mod run_log;
pub mod schema;

pub use input::{InputTable, Partition, open_input};
pub use partition::{PartitionBounds, PartitionPlan, plan_partitions};
pub use pipeline::{ProgressReporter, RunConfig, RunResult, SilentProgress, run};
pub use processor::{RecordFault, WorkerContext, WorkerSummary, process_partition};
pub use schema::Schema;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use fanout_artifacts::ArtifactLayout;
    use fanout_enrichment::{
        EnrichmentClient, EnrichmentError, EnrichmentErrorKind, EnrichmentResult,
    };
    use fanout_shared::RequestId;

    pub const FAKE_ENDPOINT: &str = "http://enrich.test/records";

    /// In-process client: returns `1000 + identifier`, or a 500 for the
    /// identifiers it was told to fail.
    #[derive(Default)]
    pub struct FakeClient {
        failing: HashSet<i64>,
        delays: HashMap<i64, Duration>,
        calls: Mutex<Vec<i64>>,
    }

    impl FakeClient {
        pub fn failing_on(ids: impl IntoIterator<Item = i64>) -> Self {
            Self {
                failing: ids.into_iter().collect(),
                ..Self::default()
            }
        }

        pub fn delayed(mut self, id: i64, delay: Duration) -> Self {
            self.delays.insert(id, delay);
            self
        }

        /// Identifiers seen, in call order.
        pub fn calls(&self) -> Vec<i64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EnrichmentClient for FakeClient {
        async fn enrich(
            &self,
            identifier: i64,
            value: f64,
        ) -> Result<EnrichmentResult, EnrichmentError> {
            self.calls.lock().unwrap().push(identifier);
            if let Some(delay) = self.delays.get(&identifier) {
                tokio::time::sleep(*delay).await;
            }

            let request_id = RequestId::new();
            if self.failing.contains(&identifier) {
                return Err(EnrichmentError {
                    kind: EnrichmentErrorKind::Status,
                    request_id,
                    endpoint: FAKE_ENDPOINT.into(),
                    status: Some(500),
                    request_body: format!("{{\"colID\":{identifier},\"processedVar\":{value}}}"),
                    response_body: Some("boom".into()),
                    message: "HTTP 500 Internal Server Error".into(),
                });
            }

            Ok(EnrichmentResult {
                request_id,
                id: 1000 + identifier,
                status: 201,
                latency: Duration::from_millis(1),
            })
        }

        fn endpoint(&self) -> &str {
            FAKE_ENDPOINT
        }
    }

    /// A prepared layout under a fresh temp root.
    pub fn temp_layout() -> (PathBuf, ArtifactLayout) {
        let root = std::env::temp_dir().join(format!("fanout-core-test-{}", uuid::Uuid::now_v7()));
        let layout = ArtifactLayout::new(root.join("out_csv"), root.join("logging"));
        layout.prepare().unwrap();
        (root, layout)
    }
}
