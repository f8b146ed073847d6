//! End-to-end run: input → schema → partitions → workers → barrier → aggregate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use fanout_artifacts::{ArtifactLayout, aggregate};
use fanout_enrichment::EnrichmentClient;
use fanout_shared::{FanoutError, Result, SchemaConfig, WorkerId, timestamp_now};

use crate::input::open_input;
use crate::partition::plan_partitions;
use crate::processor::{WorkerContext, WorkerSummary, process_partition};
use crate::run_log::RunLog;

/// Configuration for one [`run`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input CSV; the first row is the header.
    pub input_path: PathBuf,
    /// Where partial and combined artifacts go.
    pub layout: ArtifactLayout,
    /// Requested worker count. Must be positive.
    pub requested_workers: u32,
    /// Names of the required and result columns.
    pub schema: SchemaConfig,
}

/// Result of a completed [`run`].
#[derive(Debug)]
pub struct RunResult {
    /// Data rows in the input.
    pub total_records: usize,
    /// Workers actually started: `min(requested, total_records)`.
    pub effective_workers: u32,
    /// Rows in the combined success artifact.
    pub enriched: usize,
    /// Rows in the combined error artifact.
    pub failed: usize,
    pub combined_output: PathBuf,
    pub combined_errors: PathBuf,
    /// Total elapsed time.
    pub elapsed: Duration,
    /// Per-worker outcomes, in worker-id order.
    pub workers: Vec<WorkerSummary>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time a worker finishes, in completion order.
    fn worker_finished(&self, summary: &WorkerSummary, finished: u32, total: u32);
    /// Called when the run completes.
    fn done(&self, result: &RunResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn worker_finished(&self, _summary: &WorkerSummary, _finished: u32, _total: u32) {}
    fn done(&self, _result: &RunResult) {}
}

/// Run the full pipeline.
///
/// 1. Prepare the output and log directories
/// 2. Read the header, validate the schema, count rows
/// 3. Plan and materialize partitions
/// 4. Spawn one task per partition and wait for all of them
/// 5. Aggregate the partials in worker-id order
///
/// Any fatal error stops the run before aggregation. A worker that fails
/// aborts the others.
#[instrument(skip_all, fields(input = %config.input_path.display(), workers = config.requested_workers))]
pub async fn run(
    config: &RunConfig,
    client: Arc<dyn EnrichmentClient>,
    progress: &dyn ProgressReporter,
) -> Result<RunResult> {
    let start = Instant::now();

    // Checked before `prepare()` so a bad count never touches the filesystem.
    if config.requested_workers == 0 {
        return Err(FanoutError::validation(
            "worker count must be a positive integer",
        ));
    }

    // --- Phase 1: Directories ---
    progress.phase("Preparing output directories");
    let layout = &config.layout;
    layout.prepare()?;

    let mut run_log = RunLog::begin(
        layout.run_log(),
        &format!("Start All Concurrent Records: {}\n", timestamp_now()),
    );

    // --- Phase 2: Input ---
    progress.phase("Reading input");
    let input = open_input(&config.input_path, &config.schema)
        .inspect_err(|e| run_log.append(&format!("Run aborted: {e}")))?;
    let plan = plan_partitions(input.total_rows(), config.requested_workers)
        .inspect_err(|e| run_log.append(&format!("Run aborted: {e}")))?;
    let partitions = input
        .read_partitions(&plan)
        .inspect_err(|e| run_log.append(&format!("Run aborted: {e}")))?;
    let schema = Arc::new(input.into_schema());

    info!(
        total_records = plan.total_rows,
        effective_workers = plan.effective_workers(),
        endpoint = client.endpoint(),
        "starting workers"
    );

    // --- Phase 3: Workers ---
    progress.phase("Enriching records");
    let total = plan.effective_workers();
    let mut tasks = JoinSet::new();
    let mut task_workers = HashMap::with_capacity(partitions.len());

    for partition in partitions {
        let worker = partition.bounds.worker;
        let ctx = WorkerContext {
            worker,
            schema: Arc::clone(&schema),
            client: Arc::clone(&client),
            layout: layout.clone(),
        };
        let handle = tasks.spawn(process_partition(ctx, partition));
        task_workers.insert(handle.id(), worker);
    }

    let mut summaries = Vec::with_capacity(total as usize);
    while let Some(joined) = tasks.join_next_with_id().await {
        let failure = match joined {
            Ok((_, Ok(summary))) => {
                progress.worker_finished(&summary, summaries.len() as u32 + 1, total);
                summaries.push(summary);
                continue;
            }
            Ok((id, Err(e))) => FanoutError::worker(worker_of(&task_workers, id), e.to_string()),
            Err(join_err) => FanoutError::worker(
                worker_of(&task_workers, join_err.id()),
                format!("worker task did not complete: {join_err}"),
            ),
        };

        tasks.abort_all();
        error!(error = %failure, "worker failed, aborting run");
        run_log.append(&format!("Run aborted: {failure}"));
        return Err(failure);
    }
    summaries.sort_by_key(|s| s.worker);

    // --- Phase 4: Aggregate ---
    progress.phase("Aggregating results");
    let aggregated = aggregate(layout, total, Some(schema.output_header()))
        .inspect_err(|e| run_log.append(&format!("Run aborted: {e}")))?;

    let elapsed = start.elapsed();
    run_log.append(&format!(
        "Finished All Concurrent Records \nTotal Execution Time: {} seconds \n",
        elapsed.as_secs()
    ));

    let result = RunResult {
        total_records: plan.total_rows,
        effective_workers: total,
        enriched: aggregated.output_rows,
        failed: aggregated.error_rows,
        combined_output: layout.combined_output(),
        combined_errors: layout.combined_errors(),
        elapsed,
        workers: summaries,
    };

    info!(
        enriched = result.enriched,
        failed = result.failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "run complete"
    );
    progress.done(&result);

    Ok(result)
}

fn worker_of(task_workers: &HashMap<tokio::task::Id, WorkerId>, id: tokio::task::Id) -> WorkerId {
    // Every spawned task is registered before the barrier starts.
    task_workers.get(&id).copied().unwrap_or(WorkerId::new(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeClient, temp_layout};
    use fanout_shared::ERROR_HEADER;
    use std::path::Path;

    const HEADER: &str = "col_one,col_two,col_three,label";

    fn write_input(root: &Path, rows: usize) -> PathBuf {
        let mut content = format!("{HEADER}\n");
        for i in 1..=rows {
            content.push_str(&format!("{i},{},0.5,item {i}\n", i * 2));
        }
        let path = root.join("all-records.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config(input_path: PathBuf, layout: &ArtifactLayout, workers: u32) -> RunConfig {
        RunConfig {
            input_path,
            layout: layout.clone(),
            requested_workers: workers,
            schema: SchemaConfig::default(),
        }
    }

    fn data_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(String::from)
            .collect()
    }

    fn no_partials_left(layout: &ArtifactLayout, workers: u32) -> bool {
        (1..=workers).all(|w| {
            let w = WorkerId::new(w);
            !layout.partial_output(w).exists() && !layout.partial_errors(w).exists()
        })
    }

    #[tokio::test]
    async fn end_to_end_with_isolated_failures() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 100);
        let client = Arc::new(FakeClient::failing_on([5, 50, 99]));

        let result = run(&config(input, &layout, 3), client.clone(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.total_records, 100);
        assert_eq!(result.effective_workers, 3);
        assert_eq!(result.enriched, 97);
        assert_eq!(result.failed, 3);
        let sizes: Vec<usize> = result.workers.iter().map(|w| w.records).collect();
        assert_eq!(sizes, vec![33, 33, 34]);
        assert_eq!(client.calls().len(), 100);

        let output = std::fs::read_to_string(&result.combined_output).unwrap();
        assert_eq!(
            output.lines().next().unwrap(),
            format!("{HEADER},col_four_api_returned")
        );
        assert_eq!(output.matches("col_one").count(), 1);

        let ids: Vec<i64> = data_lines(&result.combined_output)
            .iter()
            .map(|l| l.split(',').next().unwrap().parse().unwrap())
            .collect();
        let expected: Vec<i64> = (1..=100).filter(|i| ![5, 50, 99].contains(i)).collect();
        assert_eq!(ids, expected);
        assert!(data_lines(&result.combined_output)[0].ends_with(",1001"));

        let errors = std::fs::read_to_string(&result.combined_errors).unwrap();
        let mut lines = errors.lines();
        assert_eq!(lines.next().unwrap(), ERROR_HEADER.join(","));
        let failed: Vec<(String, String)> = lines
            .map(|l| {
                let cols: Vec<&str> = l.split(',').collect();
                (cols[0].to_string(), cols[2].to_string())
            })
            .collect();
        assert_eq!(
            failed,
            vec![
                ("1".to_string(), "5".to_string()),
                ("2".to_string(), "50".to_string()),
                ("3".to_string(), "99".to_string()),
            ]
        );

        assert!(no_partials_left(&layout, 3));

        let run_log = std::fs::read_to_string(layout.run_log()).unwrap();
        assert!(run_log.starts_with("Start All Concurrent Records: "));
        assert!(run_log.contains("Finished All Concurrent Records"));
        for w in 1..=3 {
            assert!(layout.worker_log(WorkerId::new(w)).exists());
        }

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn zero_rows_produce_header_only_artifacts() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 0);
        let client = Arc::new(FakeClient::default());

        let result = run(&config(input, &layout, 4), client.clone(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.effective_workers, 0);
        assert!(result.workers.is_empty());
        assert!(client.calls().is_empty());
        assert_eq!(
            std::fs::read_to_string(&result.combined_output).unwrap(),
            format!("{HEADER},col_four_api_returned\n")
        );
        assert_eq!(
            std::fs::read_to_string(&result.combined_errors).unwrap(),
            format!("{}\n", ERROR_HEADER.join(","))
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn more_workers_than_rows() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 5);

        let result = run(
            &config(input, &layout, 10),
            Arc::new(FakeClient::default()),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.effective_workers, 5);
        assert!(result.workers.iter().all(|w| w.records == 1));
        assert_eq!(result.enriched, 5);
        assert!(no_partials_left(&layout, 10));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_column_stops_before_any_call() {
        let (root, layout) = temp_layout();
        let input = root.join("all-records.csv");
        std::fs::write(&input, "col_one,col_three\n1,0.5\n2,0.5\n").unwrap();
        let client = Arc::new(FakeClient::default());

        let err = run(&config(input, &layout, 2), client.clone(), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, FanoutError::Schema { ref column } if column == "col_two"));
        assert!(client.calls().is_empty());
        assert!(!layout.combined_output().exists());
        assert!(!layout.partial_output(WorkerId::new(1)).exists());

        let run_log = std::fs::read_to_string(layout.run_log()).unwrap();
        assert!(run_log.starts_with("Start All Concurrent Records: "));
        assert!(run_log.contains("Run aborted: "));
        assert!(run_log.contains("col_two"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let (root, layout) = temp_layout();

        let err = run(
            &config(root.join("absent.csv"), &layout, 2),
            Arc::new(FakeClient::default()),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FanoutError::Io { .. }));
        let run_log = std::fs::read_to_string(layout.run_log()).unwrap();
        assert!(run_log.contains("Run aborted: "));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 3);

        let err = run(
            &config(input, &layout, 0),
            Arc::new(FakeClient::default()),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FanoutError::Validation { .. }));
        assert!(!layout.run_log().exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn non_utf8_bytes_reach_combined_output() {
        let (root, layout) = temp_layout();
        let input = root.join("all-records.csv");
        std::fs::write(&input, b"col_one,col_two,col_three,name\n1,2,0.5,caf\xe9\n").unwrap();

        let result = run(
            &config(input, &layout, 1),
            Arc::new(FakeClient::default()),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.enriched, 1);
        assert_eq!(
            std::fs::read(&result.combined_output).unwrap(),
            b"col_one,col_two,col_three,name,col_four_api_returned\n1,2,0.5,caf\xe9,1001\n"
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unparseable_record_is_isolated() {
        let (root, layout) = temp_layout();
        let input = root.join("all-records.csv");
        std::fs::write(
            &input,
            "col_one,col_two,col_three\n1,2,0.5\nabc,2,0.5\n3,two,0.5\n4,2,0.5\n",
        )
        .unwrap();
        let client = Arc::new(FakeClient::default());

        let result = run(&config(input, &layout, 2), client.clone(), &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.enriched, 2);
        assert_eq!(result.failed, 2);
        let mut calls = client.calls();
        calls.sort();
        assert_eq!(calls, vec![1, 4]);

        let errors = data_lines(&result.combined_errors);
        assert!(errors[0].contains(",abc,2,parse_record,"));
        assert!(errors[1].contains(",3,3,parse_record,"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn output_order_ignores_completion_order() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 9);
        // Worker 1 finishes last.
        let client = Arc::new(
            FakeClient::default()
                .delayed(1, Duration::from_millis(150))
                .delayed(4, Duration::from_millis(50)),
        );

        let result = run(&config(input, &layout, 3), client, &SilentProgress)
            .await
            .unwrap();

        let ids: Vec<String> = data_lines(&result.combined_output)
            .iter()
            .map(|l| l.split(',').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, (1..=9).map(|i| i.to_string()).collect::<Vec<_>>());
        let workers: Vec<u32> = result.workers.iter().map(|w| w.worker.get()).collect();
        assert_eq!(workers, vec![1, 2, 3]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn worker_io_failure_aborts_before_aggregation() {
        let (root, layout) = temp_layout();
        let input = write_input(&root, 6);
        // Worker 2 cannot create its partial success file.
        std::fs::create_dir_all(layout.partial_output(WorkerId::new(2))).unwrap();

        let err = run(
            &config(input, &layout, 3),
            Arc::new(FakeClient::default()),
            &SilentProgress,
        )
        .await
        .unwrap_err();

        match err {
            FanoutError::Worker { worker, .. } => assert_eq!(worker, WorkerId::new(2)),
            other => panic!("expected worker error, got {other:?}"),
        }
        assert!(!layout.combined_output().exists());
        assert!(!layout.combined_errors().exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn progress_sees_every_worker() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recording {
            phases: Mutex<Vec<String>>,
            finished: Mutex<Vec<(u32, u32)>>,
            done: Mutex<bool>,
        }

        impl ProgressReporter for Recording {
            fn phase(&self, name: &str) {
                self.phases.lock().unwrap().push(name.to_string());
            }
            fn worker_finished(&self, _summary: &WorkerSummary, finished: u32, total: u32) {
                self.finished.lock().unwrap().push((finished, total));
            }
            fn done(&self, _result: &RunResult) {
                *self.done.lock().unwrap() = true;
            }
        }

        let (root, layout) = temp_layout();
        let input = write_input(&root, 8);
        let progress = Recording::default();

        run(&config(input, &layout, 4), Arc::new(FakeClient::default()), &progress)
            .await
            .unwrap();

        assert_eq!(progress.phases.lock().unwrap().len(), 4);
        assert_eq!(
            *progress.finished.lock().unwrap(),
            vec![(1, 4), (2, 4), (3, 4), (4, 4)]
        );
        assert!(*progress.done.lock().unwrap());

        let _ = std::fs::remove_dir_all(&root);
    }
}
