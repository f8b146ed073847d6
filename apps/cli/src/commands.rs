//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use fanout_artifacts::ArtifactLayout;
use fanout_core::{ProgressReporter, RunConfig, RunResult, WorkerSummary};
use fanout_enrichment::{HttpClientOptions, HttpEnrichmentClient};
use fanout_shared::{
    AppConfig, init_config, load_config, resolve_api_token, validate_endpoint,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// fanout: enrich a CSV file concurrently.
#[derive(Parser)]
#[command(
    name = "fanout",
    version,
    about = "Split a CSV file across workers, enrich every record over HTTP, and merge the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich every record of the input file.
    Run {
        /// Number of concurrent workers (defaults to `[defaults].workers`).
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        workers: Option<u32>,

        /// Input CSV file.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Directory for the partial and combined success files.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Directory for error files and text logs.
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Enrichment endpoint URL.
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "fanout=info",
        1 => "fanout=debug",
        _ => "fanout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            workers,
            input,
            out_dir,
            log_dir,
            endpoint,
        } => {
            let overrides = RunOverrides {
                workers,
                input,
                out_dir,
                log_dir,
                endpoint,
            };
            cmd_run(overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    workers: Option<u32>,
    input: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    endpoint: Option<String>,
}

/// Merge flags over the loaded config.
fn resolve_run_config(config: &AppConfig, overrides: RunOverrides) -> (RunConfig, String) {
    let defaults = &config.defaults;
    let layout = ArtifactLayout::new(
        overrides
            .out_dir
            .unwrap_or_else(|| PathBuf::from(&defaults.out_dir)),
        overrides
            .log_dir
            .unwrap_or_else(|| PathBuf::from(&defaults.log_dir)),
    );

    let run_config = RunConfig {
        input_path: overrides
            .input
            .unwrap_or_else(|| PathBuf::from(&defaults.input_path)),
        layout,
        requested_workers: overrides.workers.unwrap_or(defaults.workers),
        schema: config.schema.clone(),
    };
    let endpoint = overrides
        .endpoint
        .unwrap_or_else(|| config.enrichment.endpoint.clone());

    (run_config, endpoint)
}

async fn cmd_run(overrides: RunOverrides) -> Result<()> {
    let config = load_config()?;
    let (run_config, endpoint) = resolve_run_config(&config, overrides);

    // Fail on credentials and endpoint before any file is touched.
    let token = resolve_api_token(&config.enrichment)?;
    let endpoint = validate_endpoint(&endpoint)?;

    let client = HttpEnrichmentClient::new(HttpClientOptions {
        endpoint: endpoint.clone(),
        token,
        timeout: config.enrichment.timeout_secs.map(Duration::from_secs),
    })?;

    info!(
        input = %run_config.input_path.display(),
        workers = run_config.requested_workers,
        %endpoint,
        "starting run"
    );

    let reporter = CliProgress::new();
    let result = fanout_core::run(&run_config, Arc::new(client), &reporter).await?;

    // Print summary
    println!();
    println!("  Run complete.");
    println!("  Workers:  {}", result.effective_workers);
    println!("  Records:  {}", result.total_records);
    println!("  Enriched: {}", result.enriched);
    println!("  Failed:   {}", result.failed);
    println!("  Output:   {}", result.combined_output.display());
    println!("  Errors:   {}", result.combined_errors.display());
    println!(
        "  Time:     {:.1}s",
        result.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn worker_finished(&self, summary: &WorkerSummary, finished: u32, total: u32) {
        self.spinner.set_message(format!(
            "Workers [{finished}/{total}] worker {} done: {} enriched, {} failed",
            summary.worker, summary.enriched, summary.failed
        ));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        // A failed run never reaches `done`.
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
