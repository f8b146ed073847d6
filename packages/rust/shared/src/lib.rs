//! Shared types, error model, and configuration for fanout.
//!
//! This crate is the foundation depended on by all other fanout crates.
//! It provides:
//! - [`FanoutError`]: the unified error type
//! - Domain types ([`Header`], [`ColumnIndex`], [`Record`], [`ErrorEntry`], [`WorkerId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EnrichmentServiceConfig, SchemaConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_token,
    validate_endpoint,
};
pub use error::{FanoutError, Result};
pub use types::{
    ColumnIndex, ERROR_HEADER, ErrorEntry, Header, OutputRow, Record, RequestId, WorkerId,
    format_timestamp, timestamp_now,
};
