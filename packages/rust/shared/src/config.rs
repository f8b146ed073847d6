//! Application configuration for fanout.
//!
//! User config lives at `~/.fanout/fanout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FanoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "fanout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".fanout";

// ---------------------------------------------------------------------------
// Config structs (matching fanout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Enrichment service settings.
    #[serde(default)]
    pub enrichment: EnrichmentServiceConfig,

    /// Input column names the pipeline depends on.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Requested worker count when the CLI does not supply one.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Input CSV path.
    #[serde(default = "default_input_path")]
    pub input_path: String,

    /// Directory for partial and combined success files.
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Directory for partial and combined error files and text logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            input_path: default_input_path(),
            out_dir: default_out_dir(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_workers() -> u32 {
    4
}
fn default_input_path() -> String {
    "in_csv/all-records.csv".into()
}
fn default_out_dir() -> String {
    "out_csv".into()
}
fn default_log_dir() -> String {
    "logging".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentServiceConfig {
    /// Endpoint receiving one POST per record.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Per-call deadline. Absent means calls run until the server answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for EnrichmentServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            timeout_secs: None,
        }
    }
}

fn default_endpoint() -> String {
    "https://jsonplaceholder.typicode.com/posts".into()
}
fn default_token_env() -> String {
    "FANOUT_API_TOKEN".into()
}

/// `[schema]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Integer identifier sent as `colID`.
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Integer count, multiplied by the rate.
    #[serde(default = "default_count_column")]
    pub count_column: String,

    /// Floating point rate, multiplied by the count.
    #[serde(default = "default_rate_column")]
    pub rate_column: String,

    /// Column appended to the success artifact holding the returned id.
    #[serde(default = "default_result_column")]
    pub result_column: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            count_column: default_count_column(),
            rate_column: default_rate_column(),
            result_column: default_result_column(),
        }
    }
}

impl SchemaConfig {
    /// Columns that must be present in the input header, in check order.
    pub fn required_columns(&self) -> [&str; 3] {
        [
            self.id_column.as_str(),
            self.count_column.as_str(),
            self.rate_column.as_str(),
        ]
    }
}

fn default_id_column() -> String {
    "col_one".into()
}
fn default_count_column() -> String {
    "col_two".into()
}
fn default_rate_column() -> String {
    "col_three".into()
}
fn default_result_column() -> String {
    "col_four_api_returned".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.fanout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FanoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.fanout/fanout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FanoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FanoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FanoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| FanoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FanoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the bearer token from the env var named in the config.
pub fn resolve_api_token(config: &EnrichmentServiceConfig) -> Result<String> {
    let var_name = &config.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(FanoutError::config(format!(
            "API token not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Parse the configured endpoint, rejecting anything that is not http(s).
pub fn validate_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| FanoutError::config(format!("invalid endpoint '{endpoint}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FanoutError::config(format!(
            "invalid endpoint '{endpoint}': unsupported scheme '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("input_path"));
        assert!(toml_str.contains("FANOUT_API_TOKEN"));
        assert!(!toml_str.contains("timeout_secs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.workers, 4);
        assert_eq!(parsed.enrichment.token_env, "FANOUT_API_TOKEN");
        assert_eq!(parsed.schema, SchemaConfig::default());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
out_dir = "/tmp/out"

[enrichment]
timeout_secs = 15

[schema]
id_column = "account_id"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.out_dir, "/tmp/out");
        assert_eq!(config.defaults.log_dir, "logging");
        assert_eq!(config.enrichment.timeout_secs, Some(15));
        assert_eq!(
            config.schema.required_columns(),
            ["account_id", "col_two", "col_three"]
        );
    }

    #[test]
    fn token_resolution() {
        let mut config = EnrichmentServiceConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.token_env = "FANOUT_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = resolve_api_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API token not found"));
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("https://api.example.com/records").is_ok());
        assert!(validate_endpoint("ftp://api.example.com").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }
}
