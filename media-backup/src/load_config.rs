//! `load_config`: reads the YAML run file and applies environment overrides.
//!
//! This is the only place where user-supplied YAML is parsed. The module block
//! maps straight onto [`ModuleConfig`]; everything about reaching the remote
//! list lives in the `source` block.
//!
//! # Environment
//! - `MEDIA_BACKUP_OUTPUT_DIR` replaces `output_dir` when set and non-empty.
//!
//! # Errors
//! All errors use `anyhow::Error` and surface at the CLI boundary.

use anyhow::{bail, Context, Result};
use media_backup_core::config::ModuleConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const OUTPUT_DIR_ENV: &str = "MEDIA_BACKUP_OUTPUT_DIR";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub output_dir: PathBuf,
    pub source: SourceSection,
    #[serde(default)]
    pub module: ModuleConfig,
}

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    /// List endpoint; `{start}`, `{count}` and `{page}` are filled in per page.
    pub list_url: String,
    /// Envelope callback name; overrides `module.payload.callback` when set.
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl SourceSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// Load the run file at `path` and apply environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let mut config: CliConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
        if !dir.trim().is_empty() {
            info!(output_dir = %dir, "Output directory overridden from environment");
            config.output_dir = PathBuf::from(dir);
        }
    }
    if let Some(callback) = config.source.callback.clone() {
        config.module.payload.callback = callback;
    }

    validate(&config).with_context(|| format!("Invalid config file {:?}", path_ref))?;
    config.module.trace_loaded();
    Ok(config)
}

fn validate(config: &CliConfig) -> Result<()> {
    if config.source.list_url.trim().is_empty() {
        bail!("source.list_url must not be empty");
    }
    if config.module.name.trim().is_empty() {
        bail!("module.name must not be empty");
    }
    if config.module.page_size == 0 {
        bail!("module.page_size must be at least 1");
    }
    Ok(())
}
