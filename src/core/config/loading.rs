//! Handles loading configuration from files and applying it to the Config struct.

use super::{Config, ConfigFile};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads configuration settings from a TOML file.
/// Internal to the builder logic.
pub(crate) fn load_config_file(file_path: &str) -> anyhow::Result<ConfigFile> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(anyhow::anyhow!(
            "File not found or is not a file: {}",
            file_path
        ));
    }
    tracing::debug!("Attempting to read config file: {}", file_path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", file_path))?;

    let config_file_content: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse TOML configuration from {}", file_path))?;

    tracing::debug!("Successfully parsed configuration file: {}", file_path);
    Ok(config_file_content)
}

/// Applies settings from a parsed `ConfigFile` onto a mutable `Config` instance.
/// Only fields present in `file_config` are touched.
pub(crate) fn apply_file_config(config: &mut Config, file_config: &ConfigFile) {
    // Network
    if let Some(timeout) = file_config.network.request_timeout {
        config.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(ref user_agent) = file_config.network.user_agent {
        config.user_agent = user_agent.clone();
    }

    // Verification
    if let Some(ref url) = file_config.verification.base_url {
        config.verification_base_url = url.trim().to_string();
    }
    if let Some(ref url) = file_config.verification.key_provider_url {
        config.key_provider_url = url.trim().to_string();
    }
    if let Some(policy) = file_config.verification.key_policy {
        config.key_policy = policy;
    }
    if let Some(ms) = file_config.verification.key_wait_fallback_ms {
        config.key_wait_fallback = Duration::from_millis(ms);
    }
    if let Some(ms) = file_config.verification.min_delay_ms {
        config.min_delay = Duration::from_millis(ms);
    }

    // Batch
    if let Some(size) = file_config.batch.wave_size {
        config.wave_size = size;
    }
    if let Some(concurrency) = file_config.batch.max_concurrency {
        config.max_concurrency = concurrency;
    }
    if let Some(combos) = file_config.batch.max_combos {
        config.max_combos = combos;
    }

    // Jobs
    if let Some(ref root) = file_config.jobs.storage_root {
        if !root.trim().is_empty() {
            config.storage_root = PathBuf::from(root.trim());
        }
    }
    if let Some(max_rows) = file_config.jobs.max_rows {
        config.max_rows = max_rows;
    }
    if let Some(ref prefix) = file_config.jobs.download_url_prefix {
        config.download_url_prefix = prefix.trim_end_matches('/').to_string();
    }
}
