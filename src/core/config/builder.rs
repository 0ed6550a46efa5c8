//! Provides the `ConfigBuilder` for fluent configuration construction.

use super::loading::{apply_file_config, load_config_file};
use super::validation::validate_config;
use super::{Config, ConfigFile, KeyPolicy, Result};
use crate::AppError;
use std::path::Path;
use std::time::Duration;

/// Builder pattern for creating `Config` instances fluently.
///
/// This is the primary way callers should create a `Config` object.
/// It handles loading from files, applying overrides, and validation.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
    config_file_path: Option<String>,
    overrides: ConfigFile,
}

impl ConfigBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Specify an optional configuration file path to load.
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    pub fn verification_base_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.verification.base_url = Some(url.into());
        self
    }
    pub fn key_provider_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.verification.key_provider_url = Some(url.into());
        self
    }
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.overrides.verification.key_policy = Some(policy);
        self
    }
    pub fn key_wait_fallback(mut self, duration: Duration) -> Self {
        self.overrides.verification.key_wait_fallback_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn min_delay(mut self, duration: Duration) -> Self {
        self.overrides.verification.min_delay_ms = Some(duration.as_millis() as u64);
        self
    }
    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.overrides.network.request_timeout = Some(duration.as_secs());
        self
    }
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.overrides.network.user_agent = Some(value.into());
        self
    }
    pub fn wave_size(mut self, value: usize) -> Self {
        self.overrides.batch.wave_size = Some(value);
        self
    }
    pub fn max_concurrency(mut self, value: usize) -> Self {
        self.overrides.batch.max_concurrency = Some(value);
        self
    }
    pub fn max_combos(mut self, value: usize) -> Self {
        self.overrides.batch.max_combos = Some(value);
        self
    }
    pub fn storage_root(mut self, path: impl Into<String>) -> Self {
        self.overrides.jobs.storage_root = Some(path.into());
        self
    }
    pub fn max_rows(mut self, value: usize) -> Self {
        self.overrides.jobs.max_rows = Some(value);
        self
    }
    pub fn download_url_prefix(mut self, value: impl Into<String>) -> Self {
        self.overrides.jobs.download_url_prefix = Some(value.into());
        self
    }

    /// Builds the final `Config`: defaults, then the config file, then the
    /// builder's own overrides, then validation.
    pub fn build(mut self) -> Result<Config> {
        let source = self.locate_config_file()?;
        if let Some((path, file_config)) = &source {
            apply_file_config(&mut self.config, file_config);
            tracing::info!("Loaded base configuration from {}", path);
        }

        let overridden = overridden_keys(&self.overrides);
        apply_file_config(&mut self.config, &self.overrides);
        self.config.loaded_config_path = source.map(|(path, _)| path);
        validate_config(&mut self.config)?;

        tracing::debug!(
            "Configuration ready (file: {}, overrides: [{}])",
            self.config.loaded_config_path.as_deref().unwrap_or("none"),
            overridden.join(", ")
        );
        Ok(self.config)
    }

    /// The explicitly requested file, which must load, or else the first
    /// default location that parses.
    fn locate_config_file(&self) -> Result<Option<(String, ConfigFile)>> {
        if let Some(path) = &self.config_file_path {
            return load_config_file(path)
                .map(|file_config| Some((path.clone(), file_config)))
                .map_err(|e| {
                    AppError::Config(format!("Failed to load specified configuration file '{}': {}", path, e))
                });
        }

        let found = DEFAULT_CONFIG_FILES
            .iter()
            .filter(|candidate| Path::new(candidate).exists())
            .find_map(|candidate| match load_config_file(candidate) {
                Ok(file_config) => Some((candidate.to_string(), file_config)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable default config '{}': {}", candidate, e);
                    None
                }
            });
        Ok(found)
    }
}

const DEFAULT_CONFIG_FILES: [&str; 2] = ["./email-enricher.toml", "./config.toml"];

/// Dotted names of every setting present in `overrides`, in file order.
fn overridden_keys(overrides: &ConfigFile) -> Vec<&'static str> {
    let ConfigFile {
        network,
        verification,
        batch,
        jobs,
    } = overrides;
    [
        ("network.request_timeout", network.request_timeout.is_some()),
        ("network.user_agent", network.user_agent.is_some()),
        ("verification.base_url", verification.base_url.is_some()),
        ("verification.key_provider_url", verification.key_provider_url.is_some()),
        ("verification.key_policy", verification.key_policy.is_some()),
        ("verification.key_wait_fallback_ms", verification.key_wait_fallback_ms.is_some()),
        ("verification.min_delay_ms", verification.min_delay_ms.is_some()),
        ("batch.wave_size", batch.wave_size.is_some()),
        ("batch.max_concurrency", batch.max_concurrency.is_some()),
        ("batch.max_combos", batch.max_combos.is_some()),
        ("jobs.storage_root", jobs.storage_root.is_some()),
        ("jobs.max_rows", jobs.max_rows.is_some()),
        ("jobs.download_url_prefix", jobs.download_url_prefix.is_some()),
    ]
    .into_iter()
    .filter_map(|(key, set)| set.then_some(key))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overridden_keys_lists_only_set_values() {
        let builder = ConfigBuilder::new().wave_size(10).user_agent("ua").max_rows(50);
        assert_eq!(
            overridden_keys(&builder.overrides),
            vec!["network.user_agent", "batch.wave_size", "jobs.max_rows"]
        );
        assert!(overridden_keys(&ConfigFile::default()).is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let err = ConfigBuilder::new()
            .config_file("/definitely/not/here.toml")
            .build()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
