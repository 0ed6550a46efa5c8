//! Configuration for the enrichment pipeline.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! explicit overrides (usually CLI flags / environment), then validation.
//! Use [`ConfigBuilder`] to construct a [`Config`].

mod builder;
mod loading;
mod validation;

pub use builder::ConfigBuilder;

pub(crate) use crate::core::error::Result;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_VERIFICATION_BASE_URL: &str = "https://happy.mailtester.ninja/ninja";
pub(crate) const DEFAULT_KEY_PROVIDER_URL: &str =
    "https://api.daddy-leads.com/mailtester/key/available";

/// How verification keys are obtained from the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Request a fresh allocation before every verification attempt.
    #[default]
    Fresh,
    /// Reuse the first allocation for the lifetime of the process.
    Cached,
}

impl std::str::FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(KeyPolicy::Fresh),
            "cached" => Ok(KeyPolicy::Cached),
            other => Err(format!("unknown key policy '{}' (expected fresh|cached)", other)),
        }
    }
}

/// Effective runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub verification_base_url: String,
    pub key_provider_url: String,
    pub key_policy: KeyPolicy,
    /// Sleep applied when the allocator says "wait" without a usable duration.
    pub key_wait_fallback: Duration,
    /// Minimum gap between two verification calls, process-wide.
    pub min_delay: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,

    pub wave_size: usize,
    pub max_concurrency: usize,
    pub max_combos: usize,

    pub storage_root: PathBuf,
    pub max_rows: usize,
    pub download_url_prefix: String,

    pub loaded_config_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verification_base_url: DEFAULT_VERIFICATION_BASE_URL.to_string(),
            key_provider_url: DEFAULT_KEY_PROVIDER_URL.to_string(),
            key_policy: KeyPolicy::Fresh,
            key_wait_fallback: Duration::from_millis(1000),
            min_delay: Duration::from_millis(900),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("email-enricher/{}", env!("CARGO_PKG_VERSION")),
            wave_size: 25,
            max_concurrency: 5,
            max_combos: 8,
            storage_root: PathBuf::from("tempUploads"),
            max_rows: 10_000,
            download_url_prefix: "/v1/scraper/enricher/download".to_string(),
            loaded_config_path: None,
        }
    }
}

/// Mirror of `Config` as it appears in a TOML file; every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub network: NetworkSection,
    pub verification: VerificationSection,
    pub batch: BatchSection,
    pub jobs: JobsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Seconds.
    pub request_timeout: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSection {
    pub base_url: Option<String>,
    pub key_provider_url: Option<String>,
    pub key_policy: Option<KeyPolicy>,
    pub key_wait_fallback_ms: Option<u64>,
    pub min_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub wave_size: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub max_combos: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub storage_root: Option<String>,
    pub max_rows: Option<usize>,
    pub download_url_prefix: Option<String>,
}
