//! Contains validation logic for the final Config struct.

use super::{Config, Result};
use crate::core::error::AppError;
use url::Url;

/// Validates the configuration settings after loading and potential overrides.
/// Mutates the config to clamp values where a sane fallback exists.
pub(crate) fn validate_config(config: &mut Config) -> Result<()> {
    for (label, value) in [
        ("verification base URL", &config.verification_base_url),
        ("key provider URL", &config.key_provider_url),
    ] {
        Url::parse(value).map_err(|e| {
            AppError::Config(format!("Invalid {} '{}': {}", label, value, e))
        })?;
    }

    if config.wave_size == 0 {
        tracing::warn!("Wave size was set to 0. Setting to 1.");
        config.wave_size = 1;
    }
    if config.max_concurrency == 0 {
        tracing::warn!("Max concurrency was set to 0. Setting to 1.");
        config.max_concurrency = 1;
    }
    if config.max_concurrency > config.wave_size {
        tracing::debug!(
            "Max concurrency ({}) exceeds wave size ({}); effective concurrency is the wave size.",
            config.max_concurrency,
            config.wave_size
        );
    }
    if config.max_combos == 0 {
        tracing::warn!("Max combos was set to 0. Setting to 1.");
        config.max_combos = 1;
    }
    if config.max_rows == 0 {
        return Err(AppError::Config(
            "Row limit must be greater than zero.".to_string(),
        ));
    }
    if config.key_wait_fallback.is_zero() {
        tracing::warn!("Key wait fallback of 0ms would spin on the allocator. Using 1000ms.");
        config.key_wait_fallback = std::time::Duration::from_millis(1000);
    }
    Ok(())
}
