//! Client for the key-rotation service that hands out verification keys.
//!
//! The allocator either returns a key payload or asks the caller to wait.
//! Wait directives are honoured by sleeping and asking again; they are never
//! treated as errors. A non-wait payload without a key is an error.

use crate::core::config::{Config, KeyPolicy};
use crate::core::error::{AppError, Result};
use crate::core::models::KeyAllocation;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

const WAIT_FIELDS: [&str; 5] = [
    "waitForMs",
    "waitMs",
    "retryAfterMs",
    "retryInMs",
    "nextRequestAllowedInMs",
];
const KEY_FIELDS: [&str; 3] = ["key", "subscriptionId", "id"];

/// Source of verification key allocations.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Returns a usable allocation, or an error if none could be obtained.
    async fn acquire_key(&self) -> Result<KeyAllocation>;
}

/// Reads a JSON value as a number, accepting numeric strings.
fn as_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// Duration the allocator asked us to wait, falling back when missing or unusable.
pub(crate) fn extract_wait_duration(payload: &Value, fallback: Duration) -> Duration {
    let raw = WAIT_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).filter(|v| !v.is_null()));
    match raw.and_then(as_number) {
        Some(ms) if ms > 0.0 => Duration::from_millis(ms.ceil() as u64),
        _ => fallback,
    }
}

/// Pulls the key out of a non-wait payload: either top-level or the first `keys` entry.
pub(crate) fn extract_key(payload: &Value) -> Option<String> {
    let candidate = match payload.get("keys").and_then(Value::as_array) {
        Some(keys) if !keys.is_empty() => &keys[0],
        _ => payload,
    };

    let raw = match candidate {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => KEY_FIELDS.iter().find_map(|field| match candidate.get(*field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }),
        _ => None,
    }?;

    let key: String = raw.chars().filter(|c| *c != '{' && *c != '}').collect();
    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(s) = value.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let millis = as_number(value)?;
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Builds an allocation from the allocator payload and its already-extracted key.
pub(crate) fn allocation_from_payload(key: String, payload: &Value) -> KeyAllocation {
    KeyAllocation {
        key,
        status: payload
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string),
        avg_request_interval_ms: payload
            .get("avgRequestIntervalMs")
            .and_then(as_number)
            .filter(|ms| *ms > 0.0)
            .map(|ms| ms.ceil() as u64),
        next_request_allowed_at: payload
            .get("nextRequestAllowedAt")
            .and_then(parse_instant),
    }
}

/// HTTP client for the key allocator.
#[derive(Clone)]
pub struct KeyProviderClient {
    http_client: Client,
    url: String,
    wait_fallback: Duration,
}

impl KeyProviderClient {
    pub fn new(http_client: Client, url: impl Into<String>, wait_fallback: Duration) -> Self {
        Self {
            http_client,
            url: url.into(),
            wait_fallback,
        }
    }

    async fn request_payload(&self) -> Result<Value> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::KeyProvider(format!("Failed to retrieve verification key: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::KeyProvider(format!(
                "Failed to retrieve verification key: allocator responded with {} {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            AppError::KeyProvider(format!(
                "Failed to retrieve verification key: malformed allocator response: {}",
                e
            ))
        })
    }
}

#[async_trait]
impl KeySource for KeyProviderClient {
    async fn acquire_key(&self) -> Result<KeyAllocation> {
        loop {
            let payload = self.request_payload().await?;

            let is_wait = payload
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.eq_ignore_ascii_case("wait"));
            if is_wait {
                let wait = extract_wait_duration(&payload, self.wait_fallback);
                tracing::info!(target: "key_client", "Rotation service asked us to wait {:?}", wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            let key = extract_key(&payload).ok_or_else(|| {
                AppError::KeyProvider(
                    "Failed to retrieve verification key: response missing subscription key"
                        .to_string(),
                )
            })?;
            let allocation = allocation_from_payload(key, &payload);
            tracing::debug!(target: "key_client",
                "Allocated key {} (avg interval: {:?}ms, next allowed at: {:?})",
                allocation.masked_key(), allocation.avg_request_interval_ms, allocation.next_request_allowed_at);
            return Ok(allocation);
        }
    }
}

/// Wraps another source and reuses its first successful allocation forever.
pub struct CachedKeySource {
    inner: Arc<dyn KeySource>,
    cached: OnceCell<KeyAllocation>,
}

impl CachedKeySource {
    pub fn new(inner: Arc<dyn KeySource>) -> Self {
        Self {
            inner,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl KeySource for CachedKeySource {
    async fn acquire_key(&self) -> Result<KeyAllocation> {
        let allocation = self
            .cached
            .get_or_try_init(|| async {
                tracing::info!(target: "key_client", "Fetching key allocation to cache for process lifetime");
                self.inner.acquire_key().await
            })
            .await?;
        Ok(allocation.clone())
    }
}

/// Builds the key source selected by `config.key_policy`.
pub fn key_source_from_config(config: &Config, http_client: Client) -> Arc<dyn KeySource> {
    let client: Arc<dyn KeySource> = Arc::new(KeyProviderClient::new(
        http_client,
        config.key_provider_url.clone(),
        config.key_wait_fallback,
    ));
    match config.key_policy {
        KeyPolicy::Fresh => client,
        KeyPolicy::Cached => Arc::new(CachedKeySource::new(client)),
    }
}
