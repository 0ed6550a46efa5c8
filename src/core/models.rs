//! Data structures shared across the enrichment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized contact ready for enrichment.
///
/// `row_id` is an opaque correlation handle used to route the finished
/// [`ContactResult`] back to its row in the job's CSV snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub row_id: usize,
}

impl Contact {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        domain: impl Into<String>,
        row_id: usize,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            domain: domain.into(),
            row_id,
        }
    }

    /// Short label used in log lines.
    pub(crate) fn label(&self) -> String {
        format!(
            "#{} {} {} @ {}",
            self.row_id,
            if self.first_name.is_empty() { "-" } else { &self.first_name },
            if self.last_name.is_empty() { "-" } else { &self.last_name },
            if self.domain.is_empty() { "-" } else { &self.domain },
        )
    }
}

/// The three canonical delivery buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Valid,
    CatchAll,
    NotFound,
}

const STATUS_ALIASES: &[(&str, DeliveryStatus)] = &[
    ("valid", DeliveryStatus::Valid),
    ("catch_all", DeliveryStatus::CatchAll),
    ("catchall", DeliveryStatus::CatchAll),
    ("catchall_default", DeliveryStatus::CatchAll),
    ("not_found", DeliveryStatus::NotFound),
    ("not_found_valid_emails", DeliveryStatus::NotFound),
    ("valid_email_not_found", DeliveryStatus::NotFound),
    ("mx_not_found", DeliveryStatus::NotFound),
    ("skipped_missing_fields", DeliveryStatus::NotFound),
    ("error", DeliveryStatus::NotFound),
    ("other", DeliveryStatus::NotFound),
];

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Valid => "valid",
            DeliveryStatus::CatchAll => "catch_all",
            DeliveryStatus::NotFound => "not_found",
        }
    }

    /// Maps any provider-specific status string onto a canonical bucket.
    ///
    /// Total and idempotent: unknown strings mentioning "catch" become
    /// `CatchAll`, everything else unknown becomes `NotFound`.
    pub fn normalize(raw: &str) -> Self {
        let mut key = String::with_capacity(raw.len());
        let mut in_separator = false;
        for c in raw.trim().chars().flat_map(char::to_lowercase) {
            if c.is_whitespace() || c == '-' {
                if !in_separator {
                    key.push('_');
                }
                in_separator = true;
            } else {
                key.push(c);
                in_separator = false;
            }
        }

        if let Some((_, status)) = STATUS_ALIASES.iter().find(|(alias, _)| *alias == key) {
            return *status;
        }
        if key.contains("catch") {
            return DeliveryStatus::CatchAll;
        }
        DeliveryStatus::NotFound
    }

    /// Precedence used when picking the best outcome across candidates.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            DeliveryStatus::Valid => 2,
            DeliveryStatus::CatchAll => 1,
            DeliveryStatus::NotFound => 0,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key allocation issued by the rotation service, with its cadence hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAllocation {
    pub key: String,
    pub status: Option<String>,
    pub avg_request_interval_ms: Option<u64>,
    pub next_request_allowed_at: Option<DateTime<Utc>>,
}

impl KeyAllocation {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: None,
            avg_request_interval_ms: None,
            next_request_allowed_at: None,
        }
    }

    /// Key prefix safe to print in logs.
    pub(crate) fn masked_key(&self) -> String {
        let prefix: String = self.key.chars().take(6).collect();
        format!("{}…", prefix)
    }
}

/// Result of one (contact, candidate) verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub email: String,
    pub code: Option<String>,
    pub message: Option<String>,
    pub raw: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when no key could be allocated; no later candidate can succeed either.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub key_unavailable: bool,
}

impl VerificationOutcome {
    pub fn failed(email: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            code: None,
            message: None,
            raw: None,
            error: Some(error.into()),
            key_unavailable: false,
        }
    }

    /// Provider verdict for this attempt, or `None` when the call itself failed.
    pub fn verdict(&self) -> Option<DeliveryStatus> {
        if self.error.is_some() {
            return None;
        }
        let code = self.code.as_deref().unwrap_or("").trim().to_lowercase();
        let message = self.message.as_deref().unwrap_or("").to_lowercase();
        match code.as_str() {
            "ok" => Some(DeliveryStatus::Valid),
            "mb" => Some(DeliveryStatus::CatchAll),
            _ if message.contains("catch") => Some(DeliveryStatus::CatchAll),
            _ => Some(DeliveryStatus::NotFound),
        }
    }
}

/// Explanation attached to a finished contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub checked_candidates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final outcome for one contact once its candidate trials concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub contact: Contact,
    pub best_email: Option<String>,
    pub status: DeliveryStatus,
    pub details: ResultDetails,
    pub results_per_combo: Vec<VerificationOutcome>,
}

/// Caller-facing record shape, one per uploaded row or input contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
    pub best_email: Option<String>,
    pub status: DeliveryStatus,
    pub details: ResultDetails,
    pub all_checked_candidates: Vec<VerificationOutcome>,
}

impl From<ContactResult> for EnrichedRecord {
    fn from(result: ContactResult) -> Self {
        Self {
            first_name: result.contact.first_name,
            last_name: result.contact.last_name,
            domain: result.contact.domain,
            best_email: result.best_email,
            status: result.status,
            details: result.details,
            all_checked_candidates: result.results_per_combo,
        }
    }
}
