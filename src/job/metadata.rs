//! Durable job record written to `metadata.json` in each job directory.

use super::progress::ProgressSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

/// Why rows were set aside before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipBreakdown {
    /// Rows that already carried an email; written out as `valid` without verification.
    pub existing_email: usize,
    pub missing_domain: usize,
    pub missing_name: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTotals {
    pub total_rows: usize,
    pub runnable_contacts: usize,
    pub skipped_rows: usize,
    pub skipped_breakdown: SkipBreakdown,
}

/// Full job state. Every write replaces the previous document entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub job_id: String,
    pub status: JobStatus,
    pub original_filename: String,
    pub stored_filename: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<JobTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobMetadata {
    pub fn started(
        job_id: impl Into<String>,
        original_filename: impl Into<String>,
        stored_filename: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Processing,
            original_filename: original_filename.into(),
            stored_filename: stored_filename.into(),
            created_at: Utc::now(),
            totals: None,
            progress: None,
            output_filename: None,
            download_url: None,
            result_count: 0,
            last_update: None,
            completed_at: None,
            failed_at: None,
            error: None,
        }
    }
}
