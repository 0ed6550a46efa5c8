//! Per-job progress counters.

use crate::core::models::DeliveryStatus;
use serde::{Deserialize, Serialize};

/// Tally per canonical status, plus rows skipped before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub valid: usize,
    pub catch_all: usize,
    pub not_found: usize,
    pub skipped: usize,
}

impl StatusCounts {
    fn bucket_mut(&mut self, status: DeliveryStatus) -> &mut usize {
        match status {
            DeliveryStatus::Valid => &mut self.valid,
            DeliveryStatus::CatchAll => &mut self.catch_all,
            DeliveryStatus::NotFound => &mut self.not_found,
        }
    }
}

/// Progress of one job. `processed_contacts` only ever grows and never
/// passes `total_contacts`, which counts runnable contacts only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub total_contacts: usize,
    pub processed_contacts: usize,
    pub status_counts: StatusCounts,
}

impl ProgressSnapshot {
    pub fn new(total_contacts: usize, skipped_rows: usize) -> Self {
        Self {
            total_contacts,
            processed_contacts: 0,
            status_counts: StatusCounts {
                skipped: skipped_rows,
                ..StatusCounts::default()
            },
        }
    }

    /// Counts one finished contact under the bucket its status normalizes to.
    ///
    /// Results beyond `total_contacts` are ignored with a warning.
    pub fn record_result(&mut self, status: &str) -> DeliveryStatus {
        let bucket = DeliveryStatus::normalize(status);
        if self.processed_contacts >= self.total_contacts {
            tracing::warn!(target: "job_task",
                "Ignoring result '{}': all {} contacts already counted", status, self.total_contacts);
            return bucket;
        }
        self.processed_contacts += 1;
        *self.status_counts.bucket_mut(bucket) += 1;
        bucket
    }

    pub fn is_complete(&self) -> bool {
        self.processed_contacts == self.total_contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_result_buckets() {
        let mut progress = ProgressSnapshot::new(4, 2);
        assert_eq!(progress.record_result("valid"), DeliveryStatus::Valid);
        assert_eq!(progress.record_result("catchall_default"), DeliveryStatus::CatchAll);
        assert_eq!(progress.record_result("mx_not_found"), DeliveryStatus::NotFound);
        assert_eq!(progress.record_result("???"), DeliveryStatus::NotFound);

        assert_eq!(progress.processed_contacts, 4);
        assert_eq!(
            progress.status_counts,
            StatusCounts {
                valid: 1,
                catch_all: 1,
                not_found: 2,
                skipped: 2
            }
        );
        assert!(progress.is_complete());
    }

    #[test]
    fn test_never_exceeds_total() {
        let mut progress = ProgressSnapshot::new(1, 0);
        progress.record_result("valid");
        progress.record_result("valid");
        assert_eq!(progress.processed_contacts, 1);
        assert_eq!(progress.status_counts.valid, 1);
    }

    #[test]
    fn test_serialized_shape() {
        let progress = ProgressSnapshot::new(3, 1);
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["totalContacts"], 3);
        assert_eq!(json["processedContacts"], 0);
        assert_eq!(json["statusCounts"]["catch_all"], 0);
        assert_eq!(json["statusCounts"]["skipped"], 1);
    }
}
