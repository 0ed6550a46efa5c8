//! Joins enrichment results back onto the uploaded rows.

use super::rows::NormalizedRow;
use crate::core::models::{ContactResult, DeliveryStatus, EnrichedRecord, ResultDetails};

use std::collections::HashMap;

/// One record per normalized row, in upload order.
///
/// Skipped rows carry their skip reason; an existing email counts as `valid`.
pub fn build_result_sets(rows: &[NormalizedRow], results: Vec<ContactResult>) -> Vec<EnrichedRecord> {
    let mut by_row: HashMap<usize, ContactResult> = results
        .into_iter()
        .map(|result| (result.contact.row_id, result))
        .collect();

    rows.iter()
        .map(|row| {
            if let Some(reason) = row.skip_reason {
                let status = if row.existing_email.is_some() {
                    DeliveryStatus::Valid
                } else {
                    DeliveryStatus::NotFound
                };
                return EnrichedRecord {
                    first_name: row.profile.first_name.clone(),
                    last_name: row.profile.last_name.clone(),
                    domain: row.profile.domain.clone(),
                    best_email: row.existing_email.clone(),
                    status,
                    details: ResultDetails {
                        reason: Some(reason.to_string()),
                        ..ResultDetails::default()
                    },
                    all_checked_candidates: Vec::new(),
                };
            }

            match by_row.remove(&row.row_id) {
                Some(result) => EnrichedRecord::from(result),
                None => {
                    tracing::warn!(target: "job_task", "No result for row {} (line {})", row.row_id, row.row_number);
                    EnrichedRecord {
                        first_name: row.profile.first_name.clone(),
                        last_name: row.profile.last_name.clone(),
                        domain: row.profile.domain.clone(),
                        best_email: None,
                        status: DeliveryStatus::NotFound,
                        details: ResultDetails {
                            reason: Some("Unexpected processing mismatch".to_string()),
                            ..ResultDetails::default()
                        },
                        all_checked_candidates: Vec::new(),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Contact;
    use crate::job::rows::{normalize_rows, resolve_columns};

    fn rows() -> Vec<NormalizedRow> {
        let headers: Vec<String> = ["First Name", "Last Name", "Website", "Email"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let columns = resolve_columns(&headers).unwrap();
        let data = vec![
            vec!["Ann".into(), "Lee".into(), "a.com".into(), "".into()],
            vec!["Bo".into(), "Ng".into(), "b.com".into(), "bo@b.com".into()],
            vec!["Cy".into(), "Ko".into(), "c.com".into(), "".into()],
        ];
        normalize_rows(&data, &columns, 0, &headers).unwrap()
    }

    #[test]
    fn test_results_follow_upload_order() {
        let rows = rows();
        let cy = ContactResult {
            contact: Contact::new("Cy", "Ko", "c.com", 2),
            best_email: Some("cy@c.com".into()),
            status: DeliveryStatus::Valid,
            details: ResultDetails::default(),
            results_per_combo: Vec::new(),
        };
        let ann = ContactResult {
            contact: Contact::new("Ann", "Lee", "a.com", 0),
            best_email: None,
            status: DeliveryStatus::NotFound,
            details: ResultDetails::default(),
            results_per_combo: Vec::new(),
        };

        let records = build_result_sets(&rows, vec![cy, ann]);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].first_name, "Ann");
        assert_eq!(records[0].status, DeliveryStatus::NotFound);

        assert_eq!(records[1].best_email.as_deref(), Some("bo@b.com"));
        assert_eq!(records[1].status, DeliveryStatus::Valid);
        assert_eq!(records[1].details.reason.as_deref(), Some("Existing email provided"));

        assert_eq!(records[2].best_email.as_deref(), Some("cy@c.com"));
    }

    #[test]
    fn test_missing_result_is_flagged() {
        let rows = rows();
        let records = build_result_sets(&rows, Vec::new());
        assert_eq!(
            records[0].details.reason.as_deref(),
            Some("Unexpected processing mismatch")
        );
        assert_eq!(records[2].status, DeliveryStatus::NotFound);
    }
}
