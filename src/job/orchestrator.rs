//! Job lifecycle: upload -> rows -> enrichment -> CSV snapshot + metadata.

use super::metadata::{JobMetadata, JobStatus, JobTotals, SkipBreakdown};
use super::progress::ProgressSnapshot;
use super::results::build_result_sets;
use super::rows::{
    build_column_order, enforce_row_limit, normalize_rows, read_csv_upload, resolve_columns,
    validate_extension, NormalizedRow, SkipReason,
};
use super::snapshot::{compose_row, CsvSnapshotWriter};
use super::state::ActiveJobs;
use super::storage::JobStorage;
use crate::core::enricher::EmailEnricher;
use crate::core::error::{AppError, Result};
use crate::core::models::{Contact, DeliveryStatus, EnrichedRecord};

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;

/// An upload already saved to disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_filename: String,
    pub path: PathBuf,
}

/// What a completed job hands back to its caller.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: String,
    pub output_filename: String,
    pub output_path: PathBuf,
    pub download_url: String,
    pub results: Vec<EnrichedRecord>,
}

/// Fires the ready notification at most once.
struct ReadySignal {
    sender: Option<oneshot::Sender<JobMetadata>>,
}

impl ReadySignal {
    fn notify(&mut self, metadata: &JobMetadata) {
        if let Some(sender) = self.sender.take() {
            if sender.send(metadata.clone()).is_err() {
                tracing::debug!(target: "job_task", "[{}] Ready receiver already dropped.", metadata.job_id);
            }
        }
    }
}

fn skip_breakdown(rows: &[NormalizedRow]) -> SkipBreakdown {
    let mut breakdown = SkipBreakdown::default();
    for reason in rows.iter().filter_map(|row| row.skip_reason) {
        match reason {
            SkipReason::ExistingEmail => breakdown.existing_email += 1,
            SkipReason::MissingDomain => breakdown.missing_domain += 1,
            SkipReason::MissingName => breakdown.missing_name += 1,
        }
    }
    breakdown
}

/// Runs upload jobs against one enricher and one storage root.
#[derive(Clone)]
pub struct JobRunner {
    enricher: EmailEnricher,
    storage: JobStorage,
    active_jobs: ActiveJobs,
}

impl JobRunner {
    pub fn new(enricher: EmailEnricher, storage: JobStorage, active_jobs: ActiveJobs) -> Self {
        Self {
            enricher,
            storage,
            active_jobs,
        }
    }

    pub fn storage(&self) -> &JobStorage {
        &self.storage
    }

    pub fn active_jobs(&self) -> &ActiveJobs {
        &self.active_jobs
    }

    /// Processes one uploaded file to completion or failure.
    ///
    /// `ready` receives the metadata once the initial CSV snapshot exists, or
    /// the failed metadata if the job dies before that point. On failure the
    /// metadata is marked `failed` and any CSV already written stays in place.
    pub async fn process_upload(
        &self,
        job_id: &str,
        file: UploadedFile,
        ready: Option<oneshot::Sender<JobMetadata>>,
    ) -> Result<JobOutcome> {
        let _active = self.active_jobs.activate(job_id);
        let job_dir = self.storage.create_job_dir(job_id).await?;

        let stored_filename = file
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut metadata = JobMetadata::started(job_id, &file.original_filename, stored_filename);
        self.storage.write_metadata(&job_dir, &metadata).await?;
        tracing::info!(target: "job_task", "[{}] Job started for '{}'.", job_id, file.original_filename);

        let mut ready = ReadySignal { sender: ready };
        let outcome = self
            .run_job(job_id, &job_dir, &file, &mut metadata, &mut ready)
            .await;

        if let Err(e) = &outcome {
            tracing::error!(target: "job_task", "[{}] Job failed: {}", job_id, e);
            metadata.status = JobStatus::Failed;
            metadata.failed_at = Some(Utc::now());
            metadata.error = Some(e.to_string());
            if let Err(write_err) = self.storage.write_metadata(&job_dir, &metadata).await {
                tracing::error!(target: "job_task", "[{}] Could not record failure: {}", job_id, write_err);
            }
        }
        ready.notify(&metadata);
        outcome
    }

    async fn run_job(
        &self,
        job_id: &str,
        job_dir: &Path,
        file: &UploadedFile,
        metadata: &mut JobMetadata,
        ready: &mut ReadySignal,
    ) -> Result<JobOutcome> {
        let config = self.enricher.config();

        validate_extension(&file.original_filename)?;
        let upload_path = file.path.clone();
        let sheet = tokio::task::spawn_blocking(move || read_csv_upload(&upload_path)).await??;
        enforce_row_limit(sheet.rows.len(), config.max_rows)?;
        let columns = resolve_columns(&sheet.headers)?;
        let rows = normalize_rows(&sheet.rows, &columns, sheet.header_row_index, &sheet.headers)?;

        let contacts: Vec<Contact> = rows.iter().filter_map(|row| row.contact.clone()).collect();
        let skipped_rows = rows.len() - contacts.len();
        let mut progress = ProgressSnapshot::new(contacts.len(), skipped_rows);

        let output_filename = format!("output-{}-{}.csv", job_id, Utc::now().timestamp_millis());
        let output_path = job_dir.join(&output_filename);
        let download_url = format!("{}/{}", config.download_url_prefix.trim_end_matches('/'), job_id);

        let initial_rows = rows
            .iter()
            .map(|row| match (&row.existing_email, &row.contact) {
                (Some(email), _) => compose_row(&row.sanitized_row, Some(email.as_str()), Some(DeliveryStatus::Valid.as_str())),
                (None, None) => compose_row(&row.sanitized_row, None, Some(DeliveryStatus::NotFound.as_str())),
                (None, Some(_)) => compose_row(&row.sanitized_row, None, None),
            })
            .collect();
        let csv_writer = CsvSnapshotWriter::new(&output_path, build_column_order(&sheet.headers, &columns), initial_rows);
        csv_writer.write_snapshot().await?;

        metadata.totals = Some(JobTotals {
            total_rows: rows.len(),
            runnable_contacts: contacts.len(),
            skipped_rows,
            skipped_breakdown: skip_breakdown(&rows),
        });
        metadata.progress = Some(progress.clone());
        metadata.output_filename = Some(output_filename.clone());
        metadata.download_url = Some(download_url.clone());
        metadata.result_count = 0;
        metadata.last_update = Some(Utc::now());
        self.storage.write_metadata(job_dir, metadata).await?;
        ready.notify(metadata);
        tracing::info!(target: "job_task", "[{}] {} rows parsed: {} runnable, {} skipped.",
            job_id, rows.len(), contacts.len(), skipped_rows);

        let rows_by_id: HashMap<usize, &NormalizedRow> = rows.iter().map(|row| (row.row_id, row)).collect();
        let mut results = Vec::with_capacity(contacts.len());

        if !contacts.is_empty() {
            let mut stream = self.enricher.process_contacts(contacts);
            while let Some(result) = stream.recv().await {
                let row_id = result.contact.row_id;
                match rows_by_id.get(&row_id) {
                    Some(row) => {
                        let csv_row = compose_row(
                            &row.sanitized_row,
                            result.best_email.as_deref(),
                            Some(result.status.as_str()),
                        );
                        csv_writer.set_row(row_id, csv_row).await?;
                    }
                    None => {
                        tracing::warn!(target: "job_task", "[{}] Result for unknown row {}", job_id, row_id);
                    }
                }

                progress.record_result(result.status.as_str());
                metadata.progress = Some(progress.clone());
                metadata.result_count = progress.processed_contacts;
                metadata.last_update = Some(Utc::now());
                self.storage.write_metadata(job_dir, metadata).await?;
                tracing::debug!(target: "job_task", "[{}] Progress {}/{}",
                    job_id, progress.processed_contacts, progress.total_contacts);

                results.push(result);
            }
            stream.finish().await?;
        }

        if !progress.is_complete() {
            return Err(AppError::Task(format!(
                "contact processing stopped after {} of {} contacts",
                progress.processed_contacts, progress.total_contacts
            )));
        }

        let records = build_result_sets(&rows, results);

        metadata.status = JobStatus::Completed;
        metadata.completed_at = Some(Utc::now());
        metadata.result_count = records.len();
        self.storage.write_metadata(job_dir, metadata).await?;
        tracing::info!(target: "job_task", "[{}] Job completed: {:?}", job_id, progress.status_counts);

        Ok(JobOutcome {
            job_id: job_id.to_string(),
            output_filename,
            output_path,
            download_url,
            results: records,
        })
    }
}
