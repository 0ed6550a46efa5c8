//! # Email Enricher Core Library
//!
//! This crate guesses work email addresses from contact names and company
//! domains, checks each guess against a rate-limited verification service and
//! tracks long-running upload jobs on disk.
//!
//! It is designed to be used either directly as a library or via the
//! `email-enricher` command-line tool (which uses this library).

mod core;
pub mod job;
pub mod utils;
pub mod verification;

pub use crate::core::config::{Config, ConfigBuilder, ConfigFile, KeyPolicy};
pub use crate::core::enricher::{ContactResults, EmailEnricher};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    Contact, ContactResult, DeliveryStatus, EnrichedRecord, KeyAllocation, ResultDetails,
    VerificationOutcome,
};
pub use crate::job::metadata::{JobMetadata, JobStatus};
pub use crate::job::orchestrator::{JobOutcome, JobRunner, UploadedFile};
pub use crate::job::progress::ProgressSnapshot;
pub use crate::job::state::ActiveJobs;
pub use crate::job::storage::JobStorage;

/// Builds an `EmailEnricher` wired to the real key provider and verification API.
pub fn initialize_enricher(config: &Config) -> Result<EmailEnricher> {
    EmailEnricher::new(config)
}

/// Enriches a list of already-normalized contacts without any job bookkeeping.
///
/// Records come back in completion order, one per input contact. Fails with
/// `AppError::Task` if the processor dies before every contact is delivered.
pub async fn enrich_contacts(enricher: &EmailEnricher, contacts: Vec<Contact>) -> Result<Vec<EnrichedRecord>> {
    let total = contacts.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut stream = enricher.process_contacts(contacts);
    let mut records = Vec::with_capacity(total);
    while let Some(result) = stream.recv().await {
        records.push(EnrichedRecord::from(result));
    }
    stream.finish().await?;

    if records.len() != total {
        return Err(AppError::Task(format!(
            "expected {} results but received {}",
            total,
            records.len()
        )));
    }
    Ok(records)
}
