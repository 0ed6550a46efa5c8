//! Batch combo processor: drives candidate generation and verification per contact.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{Contact, ContactResult, DeliveryStatus, ResultDetails, VerificationOutcome};
use crate::utils::patterns::generate_email_patterns;
use crate::verification::api::{EmailVerifier, MailTesterClient};
use crate::verification::keys::key_source_from_config;

use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Best verdict seen so far for one contact.
struct BestOutcome {
    status: DeliveryStatus,
    email: String,
    message: Option<String>,
}

/// Results of a batch, in completion order, tied to the task producing them.
pub struct ContactResults {
    receiver: mpsc::Receiver<ContactResult>,
    task: JoinHandle<()>,
}

impl ContactResults {
    /// Next finished contact; `None` once the processor has stopped.
    pub async fn recv(&mut self) -> Option<ContactResult> {
        self.receiver.recv().await
    }

    /// Waits for the processor to exit. A panic inside it surfaces as `AppError::Task`.
    pub async fn finish(self) -> Result<()> {
        let Self { receiver, task } = self;
        drop(receiver);
        task.await?;
        Ok(())
    }
}

/// The main struct orchestrating candidate trials for contacts.
#[derive(Clone)]
pub struct EmailEnricher {
    config: Arc<Config>,
    verifier: Arc<dyn EmailVerifier>,
}

impl EmailEnricher {
    /// Wires the real key provider and verification clients from `config`.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        tracing::debug!("Initializing EmailEnricher components...");
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        let keys = key_source_from_config(config, http_client.clone());
        let verifier = MailTesterClient::from_config(config, http_client, keys);
        tracing::info!(
            "EmailEnricher initialized (key policy: {:?}, wave size: {}, concurrency: {}).",
            config.key_policy,
            config.wave_size,
            config.max_concurrency
        );
        Ok(Self::with_verifier(Arc::new(config.clone()), Arc::new(verifier)))
    }

    /// Builds an enricher around any verifier implementation.
    pub fn with_verifier(config: Arc<Config>, verifier: Arc<dyn EmailVerifier>) -> Self {
        Self { config, verifier }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tries a contact's candidates in priority order and returns its result.
    ///
    /// Stops at the first `valid` verdict. Otherwise keeps the best status seen
    /// (`valid > catch_all > not_found`). A key allocation failure ends the
    /// chain and resolves the contact to `not_found` with the error recorded.
    pub async fn enrich_contact(&self, contact: Contact) -> ContactResult {
        let task_label = contact.label();
        let start_time = Instant::now();

        let candidates: Vec<String> =
            generate_email_patterns(&contact.first_name, &contact.last_name, &contact.domain)
                .into_iter()
                .take(self.config.max_combos)
                .collect();

        if candidates.is_empty() {
            tracing::info!(target: "enrich_task", "[{}] No candidates could be generated.", task_label);
            return ContactResult {
                contact,
                best_email: None,
                status: DeliveryStatus::NotFound,
                details: ResultDetails {
                    reason: Some("No email candidates could be generated".to_string()),
                    ..ResultDetails::default()
                },
                results_per_combo: Vec::new(),
            };
        }

        let total_candidates = candidates.len();
        let mut outcomes: Vec<VerificationOutcome> = Vec::with_capacity(total_candidates);
        let mut best: Option<BestOutcome> = None;
        let mut key_error: Option<String> = None;

        for (index, email) in candidates.iter().enumerate() {
            let candidate_label = format!("[{}:{}/{}] {}", task_label, index + 1, total_candidates, email);
            let outcome = self.verifier.verify(email).await;

            if outcome.key_unavailable {
                tracing::error!(target: "enrich_task", "{} Key allocation failed, abandoning remaining candidates: {}",
                    candidate_label, outcome.error.as_deref().unwrap_or("unknown error"));
                key_error = outcome.error.clone();
                outcomes.push(outcome);
                break;
            }

            match outcome.verdict() {
                Some(status) => {
                    tracing::debug!(target: "enrich_task", "{} -> {}", candidate_label, status);
                    let improves = best.as_ref().map_or(true, |b| status.rank() > b.status.rank());
                    if improves {
                        best = Some(BestOutcome {
                            status,
                            email: email.clone(),
                            message: outcome.message.clone(),
                        });
                    }
                }
                None => {
                    tracing::warn!(target: "enrich_task", "{} Verification error: {}",
                        candidate_label, outcome.error.as_deref().unwrap_or("unknown error"));
                }
            }
            outcomes.push(outcome);

            if best.as_ref().is_some_and(|b| b.status == DeliveryStatus::Valid) {
                tracing::info!(target: "enrich_task", "{} Valid address found, skipping {} remaining candidates.",
                    candidate_label, total_candidates - (index + 1));
                break;
            }
        }

        let checked_candidates = outcomes.len();
        let all_failed = outcomes.iter().all(|o| o.error.is_some());
        let error = key_error.or_else(|| {
            if all_failed {
                outcomes.last().and_then(|o| o.error.clone())
            } else {
                None
            }
        });

        let (status, best_email, message) = match best {
            Some(b) if b.status != DeliveryStatus::NotFound => (b.status, Some(b.email), b.message),
            Some(b) => (DeliveryStatus::NotFound, None, b.message),
            None => (DeliveryStatus::NotFound, None, None),
        };
        let reason = match status {
            DeliveryStatus::Valid => None,
            DeliveryStatus::CatchAll => Some("Domain accepts all addresses".to_string()),
            DeliveryStatus::NotFound => Some(format!(
                "No deliverable address among {} checked candidates",
                checked_candidates
            )),
        };

        tracing::info!(target: "enrich_task", "[{}] Finished in {:.2?}: {} ({:?}) after {} checks.",
            task_label, start_time.elapsed(), status, best_email, checked_candidates);

        ContactResult {
            contact,
            best_email,
            status,
            details: ResultDetails {
                reason,
                checked_candidates,
                message,
                error,
            },
            results_per_combo: outcomes,
        }
    }

    /// Processes contacts in waves and yields one result per contact, in completion order.
    ///
    /// Each wave of `wave_size` contacts is run with at most `max_concurrency`
    /// contacts in flight and fully drained before the next wave starts. The
    /// channel holds a single result, so the producer waits for the consumer
    /// to take each result before delivering the next. Dropping the stream
    /// stops the processor after its current contact.
    pub fn process_contacts(&self, contacts: Vec<Contact>) -> ContactResults {
        let (tx, receiver) = mpsc::channel(1);
        let enricher = self.clone();

        let task = tokio::spawn(async move {
            let total = contacts.len();
            let wave_size = enricher.config.wave_size.max(1);
            let max_concurrency = enricher.config.max_concurrency.max(1);
            let mut remaining = contacts.into_iter();
            let mut wave_number = 0usize;

            loop {
                let wave: Vec<Contact> = remaining.by_ref().take(wave_size).collect();
                if wave.is_empty() {
                    break;
                }
                wave_number += 1;
                tracing::debug!(target: "enrich_task", "Starting wave {} ({} contacts, {} total).",
                    wave_number, wave.len(), total);

                let mut tasks = FuturesUnordered::new();
                let mut pending = wave.into_iter();

                loop {
                    while tasks.len() < max_concurrency {
                        match pending.next() {
                            Some(contact) => {
                                let enricher = enricher.clone();
                                tasks.push(async move { enricher.enrich_contact(contact).await });
                            }
                            None => break,
                        }
                    }

                    let Some(result) = tasks.next().await else {
                        break;
                    };
                    if tx.send(result).await.is_err() {
                        tracing::warn!(target: "enrich_task", "Result receiver dropped; stopping batch processing.");
                        return;
                    }
                }
            }
            tracing::debug!(target: "enrich_task", "All {} contacts processed in {} waves.", total, wave_number);
        });

        ContactResults { receiver, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigBuilder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Answers from a fixed table; unknown emails get `ko`.
    #[derive(Default)]
    struct ScriptedVerifier {
        codes: HashMap<String, &'static str>,
        errors: Vec<String>,
        key_failure: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedVerifier {
        fn with(codes: &[(&str, &'static str)]) -> Self {
            Self {
                codes: codes.iter().map(|(e, c)| (e.to_string(), *c)).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl EmailVerifier for ScriptedVerifier {
        async fn verify(&self, email: &str) -> VerificationOutcome {
            self.calls.lock().push(email.to_string());
            if self.key_failure {
                let mut outcome = VerificationOutcome::failed(email, "no key");
                outcome.key_unavailable = true;
                return outcome;
            }
            if self.errors.iter().any(|e| e == email) {
                return VerificationOutcome::failed(email, "timeout");
            }
            let code = self.codes.get(email).copied().unwrap_or("ko");
            VerificationOutcome {
                email: email.to_string(),
                code: Some(code.to_string()),
                message: Some(format!("code {}", code)),
                raw: None,
                error: None,
                key_unavailable: false,
            }
        }
    }

    fn enricher(verifier: Arc<ScriptedVerifier>, wave_size: usize) -> EmailEnricher {
        let config = ConfigBuilder::new()
            .wave_size(wave_size)
            .max_concurrency(3)
            .build()
            .expect("test config");
        EmailEnricher::with_verifier(Arc::new(config), verifier)
    }

    #[tokio::test]
    async fn test_stops_at_first_valid() {
        let verifier = Arc::new(ScriptedVerifier::with(&[("jane.doe@acme.com", "ok")]));
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;

        assert_eq!(result.status, DeliveryStatus::Valid);
        assert_eq!(result.best_email.as_deref(), Some("jane.doe@acme.com"));
        assert_eq!(verifier.calls(), vec!["jane@acme.com", "jane.doe@acme.com"]);
        assert_eq!(result.details.checked_candidates, 2);
        assert_eq!(result.results_per_combo.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausts_capped_candidates() {
        let verifier = Arc::new(ScriptedVerifier::default());
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;

        assert_eq!(result.status, DeliveryStatus::NotFound);
        assert_eq!(result.best_email, None);
        assert_eq!(verifier.calls().len(), 8);
        assert!(!verifier.calls().contains(&"doe@acme.com".to_string()));
    }

    #[tokio::test]
    async fn test_catch_all_kept_but_later_valid_wins() {
        let verifier = Arc::new(ScriptedVerifier::with(&[
            ("jane@acme.com", "mb"),
            ("janed@acme.com", "ok"),
        ]));
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;
        assert_eq!(result.status, DeliveryStatus::Valid);
        assert_eq!(result.best_email.as_deref(), Some("janed@acme.com"));
        assert_eq!(verifier.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_first_catch_all_survives_later_not_found() {
        let verifier = Arc::new(ScriptedVerifier::with(&[
            ("jane.doe@acme.com", "mb"),
            ("jdoe@acme.com", "mb"),
        ]));
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;
        assert_eq!(result.status, DeliveryStatus::CatchAll);
        assert_eq!(result.best_email.as_deref(), Some("jane.doe@acme.com"));
        assert_eq!(verifier.calls().len(), 8);
    }

    #[tokio::test]
    async fn test_errors_continue_to_next_candidate() {
        let mut scripted = ScriptedVerifier::with(&[("jane.doe@acme.com", "ok")]);
        scripted.errors.push("jane@acme.com".to_string());
        let verifier = Arc::new(scripted);
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;
        assert_eq!(result.status, DeliveryStatus::Valid);
        assert_eq!(result.results_per_combo[0].error.as_deref(), Some("timeout"));
        assert!(result.details.error.is_none());
    }

    #[tokio::test]
    async fn test_key_failure_ends_contact() {
        let verifier = Arc::new(ScriptedVerifier {
            key_failure: true,
            ..ScriptedVerifier::default()
        });
        let result = enricher(verifier.clone(), 25)
            .enrich_contact(Contact::new("Jane", "Doe", "acme.com", 0))
            .await;
        assert_eq!(result.status, DeliveryStatus::NotFound);
        assert_eq!(verifier.calls().len(), 1);
        assert_eq!(result.details.error.as_deref(), Some("no key"));
    }

    #[tokio::test]
    async fn test_no_candidates_resolves_immediately() {
        let verifier = Arc::new(ScriptedVerifier::default());
        let enricher = enricher(verifier.clone(), 25);

        let no_domain = enricher.enrich_contact(Contact::new("Jane", "Doe", "", 0)).await;
        assert_eq!(no_domain.status, DeliveryStatus::NotFound);
        assert_eq!(no_domain.details.checked_candidates, 0);

        let no_names = enricher.enrich_contact(Contact::new("", "", "acme.com", 1)).await;
        assert_eq!(no_names.status, DeliveryStatus::NotFound);
        assert!(verifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_process_contacts_yields_one_result_per_contact() {
        let verifier = Arc::new(ScriptedVerifier::with(&[("ann@x.io", "ok"), ("bo@y.io", "ok")]));
        let contacts: Vec<Contact> = (0..7)
            .map(|i| match i % 3 {
                0 => Contact::new("Ann", "Lee", "x.io", i),
                1 => Contact::new("Bo", "", "y.io", i),
                _ => Contact::new("Cy", "Ng", "", i),
            })
            .collect();

        let mut rx = enricher(verifier, 2).process_contacts(contacts);
        let mut seen = Vec::new();
        while let Some(result) = rx.recv().await {
            seen.push(result.contact.row_id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    /// Answers `ok` after a short pause and records how many calls overlap.
    #[derive(Default)]
    struct TrackingVerifier {
        in_flight: Mutex<usize>,
        peak: Mutex<usize>,
        events: Mutex<Vec<(&'static str, String)>>,
    }

    #[async_trait]
    impl EmailVerifier for TrackingVerifier {
        async fn verify(&self, email: &str) -> VerificationOutcome {
            {
                let mut in_flight = self.in_flight.lock();
                *in_flight += 1;
                let mut peak = self.peak.lock();
                *peak = (*peak).max(*in_flight);
                self.events.lock().push(("start", email.to_string()));
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            {
                *self.in_flight.lock() -= 1;
                self.events.lock().push(("end", email.to_string()));
            }
            VerificationOutcome {
                email: email.to_string(),
                code: Some("ok".to_string()),
                message: None,
                raw: None,
                error: None,
                key_unavailable: false,
            }
        }
    }

    async fn run_tracked(wave_size: usize, max_concurrency: usize, names: &[&str]) -> Arc<TrackingVerifier> {
        let verifier = Arc::new(TrackingVerifier::default());
        let config = ConfigBuilder::new()
            .wave_size(wave_size)
            .max_concurrency(max_concurrency)
            .build()
            .expect("test config");
        let enricher = EmailEnricher::with_verifier(Arc::new(config), verifier.clone());
        let contacts = names
            .iter()
            .enumerate()
            .map(|(i, name)| Contact::new(*name, "", "x.io", i))
            .collect();

        let mut stream = enricher.process_contacts(contacts);
        let mut delivered = 0;
        while stream.recv().await.is_some() {
            delivered += 1;
        }
        stream.finish().await.unwrap();
        assert_eq!(delivered, names.len());
        verifier
    }

    #[tokio::test(start_paused = true)]
    async fn test_waves_do_not_overlap() {
        let verifier = run_tracked(2, 3, &["A", "B", "C", "D", "E"]).await;
        assert_eq!(*verifier.peak.lock(), 2);

        let events = verifier.events.lock().clone();
        let position = |kind: &str, email: &str| {
            events
                .iter()
                .position(|(k, e)| *k == kind && e == email)
                .unwrap()
        };
        let waves: [&[&str]; 3] = [&["a@x.io", "b@x.io"], &["c@x.io", "d@x.io"], &["e@x.io"]];
        for pair in waves.windows(2) {
            let last_end = pair[0].iter().map(|e| position("end", e)).max().unwrap();
            let first_start = pair[1].iter().map(|e| position("start", e)).min().unwrap();
            assert!(last_end < first_start, "wave overlap in {:?}", events);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_capped_within_wave() {
        let verifier = run_tracked(6, 2, &["A", "B", "C", "D", "E", "F"]).await;
        assert_eq!(*verifier.peak.lock(), 2);
        assert_eq!(verifier.events.lock().len(), 12);
    }
}
