//! Verification API client: one network call per candidate email.
//!
//! Every call first obtains a key allocation and waits out the cadence the
//! allocation (and the configured minimum delay) asks for. The cadence gate is
//! shared by all callers of one client, so concurrent contacts still produce a
//! single, serialized stream of verification requests.

use crate::core::config::Config;
use crate::core::models::{KeyAllocation, VerificationOutcome};
use crate::verification::keys::KeySource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Verifies a single candidate email. Never fails: errors land in the outcome.
#[async_trait]
pub trait EmailVerifier: Send + Sync {
    async fn verify(&self, email: &str) -> VerificationOutcome;
}

/// How long to wait before using `allocation`, given the current time.
///
/// `max(nextRequestAllowedAt - now, avgRequestIntervalMs)`, never negative.
pub fn cadence_wait(allocation: &KeyAllocation, now: DateTime<Utc>) -> Duration {
    let until_allowed = allocation
        .next_request_allowed_at
        .and_then(|at| (at - now).to_std().ok())
        .unwrap_or(Duration::ZERO);
    let avg_interval = Duration::from_millis(allocation.avg_request_interval_ms.unwrap_or(0));
    until_allowed.max(avg_interval)
}

fn field_as_string(data: &Value, field: &str) -> Option<String> {
    match data.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// HTTP client for the MailTester-style verification endpoint.
pub struct MailTesterClient {
    http_client: Client,
    base_url: String,
    keys: Arc<dyn KeySource>,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl MailTesterClient {
    pub fn new(
        http_client: Client,
        base_url: impl Into<String>,
        keys: Arc<dyn KeySource>,
        min_delay: Duration,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            keys,
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config, http_client: Client, keys: Arc<dyn KeySource>) -> Self {
        Self::new(
            http_client,
            config.verification_base_url.clone(),
            keys,
            config.min_delay,
        )
    }

    /// Acquires a key and sleeps out the cadence, holding the shared gate throughout.
    async fn wait_for_turn(&self, email: &str) -> crate::Result<KeyAllocation> {
        let mut last_request = self.last_request.lock().await;

        let allocation = self.keys.acquire_key().await?;

        let since_last = last_request.map(|at| at.elapsed());
        let throttle = since_last
            .map(|elapsed| self.min_delay.saturating_sub(elapsed))
            .unwrap_or(Duration::ZERO);
        let wait = cadence_wait(&allocation, Utc::now()).max(throttle);

        if !wait.is_zero() {
            tracing::debug!(target: "verification_api",
                "[{}] Waiting {:?} before verification (key: {}, avg interval: {:?}ms, next allowed at: {:?})",
                email, wait, allocation.masked_key(), allocation.avg_request_interval_ms, allocation.next_request_allowed_at);
            tokio::time::sleep(wait).await;
        }

        *last_request = Some(Instant::now());
        Ok(allocation)
    }
}

#[async_trait]
impl EmailVerifier for MailTesterClient {
    async fn verify(&self, email: &str) -> VerificationOutcome {
        let allocation = match self.wait_for_turn(email).await {
            Ok(allocation) => allocation,
            Err(e) => {
                tracing::error!(target: "verification_api", "[{}] No verification key available: {}", email, e);
                let mut outcome = VerificationOutcome::failed(email, e.to_string());
                outcome.key_unavailable = true;
                return outcome;
            }
        };

        tracing::debug!(target: "verification_api", "[{}] Requesting verification with key {}", email, allocation.masked_key());

        let response = match self
            .http_client
            .get(&self.base_url)
            .query(&[("email", email), ("key", allocation.key.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(target: "verification_api", "[{}] Request timed out: {}", email, e);
                } else {
                    tracing::error!(target: "verification_api", "[{}] Request failed: {}", email, e);
                }
                return VerificationOutcome::failed(email, e.to_string());
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let data: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            tracing::error!(target: "verification_api", "[{}] Verification failed with status {}", email, status);
            let mut outcome =
                VerificationOutcome::failed(email, format!("Request failed with status code {}", status.as_u16()));
            outcome.raw = data;
            return outcome;
        }

        let Some(data) = data else {
            tracing::error!(target: "verification_api", "[{}] Response body is not JSON", email);
            return VerificationOutcome::failed(email, "Malformed verification response");
        };

        let outcome = VerificationOutcome {
            email: email.to_string(),
            code: field_as_string(&data, "code"),
            message: field_as_string(&data, "message"),
            raw: Some(data),
            error: None,
            key_unavailable: false,
        };
        tracing::info!(target: "verification_api", "[{}] Response received: code={:?} message={:?}",
            email, outcome.code, outcome.message);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{AppError, Result};
    use serde_json::json;
    use std::time::Instant as StdInstant;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    struct StaticKey(KeyAllocation);

    #[async_trait]
    impl KeySource for StaticKey {
        async fn acquire_key(&self) -> Result<KeyAllocation> {
            Ok(self.0.clone())
        }
    }

    struct NoKey;

    #[async_trait]
    impl KeySource for NoKey {
        async fn acquire_key(&self) -> Result<KeyAllocation> {
            Err(AppError::KeyProvider("response missing subscription key".into()))
        }
    }

    /// Notes when each request reached the server.
    #[derive(Clone, Default)]
    struct ArrivalLog(Arc<parking_lot::Mutex<Vec<StdInstant>>>);

    impl Respond for ArrivalLog {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            self.0.lock().push(StdInstant::now());
            ResponseTemplate::new(200).set_body_json(json!({"code": "ko"}))
        }
    }

    fn client(server: &MockServer, keys: Arc<dyn KeySource>, min_delay: Duration) -> MailTesterClient {
        MailTesterClient::new(Client::new(), format!("{}/ninja", server.uri()), keys, min_delay)
    }

    #[test]
    fn test_cadence_wait() {
        let now = Utc::now();
        let mut allocation = KeyAllocation::new("k");
        assert_eq!(cadence_wait(&allocation, now), Duration::ZERO);

        allocation.avg_request_interval_ms = Some(300);
        assert_eq!(cadence_wait(&allocation, now), Duration::from_millis(300));

        allocation.next_request_allowed_at = Some(now + chrono::Duration::milliseconds(1200));
        assert_eq!(cadence_wait(&allocation, now), Duration::from_millis(1200));

        allocation.next_request_allowed_at = Some(now - chrono::Duration::milliseconds(5000));
        assert_eq!(cadence_wait(&allocation, now), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_verify_sends_email_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ninja"))
            .and(query_param("email", "jane@acme.com"))
            .and(query_param("key", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "ok",
                "message": "Accepted"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let verifier = client(&server, Arc::new(StaticKey(KeyAllocation::new("abc"))), Duration::ZERO);
        let outcome = verifier.verify("jane@acme.com").await;
        assert_eq!(outcome.code.as_deref(), Some("ok"));
        assert_eq!(outcome.message.as_deref(), Some("Accepted"));
        assert!(outcome.error.is_none());
        assert!(outcome.raw.is_some());
    }

    #[tokio::test]
    async fn test_missing_fields_become_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": ""})))
            .mount(&server)
            .await;

        let verifier = client(&server, Arc::new(StaticKey(KeyAllocation::new("abc"))), Duration::ZERO);
        let outcome = verifier.verify("x@acme.com").await;
        assert_eq!(outcome.code, None);
        assert_eq!(outcome.message, None);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_http_error_captured_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let verifier = client(&server, Arc::new(StaticKey(KeyAllocation::new("abc"))), Duration::ZERO);
        let outcome = verifier.verify("x@acme.com").await;
        assert!(outcome.error.as_deref().unwrap().contains("500"));
        assert_eq!(outcome.raw, Some(json!({"error": "boom"})));
        assert!(!outcome.key_unavailable);
        assert_eq!(outcome.verdict(), None);
    }

    #[tokio::test]
    async fn test_key_failure_marks_outcome() {
        let server = MockServer::start().await;
        let verifier = client(&server, Arc::new(NoKey), Duration::ZERO);
        let outcome = verifier.verify("x@acme.com").await;
        assert!(outcome.key_unavailable);
        assert!(outcome.error.unwrap().contains("missing subscription key"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_min_delay_spaces_consecutive_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "ko"})))
            .mount(&server)
            .await;

        let verifier = client(
            &server,
            Arc::new(StaticKey(KeyAllocation::new("abc"))),
            Duration::from_millis(200),
        );
        let started = StdInstant::now();
        verifier.verify("a@acme.com").await;
        verifier.verify("b@acme.com").await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_avg_interval_is_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "ok"})))
            .mount(&server)
            .await;

        let mut allocation = KeyAllocation::new("abc");
        allocation.avg_request_interval_ms = Some(150);
        let verifier = client(&server, Arc::new(StaticKey(allocation)), Duration::ZERO);
        let started = StdInstant::now();
        verifier.verify("a@acme.com").await;
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_gate() {
        let server = MockServer::start().await;
        let arrivals = ArrivalLog::default();
        Mock::given(method("GET"))
            .respond_with(arrivals.clone())
            .expect(4)
            .mount(&server)
            .await;

        let min_delay = Duration::from_millis(150);
        let verifier = client(&server, Arc::new(StaticKey(KeyAllocation::new("abc"))), min_delay);
        let emails = ["a@acme.com", "b@acme.com", "c@acme.com", "d@acme.com"];

        let started = StdInstant::now();
        let outcomes = futures::future::join_all(emails.iter().map(|email| verifier.verify(email))).await;
        assert!(started.elapsed() >= min_delay * 3);
        assert!(outcomes.iter().all(|o| o.error.is_none()));

        let mut times = arrivals.0.lock().clone();
        times.sort();
        assert_eq!(times.len(), 4);
        // Arrival times include a few ms of client-side jitter on top of the gate spacing.
        let tolerance = Duration::from_millis(15);
        for pair in times.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap + tolerance >= min_delay, "requests only {:?} apart", gap);
        }
    }
}
