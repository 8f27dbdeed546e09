//! Bounded retry with linear backoff.
//!
//! The policy is pure: it decides from the attempt number and the observed
//! outcome. [`send_with_retry`] drives a [`Transport`] under a policy and is
//! shared by the typed client and the polling fetchers.

use crate::transport::{ApiRequest, ApiResponse, Transport};
use common::{Error, ErrorKind, RetryConfig};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// What one attempt produced, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Transport completed with this HTTP status.
    Status(u16),
    /// Attempt failed before or while reading the response.
    Failed(ErrorKind),
}

impl Outcome {
    pub fn of(result: &Result<ApiResponse, Error>) -> Self {
        match result {
            Ok(resp) => Outcome::Status(resp.status),
            Err(e) => Outcome::Failed(e.kind()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    retryable_status_codes: HashSet<u16>,
    retryable_errors: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let mut retryable_errors = HashSet::new();
        if cfg.retry_on_timeout {
            retryable_errors.insert(ErrorKind::Timeout);
        }
        if cfg.retry_on_network {
            retryable_errors.insert(ErrorKind::NetworkUnavailable);
        }
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            retryable_status_codes: cfg.retryable_status_codes.iter().copied().collect(),
            retryable_errors,
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Whether this outcome could succeed on another try. 2xx is never retried;
    /// decode and application failures are deterministic.
    pub fn is_retryable(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Status(status) if (200..300).contains(status) => false,
            Outcome::Status(status) => self.retryable_status_codes.contains(status),
            Outcome::Failed(kind) => self.retryable_errors.contains(kind),
        }
    }

    /// `attempt` is 1-based: the attempt that just produced `outcome`.
    pub fn should_retry(&self, attempt: u32, outcome: &Outcome) -> bool {
        attempt < self.max_attempts && self.is_retryable(outcome)
    }

    /// Wait before the 1-based `attempt`. The first attempt is immediate and
    /// the wait after failed attempt `k` is `k * base_delay`.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_sub(1))
    }
}

/// Final result of a retried request plus how many attempts it took.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub result: Result<ApiResponse, Error>,
    pub attempts: u32,
}

impl Delivery {
    /// Successful responses only; a terminal non-2xx becomes `HttpStatus`.
    pub fn into_success(self) -> Result<ApiResponse, Error> {
        match self.result {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) => Err(status_error(&resp)),
            Err(e) => Err(e),
        }
    }
}

/// Send `request` until it succeeds, hits a non-retryable outcome, or the
/// policy runs out of attempts. When `stop` is raised during a backoff the
/// remaining attempts are abandoned and `Error::Stopped` is returned.
pub async fn send_with_retry(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    request: &ApiRequest,
    stop: Option<&AtomicBool>,
) -> Delivery {
    let mut attempt = 1;
    loop {
        let result = transport.send(request).await;
        let outcome = Outcome::of(&result);

        if matches!(&result, Ok(resp) if resp.is_success()) {
            if attempt > 1 {
                debug!("{} succeeded on attempt {}", request.path, attempt);
            }
            return Delivery { result, attempts: attempt };
        }

        if !policy.should_retry(attempt, &outcome) {
            return Delivery { result, attempts: attempt };
        }

        let delay = policy.delay_before_attempt(attempt + 1);
        warn!(
            "{} {} attempt {}/{} failed ({}), retrying in {}ms",
            request.method.as_str(),
            request.path,
            attempt,
            policy.max_attempts(),
            describe(&result),
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;

        if stop.is_some_and(|s| s.load(Ordering::Acquire)) {
            debug!("{} retry abandoned: stopped", request.path);
            return Delivery {
                result: Err(Error::Stopped),
                attempts: attempt,
            };
        }
        attempt += 1;
    }
}

fn describe(result: &Result<ApiResponse, Error>) -> String {
    match result {
        Ok(resp) => format!("HTTP {}", resp.status),
        Err(e) => e.to_string(),
    }
}

/// Error for a non-2xx response, preferring the backend's `error` message.
pub fn status_error(resp: &ApiResponse) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(&resp.body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| summarize_response_body(&resp.body));
    Error::HttpStatus {
        status: resp.status,
        message,
    }
}

fn summarize_response_body(body: &str) -> String {
    const MAX_LEN: usize = 300;
    let compact = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.is_empty() {
        return "<empty body>".to_string();
    }
    if compact.chars().count() <= MAX_LEN {
        return compact;
    }
    let truncated: String = compact.chars().take(MAX_LEN).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Scripted, ScriptedTransport};

    fn policy(max_attempts: u32, base_delay_ms: u64) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            base_delay_ms,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn test_delay_schedule_is_linear() {
        let p = policy(4, 1000);
        assert_eq!(p.delay_before_attempt(1), Duration::ZERO);
        assert_eq!(p.delay_before_attempt(2), Duration::from_millis(1000));
        assert_eq!(p.delay_before_attempt(3), Duration::from_millis(2000));
        assert_eq!(p.delay_before_attempt(4), Duration::from_millis(3000));
    }

    #[test]
    fn test_should_retry_bounds() {
        let p = policy(3, 10);
        let unavailable = Outcome::Status(503);
        assert!(p.should_retry(1, &unavailable));
        assert!(p.should_retry(2, &unavailable));
        assert!(!p.should_retry(3, &unavailable));

        assert!(!p.should_retry(1, &Outcome::Status(404)));
        assert!(!p.should_retry(1, &Outcome::Status(200)));
        assert!(p.should_retry(1, &Outcome::Failed(ErrorKind::Timeout)));
        assert!(!p.should_retry(1, &Outcome::Failed(ErrorKind::Decode)));
        assert!(!p.should_retry(1, &Outcome::Failed(ErrorKind::Application)));
    }

    #[test]
    fn test_timeout_retry_can_be_disabled() {
        let p = RetryPolicy::from_config(&RetryConfig {
            retry_on_timeout: false,
            ..RetryConfig::default()
        });
        assert!(!p.is_retryable(&Outcome::Failed(ErrorKind::Timeout)));
        assert!(p.is_retryable(&Outcome::Failed(ErrorKind::NetworkUnavailable)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_503_makes_max_attempts_with_linear_waits() {
        let transport = ScriptedTransport::new();
        transport.always("/api/stats", Scripted::status(503, r#"{"error":"down"}"#));

        let delivery =
            send_with_retry(&transport, &policy(3, 1000), &ApiRequest::get("/api/stats"), None)
                .await;

        assert_eq!(delivery.attempts, 3);
        assert_eq!(
            transport.call_offsets("/api/stats"),
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(3000)
            ]
        );
        let err = delivery.into_success().expect_err("all attempts failed");
        assert_eq!(
            err,
            Error::HttpStatus {
                status: 503,
                message: "down".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_is_not_retried() {
        let transport = ScriptedTransport::new();
        transport.always("/api/missing", Scripted::status(404, "Not Found"));

        let delivery =
            send_with_retry(&transport, &policy(4, 1000), &ApiRequest::get("/api/missing"), None)
                .await;

        assert_eq!(delivery.attempts, 1);
        assert_eq!(transport.calls_to("/api/missing"), 1);
        assert_eq!(delivery.into_success().unwrap_err().status(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_timeout() {
        let transport = ScriptedTransport::new();
        transport.push("/api/cities", Scripted::fail(Error::Timeout("slow".into())));
        transport.push("/api/cities", Scripted::status(200, r#"{"cities":[]}"#));

        let delivery =
            send_with_retry(&transport, &policy(4, 500), &ApiRequest::get("/api/cities"), None)
                .await;

        assert_eq!(delivery.attempts, 2);
        assert_eq!(delivery.into_success().expect("second attempt succeeds").status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flag_abandons_backoff() {
        let transport = ScriptedTransport::new();
        transport.always("/api/stats", Scripted::status(502, ""));
        let stop = AtomicBool::new(true);

        let delivery = send_with_retry(
            &transport,
            &policy(4, 1000),
            &ApiRequest::get("/api/stats"),
            Some(&stop),
        )
        .await;

        assert_eq!(delivery.attempts, 1);
        assert_eq!(delivery.result.unwrap_err(), Error::Stopped);
    }

    #[test]
    fn test_status_error_summarizes_html() {
        let resp = ApiResponse::new(500, "<html>\n  <body>boom</body>\n</html>");
        assert_eq!(
            status_error(&resp),
            Error::HttpStatus {
                status: 500,
                message: "<html> <body>boom</body> </html>".into()
            }
        );
    }
}
