//! Retry with linear backoff for provider requests.
//!
//! A request is retried on transport errors, non-2xx statuses, empty bodies,
//! and any payload the caller's classifier marks as transient (rate-limit
//! notes embedded in a 200 response). Exhaustion yields
//! `EtlError::SourceUnavailable`.

use super::error::EtlError;
use crate::ports::http_port::{HttpPort, HttpRequest, HttpResponse};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Policy with no sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay after the zero-based `attempt` failed: `(attempt + 1) * base`,
    /// saturating at `Duration::MAX`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }
}

/// What a classifier decided about a successful HTTP exchange.
pub enum Outcome<T> {
    Ready(T),
    Retry(String),
    Fatal(EtlError),
}

/// Send `request` until `classify` accepts the response or the policy runs out.
pub fn fetch_with_retry<T>(
    http: &dyn HttpPort,
    policy: &RetryPolicy,
    source_name: &str,
    request: &HttpRequest,
    mut classify: impl FnMut(&HttpResponse) -> Outcome<T>,
) -> Result<T, EtlError> {
    let mut last_reason = String::from("no attempt made");

    for attempt in 0..policy.max_attempts {
        debug!(source = source_name, attempt = attempt + 1, url = %request.url, "request");

        let reason = match http.send(request) {
            Ok(resp) if !resp.is_success() => format!("HTTP {}", resp.status),
            Ok(resp) if resp.body.trim().is_empty() => "empty body".to_string(),
            Ok(resp) => match classify(&resp) {
                Outcome::Ready(value) => return Ok(value),
                Outcome::Retry(reason) => reason,
                Outcome::Fatal(err) => return Err(err),
            },
            Err(e) => e.to_string(),
        };

        warn!(
            source = source_name,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            "transient failure: {reason}"
        );
        last_reason = reason;

        if attempt + 1 < policy.max_attempts {
            std::thread::sleep(policy.delay_after(attempt));
        }
    }

    Err(EtlError::SourceUnavailable {
        source_name: source_name.to_string(),
        attempts: policy.max_attempts,
        reason: last_reason,
    })
}
