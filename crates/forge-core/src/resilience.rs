//! Resilience Envelope: retry-inside-circuit-breaker around every external call
//! (§4.2).
//!
//! Generalized from `router/circuit_breaker.rs`'s per-`ModelId` breaker to a
//! per-endpoint-string breaker; the Closed/Open/HalfOpen state machine and the exponential
//! rate-limit cooldown are carried over unchanged.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-endpoint circuit breaker. One instance guards every endpoint the orchestrator talks
/// to (thinker, code-gen, validator, sandbox, memory), keyed by endpoint name.
pub struct CircuitBreaker {
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    cooldown_secs: u64,
}

struct BreakerState {
    consecutive_failures: HashMap<String, u32>,
    last_failure_secs: HashMap<String, u64>,
    rate_limit_hits: HashMap<String, u32>,
    rate_limit_until: HashMap<String, u64>,
    /// Endpoints that have admitted a HalfOpen probe and are awaiting its result.
    probing: HashMap<String, bool>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            inner: Mutex::new(BreakerState {
                consecutive_failures: HashMap::new(),
                last_failure_secs: HashMap::new(),
                rate_limit_hits: HashMap::new(),
                rate_limit_until: HashMap::new(),
                probing: HashMap::new(),
            }),
            failure_threshold,
            cooldown_secs,
        }
    }

    pub fn record_success(&self, endpoint: &str) {
        let mut state = self.inner.lock().expect("breaker poisoned");
        if state.consecutive_failures.remove(endpoint).is_some() {
            info!(endpoint, "circuit breaker closed after successful probe");
        }
        state.last_failure_secs.remove(endpoint);
        state.rate_limit_hits.remove(endpoint);
        state.rate_limit_until.remove(endpoint);
        state.probing.remove(endpoint);
    }

    pub fn record_failure(&self, endpoint: &str) {
        let mut state = self.inner.lock().expect("breaker poisoned");
        let count = state.consecutive_failures.entry(endpoint.to_string()).or_insert(0);
        *count += 1;
        state.last_failure_secs.insert(endpoint.to_string(), unix_now());
        if *count == self.failure_threshold {
            warn!(endpoint, threshold = self.failure_threshold, "circuit breaker opened");
        }
        state.probing.remove(endpoint);
    }

    pub fn record_rate_limit(&self, endpoint: &str) {
        let mut state = self.inner.lock().expect("breaker poisoned");
        let hits = state.rate_limit_hits.entry(endpoint.to_string()).or_insert(0);
        *hits += 1;
        let cooldown = (2u64.saturating_pow(*hits) * 2).min(120);
        state.rate_limit_until.insert(endpoint.to_string(), unix_now() + cooldown);
    }

    pub fn rate_limit_cooldown(&self, endpoint: &str) -> Option<u64> {
        let state = self.inner.lock().expect("breaker poisoned");
        let until = *state.rate_limit_until.get(endpoint)?;
        let now = unix_now();
        if until > now {
            Some(until - now)
        } else {
            None
        }
    }

    pub fn failure_count(&self, endpoint: &str) -> u32 {
        let state = self.inner.lock().expect("breaker poisoned");
        *state.consecutive_failures.get(endpoint).unwrap_or(&0)
    }

    pub fn state(&self, endpoint: &str) -> CircuitState {
        let mut state = self.inner.lock().expect("breaker poisoned");
        let failures = *state.consecutive_failures.get(endpoint).unwrap_or(&0);
        if failures < self.failure_threshold {
            return CircuitState::Closed;
        }
        let last_failure = *state.last_failure_secs.get(endpoint).unwrap_or(&0);
        let now = unix_now();
        if now.saturating_sub(last_failure) >= self.cooldown_secs {
            if *state.probing.get(endpoint).unwrap_or(&false) {
                CircuitState::HalfOpen
            } else {
                state.probing.insert(endpoint.to_string(), true);
                CircuitState::HalfOpen
            }
        } else {
            CircuitState::Open
        }
    }

    /// Whether a call is currently admitted: Closed always; HalfOpen only while no probe is
    /// in flight (callers that get `true` here are the one admitted probe); Open and
    /// rate-limited endpoints are rejected.
    pub fn is_available(&self, endpoint: &str) -> bool {
        if self.rate_limit_cooldown(endpoint).is_some() {
            return false;
        }
        !matches!(self.state(endpoint), CircuitState::Open)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, 30)
    }
}

/// Whether a failure is transient (retryable) per §4.2: network, 5xx, timeout, and 429 are
/// transient; other 4xx and validation errors are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    RateLimited,
    Permanent,
}

/// Retry policy: up to `max_attempts` with delays 2^n seconds, composed inside the circuit
/// breaker (the breaker gates whether a call is attempted at all; retry governs what happens
/// to a single admitted call that fails transiently).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Per-endpoint default timeouts, §4.2.
#[derive(Debug, Clone, Copy)]
pub struct EndpointTimeouts;

impl EndpointTimeouts {
    pub fn thinker() -> Duration {
        Duration::from_secs(30)
    }
    pub fn code_gen() -> Duration {
        Duration::from_secs(120)
    }
    pub fn validator() -> Duration {
        Duration::from_secs(120)
    }
    pub fn sandbox() -> Duration {
        Duration::from_secs(180)
    }
    pub fn memory() -> Duration {
        Duration::from_secs(30)
    }
}

/// Runs `call` under the resilience envelope for `endpoint`: gates on `breaker.is_available`
/// before attempting anything (§4.2's "reject all calls for 30s" while Open), then retries
/// transient failures with exponential backoff up to `retry.max_attempts`, recording outcomes
/// on the breaker as it goes. `breaker_open` builds the error value returned when the breaker
/// itself rejects the call, so callers never need to check `is_available` themselves.
pub async fn call_with_resilience<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    retry: RetryPolicy,
    endpoint: &str,
    classify: impl Fn(&E) -> FailureClass,
    breaker_open: impl Fn(&str) -> E,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    if !breaker.is_available(endpoint) {
        warn!(endpoint, "circuit breaker open; rejecting call without attempting it");
        return Err(breaker_open(endpoint));
    }

    let mut attempt = 0u32;
    loop {
        let result = call().await;
        match result {
            Ok(value) => {
                breaker.record_success(endpoint);
                return Ok(value);
            }
            Err(err) => {
                match classify(&err) {
                    FailureClass::RateLimited => {
                        breaker.record_rate_limit(endpoint);
                        breaker.record_failure(endpoint);
                    }
                    FailureClass::Transient => {
                        breaker.record_failure(endpoint);
                    }
                    FailureClass::Permanent => {
                        return Err(err);
                    }
                }
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn circuit_starts_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state("validator"), CircuitState::Closed);
        assert!(breaker.is_available("validator"));
    }

    #[test]
    fn circuit_opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, 30);
        for _ in 0..5 {
            breaker.record_failure("validator");
        }
        assert!(!breaker.is_available("validator"));
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(5, 30);
        for _ in 0..4 {
            breaker.record_failure("validator");
        }
        breaker.record_success("validator");
        assert_eq!(breaker.failure_count("validator"), 0);
        assert!(breaker.is_available("validator"));
    }

    #[test]
    fn half_open_after_cooldown_elapses() {
        let breaker = CircuitBreaker::new(2, 0);
        breaker.record_failure("validator");
        breaker.record_failure("validator");
        // cooldown_secs = 0, so the very next check should already be HalfOpen.
        assert_eq!(breaker.state("validator"), CircuitState::HalfOpen);
    }

    #[test]
    fn rate_limit_backoff_grows_exponentially_and_caps() {
        let breaker = CircuitBreaker::default();
        breaker.record_rate_limit("validator");
        let first = breaker.rate_limit_cooldown("validator").unwrap();
        assert!(first <= 4);
        for _ in 0..10 {
            breaker.record_rate_limit("validator");
        }
        let capped = breaker.rate_limit_cooldown("validator").unwrap();
        assert!(capped <= 120);
    }

    #[test]
    fn rate_limit_clears_on_success() {
        let breaker = CircuitBreaker::default();
        breaker.record_rate_limit("validator");
        assert!(breaker.rate_limit_cooldown("validator").is_some());
        breaker.record_success("validator");
        assert!(breaker.rate_limit_cooldown("validator").is_none());
    }

    #[derive(Debug)]
    struct Failure(bool); // true = transient

    #[tokio::test]
    async fn call_with_resilience_retries_transient_failures_then_succeeds() {
        let breaker = CircuitBreaker::new(5, 30);
        let attempts = AtomicU32::new(0);
        let result: Result<u32, Failure> = call_with_resilience(
            &breaker,
            RetryPolicy::new(3),
            "validator",
            |e: &Failure| if e.0 { FailureClass::Transient } else { FailureClass::Permanent },
            |_endpoint| Failure(true),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Failure(true))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn call_with_resilience_does_not_retry_permanent_failures() {
        let breaker = CircuitBreaker::new(5, 30);
        let attempts = AtomicU32::new(0);
        let result: Result<u32, Failure> = call_with_resilience(
            &breaker,
            RetryPolicy::new(3),
            "validator",
            |e: &Failure| if e.0 { FailureClass::Transient } else { FailureClass::Permanent },
            |_endpoint| Failure(true),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(Failure(false)) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn call_with_resilience_rejects_without_attempting_when_breaker_is_open() {
        let breaker = CircuitBreaker::new(2, 30);
        breaker.record_failure("validator");
        breaker.record_failure("validator");
        let attempts = AtomicU32::new(0);
        let result: Result<u32, Failure> = call_with_resilience(
            &breaker,
            RetryPolicy::new(3),
            "validator",
            |e: &Failure| if e.0 { FailureClass::Transient } else { FailureClass::Permanent },
            |_endpoint| Failure(false),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Ok(42) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
