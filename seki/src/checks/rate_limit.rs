//! Request rate limiting as a guardrail.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::context::GuardrailContext;
use crate::guardrail::{CheckError, GuardrailCheck, GuardrailOutput, Severity};

/// Derives the bucket key for a context. Contexts mapping to the same
/// key share a budget.
pub type KeyFn = Arc<dyn Fn(&GuardrailContext) -> String + Send + Sync>;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter.
///
/// Allows `max_requests` per `per` window, refilling continuously. The
/// bucket map lives inside the check, so cloning the wrapping
/// [`Guardrail`](crate::guardrail::Guardrail) shares the same budget.
/// By default every context shares one global bucket; a key function
/// partitions the budget (per user, per session, whatever the key
/// derives).
///
/// Metadata: `remaining` on a pass; `key` and `retry_after_ms` on a trip.
pub struct RateLimit {
    capacity: f64,
    refill_per_sec: f64,
    key_fn: KeyFn,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimit {
    /// Allow `max_requests` per `per` window.
    #[must_use]
    pub fn new(max_requests: u32, per: Duration) -> Self {
        let capacity = f64::from(max_requests);
        let per_secs = per.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            refill_per_sec: capacity / per_secs,
            key_fn: Arc::new(|_| "global".to_owned()),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Partition the budget by a derived key.
    #[must_use]
    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&GuardrailContext) -> String + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Take one token for `key`, refilling by elapsed time first. Returns
    /// the remaining tokens on success, or the wait until the next token
    /// on refusal.
    fn try_take(&self, key: &str) -> Result<f64, Duration> {
        let now = Instant::now();
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let bucket = buckets.entry(key.to_owned()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(bucket.tokens)
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

#[async_trait]
impl GuardrailCheck for RateLimit {
    async fn check(&self, ctx: &GuardrailContext) -> Result<GuardrailOutput, CheckError> {
        let key = (self.key_fn)(ctx);
        match self.try_take(&key) {
            Ok(remaining) => Ok(GuardrailOutput::pass().with_metadata("remaining", remaining)),
            Err(retry_after) => {
                let retry_after_ms =
                    u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                Ok(GuardrailOutput::tripwire(format!(
                    "Rate limit exceeded for key '{key}'"
                ))
                .with_severity(Severity::Medium)
                .with_suggestion("Wait before sending further requests")
                .with_metadata("key", key)
                .with_metadata("retry_after_ms", retry_after_ms))
            }
        }
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .finish_non_exhaustive()
    }
}
