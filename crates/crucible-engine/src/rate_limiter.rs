use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crucible_core::error::RateLimited;

/// Refill rate and burst capacity for one bucket.
#[derive(Debug, Clone, Copy)]
pub struct RateSpec {
    pub rps: f64,
    pub burst: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-tenant token bucket, keyed by API token. Process-local: no
/// cross-process coordination. Admission decisions are made once, up front;
/// there is no mid-run throttling.
#[derive(Debug)]
pub struct RateLimiter {
    defaults: RateSpec,
    inner: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(defaults: RateSpec) -> Self {
        Self {
            defaults,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request for `key`. A rejection still advances the
    /// bucket's refill timestamp (tokens stay fractional).
    pub fn admit(
        &self,
        key: &str,
        tenant: &str,
        spec: Option<RateSpec>,
    ) -> Result<(), RateLimited> {
        self.admit_at(key, tenant, spec, Instant::now())
    }

    fn admit_at(
        &self,
        key: &str,
        tenant: &str,
        spec: Option<RateSpec>,
        now: Instant,
    ) -> Result<(), RateLimited> {
        let RateSpec { rps, burst } = spec.unwrap_or(self.defaults);
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = inner.entry(key.to_string()).or_insert(Bucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rps).min(burst);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return Err(RateLimited::new(tenant));
        }
        bucket.tokens -= 1.0;
        Ok(())
    }
}
