//! Reconciliation loop primitives.
//!
//! The allocator never trusts an in-memory model between passes: every pass
//! re-reads the backend, decides, and acts. This library holds the pieces
//! that are independent of any particular backend:
//!
//! - **Inventory stamps**: a deterministic fingerprint of an observed
//!   bus → rule-count map, used to compare two reconciliations.
//! - **Backoff**: bounded, jittered exponential retry for transient
//!   transport failures.
//!
//! # Invariants
//!
//! - Stamps are deterministic given the same observation, regardless of
//!   the order in which buses were listed
//! - Retries are bounded; non-retryable errors surface on the first attempt

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Fingerprint of an observed inventory.
///
/// Two reconciliations that observed the same buses with the same rule
/// counts produce equal stamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InventoryStamp(String);

impl InventoryStamp {
    /// Compute a stamp from `(bus name, rule count)` pairs.
    pub fn from_counts<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let map: serde_json::Map<String, serde_json::Value> = counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), serde_json::Value::from(count)))
            .collect();
        Self::from_json(&serde_json::Value::Object(map))
    }

    /// Compute a stamp from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Get the stamp string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InventoryStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Exponential backoff policy for retrying failed operations.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Randomize each delay into `[delay / 2, delay]`.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()));

        if !self.jitter || capped.is_zero() {
            return capped;
        }

        let half = capped / 2;
        let spread = (capped - half).as_micros() as u64;
        half + Duration::from_micros(rand::rng().random_range(0..=spread))
    }
}

/// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or the policy runs out of attempts.
pub async fn retry<T, E, F, Fut, P>(policy: &BackoffPolicy, mut op: F, is_retryable: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Default sweep interval for reclaiming drained buses.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60); // 5 minutes

/// Default attempts for a single backend call or placement cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_stamp_ignores_listing_order() {
        let a = InventoryStamp::from_counts([("pool-1", 3), ("pool-2", 1)]);
        let b = InventoryStamp::from_counts([("pool-2", 1), ("pool-1", 3)]);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("sha256:"));
    }

    #[test]
    fn test_stamp_tracks_counts() {
        let a = InventoryStamp::from_counts([("pool-1", 3)]);
        let b = InventoryStamp::from_counts([("pool-1", 2)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = BackoffPolicy::default();
        for attempt in 1..6 {
            let unjittered = BackoffPolicy {
                jitter: false,
                ..policy.clone()
            }
            .delay_for(attempt);
            let delay = policy.delay_for(attempt);
            assert!(delay <= unjittered);
            assert!(delay >= unjittered / 2);
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, String> = retry(
            &fast_policy(3),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("transient {n}"))
                } else {
                    Ok(n)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = retry(
            &fast_policy(5),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("permanent".to_string())
            },
            |e| e != "permanent",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), String> = retry(
            &fast_policy(4),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("transient".to_string())
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
