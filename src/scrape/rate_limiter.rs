// src/scrape/rate_limiter.rs
//! Per-domain minimum-interval gate for outbound fetches.
//!
//! One mutex/timestamp pair per domain, created lazily. Successive waits for
//! the same domain are spaced by at least the requested delay; waits for
//! distinct domains never block each other. Purely a timing primitive; there
//! are no error conditions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Default)]
struct DomainGate {
    last_fetch: Option<Instant>,
    waits: u64,
    total_waited: Duration,
}

/// Per-domain wait statistics, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainStats {
    /// Number of calls that actually had to sleep.
    pub waits: u64,
    pub total_waited_ms: u128,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    // Outer std lock is held only to look up / insert the per-domain gate;
    // the sleep happens under the inner async lock.
    domains: Mutex<HashMap<String, Arc<AsyncMutex<DomainGate>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn gate(&self, domain: &str) -> Arc<AsyncMutex<DomainGate>> {
        let mut map = self.domains.lock().expect("rate limiter map poisoned");
        map.entry(domain.to_string()).or_default().clone()
    }

    /// Suspend the caller just long enough that consecutive calls for
    /// `domain` are separated by at least `min_delay`.
    pub async fn wait_if_needed(&self, domain: &str, min_delay: Duration) {
        let gate = self.gate(domain);
        let mut g = gate.lock().await;
        if let Some(last) = g.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < min_delay {
                let remaining = min_delay - elapsed;
                g.waits += 1;
                g.total_waited += remaining;
                tokio::time::sleep(remaining).await;
            }
        }
        g.last_fetch = Some(Instant::now());
    }

    /// Forget one domain's timing state.
    pub fn reset(&self, domain: &str) {
        let mut map = self.domains.lock().expect("rate limiter map poisoned");
        map.remove(domain);
    }

    /// Snapshot of per-domain wait statistics.
    pub fn stats(&self) -> HashMap<String, DomainStats> {
        let map = self.domains.lock().expect("rate limiter map poisoned");
        map.iter()
            .filter_map(|(domain, gate)| {
                // try_lock: a gate currently sleeping is simply skipped in
                // the snapshot rather than awaited.
                gate.try_lock().ok().map(|g| {
                    (
                        domain.clone(),
                        DomainStats {
                            waits: g.waits,
                            total_waited_ms: g.total_waited.as_millis(),
                        },
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_domain_calls_are_spaced() {
        let rl = RateLimiter::new();
        let d = Duration::from_millis(120);

        rl.wait_if_needed("example.com", d).await;
        let t0 = Instant::now();
        rl.wait_if_needed("example.com", d).await;
        assert!(
            t0.elapsed() >= Duration::from_millis(110),
            "second acquisition returned after only {:?}",
            t0.elapsed()
        );

        let stats = rl.stats();
        assert_eq!(stats["example.com"].waits, 1);
    }

    #[tokio::test]
    async fn distinct_domains_do_not_block_each_other() {
        let rl = Arc::new(RateLimiter::new());
        let d = Duration::from_millis(200);

        // Prime both domains so the next call on each would have to wait.
        rl.wait_if_needed("a.example", d).await;
        rl.wait_if_needed("b.example", d).await;

        let t0 = Instant::now();
        let a = {
            let rl = rl.clone();
            tokio::spawn(async move { rl.wait_if_needed("a.example", d).await })
        };
        let b = {
            let rl = rl.clone();
            tokio::spawn(async move { rl.wait_if_needed("b.example", d).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        // Serialized waits would take ~400ms; independent ones ~200ms.
        assert!(
            t0.elapsed() < Duration::from_millis(380),
            "distinct domains appear to serialize: {:?}",
            t0.elapsed()
        );
    }

    #[tokio::test]
    async fn first_call_and_reset_do_not_wait() {
        let rl = RateLimiter::new();
        let d = Duration::from_millis(500);

        let t0 = Instant::now();
        rl.wait_if_needed("fresh.example", d).await;
        assert!(t0.elapsed() < Duration::from_millis(100));

        rl.reset("fresh.example");
        let t1 = Instant::now();
        rl.wait_if_needed("fresh.example", d).await;
        assert!(t1.elapsed() < Duration::from_millis(100));
    }
}
