//! Local negative cache (L1) of IPs recently denied by the rate limiter
//! (spec §4.2).
//!
//! Readers dominate under load, so lookups take a shared `parking_lot`
//! read guard; writers (`block`, `cleanup`) take the write guard only for
//! the duration of the map mutation, never across network I/O.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct LocalBlocklist {
    entries: RwLock<HashMap<String, Instant>>,
}

impl LocalBlocklist {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// True iff `ip` has a non-expired entry. A present-but-expired entry
    /// is treated as absent (cleanup removes it lazily on the next sweep,
    /// not eagerly here, to keep reads lock-shared).
    pub fn is_blocked(&self, ip: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(ip)
            .is_some_and(|expiry| *expiry >= now)
    }

    /// Record (or overwrite) an entry with expiry = now + ttl.
    pub fn block(&self, ip: &str, ttl: Duration) {
        let expiry = Instant::now() + ttl;
        self.entries.write().insert(ip.to_string(), expiry);
    }

    /// Remove all expired entries. Invoked on the ~30s schedule (§5).
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, expiry| *expiry >= now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl Default for LocalBlocklist {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the periodic L1 sweep (spec §5, default 30s).
pub fn spawn_cleanup_task(l1: Arc<LocalBlocklist>, interval: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = l1.cleanup();
                    if removed > 0 {
                        debug!("L1 cleanup removed {} expired entries", removed);
                    }
                }
            }
        }
    });
}
