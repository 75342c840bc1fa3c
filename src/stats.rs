//! Process-wide atomic counters feeding the telemetry hub (spec §3, §9).

use std::sync::atomic::{AtomicU64, Ordering};

/// Four monotonic counters plus two diagnostic ones (§11 of SPEC_FULL).
///
/// The two "this second" counters are atomically read-and-reset by the
/// aggregator exactly once per tick via [`GatewayStats::swap_tick`].
#[derive(Default)]
pub struct GatewayStats {
    requests_this_second: AtomicU64,
    blocked_this_second: AtomicU64,
    total_requests: AtomicU64,
    total_blocked: AtomicU64,
    scs_failures: AtomicU64,
    analytics_dropped: AtomicU64,
}

/// Snapshot returned by a tick swap: the counts accumulated since the
/// previous tick.
pub struct TickCounts {
    pub requests: u64,
    pub blocked: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_this_second.fetch_add(1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked_this_second.fetch_add(1, Ordering::Relaxed);
        self.total_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scs_failure(&self) {
        self.scs_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analytics_dropped(&self) {
        self.analytics_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically exchange both per-second counters back to zero and return
    /// what they held. A single load-and-store-zero per counter, so no
    /// increment that races the swap is lost (spec §9 "Aggregator
    /// read-and-reset").
    pub fn swap_tick(&self) -> TickCounts {
        TickCounts {
            requests: self.requests_this_second.swap(0, Ordering::AcqRel),
            blocked: self.blocked_this_second.swap(0, Ordering::AcqRel),
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_blocked(&self) -> u64 {
        self.total_blocked.load(Ordering::Relaxed)
    }

    pub fn scs_failures(&self) -> u64 {
        self.scs_failures.load(Ordering::Relaxed)
    }

    pub fn analytics_dropped(&self) -> u64 {
        self.analytics_dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_monotonic_across_ticks() {
        let stats = GatewayStats::new();
        stats.record_request();
        stats.record_request();
        stats.record_blocked();
        let tick1 = stats.swap_tick();
        assert_eq!(tick1.requests, 2);
        assert_eq!(tick1.blocked, 1);

        stats.record_request();
        let tick2 = stats.swap_tick();
        assert_eq!(tick2.requests, 1);
        assert_eq!(tick2.blocked, 0);

        assert_eq!(stats.total_requests(), 3);
        assert_eq!(stats.total_blocked(), 1);
    }

    #[test]
    fn swap_tick_resets_per_second_counters_only() {
        let stats = GatewayStats::new();
        stats.record_request();
        stats.swap_tick();
        assert_eq!(stats.total_requests(), 1);
        let tick = stats.swap_tick();
        assert_eq!(tick.requests, 0);
        assert_eq!(stats.total_requests(), 1);
    }

    #[test]
    fn diagnostic_counters_track_independently() {
        let stats = GatewayStats::new();
        stats.record_scs_failure();
        stats.record_scs_failure();
        stats.record_analytics_dropped();
        assert_eq!(stats.scs_failures(), 2);
        assert_eq!(stats.analytics_dropped(), 1);
    }
}
