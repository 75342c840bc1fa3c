//! Distributed sliding-window rate limiter composing the SCS and the local
//! negative cache (spec §4.3).

use crate::blocklist::LocalBlocklist;
use crate::scs::ScsBackend;
use crate::stats::GatewayStats;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny,
}

pub struct RateLimiter<S: ScsBackend> {
    scs: Arc<S>,
    l1: Arc<LocalBlocklist>,
    stats: Arc<GatewayStats>,
    limit: u32,
    window: Duration,
    local_block_ttl: Duration,
}

impl<S: ScsBackend> RateLimiter<S> {
    pub fn new(
        scs: Arc<S>,
        l1: Arc<LocalBlocklist>,
        stats: Arc<GatewayStats>,
        limit: u32,
        window: Duration,
        local_block_ttl: Duration,
    ) -> Self {
        Self {
            scs,
            l1,
            stats,
            limit,
            window,
            local_block_ttl,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide admit/deny for `ip` at the current instant.
    ///
    /// L1 stickiness (§4.3 "L1 integration"): an IP denied once stays
    /// denied for `local_block_ttl` without consulting the SCS again, even
    /// after the sliding window would otherwise have cleared.
    pub async fn check(&self, ip: &str) -> Decision {
        if self.l1.is_blocked(ip) {
            return Decision::Deny;
        }

        let key = format!("ratelimit:{ip}");
        let now_ms = now_millis();
        let member = format!("{now_ms}-{}", rand::thread_rng().gen::<u64>());

        match self
            .scs
            .rate_limit_admit(
                &key,
                now_ms,
                self.window.as_millis() as u64,
                self.limit,
                &member,
            )
            .await
        {
            Ok(true) => Decision::Admit,
            Ok(false) => {
                self.l1.block(ip, self.local_block_ttl);
                Decision::Deny
            }
            Err(e) => {
                // Fail open: availability over blocking on operator
                // infrastructure failure (spec §4.3 "Fallback").
                self.stats.record_scs_failure();
                warn!("Redis error during rate-limit check for {}: {}", ip, e);
                Decision::Admit
            }
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_millis() as u64
}
