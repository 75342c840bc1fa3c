//! Shared-Counter Store (SCS) adapter: a thin facade over an external
//! ordered-set store with atomic script execution and pub/sub (spec §2.1,
//! §6 "SCS operations required").
//!
//! Behind a trait so the rate limiter and the stream handler can be tested
//! against an in-memory fake instead of a live Redis-compatible instance.

use crate::error::ScsError;
use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio_stream::Stream;
use tracing::warn;

/// Lua script implementing the sliding-window admission check (spec §4.3
/// "Implementation sketch"). Executed atomically server-side so all
/// admission decisions for a key are linearizable with respect to it.
const RATE_LIMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
local count = redis.call('ZCARD', key)
if count < limit then
    redis.call('ZADD', key, now_ms, member)
    redis.call('PEXPIRE', key, window_ms)
    return 1
else
    return 0
end
"#;

/// Operations the rate limiter and stream handler need from the SCS.
#[async_trait]
pub trait ScsBackend: Send + Sync {
    /// Run the sliding-window admission script for `key`. `member` must
    /// already be unique for this (ip, millisecond) pair; the caller
    /// supplies the random salt (spec §3 "Rate-limit key").
    async fn rate_limit_admit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        limit: u32,
        member: &str,
    ) -> Result<bool, ScsError>;

    /// Fire-and-forget publish to a pub/sub channel.
    async fn publish(&self, channel: &str, message: &str) -> Result<(), ScsError>;

    /// Boot-time liveness check (spec §7 "SCS-ping failure at boot: fatal").
    async fn ping(&self) -> Result<(), ScsError>;
}

/// Redis-compatible implementation of [`ScsBackend`].
#[derive(Clone)]
pub struct RedisScs {
    manager: redis::aio::ConnectionManager,
    client: redis::Client,
    script: redis::Script,
}

impl RedisScs {
    pub async fn connect(addr: &str) -> Result<Self, ScsError> {
        let client =
            redis::Client::open(addr).map_err(|e| ScsError::Unavailable(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| ScsError::Unavailable(e.to_string()))?;
        Ok(Self {
            manager,
            client,
            script: redis::Script::new(RATE_LIMIT_SCRIPT),
        })
    }

    /// Subscribe to a pub/sub channel, returning a stream of payload
    /// strings. Used by the telemetry hub's anomaly subscriber task (§4.5).
    pub async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<impl Stream<Item = String>, ScsError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| ScsError::Unavailable(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| ScsError::Unavailable(e.to_string()))?;
        Ok(async_stream::stream! {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => yield payload,
                    Err(e) => warn!("SCS pub/sub payload decode error: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl ScsBackend for RedisScs {
    async fn rate_limit_admit(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
        limit: u32,
        member: &str,
    ) -> Result<bool, ScsError> {
        let mut conn = self.manager.clone();
        let result: i64 = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ScsError::Script(e.to_string()))?;
        match result {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ScsError::MalformedReply(format!(
                "rate-limit script returned {other}"
            ))),
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), ScsError> {
        let mut conn = self.manager.clone();
        conn.publish::<_, _, i64>(channel, message)
            .await
            .map_err(|e| ScsError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), ScsError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| ScsError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`ScsBackend`] used by rate-limiter and stream-handler
    //! tests so they don't require a live Redis-compatible instance.
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub struct FakeScs {
        pub sets: Mutex<std::collections::HashMap<String, BTreeMap<u64, String>>>,
        pub published: Mutex<Vec<(String, String)>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl FakeScs {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            self.fail
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ScsBackend for FakeScs {
        async fn rate_limit_admit(
            &self,
            key: &str,
            now_ms: u64,
            window_ms: u64,
            limit: u32,
            member: &str,
        ) -> Result<bool, ScsError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ScsError::Unavailable("fake SCS outage".into()));
            }
            let mut sets = self.sets.lock();
            let set = sets.entry(key.to_string()).or_default();
            let cutoff = now_ms.saturating_sub(window_ms);
            set.retain(|score, _| *score > cutoff);
            if (set.len() as u32) < limit {
                set.insert(now_ms, member.to_string());
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn publish(&self, channel: &str, message: &str) -> Result<(), ScsError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ScsError::Unavailable("fake SCS outage".into()));
            }
            self.published
                .lock()
                .push((channel.to_string(), message.to_string()));
            Ok(())
        }

        async fn ping(&self) -> Result<(), ScsError> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ScsError::Unavailable("fake SCS outage".into()));
            }
            Ok(())
        }
    }
}
