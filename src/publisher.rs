//! Bounded worker pool for fire-and-forget analytics publishes (spec §4.4
//! step 8, §9 "Fire-and-forget publishes").
//!
//! The stream handler must never block its receive loop on an analytics
//! publish. Rather than spawn one unbounded task per event, publishes are
//! pushed onto a bounded queue drained by a small fixed pool of workers; if
//! the queue is full the publish is dropped and counted. The analytics
//! path is intentionally lossy.

use crate::scs::ScsBackend;
use crate::stats::GatewayStats;
use std::sync::Arc;
use tracing::debug;

struct Job {
    channel: String,
    message: String,
}

#[derive(Clone)]
pub struct AnalyticsPublisher {
    tx: async_channel::Sender<Job>,
}

impl AnalyticsPublisher {
    /// Spawn `workers` background tasks draining a queue of `queue_capacity`
    /// pending publishes against `scs`.
    pub fn spawn<S: ScsBackend + 'static>(
        scs: Arc<S>,
        workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = async_channel::bounded(queue_capacity);

        for _ in 0..workers {
            let rx = rx.clone();
            let scs = scs.clone();
            tokio::spawn(async move {
                while let Ok(job) = rx.recv().await {
                    if let Err(e) = scs.publish(&job.channel, &job.message).await {
                        debug!("analytics publish dropped: {}", e);
                    }
                }
            });
        }

        Self { tx }
    }

    /// Enqueue a publish. Never awaits on SCS I/O; returns immediately.
    /// Returns `false` (and the caller should bump a drop counter) if the
    /// queue is full.
    pub fn try_publish(&self, channel: impl Into<String>, message: impl Into<String>) -> bool {
        self.tx
            .try_send(Job {
                channel: channel.into(),
                message: message.into(),
            })
            .is_ok()
    }
}

/// Convenience wrapper that also records the drop counter on the shared
/// stats ledger.
pub fn publish_or_count_drop(
    publisher: &AnalyticsPublisher,
    stats: &GatewayStats,
    channel: impl Into<String>,
    message: impl Into<String>,
) {
    if !publisher.try_publish(channel, message) {
        stats.record_analytics_dropped();
    }
}
