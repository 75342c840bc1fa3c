//! Telemetry Hub: the dashboard subscriber registry, the 1s aggregator,
//! and the anomaly re-broadcaster (spec §4.5).

use crate::scs::ScsBackend;
use crate::stats::GatewayStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-subscriber outgoing frame buffer. Small and bounded so a slow
/// dashboard socket can't make the hub's memory grow unbounded; `try_send`
/// means broadcast never awaits on a subscriber (spec §4.5 "broadcast
/// never blocks on a slow subscriber beyond the duration of one write
/// attempt").
const SUBSCRIBER_QUEUE_CAPACITY: usize = 32;

#[derive(Serialize)]
struct TickFrame {
    rps: u64,
    blocked: u64,
    timestamp: i64,
}

#[derive(Deserialize)]
struct AnomalyAlertIn {
    ip: String,
    payload_size: u64,
    timestamp: i64,
}

#[derive(Serialize)]
struct AnomalyAlertOut {
    #[serde(rename = "type")]
    kind: &'static str,
    ip: String,
    payload_size: u64,
    timestamp: i64,
}

/// Handle returned to a newly-registered dashboard socket: a receiver side
/// of its outgoing frame queue and the id needed to unregister on close.
pub struct SubscriberHandle {
    pub id: u64,
    pub rx: mpsc::Receiver<String>,
}

struct Subscriber {
    tx: mpsc::Sender<String>,
}

/// The mutable set of live dashboard subscribers (spec §4.5 "Subscriber
/// registry"). Readers-writer discipline: `broadcast` only needs read
/// access to snapshot handles; `add`/`remove` take the write lock only for
/// the HashMap mutation, never across socket I/O.
pub struct SubscriberRegistry {
    subscribers: parking_lot::RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: parking_lot::RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        self.subscribers.write().insert(id, Subscriber { tx });
        info!(
            "dashboard subscriber {} connected ({} total)",
            id,
            self.subscribers.read().len()
        );
        SubscriberHandle { id, rx }
    }

    /// Idempotent: removing an id that's already gone is a no-op.
    pub fn remove(&self, id: u64) {
        if self.subscribers.write().remove(&id).is_some() {
            debug!(
                "dashboard subscriber {} disconnected ({} remaining)",
                id,
                self.subscribers.read().len()
            );
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Snapshot subscriber handles, release the lock, then attempt one
    /// non-blocking write per subscriber. Subscribers whose queue is full
    /// or closed are scheduled for out-of-band removal.
    fn broadcast(&self, frame: String) {
        let handles: Vec<(u64, mpsc::Sender<String>)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.tx.clone()))
            .collect();

        for (id, tx) in handles {
            if tx.try_send(frame.clone()).is_err() {
                self.remove(id);
            }
        }
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the 1s aggregator: reads-and-resets the per-second stats, builds a
/// tick frame, and broadcasts it (spec §4.5 "Aggregator").
pub fn spawn_aggregator(
    registry: Arc<SubscriberRegistry>,
    stats: Arc<GatewayStats>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let counts = stats.swap_tick();
                    let frame = TickFrame {
                        rps: counts.requests,
                        blocked: counts.blocked,
                        timestamp: chrono::Utc::now().timestamp(),
                    };
                    match serde_json::to_string(&frame) {
                        Ok(json) => registry.broadcast(json),
                        Err(e) => warn!("failed to serialize tick frame: {}", e),
                    }
                }
            }
        }
    });
}

/// Spawn the long-lived anomaly subscriber: consumes the SCS `ai_alerts`
/// channel, rewrites the `type` field, and rebroadcasts (spec §4.5
/// "Anomaly subscriber").
pub fn spawn_anomaly_subscriber<S: ScsBackend + 'static>(
    scs: Arc<S>,
    channel_name: String,
    registry: Arc<SubscriberRegistry>,
    cancel: CancellationToken,
) where
    S: AnomalySource,
{
    tokio::spawn(async move {
        let mut stream = match scs.subscribe_alerts(&channel_name).await {
            Ok(s) => s,
            Err(e) => {
                warn!("anomaly subscriber failed to attach to {}: {}", channel_name, e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                item = stream.next() => {
                    let Some(payload) = item else { break };
                    match serde_json::from_str::<AnomalyAlertIn>(&payload) {
                        Ok(alert) => {
                            let out = AnomalyAlertOut {
                                kind: "ai_alert",
                                ip: alert.ip,
                                payload_size: alert.payload_size,
                                timestamp: alert.timestamp,
                            };
                            match serde_json::to_string(&out) {
                                Ok(json) => registry.broadcast(json),
                                Err(e) => warn!("failed to serialize anomaly frame: {}", e),
                            }
                        }
                        Err(e) => warn!("anomaly parse error, skipping: {}", e),
                    }
                }
            }
        }
    });
}

/// Narrow trait so the anomaly subscriber only needs a subscribe
/// capability, not the whole [`ScsBackend`] surface. Keeps the hub
/// testable against a fake that only implements this.
#[async_trait::async_trait]
pub trait AnomalySource: Send + Sync {
    async fn subscribe_alerts(
        &self,
        channel: &str,
    ) -> Result<std::pin::Pin<Box<dyn tokio_stream::Stream<Item = String> + Send>>, crate::error::ScsError>;
}

#[async_trait::async_trait]
impl AnomalySource for crate::scs::RedisScs {
    async fn subscribe_alerts(
        &self,
        channel: &str,
    ) -> Result<std::pin::Pin<Box<dyn tokio_stream::Stream<Item = String> + Send>>, crate::error::ScsError> {
        let stream = self.subscribe(channel).await?;
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScsError;
    use std::pin::Pin;
    use tokio_stream::wrappers::ReceiverStream;

    struct FakeAnomalySource {
        rx: tokio::sync::Mutex<Option<mpsc::Receiver<String>>>,
    }

    #[async_trait::async_trait]
    impl AnomalySource for FakeAnomalySource {
        async fn subscribe_alerts(
            &self,
            _channel: &str,
        ) -> Result<Pin<Box<dyn tokio_stream::Stream<Item = String> + Send>>, ScsError> {
            let rx = self.rx.lock().await.take().expect("subscribe called once");
            Ok(Box::pin(ReceiverStream::new(rx)))
        }
    }

    #[tokio::test]
    async fn registry_add_remove_tracks_count() {
        let registry = SubscriberRegistry::new();
        let h1 = registry.add();
        let h2 = registry.add();
        assert_eq!(registry.subscriber_count(), 2);
        registry.remove(h1.id);
        assert_eq!(registry.subscriber_count(), 1);
        registry.remove(h2.id);
        assert_eq!(registry.subscriber_count(), 0);
        // Idempotent.
        registry.remove(h2.id);
    }

    #[tokio::test]
    async fn broadcast_delivers_to_all_live_subscribers() {
        let registry = Arc::new(SubscriberRegistry::new());
        let mut h1 = registry.add();
        let mut h2 = registry.add();
        registry.broadcast("hello".to_string());
        assert_eq!(h1.rx.recv().await, Some("hello".to_string()));
        assert_eq!(h2.rx.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn broadcast_removes_subscriber_whose_receiver_dropped() {
        let registry = Arc::new(SubscriberRegistry::new());
        let h1 = registry.add();
        drop(h1.rx);
        registry.broadcast("x".to_string());
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn aggregator_tick_broadcasts_counts_and_resets() {
        tokio::time::pause();
        let registry = Arc::new(SubscriberRegistry::new());
        let stats = Arc::new(GatewayStats::new());
        let mut handle = registry.add();
        let cancel = CancellationToken::new();

        stats.record_request();
        stats.record_request();
        stats.record_blocked();

        spawn_aggregator(registry.clone(), stats.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::advance(Duration::from_millis(15)).await;

        let frame = handle.rx.recv().await.expect("tick frame");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["rps"], 2);
        assert_eq!(parsed["blocked"], 1);
        assert!(parsed.get("type").is_none());

        cancel.cancel();
    }

    #[tokio::test]
    async fn anomaly_subscriber_rewrites_type_and_rebroadcasts() {
        let (tx, rx) = mpsc::channel(4);
        let source = Arc::new(FakeAnomalySource {
            rx: tokio::sync::Mutex::new(Some(rx)),
        });
        let registry = Arc::new(SubscriberRegistry::new());
        let mut handle = registry.add();
        let cancel = CancellationToken::new();

        spawn_anomaly_subscriber(source, "ai_alerts".to_string(), registry.clone(), cancel.clone());
        tx.send(r#"{"ip":"2.2.2.2","payload_size":77,"timestamp":123}"#.to_string())
            .await
            .unwrap();

        let frame = handle.rx.recv().await.expect("rebroadcast frame");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "ai_alert");
        assert_eq!(parsed["ip"], "2.2.2.2");
        assert_eq!(parsed["payload_size"], 77);
        assert_eq!(parsed["timestamp"], 123);

        cancel.cancel();
    }

    #[tokio::test]
    async fn anomaly_subscriber_skips_malformed_payloads() {
        let (tx, rx) = mpsc::channel(4);
        let source = Arc::new(FakeAnomalySource {
            rx: tokio::sync::Mutex::new(Some(rx)),
        });
        let registry = Arc::new(SubscriberRegistry::new());
        let mut handle = registry.add();
        let cancel = CancellationToken::new();

        spawn_anomaly_subscriber(source, "ai_alerts".to_string(), registry.clone(), cancel.clone());
        tx.send("not json".to_string()).await.unwrap();
        tx.send(r#"{"ip":"3.3.3.3","payload_size":1,"timestamp":1}"#.to_string())
            .await
            .unwrap();

        let frame = handle.rx.recv().await.expect("second payload rebroadcasts");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["ip"], "3.3.3.3");

        cancel.cancel();
    }
}
