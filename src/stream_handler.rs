//! Per-connection state machine for `IntrusionDetectionService.StreamLogs`
//! (spec §4.4).
//!
//! States are implicit in control flow rather than an explicit enum: the
//! loop over inbound events is `Open`; returning from the async generator
//! (on stream end or receive error) is `Closing`. There is no other state.

use crate::analytics::encode_summary;
use crate::proto::intrusion::verdict::Status as VerdictStatus;
use crate::proto::intrusion::{
    intrusion_detection_service_server::IntrusionDetectionService, LogEvent, Verdict,
};
use crate::publisher::{publish_or_count_drop, AnalyticsPublisher};
use crate::ratelimit::{Decision, RateLimiter};
use crate::scs::ScsBackend;
use crate::signature;
use crate::stats::GatewayStats;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tonic::{Request, Response, Status as TonicStatus, Streaming};

pub struct GatewayService<S: ScsBackend> {
    secret: Arc<Vec<u8>>,
    rate_limiter: Arc<RateLimiter<S>>,
    stats: Arc<GatewayStats>,
    publisher: AnalyticsPublisher,
    traffic_channel: String,
}

impl<S: ScsBackend> GatewayService<S> {
    pub fn new(
        secret: Arc<Vec<u8>>,
        rate_limiter: Arc<RateLimiter<S>>,
        stats: Arc<GatewayStats>,
        publisher: AnalyticsPublisher,
        traffic_channel: String,
    ) -> Self {
        Self {
            secret,
            rate_limiter,
            stats,
            publisher,
            traffic_channel,
        }
    }
}

fn make_verdict(status: VerdictStatus, message: impl Into<String>) -> Verdict {
    Verdict {
        status: status as i32,
        message: message.into(),
    }
}

/// Verifier → rate limiter → verdict, steps 3-6 of spec §4.4. Returns the
/// verdict and whether it counts as a blocked decision for the stats
/// ledger.
async fn decide<S: ScsBackend>(
    event: &LogEvent,
    secret: &[u8],
    rate_limiter: &RateLimiter<S>,
) -> (Verdict, bool) {
    if !signature::verify(&event.payload, event.timestamp, &event.signature, secret) {
        return (
            make_verdict(VerdictStatus::BlockedInvalidSig, "Invalid HMAC signature"),
            true,
        );
    }

    match rate_limiter.check(&event.ip).await {
        Decision::Deny => {
            let message = format!(
                "Rate limit exceeded: {} requests per {} ms",
                rate_limiter.limit(),
                rate_limiter.window().as_millis()
            );
            (make_verdict(VerdictStatus::BlockedRateLimit, message), true)
        }
        Decision::Admit => (
            make_verdict(VerdictStatus::Allowed, "Request processed successfully"),
            false,
        ),
    }
}

type VerdictStream = Pin<Box<dyn Stream<Item = Result<Verdict, TonicStatus>> + Send + 'static>>;

#[tonic::async_trait]
impl<S: ScsBackend + 'static> IntrusionDetectionService for GatewayService<S> {
    type StreamLogsStream = VerdictStream;

    async fn stream_logs(
        &self,
        request: Request<Streaming<LogEvent>>,
    ) -> Result<Response<Self::StreamLogsStream>, TonicStatus> {
        let mut inbound = request.into_inner();
        let secret = self.secret.clone();
        let rate_limiter = self.rate_limiter.clone();
        let stats = self.stats.clone();
        let publisher = self.publisher.clone();
        let traffic_channel = self.traffic_channel.clone();

        let output = async_stream::try_stream! {
            while let Some(event) = inbound.message().await? {
                stats.record_request();

                let (verdict, blocked) = decide(&event, &secret, &rate_limiter).await;
                if blocked {
                    stats.record_blocked();
                }

                // Verdict-first: the verdict must be handed to the outbound
                // stream before the analytics publish is even enqueued
                // (spec §5 "Ordering").
                yield verdict;

                let summary = encode_summary(&event.ip, event.timestamp, event.payload.len());
                publish_or_count_drop(&publisher, &stats, traffic_channel.clone(), summary);
            }
        };

        Ok(Response::new(Box::pin(output) as VerdictStream))
    }
}
