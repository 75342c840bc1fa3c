//! Configuration for the intrusion-detection gateway.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    /// gRPC stream-ingress listen address.
    pub server_addr: String,

    /// Dashboard HTTP/WebSocket listen port.
    pub http_port: u16,

    /// SCS (Redis-compatible) endpoint.
    pub scs_addr: String,

    /// HMAC shared secret. Never logged.
    pub secret: Vec<u8>,

    /// Admissions allowed per window.
    pub rate_limit: u32,

    /// Sliding-window length.
    pub rate_limit_window: Duration,

    /// L1 local-blocklist entry TTL.
    pub local_block_ttl: Duration,

    /// L1 cleanup sweep interval.
    pub l1_cleanup_interval: Duration,

    /// Aggregator tick interval.
    pub aggregator_interval: Duration,

    /// SCS pub/sub channel carrying outbound analytics summaries.
    pub traffic_channel: String,

    /// SCS pub/sub channel carrying inbound anomaly alerts.
    pub alerts_channel: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server_addr: std::env::var("GATEWAY_SERVER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:50051".into()),
            http_port: std::env::var("GATEWAY_HTTP_PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .context("Invalid GATEWAY_HTTP_PORT")?,
            scs_addr: std::env::var("GATEWAY_SCS_ADDR")
                .unwrap_or_else(|_| "redis://localhost:6379".into()),
            secret: std::env::var("GATEWAY_HMAC_SECRET")
                .context("GATEWAY_HMAC_SECRET is required")?
                .into_bytes(),
            rate_limit: std::env::var("GATEWAY_RATE_LIMIT")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .context("Invalid GATEWAY_RATE_LIMIT")?,
            rate_limit_window: Duration::from_millis(
                std::env::var("GATEWAY_RATE_LIMIT_WINDOW_MS")
                    .unwrap_or_else(|_| "10000".into())
                    .parse()
                    .context("Invalid GATEWAY_RATE_LIMIT_WINDOW_MS")?,
            ),
            local_block_ttl: Duration::from_millis(
                std::env::var("GATEWAY_LOCAL_BLOCK_TTL_MS")
                    .unwrap_or_else(|_| "60000".into())
                    .parse()
                    .context("Invalid GATEWAY_LOCAL_BLOCK_TTL_MS")?,
            ),
            l1_cleanup_interval: Duration::from_millis(
                std::env::var("GATEWAY_L1_CLEANUP_INTERVAL_MS")
                    .unwrap_or_else(|_| "30000".into())
                    .parse()
                    .context("Invalid GATEWAY_L1_CLEANUP_INTERVAL_MS")?,
            ),
            aggregator_interval: Duration::from_millis(
                std::env::var("GATEWAY_AGGREGATOR_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".into())
                    .parse()
                    .context("Invalid GATEWAY_AGGREGATOR_INTERVAL_MS")?,
            ),
            traffic_channel: std::env::var("GATEWAY_TRAFFIC_CHANNEL")
                .unwrap_or_else(|_| "traffic_monitor".into()),
            alerts_channel: std::env::var("GATEWAY_ALERTS_CHANNEL")
                .unwrap_or_else(|_| "ai_alerts".into()),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_addr", &self.server_addr)
            .field("http_port", &self.http_port)
            .field("scs_addr", &self.scs_addr)
            .field("secret", &"<redacted>")
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("local_block_ttl", &self.local_block_ttl)
            .field("l1_cleanup_interval", &self.l1_cleanup_interval)
            .field("aggregator_interval", &self.aggregator_interval)
            .field("traffic_channel", &self.traffic_channel)
            .field("alerts_channel", &self.alerts_channel)
            .finish()
    }
}
