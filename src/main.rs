//! Intrusion-detection gateway entry point: boots the gRPC ingress, the
//! dashboard HTTP/WS server, and the background telemetry tasks, then
//! waits for Ctrl+C to bring everything down together (spec §5, §6,
//! SPEC_FULL §11 "Graceful shutdown").

mod analytics;
mod blocklist;
mod config;
mod dashboard;
mod error;
mod hub;
mod proto;
mod publisher;
mod ratelimit;
mod scs;
mod signature;
mod stats;
mod stream_handler;

use anyhow::{Context, Result};
use blocklist::LocalBlocklist;
use config::Config;
use dashboard::DashboardState;
use proto::intrusion::intrusion_detection_service_server::IntrusionDetectionServiceServer;
use publisher::AnalyticsPublisher;
use ratelimit::RateLimiter;
use scs::RedisScs;
use stats::GatewayStats;
use std::sync::Arc;
use stream_handler::GatewayService;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ANALYTICS_WORKERS: usize = 4;
const ANALYTICS_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(?config, "starting tripwire-gateway");

    let scs = Arc::new(
        RedisScs::connect(&config.scs_addr)
            .await
            .context("failed to connect to SCS")?,
    );
    // SCS-ping failure at boot is fatal (spec §7).
    scs.ping().await.context("SCS boot-time ping failed")?;
    info!(addr = %config.scs_addr, "SCS connection established");

    let l1 = Arc::new(LocalBlocklist::new());
    let stats = Arc::new(GatewayStats::new());
    let rate_limiter = Arc::new(RateLimiter::new(
        scs.clone(),
        l1.clone(),
        stats.clone(),
        config.rate_limit,
        config.rate_limit_window,
        config.local_block_ttl,
    ));
    let publisher = AnalyticsPublisher::spawn(scs.clone(), ANALYTICS_WORKERS, ANALYTICS_QUEUE_CAPACITY);
    let registry = Arc::new(hub::SubscriberRegistry::new());

    let cancel = CancellationToken::new();

    blocklist::spawn_cleanup_task(l1.clone(), config.l1_cleanup_interval, cancel.clone());
    hub::spawn_aggregator(
        registry.clone(),
        stats.clone(),
        config.aggregator_interval,
        cancel.clone(),
    );
    hub::spawn_anomaly_subscriber(
        scs.clone(),
        config.alerts_channel.clone(),
        registry.clone(),
        cancel.clone(),
    );

    let gateway_service = GatewayService::new(
        Arc::new(config.secret.clone()),
        rate_limiter,
        stats,
        publisher,
        config.traffic_channel.clone(),
    );

    let grpc_addr = config
        .server_addr
        .parse()
        .context("invalid GATEWAY_SERVER_ADDR")?;
    let grpc_cancel = cancel.clone();
    let grpc_server = Server::builder()
        .add_service(IntrusionDetectionServiceServer::new(gateway_service))
        .serve_with_shutdown(grpc_addr, async move { grpc_cancel.cancelled().await });
    info!(addr = %grpc_addr, "gRPC stream ingress listening");

    let dashboard_state = Arc::new(DashboardState {
        registry,
        scs: scs.clone(),
    });
    let dashboard_router = dashboard::build_router(dashboard_state);
    let http_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .context("failed to bind dashboard HTTP listener")?;
    info!(addr = %http_addr, "dashboard HTTP/WS server listening");
    let dashboard_cancel = cancel.clone();
    let dashboard_server = axum::serve(listener, dashboard_router).with_graceful_shutdown(async move {
        dashboard_cancel.cancelled().await;
    });

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received, draining connections");
    };

    // A bind/listen failure on either server is fatal (spec §7), so the
    // first future to resolve wins the race instead of being masked behind
    // a `join!` that waits on the other two (one of which, absent Ctrl+C,
    // never resolves on its own).
    enum Outcome {
        GrpcExited(Result<()>),
        DashboardExited(Result<()>),
        ShutdownRequested,
    }

    tokio::pin!(grpc_server);
    tokio::pin!(dashboard_server);

    let outcome = tokio::select! {
        res = &mut grpc_server => Outcome::GrpcExited(res.context("gRPC server exited with an error")),
        res = &mut dashboard_server => Outcome::DashboardExited(res.context("dashboard server exited with an error")),
        _ = shutdown_signal => Outcome::ShutdownRequested,
    };

    cancel.cancel();

    match outcome {
        Outcome::ShutdownRequested => {
            let (grpc_result, http_result) = tokio::join!(grpc_server, dashboard_server);
            if let Err(e) = grpc_result {
                error!("gRPC server exited with an error during shutdown: {}", e);
            }
            if let Err(e) = http_result {
                error!("dashboard server exited with an error during shutdown: {}", e);
            }
        }
        Outcome::GrpcExited(result) => result?,
        Outcome::DashboardExited(result) => result?,
    }

    info!("tripwire-gateway shut down cleanly");
    Ok(())
}
