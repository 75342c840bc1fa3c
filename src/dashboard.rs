//! Dashboard transport: HTTP server exposing `GET /ws` (websocket upgrade)
//! and `GET /health` (spec §6 "Dashboard transport", SPEC_FULL §11
//! "Health/readiness surface").

use crate::hub::SubscriberRegistry;
use crate::scs::ScsBackend;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::debug;

pub struct DashboardState<S: ScsBackend> {
    pub registry: Arc<SubscriberRegistry>,
    pub scs: Arc<S>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    subscribers: usize,
    scs_reachable: bool,
}

/// Build the dashboard router. Origin check is permissive (accept all),
/// matching spec §6; production deployments must add authentication.
pub fn build_router<S: ScsBackend + 'static>(state: Arc<DashboardState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler::<S>))
        .route("/health", get(health::<S>))
        .layer(cors)
        .with_state(state)
}

async fn ws_handler<S: ScsBackend + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DashboardState<S>>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs for the lifetime of one dashboard connection: pumps broadcast
/// frames out and drains inbound frames solely to detect peer close (spec
/// §4.5 "Subscriber inbound").
async fn handle_socket<S: ScsBackend>(socket: WebSocket, state: Arc<DashboardState<S>>) {
    let mut handle = state.registry.add();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = handle.rx.recv() => {
                let Some(frame) = outbound else { break };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(_)) => continue, // received frames are discarded
                    _ => break,              // close frame, error, or stream end
                }
            }
        }
    }

    state.registry.remove(handle.id);
    debug!("dashboard subscriber {} socket closed", handle.id);
}

async fn health<S: ScsBackend>(State(state): State<Arc<DashboardState<S>>>) -> impl IntoResponse {
    let scs_reachable = state.scs.ping().await.is_ok();
    Json(HealthResponse {
        status: "ok",
        subscribers: state.registry.subscriber_count(),
        scs_reachable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scs::fake::FakeScs;

    #[tokio::test]
    async fn health_reports_subscriber_count_and_scs_reachability() {
        let registry = Arc::new(SubscriberRegistry::new());
        registry.add();
        let scs = Arc::new(FakeScs::new());
        let state = Arc::new(DashboardState {
            registry: registry.clone(),
            scs: scs.clone(),
        });

        let response = health(State(state)).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
