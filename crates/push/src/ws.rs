//! The websocket connection handler: authenticates at connect time, runs
//! the per-connection read loop, and tears the session down through the
//! registry on disconnect or heartbeat timeout.

use crate::events;
use crate::fabric::{PushFabric, PushTarget};
use crate::registry::SessionRegistry;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use cve_core::security::JwtService;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct PushState {
    pub fabric: PushFabric,
    pub jwt_service: Arc<JwtService>,
    pub heartbeat_timeout: Duration,
    pub metrics: Option<Arc<cve_core::CrawlerMetrics>>,
}

impl PushState {
    pub fn new(registry: Arc<SessionRegistry>, jwt_service: Arc<JwtService>) -> Self {
        Self {
            fabric: PushFabric::new(registry),
            jwt_service,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<cve_core::CrawlerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Syncs the connection/subscription gauges from a registry snapshot.
    async fn record_gauges(&self) {
        let Some(metrics) = &self.metrics else { return };
        let stats = self.fabric.registry().stats().await;
        metrics
            .active_websocket_connections
            .with_label_values::<&str>(&[])
            .set(stats.connected_sessions as i64);
        metrics
            .cve_subscriptions
            .with_label_values::<&str>(&[])
            .set(stats.subscribed_cves as i64);
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

pub async fn ws_handler(
    State(state): State<PushState>,
    Query(query): Query<ConnectQuery>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: PushState, query: ConnectQuery) {
    let username = match state.jwt_service.verify_access_token(&query.token) {
        Ok(claims) => claims.sub,
        Err(e) => {
            warn!(error = %e, "websocket connect rejected: invalid token");
            return;
        }
    };

    let sid = cve_core::clock::new_id();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (mut sender, mut receiver) = socket.split();

    state
        .fabric
        .registry()
        .connect(sid.clone(), query.session_id.clone(), username.clone(), outbound_tx)
        .await;
    state.record_gauges().await;

    let handshake = json!({
        "authenticated": true,
        "username": username,
        "session_id": query.session_id,
        "serverTime": cve_core::clock::to_iso8601(cve_core::clock::now()),
    });
    let _ = sender
        .send(Message::Text(
            frame(events::CONNECTED, handshake.clone()).into(),
        ))
        .await;
    let _ = sender
        .send(Message::Text(
            frame(events::CONNECT_ACK, handshake).into(),
        ))
        .await;

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(payload) => {
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = tokio::time::timeout(state.heartbeat_timeout, receiver.next()) => {
                match incoming {
                    Ok(Some(Ok(message))) => {
                        if !handle_inbound(&state, &sid, &query.session_id, message, &mut sender).await {
                            break;
                        }
                    }
                    Ok(Some(Err(e))) => {
                        debug!(error = %e, sid, "websocket read error");
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        debug!(sid, "heartbeat timeout, dropping connection");
                        break;
                    }
                }
            }
        }
    }

    let changed = state.fabric.registry().disconnect(&sid).await;
    state.record_gauges().await;
    for cve_id in changed {
        emit_subscribers_updated(&state.fabric, &cve_id).await;
    }
}

/// Returns `false` when the caller should close the connection.
async fn handle_inbound(
    state: &PushState,
    sid: &str,
    session_id: &str,
    message: Message,
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let text = match message {
        Message::Text(text) => text,
        Message::Close(_) => return false,
        Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => return true,
    };

    let Ok(client_frame) = serde_json::from_str::<ClientFrame>(&text) else {
        return true;
    };

    match client_frame.event_type.as_str() {
        events::SUBSCRIBE_CVE => {
            if let Some(cve_id) = client_frame.data.get("cve_id").and_then(|v| v.as_str()) {
                if let Some((count, subscribers)) =
                    state.fabric.registry().subscribe(sid, cve_id).await
                {
                    let status = json!({
                        "cve_id": cve_id,
                        "subscribed": true,
                        "subscriber_count": count,
                        "subscribers": subscribers,
                    });
                    let _ = sender
                        .send(Message::Text(frame(events::SUBSCRIPTION_STATUS, status).into()))
                        .await;
                    emit_subscribers_updated(&state.fabric, cve_id).await;
                    state.record_gauges().await;
                }
            }
        }
        events::UNSUBSCRIBE_CVE => {
            if let Some(cve_id) = client_frame.data.get("cve_id").and_then(|v| v.as_str()) {
                if let Some((count, subscribers)) =
                    state.fabric.registry().unsubscribe(sid, cve_id).await
                {
                    let status = json!({
                        "cve_id": cve_id,
                        "subscribed": false,
                        "subscriber_count": count,
                        "subscribers": subscribers,
                    });
                    let _ = sender
                        .send(Message::Text(frame(events::SUBSCRIPTION_STATUS, status).into()))
                        .await;
                    emit_subscribers_updated(&state.fabric, cve_id).await;
                    state.record_gauges().await;
                }
            }
        }
        "ping" => {
            let _ = sender
                .send(Message::Text(frame(events::PONG, json!({})).into()))
                .await;
        }
        // A client reporting a fresh tab for an existing logical session:
        // tear down the session's stale connections, keep this one.
        "session_info" => {
            let changed = state
                .fabric
                .registry()
                .cleanup_by_session_id(session_id, Some(sid))
                .await;
            for cve_id in &changed {
                emit_subscribers_updated(&state.fabric, cve_id).await;
            }
            let _ = sender
                .send(Message::Text(
                    frame(events::SESSION_INFO_ACK, json!({ "session_id": session_id })).into(),
                ))
                .await;
        }
        other => {
            debug!(event = other, sid, "ignoring unrecognized client event");
        }
    }

    true
}

async fn emit_subscribers_updated(fabric: &PushFabric, cve_id: &str) {
    fabric
        .emit(
            events::CVE_SUBSCRIBERS_UPDATED,
            json!({ "cve_id": cve_id }),
            PushTarget::CveSubscribers(cve_id.to_string()),
        )
        .await;
}

fn frame(event_type: &str, data: serde_json::Value) -> String {
    json!({
        "type": event_type,
        "data": data,
        "timestamp": cve_core::clock::to_iso8601(cve_core::clock::now()),
    })
    .to_string()
}
