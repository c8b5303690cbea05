//! Push fabric: fans a named event out to one socket, one user's
//! sockets, every socket subscribed to a CVE, or every connected socket.
//!
//! `emit` takes a snapshot of outbound channels from the registry, then
//! sends outside of any lock — a channel send only ever fails if the
//! receiving connection has already dropped, in which case the frame is
//! silently discarded rather than treated as an error (the connection's
//! own disconnect handler is responsible for registry cleanup).

use crate::registry::SessionRegistry;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum PushTarget {
    Sid(String),
    Username(String),
    CveSubscribers(String),
    All,
}

#[derive(Clone)]
pub struct PushFabric {
    registry: Arc<SessionRegistry>,
}

/// Wire format for every pushed frame: `{type, data, timestamp}`.
#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    event_type: &'a str,
    data: Value,
    timestamp: String,
}

impl PushFabric {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns how many connections the frame was handed to, so callers
    /// that care about delivery (the notification engine's `delivered`
    /// flag) can distinguish "sent somewhere" from "nobody was listening".
    pub async fn emit(&self, event: &str, data: Value, target: PushTarget) -> usize {
        let senders = match target {
            PushTarget::Sid(sid) => self
                .registry
                .sender_for_sid(&sid)
                .await
                .into_iter()
                .collect::<Vec<_>>(),
            PushTarget::Username(username) => self.registry.senders_for_username(&username).await,
            PushTarget::CveSubscribers(cve_id) => {
                self.registry.senders_for_cve_subscribers(&cve_id).await
            }
            PushTarget::All => self.registry.senders_for_all().await,
        };

        if senders.is_empty() {
            return 0;
        }

        let envelope = Envelope {
            event_type: event,
            data,
            timestamp: cve_core::clock::to_iso8601(cve_core::clock::now()),
        };
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, event, "failed to serialize push event");
                return 0;
            }
        };

        let mut delivered = 0;
        for sender in senders {
            if sender.send(frame.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    async fn connect(
        registry: &SessionRegistry,
        sid: &str,
        session_id: &str,
        username: &str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .connect(sid.to_string(), session_id.to_string(), username.to_string(), tx)
            .await;
        rx
    }

    #[tokio::test]
    async fn username_target_reaches_every_session_of_that_user_only() {
        let registry = Arc::new(SessionRegistry::new());
        let fabric = PushFabric::new(registry.clone());

        let mut alice_tab1 = connect(&registry, "s1", "sess-a", "alice").await;
        let mut alice_tab2 = connect(&registry, "s2", "sess-a2", "alice").await;
        let mut bob = connect(&registry, "s3", "sess-b", "bob").await;

        let delivered = fabric
            .emit("notification", json!({"n": 1}), PushTarget::Username("alice".to_string()))
            .await;

        assert_eq!(delivered, 2);
        assert!(alice_tab1.try_recv().is_ok());
        assert!(alice_tab2.try_recv().is_ok());
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn cve_subscriber_target_delivers_once_per_session() {
        let registry = Arc::new(SessionRegistry::new());
        let fabric = PushFabric::new(registry.clone());

        let mut alice = connect(&registry, "s1", "sess-a", "alice").await;
        let mut outsider = connect(&registry, "s2", "sess-b", "bob").await;
        registry.subscribe("s1", "CVE-2024-1234").await;

        let delivered = fabric
            .emit(
                "cve_updated",
                json!({"cve_id": "CVE-2024-1234"}),
                PushTarget::CveSubscribers("CVE-2024-1234".to_string()),
            )
            .await;

        assert_eq!(delivered, 1);
        let frame = alice.try_recv().unwrap();
        assert!(frame.contains("\"cve_updated\""));
        assert!(outsider.try_recv().is_err());
        assert!(alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn frames_carry_type_data_timestamp_envelope() {
        let registry = Arc::new(SessionRegistry::new());
        let fabric = PushFabric::new(registry.clone());
        let mut rx = connect(&registry, "s1", "sess-a", "alice").await;

        fabric.emit("pong", json!({}), PushTarget::All).await;

        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "pong");
        assert!(frame["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
