//! Session registry.
//!
//! All state lives in one `Mutex`-guarded struct rather than five
//! independent `DashMap`s so the bidirectional invariants between
//! `cve_subscribers` and `user_subscriptions` (and between `sessions` and
//! the three indexes derived from it) stay atomic across a connect,
//! disconnect, or subscribe call. The mutex is never held across an
//! `.await` — callers take a snapshot of the sids to notify, drop the
//! guard, then hand that snapshot to the push fabric for I/O.

use cve_core::SocketSession;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, Mutex};

/// The channel a connection handler reads outbound frames from.
pub type OutboundSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, SocketSession>,
    outbound: HashMap<String, OutboundSender>,
    user_sessions: HashMap<String, HashSet<String>>,
    session_groups: HashMap<String, HashSet<String>>,
    cve_subscribers: HashMap<String, HashSet<String>>,
    user_subscriptions: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RegistryStats {
    pub connected_sessions: usize,
    pub distinct_users: usize,
    pub subscribed_cves: usize,
}

pub struct SessionRegistry {
    state: Mutex<RegistryState>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub async fn connect(
        &self,
        sid: String,
        session_id: String,
        username: String,
        outbound: OutboundSender,
    ) {
        let mut state = self.state.lock().await;
        state.sessions.insert(
            sid.clone(),
            SocketSession {
                sid: sid.clone(),
                session_id: session_id.clone(),
                username: username.clone(),
                connected_at: cve_core::clock::now(),
            },
        );
        state.outbound.insert(sid.clone(), outbound);
        state
            .user_sessions
            .entry(username)
            .or_default()
            .insert(sid.clone());
        state
            .session_groups
            .entry(session_id)
            .or_default()
            .insert(sid);
    }

    /// Removes `sid` from every map it appears in. For each CVE it was
    /// subscribed to, the owning username is dropped from
    /// `cve_subscribers` only if no other session of that user still holds
    /// the subscription — matching the disconnect semantics of a
    /// socket.io-style connection manager, where only the dying session's
    /// own bookkeeping is torn down. Returns the cve_ids whose subscriber
    /// set actually changed, so the caller can fan out
    /// `cve_subscribers_updated`.
    pub async fn disconnect(&self, sid: &str) -> Vec<String> {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.remove(sid) else {
            return Vec::new();
        };
        state.outbound.remove(sid);

        if let Some(set) = state.user_sessions.get_mut(&session.username) {
            set.remove(sid);
            if set.is_empty() {
                state.user_sessions.remove(&session.username);
            }
        }
        if let Some(set) = state.session_groups.get_mut(&session.session_id) {
            set.remove(sid);
            if set.is_empty() {
                state.session_groups.remove(&session.session_id);
            }
        }

        // user_sessions was already pruned above, so its presence here
        // tells us whether another session of this user is still connected.
        let has_other_session = state.user_sessions.contains_key(&session.username);
        if has_other_session {
            return Vec::new();
        }

        let subscribed_cves = state
            .user_subscriptions
            .remove(&session.username)
            .unwrap_or_default();

        let mut changed = Vec::new();
        for cve_id in subscribed_cves {
            if let Some(subs) = state.cve_subscribers.get_mut(&cve_id) {
                subs.remove(&session.username);
                if subs.is_empty() {
                    state.cve_subscribers.remove(&cve_id);
                }
                changed.push(cve_id);
            }
        }
        changed
    }

    /// Drops every sid belonging to `session_id` except `except_sid` (a
    /// client reporting a new tab that replaces an old one keeps its own
    /// fresh connection alive while the stale ones are torn down).
    pub async fn cleanup_by_session_id(
        &self,
        session_id: &str,
        except_sid: Option<&str>,
    ) -> Vec<String> {
        let sids: Vec<String> = {
            let state = self.state.lock().await;
            state
                .session_groups
                .get(session_id)
                .map(|set| {
                    set.iter()
                        .filter(|sid| Some(sid.as_str()) != except_sid)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut changed = Vec::new();
        for sid in sids {
            changed.extend(self.disconnect(&sid).await);
        }
        changed
    }

    /// Subscribes `sid`'s user to `cve_id`. Returns `(subscriber_count,
    /// subscribers)` for the `subscription_status` reply.
    pub async fn subscribe(&self, sid: &str, cve_id: &str) -> Option<(usize, Vec<String>)> {
        let mut state = self.state.lock().await;
        let username = state.sessions.get(sid)?.username.clone();

        state
            .cve_subscribers
            .entry(cve_id.to_string())
            .or_default()
            .insert(username.clone());
        state
            .user_subscriptions
            .entry(username)
            .or_default()
            .insert(cve_id.to_string());

        let subs = state.cve_subscribers.get(cve_id).cloned().unwrap_or_default();
        Some((subs.len(), subs.into_iter().collect()))
    }

    pub async fn unsubscribe(&self, sid: &str, cve_id: &str) -> Option<(usize, Vec<String>)> {
        let mut state = self.state.lock().await;
        let username = state.sessions.get(sid)?.username.clone();

        let has_other_session = state
            .user_sessions
            .get(&username)
            .map(|sids| sids.iter().any(|s| s != sid))
            .unwrap_or(false);

        if !has_other_session {
            if let Some(subs) = state.cve_subscribers.get_mut(cve_id) {
                subs.remove(&username);
                if subs.is_empty() {
                    state.cve_subscribers.remove(cve_id);
                }
            }
        }
        if let Some(cves) = state.user_subscriptions.get_mut(&username) {
            cves.remove(cve_id);
        }

        let subs = state
            .cve_subscribers
            .get(cve_id)
            .cloned()
            .unwrap_or_default();
        Some((subs.len(), subs.into_iter().collect()))
    }

    /// Snapshot of outbound channels for a single sid.
    pub async fn sender_for_sid(&self, sid: &str) -> Option<OutboundSender> {
        self.state.lock().await.outbound.get(sid).cloned()
    }

    /// Snapshot of outbound channels for every session belonging to `username`.
    pub async fn senders_for_username(&self, username: &str) -> Vec<OutboundSender> {
        let state = self.state.lock().await;
        state
            .user_sessions
            .get(username)
            .map(|sids| {
                sids.iter()
                    .filter_map(|sid| state.outbound.get(sid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of outbound channels for every session of every user
    /// currently subscribed to `cve_id`.
    pub async fn senders_for_cve_subscribers(&self, cve_id: &str) -> Vec<OutboundSender> {
        let state = self.state.lock().await;
        let Some(usernames) = state.cve_subscribers.get(cve_id) else {
            return Vec::new();
        };
        usernames
            .iter()
            .flat_map(|username| {
                state
                    .user_sessions
                    .get(username)
                    .into_iter()
                    .flatten()
                    .filter_map(|sid| state.outbound.get(sid).cloned())
            })
            .collect()
    }

    pub async fn senders_for_all(&self) -> Vec<OutboundSender> {
        self.state.lock().await.outbound.values().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.lock().await;
        RegistryStats {
            connected_sessions: state.sessions.len(),
            distinct_users: state.user_sessions.len(),
            subscribed_cves: state.cve_subscribers.len(),
        }
    }

    /// Checks the bidirectional subscription invariant: `username` appears
    /// in `cve_subscribers[cve_id]` iff `cve_id` appears in
    /// `user_subscriptions[username]`.
    #[cfg(test)]
    async fn subscription_maps_consistent(&self, username: &str, cve_id: &str) -> bool {
        let state = self.state.lock().await;
        let forward = state
            .cve_subscribers
            .get(cve_id)
            .map(|subs| subs.contains(username))
            .unwrap_or(false);
        let backward = state
            .user_subscriptions
            .get(username)
            .map(|cves| cves.contains(cve_id))
            .unwrap_or(false);
        forward == backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect(registry: &SessionRegistry, sid: &str, session_id: &str, username: &str) {
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .connect(sid.to_string(), session_id.to_string(), username.to_string(), tx)
            .await;
    }

    #[tokio::test]
    async fn subscribe_keeps_both_directions_of_the_mapping() {
        let registry = SessionRegistry::new();
        connect(&registry, "s1", "sess-a", "alice").await;

        let (count, subscribers) = registry.subscribe("s1", "CVE-2024-1").await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(subscribers, vec!["alice".to_string()]);
        assert!(registry.subscription_maps_consistent("alice", "CVE-2024-1").await);

        registry.unsubscribe("s1", "CVE-2024-1").await.unwrap();
        assert!(registry.subscription_maps_consistent("alice", "CVE-2024-1").await);
        assert_eq!(registry.stats().await.subscribed_cves, 0);
    }

    #[tokio::test]
    async fn unsubscribe_keeps_subscription_while_another_session_holds_it() {
        let registry = SessionRegistry::new();
        connect(&registry, "s1", "sess-a", "alice").await;
        connect(&registry, "s2", "sess-b", "alice").await;
        registry.subscribe("s1", "CVE-2024-1").await.unwrap();

        let (count, _) = registry.unsubscribe("s1", "CVE-2024-1").await.unwrap();
        assert_eq!(count, 1, "alice still has a live session holding the subscription");
    }

    #[tokio::test]
    async fn disconnect_cleans_every_map_the_sid_appears_in() {
        let registry = SessionRegistry::new();
        connect(&registry, "s1", "sess-a", "alice").await;
        registry.subscribe("s1", "CVE-2024-1").await.unwrap();

        let changed = registry.disconnect("s1").await;
        assert_eq!(changed, vec!["CVE-2024-1".to_string()]);

        let stats = registry.stats().await;
        assert_eq!(stats.connected_sessions, 0);
        assert_eq!(stats.distinct_users, 0);
        assert_eq!(stats.subscribed_cves, 0);
    }

    #[tokio::test]
    async fn disconnect_spares_subscriptions_held_by_other_sessions_of_same_user() {
        let registry = SessionRegistry::new();
        connect(&registry, "s1", "sess-a", "alice").await;
        connect(&registry, "s2", "sess-b", "alice").await;
        registry.subscribe("s1", "CVE-2024-1").await.unwrap();

        let changed = registry.disconnect("s1").await;
        assert!(changed.is_empty());
        assert!(registry.subscription_maps_consistent("alice", "CVE-2024-1").await);
        assert_eq!(registry.stats().await.subscribed_cves, 1);
    }

    #[tokio::test]
    async fn session_cleanup_keeps_the_reporting_connection() {
        let registry = SessionRegistry::new();
        connect(&registry, "old-tab", "sess-a", "alice").await;
        connect(&registry, "new-tab", "sess-a", "alice").await;

        registry.cleanup_by_session_id("sess-a", Some("new-tab")).await;

        let stats = registry.stats().await;
        assert_eq!(stats.connected_sessions, 1);
        assert!(registry.sender_for_sid("new-tab").await.is_some());
        assert!(registry.sender_for_sid("old-tab").await.is_none());
    }
}
