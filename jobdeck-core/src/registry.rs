//! Subscription registry for the shared channel
//!
//! One registry instance owns the answer to "is this `(kind, id)` pair
//! currently subscribed on the wire". Every subscribe/unsubscribe frame the
//! client ever sends goes through here, which is what keeps independent call
//! sites from double-subscribing a stream.

use std::collections::BTreeMap;

use crate::model::JobId;
use crate::protocol::{ClientFrame, StreamKind};
use crate::transport::TransportHandle;

/// Where a routed frame should be delivered
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// The tree handler owning the tree rooted at `root`
    Tree { root: JobId },
    /// A standalone per-job status watch
    Status,
    /// The log tail reader
    LogTail,
}

#[derive(Clone, Debug)]
struct Entry {
    target: RouteTarget,
    /// True when a subscribe frame was sent for this exact pair. Local
    /// entries only route inbound frames; they never touch the wire.
    wire: bool,
}

/// Maps `(kind, id)` to the handler that consumes matching frames.
///
/// Exactly one handler per pair: a later subscribe for the same pair
/// replaces the route instead of adding a second one, and does not re-send
/// the subscribe frame. Unsubscribing a pair that was never subscribed is a
/// no-op, since views racing through fast navigation hit that constantly.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<(StreamKind, JobId), Entry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record a route and send the subscribe frame unless an equivalent
    /// wire subscription is already active. Returns true if a frame went out.
    pub fn subscribe(
        &mut self,
        transport: &TransportHandle,
        kind: StreamKind,
        job_id: &str,
        target: RouteTarget,
        position: Option<u64>,
    ) -> bool {
        let key = (kind, job_id.to_string());
        if let Some(entry) = self.entries.get_mut(&key) {
            if entry.wire {
                // replace the handler, keep the live stream
                entry.target = target;
                return false;
            }
            entry.target = target;
            entry.wire = true;
        } else {
            self.entries.insert(key, Entry { target, wire: true });
        }
        transport.send(ClientFrame::Subscribe {
            kind,
            job_id: job_id.to_string(),
            position,
        });
        true
    }

    /// Remove a route and send the unsubscribe frame if one was active.
    /// Unknown pairs are a no-op. Returns true if a frame went out.
    pub fn unsubscribe(
        &mut self,
        transport: &TransportHandle,
        kind: StreamKind,
        job_id: &str,
    ) -> bool {
        let key = (kind, job_id.to_string());
        match self.entries.remove(&key) {
            Some(entry) if entry.wire => {
                transport.send(ClientFrame::Unsubscribe {
                    kind,
                    job_id: job_id.to_string(),
                });
                true
            }
            _ => false,
        }
    }

    /// Whether a wire subscription is active for the pair
    pub fn is_active(&self, kind: StreamKind, job_id: &str) -> bool {
        self.entries
            .get(&(kind, job_id.to_string()))
            .map(|e| e.wire)
            .unwrap_or(false)
    }

    /// Look up the route for an inbound frame key
    pub fn target(&self, kind: StreamKind, job_id: &str) -> Option<&RouteTarget> {
        self.entries
            .get(&(kind, job_id.to_string()))
            .map(|e| &e.target)
    }

    /// Replace the local (non-wire) routing bindings that point descendant
    /// ids of `root` at its tree handler. Called after every frame that
    /// reshapes the tree; the root's own wire entry is left untouched.
    pub fn sync_tree_bindings(&mut self, root: &str, ids: impl IntoIterator<Item = JobId>) {
        let target = RouteTarget::Tree {
            root: root.to_string(),
        };
        self.entries.retain(|(kind, id), entry| {
            !(*kind == StreamKind::Tree && !entry.wire && entry.target == target && id != root)
        });
        for id in ids {
            if id == root {
                continue;
            }
            let key = (StreamKind::Tree, id);
            // an explicit wire subscription for the id wins over a binding
            self.entries.entry(key).or_insert_with(|| Entry {
                target: target.clone(),
                wire: false,
            });
        }
    }

    /// Drop every local binding owned by `root`'s tree handler
    pub fn clear_tree_bindings(&mut self, root: &str) {
        let target = RouteTarget::Tree {
            root: root.to_string(),
        };
        self.entries
            .retain(|_, entry| entry.wire || entry.target != target);
    }

    /// Snapshot of the active wire subscriptions, used to re-issue them
    /// after a reconnect
    pub fn wire_subscriptions(&self) -> Vec<(StreamKind, JobId)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.wire)
            .map(|((kind, id), _)| (*kind, id.clone()))
            .collect()
    }

    /// Re-send a subscribe frame for an already-registered pair without
    /// changing any local state. Only the session's reconnect path calls
    /// this.
    pub fn reissue(
        &self,
        transport: &TransportHandle,
        kind: StreamKind,
        job_id: &str,
        position: Option<u64>,
    ) {
        if self.is_active(kind, job_id) {
            transport.send(ClientFrame::Subscribe {
                kind,
                job_id: job_id.to_string(),
                position,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::transport_channel;
    use tokio::sync::mpsc::error::TryRecvError;

    fn tree_target(root: &str) -> RouteTarget {
        RouteTarget::Tree {
            root: root.to_string(),
        }
    }

    #[test]
    fn test_subscribe_sends_exactly_one_frame() {
        let (handle, mut rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        assert!(reg.subscribe(&handle, StreamKind::Tree, "root", tree_target("root"), None));
        assert!(!reg.subscribe(&handle, StreamKind::Tree, "root", tree_target("root"), None));

        assert!(matches!(
            rx.try_recv(),
            Ok(ClientFrame::Subscribe { .. })
        ));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
        assert!(reg.is_active(StreamKind::Tree, "root"));
    }

    #[test]
    fn test_resubscribe_replaces_handler() {
        let (handle, _rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        reg.subscribe(&handle, StreamKind::Status, "j", RouteTarget::Status, None);
        reg.subscribe(&handle, StreamKind::Status, "j", tree_target("j"), None);
        assert_eq!(
            reg.target(StreamKind::Status, "j"),
            Some(&tree_target("j"))
        );
    }

    #[test]
    fn test_unsubscribe_unknown_pair_is_noop() {
        let (handle, mut rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        assert!(!reg.unsubscribe(&handle, StreamKind::Log, "ghost"));
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn test_unsubscribe_sends_frame_and_clears_state() {
        let (handle, mut rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        reg.subscribe(&handle, StreamKind::Log, "j", RouteTarget::LogTail, Some(0));
        let _ = rx.try_recv();

        assert!(reg.unsubscribe(&handle, StreamKind::Log, "j"));
        assert!(matches!(
            rx.try_recv(),
            Ok(ClientFrame::Unsubscribe { .. })
        ));
        assert!(!reg.is_active(StreamKind::Log, "j"));
        assert!(reg.target(StreamKind::Log, "j").is_none());
    }

    #[test]
    fn test_tree_bindings_route_without_wire_state() {
        let (handle, mut rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        reg.subscribe(&handle, StreamKind::Tree, "root", tree_target("root"), None);
        let _ = rx.try_recv();

        reg.sync_tree_bindings("root", ["root".to_string(), "a".into(), "b".into()]);
        assert_eq!(reg.target(StreamKind::Tree, "a"), Some(&tree_target("root")));
        assert!(!reg.is_active(StreamKind::Tree, "a"));
        // no frames for local bindings
        assert!(rx.try_recv().is_err());

        // a reshape that drops "b" removes its binding
        reg.sync_tree_bindings("root", ["root".to_string(), "a".into()]);
        assert!(reg.target(StreamKind::Tree, "b").is_none());
        assert!(reg.target(StreamKind::Tree, "a").is_some());

        reg.clear_tree_bindings("root");
        assert!(reg.target(StreamKind::Tree, "a").is_none());
        // the root's wire entry survives until unsubscribed
        assert!(reg.is_active(StreamKind::Tree, "root"));
    }

    #[test]
    fn test_wire_subscriptions_snapshot() {
        let (handle, _rx) = transport_channel();
        let mut reg = SubscriptionRegistry::new();

        reg.subscribe(&handle, StreamKind::Tree, "root", tree_target("root"), None);
        reg.subscribe(&handle, StreamKind::Log, "j", RouteTarget::LogTail, Some(3));
        reg.sync_tree_bindings("root", ["a".to_string()]);

        let subs = reg.wire_subscriptions();
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&(StreamKind::Tree, "root".to_string())));
        assert!(subs.contains(&(StreamKind::Log, "j".to_string())));
    }
}
