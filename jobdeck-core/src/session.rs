//! Session composition
//!
//! `SyncSession` wires the registry, router, tree handlers, and log tail
//! reader to one transport. Every state transition happens synchronously
//! inside `handle_event`, driven by the transport's inbound channel, so
//! frame processing is run-to-completion in arrival order: there is no
//! parallelism between handlers and no ordering assumption across streams.

use std::collections::BTreeMap;

use tracing::info;

use crate::logtail::LogTailReader;
use crate::model::{JobId, JobRecord};
use crate::protocol::{ServerFrame, StreamKind};
use crate::registry::{RouteTarget, SubscriptionRegistry};
use crate::router::{DispatchRouter, FrameDisposition, StreamHandler};
use crate::transport::{TransportEvent, TransportHandle};
use crate::tree::JobTreeHandler;
use crate::view::{view_channel, ViewEvent, ViewReceiver, ViewSender};

/// Client-side synchronization state for one shared channel.
pub struct SyncSession {
    transport: TransportHandle,
    registry: SubscriptionRegistry,
    router: DispatchRouter,
    trees: BTreeMap<JobId, JobTreeHandler>,
    logs: LogTailReader,
    view_tx: ViewSender,
}

impl SyncSession {
    /// Create a session over the given transport handle. The returned
    /// receiver is the rendering layer's whole view of the world.
    pub fn new(transport: TransportHandle) -> (Self, ViewReceiver) {
        Self::with_log_capacity(transport, 10_000)
    }

    pub fn with_log_capacity(
        transport: TransportHandle,
        log_buffer_lines: usize,
    ) -> (Self, ViewReceiver) {
        let (view_tx, view_rx) = view_channel();
        let session = Self {
            transport,
            registry: SubscriptionRegistry::new(),
            router: DispatchRouter::new(),
            trees: BTreeMap::new(),
            logs: LogTailReader::with_capacity(log_buffer_lines, view_tx.clone()),
            view_tx,
        };
        (session, view_rx)
    }

    // ------------------------------------------------------------------
    // UI-driven subscription control
    // ------------------------------------------------------------------

    /// Start mirroring the tree rooted at `root`
    pub fn open_tree(&mut self, root: &str) {
        self.trees
            .entry(root.to_string())
            .or_insert_with(|| JobTreeHandler::new(root, self.view_tx.clone()));
        self.registry.subscribe(
            &self.transport,
            StreamKind::Tree,
            root,
            RouteTarget::Tree {
                root: root.to_string(),
            },
            None,
        );
    }

    /// Drop the tree and everything routed through it
    pub fn close_tree(&mut self, root: &str) {
        self.registry
            .unsubscribe(&self.transport, StreamKind::Tree, root);
        self.registry.clear_tree_bindings(root);
        self.trees.remove(root);
    }

    /// Watch one job's status without mirroring a whole tree
    pub fn watch_status(&mut self, job_id: &str) {
        self.registry.subscribe(
            &self.transport,
            StreamKind::Status,
            job_id,
            RouteTarget::Status,
            None,
        );
    }

    pub fn unwatch_status(&mut self, job_id: &str) {
        self.registry
            .unsubscribe(&self.transport, StreamKind::Status, job_id);
    }

    /// Start or resume tailing a job's log
    pub fn open_log(&mut self, job_id: &str) {
        self.logs
            .subscribe(&mut self.registry, &self.transport, job_id);
    }

    /// Pause tailing; position and buffer are retained
    pub fn close_log(&mut self, job_id: &str) {
        self.logs
            .unsubscribe(&mut self.registry, &self.transport, job_id);
    }

    // ------------------------------------------------------------------
    // Transport-driven event handling
    // ------------------------------------------------------------------

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("channel up, re-issuing subscriptions");
                self.resubscribe_all();
            }
            TransportEvent::Disconnected => {
                info!("channel down, waiting for transport to reconnect");
            }
            TransportEvent::Frame(raw) => self.on_frame(&raw),
        }
    }

    fn on_frame(&mut self, raw: &str) {
        let Some((target, frame)) = self.router.resolve(&self.registry, raw) else {
            return;
        };
        match target {
            RouteTarget::Tree { root } => {
                let Some(handler) = self.trees.get_mut(&root) else {
                    // route outlived its handler during fast navigation
                    return;
                };
                let handler: &mut dyn StreamHandler = handler;
                if handler.on_frame(&frame) == FrameDisposition::Reshaped {
                    if let Some(handler) = self.trees.get(&root) {
                        self.registry
                            .sync_tree_bindings(&root, handler.state().ids());
                    }
                }
            }
            RouteTarget::LogTail => {
                let handler: &mut dyn StreamHandler = &mut self.logs;
                handler.on_frame(&frame);
            }
            RouteTarget::Status => self.on_status_watch(&frame),
        }
    }

    /// A status patch arriving on a standalone per-job watch. Any open tree
    /// that knows the job is patched too, so both views stay consistent.
    fn on_status_watch(&mut self, frame: &ServerFrame) {
        let ServerFrame::Status {
            job_id,
            state,
            summary,
        } = frame
        else {
            return;
        };
        for handler in self.trees.values_mut() {
            if handler.state().contains(job_id) {
                handler
                    .state_mut()
                    .apply_status_patch(job_id, *state, summary.as_deref());
            }
        }
        let _ = self.view_tx.send(ViewEvent::StatusChanged {
            job_id: job_id.clone(),
            state: *state,
            summary: summary.clone(),
        });
    }

    /// Re-issue every active subscription after a reconnect. The server
    /// keeps no session state beyond what each subscribe conveys, so tree
    /// and status streams restart from a fresh snapshot while log tails
    /// resume from their retained positions.
    fn resubscribe_all(&mut self) {
        for (kind, job_id) in self.registry.wire_subscriptions() {
            let position = match kind {
                StreamKind::Log => Some(self.logs.position(&job_id)),
                _ => None,
            };
            self.registry
                .reissue(&self.transport, kind, &job_id, position);
        }
    }

    // ------------------------------------------------------------------
    // Read access for the rendering layer
    // ------------------------------------------------------------------

    /// Current materialized tree for a root, if a snapshot has arrived
    pub fn tree(&self, root: &str) -> Option<JobRecord> {
        self.trees.get(root).and_then(|h| h.state().materialize())
    }

    pub fn tree_roots(&self) -> Vec<JobId> {
        self.trees.keys().cloned().collect()
    }

    pub fn log_lines(&self, job_id: &str) -> Vec<&str> {
        self.logs.lines(job_id)
    }

    pub fn log_position(&self, job_id: &str) -> u64 {
        self.logs.position(job_id)
    }

    pub fn log_active(&self, job_id: &str) -> bool {
        self.logs.is_active(job_id)
    }

    pub fn log_confirmed_empty(&self, job_id: &str) -> bool {
        self.logs.is_confirmed_empty(job_id)
    }

    pub fn log_known(&self, job_id: &str) -> bool {
        self.logs.knows(job_id)
    }

    pub fn is_subscribed(&self, kind: StreamKind, job_id: &str) -> bool {
        self.registry.is_active(kind, job_id)
    }

    /// Well-formed frames that arrived with nothing subscribed to them
    pub fn frames_dropped(&self) -> u64 {
        self.router.dropped()
    }

    /// Frames rejected at the decode boundary
    pub fn frames_malformed(&self) -> u64 {
        self.router.malformed()
    }
}
