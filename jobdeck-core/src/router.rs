//! Inbound frame dispatch
//!
//! The router is the decode boundary for the shared channel: raw text in,
//! typed frame plus route out. A malformed frame is counted and dropped
//! without disturbing any handler; a well-formed frame whose `(kind, id)`
//! has no registered route is likewise dropped, because a stream that is no
//! longer displayed must not leak work into a torn-down handler. Nothing is
//! buffered or retried; a fresh subscribe always re-requests the state it
//! needs.

use tracing::debug;

use crate::protocol::ServerFrame;
use crate::registry::{RouteTarget, SubscriptionRegistry};

/// What a handler did with a dispatched frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Applied without changing tree shape
    Consumed,
    /// Applied and the set of known job ids changed; routing bindings
    /// must be re-synced
    Reshaped,
    /// Not applicable to this handler's state; dropped
    Skipped,
}

/// A handler for one logical stream, registered in the subscription
/// registry and invoked by the router with typed payloads.
pub trait StreamHandler {
    fn on_frame(&mut self, frame: &ServerFrame) -> FrameDisposition;
}

/// Routes each inbound frame to the matching registered handler.
#[derive(Debug, Default)]
pub struct DispatchRouter {
    routed: u64,
    dropped: u64,
    malformed: u64,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw frame and resolve its route. Returns `None` when the
    /// frame is malformed or nothing is subscribed to it, both of which are
    /// expected outcomes and never errors.
    pub fn resolve(
        &mut self,
        registry: &SubscriptionRegistry,
        raw: &str,
    ) -> Option<(RouteTarget, ServerFrame)> {
        let frame = match ServerFrame::from_json(raw) {
            Ok(frame) => frame,
            Err(err) => {
                self.malformed += 1;
                debug!("rejecting malformed frame: {}", err);
                return None;
            }
        };

        for (kind, id) in frame.route_keys() {
            if let Some(target) = registry.target(kind, id) {
                self.routed += 1;
                return Some((target.clone(), frame));
            }
        }

        self.dropped += 1;
        debug!("dropping unroutable frame: {:?}", frame.route_keys());
        None
    }

    /// Frames delivered to a handler
    pub fn routed(&self) -> u64 {
        self.routed
    }

    /// Well-formed frames with no subscribed route
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Frames rejected at the decode boundary
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
