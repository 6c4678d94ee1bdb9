//! Resumable log tailing
//!
//! Per job id, the reader tracks the next unread byte offset into the
//! server-side append-only log. The offset is the resumption token: every
//! subscribe frame carries it, so the server replays only unseen bytes.
//! Pausing a tail keeps the offset and the buffered lines; resuming is a
//! plain re-subscribe and never re-fetches or duplicates anything.

use std::collections::{BTreeMap, VecDeque};

use crate::model::JobId;
use crate::protocol::{ServerFrame, StreamKind};
use crate::registry::{RouteTarget, SubscriptionRegistry};
use crate::router::{FrameDisposition, StreamHandler};
use crate::transport::TransportHandle;
use crate::view::{ViewEvent, ViewSender};

/// Tail state for one job's log
#[derive(Clone, Debug, Default)]
pub struct LogSubscription {
    /// Next unread byte offset; never regresses
    pub position: u64,
    /// Whether a wire subscription is currently live
    pub active: bool,
    /// Confirmed empty by the server, as opposed to not loaded yet
    pub confirmed_empty: bool,
    lines: VecDeque<String>,
}

/// Default visible buffer size per job, in line segments
const DEFAULT_BUFFER_LINES: usize = 10_000;

/// Tracks every log tail the session has ever opened.
///
/// Subscriptions are retained, not destroyed, across pause/resume so the
/// stored position survives; only tearing down the whole session forgets
/// them.
#[derive(Debug)]
pub struct LogTailReader {
    cap: usize,
    subs: BTreeMap<JobId, LogSubscription>,
    view_tx: ViewSender,
}

impl LogTailReader {
    pub fn new(view_tx: ViewSender) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_LINES, view_tx)
    }

    pub fn with_capacity(cap: usize, view_tx: ViewSender) -> Self {
        Self {
            cap,
            subs: BTreeMap::new(),
            view_tx,
        }
    }

    /// Start tailing a job's log. A true no-op when already active: no
    /// second frame goes out and no state changes, which is what keeps
    /// rapid toggling from duplicating lines.
    pub fn subscribe(
        &mut self,
        registry: &mut SubscriptionRegistry,
        transport: &TransportHandle,
        job_id: &str,
    ) -> bool {
        let sub = self.subs.entry(job_id.to_string()).or_default();
        if sub.active {
            return false;
        }
        sub.active = true;
        let position = sub.position;
        registry.subscribe(
            transport,
            StreamKind::Log,
            job_id,
            RouteTarget::LogTail,
            Some(position),
        );
        true
    }

    /// Stop tailing. The stored position and buffer are kept so a later
    /// subscribe resumes instead of re-reading.
    pub fn unsubscribe(
        &mut self,
        registry: &mut SubscriptionRegistry,
        transport: &TransportHandle,
        job_id: &str,
    ) -> bool {
        match self.subs.get_mut(job_id) {
            Some(sub) if sub.active => {
                sub.active = false;
                registry.unsubscribe(transport, StreamKind::Log, job_id);
                true
            }
            _ => false,
        }
    }

    /// Append streamed segments and advance the position.
    ///
    /// Ignored for ids with no subscription context, and for frames whose
    /// position does not advance the stored one (stale or duplicate
    /// delivery); position never regresses.
    pub fn on_append(&mut self, job_id: &str, lines: &[String], new_position: u64) -> bool {
        let Some(sub) = self.subs.get_mut(job_id) else {
            return false;
        };
        if new_position <= sub.position {
            return false;
        }
        for line in lines {
            sub.lines.push_back(line.clone());
            while sub.lines.len() > self.cap {
                sub.lines.pop_front();
            }
        }
        sub.position = new_position;
        sub.confirmed_empty = false;
        let _ = self.view_tx.send(ViewEvent::LogAppended {
            job_id: job_id.to_string(),
            text: lines.concat(),
        });
        true
    }

    /// The server confirmed the log holds zero bytes
    pub fn on_zero_size(&mut self, job_id: &str) -> bool {
        let Some(sub) = self.subs.get_mut(job_id) else {
            return false;
        };
        sub.confirmed_empty = true;
        let _ = self.view_tx.send(ViewEvent::LogEmpty {
            job_id: job_id.to_string(),
        });
        true
    }

    /// Next unread offset; 0 when the job was never tailed
    pub fn position(&self, job_id: &str) -> u64 {
        self.subs.get(job_id).map(|s| s.position).unwrap_or(0)
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.subs.get(job_id).map(|s| s.active).unwrap_or(false)
    }

    pub fn is_confirmed_empty(&self, job_id: &str) -> bool {
        self.subs
            .get(job_id)
            .map(|s| s.confirmed_empty)
            .unwrap_or(false)
    }

    /// Whether any subscription context exists for the job
    pub fn knows(&self, job_id: &str) -> bool {
        self.subs.contains_key(job_id)
    }

    /// Buffered segments for display, oldest first
    pub fn lines(&self, job_id: &str) -> Vec<&str> {
        self.subs
            .get(job_id)
            .map(|s| s.lines.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Active tails, with their positions, for reconnect re-issue
    pub fn active_tails(&self) -> Vec<(JobId, u64)> {
        self.subs
            .iter()
            .filter(|(_, s)| s.active)
            .map(|(id, s)| (id.clone(), s.position))
            .collect()
    }
}

impl StreamHandler for LogTailReader {
    fn on_frame(&mut self, frame: &ServerFrame) -> FrameDisposition {
        let applied = match frame {
            ServerFrame::Lines {
                job_id,
                lines,
                position,
            } => self.on_append(job_id, lines, *position),
            ServerFrame::Zerosize { job_id } => self.on_zero_size(job_id),
            _ => false,
        };
        if applied {
            FrameDisposition::Consumed
        } else {
            FrameDisposition::Skipped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientFrame;
    use crate::transport::transport_channel;
    use crate::view::view_channel;

    fn sent_position(frame: ClientFrame) -> Option<u64> {
        match frame {
            ClientFrame::Subscribe { position, .. } => position,
            ClientFrame::Unsubscribe { .. } => None,
        }
    }

    #[test]
    fn test_first_subscribe_sends_position_zero() {
        let (handle, mut rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        assert!(reader.subscribe(&mut registry, &handle, "job-1"));
        assert_eq!(sent_position(rx.try_recv().unwrap()), Some(0));
    }

    #[test]
    fn test_resume_sends_last_known_position() {
        let (handle, mut rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        reader.subscribe(&mut registry, &handle, "job-1");
        let _ = rx.try_recv();

        assert!(reader.on_append("job-1", &["line1\n".to_string()], 6));
        reader.unsubscribe(&mut registry, &handle, "job-1");
        let _ = rx.try_recv(); // unsubscribe frame

        reader.subscribe(&mut registry, &handle, "job-1");
        assert_eq!(sent_position(rx.try_recv().unwrap()), Some(6));
        // nothing was re-fetched, so nothing is duplicated
        assert_eq!(reader.lines("job-1"), vec!["line1\n"]);
    }

    #[test]
    fn test_double_subscribe_is_a_true_noop() {
        let (handle, mut rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        assert!(reader.subscribe(&mut registry, &handle, "job-1"));
        assert!(!reader.subscribe(&mut registry, &handle, "job-1"));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert!(reader.is_active("job-1"));
    }

    #[test]
    fn test_unsubscribe_without_subscription_is_noop() {
        let (handle, mut rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        assert!(!reader.unsubscribe(&mut registry, &handle, "ghost"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_append_without_context_is_noop() {
        let (view_tx, mut view_rx) = view_channel();
        let mut reader = LogTailReader::new(view_tx);

        assert!(!reader.on_append("job-9", &["x".to_string()], 1));
        assert!(!reader.knows("job-9"));
        assert!(view_rx.try_recv().is_err());
    }

    #[test]
    fn test_position_tracks_latest_append_and_never_regresses() {
        let (handle, _rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        reader.subscribe(&mut registry, &handle, "j");
        assert!(reader.on_append("j", &["a\n".to_string()], 2));
        assert!(reader.on_append("j", &["b\n".to_string()], 4));
        assert_eq!(reader.position("j"), 4);

        // stale redelivery is discarded wholesale
        assert!(!reader.on_append("j", &["a\n".to_string()], 2));
        assert!(!reader.on_append("j", &["b\n".to_string()], 4));
        assert_eq!(reader.position("j"), 4);
        assert_eq!(reader.lines("j"), vec!["a\n", "b\n"]);

        reader.unsubscribe(&mut registry, &handle, "j");
        assert_eq!(reader.position("j"), 4);
    }

    #[test]
    fn test_zero_size_is_distinct_from_unknown() {
        let (handle, _rx) = transport_channel();
        let (view_tx, mut view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        assert!(!reader.is_confirmed_empty("j"));
        reader.subscribe(&mut registry, &handle, "j");
        assert!(!reader.is_confirmed_empty("j"));

        assert!(reader.on_zero_size("j"));
        assert!(reader.is_confirmed_empty("j"));
        assert!(matches!(
            view_rx.try_recv(),
            Ok(ViewEvent::LogEmpty { .. })
        ));

        // a later append clears the empty marker
        reader.on_append("j", &["x\n".to_string()], 2);
        assert!(!reader.is_confirmed_empty("j"));
    }

    #[test]
    fn test_buffer_caps_oldest_lines() {
        let (handle, _rx) = transport_channel();
        let (view_tx, _view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::with_capacity(2, view_tx);

        reader.subscribe(&mut registry, &handle, "j");
        reader.on_append("j", &["1".to_string()], 1);
        reader.on_append("j", &["2".to_string()], 2);
        reader.on_append("j", &["3".to_string()], 3);

        assert_eq!(reader.lines("j"), vec!["2", "3"]);
        assert_eq!(reader.position("j"), 3);
    }

    #[test]
    fn test_append_emits_concatenated_text() {
        let (handle, _rx) = transport_channel();
        let (view_tx, mut view_rx) = view_channel();
        let mut registry = SubscriptionRegistry::new();
        let mut reader = LogTailReader::new(view_tx);

        reader.subscribe(&mut registry, &handle, "j");
        reader.on_append("j", &["a\n".to_string(), "b\n".to_string()], 4);

        match view_rx.try_recv() {
            Ok(ViewEvent::LogAppended { job_id, text }) => {
                assert_eq!(job_id, "j");
                assert_eq!(text, "a\nb\n");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
