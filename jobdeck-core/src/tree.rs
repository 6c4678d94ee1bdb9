//! Job tree reconciliation
//!
//! Each subscribed root job gets one `TreeState`: a flat arena of nodes
//! keyed by job id, with per-node ordered child lists. The arena doubles as
//! the index that routes "new job" insertions to their parent without
//! re-walking the tree. Three update kinds apply: a full snapshot replaces
//! the tree wholesale, a `new` frame inserts one child, a `status` frame
//! patches state/summary in place.

use std::collections::BTreeMap;

use crate::model::{JobId, JobRecord, JobState};
use crate::protocol::ServerFrame;
use crate::router::{FrameDisposition, StreamHandler};
use crate::view::{ViewEvent, ViewSender};

/// One job in the arena; children are ids, ordered ascending by `time`
#[derive(Clone, Debug)]
pub struct JobNode {
    pub job_id: JobId,
    pub parent_id: Option<JobId>,
    pub title: String,
    pub state: JobState,
    pub summary: Option<String>,
    pub time: u64,
    pub children: Vec<JobId>,
}

impl JobNode {
    fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            parent_id: record.parent_id.clone(),
            title: record.title.clone(),
            state: record.state,
            summary: record.summary.clone(),
            time: record.time,
            children: Vec::new(),
        }
    }
}

/// The canonical in-memory tree for one root job.
///
/// Created when a view first subscribes to the root, replaced wholesale by
/// snapshot frames, mutated in place by insertion and patch frames, and
/// destroyed when the owning view unsubscribes.
#[derive(Clone, Debug)]
pub struct TreeState {
    root: JobId,
    nodes: BTreeMap<JobId, JobNode>,
}

impl TreeState {
    pub fn new(root: impl Into<JobId>) -> Self {
        Self {
            root: root.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Whether a snapshot has been applied yet
    pub fn is_loaded(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.nodes.contains_key(job_id)
    }

    pub fn node(&self, job_id: &str) -> Option<&JobNode> {
        self.nodes.get(job_id)
    }

    /// Every job id currently in the tree
    pub fn ids(&self) -> Vec<JobId> {
        self.nodes.keys().cloned().collect()
    }

    /// Replace the stored tree wholesale.
    ///
    /// Children at every level are re-sorted ascending by `time` with a
    /// stable sort: timestamps alone do not give a total order, and the
    /// display must not visibly reorder equal-time siblings on refresh.
    pub fn apply_snapshot(&mut self, tree: &JobRecord) -> bool {
        if tree.job_id != self.root {
            return false;
        }
        self.nodes.clear();
        self.ingest(tree, None);
        true
    }

    fn ingest(&mut self, record: &JobRecord, parent_id: Option<&str>) {
        let mut node = JobNode::from_record(record);
        if node.parent_id.is_none() {
            node.parent_id = parent_id.map(str::to_string);
        }

        let mut ordered: Vec<&JobRecord> = record.children.iter().collect();
        ordered.sort_by_key(|c| c.time);
        node.children = ordered.iter().map(|c| c.job_id.clone()).collect();

        self.nodes.insert(node.job_id.clone(), node);
        for child in ordered {
            self.ingest(child, Some(&record.job_id));
        }
    }

    /// Insert one new job under `parent_id`, keeping siblings time-ordered.
    ///
    /// An unknown parent means the insertion raced ahead of the snapshot
    /// that would have introduced it; the record is dropped and the next
    /// snapshot heals the gap. Returns false in that case.
    pub fn apply_new_job(&mut self, parent_id: &str, record: &JobRecord) -> bool {
        if !self.nodes.contains_key(parent_id) {
            return false;
        }

        if let Some(existing) = self.nodes.get_mut(&record.job_id) {
            // repeated announcement; refresh the payload fields in place
            existing.title = record.title.clone();
            existing.state = record.state;
            existing.summary = record.summary.clone();
            return true;
        }

        let mut node = JobNode::from_record(record);
        node.parent_id = Some(parent_id.to_string());

        // equal-time siblings keep arrival order
        let insert_at = match self.nodes.get(parent_id) {
            Some(parent) => {
                let mut at = parent.children.len();
                for (idx, child_id) in parent.children.iter().enumerate() {
                    let child_time = self
                        .nodes
                        .get(child_id)
                        .map(|n| n.time)
                        .unwrap_or(u64::MAX);
                    if child_time > node.time {
                        at = idx;
                        break;
                    }
                }
                at
            }
            None => return false,
        };

        let job_id = node.job_id.clone();
        self.nodes.insert(job_id.clone(), node);
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children.insert(insert_at, job_id);
        }
        true
    }

    /// Patch state/summary on an existing record; children are untouched.
    /// Unknown ids are a no-op. A terminal state arriving after another
    /// terminal state is accepted last-write-wins.
    pub fn apply_status_patch(
        &mut self,
        job_id: &str,
        state: JobState,
        summary: Option<&str>,
    ) -> bool {
        match self.nodes.get_mut(job_id) {
            Some(node) => {
                node.state = state;
                if let Some(summary) = summary {
                    node.summary = Some(summary.to_string());
                }
                true
            }
            None => false,
        }
    }

    /// Rebuild the nested record tree for the rendering layer
    pub fn materialize(&self) -> Option<JobRecord> {
        self.materialize_node(&self.root)
    }

    fn materialize_node(&self, job_id: &str) -> Option<JobRecord> {
        let node = self.nodes.get(job_id)?;
        let children = node
            .children
            .iter()
            .filter_map(|id| self.materialize_node(id))
            .collect();
        Some(JobRecord {
            job_id: node.job_id.clone(),
            parent_id: node.parent_id.clone(),
            title: node.title.clone(),
            state: node.state,
            summary: node.summary.clone(),
            time: node.time,
            children,
        })
    }
}

/// Stream handler owning the tree for one subscribed root
#[derive(Debug)]
pub struct JobTreeHandler {
    state: TreeState,
    view_tx: ViewSender,
}

impl JobTreeHandler {
    pub fn new(root: impl Into<JobId>, view_tx: ViewSender) -> Self {
        Self {
            state: TreeState::new(root),
            view_tx,
        }
    }

    pub fn state(&self) -> &TreeState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TreeState {
        &mut self.state
    }

    fn emit_tree(&self) {
        if let Some(tree) = self.state.materialize() {
            let _ = self.view_tx.send(ViewEvent::TreeChanged {
                root_id: self.state.root().to_string(),
                tree,
            });
        }
    }
}

impl StreamHandler for JobTreeHandler {
    fn on_frame(&mut self, frame: &ServerFrame) -> FrameDisposition {
        match frame {
            ServerFrame::Tree { tree, .. } => {
                if !self.state.apply_snapshot(tree) {
                    return FrameDisposition::Skipped;
                }
                self.emit_tree();
                FrameDisposition::Reshaped
            }
            ServerFrame::New { parent_id, .. } => {
                let Some(record) = frame.new_record() else {
                    return FrameDisposition::Skipped;
                };
                if !self.state.apply_new_job(parent_id, &record) {
                    // raced ahead of the snapshot; the next one heals it
                    return FrameDisposition::Skipped;
                }
                self.emit_tree();
                FrameDisposition::Reshaped
            }
            ServerFrame::Status {
                job_id,
                state,
                summary,
            } => {
                if !self
                    .state
                    .apply_status_patch(job_id, *state, summary.as_deref())
                {
                    return FrameDisposition::Skipped;
                }
                let _ = self.view_tx.send(ViewEvent::StatusChanged {
                    job_id: job_id.clone(),
                    state: *state,
                    summary: summary.clone(),
                });
                FrameDisposition::Consumed
            }
            _ => FrameDisposition::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::view_channel;

    fn snapshot() -> JobRecord {
        JobRecord::new("A", None, "deploy app", JobState::Running, 0).with_children(vec![
            JobRecord::new("B", None, "provision", JobState::Waiting, 5),
            JobRecord::new("C", None, "build", JobState::Running, 2),
        ])
    }

    #[test]
    fn test_snapshot_sorts_children_by_time() {
        let mut state = TreeState::new("A");
        assert!(state.apply_snapshot(&snapshot()));

        let tree = state.materialize().unwrap();
        let order: Vec<&str> = tree.children.iter().map(|c| c.job_id.as_str()).collect();
        assert_eq!(order, vec!["C", "B"]);
    }

    #[test]
    fn test_snapshot_is_deterministic_and_stable() {
        let input = JobRecord::new("A", None, "root", JobState::Running, 0).with_children(vec![
            JobRecord::new("x", None, "first", JobState::New, 3),
            JobRecord::new("y", None, "second", JobState::New, 3),
            JobRecord::new("z", None, "third", JobState::New, 1),
        ]);

        let mut state = TreeState::new("A");
        state.apply_snapshot(&input);
        let first = state.materialize().unwrap();
        state.apply_snapshot(&input);
        let second = state.materialize().unwrap();

        assert_eq!(first, second);
        let order: Vec<&str> = first.children.iter().map(|c| c.job_id.as_str()).collect();
        // z sorts first; equal-time x and y keep arrival order
        assert_eq!(order, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_snapshot_for_wrong_root_is_rejected() {
        let mut state = TreeState::new("A");
        let other = JobRecord::new("Z", None, "other", JobState::Running, 0);
        assert!(!state.apply_snapshot(&other));
        assert!(!state.is_loaded());
    }

    #[test]
    fn test_new_job_inserts_in_time_order() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());

        let record = JobRecord::new("D", None, "migrate", JobState::New, 3);
        assert!(state.apply_new_job("A", &record));

        let tree = state.materialize().unwrap();
        let order: Vec<&str> = tree.children.iter().map(|c| c.job_id.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "B"]);
        assert_eq!(
            state.node("D").and_then(|n| n.parent_id.as_deref()),
            Some("A")
        );
    }

    #[test]
    fn test_new_job_equal_time_goes_after_existing() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());

        let record = JobRecord::new("D", None, "migrate", JobState::New, 2);
        state.apply_new_job("A", &record);

        let tree = state.materialize().unwrap();
        let order: Vec<&str> = tree.children.iter().map(|c| c.job_id.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "B"]);
    }

    #[test]
    fn test_orphan_insertion_is_dropped_then_healed_by_snapshot() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());

        let orphan = JobRecord::new("E", None, "register", JobState::New, 9);
        assert!(!state.apply_new_job("nope", &orphan));
        // the existing tree is intact
        assert_eq!(state.materialize().unwrap().len(), 3);

        // the next snapshot carries the missing parent and the record
        let healed = snapshot().with_children(vec![
            JobRecord::new("B", None, "provision", JobState::Waiting, 5),
            JobRecord::new("C", None, "build", JobState::Running, 2),
            JobRecord::new("nope", None, "late parent", JobState::Running, 7).with_children(
                vec![JobRecord::new("E", None, "register", JobState::New, 9)],
            ),
        ]);
        state.apply_snapshot(&healed);
        assert!(state.contains("E"));
        assert_eq!(
            state.node("E").and_then(|n| n.parent_id.as_deref()),
            Some("nope")
        );
    }

    #[test]
    fn test_status_patch_last_write_wins() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());

        assert!(state.apply_status_patch("B", JobState::Success, None));
        assert!(state.apply_status_patch("B", JobState::Failed, Some("rolled back")));

        let node = state.node("B").unwrap();
        assert_eq!(node.state, JobState::Failed);
        assert_eq!(node.summary.as_deref(), Some("rolled back"));
    }

    #[test]
    fn test_status_patch_unknown_id_is_noop() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());
        assert!(!state.apply_status_patch("ghost", JobState::Failed, None));
        assert_eq!(state.materialize().unwrap().len(), 3);
    }

    #[test]
    fn test_status_patch_does_not_touch_children() {
        let mut state = TreeState::new("A");
        state.apply_snapshot(&snapshot());
        state.apply_status_patch("A", JobState::Success, None);
        assert_eq!(state.materialize().unwrap().children.len(), 2);
    }

    #[test]
    fn test_handler_emits_tree_and_status_events() {
        let (tx, mut rx) = view_channel();
        let mut handler = JobTreeHandler::new("A", tx);

        let disp = handler.on_frame(&ServerFrame::Tree {
            job_id: "A".into(),
            tree: snapshot(),
        });
        assert_eq!(disp, FrameDisposition::Reshaped);
        assert!(matches!(
            rx.try_recv(),
            Ok(ViewEvent::TreeChanged { .. })
        ));

        let disp = handler.on_frame(&ServerFrame::Status {
            job_id: "C".into(),
            state: JobState::Success,
            summary: None,
        });
        assert_eq!(disp, FrameDisposition::Consumed);
        assert!(matches!(
            rx.try_recv(),
            Ok(ViewEvent::StatusChanged { .. })
        ));
    }

    #[test]
    fn test_handler_drops_new_before_snapshot() {
        let (tx, mut rx) = view_channel();
        let mut handler = JobTreeHandler::new("A", tx);

        // subscription is live but no snapshot has arrived yet
        let disp = handler.on_frame(&ServerFrame::New {
            job_id: "B".into(),
            parent_id: "A".into(),
            title: "provision".into(),
            state: JobState::New,
            time: 1,
            summary: None,
        });
        assert_eq!(disp, FrameDisposition::Skipped);
        assert!(rx.try_recv().is_err());
    }
}
