use tokio::sync::mpsc;

use crate::model::{JobId, JobRecord, JobState};

/// Events emitted by the synchronization core for the rendering layer.
///
/// This is the entire surface the front end sees: tree diffs, status
/// transitions, and appended log text. No errors cross this boundary; a
/// dropped or malformed frame shows up only as a view that stays stale or
/// loading. The rendering layer owns all display concerns, including which
/// state retires interactive controls once a job goes terminal.
#[derive(Clone, Debug)]
pub enum ViewEvent {
    /// The tree rooted at `root_id` changed shape or content
    TreeChanged { root_id: JobId, tree: JobRecord },
    /// A single job's state/summary changed
    StatusChanged {
        job_id: JobId,
        state: JobState,
        summary: Option<String>,
    },
    /// Text was appended to a job's log
    LogAppended { job_id: JobId, text: String },
    /// The job's log is confirmed empty; render "no entries", not a spinner
    LogEmpty { job_id: JobId },
}

/// Sending half used by the handlers; cloned freely
pub type ViewSender = mpsc::UnboundedSender<ViewEvent>;

/// Receiving half consumed by the front end
pub type ViewReceiver = mpsc::UnboundedReceiver<ViewEvent>;

pub fn view_channel() -> (ViewSender, ViewReceiver) {
    mpsc::unbounded_channel()
}
