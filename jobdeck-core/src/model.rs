use serde::{Deserialize, Serialize};

/// Unique identifier for a job, opaque to the client
pub type JobId = String;

/// Lifecycle state of a job as reported by the server
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Created, not yet picked up
    New,
    /// Queued behind other work
    Waiting,
    /// Currently executing
    Running,
    /// Finished successfully
    Success,
    /// Finished with an error
    Failed,
    /// Stopped before completion
    Aborted,
}

impl JobState {
    /// Whether the job can no longer change state on the server.
    /// The client still accepts a later terminal patch (last write wins)
    /// because delivery over the shared channel can reorder.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed | JobState::Aborted)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Icon for the state
    pub fn icon(&self) -> &'static str {
        match self {
            JobState::New => "◯",
            JobState::Waiting => "◌",
            JobState::Running => "●",
            JobState::Success => "✓",
            JobState::Failed => "✗",
            JobState::Aborted => "⊘",
        }
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            JobState::New => "new",
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Success => "success",
            JobState::Failed => "failed",
            JobState::Aborted => "aborted",
        }
    }
}

/// One job in a tree, with exclusively owned children.
///
/// `time` orders siblings and carries no other meaning on the client.
/// `summary` is mostly populated on terminal non-success states.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    #[serde(default)]
    pub parent_id: Option<JobId>,
    pub title: String,
    pub state: JobState,
    #[serde(default)]
    pub summary: Option<String>,
    pub time: u64,
    #[serde(default)]
    pub children: Vec<JobRecord>,
}

impl JobRecord {
    /// Create a childless record
    pub fn new(
        job_id: impl Into<JobId>,
        parent_id: Option<JobId>,
        title: impl Into<String>,
        state: JobState,
        time: u64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            parent_id,
            title: title.into(),
            state,
            summary: None,
            time,
            children: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_children(mut self, children: Vec<JobRecord>) -> Self {
        self.children = children;
        self
    }

    /// Total number of records in this subtree, including self
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(JobRecord::len).sum::<usize>()
    }

    /// Find a record in this subtree by id
    pub fn find(&self, job_id: &str) -> Option<&JobRecord> {
        if self.job_id == job_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(job_id))
    }
}
