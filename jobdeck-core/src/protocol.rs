//! Wire protocol for the shared duplex channel
//!
//! Frames are JSON text messages tagged with a `type` field. The channel
//! itself (WebSocket or otherwise) is a transport concern; everything here is
//! transport-agnostic. Inbound frames are decoded at the dispatch boundary so
//! a malformed frame is dropped in isolation.

use serde::{Deserialize, Serialize};

use crate::model::{JobId, JobRecord, JobState};

/// Logical stream kinds multiplexed over the single channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Hierarchical job tree rooted at one job
    Tree,
    /// Status of a single job
    Status,
    /// Append-only text log of a single job
    Log,
}

impl StreamKind {
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::Tree => "tree",
            StreamKind::Status => "status",
            StreamKind::Log => "log",
        }
    }
}

/// Client-to-server requests
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start a stream. Log subscriptions carry the next unread byte offset
    /// so the server replays only unseen bytes; tree/status omit it.
    Subscribe {
        kind: StreamKind,
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<u64>,
    },
    /// Stop a stream. Fire-and-forget; no acknowledgement exists.
    Unsubscribe { kind: StreamKind, job_id: JobId },
}

impl ClientFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Server-to-client frames
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Full replacement snapshot of the tree rooted at `job_id`
    Tree { job_id: JobId, tree: JobRecord },
    /// A job appeared under `parent_id`
    New {
        job_id: JobId,
        parent_id: JobId,
        title: String,
        state: JobState,
        time: u64,
        #[serde(default)]
        summary: Option<String>,
    },
    /// State/summary patch for an existing job
    Status {
        job_id: JobId,
        state: JobState,
        #[serde(default)]
        summary: Option<String>,
    },
    /// Log bytes appended since the subscriber's position
    Lines {
        job_id: JobId,
        lines: Vec<String>,
        position: u64,
    },
    /// The job's log is confirmed empty (distinct from not-yet-loaded)
    Zerosize { job_id: JobId },
}

impl ServerFrame {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Registry keys this frame may route through, in lookup order.
    ///
    /// `new` routes by the parent that receives the insertion. `status`
    /// prefers an explicit status subscription, then falls back to the tree
    /// binding covering the job, since status patches flow on both streams.
    pub fn route_keys(&self) -> Vec<(StreamKind, &str)> {
        match self {
            ServerFrame::Tree { job_id, .. } => vec![(StreamKind::Tree, job_id.as_str())],
            ServerFrame::New { parent_id, .. } => vec![(StreamKind::Tree, parent_id.as_str())],
            ServerFrame::Status { job_id, .. } => vec![
                (StreamKind::Status, job_id.as_str()),
                (StreamKind::Tree, job_id.as_str()),
            ],
            ServerFrame::Lines { job_id, .. } => vec![(StreamKind::Log, job_id.as_str())],
            ServerFrame::Zerosize { job_id } => vec![(StreamKind::Log, job_id.as_str())],
        }
    }

    /// Build the record described by a `new` frame
    pub fn new_record(&self) -> Option<JobRecord> {
        match self {
            ServerFrame::New {
                job_id,
                parent_id,
                title,
                state,
                time,
                summary,
            } => Some(JobRecord {
                job_id: job_id.clone(),
                parent_id: Some(parent_id.clone()),
                title: title.clone(),
                state: *state,
                summary: summary.clone(),
                time: *time,
                children: Vec::new(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_with_position_round_trip() {
        let frame = ClientFrame::Subscribe {
            kind: StreamKind::Log,
            job_id: "job-1".into(),
            position: Some(6),
        };
        let json = frame.to_json().unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"kind\":\"log\""));
        assert!(json.contains("\"position\":6"));
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_subscribe_tree_omits_position() {
        let frame = ClientFrame::Subscribe {
            kind: StreamKind::Tree,
            job_id: "root".into(),
            position: None,
        };
        let json = frame.to_json().unwrap();
        assert!(!json.contains("position"));
    }

    #[test]
    fn test_decode_status_frame() {
        let raw = r#"{"type":"status","job_id":"job-2","state":"FAILED","summary":"exit 1"}"#;
        let frame = ServerFrame::from_json(raw).unwrap();
        match frame {
            ServerFrame::Status {
                job_id,
                state,
                summary,
            } => {
                assert_eq!(job_id, "job-2");
                assert_eq!(state, JobState::Failed);
                assert_eq!(summary.as_deref(), Some("exit 1"));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_decode_lines_frame() {
        let raw = r#"{"type":"lines","job_id":"job-1","lines":["a\n","b\n"],"position":4}"#;
        let frame = ServerFrame::from_json(raw).unwrap();
        assert_eq!(
            frame.route_keys(),
            vec![(StreamKind::Log, "job-1")]
        );
    }

    #[test]
    fn test_malformed_frames_are_rejected() {
        // missing required field
        assert!(ServerFrame::from_json(r#"{"type":"status","job_id":"x"}"#).is_err());
        // unknown tag
        assert!(ServerFrame::from_json(r#"{"type":"nope","job_id":"x"}"#).is_err());
        // not json at all
        assert!(ServerFrame::from_json("hello").is_err());
    }

    #[test]
    fn test_new_frame_routes_by_parent() {
        let raw = r#"{"type":"new","job_id":"c1","parent_id":"root","title":"register","state":"NEW","time":9}"#;
        let frame = ServerFrame::from_json(raw).unwrap();
        assert_eq!(frame.route_keys(), vec![(StreamKind::Tree, "root")]);
        let record = frame.new_record().unwrap();
        assert_eq!(record.job_id, "c1");
        assert_eq!(record.parent_id.as_deref(), Some("root"));
        assert!(record.children.is_empty());
    }

    #[test]
    fn test_status_frame_prefers_status_subscription() {
        let frame = ServerFrame::Status {
            job_id: "j".into(),
            state: JobState::Running,
            summary: None,
        };
        let keys = frame.route_keys();
        assert_eq!(keys[0].0, StreamKind::Status);
        assert_eq!(keys[1].0, StreamKind::Tree);
    }
}
