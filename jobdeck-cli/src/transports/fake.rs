use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use jobdeck_core::model::{JobId, JobRecord, JobState};
use jobdeck_core::protocol::{ClientFrame, ServerFrame, StreamKind};
use jobdeck_core::transport::{Transport, TransportEvent};

/// Scripted stand-in for the panel server: walks one deployment through its
/// lifecycle on a tick loop, honoring subscriptions and log positions the
/// way the real channel does. The sequence restarts once it completes, so a
/// demo session always has something moving.
pub struct FakeServer {
    tick_interval: Duration,
    tick: u64,
    states: BTreeMap<JobId, JobState>,
    logs: BTreeMap<JobId, String>,
    tree_subs: BTreeSet<JobId>,
    status_subs: BTreeSet<JobId>,
    log_subs: BTreeMap<JobId, u64>,
}

pub const DEMO_ROOT: &str = "deploy-42";

const BUILD: &str = "build-1";
const PROVISION: &str = "provision-1";
const VERIFY: &str = "verify-1";
const DNS: &str = "dns-1";

impl FakeServer {
    pub fn new() -> Self {
        Self {
            tick_interval: Duration::from_millis(600),
            tick: 0,
            states: Self::initial_states(),
            logs: BTreeMap::new(),
            tree_subs: BTreeSet::new(),
            status_subs: BTreeSet::new(),
            log_subs: BTreeMap::new(),
        }
    }

    #[allow(dead_code)]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    fn initial_states() -> BTreeMap<JobId, JobState> {
        [
            (DEMO_ROOT, JobState::Running),
            (BUILD, JobState::Waiting),
            (PROVISION, JobState::New),
            (VERIFY, JobState::New),
        ]
        .into_iter()
        .map(|(id, state)| (id.to_string(), state))
        .collect()
    }

    fn state(&self, id: &str) -> JobState {
        self.states.get(id).copied().unwrap_or(JobState::New)
    }

    /// Current snapshot of the demo tree. Children are deliberately listed
    /// out of time order; sorting them is the client's job.
    fn snapshot(&self) -> JobRecord {
        let mut children = vec![
            JobRecord::new(VERIFY, None, "Health check", self.state(VERIFY), 30),
            JobRecord::new(BUILD, None, "Build image", self.state(BUILD), 10),
            JobRecord::new(PROVISION, None, "Provision containers", self.state(PROVISION), 20),
        ];
        if let Some(dns_state) = self.states.get(DNS) {
            children.push(JobRecord::new(DNS, None, "Register DNS", *dns_state, 25));
        }
        JobRecord::new(DEMO_ROOT, None, "Deploy acme-web", self.state(DEMO_ROOT), 0)
            .with_children(children)
    }

    fn emit(tx: &mpsc::UnboundedSender<TransportEvent>, frame: ServerFrame) {
        if let Ok(json) = frame.to_json() {
            let _ = tx.send(TransportEvent::Frame(json));
        }
    }

    fn set_state(
        &mut self,
        tx: &mpsc::UnboundedSender<TransportEvent>,
        id: &str,
        state: JobState,
        summary: Option<&str>,
    ) {
        self.states.insert(id.to_string(), state);
        if self.tree_subs.contains(DEMO_ROOT) || self.status_subs.contains(id) {
            Self::emit(
                tx,
                ServerFrame::Status {
                    job_id: id.to_string(),
                    state,
                    summary: summary.map(str::to_string),
                },
            );
        }
    }

    fn append_log(&mut self, tx: &mpsc::UnboundedSender<TransportEvent>, id: &str, line: &str) {
        let log = self.logs.entry(id.to_string()).or_default();
        log.push_str(line);
        log.push('\n');
        let position = log.len() as u64;

        if self.log_subs.contains_key(id) {
            self.log_subs.insert(id.to_string(), position);
            Self::emit(
                tx,
                ServerFrame::Lines {
                    job_id: id.to_string(),
                    lines: vec![format!("{}\n", line)],
                    position,
                },
            );
        }
    }

    fn on_subscribe(
        &mut self,
        tx: &mpsc::UnboundedSender<TransportEvent>,
        kind: StreamKind,
        job_id: String,
        position: Option<u64>,
    ) {
        match kind {
            StreamKind::Tree => {
                self.tree_subs.insert(job_id.clone());
                if job_id == DEMO_ROOT {
                    Self::emit(
                        tx,
                        ServerFrame::Tree {
                            job_id,
                            tree: self.snapshot(),
                        },
                    );
                }
            }
            StreamKind::Status => {
                self.status_subs.insert(job_id.clone());
                Self::emit(
                    tx,
                    ServerFrame::Status {
                        job_id: job_id.clone(),
                        state: self.state(&job_id),
                        summary: None,
                    },
                );
            }
            StreamKind::Log => {
                let from = position.unwrap_or(0) as usize;
                let log = self.logs.get(&job_id).cloned().unwrap_or_default();
                if log.is_empty() {
                    Self::emit(tx, ServerFrame::Zerosize {
                        job_id: job_id.clone(),
                    });
                    self.log_subs.insert(job_id, 0);
                    return;
                }
                let total = log.len() as u64;
                if from < log.len() {
                    Self::emit(
                        tx,
                        ServerFrame::Lines {
                            job_id: job_id.clone(),
                            lines: vec![log[from..].to_string()],
                            position: total,
                        },
                    );
                }
                self.log_subs.insert(job_id, total);
            }
        }
    }

    /// One step of the scripted deployment
    fn advance(&mut self, tx: &mpsc::UnboundedSender<TransportEvent>) {
        self.tick += 1;
        let subscribed = self.tree_subs.contains(DEMO_ROOT);

        match self.tick % 16 {
            1 => {
                self.set_state(tx, BUILD, JobState::Running, None);
                self.append_log(tx, DEMO_ROOT, "deployment accepted");
            }
            2 => self.append_log(tx, BUILD, "fetching base image"),
            3 => self.append_log(tx, BUILD, "compiling assets"),
            4 => self.append_log(tx, BUILD, "image pushed: acme-web:latest"),
            5 => {
                self.set_state(tx, BUILD, JobState::Success, None);
                self.set_state(tx, PROVISION, JobState::Running, None);
                self.append_log(tx, PROVISION, "allocating 3 containers");
            }
            6 => {
                // a child announced between snapshots
                self.states.insert(DNS.to_string(), JobState::New);
                if subscribed {
                    Self::emit(
                        tx,
                        ServerFrame::New {
                            job_id: DNS.into(),
                            parent_id: DEMO_ROOT.into(),
                            title: "Register DNS".into(),
                            state: JobState::New,
                            time: 25,
                            summary: None,
                        },
                    );
                    // an announcement whose parent no client has seen;
                    // receivers drop it and the next snapshot heals
                    Self::emit(
                        tx,
                        ServerFrame::New {
                            job_id: "orphan-1".into(),
                            parent_id: "cleanup-9".into(),
                            title: "Orphaned step".into(),
                            state: JobState::New,
                            time: 99,
                            summary: None,
                        },
                    );
                }
            }
            7 => {
                self.set_state(tx, DNS, JobState::Success, None);
                self.append_log(tx, PROVISION, "containers healthy");
            }
            8 => {
                self.set_state(tx, PROVISION, JobState::Success, None);
                self.set_state(tx, VERIFY, JobState::Running, None);
            }
            9 => {
                self.set_state(tx, VERIFY, JobState::Success, None);
                self.set_state(
                    tx,
                    DEMO_ROOT,
                    JobState::Success,
                    Some("deployed 3 containers"),
                );
                self.append_log(tx, DEMO_ROOT, "deployment finished");
            }
            12 => {
                // start over so the demo keeps moving; logs are append-only
                // and keep their offsets across runs
                self.states = Self::initial_states();
                if subscribed {
                    Self::emit(
                        tx,
                        ServerFrame::Tree {
                            job_id: DEMO_ROOT.into(),
                            tree: self.snapshot(),
                        },
                    );
                }
            }
            _ => {}
        }
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for FakeServer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(
        &mut self,
        mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
        inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let _ = inbound_tx.send(TransportEvent::Connected);

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.advance(&inbound_tx);
                }

                maybe_frame = outbound_rx.recv() => {
                    let Some(frame) = maybe_frame else { break };

                    match frame {
                        ClientFrame::Subscribe { kind, job_id, position } => {
                            self.on_subscribe(&inbound_tx, kind, job_id, position);
                        }
                        ClientFrame::Unsubscribe { kind, job_id } => {
                            match kind {
                                StreamKind::Tree => { self.tree_subs.remove(&job_id); }
                                StreamKind::Status => { self.status_subs.remove(&job_id); }
                                StreamKind::Log => { self.log_subs.remove(&job_id); }
                            }
                        }
                    }
                }
            }
        }
    }
}
