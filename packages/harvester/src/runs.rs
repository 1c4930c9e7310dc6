//! Task-run registry: a bounded, in-memory log of operation attempts.
//!
//! An observability aid, not an audit log. The registry keeps the most
//! recent N runs in a ring (oldest evicted first), supports cooperative
//! cancellation through a registered token, and does not survive
//! process restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// What kind of operation a run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunKind {
    FetchSource,
    FetchBatch,
    PipelineArticle,
    Skill,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::FetchSource => "fetch-source",
            RunKind::FetchBatch => "fetch-batch",
            RunKind::PipelineArticle => "pipeline-article",
            RunKind::Skill => "skill",
        }
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Warning,
    Error,
    Stopped,
}

/// One recorded operation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub id: Uuid,
    pub kind: RunKind,
    pub label: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub meta: HashMap<String, serde_json::Value>,
}

impl TaskRun {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

struct Inner {
    runs: VecDeque<TaskRun>,
    cancels: HashMap<Uuid, CancellationToken>,
}

/// Fixed-capacity registry of task runs.
///
/// Explicitly constructed and dependency-injected; there is no global
/// instance.
pub struct TaskRunRegistry {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl TaskRunRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                runs: VecDeque::new(),
                cancels: HashMap::new(),
            }),
        }
    }

    /// Record the start of an operation. Oldest runs are evicted once
    /// the ring is full.
    pub fn start(
        &self,
        kind: RunKind,
        label: impl Into<String>,
        meta: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Uuid {
        let run = TaskRun {
            id: Uuid::new_v4(),
            kind,
            label: label.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            meta: meta.into_iter().collect(),
        };
        let id = run.id;

        let mut inner = self.inner.lock().unwrap();
        if inner.runs.len() >= self.capacity {
            if let Some(evicted) = inner.runs.pop_front() {
                inner.cancels.remove(&evicted.id);
            }
        }
        inner.runs.push_back(run);

        debug!(run_id = %id, kind = kind.as_str(), "Task run started");
        id
    }

    /// Associate a cancellation token with a running task.
    pub fn register_cancel(&self, run_id: Uuid, token: CancellationToken) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .runs
            .iter()
            .any(|r| r.id == run_id && r.is_running())
        {
            inner.cancels.insert(run_id, token);
        }
    }

    /// Merge metadata into a running task.
    pub fn update(
        &self,
        run_id: Uuid,
        meta: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.meta.extend(meta);
        }
    }

    /// Mark a run finished. Finished runs are immutable afterwards.
    pub fn finish(
        &self,
        run_id: Uuid,
        status: RunStatus,
        meta: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancels.remove(&run_id);
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            if run.is_running() {
                run.status = status;
                run.finished_at = Some(Utc::now());
                run.meta.extend(meta);
            }
        }
    }

    /// Ask a running task to stop.
    ///
    /// Cancels the registered token (interrupting in-flight network and
    /// browser work), marks the run `Stopped`, and returns whether a
    /// running task was actually stopped.
    pub fn stop(&self, run_id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) else {
            return false;
        };
        if !run.is_running() {
            return false;
        }
        run.status = RunStatus::Stopped;
        run.finished_at = Some(Utc::now());

        if let Some(token) = inner.cancels.remove(&run_id) {
            token.cancel();
        }
        true
    }

    /// Most-recent-first listing, optionally filtered by kind.
    pub fn list(&self, kind: Option<RunKind>, limit: usize) -> Vec<TaskRun> {
        let inner = self.inner.lock().unwrap();
        inner
            .runs
            .iter()
            .rev()
            .filter(|r| kind.map(|k| r.kind == k).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Fetch one run by id.
    pub fn get(&self, run_id: Uuid) -> Option<TaskRun> {
        let inner = self.inner.lock().unwrap();
        inner.runs.iter().find(|r| r.id == run_id).cloned()
    }
}
