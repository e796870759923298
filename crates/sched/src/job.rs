use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Task, TaskKind};

pub type JobId = Uuid;

/// What kind of work a job carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Search,
    BuildIndex,
}

/// A client-submitted unit of work, decomposed into one task per segment to
/// scan. Immutable once its tasks are derived; tasks hold an `Arc` back to it.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    kind: JobKind,
    /// Query batch size. Only meaningful for search jobs; the selector reads
    /// it as the load metric driving CPU/GPU routing.
    nq: u64,
    created_at: DateTime<Utc>,
}

impl Job {
    pub fn search(nq: u64) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind: JobKind::Search,
            nq,
            created_at: Utc::now(),
        })
    }

    pub fn build_index() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            kind: JobKind::BuildIndex,
            nq: 0,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn nq(&self) -> u64 {
        self.nq
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Derive `count` tasks for this job (one per segment to process).
    pub fn derive_tasks(self: &Arc<Self>, count: usize) -> Vec<Task> {
        let kind = match self.kind {
            JobKind::Search => TaskKind::Search,
            JobKind::BuildIndex => TaskKind::BuildIndex,
        };
        (0..count).map(|_| Task::new(kind, Arc::clone(self))).collect()
    }
}
