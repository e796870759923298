use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::Job;
use crate::resource::ResourceId;

pub type TaskId = Uuid;

/// Tag distinguishing what a task does; the selector passes dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Search,
    BuildIndex,
}

/// Scheduling decision attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceLabel {
    /// No resource pinned; the dispatcher places the task on the
    /// least-loaded queue.
    Unconstrained,
    /// Pinned to one specific resource.
    Pinned(ResourceId),
}

/// One schedulable unit of engine work. Owned by the scheduling queue until
/// consumed by execution; never outlives its job.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    kind: TaskKind,
    job: Arc<Job>,
    label: Option<ResourceLabel>,
}

impl Task {
    pub fn new(kind: TaskKind, job: Arc<Job>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            job,
            label: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn label(&self) -> Option<ResourceLabel> {
        self.label
    }

    /// Commit a label. The first committer wins: once set, later calls are
    /// ignored and return `false`.
    pub fn pin(&mut self, label: ResourceLabel) -> bool {
        if self.label.is_some() {
            return false;
        }
        self.label = Some(label);
        true
    }
}
