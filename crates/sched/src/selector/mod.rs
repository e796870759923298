//! Selector passes: pluggable resource-selection policies.
//!
//! A pass examines one task and either declines (not applicable) or commits
//! a [`ResourceLabel`](crate::task::ResourceLabel) to it. Passes are chained
//! in a fixed priority order at scheduler initialization; the first
//! committer wins and the chain falls back to `Unconstrained` when no pass
//! applies.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::SchedError;
use crate::task::{ResourceLabel, Task};

pub mod flat_pass;

#[cfg(test)]
mod tests;

pub use flat_pass::FlatSearchPass;

/// A single resource-selection policy.
pub trait SelectorPass: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Called once at chain registration: load current config values into
    /// the pass-local cache and subscribe to the keys this pass reads.
    /// A missing key aborts registration.
    fn init(self: Arc<Self>) -> Result<(), SchedError>;

    /// Examine `task`. Returns `false` without side effects when the task is
    /// not this pass's concern; otherwise commits a label and returns `true`.
    /// Must not block on I/O: this runs on the task-admission hot path.
    fn run(&self, task: &mut Task) -> bool;
}

/// Ordered pass pipeline. Membership is fixed after scheduler
/// initialization; evaluation is read-only with respect to the chain.
#[derive(Default)]
pub struct PassChain {
    passes: Vec<Arc<dyn SelectorPass>>,
}

impl PassChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize and append a pass. Registration order is priority order.
    pub fn register(&mut self, pass: Arc<dyn SelectorPass>) -> Result<(), SchedError> {
        Arc::clone(&pass).init()?;
        info!(pass = pass.name(), "selector pass registered");
        self.passes.push(pass);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run the chain for one task. A task that already carries a label is
    /// left untouched (first-committer-wins); otherwise the first applicable
    /// pass decides, and `Unconstrained` applies when none does.
    pub fn evaluate(&self, task: &mut Task) {
        if task.label().is_some() {
            return;
        }
        for pass in &self.passes {
            if pass.run(task) {
                debug!(
                    pass = pass.name(),
                    task = %task.id(),
                    label = ?task.label(),
                    "selector pass committed label"
                );
                return;
            }
        }
        task.pin(ResourceLabel::Unconstrained);
    }
}
