use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resource::ResourceId;

/// Dispatch metrics exposed to operators.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchMetrics {
    /// Total scheduling decisions taken.
    pub decisions: u64,
    /// Tasks routed per resource, keyed by resource name ("cpu", "gpu0", ...).
    pub tasks_dispatched: HashMap<String, u64>,
    /// Decisions where no pass applied and the task stayed unconstrained.
    pub unconstrained: u64,
    /// Rolling average decision latency.
    pub avg_decision_time: Duration,
    /// When the last task was dispatched.
    pub last_dispatch: Option<DateTime<Utc>>,
}

impl DispatchMetrics {
    /// Record one routed task.
    pub fn record(&mut self, placed_on: ResourceId, unconstrained: bool, elapsed: Duration) {
        self.decisions += 1;
        *self.tasks_dispatched.entry(placed_on.to_string()).or_default() += 1;
        if unconstrained {
            self.unconstrained += 1;
        }
        self.last_dispatch = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (elapsed - prev_avg) / n
        if self.decisions == 1 {
            self.avg_decision_time = elapsed;
        } else {
            let prev = self.avg_decision_time.as_nanos() as f64;
            let cur = elapsed.as_nanos() as f64;
            let avg = prev + (cur - prev) / self.decisions as f64;
            self.avg_decision_time = Duration::from_nanos(avg as u64);
        }
    }
}
