//! Dispatch loop: evaluate the pass chain once per task, then route the task
//! to the labeled resource's execution queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::SchedError;
use crate::job::Job;
use crate::metrics::DispatchMetrics;
use crate::resource::{ResourceId, ResourceManager};
use crate::selector::PassChain;
use crate::task::{ResourceLabel, Task};

/// Per-resource execution queue. The execution side pulls from it; the
/// dispatcher only pushes.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn push(&self, task: Task) {
        self.tasks.lock().unwrap().push_back(task);
    }

    pub fn pop(&self) -> Option<Task> {
        self.tasks.lock().unwrap().pop_front()
    }

    pub fn depth(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

/// Routes submitted tasks to per-resource queues after chain evaluation.
pub struct Dispatcher {
    chain: PassChain,
    resources: Arc<ResourceManager>,
    /// Tasks submitted but not yet evaluated.
    inbound: Mutex<VecDeque<Task>>,
    /// Execution queues, created lazily per resource identity.
    queues: RwLock<HashMap<ResourceId, Arc<TaskQueue>>>,
    metrics: Arc<RwLock<DispatchMetrics>>,
    shutdown: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Build a dispatcher over an initialized chain and resource set.
    /// Fails fast if no CPU resource is registered: a task that finds no
    /// resource at dispatch time would stall forever.
    pub fn new(chain: PassChain, resources: Arc<ResourceManager>) -> Result<Self, SchedError> {
        resources.validate()?;
        Ok(Self {
            chain,
            resources,
            inbound: Mutex::new(VecDeque::new()),
            queues: RwLock::new(HashMap::new()),
            metrics: Arc::new(RwLock::new(DispatchMetrics::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Derive `segment_count` tasks from `job` and queue them for dispatch.
    pub fn submit(&self, job: &Arc<Job>, segment_count: usize) {
        let mut inbound = self.inbound.lock().unwrap();
        for task in job.derive_tasks(segment_count) {
            inbound.push_back(task);
        }
        debug!(job = %job.id(), tasks = segment_count, "job submitted");
    }

    pub fn submit_task(&self, task: Task) {
        self.inbound.lock().unwrap().push_back(task);
    }

    /// Evaluate and route one task; returns the resource whose queue it
    /// landed on. Decisions are synchronous and never fail back to the
    /// submitter: worst case the task routes to a less optimal resource.
    pub fn dispatch_one(&self, mut task: Task) -> ResourceId {
        let start = Instant::now();
        self.chain.evaluate(&mut task);

        let label = task.label().unwrap_or(ResourceLabel::Unconstrained);
        let placed_on = match label {
            ResourceLabel::Pinned(id) => match self.resources.get(id) {
                Ok(handle) => handle.id(),
                Err(e) => {
                    // Pinned resource disappeared between labeling and
                    // routing; fall back to the CPU queue.
                    warn!(resource = %id, error = %e, "pinned resource gone, routing to cpu");
                    ResourceId::Cpu
                }
            },
            ResourceLabel::Unconstrained => self.least_loaded(),
        };

        self.queue(placed_on).push(task);
        self.metrics.write().unwrap().record(
            placed_on,
            label == ResourceLabel::Unconstrained,
            start.elapsed(),
        );
        placed_on
    }

    /// Dispatch everything currently queued; returns how many tasks moved.
    pub fn drain(&self) -> usize {
        let mut dispatched = 0;
        loop {
            let task = self.inbound.lock().unwrap().pop_front();
            match task {
                Some(task) => {
                    self.dispatch_one(task);
                    dispatched += 1;
                }
                None => break,
            }
        }
        dispatched
    }

    /// Run the dispatch loop until shutdown is signaled.
    pub fn run(&self) {
        info!(passes = self.chain.len(), "dispatcher starting");
        while !self.shutdown.load(Ordering::Relaxed) {
            if self.drain() == 0 {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
        info!("dispatcher stopped");
    }

    pub fn shutdown(&self) {
        info!("dispatcher shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// The execution queue for `resource` (created on first use).
    pub fn queue(&self, resource: ResourceId) -> Arc<TaskQueue> {
        if let Some(queue) = self.queues.read().unwrap().get(&resource) {
            return Arc::clone(queue);
        }
        let mut queues = self.queues.write().unwrap();
        Arc::clone(queues.entry(resource).or_default())
    }

    pub fn queue_depth(&self, resource: ResourceId) -> usize {
        self.queues
            .read()
            .unwrap()
            .get(&resource)
            .map(|q| q.depth())
            .unwrap_or(0)
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Least-loaded placement for unconstrained tasks: shortest queue wins,
    /// ties broken by registration order (CPU first, then device order).
    fn least_loaded(&self) -> ResourceId {
        let mut best = ResourceId::Cpu;
        let mut best_depth = usize::MAX;
        for handle in self.resources.all() {
            let depth = self.queue_depth(handle.id());
            if depth < best_depth {
                best = handle.id();
                best_depth = depth;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quiver_core::{keys, ConfigRegistry, ConfigValue};

    use super::*;
    use crate::job::Job;
    use crate::selector::FlatSearchPass;
    use crate::task::TaskKind;

    fn registry_with(enable: bool, threshold: i64, devices: Vec<u32>) -> ConfigRegistry {
        let registry = ConfigRegistry::new();
        registry.register(keys::GPU_ENABLE, ConfigValue::Bool(enable));
        registry.register(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(threshold));
        registry.register(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(devices));
        registry
    }

    fn dispatcher(enable: bool, threshold: i64, devices: Vec<u32>) -> Dispatcher {
        let registry = registry_with(enable, threshold, devices);
        let resources = ResourceManager::new(&registry);
        resources.enumerate().unwrap();

        let mut chain = PassChain::new();
        chain
            .register(FlatSearchPass::new(&registry, &resources))
            .unwrap();
        Dispatcher::new(chain, resources).unwrap()
    }

    #[test]
    fn new_rejects_missing_cpu() {
        let registry = registry_with(true, 100, vec![0]);
        let resources = ResourceManager::new(&registry);
        // enumerate() not called: no cpu registered.
        let result = Dispatcher::new(PassChain::new(), resources);
        assert!(matches!(result, Err(SchedError::NoCpuResource)));
    }

    #[test]
    fn pinned_task_lands_on_its_resource_queue() {
        let d = dispatcher(true, 100, vec![0, 1]);

        let placed = d.dispatch_one(Task::new(TaskKind::Search, Job::search(500)));
        assert_eq!(placed, ResourceId::Gpu(0));
        assert_eq!(d.queue_depth(ResourceId::Gpu(0)), 1);
        assert_eq!(d.queue_depth(ResourceId::Cpu), 0);
    }

    #[test]
    fn unconstrained_goes_to_least_loaded_queue() {
        let d = dispatcher(true, 100, vec![0]);

        // Build-index tasks don't match the flat search pass.
        let placed = d.dispatch_one(Task::new(TaskKind::BuildIndex, Job::build_index()));
        assert_eq!(placed, ResourceId::Cpu, "empty queues tie-break to cpu");

        // Load the cpu queue; the next unconstrained task moves to the gpu.
        d.dispatch_one(Task::new(TaskKind::Search, Job::search(1)));
        let placed = d.dispatch_one(Task::new(TaskKind::BuildIndex, Job::build_index()));
        assert_eq!(placed, ResourceId::Gpu(0));
    }

    #[test]
    fn submit_and_drain_routes_all_tasks() {
        let d = dispatcher(true, 100, vec![0, 1]);

        let job = Job::search(200);
        d.submit(&job, 4);
        assert_eq!(d.drain(), 4);

        // Round-robin split across both devices.
        assert_eq!(d.queue_depth(ResourceId::Gpu(0)), 2);
        assert_eq!(d.queue_depth(ResourceId::Gpu(1)), 2);

        let metrics = d.metrics();
        assert_eq!(metrics.decisions, 4);
        assert_eq!(metrics.tasks_dispatched["gpu0"], 2);
        assert_eq!(metrics.tasks_dispatched["gpu1"], 2);
    }

    #[test]
    fn execution_side_pops_in_fifo_order() {
        let d = dispatcher(false, 100, vec![]);

        let job = Job::search(50);
        d.submit(&job, 2);
        d.drain();

        let queue = d.queue(ResourceId::Cpu);
        let first = queue.pop().unwrap();
        assert_eq!(first.job().id(), job.id());
        assert!(queue.pop().is_some());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn run_loop_exits_on_shutdown() {
        let d = Arc::new(dispatcher(true, 100, vec![0]));

        let runner = {
            let d = Arc::clone(&d);
            std::thread::spawn(move || d.run())
        };

        d.submit(&Job::search(500), 1);
        // Give the loop a tick to pick the task up.
        for _ in 0..100 {
            if d.metrics().decisions == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        d.shutdown();
        runner.join().unwrap();

        assert_eq!(d.metrics().decisions, 1);
        assert_eq!(d.queue_depth(ResourceId::Gpu(0)), 1);
    }
}
