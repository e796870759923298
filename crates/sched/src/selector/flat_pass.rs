//! CPU/GPU routing for flat (brute-force) similarity search.
//!
//! Small query batches stay on CPU; batches at or above the configured
//! threshold rotate across the configured GPU devices round-robin. All three
//! knobs are live-tunable through the config registry.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, error, warn};

use quiver_core::{keys, ConfigObserver, ConfigRegistry, ConfigSubscription};

use crate::error::SchedError;
use crate::resource::{ResourceHandle, ResourceManager};
use crate::selector::SelectorPass;
use crate::task::{ResourceLabel, Task, TaskKind};

pub struct FlatSearchPass {
    registry: ConfigRegistry,
    resources: Arc<ResourceManager>,
    /// Cached `gpu.enable`.
    gpu_enable: AtomicBool,
    /// Cached `gpu.search_threshold`. `nq < threshold` routes to CPU.
    threshold: AtomicU64,
    /// Cached `gpu.search_devices`, in configured order.
    devices: RwLock<Vec<u32>>,
    /// Round-robin cursor over `devices`. Monotonic; reduced modulo the
    /// current list length at each use, so list shrinkage cannot push a
    /// selection out of range.
    cursor: AtomicUsize,
    subscriptions: Mutex<Vec<ConfigSubscription>>,
}

impl FlatSearchPass {
    pub fn new(registry: &ConfigRegistry, resources: &Arc<ResourceManager>) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            resources: Arc::clone(resources),
            gpu_enable: AtomicBool::new(false),
            threshold: AtomicU64::new(u64::MAX),
            devices: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    fn reload(&self, key: &str) -> Result<(), SchedError> {
        match key {
            keys::GPU_ENABLE => {
                let enable = self.registry.get_bool(key)?;
                self.gpu_enable.store(enable, Ordering::Relaxed);
            }
            keys::GPU_SEARCH_THRESHOLD => {
                let threshold = self.registry.get_i64(key)?.max(0) as u64;
                self.threshold.store(threshold, Ordering::Relaxed);
            }
            keys::GPU_SEARCH_DEVICES => {
                let devices = self.registry.get_int_list(key)?;
                *self.devices.write().unwrap() = devices;
            }
            _ => {}
        }
        Ok(())
    }

    /// Pick the next GPU in rotation. Falls back to CPU when the device list
    /// is empty or the selected device is no longer registered (fail closed,
    /// never an error surfaced to the submitter).
    fn next_gpu(&self) -> Result<ResourceHandle, SchedError> {
        let devices = self.devices.read().unwrap();
        if devices.is_empty() {
            debug!("gpu device list empty, falling back to cpu");
            return self.resources.cpu();
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % devices.len();
        let device = devices[index];
        drop(devices);

        match self.resources.gpu(device) {
            Ok(handle) => Ok(handle),
            Err(e) => {
                warn!(device, error = %e, "selected gpu no longer registered, using cpu");
                self.resources.cpu()
            }
        }
    }
}

impl SelectorPass for FlatSearchPass {
    fn name(&self) -> &str {
        "flat_search"
    }

    fn init(self: Arc<Self>) -> Result<(), SchedError> {
        let watched = [
            keys::GPU_ENABLE,
            keys::GPU_SEARCH_THRESHOLD,
            keys::GPU_SEARCH_DEVICES,
        ];

        for key in watched {
            self.reload(key)?;
        }

        let observer: Arc<dyn ConfigObserver> = Arc::clone(&self) as Arc<dyn ConfigObserver>;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for key in watched {
            subscriptions.push(self.registry.subscribe(key, &observer)?);
        }
        Ok(())
    }

    fn run(&self, task: &mut Task) -> bool {
        if task.kind() != TaskKind::Search {
            return false;
        }

        let nq = task.job().nq();
        let resource = if !self.gpu_enable.load(Ordering::Relaxed) {
            debug!(nq, "gpu disabled, routing search to cpu");
            self.resources.cpu()
        } else if nq < self.threshold.load(Ordering::Relaxed) {
            debug!(nq, "nq below gpu search threshold, routing to cpu");
            self.resources.cpu()
        } else {
            self.next_gpu()
        };

        match resource {
            Ok(handle) => {
                debug!(nq, resource = %handle.id(), "flat search routed");
                task.pin(ResourceLabel::Pinned(handle.id()));
                true
            }
            Err(e) => {
                // Only reachable if the cpu resource is gone, which startup
                // validation rules out. Decline and let the chain default.
                error!(error = %e, "flat search pass has no routable resource");
                false
            }
        }
    }
}

impl ConfigObserver for FlatSearchPass {
    fn config_update(&self, key: &str) {
        if let Err(e) = self.reload(key) {
            warn!(key, error = %e, "config update ignored, keeping cached value");
        }
    }
}
