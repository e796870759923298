//! Execution resource registry.
//!
//! Resources are enumerated once at startup from configuration and looked up
//! by identity during scheduling. The GPU set is config-driven: the manager
//! subscribes to the device-list key and reseeds on change, so lookups always
//! see a consistent snapshot while membership may differ between decisions.

use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use quiver_core::{keys, ConfigObserver, ConfigRegistry, ConfigSubscription};

use crate::error::SchedError;

/// Identity of a compute resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceId {
    Cpu,
    Gpu(u32),
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Cpu => write!(f, "cpu"),
            ResourceId::Gpu(device) => write!(f, "gpu{}", device),
        }
    }
}

/// Read-only snapshot handle to a resource, usable for task placement. The
/// scheduler never mutates resource state through it; busy/idle bookkeeping
/// belongs to the dispatcher's execution side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    id: ResourceId,
}

impl ResourceHandle {
    pub fn new(id: ResourceId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

/// Registry of available execution resources: at most one CPU resource plus
/// an ordered, possibly empty set of GPU resources.
pub struct ResourceManager {
    registry: ConfigRegistry,
    cpu: RwLock<Option<ResourceHandle>>,
    gpus: RwLock<Vec<ResourceHandle>>,
    subscription: Mutex<Option<ConfigSubscription>>,
}

impl ResourceManager {
    pub fn new(registry: &ConfigRegistry) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            cpu: RwLock::new(None),
            gpus: RwLock::new(Vec::new()),
            subscription: Mutex::new(None),
        })
    }

    /// Enumerate resources from the registry: the CPU resource plus one GPU
    /// resource per configured search device, and subscribe for device-list
    /// changes. Fails if the device-list key was never registered.
    pub fn enumerate(self: &Arc<Self>) -> Result<(), SchedError> {
        *self.cpu.write().unwrap() = Some(ResourceHandle::new(ResourceId::Cpu));

        let devices = self.registry.get_int_list(keys::GPU_SEARCH_DEVICES)?;
        self.reseed(&devices);

        let observer: Arc<dyn ConfigObserver> = Arc::clone(self) as Arc<dyn ConfigObserver>;
        let sub = self.registry.subscribe(keys::GPU_SEARCH_DEVICES, &observer)?;
        *self.subscription.lock().unwrap() = Some(sub);

        info!(devices = ?devices, "resources enumerated");
        Ok(())
    }

    /// Startup validation: a scheduler without a CPU resource could stall
    /// tasks indefinitely, so the absence is fatal here rather than per-task.
    pub fn validate(&self) -> Result<(), SchedError> {
        if self.cpu.read().unwrap().is_none() {
            return Err(SchedError::NoCpuResource);
        }
        Ok(())
    }

    /// The single CPU resource.
    pub fn cpu(&self) -> Result<ResourceHandle, SchedError> {
        self.cpu.read().unwrap().ok_or(SchedError::NoCpuResource)
    }

    /// The GPU resource for `device` within the current device list.
    pub fn gpu(&self, device: u32) -> Result<ResourceHandle, SchedError> {
        self.gpus
            .read()
            .unwrap()
            .iter()
            .find(|h| h.id() == ResourceId::Gpu(device))
            .copied()
            .ok_or_else(|| SchedError::ResourceNotFound(format!("gpu{}", device)))
    }

    pub fn get(&self, id: ResourceId) -> Result<ResourceHandle, SchedError> {
        match id {
            ResourceId::Cpu => self.cpu(),
            ResourceId::Gpu(device) => self.gpu(device),
        }
    }

    /// Ordered snapshot of the currently configured GPU device ids. Callers
    /// sizing a cursor from this must re-read it each decision; the list may
    /// shrink between calls.
    pub fn list_devices(&self) -> Vec<u32> {
        self.gpus
            .read()
            .unwrap()
            .iter()
            .filter_map(|h| match h.id() {
                ResourceId::Gpu(device) => Some(device),
                ResourceId::Cpu => None,
            })
            .collect()
    }

    /// All resources in placement order: CPU first, then GPUs in list order.
    pub fn all(&self) -> Vec<ResourceHandle> {
        let mut handles = Vec::new();
        if let Some(cpu) = *self.cpu.read().unwrap() {
            handles.push(cpu);
        }
        handles.extend(self.gpus.read().unwrap().iter().copied());
        handles
    }

    fn reseed(&self, devices: &[u32]) {
        let handles: Vec<ResourceHandle> = devices
            .iter()
            .map(|&device| ResourceHandle::new(ResourceId::Gpu(device)))
            .collect();
        *self.gpus.write().unwrap() = handles;
        debug!(devices = ?devices, "gpu resource set reseeded");
    }
}

impl ConfigObserver for ResourceManager {
    fn config_update(&self, key: &str) {
        if key != keys::GPU_SEARCH_DEVICES {
            return;
        }
        match self.registry.get_int_list(key) {
            Ok(devices) => self.reseed(&devices),
            Err(e) => warn!(key, error = %e, "ignoring device list update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use quiver_core::ConfigValue;

    use super::*;

    fn seeded_registry(devices: Vec<u32>) -> ConfigRegistry {
        let registry = ConfigRegistry::new();
        registry.register(keys::GPU_ENABLE, ConfigValue::Bool(true));
        registry.register(keys::GPU_SEARCH_THRESHOLD, ConfigValue::Int(100));
        registry.register(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(devices));
        registry
    }

    #[test]
    fn enumerate_and_lookup() {
        let registry = seeded_registry(vec![0, 1]);
        let resources = ResourceManager::new(&registry);
        resources.enumerate().unwrap();

        assert_eq!(resources.cpu().unwrap().id(), ResourceId::Cpu);
        assert_eq!(resources.gpu(1).unwrap().id(), ResourceId::Gpu(1));
        assert_eq!(resources.list_devices(), vec![0, 1]);
        assert_eq!(resources.all().len(), 3);
    }

    #[test]
    fn unknown_device_is_resource_not_found() {
        let registry = seeded_registry(vec![0]);
        let resources = ResourceManager::new(&registry);
        resources.enumerate().unwrap();

        assert!(matches!(
            resources.gpu(7),
            Err(SchedError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn validate_requires_cpu() {
        let registry = seeded_registry(vec![]);
        let resources = ResourceManager::new(&registry);
        assert!(matches!(resources.validate(), Err(SchedError::NoCpuResource)));

        resources.enumerate().unwrap();
        assert!(resources.validate().is_ok());
    }

    #[test]
    fn device_list_reseeds_on_config_change() {
        let registry = seeded_registry(vec![0, 1]);
        let resources = ResourceManager::new(&registry);
        resources.enumerate().unwrap();

        registry
            .set(keys::GPU_SEARCH_DEVICES, ConfigValue::IntList(vec![2]))
            .unwrap();

        assert_eq!(resources.list_devices(), vec![2]);
        assert!(resources.gpu(0).is_err());
        assert_eq!(resources.gpu(2).unwrap().id(), ResourceId::Gpu(2));
    }

    #[test]
    fn enumerate_without_device_key_fails() {
        let registry = ConfigRegistry::new();
        let resources = ResourceManager::new(&registry);
        assert!(resources.enumerate().is_err());
    }
}
