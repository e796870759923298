use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::registry::{keys, ConfigRegistry, ConfigValue};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

/// Parse a comma-separated device list, e.g. "0,1,2". Invalid entries are skipped.
fn parse_devices(value: &str) -> Vec<u32> {
    value
        .split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .collect()
}

fn env_devices(key: &str, default: &[u32]) -> Vec<u32> {
    match env::var(key) {
        Ok(v) => parse_devices(&v),
        Err(_) => default.to_vec(),
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub gpu: GpuConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            storage: StorageConfig::from_env(),
            gpu: GpuConfig::from_env(),
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  storage: data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  gpu:     enable={}, search_threshold={}, search_devices={:?}",
            self.gpu.enable,
            self.gpu.search_threshold,
            self.gpu.search_devices
        );
    }

    /// Register the live-tunable parameters with a [`ConfigRegistry`].
    ///
    /// Called once at startup; from then on the registry is the source of
    /// truth for these keys and this static config is only a seed.
    pub fn seed_registry(&self, registry: &ConfigRegistry) {
        registry.register(keys::GPU_ENABLE, ConfigValue::Bool(self.gpu.enable));
        registry.register(
            keys::GPU_SEARCH_THRESHOLD,
            ConfigValue::Int(self.gpu.search_threshold as i64),
        );
        registry.register(
            keys::GPU_SEARCH_DEVICES,
            ConfigValue::IntList(self.gpu.search_devices.clone()),
        );
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env() -> Self {
        Self {
            data_dir: PathBuf::from(env_or("DATA_DIR", "data")),
        }
    }
}

// ── GPU routing ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Whether search tasks may be routed to GPU devices at all.
    pub enable: bool,
    /// Queries-per-job threshold: jobs with `nq` below this stay on CPU.
    pub search_threshold: u64,
    /// Ordered GPU device ids eligible for search.
    pub search_devices: Vec<u32>,
}

impl GpuConfig {
    fn from_env() -> Self {
        Self {
            enable: env_bool("GPU_ENABLE", false),
            search_threshold: env_u64("GPU_SEARCH_THRESHOLD", 100),
            search_devices: env_devices("GPU_SEARCH_DEVICES", &[0]),
        }
    }
}
