pub mod config;
pub mod error;
pub mod registry;

pub use config::Config;
pub use error::QuiverError;
pub use registry::{keys, ConfigObserver, ConfigRegistry, ConfigSubscription, ConfigValue};
