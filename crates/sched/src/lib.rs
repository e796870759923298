//! Resource-selection scheduler for search and index-build tasks.
//!
//! Every task submitted to the engine passes through a [`PassChain`] of
//! selector passes; the first applicable pass commits a [`ResourceLabel`]
//! pinning the task to the CPU or one of the configured GPU devices, and the
//! [`Dispatcher`] routes the task to that resource's execution queue.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod metrics;
pub mod resource;
pub mod selector;
pub mod task;

pub use dispatcher::Dispatcher;
pub use error::SchedError;
pub use job::{Job, JobKind};
pub use metrics::DispatchMetrics;
pub use resource::{ResourceHandle, ResourceId, ResourceManager};
pub use selector::{FlatSearchPass, PassChain, SelectorPass};
pub use task::{ResourceLabel, Task, TaskKind};
