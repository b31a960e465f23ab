//! Test fixtures for capq.
//!
//! - [`ParentConfig`]: builds the configuration of one managed parent.
//! - [`ScriptedPolicy`]: a management policy that replays planned change
//!   batches, records every call and can be told to fail.
//! - [`StaticQueue`]: a queue of any kind that is not auto-created, for kind
//!   checks.
//!
//! Helpers panic on invalid paths or failed construction.

mod config;
mod policy;
mod queue;

use std::sync::Arc;

use capq_capacity::Resource;
use capq_id::QueuePath;
use capq_queues::{InMemorySchedulerContext, ManagedParentQueue, PolicyRegistry, SchedulerConfig};

pub use config::ParentConfig;
pub use policy::{PolicyCall, ScriptedPolicy, SCRIPTED};
pub use queue::StaticQueue;

/// Cluster used by most tests: 10 GiB and 10 vcores.
pub const CLUSTER: Resource = Resource::new(10_240, 10);

/// A context over `config` with [`CLUSTER`] resources.
pub fn context(config: SchedulerConfig) -> Arc<InMemorySchedulerContext> {
    InMemorySchedulerContext::builder(config)
        .cluster_resource(CLUSTER)
        .build()
}

/// A context whose registry also offers `policy` under [`SCRIPTED`].
pub fn context_with_policy(
    config: SchedulerConfig,
    policy: &Arc<ScriptedPolicy>,
) -> Arc<InMemorySchedulerContext> {
    let registry = PolicyRegistry::with_builtin();
    policy.install(&registry);
    InMemorySchedulerContext::builder(config)
        .cluster_resource(CLUSTER)
        .policy_registry(registry)
        .build()
}

/// Creates the managed parent at `path` below root, panicking on failure.
pub fn managed_parent(context: Arc<InMemorySchedulerContext>, path: &str) -> Arc<ManagedParentQueue> {
    let path = QueuePath::parse(path).expect("valid queue path");
    ManagedParentQueue::new_under_root(context, path).expect("managed parent is created")
}
