//! # capq-queues
//!
//! Managed parent queues that create their leaf children on demand.
//!
//! A [`ManagedParentQueue`] owns a [`LeafQueueTemplate`], the set of its
//! [`AutoCreatedLeafQueue`] children and a [`QueueManagementPolicy`]. Leaves
//! start with zero capacity; the policy grants and reclaims capacity through
//! reconciliation passes of the form compute → validate → apply → commit.
//!
//! ## Invariants
//!
//! - A new or reinitialized leaf has capacity 0 for every node label.
//! - With `fail-on-exceeding-parent-capacity` set, a leaf is only admitted if
//!   the template's absolute capacity plus its siblings' stays within the
//!   parent's absolute capacity, and reinitialization fails if the children's
//!   capacities sum to more than the parent's.
//! - A change batch is validated in full before any leaf is touched, and the
//!   policy only sees a commit for batches that were applied.
//! - Capacity fractions are never NaN, even while the cluster has no
//!   resources yet.
//!
//! ## Example
//!
//! ```
//! use capq_capacity::{Resource, NO_LABEL};
//! use capq_id::QueuePath;
//! use capq_queues::{InMemorySchedulerContext, ManagedParentQueue, QueueNode, SchedulerConfig};
//!
//! let config = SchedulerConfig::from_toml_str(r#"
//! [[queues]]
//! path = "root.users"
//! capacity = 50
//!
//! [queues.leaf-queue-template]
//! capacity = 20
//! "#).unwrap();
//! let ctx = InMemorySchedulerContext::builder(config)
//!     .cluster_resource(Resource::new(10_240, 10))
//!     .build();
//!
//! let users = ManagedParentQueue::new_under_root(ctx, QueuePath::parse("root.users").unwrap()).unwrap();
//! let alice = users.auto_create_leaf_queue("alice").unwrap();
//! assert_eq!(alice.queue_capacities().capacity(NO_LABEL), 0.2);
//! ```

pub mod app;
pub mod config;
pub mod context;
mod error;
pub mod leaf;
pub mod parent;
pub mod policy;
pub mod queue;
pub mod template;
pub mod worker;

pub use app::{Application, ApplicationState};
pub use config::{CapacityConfigType, SchedulerConfig};
pub use context::{InMemorySchedulerContext, SchedulerContext};
pub use error::{QueueError, QueueResult};
pub use leaf::AutoCreatedLeafQueue;
pub use parent::ManagedParentQueue;
pub use policy::{
    GuaranteedOrZeroCapacityPolicy, ParentSnapshot, PolicyError, PolicyRegistry, QueueAction,
    QueueManagementChange, QueueManagementPolicy,
};
pub use queue::{ParsedQueue, QueueKind, QueueNode};
pub use template::{LeafQueueConfig, LeafQueueTemplate};
pub use worker::{EditPassStats, QueueManagementWorker};
