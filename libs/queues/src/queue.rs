//! Queue node capability interface.
//!
//! Queues are identified by an explicit [`QueueKind`] tag rather than by
//! their concrete type; behaviour that only some kinds support is gated by the
//! capability predicates on the tag.

use std::fmt;
use std::sync::Arc;

use capq_capacity::{QueueCapacities, Resource};
use capq_id::QueuePath;
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;
use crate::leaf::AutoCreatedLeafQueue;
use crate::parent::ManagedParentQueue;

/// Kind tag carried by every queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Statically configured parent.
    Parent,
    /// Statically configured leaf.
    Leaf,
    /// Parent that auto-creates its leaf children.
    ManagedParent,
    /// Leaf created on demand by a managed parent.
    AutoCreatedLeaf,
}

impl QueueKind {
    /// Whether queues of this kind create children on demand.
    pub fn supports_auto_creation(&self) -> bool {
        matches!(self, Self::ManagedParent)
    }

    /// Whether queues of this kind were created on demand.
    pub fn is_auto_created(&self) -> bool {
        matches!(self, Self::AutoCreatedLeaf)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Leaf => "leaf",
            Self::ManagedParent => "managed_parent",
            Self::AutoCreatedLeaf => "auto_created_leaf",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queue as freshly read from configuration, handed to `reinitialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQueue {
    pub path: QueuePath,
    pub kind: QueueKind,
}

impl ParsedQueue {
    pub fn new(path: QueuePath, kind: QueueKind) -> Self {
        Self { path, kind }
    }

    pub fn managed_parent(path: QueuePath) -> Self {
        Self::new(path, QueueKind::ManagedParent)
    }

    pub fn auto_created_leaf(path: QueuePath) -> Self {
        Self::new(path, QueueKind::AutoCreatedLeaf)
    }
}

/// Capabilities shared by every queue in the tree.
pub trait QueueNode: Send + Sync + fmt::Debug {
    fn queue_path(&self) -> &QueuePath;

    /// Short name: the last path segment.
    fn queue_name(&self) -> &str {
        self.queue_path().leaf_name()
    }

    fn kind(&self) -> QueueKind;

    /// Snapshot of the queue's capacities.
    fn queue_capacities(&self) -> QueueCapacities;

    /// The queue's parent, if it is still alive.
    fn parent(&self) -> Option<Arc<ManagedParentQueue>>;

    /// Re-reads the queue's settings from freshly parsed configuration.
    fn reinitialize(&self, parsed: &ParsedQueue, cluster_resource: &Resource) -> QueueResult<()>;

    /// Recomputes effective resources against a new cluster resource.
    fn update_cluster_resource(&self, cluster_resource: &Resource);

    /// Downcast to an auto-created leaf; `None` for every other kind.
    fn as_auto_created_leaf(self: Arc<Self>) -> Option<Arc<AutoCreatedLeafQueue>> {
        None
    }
}
