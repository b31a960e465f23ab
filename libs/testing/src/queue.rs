use std::sync::Arc;

use capq_capacity::{QueueCapacities, Resource};
use capq_id::QueuePath;
use capq_queues::{ManagedParentQueue, ParsedQueue, QueueKind, QueueNode, QueueResult};

/// A queue that is not auto-created. Optionally claims a managed parent.
#[derive(Debug)]
pub struct StaticQueue {
    path: QueuePath,
    kind: QueueKind,
    parent: Option<Arc<ManagedParentQueue>>,
}

impl StaticQueue {
    pub fn new(path: &str, kind: QueueKind) -> Arc<Self> {
        Arc::new(Self {
            path: QueuePath::parse(path).expect("valid queue path"),
            kind,
            parent: None,
        })
    }

    /// A plain leaf claiming `parent` as its parent.
    pub fn leaf_of(parent: &Arc<ManagedParentQueue>, name: &str) -> Arc<Self> {
        Arc::new(Self {
            path: parent.queue_path().child(name).expect("valid queue name"),
            kind: QueueKind::Leaf,
            parent: Some(Arc::clone(parent)),
        })
    }
}

impl QueueNode for StaticQueue {
    fn queue_path(&self) -> &QueuePath {
        &self.path
    }

    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn queue_capacities(&self) -> QueueCapacities {
        QueueCapacities::new()
    }

    fn parent(&self) -> Option<Arc<ManagedParentQueue>> {
        self.parent.clone()
    }

    fn reinitialize(&self, _parsed: &ParsedQueue, _cluster_resource: &Resource) -> QueueResult<()> {
        Ok(())
    }

    fn update_cluster_resource(&self, _cluster_resource: &Resource) {}
}
