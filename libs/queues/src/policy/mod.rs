//! Queue management policies.
//!
//! A policy decides how much capacity each auto-created leaf of a managed
//! parent holds. The parent drives it through a fixed protocol:
//!
//! 1. `init` once, or `reinitialize` on every parent reinitialization;
//! 2. `compute_queue_management_changes` proposes per-leaf changes;
//! 3. the parent validates and applies the whole batch;
//! 4. `commit_queue_management_changes` records what was applied.
//!
//! Policies never call back into the parent. They receive a
//! [`ParentSnapshot`] taken while the parent's lock is held, and keep their
//! own state behind their own lock.

mod guaranteed_or_zero;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use capq_capacity::{QueueCapacities, Resource};
use capq_id::QueuePath;
use parking_lot::RwLock;
use thiserror::Error;

use crate::context::SchedulerContext;
use crate::error::{QueueError, QueueResult};
use crate::leaf::AutoCreatedLeafQueue;
use crate::queue::QueueNode;
use crate::template::LeafQueueTemplate;

pub use guaranteed_or_zero::{GuaranteedOrZeroCapacityPolicy, GUARANTEED_OR_ZERO};

/// Internal policy failures. Wrapped into [`QueueError::Reconciliation`] by
/// the parent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A pass was requested before `init`.
    #[error("policy has not been initialized")]
    NotInitialized,

    /// The leaf is not a child of the parent the policy manages.
    #[error("queue {0} is not managed by this policy")]
    UnknownLeaf(String),

    /// The policy's bookkeeping disagrees with the parent.
    #[error("policy state is inconsistent: {0}")]
    Inconsistent(String),
}

/// The state of a managed parent as seen by its policy.
#[derive(Debug, Clone)]
pub struct ParentSnapshot {
    pub queue_path: QueuePath,
    pub capacities: QueueCapacities,
    pub template: Arc<LeafQueueTemplate>,
    pub children: Vec<Arc<AutoCreatedLeafQueue>>,
    pub cluster_resource: Resource,
}

impl ParentSnapshot {
    pub fn child(&self, name: &str) -> Option<&Arc<AutoCreatedLeafQueue>> {
        self.children.iter().find(|c| c.queue_name() == name)
    }
}

/// What a [`QueueManagementChange`] does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    /// Replace the target leaf's capacities with the proposed ones.
    UpdateQueue,
}

/// A proposed change to one auto-created leaf.
#[derive(Debug, Clone)]
pub struct QueueManagementChange {
    queue: Arc<dyn QueueNode>,
    action: QueueAction,
    updated_template: LeafQueueTemplate,
}

impl QueueManagementChange {
    pub fn new(
        queue: Arc<dyn QueueNode>,
        action: QueueAction,
        updated_template: LeafQueueTemplate,
    ) -> Self {
        Self {
            queue,
            action,
            updated_template,
        }
    }

    /// An [`QueueAction::UpdateQueue`] change.
    pub fn update_queue(queue: Arc<dyn QueueNode>, updated_template: LeafQueueTemplate) -> Self {
        Self::new(queue, QueueAction::UpdateQueue, updated_template)
    }

    pub fn queue(&self) -> &Arc<dyn QueueNode> {
        &self.queue
    }

    pub fn action(&self) -> QueueAction {
        self.action
    }

    pub fn updated_template(&self) -> &LeafQueueTemplate {
        &self.updated_template
    }
}

/// Contract between a managed parent and its capacity policy.
pub trait QueueManagementPolicy: Send + Sync + fmt::Debug {
    /// Registry name of the policy.
    fn name(&self) -> &str;

    /// Binds the policy to its parent.
    fn init(&self, context: &dyn SchedulerContext, parent: &ParentSnapshot)
        -> Result<(), PolicyError>;

    /// Clears per-pass state and refreshes template-derived values. Committed
    /// bookkeeping is kept.
    fn reinitialize(
        &self,
        context: &dyn SchedulerContext,
        parent: &ParentSnapshot,
    ) -> Result<(), PolicyError>;

    /// Proposes capacity changes for the parent's leaves.
    fn compute_queue_management_changes(
        &self,
        parent: &ParentSnapshot,
    ) -> Result<Vec<QueueManagementChange>, PolicyError>;

    /// Template to apply to a leaf that was just added to the parent.
    fn initial_leaf_queue_configuration(
        &self,
        parent: &ParentSnapshot,
        leaf: &AutoCreatedLeafQueue,
    ) -> Result<LeafQueueTemplate, PolicyError>;

    /// Records changes that were applied to the leaves.
    fn commit_queue_management_changes(
        &self,
        changes: &[QueueManagementChange],
    ) -> Result<(), PolicyError>;

    /// Rebuilds anything cached from the template out of the parent's
    /// current template and capacities. Called whenever the parent replaces
    /// its template.
    fn update_template_absolute_capacities(
        &self,
        parent: &ParentSnapshot,
    ) -> Result<(), PolicyError>;
}

/// Builds a fresh policy instance.
pub type PolicyFactory = Arc<dyn Fn() -> Arc<dyn QueueManagementPolicy> + Send + Sync>;

/// Management policies available by name.
pub struct PolicyRegistry {
    factories: RwLock<BTreeMap<String, PolicyFactory>>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
        }
    }

    /// A registry holding the built-in policies.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(GUARANTEED_OR_ZERO, || {
            Arc::new(GuaranteedOrZeroCapacityPolicy::new())
        });
        registry
    }

    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn QueueManagementPolicy> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Instantiates the policy registered as `name`.
    pub fn create(&self, name: &str) -> QueueResult<Arc<dyn QueueManagementPolicy>> {
        let factory = self.factories.read().get(name).cloned().ok_or_else(|| {
            QueueError::config(format!("unknown queue management policy '{name}'"))
        })?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = PolicyRegistry::with_builtin();
        assert!(registry.contains(GUARANTEED_OR_ZERO));

        let policy = registry.create(GUARANTEED_OR_ZERO).unwrap();
        assert_eq!(policy.name(), GUARANTEED_OR_ZERO);
    }

    #[test]
    fn test_unknown_policy_is_config_error() {
        let err = PolicyRegistry::new().create("fair-share").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("fair-share"));
    }

    #[test]
    fn test_factories_build_fresh_instances() {
        let registry = PolicyRegistry::with_builtin();
        let a = registry.create(GUARANTEED_OR_ZERO).unwrap();
        let b = registry.create(GUARANTEED_OR_ZERO).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
