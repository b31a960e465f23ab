//! Guaranteed-or-zero capacity policy.
//!
//! Every auto-created leaf either holds exactly the template capacity
//! (*active*) or zero (*inactive*). A leaf is activated when it has pending
//! applications and the parent still has room for one more template share in
//! every partition; it is deactivated once it holds no applications.
//! Pending leaves are activated in the order their earliest application was
//! submitted.

use std::collections::BTreeSet;
use std::sync::Arc;

use capq_capacity::{LabelCapacities, QueueCapacities};
use capq_id::{ApplicationId, QueuePath};
use parking_lot::RwLock;
use tracing::debug;

use super::{ParentSnapshot, PolicyError, QueueManagementChange, QueueManagementPolicy};
use crate::context::SchedulerContext;
use crate::leaf::AutoCreatedLeafQueue;
use crate::queue::QueueNode;
use crate::template::LeafQueueTemplate;

/// Registry name of [`GuaranteedOrZeroCapacityPolicy`].
pub const GUARANTEED_OR_ZERO: &str = "guaranteed-or-zero";

/// Slack for float accumulation when checking remaining room.
const EPSILON: f32 = 1e-6;

#[derive(Debug, Default)]
struct PolicyState {
    initialized: bool,
    parent: Option<QueuePath>,

    /// Template capacities with absolute values under the parent.
    template_capacities: QueueCapacities,

    /// Leaves committed as holding the template capacity.
    active: BTreeSet<String>,
}

impl PolicyState {
    fn ensure_parent(&self, parent: &ParentSnapshot) -> Result<(), PolicyError> {
        if !self.initialized {
            return Err(PolicyError::NotInitialized);
        }
        match &self.parent {
            Some(path) if path == &parent.queue_path => Ok(()),
            Some(path) => Err(PolicyError::Inconsistent(format!(
                "policy is bound to {path}, not {}",
                parent.queue_path
            ))),
            None => Err(PolicyError::NotInitialized),
        }
    }

    /// Whether `active_count` active leaves plus one more still fit in every
    /// partition of the parent.
    fn has_room(&self, parent: &QueueCapacities, active_count: usize) -> bool {
        self.template_capacities.iter().all(|(label, template)| {
            let used = active_count as f32 * template.absolute_capacity;
            let available = parent.absolute_capacity(label) - used;
            available + EPSILON >= template.absolute_capacity
        })
    }

    fn refresh_template(&mut self, parent: &ParentSnapshot) {
        let mut capacities = parent.template.queue_capacities().clone();
        capacities.update_absolute_capacities(&parent.capacities);
        self.template_capacities = capacities;
    }
}

fn is_active(capacities: &QueueCapacities) -> bool {
    capacities.iter().any(|(_, caps)| caps.capacity > 0.0)
}

/// Capacities of an inactive leaf: zero guaranteed, template maximum.
fn zero_capacities(template: &QueueCapacities) -> QueueCapacities {
    template
        .iter()
        .map(|(label, caps)| {
            (
                label.to_string(),
                LabelCapacities {
                    capacity: 0.0,
                    absolute_capacity: 0.0,
                    ..*caps
                },
            )
        })
        .collect()
}

/// Leaves hold either the template capacity or nothing.
#[derive(Debug, Default)]
pub struct GuaranteedOrZeroCapacityPolicy {
    state: RwLock<PolicyState>,
}

impl GuaranteedOrZeroCapacityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the leaves currently committed as active.
    pub fn active_leaves(&self) -> BTreeSet<String> {
        self.state.read().active.clone()
    }
}

impl QueueManagementPolicy for GuaranteedOrZeroCapacityPolicy {
    fn name(&self) -> &str {
        GUARANTEED_OR_ZERO
    }

    fn init(
        &self,
        _context: &dyn SchedulerContext,
        parent: &ParentSnapshot,
    ) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        state.parent = Some(parent.queue_path.clone());
        state.refresh_template(parent);
        // Adopt leaves that already hold capacity, e.g. after a policy swap.
        state.active = parent
            .children
            .iter()
            .filter(|leaf| is_active(&leaf.queue_capacities()))
            .map(|leaf| leaf.queue_name().to_string())
            .collect();
        state.initialized = true;
        Ok(())
    }

    fn reinitialize(
        &self,
        _context: &dyn SchedulerContext,
        parent: &ParentSnapshot,
    ) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        state.ensure_parent(parent)?;
        state.refresh_template(parent);
        let children: BTreeSet<&str> = parent.children.iter().map(|c| c.queue_name()).collect();
        state.active.retain(|name| children.contains(name.as_str()));
        Ok(())
    }

    fn compute_queue_management_changes(
        &self,
        parent: &ParentSnapshot,
    ) -> Result<Vec<QueueManagementChange>, PolicyError> {
        let mut state = self.state.write();
        state.ensure_parent(parent)?;
        state.refresh_template(parent);

        let children: BTreeSet<&str> = parent.children.iter().map(|c| c.queue_name()).collect();
        state.active.retain(|name| children.contains(name.as_str()));

        let mut target = state.active.clone();

        for leaf in &parent.children {
            if target.contains(leaf.queue_name()) && !leaf.has_applications() {
                target.remove(leaf.queue_name());
            }
        }

        let mut waiting: Vec<(ApplicationId, &AutoCreatedLeafQueue)> = parent
            .children
            .iter()
            .filter(|leaf| !target.contains(leaf.queue_name()))
            .filter_map(|leaf| leaf.first_pending_application().map(|id| (id, leaf.as_ref())))
            .collect();
        waiting.sort_by_key(|(id, _)| *id);

        for (_, leaf) in waiting {
            if !state.has_room(&parent.capacities, target.len()) {
                break;
            }
            target.insert(leaf.queue_name().to_string());
        }

        let template_caps = parent.template.queue_capacities();
        let zero_caps = zero_capacities(template_caps);
        let mut changes = Vec::new();

        for leaf in &parent.children {
            let name = leaf.queue_name();
            let activate = target.contains(name);
            let desired = if activate { template_caps } else { &zero_caps };
            let transition = activate != state.active.contains(name);
            if transition || &leaf.queue_capacities() != desired {
                let node: Arc<dyn QueueNode> = leaf.clone();
                changes.push(QueueManagementChange::update_queue(
                    node,
                    parent.template.with_capacities(desired.clone()),
                ));
            }
        }

        debug!(
            queue = %parent.queue_path,
            active = target.len(),
            changes = changes.len(),
            "Computed queue management changes"
        );
        Ok(changes)
    }

    fn initial_leaf_queue_configuration(
        &self,
        parent: &ParentSnapshot,
        leaf: &AutoCreatedLeafQueue,
    ) -> Result<LeafQueueTemplate, PolicyError> {
        let mut state = self.state.write();
        state.ensure_parent(parent)?;
        state.refresh_template(parent);

        let name = leaf.queue_name();
        if parent.child(name).is_none() {
            return Err(PolicyError::UnknownLeaf(leaf.queue_path().to_string()));
        }

        let template_caps = parent.template.queue_capacities();
        let active_count = state.active.iter().filter(|n| n.as_str() != name).count();
        if state.has_room(&parent.capacities, active_count) {
            state.active.insert(name.to_string());
            Ok(parent.template.with_capacities(template_caps.clone()))
        } else {
            state.active.remove(name);
            Ok(parent
                .template
                .with_capacities(zero_capacities(template_caps)))
        }
    }

    fn commit_queue_management_changes(
        &self,
        changes: &[QueueManagementChange],
    ) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        for change in changes {
            let name = change.queue().queue_name().to_string();
            if is_active(change.updated_template().queue_capacities()) {
                state.active.insert(name);
            } else {
                state.active.remove(&name);
            }
        }
        Ok(())
    }

    fn update_template_absolute_capacities(
        &self,
        parent: &ParentSnapshot,
    ) -> Result<(), PolicyError> {
        let mut state = self.state.write();
        state.ensure_parent(parent)?;
        state.refresh_template(parent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::context::InMemorySchedulerContext;
    use crate::parent::ManagedParentQueue;
    use capq_capacity::{Resource, NO_LABEL};
    use std::thread::sleep;
    use std::time::Duration;

    // Parent holds 50% of the cluster; each leaf template is 40% of the
    // parent (20% of the cluster), so two leaves fit and a third does not.
    const CONFIG: &str = r#"
[[queues]]
path = "root.users"
capacity = 50

[queues.leaf-queue-template]
capacity = 40
"#;

    fn setup() -> (Arc<InMemorySchedulerContext>, Arc<ManagedParentQueue>) {
        let ctx = InMemorySchedulerContext::builder(SchedulerConfig::from_toml_str(CONFIG).unwrap())
            .cluster_resource(Resource::new(10_240, 10))
            .build();
        let parent =
            ManagedParentQueue::new_under_root(ctx.clone(), QueuePath::parse("root.users").unwrap())
                .unwrap();
        (ctx, parent)
    }

    fn bound_policy(
        parent: &ManagedParentQueue,
        ctx: &InMemorySchedulerContext,
    ) -> GuaranteedOrZeroCapacityPolicy {
        let policy = GuaranteedOrZeroCapacityPolicy::new();
        policy.init(ctx, &parent.snapshot()).unwrap();
        policy
    }

    #[test]
    fn test_requires_init() {
        let (_ctx, parent) = setup();
        let policy = GuaranteedOrZeroCapacityPolicy::new();

        assert_eq!(
            policy
                .compute_queue_management_changes(&parent.snapshot())
                .unwrap_err(),
            PolicyError::NotInitialized
        );
        assert_eq!(
            policy
                .update_template_absolute_capacities(&parent.snapshot())
                .unwrap_err(),
            PolicyError::NotInitialized
        );
    }

    #[test]
    fn test_initial_configuration_grants_until_full() {
        let (_ctx, parent) = setup();
        let a = parent.auto_create_leaf_queue("a").unwrap();
        let b = parent.auto_create_leaf_queue("b").unwrap();
        let c = parent.auto_create_leaf_queue("c").unwrap();

        assert_eq!(a.queue_capacities().capacity(NO_LABEL), 0.4);
        assert_eq!(b.queue_capacities().capacity(NO_LABEL), 0.4);
        assert_eq!(c.queue_capacities().capacity(NO_LABEL), 0.0);
        assert_eq!(c.queue_capacities().maximum_capacity(NO_LABEL), 1.0);
    }

    #[test]
    fn test_unknown_leaf_rejected() {
        let (ctx, parent) = setup();
        let policy = bound_policy(&parent, &ctx);
        let stranger = AutoCreatedLeafQueue::new(ctx.clone(), "stranger", &parent).unwrap();

        let err = policy
            .initial_leaf_queue_configuration(&parent.snapshot(), &stranger)
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownLeaf(_)));
    }

    #[test]
    fn test_idle_leaves_are_deactivated() {
        let (ctx, parent) = setup();
        let a = parent.auto_create_leaf_queue("a").unwrap();
        let policy = bound_policy(&parent, &ctx);
        assert_eq!(policy.active_leaves(), BTreeSet::from(["a".to_string()]));

        let changes = policy
            .compute_queue_management_changes(&parent.snapshot())
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].updated_template().queue_capacities().capacity(NO_LABEL),
            0.0
        );

        // Nothing moves until the change is committed.
        assert!(policy.active_leaves().contains("a"));
        policy.commit_queue_management_changes(&changes).unwrap();
        assert!(policy.active_leaves().is_empty());
        assert_eq!(a.queue_capacities().capacity(NO_LABEL), 0.4);
    }

    #[test]
    fn test_pending_leaves_activated_in_submission_order() {
        let (ctx, parent) = setup();
        let leaves: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| parent.auto_create_leaf_queue(name).unwrap())
            .collect();

        // Start from an empty parent.
        let policy = bound_policy(&parent, &ctx);
        let changes = policy
            .compute_queue_management_changes(&parent.snapshot())
            .unwrap();
        parent
            .validate_and_apply_queue_management_changes(&changes)
            .unwrap();
        policy.commit_queue_management_changes(&changes).unwrap();
        assert!(policy.active_leaves().is_empty());

        // Application ids order by millisecond.
        leaves[2].submit_application("carol");
        sleep(Duration::from_millis(2));
        leaves[0].submit_application("alice");
        sleep(Duration::from_millis(2));
        leaves[1].submit_application("bob");

        let changes = policy
            .compute_queue_management_changes(&parent.snapshot())
            .unwrap();
        let activated: BTreeSet<String> = changes
            .iter()
            .filter(|c| is_active(c.updated_template().queue_capacities()))
            .map(|c| c.queue().queue_name().to_string())
            .collect();

        assert_eq!(
            activated,
            BTreeSet::from(["c".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_reinitialize_keeps_committed_state() {
        let (ctx, parent) = setup();
        parent.auto_create_leaf_queue("a").unwrap();
        let policy = bound_policy(&parent, &ctx);

        policy.reinitialize(ctx.as_ref(), &parent.snapshot()).unwrap();
        assert_eq!(policy.active_leaves(), BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_bound_to_one_parent() {
        let (ctx, parent) = setup();
        let policy = bound_policy(&parent, &ctx);
        let mut snapshot = parent.snapshot();
        snapshot.queue_path = QueuePath::parse("root.other").unwrap();

        assert!(matches!(
            policy.compute_queue_management_changes(&snapshot),
            Err(PolicyError::Inconsistent(_))
        ));
    }
}
