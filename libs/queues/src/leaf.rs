//! Auto-created leaf queues.
//!
//! A leaf starts with zero capacity whatever its template says and only
//! gains capacity through [`AutoCreatedLeafQueue::reinitialize_from_template`]
//! or [`AutoCreatedLeafQueue::merge_capacities`], both driven by the parent's
//! management policy. Reinitialization from configuration resets it to zero.
//!
//! Capacities and applications sit behind separate locks. Neither is ever
//! held while calling into the parent.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use capq_capacity::{LabelCapacities, QueueCapacities, QueueResourceQuotas, Resource, NO_LABEL};
use capq_id::{ApplicationId, QueuePath};
use parking_lot::RwLock;
use tracing::debug;

use crate::app::{Application, ApplicationBook, ApplicationState};
use crate::context::SchedulerContext;
use crate::error::{QueueError, QueueResult};
use crate::parent::ManagedParentQueue;
use crate::queue::{ParsedQueue, QueueKind, QueueNode};
use crate::template::{LeafQueueConfig, LeafQueueTemplate};

#[derive(Debug, Default)]
struct LeafState {
    capacities: QueueCapacities,
    quotas: QueueResourceQuotas,
    config: LeafQueueConfig,
}

/// A leaf queue created on demand under a [`ManagedParentQueue`].
pub struct AutoCreatedLeafQueue {
    path: QueuePath,
    parent: Weak<ManagedParentQueue>,
    context: Arc<dyn SchedulerContext>,
    state: RwLock<LeafState>,
    apps: RwLock<ApplicationBook>,
}

impl std::fmt::Debug for AutoCreatedLeafQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCreatedLeafQueue")
            .field("path", &self.path)
            .field("capacities", &self.state.read().capacities)
            .field("applications", &self.apps.read().len())
            .finish_non_exhaustive()
    }
}

/// Capacities with every label's capacity forced to zero. Maximums come from
/// the template; absolute values are derived from the parent.
fn zero_capacities(template: &LeafQueueTemplate, parent: &QueueCapacities) -> QueueCapacities {
    template
        .queue_capacities()
        .iter()
        .map(|(label, caps)| {
            (
                label.to_string(),
                LabelCapacities::new(0.0, caps.maximum_capacity).under(&parent.get(label)),
            )
        })
        .collect()
}

impl AutoCreatedLeafQueue {
    /// Creates the leaf `name` under `parent` with zero capacity.
    ///
    /// Takes the parent's read lock; must not be called while the parent's
    /// write lock is held.
    pub fn new(
        context: Arc<dyn SchedulerContext>,
        name: &str,
        parent: &Arc<ManagedParentQueue>,
    ) -> QueueResult<Arc<Self>> {
        let path = parent.queue_path().child(name)?;
        let template = parent.leaf_queue_template();
        let parent_capacities = parent.queue_capacities();

        let leaf = Arc::new(Self {
            path,
            parent: Arc::downgrade(parent),
            context,
            state: RwLock::new(LeafState::default()),
            apps: RwLock::new(ApplicationBook::default()),
        });

        {
            let mut state = leaf.state.write();
            state.config = template.leaf_queue_configs(name);
            leaf.set_dynamic_queue_properties(&parent.template_path());
            let zero = zero_capacities(&template, &parent_capacities);
            leaf.merge_locked(&mut state, &zero, &leaf.context.cluster_resource());
        }

        debug!(queue = %leaf.path, "Created auto-created leaf queue");
        Ok(leaf)
    }

    /// Copies the template's node labels onto this leaf when the template
    /// declares more than the default partition.
    pub fn set_dynamic_queue_properties(&self, template_path: &str) {
        let registry = self.context.configured_node_labels();
        let labels: BTreeSet<String> = registry.labels_by_queue(template_path);
        if labels.len() > 1 {
            registry.set_labels_by_queue(self.path.full_path(), labels);
        }
    }

    /// Reinitializes against an explicit template and parent capacities.
    ///
    /// Used by the parent while it holds its own write lock. The leaf's
    /// settings are re-derived from the template and its capacity is reset to
    /// zero.
    pub(crate) fn reinitialize_with(
        &self,
        parsed: &ParsedQueue,
        template: &LeafQueueTemplate,
        parent_capacities: &QueueCapacities,
        cluster_resource: &Resource,
    ) -> QueueResult<()> {
        if parsed.kind != QueueKind::AutoCreatedLeaf {
            return Err(QueueError::config(format!(
                "queue {} is an auto-created leaf and cannot be reinitialized as a {} queue",
                self.path, parsed.kind
            )));
        }
        if parsed.path != self.path {
            return Err(QueueError::config(format!(
                "trying to reinitialize {} from {}",
                self.path, parsed.path
            )));
        }

        let mut state = self.state.write();
        state.config = template.leaf_queue_configs(self.queue_name());
        state.capacities = QueueCapacities::new();
        let zero = zero_capacities(template, parent_capacities);
        self.merge_locked(&mut state, &zero, cluster_resource);
        Ok(())
    }

    /// Grants the capacities of `template` to this leaf.
    ///
    /// Pending applications become schedulable once the leaf holds capacity
    /// in the default partition.
    pub fn reinitialize_from_template(&self, template: &LeafQueueTemplate) -> QueueResult<()> {
        self.validate_configurations(template)?;
        self.merge_capacities(template.queue_capacities());

        if self.state.read().capacities.capacity(NO_LABEL) > 0.0 {
            let activated = self.activate_pending_applications();
            if activated > 0 {
                debug!(queue = %self.path, activated, "Activated pending applications");
            }
        }
        Ok(())
    }

    /// Overwrites the capacities of every label in `capacities` and derives
    /// the effective resources from them. Labels not present are untouched.
    pub fn merge_capacities(&self, capacities: &QueueCapacities) {
        let cluster = self.context.cluster_resource();
        let mut state = self.state.write();
        self.merge_locked(&mut state, capacities, &cluster);
    }

    fn merge_locked(&self, state: &mut LeafState, capacities: &QueueCapacities, cluster: &Resource) {
        for (label, caps) in capacities.iter() {
            state.capacities.set(label, *caps);
            let resource = self.context.partition_resource(label, cluster);
            state
                .quotas
                .set_effective_min_resource(label, resource.multiply(caps.absolute_capacity));
            state
                .quotas
                .set_effective_max_resource(label, resource.multiply(caps.absolute_maximum_capacity));
        }
    }

    /// Checks that every label's capacity in `template` lies in `[0, 1]`.
    pub fn validate_configurations(&self, template: &LeafQueueTemplate) -> QueueResult<()> {
        template
            .queue_capacities()
            .check_capacity_range()
            .map_err(|e| QueueError::dynamic_edit(format!("queue {}: {e}", self.path)))
    }

    pub fn leaf_queue_config(&self) -> LeafQueueConfig {
        self.state.read().config.clone()
    }

    pub fn queue_resource_quotas(&self) -> QueueResourceQuotas {
        self.state.read().quotas.clone()
    }

    pub fn effective_min_resource(&self, label: &str) -> Resource {
        self.state.read().quotas.effective_min_resource(label)
    }

    pub fn effective_max_resource(&self, label: &str) -> Resource {
        self.state.read().quotas.effective_max_resource(label)
    }

    /// Submits a new application for `user`. It is schedulable right away if
    /// the leaf holds capacity, pending otherwise.
    pub fn submit_application(&self, user: &str) -> ApplicationId {
        let mut app = Application::new(user, self.path.clone());
        if self.state.read().capacities.capacity(NO_LABEL) > 0.0 {
            app.state = ApplicationState::Active;
        }
        let id = app.id;
        let state = app.state;
        self.apps.write().insert(app);
        debug!(queue = %self.path, application = %id, user, ?state, "Application submitted");
        id
    }

    /// Marks a pending application schedulable.
    pub fn activate_application(&self, id: &ApplicationId) -> QueueResult<()> {
        let mut apps = self.apps.write();
        let app = apps
            .get_mut(id)
            .ok_or(QueueError::UnknownApplication(*id))?;
        app.state = ApplicationState::Active;
        Ok(())
    }

    /// Marks every pending application schedulable; returns how many changed.
    pub fn activate_pending_applications(&self) -> usize {
        let mut apps = self.apps.write();
        let pending: Vec<ApplicationId> = apps
            .with_state(ApplicationState::Pending)
            .into_iter()
            .map(|app| app.id)
            .collect();
        for id in &pending {
            if let Some(app) = apps.get_mut(id) {
                app.state = ApplicationState::Active;
            }
        }
        pending.len()
    }

    /// Removes a finished application.
    pub fn finish_application(&self, id: &ApplicationId) -> QueueResult<Application> {
        let app = self
            .apps
            .write()
            .remove(id)
            .ok_or(QueueError::UnknownApplication(*id))?;
        debug!(queue = %self.path, application = %id, "Application finished");
        Ok(app)
    }

    /// Schedulable applications.
    pub fn applications(&self) -> Vec<Application> {
        self.apps.read().with_state(ApplicationState::Active)
    }

    pub fn pending_applications(&self) -> Vec<Application> {
        self.apps.read().with_state(ApplicationState::Pending)
    }

    pub fn all_applications(&self) -> Vec<Application> {
        self.apps.read().all()
    }

    pub fn num_applications(&self) -> usize {
        self.apps.read().len()
    }

    pub fn has_applications(&self) -> bool {
        self.num_applications() > 0
    }

    /// Earliest submitted application still waiting, if any.
    pub fn first_pending_application(&self) -> Option<ApplicationId> {
        self.apps.read().first_pending().map(|app| app.id)
    }
}

impl QueueNode for AutoCreatedLeafQueue {
    fn queue_path(&self) -> &QueuePath {
        &self.path
    }

    fn kind(&self) -> QueueKind {
        QueueKind::AutoCreatedLeaf
    }

    fn queue_capacities(&self) -> QueueCapacities {
        self.state.read().capacities.clone()
    }

    fn parent(&self) -> Option<Arc<ManagedParentQueue>> {
        self.parent.upgrade()
    }

    /// Reinitializes from the parent's current template. Takes the parent's
    /// read lock before the leaf's own.
    fn reinitialize(&self, parsed: &ParsedQueue, cluster_resource: &Resource) -> QueueResult<()> {
        let parent = self.parent.upgrade().ok_or_else(|| {
            QueueError::config(format!("parent of queue {} no longer exists", self.path))
        })?;
        let template = parent.leaf_queue_template();
        let parent_capacities = parent.queue_capacities();
        self.reinitialize_with(parsed, &template, &parent_capacities, cluster_resource)
    }

    fn update_cluster_resource(&self, cluster_resource: &Resource) {
        let mut state = self.state.write();
        let capacities = state.capacities.clone();
        self.merge_locked(&mut state, &capacities, cluster_resource);
    }

    fn as_auto_created_leaf(self: Arc<Self>) -> Option<Arc<AutoCreatedLeafQueue>> {
        Some(self)
    }
}
