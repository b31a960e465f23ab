//! Managed parent queues.
//!
//! A [`ManagedParentQueue`] has no statically configured children. It creates
//! [`AutoCreatedLeafQueue`]s on demand from a shared [`LeafQueueTemplate`] and
//! keeps their capacities consistent with its own through its
//! [`QueueManagementPolicy`].
//!
//! # Locking
//!
//! All mutable state sits behind one `RwLock`. `reinitialize`,
//! `add_child_queue` and `validate_and_apply_queue_management_changes` hold
//! the write lock for their whole duration; the aggregate readers take the read
//! lock. While the parent lock is held, leaves are locked one at a time and the
//! policy's own lock is taken last, on commit. Nothing in this module calls
//! into a leaf method that would lock the parent again.
//!
//! # Reconciliation
//!
//! A pass is compute → validate → apply → commit. The whole batch is validated
//! before the first leaf changes. A leaf failing mid-apply leaves the earlier
//! leaves changed and skips the commit; validation rules out every failure
//! the leaves can report today.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use capq_capacity::convert::{absolute_to_fraction, ResourceRequirement};
use capq_capacity::{
    LabelCapacities, LabelQuotas, QueueCapacities, QueueResourceQuotas, Resource,
    ResourceCalculator, NO_LABEL,
};
use capq_id::QueuePath;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::app::Application;
use crate::config::{CapacityConfigType, CapacityValue, SchedulerConfig};
use crate::context::SchedulerContext;
use crate::error::{QueueError, QueueResult};
use crate::leaf::AutoCreatedLeafQueue;
use crate::policy::{
    ParentSnapshot, PolicyError, QueueAction, QueueManagementChange, QueueManagementPolicy,
};
use crate::queue::{ParsedQueue, QueueKind, QueueNode};
use crate::template::{LeafQueueConfig, LeafQueueTemplate};

struct ParentState {
    capacities: QueueCapacities,
    quotas: QueueResourceQuotas,
    capacity_config_type: CapacityConfigType,
    fail_on_exceeded: bool,
    template: Arc<LeafQueueTemplate>,
    children: BTreeMap<String, Arc<AutoCreatedLeafQueue>>,
    policy: Arc<dyn QueueManagementPolicy>,
    policy_name: String,
}

impl ParentState {
    fn snapshot(&self, path: &QueuePath, cluster_resource: Resource) -> ParentSnapshot {
        ParentSnapshot {
            queue_path: path.clone(),
            capacities: self.capacities.clone(),
            template: Arc::clone(&self.template),
            children: self.children.values().cloned().collect(),
            cluster_resource,
        }
    }

    fn sum_child_capacities(&self, label: &str) -> f32 {
        self.children
            .values()
            .map(|child| child.queue_capacities().capacity(label))
            .sum()
    }

    fn sum_child_absolute_capacities(&self, label: &str) -> f32 {
        self.children
            .values()
            .map(|child| child.queue_capacities().absolute_capacity(label))
            .sum()
    }
}

/// Own settings of a parent as read from configuration.
struct OwnCapacities {
    capacities: QueueCapacities,
    quotas: QueueResourceQuotas,
    capacity_config_type: CapacityConfigType,
}

/// Configured quotas with an unset maximum read as the whole partition.
fn resolved_quotas(quotas: &QueueResourceQuotas, label: &str, partition: &Resource) -> LabelQuotas {
    let mut resolved = quotas.get(label);
    if resolved.configured_max.is_none() {
        resolved.configured_max = *partition;
    }
    resolved
}

/// Capacity tuple of a queue configured with absolute resources, relative to
/// the whole partition and placed under the queue above.
fn absolute_own_capacities(
    calculator: &dyn ResourceCalculator,
    partition: &Resource,
    quotas: &LabelQuotas,
    above: &LabelCapacities,
) -> LabelCapacities {
    LabelCapacities::new(
        calculator.divide(partition, &quotas.configured_min, partition),
        calculator.divide(partition, &quotas.configured_max, partition),
    )
    .under(above)
}

fn load_own_capacities(
    context: &dyn SchedulerContext,
    config: &SchedulerConfig,
    path: &QueuePath,
    above: &QueueCapacities,
    cluster_resource: &Resource,
) -> QueueResult<OwnCapacities> {
    let queue_config = config.queue(path);
    let capacity_config_type = queue_config
        .map(|q| q.capacity_config_type())
        .unwrap_or(CapacityConfigType::Percentage);
    let settings = queue_config.map(|q| q.label_settings()).unwrap_or_default();
    let calculator = context.resource_calculator();

    let mut capacities = QueueCapacities::new();
    let mut quotas = QueueResourceQuotas::new();

    for label in context
        .configured_node_labels()
        .labels_by_queue(path.full_path())
    {
        let setting = settings.get(&label).cloned().unwrap_or_default();
        let caps = match capacity_config_type {
            CapacityConfigType::Percentage => LabelCapacities::new(
                setting.capacity.and_then(|c| c.as_fraction()).unwrap_or(0.0),
                setting
                    .maximum_capacity
                    .and_then(|c| c.as_fraction())
                    .unwrap_or(1.0),
            )
            .under(&above.get(&label)),
            CapacityConfigType::AbsoluteResource => {
                if matches!(setting.capacity, Some(CapacityValue::Percentage(_)))
                    || matches!(setting.maximum_capacity, Some(CapacityValue::Percentage(_)))
                {
                    return Err(QueueError::config(format!(
                        "queue {path} mixes percentage and absolute resource capacities for label '{label}'"
                    )));
                }
                let partition = context.partition_resource(&label, cluster_resource);
                let min = setting
                    .capacity
                    .and_then(|c| c.as_resource())
                    .unwrap_or_else(Resource::none);
                let max = setting
                    .maximum_capacity
                    .and_then(|c| c.as_resource())
                    .unwrap_or_else(Resource::none);
                quotas.set_configured_min_resource(&label, min);
                quotas.set_configured_max_resource(&label, max);
                absolute_own_capacities(
                    calculator.as_ref(),
                    &partition,
                    &resolved_quotas(&quotas, &label, &partition),
                    &above.get(&label),
                )
            }
        };
        capacities.set(&label, caps);
    }

    capacities
        .check_capacity_range()
        .map_err(|e| QueueError::config(format!("queue {path}: {e}")))?;

    Ok(OwnCapacities {
        capacities,
        quotas,
        capacity_config_type,
    })
}

/// Template capacities of `path` converted from absolute resources.
fn absolute_template_capacities(
    context: &dyn SchedulerContext,
    config: &SchedulerConfig,
    path: &QueuePath,
    capacities: &QueueCapacities,
    quotas: &QueueResourceQuotas,
    cluster_resource: &Resource,
) -> QueueCapacities {
    let template_path = config.auto_created_queue_template_prefix(path);
    let template_config = config.leaf_queue_template(path);
    let calculator = context.resource_calculator();

    context
        .configured_node_labels()
        .labels_by_queue(&template_path)
        .into_iter()
        .map(|label| {
            let requirement = ResourceRequirement {
                minimum: template_config.minimum_resource_requirement(&label),
                maximum: template_config.maximum_resource_requirement(&label),
            };
            let partition = context.partition_resource(&label, cluster_resource);
            let caps = absolute_to_fraction(
                calculator.as_ref(),
                &partition,
                &requirement,
                &resolved_quotas(quotas, &label, &partition),
                &capacities.get(&label),
            );
            (label, caps)
        })
        .collect()
}

/// Builds the leaf template of `path` from configuration.
fn initialize_leaf_queue_configs(
    context: &dyn SchedulerContext,
    config: &SchedulerConfig,
    path: &QueuePath,
    own: &OwnCapacities,
    cluster_resource: &Resource,
) -> QueueResult<LeafQueueTemplate> {
    let template_path = config.auto_created_queue_template_prefix(path);
    let template_config = config.leaf_queue_template(path);
    let labels = context
        .configured_node_labels()
        .labels_by_queue(&template_path);

    let capacities = match own.capacity_config_type {
        CapacityConfigType::Percentage => {
            let settings = template_config.label_settings();
            let mut capacities = QueueCapacities::new();
            for label in &labels {
                if !template_config.minimum_resource_requirement(label).is_none() {
                    return Err(QueueError::config(format!(
                        "queue {path} is configured with percentages but its leaf template \
                         uses absolute resources for label '{label}'"
                    )));
                }
                let setting = settings.get(label).cloned().unwrap_or_default();
                let caps = LabelCapacities::new(
                    setting.capacity.and_then(|c| c.as_fraction()).unwrap_or(0.0),
                    setting
                        .maximum_capacity
                        .and_then(|c| c.as_fraction())
                        .unwrap_or(1.0),
                )
                .under(&own.capacities.get(label));
                capacities.set(label, caps);
            }
            capacities
        }
        CapacityConfigType::AbsoluteResource => absolute_template_capacities(
            context,
            config,
            path,
            &own.capacities,
            &own.quotas,
            cluster_resource,
        ),
    };

    capacities
        .check_capacity_range()
        .map_err(|e| QueueError::config(format!("leaf template of {path}: {e}")))?;

    Ok(LeafQueueTemplate::builder()
        .config(LeafQueueConfig::from_properties(&template_config.properties))
        .capacities(capacities)
        .build())
}

/// A parent queue whose children are created on demand.
pub struct ManagedParentQueue {
    path: QueuePath,
    context: Arc<dyn SchedulerContext>,
    /// Capacities of the queue above this one.
    above: QueueCapacities,
    state: RwLock<ParentState>,
}

impl std::fmt::Debug for ManagedParentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ManagedParentQueue")
            .field("path", &self.path)
            .field("capacities", &state.capacities)
            .field("children", &state.children.keys().collect::<Vec<_>>())
            .field("policy", &state.policy_name)
            .finish_non_exhaustive()
    }
}

impl ManagedParentQueue {
    /// Creates the managed parent at `path` below a queue with capacities
    /// `above`.
    ///
    /// Builds the leaf template and binds the configured management policy.
    /// Any failure aborts construction.
    pub fn new(
        context: Arc<dyn SchedulerContext>,
        path: QueuePath,
        above: QueueCapacities,
    ) -> QueueResult<Arc<Self>> {
        let config = context.configuration();
        let cluster = context.cluster_resource();

        let own = load_own_capacities(context.as_ref(), &config, &path, &above, &cluster)?;
        let template =
            initialize_leaf_queue_configs(context.as_ref(), &config, &path, &own, &cluster)?;
        let policy_name = config.auto_created_queue_management_policy(&path);
        let policy = context.policy_registry().create(&policy_name)?;

        let mut state = ParentState {
            capacities: own.capacities,
            quotas: own.quotas,
            capacity_config_type: own.capacity_config_type,
            fail_on_exceeded: config
                .should_fail_auto_queue_creation_when_guaranteed_capacity_exceeded(&path),
            template: Arc::new(template),
            children: BTreeMap::new(),
            policy,
            policy_name,
        };
        update_effective_resources(context.as_ref(), &mut state, &cluster);

        info!(
            queue = %path,
            capacity = state.capacities.capacity(NO_LABEL),
            absolute_capacity = state.capacities.absolute_capacity(NO_LABEL),
            max_children = config.auto_created_queues_max_children(&path),
            fail_on_exceeded = state.fail_on_exceeded,
            policy = %state.policy_name,
            "Created managed parent queue"
        );

        let snapshot = state.snapshot(&path, cluster);
        state
            .policy
            .init(context.as_ref(), &snapshot)
            .map_err(|source| QueueError::Reconciliation {
                queue: path.clone(),
                source,
            })?;

        Ok(Arc::new(Self {
            path,
            context,
            above,
            state: RwLock::new(state),
        }))
    }

    /// Creates the managed parent at `path` directly below the root queue.
    pub fn new_under_root(
        context: Arc<dyn SchedulerContext>,
        path: QueuePath,
    ) -> QueueResult<Arc<Self>> {
        let config = context.configuration();
        let labels = context
            .configured_node_labels()
            .labels_by_queue(path.full_path())
            .into_iter()
            .chain(
                context
                    .configured_node_labels()
                    .labels_by_queue(&config.auto_created_queue_template_prefix(&path)),
            )
            .collect::<BTreeSet<_>>();
        let above = QueueCapacities::root(labels.iter().map(String::as_str));
        Self::new(context, path, above)
    }

    fn reconciliation_error(&self, source: PolicyError) -> QueueError {
        QueueError::Reconciliation {
            queue: self.path.clone(),
            source,
        }
    }

    /// Creates the leaf `name` with zero capacity and admits it.
    pub fn auto_create_leaf_queue(
        self: &Arc<Self>,
        name: &str,
    ) -> QueueResult<Arc<AutoCreatedLeafQueue>> {
        let leaf = AutoCreatedLeafQueue::new(Arc::clone(&self.context), name, self)?;
        self.add_child_queue(leaf.clone())?;
        Ok(leaf)
    }

    /// Admits an auto-created leaf as a child of this queue.
    ///
    /// Rejections happen before the child is registered. If the policy cannot
    /// supply an initial configuration the registration is undone.
    #[instrument(skip(self, child), fields(queue = %self.path, child = %child.queue_path()))]
    pub fn add_child_queue(&self, child: Arc<dyn QueueNode>) -> QueueResult<()> {
        let mut state = self.state.write();

        if !child.kind().is_auto_created() {
            return Err(QueueError::dynamic_edit(format!(
                "expected an auto-created leaf queue, got {} queue {}",
                child.kind(),
                child.queue_path()
            )));
        }
        let Some(child_parent) = child.parent() else {
            return Err(QueueError::dynamic_edit(format!(
                "queue {} has no parent",
                child.queue_path()
            )));
        };
        if !std::ptr::eq(Arc::as_ptr(&child_parent), self) {
            return Err(QueueError::dynamic_edit(format!(
                "queue {} belongs to {}, not {}",
                child.queue_path(),
                child_parent.queue_path(),
                self.path
            )));
        }
        let Some(leaf) = Arc::clone(&child).as_auto_created_leaf() else {
            return Err(QueueError::dynamic_edit(format!(
                "queue {} is not an auto-created leaf",
                child.queue_path()
            )));
        };
        let name = leaf.queue_name().to_string();
        if state.children.contains_key(&name) {
            return Err(QueueError::dynamic_edit(format!(
                "queue {} already exists",
                leaf.queue_path()
            )));
        }

        let config = self.context.configuration();
        let max_children = config.auto_created_queues_max_children(&self.path);
        if state.children.len() >= max_children {
            warn!(max_children, "Auto-created queue limit reached");
            return Err(QueueError::dynamic_edit(format!(
                "cannot auto create leaf queue {}: max child queue limit {} reached, \
                 queue has {} children",
                leaf.queue_path(),
                max_children,
                state.children.len()
            )));
        }

        if state.fail_on_exceeded {
            for (label, template) in state.template.queue_capacities().iter() {
                let siblings = state.sum_child_absolute_capacities(label);
                let parent_absolute = state.capacities.absolute_capacity(label);
                if template.absolute_capacity + siblings > parent_absolute {
                    warn!(
                        label,
                        template = template.absolute_capacity,
                        siblings,
                        parent = parent_absolute,
                        "Admission would exceed guaranteed capacity"
                    );
                    return Err(QueueError::dynamic_edit(format!(
                        "cannot auto create leaf queue {}: total guaranteed capacity \
                         {} of children would exceed guaranteed capacity {} of {} \
                         for label '{}'",
                        leaf.queue_path(),
                        template.absolute_capacity + siblings,
                        parent_absolute,
                        self.path,
                        label
                    )));
                }
            }
        }

        let cluster = self.context.cluster_resource();
        state
            .policy
            .update_template_absolute_capacities(&state.snapshot(&self.path, cluster))
            .map_err(|e| self.reconciliation_error(e))?;

        state.children.insert(name.clone(), Arc::clone(&leaf));

        if state.capacity_config_type == CapacityConfigType::AbsoluteResource {
            let capacities = absolute_template_capacities(
                self.context.as_ref(),
                &config,
                &self.path,
                &state.capacities,
                &state.quotas,
                &cluster,
            );
            state.template = Arc::new(state.template.with_capacities(capacities));
            let refreshed = state
                .policy
                .update_template_absolute_capacities(&state.snapshot(&self.path, cluster));
            if let Err(e) = refreshed {
                state.children.remove(&name);
                return Err(self.reconciliation_error(e));
            }
        }

        let snapshot = state.snapshot(&self.path, cluster);
        let initial = match state
            .policy
            .initial_leaf_queue_configuration(&snapshot, &leaf)
        {
            Ok(template) => template,
            Err(e) => {
                state.children.remove(&name);
                return Err(self.reconciliation_error(e));
            }
        };
        if let Err(e) = leaf.reinitialize_from_template(&initial) {
            state.children.remove(&name);
            return Err(e);
        }

        self.update_cluster_resource_locked(&mut state, &cluster);

        debug!(
            capacity = leaf.queue_capacities().capacity(NO_LABEL),
            children = state.children.len(),
            "Added auto-created leaf queue"
        );
        Ok(())
    }

    /// Checks a change batch without applying any of it.
    pub fn validate_queue_management_changes(
        &self,
        changes: &[QueueManagementChange],
    ) -> QueueResult<()> {
        for change in changes {
            let queue = change.queue();
            if !queue.kind().is_auto_created() {
                return Err(QueueError::dynamic_edit(format!(
                    "queue management change for {} targets a {} queue",
                    queue.queue_path(),
                    queue.kind()
                )));
            }
            let Some(parent) = queue.parent() else {
                return Err(QueueError::dynamic_edit(format!(
                    "queue management change for {} targets a queue without a parent",
                    queue.queue_path()
                )));
            };
            if !parent.kind().supports_auto_creation() || parent.queue_path() != &self.path {
                return Err(QueueError::dynamic_edit(format!(
                    "queue management change for {} is not for a child of {}",
                    queue.queue_path(),
                    self.path
                )));
            }
            let Some(leaf) = Arc::clone(queue).as_auto_created_leaf() else {
                return Err(QueueError::dynamic_edit(format!(
                    "queue {} is not an auto-created leaf",
                    queue.queue_path()
                )));
            };
            match change.action() {
                QueueAction::UpdateQueue => {
                    leaf.validate_configurations(change.updated_template())?;
                }
            }
        }
        Ok(())
    }

    fn apply_queue_management_changes(changes: &[QueueManagementChange]) -> QueueResult<()> {
        for change in changes {
            match change.action() {
                QueueAction::UpdateQueue => {
                    if let Some(leaf) = Arc::clone(change.queue()).as_auto_created_leaf() {
                        leaf.reinitialize_from_template(change.updated_template())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_and_apply_locked(
        &self,
        state: &ParentState,
        changes: &[QueueManagementChange],
    ) -> QueueResult<()> {
        self.validate_queue_management_changes(changes)?;
        Self::apply_queue_management_changes(changes)?;
        state
            .policy
            .commit_queue_management_changes(changes)
            .map_err(|e| self.reconciliation_error(e))
    }

    /// Validates the whole batch, applies it leaf by leaf, then commits it to
    /// the policy.
    #[instrument(skip(self, changes), fields(queue = %self.path, changes = changes.len()))]
    pub fn validate_and_apply_queue_management_changes(
        &self,
        changes: &[QueueManagementChange],
    ) -> QueueResult<()> {
        let state = self.state.write();
        self.validate_and_apply_locked(&state, changes)
    }

    /// Asks the policy for changes against the current state.
    pub fn compute_queue_management_changes(&self) -> QueueResult<Vec<QueueManagementChange>> {
        let state = self.state.read();
        let snapshot = state.snapshot(&self.path, self.context.cluster_resource());
        state
            .policy
            .compute_queue_management_changes(&snapshot)
            .map_err(|e| self.reconciliation_error(e))
    }

    fn update_cluster_resource_locked(&self, state: &mut ParentState, cluster: &Resource) {
        if state.capacity_config_type == CapacityConfigType::AbsoluteResource {
            let calculator = self.context.resource_calculator();
            let labels: Vec<String> = state
                .capacities
                .existing_node_labels()
                .map(str::to_string)
                .collect();
            for label in labels {
                let partition = self.context.partition_resource(&label, cluster);
                let caps = absolute_own_capacities(
                    calculator.as_ref(),
                    &partition,
                    &resolved_quotas(&state.quotas, &label, &partition),
                    &self.above.get(&label),
                );
                state.capacities.set(&label, caps);
            }
            let config = self.context.configuration();
            let template = absolute_template_capacities(
                self.context.as_ref(),
                &config,
                &self.path,
                &state.capacities,
                &state.quotas,
                cluster,
            );
            state.template = Arc::new(state.template.with_capacities(template));
            if let Err(e) = state
                .policy
                .update_template_absolute_capacities(&state.snapshot(&self.path, *cluster))
            {
                warn!(queue = %self.path, error = %e, "Policy did not accept the new template");
            }
        }

        update_effective_resources(self.context.as_ref(), state, cluster);
        for child in state.children.values() {
            child.update_cluster_resource(cluster);
        }
    }

    /// Snapshot of the state handed to the policy.
    pub fn snapshot(&self) -> ParentSnapshot {
        self.state
            .read()
            .snapshot(&self.path, self.context.cluster_resource())
    }

    /// The current leaf template.
    pub fn leaf_queue_template(&self) -> Arc<LeafQueueTemplate> {
        Arc::clone(&self.state.read().template)
    }

    /// Template settings rewritten for the leaf `leaf_name`.
    pub fn leaf_queue_configs(&self, leaf_name: &str) -> LeafQueueConfig {
        self.state.read().template.leaf_queue_configs(leaf_name)
    }

    /// Configuration path of the leaf template.
    pub fn template_path(&self) -> String {
        self.context
            .configuration()
            .auto_created_queue_template_prefix(&self.path)
    }

    pub fn child_queues(&self) -> Vec<Arc<AutoCreatedLeafQueue>> {
        self.state.read().children.values().cloned().collect()
    }

    pub fn child_queue(&self, name: &str) -> Option<Arc<AutoCreatedLeafQueue>> {
        self.state.read().children.get(name).cloned()
    }

    pub fn num_child_queues(&self) -> usize {
        self.state.read().children.len()
    }

    pub fn queue_resource_quotas(&self) -> QueueResourceQuotas {
        self.state.read().quotas.clone()
    }

    pub fn capacity_config_type(&self) -> CapacityConfigType {
        self.state.read().capacity_config_type
    }

    pub fn management_policy(&self) -> Arc<dyn QueueManagementPolicy> {
        Arc::clone(&self.state.read().policy)
    }

    pub fn should_fail_auto_creation_when_guaranteed_capacity_exceeded(&self) -> bool {
        self.state.read().fail_on_exceeded
    }

    /// Schedulable applications of every child.
    pub fn scheduleable_applications(&self) -> Vec<Application> {
        let state = self.state.read();
        state
            .children
            .values()
            .flat_map(|child| child.applications())
            .collect()
    }

    /// Applications waiting in every child.
    pub fn pending_applications(&self) -> Vec<Application> {
        let state = self.state.read();
        state
            .children
            .values()
            .flat_map(|child| child.pending_applications())
            .collect()
    }

    pub fn all_applications(&self) -> Vec<Application> {
        let state = self.state.read();
        state
            .children
            .values()
            .flat_map(|child| child.all_applications())
            .collect()
    }
}

fn update_effective_resources(
    context: &dyn SchedulerContext,
    state: &mut ParentState,
    cluster: &Resource,
) {
    for (label, caps) in state.capacities.iter() {
        let partition = context.partition_resource(label, cluster);
        state
            .quotas
            .set_effective_min_resource(label, partition.multiply(caps.absolute_capacity));
        state
            .quotas
            .set_effective_max_resource(label, partition.multiply(caps.absolute_maximum_capacity));
    }
}

impl QueueNode for ManagedParentQueue {
    fn queue_path(&self) -> &QueuePath {
        &self.path
    }

    fn kind(&self) -> QueueKind {
        QueueKind::ManagedParent
    }

    fn queue_capacities(&self) -> QueueCapacities {
        self.state.read().capacities.clone()
    }

    /// The queue above a managed parent is not managed by this crate.
    fn parent(&self) -> Option<Arc<ManagedParentQueue>> {
        None
    }

    /// Full reconciliation pass against freshly parsed configuration.
    ///
    /// Configuration errors in the first three steps leave the queue
    /// untouched.
    #[instrument(skip(self, parsed, cluster_resource), fields(queue = %self.path))]
    fn reinitialize(&self, parsed: &ParsedQueue, cluster_resource: &Resource) -> QueueResult<()> {
        let mut state = self.state.write();

        if parsed.kind != QueueKind::ManagedParent || parsed.path != self.path {
            return Err(QueueError::config(format!(
                "trying to reinitialize managed parent {} from {} queue {}",
                self.path, parsed.kind, parsed.path
            )));
        }

        let config = self.context.configuration();
        let fail_on_exceeded =
            config.should_fail_auto_queue_creation_when_guaranteed_capacity_exceeded(&self.path);
        let own = load_own_capacities(
            self.context.as_ref(),
            &config,
            &self.path,
            &self.above,
            cluster_resource,
        )?;

        if fail_on_exceeded {
            for (label, caps) in own.capacities.iter() {
                let children = state.sum_child_capacities(label);
                if children > caps.capacity {
                    return Err(QueueError::config(format!(
                        "total guaranteed capacity {children} of auto-created leaf queues \
                         exceeds guaranteed capacity {} of {} for label '{label}'",
                        caps.capacity, self.path
                    )));
                }
            }
        }

        let template = initialize_leaf_queue_configs(
            self.context.as_ref(),
            &config,
            &self.path,
            &own,
            cluster_resource,
        )?;

        state.fail_on_exceeded = fail_on_exceeded;
        state.capacities = own.capacities;
        state.quotas = own.quotas;
        state.capacity_config_type = own.capacity_config_type;
        state.template = Arc::new(template);
        update_effective_resources(self.context.as_ref(), &mut state, cluster_resource);

        for child in state.children.values() {
            child.reinitialize_with(
                &ParsedQueue::auto_created_leaf(child.queue_path().clone()),
                &state.template,
                &state.capacities,
                cluster_resource,
            )?;
        }

        let policy_name = config.auto_created_queue_management_policy(&self.path);
        let snapshot = state.snapshot(&self.path, *cluster_resource);
        if policy_name != state.policy_name {
            let policy = self.context.policy_registry().create(&policy_name)?;
            policy
                .init(self.context.as_ref(), &snapshot)
                .map_err(|e| self.reconciliation_error(e))?;
            info!(from = %state.policy_name, to = %policy_name, "Swapped queue management policy");
            state.policy = policy;
            state.policy_name = policy_name;
        } else {
            state
                .policy
                .reinitialize(self.context.as_ref(), &snapshot)
                .map_err(|e| self.reconciliation_error(e))?;
        }

        let changes = state
            .policy
            .compute_queue_management_changes(&snapshot)
            .map_err(|e| self.reconciliation_error(e))?;
        self.validate_and_apply_locked(&state, &changes)?;

        info!(
            capacity = state.capacities.capacity(NO_LABEL),
            children = state.children.len(),
            changes = changes.len(),
            "Reinitialized managed parent queue"
        );
        Ok(())
    }

    fn update_cluster_resource(&self, cluster_resource: &Resource) {
        let mut state = self.state.write();
        self.update_cluster_resource_locked(&mut state, cluster_resource);
    }
}
