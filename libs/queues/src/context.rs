//! Scheduler-wide collaborators consumed by the queue core.
//!
//! The core reads configuration, the cluster resource snapshot, the resource
//! calculator and node-label metadata through [`SchedulerContext`]. Only the
//! configured node-label registry is written to, by auto-created leaves
//! inheriting their template's labels.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use capq_capacity::{Resource, ResourceCalculator, NO_LABEL};
use parking_lot::RwLock;

use crate::config::SchedulerConfig;
use crate::policy::PolicyRegistry;

/// Everything a managed parent needs from the surrounding scheduler.
pub trait SchedulerContext: Send + Sync {
    /// Current configuration snapshot.
    fn configuration(&self) -> Arc<SchedulerConfig>;

    /// Total resource of the cluster (the default partition).
    fn cluster_resource(&self) -> Resource;

    fn resource_calculator(&self) -> Arc<dyn ResourceCalculator>;

    /// Resources of labelled partitions.
    fn node_labels(&self) -> &NodeLabels;

    /// Node labels each queue path may use.
    fn configured_node_labels(&self) -> &ConfiguredNodeLabels;

    /// Management policies available by name.
    fn policy_registry(&self) -> &PolicyRegistry;

    /// Resource of the partition behind `label`. The default partition is the
    /// whole cluster unless it was given an explicit size.
    fn resource_by_label(&self, label: &str) -> Resource {
        self.partition_resource(label, &self.cluster_resource())
    }

    /// Like [`SchedulerContext::resource_by_label`], with `cluster` standing in
    /// for the current cluster resource.
    fn partition_resource(&self, label: &str, cluster: &Resource) -> Resource {
        match self.node_labels().resource(label) {
            Some(resource) => resource,
            None if label == NO_LABEL => *cluster,
            None => Resource::none(),
        }
    }
}

/// Resources of node partitions keyed by label.
#[derive(Debug, Default)]
pub struct NodeLabels {
    partitions: RwLock<BTreeMap<String, Resource>>,
}

impl NodeLabels {
    pub fn new(partitions: BTreeMap<String, Resource>) -> Self {
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    pub fn resource(&self, label: &str) -> Option<Resource> {
        self.partitions.read().get(label).copied()
    }

    pub fn set_resource(&self, label: &str, resource: Resource) {
        self.partitions.write().insert(label.to_string(), resource);
    }

    pub fn labels(&self) -> Vec<String> {
        self.partitions.read().keys().cloned().collect()
    }
}

/// Registry of the node labels configured for each queue path.
///
/// Paths without an entry use only the default partition.
#[derive(Debug, Default)]
pub struct ConfiguredNodeLabels {
    by_queue: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl ConfiguredNodeLabels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from configuration: every configured queue and the
    /// leaf template of every queue that auto-creates children.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let registry = Self::new();
        registry.refresh(config);
        registry
    }

    /// Replaces the entries derived from configuration. Entries that were
    /// copied onto auto-created leaves are kept.
    pub fn refresh(&self, config: &SchedulerConfig) {
        let mut by_queue = self.by_queue.write();
        for queue in &config.queues {
            by_queue.insert(
                queue.path.to_string(),
                config.configured_node_labels(&queue.path),
            );
            if queue.leaf_queue_template.is_some() || queue.auto_create_child_queue.is_some() {
                by_queue.insert(
                    config.auto_created_queue_template_prefix(&queue.path),
                    config.template_node_labels(&queue.path),
                );
            }
        }
    }

    /// Labels configured for `queue_path`.
    pub fn labels_by_queue(&self, queue_path: &str) -> BTreeSet<String> {
        self.by_queue
            .read()
            .get(queue_path)
            .cloned()
            .unwrap_or_else(|| BTreeSet::from([NO_LABEL.to_string()]))
    }

    pub fn set_labels_by_queue(&self, queue_path: &str, labels: BTreeSet<String>) {
        self.by_queue.write().insert(queue_path.to_string(), labels);
    }
}

/// In-process [`SchedulerContext`] backed by plain values.
pub struct InMemorySchedulerContext {
    configuration: RwLock<Arc<SchedulerConfig>>,
    cluster_resource: RwLock<Resource>,
    calculator: RwLock<Arc<dyn ResourceCalculator>>,
    node_labels: NodeLabels,
    configured_node_labels: ConfiguredNodeLabels,
    policy_registry: PolicyRegistry,
}

impl InMemorySchedulerContext {
    pub fn builder(config: SchedulerConfig) -> InMemorySchedulerContextBuilder {
        InMemorySchedulerContextBuilder {
            config,
            cluster_resource: Resource::none(),
            policy_registry: None,
        }
    }

    /// Installs a new configuration and refreshes everything derived from it.
    pub fn set_configuration(&self, config: SchedulerConfig) {
        *self.calculator.write() = config.resource_calculator();
        for (label, resource) in &config.node_labels {
            self.node_labels.set_resource(label, *resource);
        }
        self.configured_node_labels.refresh(&config);
        *self.configuration.write() = Arc::new(config);
    }

    pub fn set_cluster_resource(&self, resource: Resource) {
        *self.cluster_resource.write() = resource;
    }
}

impl std::fmt::Debug for InMemorySchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySchedulerContext")
            .field("cluster_resource", &*self.cluster_resource.read())
            .field("calculator", &self.calculator.read().name())
            .field("policies", &self.policy_registry.names())
            .finish_non_exhaustive()
    }
}

impl SchedulerContext for InMemorySchedulerContext {
    fn configuration(&self) -> Arc<SchedulerConfig> {
        Arc::clone(&self.configuration.read())
    }

    fn cluster_resource(&self) -> Resource {
        *self.cluster_resource.read()
    }

    fn resource_calculator(&self) -> Arc<dyn ResourceCalculator> {
        Arc::clone(&self.calculator.read())
    }

    fn node_labels(&self) -> &NodeLabels {
        &self.node_labels
    }

    fn configured_node_labels(&self) -> &ConfiguredNodeLabels {
        &self.configured_node_labels
    }

    fn policy_registry(&self) -> &PolicyRegistry {
        &self.policy_registry
    }
}

/// Builder for [`InMemorySchedulerContext`].
pub struct InMemorySchedulerContextBuilder {
    config: SchedulerConfig,
    cluster_resource: Resource,
    policy_registry: Option<PolicyRegistry>,
}

impl InMemorySchedulerContextBuilder {
    pub fn cluster_resource(mut self, resource: Resource) -> Self {
        self.cluster_resource = resource;
        self
    }

    /// Replaces the built-in policy registry.
    pub fn policy_registry(mut self, registry: PolicyRegistry) -> Self {
        self.policy_registry = Some(registry);
        self
    }

    pub fn build(self) -> Arc<InMemorySchedulerContext> {
        let config = self.config;
        Arc::new(InMemorySchedulerContext {
            calculator: RwLock::new(config.resource_calculator()),
            node_labels: NodeLabels::new(config.node_labels.clone()),
            configured_node_labels: ConfiguredNodeLabels::from_config(&config),
            configuration: RwLock::new(Arc::new(config)),
            cluster_resource: RwLock::new(self.cluster_resource),
            policy_registry: self.policy_registry.unwrap_or_else(PolicyRegistry::with_builtin),
        })
    }
}
