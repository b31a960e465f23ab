//! Typed scheduler configuration.
//!
//! Queues are listed as an array of tables so that dotted queue paths never
//! collide with key nesting:
//!
//! ```toml
//! resource-calculator = "dominant"
//!
//! [[queues]]
//! path = "root.users"
//! capacity = 50
//! maximum-capacity = 100
//!
//! [queues.auto-create-child-queue]
//! max-queues = 10
//! fail-on-exceeding-parent-capacity = true
//!
//! [queues.leaf-queue-template]
//! capacity = 20
//!
//! [queues.leaf-queue-template.properties]
//! user-limit-factor = "2"
//! ```
//!
//! Capacities are either a percentage of the parent (a number in 0–100) or an
//! absolute resource (`{ memory-mb = 4096, vcores = 4 }`).

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use capq_capacity::{
    DefaultResourceCalculator, DominantResourceCalculator, Resource, ResourceCalculator, NO_LABEL,
};
use capq_id::QueuePath;
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

/// Default limit on auto-created children of one managed parent.
pub const DEFAULT_MAX_AUTO_CREATED_QUEUES: usize = 1000;

/// Policy used when a managed parent does not name one.
pub const DEFAULT_MANAGEMENT_POLICY: &str = "guaranteed-or-zero";

/// Default interval between background policy edit passes.
pub const DEFAULT_EDIT_POLICY_INTERVAL_MS: u64 = 1500;

/// Queue-name segment under which a managed parent's leaf template lives.
pub const LEAF_QUEUE_TEMPLATE_PREFIX: &str = "leaf-queue-template";

/// Environment prefix for configuration overrides (`CAPQ__RESOURCE_CALCULATOR=dominant`).
pub const ENV_PREFIX: &str = "CAPQ";

/// How a queue's capacities are expressed in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityConfigType {
    /// Percentages of the parent's capacity.
    Percentage,
    /// Absolute resources.
    AbsoluteResource,
}

/// A configured capacity value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapacityValue {
    /// Percentage of the parent, 0–100.
    Percentage(f32),
    /// Absolute resource.
    Absolute(Resource),
}

impl CapacityValue {
    /// Fraction of the parent (percentage / 100), or `None` for absolute values.
    pub fn as_fraction(&self) -> Option<f32> {
        match self {
            Self::Percentage(pct) => Some(pct / 100.0),
            Self::Absolute(_) => None,
        }
    }

    /// The absolute resource, or `None` for percentages.
    pub fn as_resource(&self) -> Option<Resource> {
        match self {
            Self::Percentage(_) => None,
            Self::Absolute(resource) => Some(*resource),
        }
    }
}

/// Which [`ResourceCalculator`] the scheduler uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceCalculatorKind {
    /// Memory only.
    #[default]
    #[serde(rename = "default")]
    MemoryOnly,
    /// Dominant resource fairness.
    #[serde(rename = "dominant")]
    Dominant,
}

impl ResourceCalculatorKind {
    pub fn build(&self) -> Arc<dyn ResourceCalculator> {
        match self {
            Self::MemoryOnly => Arc::new(DefaultResourceCalculator),
            Self::Dominant => Arc::new(DominantResourceCalculator),
        }
    }
}

/// Capacity settings for one non-default node label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LabelCapacityConfig {
    #[serde(default)]
    pub capacity: Option<CapacityValue>,
    #[serde(default)]
    pub maximum_capacity: Option<CapacityValue>,
}

/// Auto-creation settings of a managed parent queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoCreateConfig {
    #[serde(default = "default_max_queues")]
    pub max_queues: usize,
    #[serde(default)]
    pub fail_on_exceeding_parent_capacity: bool,
    #[serde(default = "default_management_policy")]
    pub management_policy: String,
    #[serde(default = "default_edit_policy_interval_ms")]
    pub edit_policy_interval_ms: u64,
}

fn default_max_queues() -> usize {
    DEFAULT_MAX_AUTO_CREATED_QUEUES
}

fn default_management_policy() -> String {
    DEFAULT_MANAGEMENT_POLICY.to_string()
}

fn default_edit_policy_interval_ms() -> u64 {
    DEFAULT_EDIT_POLICY_INTERVAL_MS
}

impl Default for AutoCreateConfig {
    fn default() -> Self {
        Self {
            max_queues: default_max_queues(),
            fail_on_exceeding_parent_capacity: false,
            management_policy: default_management_policy(),
            edit_policy_interval_ms: default_edit_policy_interval_ms(),
        }
    }
}

/// Template applied to every leaf auto-created under a managed parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TemplateConfig {
    #[serde(default)]
    pub capacity: Option<CapacityValue>,
    #[serde(default)]
    pub maximum_capacity: Option<CapacityValue>,
    #[serde(default)]
    pub accessible_node_labels: BTreeMap<String, LabelCapacityConfig>,
    /// Free-form leaf properties (`user-limit-factor`, `ordering-policy`, ACLs, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Configuration of a single queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueConfig {
    pub path: QueuePath,
    #[serde(default)]
    pub capacity: Option<CapacityValue>,
    #[serde(default)]
    pub maximum_capacity: Option<CapacityValue>,
    #[serde(default)]
    pub accessible_node_labels: BTreeMap<String, LabelCapacityConfig>,
    #[serde(default)]
    pub auto_create_child_queue: Option<AutoCreateConfig>,
    #[serde(default)]
    pub leaf_queue_template: Option<TemplateConfig>,
}

/// Label → (capacity, maximum) view shared by queue and template settings.
fn label_settings(
    capacity: Option<CapacityValue>,
    maximum_capacity: Option<CapacityValue>,
    labels: &BTreeMap<String, LabelCapacityConfig>,
) -> BTreeMap<String, LabelCapacityConfig> {
    let mut settings = labels.clone();
    settings.insert(
        NO_LABEL.to_string(),
        LabelCapacityConfig {
            capacity,
            maximum_capacity,
        },
    );
    settings
}

fn config_type_of(settings: &BTreeMap<String, LabelCapacityConfig>) -> CapacityConfigType {
    let absolute = settings.values().any(|s| {
        matches!(s.capacity, Some(CapacityValue::Absolute(_)))
            || matches!(s.maximum_capacity, Some(CapacityValue::Absolute(_)))
    });
    if absolute {
        CapacityConfigType::AbsoluteResource
    } else {
        CapacityConfigType::Percentage
    }
}

impl QueueConfig {
    /// Per-label capacity settings, including the default partition.
    pub fn label_settings(&self) -> BTreeMap<String, LabelCapacityConfig> {
        label_settings(
            self.capacity,
            self.maximum_capacity,
            &self.accessible_node_labels,
        )
    }

    /// Absolute-resource mode if any capacity of this queue is absolute.
    pub fn capacity_config_type(&self) -> CapacityConfigType {
        config_type_of(&self.label_settings())
    }
}

impl TemplateConfig {
    pub fn label_settings(&self) -> BTreeMap<String, LabelCapacityConfig> {
        label_settings(
            self.capacity,
            self.maximum_capacity,
            &self.accessible_node_labels,
        )
    }

    pub fn capacity_config_type(&self) -> CapacityConfigType {
        config_type_of(&self.label_settings())
    }

    /// Absolute minimum resource configured for `label`, or none.
    pub fn minimum_resource_requirement(&self, label: &str) -> Resource {
        self.label_settings()
            .get(label)
            .and_then(|s| s.capacity)
            .and_then(|c| c.as_resource())
            .unwrap_or_else(Resource::none)
    }

    /// Absolute maximum resource configured for `label`, or none.
    pub fn maximum_resource_requirement(&self, label: &str) -> Resource {
        self.label_settings()
            .get(label)
            .and_then(|s| s.maximum_capacity)
            .and_then(|c| c.as_resource())
            .unwrap_or_else(Resource::none)
    }
}

/// The scheduler configuration consumed by the queue core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    #[serde(default)]
    pub resource_calculator: ResourceCalculatorKind,

    /// Resources of labelled node partitions. The default partition is the
    /// whole cluster unless listed here under the empty label.
    #[serde(default)]
    pub node_labels: BTreeMap<String, Resource>,

    #[serde(default)]
    pub queues: Vec<QueueConfig>,
}

impl SchedulerConfig {
    /// Loads configuration from a TOML file with `CAPQ__`-prefixed
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| QueueError::ConfigLoad(format!("{}: {e}", path.display())))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| QueueError::ConfigLoad(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML document.
    pub fn from_toml_str(s: &str) -> QueueResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| QueueError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that deserialize but cannot be used.
    pub fn validate(&self) -> QueueResult<()> {
        for queue in &self.queues {
            if let Some(auto_create) = &queue.auto_create_child_queue {
                if auto_create.edit_policy_interval_ms == 0 {
                    return Err(QueueError::config(format!(
                        "queue {}: edit-policy-interval-ms must be greater than 0",
                        queue.path
                    )));
                }
            }
        }
        Ok(())
    }

    /// Configuration of the queue at `path`, if any.
    pub fn queue(&self, path: &QueuePath) -> Option<&QueueConfig> {
        self.queues.iter().find(|q| &q.path == path)
    }

    fn auto_create(&self, path: &QueuePath) -> AutoCreateConfig {
        self.queue(path)
            .and_then(|q| q.auto_create_child_queue.clone())
            .unwrap_or_default()
    }

    /// Maximum number of auto-created children under `path`.
    pub fn auto_created_queues_max_children(&self, path: &QueuePath) -> usize {
        self.auto_create(path).max_queues
    }

    /// Whether admission must fail once children would exceed the parent's
    /// guaranteed capacity.
    pub fn should_fail_auto_queue_creation_when_guaranteed_capacity_exceeded(
        &self,
        path: &QueuePath,
    ) -> bool {
        self.auto_create(path).fail_on_exceeding_parent_capacity
    }

    /// Name of the management policy bound to the managed parent at `path`.
    pub fn auto_created_queue_management_policy(&self, path: &QueuePath) -> String {
        self.auto_create(path).management_policy
    }

    /// Interval between background edit passes for the parent at `path`.
    pub fn edit_policy_interval(&self, path: &QueuePath) -> Duration {
        Duration::from_millis(self.auto_create(path).edit_policy_interval_ms)
    }

    /// Path under which the leaf template of `path` is configured
    /// (`root.users.leaf-queue-template`).
    pub fn auto_created_queue_template_prefix(&self, path: &QueuePath) -> String {
        format!("{path}.{LEAF_QUEUE_TEMPLATE_PREFIX}")
    }

    /// Leaf template of the managed parent at `path` (empty when unset).
    pub fn leaf_queue_template(&self, path: &QueuePath) -> TemplateConfig {
        self.queue(path)
            .and_then(|q| q.leaf_queue_template.clone())
            .unwrap_or_default()
    }

    /// Node labels configured for the queue at `path`; always includes the
    /// default partition.
    pub fn configured_node_labels(&self, path: &QueuePath) -> BTreeSet<String> {
        let mut labels = BTreeSet::from([NO_LABEL.to_string()]);
        if let Some(queue) = self.queue(path) {
            labels.extend(queue.accessible_node_labels.keys().cloned());
        }
        labels
    }

    /// Node labels configured for the leaf template of `path`.
    pub fn template_node_labels(&self, path: &QueuePath) -> BTreeSet<String> {
        let mut labels = BTreeSet::from([NO_LABEL.to_string()]);
        labels.extend(
            self.leaf_queue_template(path)
                .accessible_node_labels
                .keys()
                .cloned(),
        );
        labels
    }

    /// Calculator selected by configuration.
    pub fn resource_calculator(&self) -> Arc<dyn ResourceCalculator> {
        self.resource_calculator.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
resource-calculator = "dominant"

[node-labels]
gpu = { memory-mb = 8192, vcores = 8 }

[[queues]]
path = "root.users"
capacity = 50
maximum-capacity = 80

[queues.accessible-node-labels.gpu]
capacity = 100

[queues.auto-create-child-queue]
max-queues = 2
fail-on-exceeding-parent-capacity = true

[queues.leaf-queue-template]
capacity = 30

[queues.leaf-queue-template.accessible-node-labels.gpu]
capacity = 10

[queues.leaf-queue-template.properties]
user-limit-factor = "2"

[[queues]]
path = "root.batch"
capacity = { memory-mb = 4096, vcores = 4 }
"#;

    fn path(s: &str) -> QueuePath {
        QueuePath::parse(s).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let config = SchedulerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.resource_calculator, ResourceCalculatorKind::Dominant);
        assert_eq!(config.queues.len(), 2);
        assert_eq!(config.node_labels["gpu"], Resource::new(8192, 8));

        let users = config.queue(&path("root.users")).unwrap();
        assert_eq!(users.capacity, Some(CapacityValue::Percentage(50.0)));
        assert_eq!(users.capacity_config_type(), CapacityConfigType::Percentage);

        let batch = config.queue(&path("root.batch")).unwrap();
        assert_eq!(
            batch.capacity,
            Some(CapacityValue::Absolute(Resource::new(4096, 4)))
        );
        assert_eq!(
            batch.capacity_config_type(),
            CapacityConfigType::AbsoluteResource
        );
    }

    #[test]
    fn test_auto_create_accessors() {
        let config = SchedulerConfig::from_toml_str(SAMPLE).unwrap();
        let users = path("root.users");

        assert_eq!(config.auto_created_queues_max_children(&users), 2);
        assert!(config.should_fail_auto_queue_creation_when_guaranteed_capacity_exceeded(&users));
        assert_eq!(
            config.auto_created_queue_management_policy(&users),
            DEFAULT_MANAGEMENT_POLICY
        );
        assert_eq!(
            config.edit_policy_interval(&users),
            Duration::from_millis(DEFAULT_EDIT_POLICY_INTERVAL_MS)
        );
        assert_eq!(
            config.auto_created_queue_template_prefix(&users),
            "root.users.leaf-queue-template"
        );
    }

    #[test]
    fn test_defaults_for_unconfigured_queue() {
        let config = SchedulerConfig::default();
        let unknown = path("root.unknown");

        assert_eq!(
            config.auto_created_queues_max_children(&unknown),
            DEFAULT_MAX_AUTO_CREATED_QUEUES
        );
        assert!(!config.should_fail_auto_queue_creation_when_guaranteed_capacity_exceeded(&unknown));
        assert_eq!(config.leaf_queue_template(&unknown), TemplateConfig::default());
        assert_eq!(
            config.configured_node_labels(&unknown),
            BTreeSet::from([NO_LABEL.to_string()])
        );
    }

    #[test]
    fn test_node_labels() {
        let config = SchedulerConfig::from_toml_str(SAMPLE).unwrap();
        let users = path("root.users");

        let expected = BTreeSet::from([NO_LABEL.to_string(), "gpu".to_string()]);
        assert_eq!(config.configured_node_labels(&users), expected);
        assert_eq!(config.template_node_labels(&users), expected);
    }

    #[test]
    fn test_template_requirements() {
        let template = TemplateConfig {
            capacity: Some(CapacityValue::Absolute(Resource::new(1024, 1))),
            ..TemplateConfig::default()
        };
        assert_eq!(
            template.minimum_resource_requirement(NO_LABEL),
            Resource::new(1024, 1)
        );
        assert!(template.maximum_resource_requirement(NO_LABEL).is_none());
        assert!(template.minimum_resource_requirement("gpu").is_none());

        let config = SchedulerConfig::from_toml_str(SAMPLE).unwrap();
        let percentage = config.leaf_queue_template(&path("root.users"));
        assert!(percentage.minimum_resource_requirement(NO_LABEL).is_none());
        assert_eq!(percentage.properties["user-limit-factor"], "2");
    }

    #[test]
    fn test_invalid_queue_path_rejected() {
        let err = SchedulerConfig::from_toml_str(
            r#"
[[queues]]
path = "root..users"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, QueueError::ConfigLoad(_)));
    }

    #[test]
    fn test_zero_edit_interval_rejected() {
        let err = SchedulerConfig::from_toml_str(
            r#"
[[queues]]
path = "root.users"

[queues.auto-create-child-queue]
edit-policy-interval-ms = 0
"#,
        )
        .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("edit-policy-interval-ms"));
    }

    #[test]
    fn test_capacity_value_fraction() {
        assert_eq!(CapacityValue::Percentage(25.0).as_fraction(), Some(0.25));
        assert_eq!(
            CapacityValue::Absolute(Resource::new(1, 1)).as_fraction(),
            None
        );
    }
}
