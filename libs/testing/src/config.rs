use std::collections::BTreeMap;

use capq_id::QueuePath;
use capq_queues::config::{AutoCreateConfig, CapacityValue, QueueConfig, TemplateConfig};
use capq_queues::SchedulerConfig;

/// Builder for the configuration of one managed parent, in percentages.
#[derive(Debug, Clone)]
pub struct ParentConfig {
    path: String,
    capacity: f32,
    maximum_capacity: Option<f32>,
    template_capacity: f32,
    template_maximum_capacity: Option<f32>,
    auto_create: AutoCreateConfig,
    properties: BTreeMap<String, String>,
}

impl ParentConfig {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            capacity: 100.0,
            maximum_capacity: None,
            template_capacity: 0.0,
            template_maximum_capacity: None,
            auto_create: AutoCreateConfig::default(),
            properties: BTreeMap::new(),
        }
    }

    pub fn capacity(mut self, percent: f32) -> Self {
        self.capacity = percent;
        self
    }

    pub fn maximum_capacity(mut self, percent: f32) -> Self {
        self.maximum_capacity = Some(percent);
        self
    }

    pub fn template_capacity(mut self, percent: f32) -> Self {
        self.template_capacity = percent;
        self
    }

    pub fn template_maximum_capacity(mut self, percent: f32) -> Self {
        self.template_maximum_capacity = Some(percent);
        self
    }

    pub fn max_queues(mut self, max: usize) -> Self {
        self.auto_create.max_queues = max;
        self
    }

    pub fn fail_on_exceeding_parent_capacity(mut self) -> Self {
        self.auto_create.fail_on_exceeding_parent_capacity = true;
        self
    }

    pub fn policy(mut self, name: &str) -> Self {
        self.auto_create.management_policy = name.to_string();
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            path: QueuePath::parse(&self.path).expect("valid queue path"),
            capacity: Some(CapacityValue::Percentage(self.capacity)),
            maximum_capacity: self.maximum_capacity.map(CapacityValue::Percentage),
            accessible_node_labels: BTreeMap::new(),
            auto_create_child_queue: Some(self.auto_create.clone()),
            leaf_queue_template: Some(TemplateConfig {
                capacity: Some(CapacityValue::Percentage(self.template_capacity)),
                maximum_capacity: self.template_maximum_capacity.map(CapacityValue::Percentage),
                accessible_node_labels: BTreeMap::new(),
                properties: self.properties.clone(),
            }),
        }
    }

    /// A scheduler configuration holding only this parent.
    pub fn build(&self) -> SchedulerConfig {
        SchedulerConfig {
            queues: vec![self.queue_config()],
            ..SchedulerConfig::default()
        }
    }
}
