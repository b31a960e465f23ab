//! Leaf queue templates.
//!
//! A template is built once per (re)initialization of a managed parent and
//! shared as `Arc<LeafQueueTemplate>`. It is never mutated; a new template
//! replaces the old one wholesale so concurrent readers see either version
//! completely.

use std::collections::BTreeMap;

use capq_capacity::QueueCapacities;

use crate::config::LEAF_QUEUE_TEMPLATE_PREFIX;

/// Free-form leaf settings carried by a template, keyed relative to the
/// template prefix (`leaf-queue-template.user-limit-factor`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafQueueConfig {
    properties: BTreeMap<String, String>,
}

impl LeafQueueConfig {
    /// Prefixes every property key with the template prefix.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> Self {
        let properties = properties
            .iter()
            .map(|(key, value)| (format!("{LEAF_QUEUE_TEMPLATE_PREFIX}.{key}"), value.clone()))
            .collect();
        Self { properties }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// The same settings keyed under `leaf_name` instead of the template
    /// prefix. Only the first occurrence of the prefix is rewritten.
    pub fn for_leaf(&self, leaf_name: &str) -> LeafQueueConfig {
        let properties = self
            .properties
            .iter()
            .map(|(key, value)| {
                (
                    key.replacen(LEAF_QUEUE_TEMPLATE_PREFIX, leaf_name, 1),
                    value.clone(),
                )
            })
            .collect();
        LeafQueueConfig { properties }
    }
}

/// Configuration and default capacities applied to auto-created leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafQueueTemplate {
    config: LeafQueueConfig,
    capacities: QueueCapacities,
}

impl LeafQueueTemplate {
    pub fn builder() -> LeafQueueTemplateBuilder {
        LeafQueueTemplateBuilder::default()
    }

    pub fn config(&self) -> &LeafQueueConfig {
        &self.config
    }

    pub fn queue_capacities(&self) -> &QueueCapacities {
        &self.capacities
    }

    /// A copy of this template with different capacities.
    #[must_use]
    pub fn with_capacities(&self, capacities: QueueCapacities) -> Self {
        Self {
            config: self.config.clone(),
            capacities,
        }
    }

    /// Template settings rewritten for the leaf called `leaf_name`.
    pub fn leaf_queue_configs(&self, leaf_name: &str) -> LeafQueueConfig {
        self.config.for_leaf(leaf_name)
    }
}

#[derive(Debug, Default)]
pub struct LeafQueueTemplateBuilder {
    config: LeafQueueConfig,
    capacities: QueueCapacities,
}

impl LeafQueueTemplateBuilder {
    pub fn config(mut self, config: LeafQueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capacities(mut self, capacities: QueueCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    pub fn build(self) -> LeafQueueTemplate {
        LeafQueueTemplate {
            config: self.config,
            capacities: self.capacities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capq_capacity::{LabelCapacities, NO_LABEL};

    fn properties() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("user-limit-factor".to_string(), "2".to_string()),
            ("acl.submit".to_string(), "*".to_string()),
        ])
    }

    #[test]
    fn test_properties_are_prefixed() {
        let config = LeafQueueConfig::from_properties(&properties());
        assert_eq!(config.get("leaf-queue-template.user-limit-factor"), Some("2"));
        assert_eq!(config.get("user-limit-factor"), None);
    }

    #[test]
    fn test_leaf_queue_configs_rewrites_prefix() {
        let template = LeafQueueTemplate::builder()
            .config(LeafQueueConfig::from_properties(&properties()))
            .build();

        let leaf = template.leaf_queue_configs("alice");
        assert_eq!(leaf.get("alice.user-limit-factor"), Some("2"));
        assert_eq!(leaf.get("alice.acl.submit"), Some("*"));
        assert_eq!(leaf.iter().count(), 2);
    }

    #[test]
    fn test_with_capacities_keeps_config() {
        let template = LeafQueueTemplate::builder()
            .config(LeafQueueConfig::from_properties(&properties()))
            .build();
        let caps = QueueCapacities::new().with(NO_LABEL, LabelCapacities::new(0.5, 1.0));

        let updated = template.with_capacities(caps.clone());
        assert_eq!(updated.queue_capacities(), &caps);
        assert_eq!(updated.config(), template.config());
        assert!(template.queue_capacities().is_empty());
    }
}
