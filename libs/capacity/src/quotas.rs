//! Per node label resource quotas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Resource;

/// Configured and effective resources of one queue for one node label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelQuotas {
    /// Minimum resource from configuration (absolute-resource mode only).
    pub configured_min: Resource,
    /// Maximum resource from configuration (absolute-resource mode only).
    pub configured_max: Resource,
    /// Guaranteed resource derived from the absolute capacity.
    pub effective_min: Resource,
    /// Resource ceiling derived from the absolute maximum capacity.
    pub effective_max: Resource,
}

/// Resource quotas of one queue keyed by node label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueResourceQuotas {
    by_label: BTreeMap<String, LabelQuotas>,
}

impl QueueResourceQuotas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the quotas for `label`, or all-empty quotas.
    pub fn get(&self, label: &str) -> LabelQuotas {
        self.by_label.get(label).copied().unwrap_or_default()
    }

    fn entry(&mut self, label: &str) -> &mut LabelQuotas {
        self.by_label.entry(label.to_string()).or_default()
    }

    pub fn configured_min_resource(&self, label: &str) -> Resource {
        self.get(label).configured_min
    }

    pub fn configured_max_resource(&self, label: &str) -> Resource {
        self.get(label).configured_max
    }

    pub fn effective_min_resource(&self, label: &str) -> Resource {
        self.get(label).effective_min
    }

    pub fn effective_max_resource(&self, label: &str) -> Resource {
        self.get(label).effective_max
    }

    pub fn set_configured_min_resource(&mut self, label: &str, resource: Resource) {
        self.entry(label).configured_min = resource;
    }

    pub fn set_configured_max_resource(&mut self, label: &str, resource: Resource) {
        self.entry(label).configured_max = resource;
    }

    pub fn set_effective_min_resource(&mut self, label: &str, resource: Resource) {
        self.entry(label).effective_min = resource;
    }

    pub fn set_effective_max_resource(&mut self, label: &str, resource: Resource) {
        self.entry(label).effective_max = resource;
    }

    /// Labels that have quotas recorded.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }
}
