//! Per node label capacity tuples.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CapacityError;

/// Capacity tuple of one queue for one node label.
///
/// `capacity` and `maximum_capacity` are fractions of the parent queue;
/// the absolute values are fractions of the whole cluster partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelCapacities {
    pub capacity: f32,
    pub maximum_capacity: f32,
    pub absolute_capacity: f32,
    pub absolute_maximum_capacity: f32,
}

impl LabelCapacities {
    /// A tuple with the given capacity and maximum; absolute values are derived
    /// later from the parent.
    #[must_use]
    pub const fn new(capacity: f32, maximum_capacity: f32) -> Self {
        Self {
            capacity,
            maximum_capacity,
            absolute_capacity: 0.0,
            absolute_maximum_capacity: 0.0,
        }
    }

    /// Derives the absolute values from the parent's tuple for the same label.
    #[must_use]
    pub fn under(mut self, parent: &LabelCapacities) -> Self {
        self.absolute_capacity = self.capacity * parent.absolute_capacity;
        self.absolute_maximum_capacity = self.maximum_capacity * parent.absolute_maximum_capacity;
        self
    }
}

/// Capacity tuples of one queue keyed by node label.
///
/// Labels that were never set read as an all-zero tuple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueCapacities {
    by_label: BTreeMap<String, LabelCapacities>,
}

impl QueueCapacities {
    /// Creates an empty set of capacities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capacities of the root queue: everything, for each given label.
    pub fn root<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let full = LabelCapacities {
            capacity: 1.0,
            maximum_capacity: 1.0,
            absolute_capacity: 1.0,
            absolute_maximum_capacity: 1.0,
        };
        let mut capacities = Self::new();
        for label in labels {
            capacities.set(label, full);
        }
        capacities
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, label: &str, capacities: LabelCapacities) -> Self {
        self.set(label, capacities);
        self
    }

    /// Returns the tuple for `label`, or zeros if the label is not present.
    pub fn get(&self, label: &str) -> LabelCapacities {
        self.by_label.get(label).copied().unwrap_or_default()
    }

    /// Replaces the whole tuple for `label`.
    pub fn set(&mut self, label: &str, capacities: LabelCapacities) {
        self.by_label.insert(label.to_string(), capacities);
    }

    fn entry(&mut self, label: &str) -> &mut LabelCapacities {
        self.by_label.entry(label.to_string()).or_default()
    }

    pub fn capacity(&self, label: &str) -> f32 {
        self.get(label).capacity
    }

    pub fn maximum_capacity(&self, label: &str) -> f32 {
        self.get(label).maximum_capacity
    }

    pub fn absolute_capacity(&self, label: &str) -> f32 {
        self.get(label).absolute_capacity
    }

    pub fn absolute_maximum_capacity(&self, label: &str) -> f32 {
        self.get(label).absolute_maximum_capacity
    }

    pub fn set_capacity(&mut self, label: &str, value: f32) {
        self.entry(label).capacity = value;
    }

    pub fn set_maximum_capacity(&mut self, label: &str, value: f32) {
        self.entry(label).maximum_capacity = value;
    }

    pub fn set_absolute_capacity(&mut self, label: &str, value: f32) {
        self.entry(label).absolute_capacity = value;
    }

    pub fn set_absolute_maximum_capacity(&mut self, label: &str, value: f32) {
        self.entry(label).absolute_maximum_capacity = value;
    }

    /// Labels that have a tuple in this set.
    pub fn existing_node_labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }

    /// Returns true if a tuple exists for `label`.
    pub fn contains_label(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// Iterates over `(label, tuple)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelCapacities)> {
        self.by_label.iter().map(|(label, caps)| (label.as_str(), caps))
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    /// Recomputes every absolute value from the parent's capacities.
    pub fn update_absolute_capacities(&mut self, parent: &QueueCapacities) {
        for (label, caps) in self.by_label.iter_mut() {
            *caps = caps.under(&parent.get(label));
        }
    }

    /// Checks that every label's capacity fraction is finite and within `[0, 1]`.
    pub fn check_capacity_range(&self) -> Result<(), CapacityError> {
        for (label, caps) in &self.by_label {
            if !caps.capacity.is_finite() {
                return Err(CapacityError::NotFinite {
                    label: label.clone(),
                });
            }
            if !(0.0..=1.0).contains(&caps.capacity) {
                return Err(CapacityError::OutOfRange {
                    label: label.clone(),
                    value: caps.capacity,
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, LabelCapacities)> for QueueCapacities {
    fn from_iter<I: IntoIterator<Item = (String, LabelCapacities)>>(iter: I) -> Self {
        Self {
            by_label: iter.into_iter().collect(),
        }
    }
}
