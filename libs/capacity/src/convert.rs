//! Conversion of absolute resource requirements into capacity fractions.
//!
//! A queue configured with absolute resources (e.g. `memory-mb = 4096`)
//! still needs capacity fractions for accounting. The fractions are taken
//! relative to the parent's configured resources:
//!
//! ```text
//! capacity                  = divide(cluster, min, parent.configured_min)
//! effective max             = min(cluster, max if set else parent.configured_max,
//!                                 parent.configured_max)
//! maximum_capacity          = divide(cluster, effective max, parent.configured_max)
//! absolute_capacity         = capacity × parent.absolute_capacity
//! absolute_maximum_capacity = maximum_capacity × parent.absolute_maximum_capacity
//! ```

use crate::{LabelCapacities, LabelQuotas, Resource, ResourceCalculator};

/// Absolute resource requirement of a child for one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceRequirement {
    pub minimum: Resource,
    /// `Resource::none()` means "inherit the parent's maximum".
    pub maximum: Resource,
}

/// Derives a child's capacity tuple for one label from its absolute
/// resource requirement.
///
/// With a zero `cluster` the fractions degrade to `0.0` rather than NaN; the
/// caller is expected to run the conversion again once the cluster has
/// resources.
pub fn absolute_to_fraction(
    calculator: &dyn ResourceCalculator,
    cluster: &Resource,
    requirement: &ResourceRequirement,
    parent_quotas: &LabelQuotas,
    parent_capacities: &LabelCapacities,
) -> LabelCapacities {
    let parent_min = parent_quotas.configured_min;
    let parent_max = parent_quotas.configured_max;

    let capacity = calculator.divide(cluster, &requirement.minimum, &parent_min);

    let requested_max = if requirement.maximum.is_none() {
        parent_max
    } else {
        requirement.maximum
    };
    let effective_max = calculator.min(cluster, &requested_max, &parent_max);
    let maximum_capacity = calculator.divide(cluster, &effective_max, &parent_max);

    LabelCapacities::new(capacity, maximum_capacity).under(parent_capacities)
}
