//! Resource comparison and division relative to the cluster.

use std::cmp::Ordering;
use std::fmt;

use crate::Resource;

/// Compares and divides resources in the context of a cluster resource.
pub trait ResourceCalculator: Send + Sync + fmt::Debug {
    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Fraction that `numerator` represents of `denominator`, judged against
    /// `cluster`.
    ///
    /// Returns `0.0` instead of NaN or infinity when the cluster resource or
    /// the divisor is zero.
    fn divide(&self, cluster: &Resource, numerator: &Resource, denominator: &Resource) -> f32;

    /// Orders two resources in the context of `cluster`.
    fn compare(&self, cluster: &Resource, lhs: &Resource, rhs: &Resource) -> Ordering;

    /// Returns true if `divisor` would make [`ResourceCalculator::divide`] degenerate.
    fn is_invalid_divisor(&self, divisor: &Resource) -> bool;

    /// The smaller of two resources according to [`ResourceCalculator::compare`].
    fn min(&self, cluster: &Resource, lhs: &Resource, rhs: &Resource) -> Resource {
        match self.compare(cluster, lhs, rhs) {
            Ordering::Greater => *rhs,
            _ => *lhs,
        }
    }

    /// The larger of two resources according to [`ResourceCalculator::compare`].
    fn max(&self, cluster: &Resource, lhs: &Resource, rhs: &Resource) -> Resource {
        match self.compare(cluster, lhs, rhs) {
            Ordering::Less => *rhs,
            _ => *lhs,
        }
    }
}

fn finite_or_zero(value: f64) -> f32 {
    if value.is_finite() {
        value as f32
    } else {
        0.0
    }
}

/// Memory-only calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResourceCalculator;

impl ResourceCalculator for DefaultResourceCalculator {
    fn name(&self) -> &'static str {
        "default"
    }

    fn divide(&self, _cluster: &Resource, numerator: &Resource, denominator: &Resource) -> f32 {
        if self.is_invalid_divisor(denominator) {
            return 0.0;
        }
        finite_or_zero(numerator.memory_mb as f64 / denominator.memory_mb as f64)
    }

    fn compare(&self, _cluster: &Resource, lhs: &Resource, rhs: &Resource) -> Ordering {
        lhs.memory_mb.cmp(&rhs.memory_mb)
    }

    fn is_invalid_divisor(&self, divisor: &Resource) -> bool {
        divisor.memory_mb == 0
    }
}

/// Dominant resource fairness calculator: a resource is measured by its
/// largest share of the cluster across memory and vcores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DominantResourceCalculator;

impl DominantResourceCalculator {
    /// Per-type shares of `resource` relative to `cluster`, as (dominant, other).
    fn shares(cluster: &Resource, resource: &Resource) -> (f64, f64) {
        let memory = if cluster.memory_mb > 0 {
            resource.memory_mb as f64 / cluster.memory_mb as f64
        } else {
            0.0
        };
        let vcores = if cluster.vcores > 0 {
            f64::from(resource.vcores) / f64::from(cluster.vcores)
        } else {
            0.0
        };
        if memory >= vcores {
            (memory, vcores)
        } else {
            (vcores, memory)
        }
    }
}

impl ResourceCalculator for DominantResourceCalculator {
    fn name(&self) -> &'static str {
        "dominant"
    }

    fn divide(&self, cluster: &Resource, numerator: &Resource, denominator: &Resource) -> f32 {
        let (numerator_share, _) = Self::shares(cluster, numerator);
        let (denominator_share, _) = Self::shares(cluster, denominator);
        if denominator_share == 0.0 {
            return 0.0;
        }
        finite_or_zero(numerator_share / denominator_share)
    }

    fn compare(&self, cluster: &Resource, lhs: &Resource, rhs: &Resource) -> Ordering {
        if cluster.is_none() {
            // No shares to compare against; fall back to component order.
            return lhs
                .memory_mb
                .cmp(&rhs.memory_mb)
                .then(lhs.vcores.cmp(&rhs.vcores));
        }

        let (lhs_dominant, lhs_other) = Self::shares(cluster, lhs);
        let (rhs_dominant, rhs_other) = Self::shares(cluster, rhs);
        lhs_dominant
            .total_cmp(&rhs_dominant)
            .then(lhs_other.total_cmp(&rhs_other))
    }

    fn is_invalid_divisor(&self, divisor: &Resource) -> bool {
        divisor.memory_mb == 0 || divisor.vcores == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CLUSTER: Resource = Resource::new(10_240, 10);

    #[rstest]
    #[case(Resource::new(1024, 1), Resource::new(4096, 4), 0.25)]
    #[case(Resource::new(4096, 1), Resource::new(4096, 4), 1.0)]
    #[case(Resource::new(0, 0), Resource::new(4096, 4), 0.0)]
    #[case(Resource::new(1024, 1), Resource::none(), 0.0)]
    fn test_default_divide(#[case] num: Resource, #[case] den: Resource, #[case] expected: f32) {
        assert_eq!(DefaultResourceCalculator.divide(&CLUSTER, &num, &den), expected);
    }

    #[rstest]
    #[case(Resource::new(1024, 5), Resource::new(2048, 10), 0.5)]
    #[case(Resource::new(5120, 1), Resource::new(10_240, 2), 0.5)]
    #[case(Resource::new(1024, 1), Resource::none(), 0.0)]
    fn test_dominant_divide(#[case] num: Resource, #[case] den: Resource, #[case] expected: f32) {
        assert_eq!(DominantResourceCalculator.divide(&CLUSTER, &num, &den), expected);
    }

    #[test]
    fn test_divide_with_zero_cluster_is_defined() {
        let zero = Resource::none();
        let a = Resource::new(1024, 1);
        let b = Resource::new(2048, 2);

        let dominant = DominantResourceCalculator.divide(&zero, &a, &b);
        assert!(dominant.is_finite());
        assert_eq!(dominant, 0.0);

        let default = DefaultResourceCalculator.divide(&zero, &a, &b);
        assert!(default.is_finite());
    }

    #[test]
    fn test_dominant_compare_uses_dominant_share() {
        let memory_heavy = Resource::new(5120, 1);
        let cpu_heavy = Resource::new(1024, 6);
        assert_eq!(
            DominantResourceCalculator.compare(&CLUSTER, &memory_heavy, &cpu_heavy),
            Ordering::Less
        );
        assert_eq!(
            DominantResourceCalculator.min(&CLUSTER, &memory_heavy, &cpu_heavy),
            memory_heavy
        );
        assert_eq!(
            DominantResourceCalculator.max(&CLUSTER, &memory_heavy, &cpu_heavy),
            cpu_heavy
        );
    }

    #[test]
    fn test_dominant_compare_zero_cluster() {
        let a = Resource::new(1024, 2);
        let b = Resource::new(1024, 4);
        assert_eq!(
            DominantResourceCalculator.compare(&Resource::none(), &a, &b),
            Ordering::Less
        );
    }

    #[test]
    fn test_default_min() {
        let a = Resource::new(1024, 8);
        let b = Resource::new(2048, 1);
        assert_eq!(DefaultResourceCalculator.min(&CLUSTER, &a, &b), a);
    }
}
