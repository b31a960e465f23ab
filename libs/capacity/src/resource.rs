use std::fmt;

use serde::{Deserialize, Serialize};

/// A quantity of cluster resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Resource {
    /// Memory in megabytes.
    #[serde(default)]
    pub memory_mb: i64,

    /// Virtual cores.
    #[serde(default)]
    pub vcores: i32,
}

impl Resource {
    /// Creates a resource from memory (MB) and vcores.
    #[must_use]
    pub const fn new(memory_mb: i64, vcores: i32) -> Self {
        Self { memory_mb, vcores }
    }

    /// The empty resource.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    /// Returns true if every component is zero.
    pub fn is_none(&self) -> bool {
        self.memory_mb == 0 && self.vcores == 0
    }

    /// Scales every component by `by`, rounding down.
    ///
    /// Non-finite or negative factors produce [`Resource::none`].
    #[must_use]
    pub fn multiply(&self, by: f32) -> Self {
        if !by.is_finite() || by <= 0.0 {
            return Self::none();
        }
        let by = f64::from(by);
        Self {
            memory_mb: (self.memory_mb as f64 * by).floor() as i64,
            vcores: (f64::from(self.vcores) * by).floor() as i32,
        }
    }

    /// Returns true if every component of `self` is at most the matching
    /// component of `other`.
    pub fn fits_in(&self, other: &Resource) -> bool {
        self.memory_mb <= other.memory_mb && self.vcores <= other.vcores
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<memory:{}, vCores:{}>", self.memory_mb, self.vcores)
    }
}
