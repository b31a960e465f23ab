//! # capq-capacity
//!
//! Value types for queue capacity accounting.
//!
//! - [`Resource`]: a quantity of cluster resources (memory and vcores).
//! - [`ResourceCalculator`]: compares and divides resources relative to the
//!   cluster; [`DefaultResourceCalculator`] looks at memory only,
//!   [`DominantResourceCalculator`] at the dominant share.
//! - [`QueueCapacities`]: per node label capacity tuple
//!   `{capacity, maximum_capacity, absolute_capacity, absolute_maximum_capacity}`.
//! - [`QueueResourceQuotas`]: per node label configured and effective resources.
//!
//! ## Invariants
//!
//! - `absolute_capacity = capacity × parent.absolute_capacity`, and the same
//!   relation holds for the maximum.
//! - Resource division never yields NaN or infinity. A zero cluster resource
//!   (seen while a scheduler is still starting) or a zero divisor gives `0.0`.

mod calculator;
mod capacities;
pub mod convert;
mod error;
mod quotas;
mod resource;

pub use calculator::{DefaultResourceCalculator, DominantResourceCalculator, ResourceCalculator};
pub use capacities::{LabelCapacities, QueueCapacities};
pub use error::CapacityError;
pub use quotas::{LabelQuotas, QueueResourceQuotas};
pub use resource::Resource;

/// The default node partition. Nodes without an explicit label belong to it.
pub const NO_LABEL: &str = "";
