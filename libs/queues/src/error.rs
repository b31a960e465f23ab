//! Error types for queue management.

use capq_id::{ApplicationId, IdError, QueuePath};
use thiserror::Error;

use crate::policy::PolicyError;

/// Result type for queue management operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors raised by managed parent and auto-created leaf queues.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The configuration is inconsistent: mixed capacity modes, guaranteed
    /// capacity exceeded on reinitialize, unknown policy, wrong queue kind.
    #[error("configuration error: {0}")]
    Config(String),

    /// A dynamic edit was rejected: invalid child kind, too many children,
    /// admission overcommit, invalid change batch, out of range capacity.
    #[error("dynamic edit rejected: {0}")]
    DynamicEdit(String),

    /// The management policy failed during a reconciliation pass.
    #[error("reconciliation of queue {queue} failed")]
    Reconciliation {
        queue: QueuePath,
        #[source]
        source: PolicyError,
    },

    /// An application operation named an application the queue does not hold.
    #[error("application {0} is not known to this queue")]
    UnknownApplication(ApplicationId),

    /// A queue path or identifier was malformed.
    #[error(transparent)]
    Path(#[from] IdError),

    /// The configuration source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}

impl QueueError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn dynamic_edit(msg: impl Into<String>) -> Self {
        Self::DynamicEdit(msg.into())
    }

    /// Returns true for configuration errors, including load failures.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::ConfigLoad(_))
    }

    /// Returns true for rejected dynamic edits.
    pub fn is_dynamic_edit(&self) -> bool {
        matches!(self, Self::DynamicEdit(_))
    }

    /// Returns true if the policy failed mid-pass.
    pub fn is_reconciliation(&self) -> bool {
        matches!(self, Self::Reconciliation { .. })
    }
}
