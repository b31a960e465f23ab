//! # capq-id
//!
//! Typed identifiers for the capq scheduler core.
//!
//! ## Identifiers
//!
//! - [`QueuePath`]: dotted, fully-qualified queue path (`root.users.alice`).
//!   The last segment is the queue's short name.
//! - [`ApplicationId`]: system-generated application identifier in the
//!   prefixed format `app_{ulid}`. ULIDs are time-ordered, so sorting
//!   application IDs sorts applications by submission time.

mod error;
mod path;
mod types;

pub use error::IdError;
pub use path::QueuePath;
pub use types::ApplicationId;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
