//! Convenient re-exports for downstream crates.

pub use crate::cancel::{StopReason, StopToken};
pub use crate::config::{Concurrency, FlattenConfig};
pub use crate::error::{ConfigError, Reason, StageError};
pub use crate::id::{ActivationId, StageId};
