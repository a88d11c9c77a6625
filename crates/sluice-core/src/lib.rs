#![forbid(unsafe_code)]
//! sluice-core: shared vocabulary for duplex stages.
//!
//! Every other sluice crate depends on this one for its error taxonomy
//! (`StageError`, `ConfigError`, `Reason`), the serializable `FlattenConfig`,
//! strongly-typed ids and the `StopToken` used to cascade cancellation into
//! running sub-streams.

pub mod cancel;
pub mod config;
pub mod error;
pub mod id;
pub mod prelude;

pub use cancel::{StopReason, StopToken};
pub use config::{Concurrency, FlattenConfig};
pub use error::{ConfigError, Reason, StageError};
pub use id::{ActivationId, StageId};
