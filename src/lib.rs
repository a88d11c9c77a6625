#![forbid(unsafe_code)]
//! sluice: composable duplex stages with higher-order flattening.
//!
//! This crate re-exports the workspace members under one roof:
//!
//! - [`sluice_core`]: errors, config, ids and stop tokens
//! - [`sluice_duplex`]: `pair`, `Inbound`, `Outbound`, `Controller`
//! - [`sluice_source`]: the `SubStream` shapes a projector may return
//! - [`sluice_flatten`]: merge, switch and exhaust stages and their shorthands

pub use sluice_core;
pub use sluice_duplex;
pub use sluice_flatten;
pub use sluice_source;

pub use sluice_core::{ActivationId, Concurrency, ConfigError, FlattenConfig, Reason, StageError};
pub use sluice_duplex::{pair, Controller, Duplex, Inbound, InboundHandler, Outbound, OutboundHandler};
pub use sluice_flatten::{
    concat_all, concat_map, exhaust_all, exhaust_map, merge_all, merge_map, switch_all,
    switch_map, EngineStats, FlattenBuilder, FlattenStage, Policy, StatsSnapshot,
};
pub use sluice_source::SubStream;

pub mod prelude {
    pub use sluice_core::prelude::*;
    pub use sluice_duplex::{Inbound, Outbound};
    pub use sluice_flatten::{FlattenBuilder, FlattenStage};
    pub use sluice_source::SubStream;
}
