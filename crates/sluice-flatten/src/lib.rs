#![forbid(unsafe_code)]
//! sluice-flatten: higher-order flattening stages.
//!
//! A flatten stage takes source values on its inbound port, projects each
//! one into a sub-stream, and relays the sub-streams' chunks to its outbound
//! port. What happens when a value arrives while sub-streams are running is
//! the stage's `Policy`:
//!
//! - merge: up to `concurrency` run at once, the rest wait in a FIFO backlog
//! - switch: the running sub-stream is retired in favour of the new one
//! - exhaust: the new value is dropped unprojected
//!
//! Termination is exactly-once. Whichever of upstream abort, downstream
//! cancel, projector failure or sub-stream failure comes first ends the stage
//! with that error; everything after it is ignored.

pub mod builder;
mod coordination;
pub mod derived;
mod engine;
pub mod metrics;
pub mod policy;

pub use builder::{FlattenBuilder, FlattenStage};
pub use derived::{
    concat_all, concat_map, exhaust_all, exhaust_map, merge_all, merge_map, switch_all,
    switch_map,
};
pub use metrics::{EngineStats, StatsSnapshot};
pub use policy::Policy;
