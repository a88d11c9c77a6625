#![forbid(unsafe_code)]
//! sluice-duplex: the pairing primitive every stage is built on.
//!
//! `pair` builds one inbound port and one outbound port around a stage's
//! handler. Writes to the inbound port are synchronous calls into the handler;
//! the handler pushes results through a `Controller` into a queue that the
//! outbound port drains as a `Stream`.
//!
//! The queue never refuses a chunk because it is full. Producers that want
//! backpressure wait on `Controller::ready` before emitting.

pub mod port;
pub mod queue;

pub use port::{pair, Duplex, Inbound, InboundHandler, Outbound, OutboundHandler};
pub use queue::Controller;
