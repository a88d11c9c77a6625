#![forbid(unsafe_code)]
//! sluice-source: the sub-stream sources a projector may return.
//!
//! A projector hands back a `SubStream`; the engine turns it into a `Pull`
//! exactly once, when the activation starts, and never looks at the concrete
//! shape again.

pub mod pull;
pub mod sub_stream;

pub use pull::Pull;
pub use sub_stream::SubStream;
