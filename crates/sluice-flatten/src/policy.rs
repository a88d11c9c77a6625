//! Overflow policies for the flattening engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use sluice_core::config::Concurrency;

/// How a flatten engine treats a source value that arrives while it is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Run up to the limit at once; park the rest in a FIFO backlog.
    Merge(Concurrency),
    /// Run one at a time; a new value retires the running activation.
    Switch,
    /// Run one at a time; values arriving meanwhile are discarded unprojected.
    Exhaust,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Merge(limit) => write!(f, "merge({limit})"),
            Policy::Switch => f.write_str("switch"),
            Policy::Exhaust => f.write_str("exhaust"),
        }
    }
}
