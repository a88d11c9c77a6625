//! Strongly-typed identifiers used across the stages.
//!
//! Downstream crates (duplex, source, flatten) should *not* use raw integers for IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// Ordinal handed to the projector; assigned when a value is accepted for projection.
new_id!(ActivationId);
// Process-unique id of one engine instance, carried on every tracing event.
new_id!(StageId);

static NEXT_STAGE: AtomicU64 = AtomicU64::new(1);

impl StageId {
    /// Allocate a fresh, process-unique stage id.
    pub fn next() -> Self {
        Self(NEXT_STAGE.fetch_add(1, Ordering::Relaxed))
    }
}
