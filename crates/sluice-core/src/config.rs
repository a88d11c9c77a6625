//! Stage configuration that callers can serialize/deserialize.

use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// How many activations a merge engine may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Concurrency {
    /// One activation at a time: strict concatenation.
    pub const SERIAL: Concurrency = Concurrency::Bounded(NonZeroUsize::MIN);

    pub fn bounded(limit: usize) -> Result<Self> {
        NonZeroUsize::new(limit)
            .map(Concurrency::Bounded)
            .ok_or(ConfigError::InvalidConcurrency(limit))
    }

    /// `None` means unbounded; `Some(0)` is rejected.
    pub fn from_limit(limit: Option<usize>) -> Result<Self> {
        match limit {
            Some(n) => Self::bounded(n),
            None => Ok(Concurrency::Unbounded),
        }
    }

    /// Whether another activation may start while `active` are running.
    pub fn admits(&self, active: usize) -> bool {
        match self {
            Concurrency::Bounded(limit) => active < limit.get(),
            Concurrency::Unbounded => true,
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Bounded(n) => write!(f, "{n}"),
            Concurrency::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    /// Max concurrently running sub-streams for the merge policy. `None` = unbounded.
    /// Switch and exhaust ignore this; they always run at most one.
    pub concurrency: Option<usize>,

    /// Outbound queue size at which relay loops stop pushing and wait for the reader.
    /// Activation of new sub-streams is *not* gated on it.
    pub high_water_mark: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            high_water_mark: 16,
        }
    }
}

impl FlattenConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SLUICE_CONCURRENCY`: merge concurrency limit, or `unbounded`
    /// - `SLUICE_HIGH_WATER_MARK`: outbound queue high-water mark
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SLUICE_CONCURRENCY") {
            let s = s.trim();
            if s.eq_ignore_ascii_case("unbounded") {
                cfg.concurrency = None;
            } else if let Ok(v) = s.parse::<usize>() {
                cfg.concurrency = Some(v);
            }
        }

        if let Ok(s) = std::env::var("SLUICE_HIGH_WATER_MARK") {
            if let Ok(v) = s.trim().parse::<usize>() {
                cfg.high_water_mark = v;
            }
        }

        cfg
    }

    /// Check every field eagerly and return the resolved concurrency.
    pub fn validate(&self) -> Result<Concurrency> {
        if self.high_water_mark == 0 {
            return Err(ConfigError::InvalidHighWaterMark);
        }
        Concurrency::from_limit(self.concurrency)
    }
}
