//! Construction of flatten stages.

use std::sync::Arc;

use sluice_core::config::{Concurrency, FlattenConfig};
use sluice_core::error::{ConfigError, Reason, Result};
use sluice_core::id::ActivationId;
use sluice_duplex::{pair, Inbound, Outbound};
use sluice_source::SubStream;
use tokio::runtime::Handle;

use crate::engine::{Engine, Projector};
use crate::metrics::EngineStats;
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Merge,
    Switch,
    Exhaust,
}

/// Configures one flatten stage.
///
/// ```ignore
/// let stage = FlattenBuilder::merge(Some(2))
///     .high_water_mark(64)
///     .projector(|n: u32, _| Ok(vec![n, n * 10]))
///     .build()?;
/// ```
pub struct FlattenBuilder<T, U> {
    kind: Kind,
    config: FlattenConfig,
    projector: Option<Projector<T, U>>,
}

impl<T, U> FlattenBuilder<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn with_kind(kind: Kind) -> Self {
        Self {
            kind,
            config: FlattenConfig::default(),
            projector: None,
        }
    }

    /// Bounded merge. `None` runs every activation at once.
    pub fn merge(limit: Option<usize>) -> Self {
        Self::with_kind(Kind::Merge).concurrency(limit)
    }

    pub fn switch() -> Self {
        Self::with_kind(Kind::Switch)
    }

    pub fn exhaust() -> Self {
        Self::with_kind(Kind::Exhaust)
    }

    /// Replace the whole config, including any limit given to `merge`.
    pub fn config(mut self, config: FlattenConfig) -> Self {
        self.config = config;
        self
    }

    /// Only consulted by merge stages.
    pub fn concurrency(mut self, limit: Option<usize>) -> Self {
        self.config.concurrency = limit;
        self
    }

    pub fn high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.config.high_water_mark = high_water_mark;
        self
    }

    /// Map each source value (and its activation index) to a sub-stream.
    ///
    /// Returning `Err` fails the stage with `StageError::Projection`.
    pub fn projector<S, F>(mut self, mut projector: F) -> Self
    where
        S: Into<SubStream<U>>,
        F: FnMut(T, ActivationId) -> std::result::Result<S, Reason> + Send + 'static,
    {
        self.projector = Some(Box::new(move |value, index| {
            projector(value, index).map(Into::into)
        }));
        self
    }

    fn policy(&self) -> Result<Policy> {
        if self.config.high_water_mark == 0 {
            return Err(ConfigError::InvalidHighWaterMark);
        }
        Ok(match self.kind {
            Kind::Merge => Policy::Merge(Concurrency::from_limit(self.config.concurrency)?),
            Kind::Switch => Policy::Switch,
            Kind::Exhaust => Policy::Exhaust,
        })
    }

    /// Validate everything, then create both ports.
    ///
    /// Must be called inside a tokio runtime; activations are spawned on it.
    pub fn build(self) -> Result<FlattenStage<T, U>> {
        let policy = self.policy()?;
        let projector = self.projector.ok_or(ConfigError::InvalidProjector)?;
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let stats = Arc::new(EngineStats::new());

        let duplex = pair(self.config.high_water_mark, |controller| {
            Engine::new(policy, projector, controller, runtime, Arc::clone(&stats))
        });
        let (inbound, outbound) = duplex.into_parts();
        Ok(FlattenStage {
            inbound,
            outbound,
            stats,
        })
    }
}

/// A built flatten stage: write source values in, read flattened chunks out.
pub struct FlattenStage<T: 'static, U> {
    pub inbound: Inbound<T>,
    pub outbound: Outbound<U>,
    pub stats: Arc<EngineStats>,
}

impl<T: 'static, U> FlattenStage<T, U> {
    pub fn into_parts(self) -> (Inbound<T>, Outbound<U>) {
        (self.inbound, self.outbound)
    }
}
