//! The flattening engine: coordination state wired to a duplex stage.
//!
//! Every port callback and every activation settlement goes through
//! `Engine::apply`, which holds the state lock while the coordination record
//! transitions and while its effect is carried out. The projector is called
//! under that lock too, so indices are handed out in projection order.
//!
//! Each activation runs as its own task:
//!
//! ```text
//! loop {
//!     next chunk from sub-stream   (suspends; aborts if the token fires)
//!     wait for outbound room       (suspends; aborts if the token fires)
//!     lock, check liveness, emit   (never suspends)
//! }
//! ```
//!
//! The liveness check sits immediately before the emit and under the same
//! lock that supersession and disposal take, so a retired activation cannot
//! slip a chunk out after its replacement was admitted.
//!
//! A panicking projector or sub-stream is caught at the engine boundary and
//! disposes the stage like any other failure, so the lock is never poisoned
//! and the activation count stays exact.
//!
//! Activation is gated only by the concurrency limit, never by the outbound
//! desired size: a slow reader slows the relay loops, not how many
//! sub-streams get started.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{FutureExt, StreamExt};
use sluice_core::cancel::StopToken;
use sluice_core::error::{Reason, StageError};
use sluice_core::id::{ActivationId, StageId};
use sluice_duplex::{Controller, InboundHandler, OutboundHandler};
use sluice_source::{Pull, SubStream};
use tokio::runtime::Handle;

use crate::coordination::{Coordination, Effect, Event, Outcome, Start};
use crate::metrics::EngineStats;
use crate::policy::Policy;

pub(crate) type Projector<T, U> =
    Box<dyn FnMut(T, ActivationId) -> Result<SubStream<U>, Reason> + Send>;

struct State<T, U> {
    coord: Coordination<T>,
    projector: Projector<T, U>,
}

/// A projected value whose consumption task has not been spawned yet.
struct Activation<U> {
    index: ActivationId,
    token: StopToken,
    pull: Pull<U>,
}

struct Inner<T, U> {
    stage: StageId,
    policy: Policy,
    state: Mutex<State<T, U>>,
    controller: Controller<U>,
    runtime: Handle,
    stats: Arc<EngineStats>,
}

pub(crate) struct Engine<T, U> {
    inner: Arc<Inner<T, U>>,
}

impl<T, U> Clone for Engine<T, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, U> Engine<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    pub(crate) fn new(
        policy: Policy,
        projector: Projector<T, U>,
        controller: Controller<U>,
        runtime: Handle,
        stats: Arc<EngineStats>,
    ) -> Self {
        let stage = StageId::next();
        tracing::debug!(%stage, %policy, "flatten stage created");
        Self {
            inner: Arc::new(Inner {
                stage,
                policy,
                state: Mutex::new(State {
                    coord: Coordination::new(policy, StopToken::new()),
                    projector,
                }),
                controller,
                runtime,
                stats,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, U>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: Event<T>) -> Result<(), StageError> {
        let mut spawned = Vec::new();
        let result = {
            let mut state = self.lock();
            if let Event::Settled {
                index,
                outcome: Outcome::Completed,
            } = &event
            {
                // Retired and post-disposal completions are ignored by the record.
                if state.coord.is_live(*index) {
                    self.inner.stats.record_completed();
                }
            }
            let effect = state.coord.apply(event);
            let result = self.execute(&mut state, effect, &mut spawned);
            self.inner.stats.set_active(state.coord.active());
            result
        };
        for activation in spawned {
            self.spawn(activation);
        }
        result
    }

    fn execute(
        &self,
        state: &mut State<T, U>,
        effect: Effect<T>,
        spawned: &mut Vec<Activation<U>>,
    ) -> Result<(), StageError> {
        let stage = self.inner.stage;
        match effect {
            Effect::Start(start) => self.project(state, start, spawned),
            Effect::Queued { backlog } => {
                self.inner.stats.record_backlog(backlog);
                Ok(())
            }
            Effect::Dropped => {
                self.inner.stats.record_dropped();
                tracing::trace!(%stage, "value dropped while an activation is live");
                Ok(())
            }
            Effect::Rejected(error) => Err(error),
            Effect::CloseOutbound => {
                tracing::debug!(%stage, "flatten stage closed");
                self.inner.controller.close();
                Ok(())
            }
            Effect::ErrorPorts(error) => {
                tracing::debug!(%stage, error = %error, "flatten stage failed");
                self.inner.controller.error(error.clone());
                Err(error)
            }
            Effect::Idle => Ok(()),
        }
    }

    fn project(
        &self,
        state: &mut State<T, U>,
        start: Start<T>,
        spawned: &mut Vec<Activation<U>>,
    ) -> Result<(), StageError> {
        let stage = self.inner.stage;
        let Start {
            value,
            index,
            token,
            superseded,
        } = start;
        if let Some(old) = superseded {
            self.inner.stats.record_superseded();
            tracing::trace!(%stage, superseded = old.get(), by = index.get(), "activation superseded");
        }
        let projector = &mut state.projector;
        let projected = panic::catch_unwind(AssertUnwindSafe(|| projector(value, index)))
            .unwrap_or_else(|payload| Err(panic_reason("projector", payload)));
        match projected {
            Ok(source) => {
                tracing::debug!(
                    %stage,
                    policy = %self.inner.policy,
                    index = index.get(),
                    kind = source.kind(),
                    "activation started"
                );
                self.inner.stats.record_started();
                spawned.push(Activation {
                    index,
                    token,
                    pull: source.into_pull(),
                });
                Ok(())
            }
            Err(reason) => {
                let effect = state
                    .coord
                    .apply(Event::Fail(StageError::Projection { index, reason }));
                self.execute(state, effect, spawned)
            }
        }
    }

    fn spawn(&self, activation: Activation<U>) {
        let engine = self.clone();
        self.inner.runtime.spawn(engine.run(activation));
    }

    async fn run(self, activation: Activation<U>) {
        let Activation {
            index,
            token,
            mut pull,
        } = activation;
        let outcome = AssertUnwindSafe(self.relay(index, &token, &mut pull))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Outcome::Failed(panic_reason("sub-stream", payload)));
        match &outcome {
            Outcome::Stopped => {
                let reason = token
                    .reason()
                    .map(|r| r.to_reason())
                    .unwrap_or_else(|| Reason::msg("outbound port closed"));
                pull.stop(reason);
            }
            Outcome::Completed | Outcome::Failed(_) => {}
        }
        tracing::trace!(stage = %self.inner.stage, index = index.get(), ?outcome, "activation settled");
        // Settlement after disposal is a no-op; errors were already reported.
        let _ = self.apply(Event::Settled { index, outcome });
    }

    async fn relay(&self, index: ActivationId, token: &StopToken, pull: &mut Pull<U>) -> Outcome {
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Stopped,
                next = pull.next() => next,
            };
            let chunk = match next {
                None => return Outcome::Completed,
                Some(Err(reason)) => return Outcome::Failed(reason),
                Some(Ok(chunk)) => chunk,
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return Outcome::Stopped,
                _ = self.inner.controller.ready() => {}
            }
            if !self.emit(index, token, chunk) {
                return Outcome::Stopped;
            }
            // Inline and iterator sources never suspend on their own.
            tokio::task::yield_now().await;
        }
    }

    fn emit(&self, index: ActivationId, token: &StopToken, chunk: U) -> bool {
        let state = self.lock();
        if token.is_triggered() || !state.coord.is_live(index) {
            return false;
        }
        let sent = self.inner.controller.emit(chunk);
        if sent {
            self.inner.stats.record_relayed();
        }
        sent
    }
}

fn panic_reason(what: &str, payload: Box<dyn Any + Send>) -> Reason {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string());
    Reason::msg(format!("{what} panicked: {detail}"))
}

impl<T, U> OutboundHandler for Engine<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn on_cancel(&self, reason: Reason) {
        let _ = self.apply(Event::Fail(StageError::DownstreamCancel(reason)));
    }
}

impl<T, U> InboundHandler<T> for Engine<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn on_write(&self, value: T) -> Result<(), StageError> {
        self.apply(Event::Write(value))
    }

    fn on_close(&self) -> Result<(), StageError> {
        self.apply(Event::InboundClosed)
    }

    fn on_abort(&self, reason: Reason) {
        let _ = self.apply(Event::Fail(StageError::UpstreamAbort(reason)));
    }
}

#[cfg(test)]
mod tests {
    use sluice_core::config::Concurrency;
    use sluice_duplex::{pair, Duplex};

    use super::*;

    fn switch_engine(stats: &Arc<EngineStats>) -> (Engine<u32, u32>, Duplex<u32, u32>) {
        let projector: Projector<u32, u32> =
            Box::new(|n: u32, _: ActivationId| Ok(SubStream::from(vec![n])));
        let mut engine = None;
        let duplex = pair(4, |controller| {
            let built = Engine::new(
                Policy::Switch,
                projector,
                controller,
                Handle::current(),
                Arc::clone(stats),
            );
            engine = Some(built.clone());
            built
        });
        (engine.expect("engine not built"), duplex)
    }

    #[tokio::test]
    async fn late_completions_are_not_counted() {
        let stats = Arc::new(EngineStats::new());
        let (engine, duplex) = switch_engine(&stats);

        // Neither spawned task has run yet; settle them by hand.
        duplex.inbound.write(1).expect("write failed");
        duplex.inbound.write(2).expect("write failed");
        let retired = ActivationId::new(0);
        let current = ActivationId::new(1);

        engine
            .apply(Event::Settled {
                index: retired,
                outcome: Outcome::Completed,
            })
            .expect("settle failed");
        assert_eq!(stats.snapshot().completed, 0);

        duplex.inbound.abort(Reason::msg("gone"));
        let _ = engine.apply(Event::Settled {
            index: current,
            outcome: Outcome::Completed,
        });
        assert_eq!(stats.snapshot().completed, 0);
        assert_eq!(stats.snapshot().superseded, 1);
    }

    #[tokio::test]
    async fn a_panicking_projector_fails_the_stage() {
        let stats = Arc::new(EngineStats::new());
        let projector: Projector<u32, u32> = Box::new(|n: u32, _: ActivationId| {
            if n == 2 {
                panic!("cannot expand {n}");
            }
            Ok(SubStream::from(vec![n]))
        });
        let duplex = pair(4, |controller| {
            Engine::new(
                Policy::Merge(Concurrency::Unbounded),
                projector,
                controller,
                Handle::current(),
                Arc::clone(&stats),
            )
        });

        duplex.inbound.write(1).expect("write failed");
        match duplex.inbound.write(2) {
            Err(StageError::Projection { index, reason }) => {
                assert_eq!(index.get(), 1);
                assert_eq!(reason.to_string(), "projector panicked: cannot expand 2");
            }
            other => panic!("expected a projection error, got {other:?}"),
        }
        assert_eq!(stats.snapshot().active, 0);
    }
}
