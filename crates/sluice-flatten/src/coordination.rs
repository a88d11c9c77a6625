//! Per-engine coordination state.
//!
//! `Coordination` is the only mutable record an engine keeps. It is pure and
//! synchronous: the engine feeds it `Event`s through `apply` and carries out
//! the returned `Effect` (project a value, close or error the outbound port).
//! Once `Phase::Disposed` is reached every event is answered without touching
//! any field, which is what keeps racing terminations down to a single one.

use std::collections::VecDeque;

use sluice_core::cancel::{StopReason, StopToken};
use sluice_core::error::{Reason, StageError};
use sluice_core::id::ActivationId;

use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Inbound open.
    Running,
    /// Inbound closed; waiting for live activations (and backlog) to finish.
    Draining,
    /// Terminal. Reached exactly once.
    Disposed,
}

/// How one activation's consumption loop ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The sub-stream was exhausted.
    Completed,
    /// The activation's token fired, or the outbound port refused a chunk.
    Stopped,
    /// The sub-stream reported a failure.
    Failed(Reason),
}

pub(crate) enum Event<T> {
    Write(T),
    InboundClosed,
    Settled { index: ActivationId, outcome: Outcome },
    Fail(StageError),
}

/// A source value accepted for projection.
pub(crate) struct Start<T> {
    pub value: T,
    pub index: ActivationId,
    pub token: StopToken,
    /// Switch only: the activation this one retired.
    pub superseded: Option<ActivationId>,
}

pub(crate) enum Effect<T> {
    Start(Start<T>),
    Queued { backlog: usize },
    Dropped,
    Rejected(StageError),
    CloseOutbound,
    ErrorPorts(StageError),
    Idle,
}

pub(crate) struct Coordination<T> {
    policy: Policy,
    phase: Phase,
    active: usize,
    backlog: VecDeque<T>,
    next_index: u64,
    // Switch: the one activation allowed to emit.
    current: Option<(ActivationId, StopToken)>,
    shutdown: StopToken,
    failure: Option<StageError>,
}

impl<T> Coordination<T> {
    pub(crate) fn new(policy: Policy, shutdown: StopToken) -> Self {
        Self {
            policy,
            phase: Phase::Running,
            active: 0,
            backlog: VecDeque::new(),
            next_index: 0,
            current: None,
            shutdown,
            failure: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    #[cfg(test)]
    pub(crate) fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// May activation `index` still push chunks downstream?
    pub(crate) fn is_live(&self, index: ActivationId) -> bool {
        if self.phase == Phase::Disposed {
            return false;
        }
        match self.policy {
            Policy::Switch => matches!(self.current, Some((current, _)) if current == index),
            _ => true,
        }
    }

    /// The single mutation entry point.
    pub(crate) fn apply(&mut self, event: Event<T>) -> Effect<T> {
        if self.phase == Phase::Disposed {
            return self.after_dispose(event);
        }
        match event {
            Event::Write(value) => self.admit(value),
            Event::InboundClosed => {
                self.phase = Phase::Draining;
                self.maybe_close()
            }
            Event::Settled { index, outcome } => self.settle(index, outcome),
            Event::Fail(error) => self.dispose(error),
        }
    }

    fn after_dispose(&self, event: Event<T>) -> Effect<T> {
        match (event, &self.failure) {
            (Event::Write(_), Some(error)) | (Event::InboundClosed, Some(error)) => {
                Effect::Rejected(error.clone())
            }
            (Event::Write(_), None) => Effect::Rejected(StageError::Closed),
            _ => Effect::Idle,
        }
    }

    fn admit(&mut self, value: T) -> Effect<T> {
        if self.phase == Phase::Draining {
            return Effect::Rejected(StageError::Closed);
        }
        match self.policy {
            Policy::Merge(limit) => {
                if limit.admits(self.active) {
                    let token = self.shutdown.clone();
                    Effect::Start(self.start(value, token, None))
                } else {
                    self.backlog.push_back(value);
                    Effect::Queued {
                        backlog: self.backlog.len(),
                    }
                }
            }
            Policy::Exhaust => {
                if self.active == 0 {
                    let token = self.shutdown.clone();
                    Effect::Start(self.start(value, token, None))
                } else {
                    Effect::Dropped
                }
            }
            Policy::Switch => {
                let superseded = self.current.take().map(|(index, token)| {
                    token.trigger(StopReason::Superseded);
                    self.active -= 1;
                    index
                });
                let token = self.shutdown.child();
                let start = self.start(value, token.clone(), superseded);
                self.current = Some((start.index, token));
                Effect::Start(start)
            }
        }
    }

    fn start(
        &mut self,
        value: T,
        token: StopToken,
        superseded: Option<ActivationId>,
    ) -> Start<T> {
        let index = ActivationId::new(self.next_index);
        self.next_index += 1;
        self.active += 1;
        Start {
            value,
            index,
            token,
            superseded,
        }
    }

    fn settle(&mut self, index: ActivationId, outcome: Outcome) -> Effect<T> {
        if self.policy == Policy::Switch && !self.is_live(index) {
            // Retired by a newer activation; whatever it ended with is swallowed.
            return Effect::Idle;
        }
        match outcome {
            // Only a fired token or a refused emit stops an activation, and
            // both imply supersession (handled above) or disposal.
            Outcome::Stopped => Effect::Idle,
            Outcome::Failed(reason) => self.dispose(StageError::SubStream { index, reason }),
            Outcome::Completed => {
                self.active -= 1;
                if self.policy == Policy::Switch {
                    self.current = None;
                }
                if let Some(value) = self.backlog.pop_front() {
                    let token = self.shutdown.clone();
                    return Effect::Start(self.start(value, token, None));
                }
                self.maybe_close()
            }
        }
    }

    fn maybe_close(&mut self) -> Effect<T> {
        if self.phase == Phase::Draining && self.active == 0 && self.backlog.is_empty() {
            self.phase = Phase::Disposed;
            Effect::CloseOutbound
        } else {
            Effect::Idle
        }
    }

    fn dispose(&mut self, error: StageError) -> Effect<T> {
        self.phase = Phase::Disposed;
        self.failure = Some(error.clone());
        self.backlog.clear();
        self.active = 0;
        if let Some((_, token)) = self.current.take() {
            token.trigger(StopReason::Shutdown(error.clone()));
        }
        self.shutdown.trigger(StopReason::Shutdown(error.clone()));
        Effect::ErrorPorts(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::config::Concurrency;

    fn merge(limit: usize) -> Coordination<u32> {
        Coordination::new(
            Policy::Merge(Concurrency::bounded(limit).unwrap()),
            StopToken::new(),
        )
    }

    fn started(effect: Effect<u32>) -> Start<u32> {
        match effect {
            Effect::Start(start) => start,
            _ => panic!("expected a start"),
        }
    }

    fn settled(index: ActivationId) -> Event<u32> {
        Event::Settled {
            index,
            outcome: Outcome::Completed,
        }
    }

    #[test]
    fn merge_queues_beyond_limit_and_promotes_fifo() {
        let mut c = merge(2);
        let a = started(c.apply(Event::Write(1)));
        let b = started(c.apply(Event::Write(2)));
        assert!(matches!(c.apply(Event::Write(3)), Effect::Queued { backlog: 1 }));
        assert!(matches!(c.apply(Event::Write(4)), Effect::Queued { backlog: 2 }));
        assert_eq!((a.index.get(), b.index.get()), (0, 1));

        // Index is assigned at projection, so backlog values keep arrival order.
        let next = started(c.apply(settled(b.index)));
        assert_eq!((next.value, next.index.get()), (3, 2));
        let next = started(c.apply(settled(a.index)));
        assert_eq!((next.value, next.index.get()), (4, 3));
        assert_eq!(c.active(), 2);
        assert_eq!(c.backlog_len(), 0);
    }

    #[test]
    fn close_with_nothing_active_disposes_immediately() {
        let mut c = merge(1);
        assert!(matches!(c.apply(Event::InboundClosed), Effect::CloseOutbound));
        assert_eq!(c.phase(), Phase::Disposed);
        assert!(matches!(
            c.apply(Event::Write(1)),
            Effect::Rejected(StageError::Closed)
        ));
        assert!(matches!(c.apply(Event::InboundClosed), Effect::Idle));
    }

    #[test]
    fn close_waits_for_backlog_and_last_activation() {
        let mut c = merge(1);
        let a = started(c.apply(Event::Write(1)));
        c.apply(Event::Write(2));
        assert!(matches!(c.apply(Event::InboundClosed), Effect::Idle));
        assert_eq!(c.phase(), Phase::Draining);
        assert!(matches!(
            c.apply(Event::Write(9)),
            Effect::Rejected(StageError::Closed)
        ));
        let b = started(c.apply(settled(a.index)));
        assert!(matches!(c.apply(settled(b.index)), Effect::CloseOutbound));
        assert_eq!(c.phase(), Phase::Disposed);
    }

    #[test]
    fn first_failure_wins_and_fires_shutdown() {
        let shutdown = StopToken::new();
        let mut c: Coordination<u32> = Coordination::new(Policy::Exhaust, shutdown.clone());
        let a = started(c.apply(Event::Write(1)));
        let effect = c.apply(Event::Fail(StageError::UpstreamAbort(Reason::msg("up"))));
        assert!(matches!(effect, Effect::ErrorPorts(StageError::UpstreamAbort(_))));
        assert!(shutdown.is_triggered());
        assert!(a.token.is_triggered());

        let again = c.apply(Event::Fail(StageError::DownstreamCancel(Reason::msg("down"))));
        assert!(matches!(again, Effect::Idle));
        match c.apply(Event::Write(2)) {
            Effect::Rejected(StageError::UpstreamAbort(r)) => assert_eq!(r.to_string(), "up"),
            _ => panic!("expected the original failure"),
        }
        assert!(matches!(
            c.apply(Event::Settled {
                index: a.index,
                outcome: Outcome::Failed(Reason::msg("late")),
            }),
            Effect::Idle
        ));
    }

    #[test]
    fn exhaust_drops_while_busy() {
        let mut c: Coordination<u32> = Coordination::new(Policy::Exhaust, StopToken::new());
        let a = started(c.apply(Event::Write(1)));
        assert!(matches!(c.apply(Event::Write(2)), Effect::Dropped));
        assert!(matches!(c.apply(Event::Write(3)), Effect::Dropped));
        c.apply(settled(a.index));
        let b = started(c.apply(Event::Write(4)));
        // Dropped values never consume an index.
        assert_eq!((b.value, b.index.get()), (4, 1));
    }

    #[test]
    fn switch_supersedes_and_swallows_the_retired_activation() {
        let shutdown = StopToken::new();
        let mut c: Coordination<u32> = Coordination::new(Policy::Switch, shutdown.clone());
        let a = started(c.apply(Event::Write(1)));
        let b = started(c.apply(Event::Write(2)));
        assert_eq!(b.superseded, Some(a.index));
        assert!(a.token.is_superseded());
        assert!(!shutdown.is_triggered());
        assert!(!b.token.is_triggered());
        assert!(!c.is_live(a.index));
        assert!(c.is_live(b.index));
        assert_eq!(c.active(), 1);

        // The retired activation ends Stopped, or even Failed, and nothing happens.
        assert!(matches!(
            c.apply(Event::Settled {
                index: a.index,
                outcome: Outcome::Failed(Reason::msg("superseded")),
            }),
            Effect::Idle
        ));
        assert_eq!(c.active(), 1);

        c.apply(Event::InboundClosed);
        assert!(matches!(c.apply(settled(b.index)), Effect::CloseOutbound));
    }

    #[test]
    fn sub_stream_failure_is_reported_with_its_index() {
        let mut c = merge(4);
        let a = started(c.apply(Event::Write(1)));
        let effect = c.apply(Event::Settled {
            index: a.index,
            outcome: Outcome::Failed(Reason::msg("bad chunk")),
        });
        match effect {
            Effect::ErrorPorts(StageError::SubStream { index, reason }) => {
                assert_eq!(index, a.index);
                assert_eq!(reason.to_string(), "bad chunk");
            }
            _ => panic!("expected sub-stream error"),
        }
        assert!(!c.is_live(a.index));
    }
}
