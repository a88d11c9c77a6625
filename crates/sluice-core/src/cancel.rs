//! One-shot stop tokens with a first-wins reason.
//!
//! A `StopToken` is a `tokio_util` cancellation token plus the reason it was
//! triggered with. Children fire when their parent fires, but triggering a
//! child never touches the parent, so a switch engine can retire one
//! activation without stopping the ones that come after it.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Reason, StageError};

/// Why a token fired.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// A newer activation replaced this one. Handled inside the engine only.
    Superseded,
    /// The whole engine is shutting down with this error.
    Shutdown(StageError),
}

impl StopReason {
    /// The reason handed to a sub-stream that is being stopped early.
    pub fn to_reason(&self) -> Reason {
        match self {
            StopReason::Superseded => Reason::msg("superseded by a newer activation"),
            StopReason::Shutdown(err) => Reason::new(err.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StopToken {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
    parent: Option<Box<StopToken>>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
            parent: None,
        }
    }

    /// A token that fires with this one but can also be triggered on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            reason: Arc::new(OnceLock::new()),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Fire the token. Only the first reason is kept; later calls are no-ops.
    pub fn trigger(&self, reason: StopReason) {
        // Record before cancelling so woken waiters always find a reason.
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the token (or any ancestor) has fired.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Own reason if triggered directly, otherwise the nearest ancestor's.
    pub fn reason(&self) -> Option<StopReason> {
        if let Some(reason) = self.reason.get() {
            return Some(reason.clone());
        }
        self.parent.as_ref().and_then(|p| p.reason())
    }

    /// True when this token was retired by supersession rather than shutdown.
    pub fn is_superseded(&self) -> bool {
        matches!(self.reason.get(), Some(StopReason::Superseded))
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shutdown(msg: &str) -> StopReason {
        StopReason::Shutdown(StageError::DownstreamCancel(Reason::msg(msg)))
    }

    #[test]
    fn first_reason_wins() {
        let token = StopToken::new();
        token.trigger(shutdown("first"));
        token.trigger(shutdown("second"));
        assert!(token.is_triggered());
        match token.reason() {
            Some(StopReason::Shutdown(err)) => {
                assert_eq!(err.to_string(), "downstream cancelled: first")
            }
            other => panic!("unexpected reason: {other:?}"),
        }
    }

    #[test]
    fn child_does_not_fire_parent() {
        let parent = StopToken::new();
        let child = parent.child();
        child.trigger(StopReason::Superseded);
        assert!(child.is_triggered());
        assert!(child.is_superseded());
        assert!(!parent.is_triggered());
        assert!(parent.reason().is_none());
    }

    #[test]
    fn parent_fires_children_with_its_reason() {
        let parent = StopToken::new();
        let child = parent.child();
        parent.trigger(shutdown("stop"));
        assert!(child.is_triggered());
        assert!(!child.is_superseded());
        assert!(matches!(child.reason(), Some(StopReason::Shutdown(_))));
    }

    #[tokio::test]
    async fn cancelled_resolves_after_trigger() {
        let token = StopToken::new();
        let waiter = token.clone();
        token.trigger(StopReason::Superseded);
        waiter.cancelled().await;
        assert!(waiter.is_superseded());
    }
}
