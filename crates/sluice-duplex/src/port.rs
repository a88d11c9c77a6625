//! Inbound and outbound ports, and the `pair` constructor that joins them.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream, StreamExt};
use sluice_core::error::{Reason, StageError};

use crate::queue::{Controller, Shared};

/// Reaction to the outbound port being cancelled by its reader.
pub trait OutboundHandler: Send + Sync + 'static {
    fn on_cancel(&self, reason: Reason);
}

/// Stage logic behind an inbound port.
///
/// Every call is a synchronous handoff; implementations must accept any of
/// them at any time, including after the stage has already terminated.
pub trait InboundHandler<T>: OutboundHandler {
    fn on_write(&self, value: T) -> Result<(), StageError>;
    fn on_close(&self) -> Result<(), StageError>;
    fn on_abort(&self, reason: Reason);
}

/// Both ends of one stage.
pub struct Duplex<T: 'static, U> {
    pub inbound: Inbound<T>,
    pub outbound: Outbound<U>,
}

impl<T: 'static, U> Duplex<T, U> {
    pub fn into_parts(self) -> (Inbound<T>, Outbound<U>) {
        (self.inbound, self.outbound)
    }
}

/// Build a stage: `make` receives the outbound controller and returns the
/// handler that will receive everything written to the inbound port.
pub fn pair<T: 'static, U, H, F>(high_water_mark: usize, make: F) -> Duplex<T, U>
where
    H: InboundHandler<T>,
    F: FnOnce(Controller<U>) -> H,
{
    let shared = Arc::new(Shared::new(high_water_mark));
    let handler = Arc::new(make(Controller::new(Arc::clone(&shared))));
    Duplex {
        inbound: Inbound {
            handler: handler.clone(),
        },
        outbound: Outbound { shared, handler },
    }
}

/// Write side of a stage. Dropping it closes the stage's input.
pub struct Inbound<T: 'static> {
    handler: Arc<dyn InboundHandler<T>>,
}

impl<T: 'static> Inbound<T> {
    /// Hand one value to the stage.
    ///
    /// Fails with the stage's terminal error once it has errored, or with
    /// `StageError::Closed` after `close`.
    pub fn write(&self, value: T) -> Result<(), StageError> {
        self.handler.on_write(value)
    }

    /// Signal that no more values will be written. Idempotent.
    pub fn close(&self) -> Result<(), StageError> {
        self.handler.on_close()
    }

    /// Fail the stage from upstream. A no-op once the stage has terminated.
    pub fn abort(&self, reason: Reason) {
        self.handler.on_abort(reason)
    }

    /// Write every item of `source`, then close.
    ///
    /// An `Err` item aborts the stage with that reason and stops piping.
    pub async fn pipe_from<S>(self, source: S) -> Result<(), StageError>
    where
        S: Stream<Item = Result<T, Reason>>,
    {
        futures::pin_mut!(source);
        while let Some(item) = source.next().await {
            match item {
                Ok(value) => self.write(value)?,
                Err(reason) => {
                    self.abort(reason.clone());
                    return Err(StageError::UpstreamAbort(reason));
                }
            }
        }
        self.close()
    }
}

impl<T: 'static> Drop for Inbound<T> {
    fn drop(&mut self) {
        let _ = self.handler.on_close();
    }
}

/// Read side of a stage: a stream of chunks ending in at most one error.
pub struct Outbound<U> {
    shared: Arc<Shared<U>>,
    handler: Arc<dyn OutboundHandler>,
}

impl<U> Outbound<U> {
    /// Tell the stage the reader is gone. A no-op once the stage has terminated.
    pub fn cancel(&self, reason: Reason) {
        self.handler.on_cancel(reason)
    }

    pub fn desired_size(&self) -> Option<isize> {
        self.shared.desired_size()
    }
}

impl<U> Stream for Outbound<U> {
    type Item = Result<U, StageError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.shared.poll_pop(cx)
    }
}

impl<U> FusedStream for Outbound<U> {
    fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }
}

impl<U> Drop for Outbound<U> {
    fn drop(&mut self) {
        if self.shared.is_open() {
            tracing::trace!("outbound port dropped while open; cancelling stage");
            self.handler
                .on_cancel(Reason::msg("outbound port dropped"));
        }
    }
}
