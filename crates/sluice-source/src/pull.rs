//! Uniform pull interface over every `SubStream` shape.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{BoxStream, Stream, StreamExt};
use sluice_core::error::Reason;
use sluice_duplex::Outbound;

use crate::sub_stream::SubStream;

enum Inner<U> {
    Inline(Box<VecDeque<U>>),
    Iter(Box<dyn Iterator<Item = U> + Send>),
    Stream(BoxStream<'static, Result<U, Reason>>),
    Stage(Outbound<U>),
}

/// "Get next chunk" and "stop early" for one running sub-stream.
///
/// As a `Stream`, yields `Ok` chunks until the source is exhausted; an `Err`
/// item means the source failed and nothing further should be pulled.
pub struct Pull<U> {
    inner: Inner<U>,
}

impl<U> Pull<U> {
    pub(crate) fn new(source: SubStream<U>) -> Self {
        let inner = match source {
            SubStream::Inline(chunks) => Inner::Inline(Box::new(chunks)),
            SubStream::Iter(iter) => Inner::Iter(iter),
            SubStream::Stream(stream) => Inner::Stream(stream),
            SubStream::Stage(port) => Inner::Stage(port),
        };
        Self { inner }
    }

    /// Stop consuming before the source is exhausted.
    ///
    /// A nested stage is cancelled with `reason`; other shapes are just dropped.
    pub fn stop(self, reason: Reason) {
        if let Inner::Stage(port) = self.inner {
            port.cancel(reason);
        }
    }
}

impl<U> Stream for Pull<U> {
    type Item = Result<U, Reason>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            Inner::Inline(chunks) => Poll::Ready(chunks.pop_front().map(Ok)),
            Inner::Iter(iter) => Poll::Ready(iter.next().map(Ok)),
            Inner::Stream(stream) => stream.poll_next_unpin(cx),
            Inner::Stage(port) => port
                .poll_next_unpin(cx)
                .map(|item| item.map(|r| r.map_err(Reason::new))),
        }
    }
}
