use std::collections::VecDeque;
use std::fmt;

use futures::stream::{BoxStream, Stream, StreamExt};
use sluice_core::error::Reason;
use sluice_duplex::Outbound;

use crate::pull::Pull;

/// Everything a projector may return, as one closed set of shapes.
pub enum SubStream<U> {
    /// Chunks already in hand (an array).
    Inline(VecDeque<U>),
    /// A synchronous sequence, pulled lazily.
    Iter(Box<dyn Iterator<Item = U> + Send>),
    /// An asynchronous sequence; an `Err` item fails the sub-stream.
    Stream(BoxStream<'static, Result<U, Reason>>),
    /// The outbound port of another stage.
    Stage(Outbound<U>),
}

impl<U> SubStream<U> {
    pub fn empty() -> Self {
        SubStream::Inline(VecDeque::new())
    }

    pub fn iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = U>,
        I::IntoIter: Send + 'static,
    {
        SubStream::Iter(Box::new(iter.into_iter()))
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = U> + Send + 'static,
        U: Send + 'static,
    {
        SubStream::Stream(stream.map(Ok).boxed())
    }

    pub fn try_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<U, Reason>> + Send + 'static,
    {
        SubStream::Stream(stream.boxed())
    }

    /// Resolve the shape once; the engine only ever sees the returned `Pull`.
    pub fn into_pull(self) -> Pull<U> {
        Pull::new(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SubStream::Inline(_) => "inline",
            SubStream::Iter(_) => "iter",
            SubStream::Stream(_) => "stream",
            SubStream::Stage(_) => "stage",
        }
    }
}

impl<U> From<Vec<U>> for SubStream<U> {
    fn from(chunks: Vec<U>) -> Self {
        SubStream::Inline(chunks.into())
    }
}

impl<U> From<VecDeque<U>> for SubStream<U> {
    fn from(chunks: VecDeque<U>) -> Self {
        SubStream::Inline(chunks)
    }
}

impl<U> From<Outbound<U>> for SubStream<U> {
    fn from(port: Outbound<U>) -> Self {
        SubStream::Stage(port)
    }
}

impl<U> fmt::Debug for SubStream<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubStream::{}", self.kind())
    }
}
