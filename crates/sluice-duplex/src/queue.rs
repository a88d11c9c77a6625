//! Outbound queue shared between a stage's controller and its outbound port.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use sluice_core::error::StageError;
use tokio::sync::Notify;

enum Status {
    Open,
    Closed,
    Errored {
        error: StageError,
        delivered: bool,
    },
}

struct QueueState<U> {
    chunks: VecDeque<U>,
    status: Status,
    reader: Option<Waker>,
}

impl<U> QueueState<U> {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

pub(crate) struct Shared<U> {
    state: Mutex<QueueState<U>>,
    space: Notify,
    high_water_mark: usize,
}

impl<U> Shared<U> {
    pub(crate) fn new(high_water_mark: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                chunks: VecDeque::new(),
                status: Status::Open,
                reader: None,
            }),
            space: Notify::new(),
            high_water_mark,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<U>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn desired_size(&self) -> Option<isize> {
        let state = self.lock();
        match state.status {
            Status::Open => Some(self.high_water_mark as isize - state.chunks.len() as isize),
            Status::Closed => Some(0),
            Status::Errored { .. } => None,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self.lock().status, Status::Open)
    }

    /// Reader side of the queue. Yields chunks, then the terminal event once.
    pub(crate) fn poll_pop(&self, cx: &mut Context<'_>) -> Poll<Option<Result<U, StageError>>> {
        let mut state = self.lock();
        if let Status::Errored { error, delivered } = &mut state.status {
            if *delivered {
                return Poll::Ready(None);
            }
            *delivered = true;
            return Poll::Ready(Some(Err(error.clone())));
        }
        if let Some(chunk) = state.chunks.pop_front() {
            drop(state);
            self.space.notify_waiters();
            return Poll::Ready(Some(Ok(chunk)));
        }
        if matches!(state.status, Status::Closed) {
            return Poll::Ready(None);
        }
        state.reader = Some(cx.waker().clone());
        Poll::Pending
    }

    pub(crate) fn is_terminated(&self) -> bool {
        let state = self.lock();
        match state.status {
            Status::Open => false,
            Status::Closed => state.chunks.is_empty(),
            Status::Errored { delivered, .. } => delivered,
        }
    }
}

/// The stage's write capability on its outbound port: emit, close, error.
///
/// `close` and `error` are first-wins. Once either has happened, `emit` is
/// refused and `ready` resolves immediately.
pub struct Controller<U> {
    shared: Arc<Shared<U>>,
}

impl<U> Clone for Controller<U> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<U> Controller<U> {
    pub(crate) fn new(shared: Arc<Shared<U>>) -> Self {
        Self { shared }
    }

    /// Queue a chunk for the reader. Returns false if the port is no longer open.
    pub fn emit(&self, chunk: U) -> bool {
        let mut state = self.shared.lock();
        if !matches!(state.status, Status::Open) {
            return false;
        }
        state.chunks.push_back(chunk);
        state.wake_reader();
        true
    }

    /// Close after the queued chunks drain. Returns false if already terminated.
    pub fn close(&self) -> bool {
        let mut state = self.shared.lock();
        if !matches!(state.status, Status::Open) {
            return false;
        }
        state.status = Status::Closed;
        state.wake_reader();
        drop(state);
        self.shared.space.notify_waiters();
        true
    }

    /// Error the port. Queued chunks are discarded; the reader sees `error` next.
    pub fn error(&self, error: StageError) -> bool {
        let mut state = self.shared.lock();
        if !matches!(state.status, Status::Open) {
            return false;
        }
        state.chunks.clear();
        state.status = Status::Errored {
            error,
            delivered: false,
        };
        state.wake_reader();
        drop(state);
        self.shared.space.notify_waiters();
        true
    }

    /// High-water mark minus queued chunks; `Some(0)` once closed, `None` once errored.
    pub fn desired_size(&self) -> Option<isize> {
        self.shared.desired_size()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Wait until the queue has room or the port is no longer open.
    pub async fn ready(&self) {
        loop {
            let notified = self.shared.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            match self.shared.desired_size() {
                Some(size) if size <= 0 && self.shared.is_open() => {}
                _ => return,
            }
            notified.await;
        }
    }
}
