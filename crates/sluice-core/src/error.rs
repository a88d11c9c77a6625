use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::id::ActivationId;

/// Result for construction-time validation.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Type-erased cause carried by every failure a port can observe.
///
/// Cloning is cheap (one `Arc`), so the same reason can be handed to the
/// inbound port, the outbound port and every running sub-stream.
#[derive(Clone)]
pub struct Reason(Arc<dyn StdError + Send + Sync + 'static>);

impl Reason {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// A reason that is just a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self(Arc::from(error))
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// True when both reasons originate from the same failure.
    pub fn ptr_eq(&self, other: &Reason) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Reason {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

/// Failure observed on a stage's ports.
///
/// Every variant except `Closed` is terminal: the engine disposes and both
/// ports report the same error from then on.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("projector failed on {index}: {reason}")]
    Projection {
        index: ActivationId,
        #[source]
        reason: Reason,
    },

    #[error("sub-stream {index} failed: {reason}")]
    SubStream {
        index: ActivationId,
        #[source]
        reason: Reason,
    },

    #[error("upstream aborted: {0}")]
    UpstreamAbort(#[source] Reason),

    #[error("downstream cancelled: {0}")]
    DownstreamCancel(#[source] Reason),

    // Returned to a writer that keeps writing after close; never delivered downstream.
    #[error("inbound port is closed")]
    Closed,
}

impl StageError {
    /// The originating reason, if this error carries one.
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            StageError::Projection { reason, .. } | StageError::SubStream { reason, .. } => {
                Some(reason)
            }
            StageError::UpstreamAbort(reason) | StageError::DownstreamCancel(reason) => {
                Some(reason)
            }
            StageError::Closed => None,
        }
    }
}

/// Construction-time failures. No ports exist when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("flatten stage requires a projector")]
    InvalidProjector,

    #[error("concurrency limit must be positive or unbounded, got {0}")]
    InvalidConcurrency(usize),

    #[error("outbound high-water mark must be positive")]
    InvalidHighWaterMark,

    #[error("stages must be constructed inside a tokio runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom {0}")]
    struct Boom(u32);

    #[test]
    fn reason_keeps_the_original_error() {
        let reason = Reason::new(Boom(3));
        assert_eq!(reason.to_string(), "boom 3");
        assert_eq!(reason.downcast_ref::<Boom>().map(|b| b.0), Some(3));

        let copy = reason.clone();
        assert!(copy.ptr_eq(&reason));
        assert!(!Reason::new(Boom(3)).ptr_eq(&reason));
    }

    #[test]
    fn stage_error_exposes_reason_and_source() {
        let reason = Reason::msg("gone");
        let err = StageError::SubStream {
            index: ActivationId::new(2),
            reason: reason.clone(),
        };
        assert!(err.reason().is_some_and(|r| r.ptr_eq(&reason)));
        assert_eq!(err.to_string(), "sub-stream ActivationId(2) failed: gone");
        assert!(StdError::source(&err).is_some());
        assert!(StageError::Closed.reason().is_none());
    }
}
