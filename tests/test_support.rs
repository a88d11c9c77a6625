//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use sluice::{EngineStats, Outbound, Reason, StageError, SubStream};

/// A sub-stream the test feeds by hand. Dropping the sender completes it.
pub fn channel<U: Send + 'static>() -> (UnboundedSender<Result<U, Reason>>, SubStream<U>) {
    let (tx, rx) = unbounded();
    (tx, SubStream::try_stream(rx))
}

/// Read the outbound port to its end.
///
/// Returns the chunks seen and the terminal error, if any. Panics if anything
/// follows the error or the port does not terminate within a few seconds.
pub async fn collect<U>(mut outbound: Outbound<U>) -> (Vec<U>, Option<StageError>) {
    let drain = async {
        let mut chunks = Vec::new();
        while let Some(item) = outbound.next().await {
            match item {
                Ok(chunk) => chunks.push(chunk),
                Err(err) => {
                    assert!(
                        outbound.next().await.is_none(),
                        "outbound yielded after its terminal error"
                    );
                    return (chunks, Some(err));
                }
            }
        }
        (chunks, None)
    };
    tokio::time::timeout(Duration::from_secs(5), drain)
        .await
        .expect("outbound port never terminated")
}

/// Let spawned activations run for a while.
pub async fn spin(turns: usize) {
    for _ in 0..turns {
        tokio::task::yield_now().await;
    }
}

/// Wait until no activation is live.
pub async fn settle(stats: &EngineStats) {
    for _ in 0..10_000 {
        if stats.snapshot().active == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("engine never settled: {:?}", stats.snapshot());
}

/// Wait until the receiving side of a hand-fed sub-stream is gone.
pub async fn until_released<U>(tx: &UnboundedSender<U>) {
    for _ in 0..10_000 {
        if tx.is_closed() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("sub-stream was never released");
}
