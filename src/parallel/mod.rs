//! Concurrent fan-out over a stream with first-failure cancellation.
//!
//! - [`for_each`] runs an operation per element and reports the first error.
//! - [`flat_map`] runs an operation per element that yields a sub-stream and
//!   merges every sub-stream into one output stream.
//!
//! Every operation receives a [`CancelSignal`]. The first failure trips it;
//! operations not yet started never start, running ones are dropped at their
//! next await point, and no further input is consumed. No ordering holds
//! across elements.

use anyhow::{anyhow, Result};
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Capacity of the merged output channel of [`flat_map`].
pub const MERGE_BUFFER: usize = 64;

/// Cooperative cancellation shared by the tasks of one fan-out.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is tripped.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so wait_for cannot fail while we wait
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Run `fut` unless the fan-out is already cancelled, abandoning it if
/// cancellation arrives first. Trips `cancel` when `fut` fails.
async fn run_guarded<F, R>(fut: F, cancel: CancelSignal) -> Option<Result<R>>
where
    F: Future<Output = Result<R>>,
{
    if cancel.is_cancelled() {
        return None;
    }
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        outcome = fut => outcome,
    };
    if outcome.is_err() {
        cancel.cancel();
    }
    Some(outcome)
}

/// Apply `op` to every element of `items` concurrently.
///
/// # Returns
/// * `Ok(())` - Every operation completed successfully
/// * `Err` - The first operation error; the remaining operations were
///   cancelled
pub async fn for_each<S, T, F, Fut>(items: S, op: F) -> Result<()>
where
    S: Stream<Item = T>,
    F: Fn(T, CancelSignal) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let cancel = CancelSignal::new();
    let mut tasks = JoinSet::new();

    futures::pin_mut!(items);
    while let Some(item) = items.next().await {
        if cancel.is_cancelled() {
            debug!("Fan-out cancelled, not consuming further input");
            break;
        }
        tasks.spawn(run_guarded(op(item, cancel.clone()), cancel.clone()));
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok(Some(Err(e))) => e,
            Ok(_) => continue,
            Err(e) => anyhow!("Fan-out task failed: {}", e),
        };
        cancel.cancel();
        first_error.get_or_insert(failure);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Merged output of [`flat_map`].
///
/// Yields sub-stream items as they arrive. After the stream ends, call
/// [`finish`](Self::finish) to learn whether it ended because of a failure.
pub struct FlatMapped<U> {
    items: ReceiverStream<U>,
    outcome: oneshot::Receiver<Result<()>>,
}

impl<U> Stream for FlatMapped<U> {
    type Item = U;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<U>> {
        Pin::new(&mut self.items).poll_next(cx)
    }
}

impl<U> FlatMapped<U> {
    /// Stop consuming and report how the fan-out ended.
    ///
    /// # Returns
    /// * `Ok(())` - Every operation and sub-stream completed
    /// * `Err` - The failure that cancelled the fan-out
    pub async fn finish(self) -> Result<()> {
        let FlatMapped { items, outcome } = self;
        // Unblock producers waiting on a full channel
        drop(items);
        outcome
            .await
            .unwrap_or_else(|_| Err(anyhow!("Fan-out driver stopped unexpectedly")))
    }

    /// Drain the stream into a vector, failing if the fan-out failed.
    pub async fn collect_all(mut self) -> Result<Vec<U>> {
        let mut collected = Vec::new();
        while let Some(item) = self.items.next().await {
            collected.push(item);
        }
        self.finish().await?;
        Ok(collected)
    }
}

/// Apply `op` to every element of `items` concurrently and merge the
/// sub-streams it produces.
///
/// An `Err` from `op`, or an `Err` element from a sub-stream, cancels the
/// remaining work and ends the merged stream; items already delivered stay
/// delivered. Must be called from within a tokio runtime.
pub fn flat_map<S, T, U, F, Fut, Sub>(items: S, op: F) -> FlatMapped<U>
where
    S: Stream<Item = T> + Send + 'static,
    T: Send + 'static,
    U: Send + 'static,
    F: Fn(T, CancelSignal) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Sub>> + Send + 'static,
    Sub: Stream<Item = Result<U>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(MERGE_BUFFER);
    let (outcome_tx, outcome_rx) = oneshot::channel();

    tokio::spawn(async move {
        let cancel = CancelSignal::new();
        let mut tasks = JoinSet::new();

        futures::pin_mut!(items);
        while let Some(item) = items.next().await {
            if cancel.is_cancelled() {
                break;
            }
            let tx = tx.clone();
            let fut = op(item, cancel.clone());
            tasks.spawn(run_guarded(forward(fut, tx, cancel.clone()), cancel.clone()));
        }
        drop(tx);

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok(Some(Err(e))) => e,
                Ok(_) => continue,
                Err(e) => anyhow!("Fan-out task failed: {}", e),
            };
            cancel.cancel();
            first_error.get_or_insert(failure);
        }

        let _ = outcome_tx.send(match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        });
    });

    FlatMapped {
        items: ReceiverStream::new(rx),
        outcome: outcome_rx,
    }
}

/// Await the sub-stream and push its items into the merged channel.
async fn forward<Fut, Sub, U>(fut: Fut, tx: mpsc::Sender<U>, cancel: CancelSignal) -> Result<()>
where
    Fut: Future<Output = Result<Sub>>,
    Sub: Stream<Item = Result<U>>,
{
    let sub = fut.await?;
    futures::pin_mut!(sub);
    while let Some(item) = sub.next().await {
        if cancel.is_cancelled() {
            break;
        }
        if tx.send(item?).await.is_err() {
            // Consumer went away
            cancel.cancel();
            break;
        }
    }
    Ok(())
}
