//! Single-flight tasks.
//!
//! A fetch that several callers wait on runs as its own tokio task. Waiters
//! hold a [`Shared`] handle to the task's join future, so dropping any one of
//! them (a client disconnect, a timeout) never cancels work the others need.

use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FlightError {
    #[error("in-flight task ended without a result: {0}")]
    Aborted(String),
}

pub type SharedFlight<T> = Shared<BoxFuture<'static, Result<T, FlightError>>>;

/// Spawn `work` and return a cloneable handle to its output.
///
/// Must be called from within a tokio runtime.
pub fn spawn_shared<T, F>(work: F) -> SharedFlight<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let handle = tokio::spawn(work);
    async move {
        handle
            .await
            .map_err(|err| FlightError::Aborted(err.to_string()))
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn waiters_share_one_execution() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let flight = spawn_shared(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            42_u32
        });

        let (a, b) = tokio::join!(flight.clone(), flight.clone());

        assert_eq!(a.expect("first waiter"), 42);
        assert_eq!(b.expect("second waiter"), 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_every_waiter_does_not_cancel_the_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let flight = spawn_shared(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(());
        });

        drop(flight);

        rx.await.expect("task completed after its waiters went away");
    }
}
