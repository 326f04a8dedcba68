//! Process-wide bounded worker pool and cooperative cancellation.
//!
//! Every batch apply and campaign dispatch draws permits from the same
//! `WorkerPool`, so the number of units touching the mail transport at once
//! never exceeds the configured size no matter how many requests are running.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, warn};

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `work` once per input, at most `size` at a time across all
    /// callers of this pool. Results come back in input order.
    ///
    /// Every spawned unit is awaited even if one panics, so no unit is cut
    /// off mid-flight; the first panic is then reported.
    pub async fn map<I, R, F, Fut>(&self, inputs: Vec<I>, work: F) -> Result<Vec<R>, JoinError>
    where
        I: Send + 'static,
        R: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let work = Arc::new(work);
        let mut join_set = JoinSet::new();

        for (index, input) in inputs.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let work = Arc::clone(&work);
            join_set.spawn(async move {
                // The semaphore is never closed; a closed one would only lift the bound.
                let _permit = permits.acquire_owned().await.ok();
                (index, (*work)(input).await)
            });
        }

        let mut slots: Vec<Option<R>> = Vec::new();
        slots.resize_with(join_set.len(), || None);
        let mut first_panic = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(err) => {
                    error!("Worker unit panicked: {}", err);
                    first_panic.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_panic {
            return Err(err);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Shared cancel flag. Units check it before starting side effects; work
/// already in flight is left to finish.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancels the token when the returned guard is dropped, e.g. when the
    /// HTTP request future holding it goes away.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

pub struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs `work` on its own task so that dropping the caller does not abort
/// it. After `deadline` the token is cancelled and the task is still awaited,
/// letting in-flight units reach a terminal state.
pub async fn run_detached<T, Fut>(
    token: &CancellationToken,
    deadline: Duration,
    work: Fut,
) -> Result<T, JoinError>
where
    T: Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let mut handle = tokio::spawn(work);
    match tokio::time::timeout(deadline, &mut handle).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(
                "Batch exceeded its {}s deadline; cancelling units not yet started",
                deadline.as_secs()
            );
            token.cancel();
            handle.await
        }
    }
}
