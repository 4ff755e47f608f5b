//! Run many independent tasks against a session pool, at most
//! `concurrency` at a time, one pooled session per task.

use crate::error::{FatalExecutionError, SessionError};
use crate::session::{with_session_until, Lease, SessionPool};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Result of one task, reported at the task's input position.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub index: usize,
    pub task: String,
    pub result: Result<T, SessionError>,
}

impl<T> TaskOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every task through `runner`, bounded by a semaphore of
/// `concurrency` permits. Outcomes come back in input order.
pub async fn run_all<T, F, Fut>(
    tasks: Vec<String>,
    pool: Arc<dyn SessionPool>,
    concurrency: usize,
    timeout: Option<Duration>,
    runner: F,
) -> Vec<TaskOutcome<T>>
where
    T: Send + 'static,
    F: Fn(String, Lease) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FatalExecutionError>> + Send + 'static,
{
    run_all_until(
        tasks,
        pool,
        concurrency,
        timeout,
        CancellationToken::new(),
        runner,
    )
    .await
}

/// [`run_all`] that stops early when `cancel` fires. Tasks still waiting
/// for a permit report [`SessionError::Cancelled`] without touching the pool.
pub async fn run_all_until<T, F, Fut>(
    tasks: Vec<String>,
    pool: Arc<dyn SessionPool>,
    concurrency: usize,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    runner: F,
) -> Vec<TaskOutcome<T>>
where
    T: Send + 'static,
    F: Fn(String, Lease) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FatalExecutionError>> + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let total = tasks.len();
    info!(
        "[fanout] Running {} task(s) with concurrency {}",
        total, concurrency
    );

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let runner = Arc::new(runner);

    let handles: Vec<_> = tasks
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, task)| {
            let semaphore = semaphore.clone();
            let pool = pool.clone();
            let runner = runner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(SessionError::Cancelled),
                    },
                };
                info!("[fanout] Task {}/{} started", index + 1, total);
                with_session_until(pool.as_ref(), timeout, &cancel, |lease| {
                    runner(task, lease)
                })
                .await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;

    let outcomes: Vec<TaskOutcome<T>> = results
        .into_iter()
        .zip(tasks)
        .enumerate()
        .map(|(index, (joined, task))| {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("[fanout] Task {} did not complete: {}", index + 1, e);
                    Err(SessionError::Panicked(e.to_string()))
                }
            };
            TaskOutcome {
                index,
                task,
                result,
            }
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
    info!(
        "[fanout] Finished: {}/{} task(s) succeeded",
        succeeded, total
    );
    outcomes
}
