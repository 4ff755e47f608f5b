//! Pooled browser sessions and the release-exactly-once guard.

use crate::error::{FatalExecutionError, PoolError, SessionError};
use crate::executor::BrowserControl;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A remote browser session handed out by a pool.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub browser: Arc<dyn BrowserControl>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// External pool of reusable browser sessions. Must tolerate concurrent
/// acquire and release calls.
#[async_trait]
pub trait SessionPool: Send + Sync {
    async fn acquire(&self) -> Result<SessionHandle, PoolError>;

    /// Return a session. `reuse = false` asks the pool to discard it.
    async fn release(&self, session_id: &str, reuse: bool) -> Result<(), PoolError>;
}

/// A session on loan to one task.
#[derive(Debug, Clone)]
pub struct Lease {
    handle: SessionHandle,
    reusable: Arc<AtomicBool>,
}

impl Lease {
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    pub fn browser(&self) -> Arc<dyn BrowserControl> {
        self.handle.browser.clone()
    }

    /// Release the session with `reuse = false` even if the task succeeds.
    pub fn mark_not_reusable(&self) {
        self.reusable.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Acquire a session, run `work` on it, and release it exactly once.
///
/// The session is released with `reuse = false` when the work returns a
/// fatal error, panics, times out, or when the lease was marked.
pub async fn with_session<T, F, Fut>(
    pool: &dyn SessionPool,
    timeout: Option<Duration>,
    work: F,
) -> Result<T, SessionError>
where
    F: FnOnce(Lease) -> Fut,
    Fut: Future<Output = Result<T, FatalExecutionError>>,
{
    with_session_until(pool, timeout, &CancellationToken::new(), work).await
}

/// [`with_session`] that also stops when `cancel` fires.
pub async fn with_session_until<T, F, Fut>(
    pool: &dyn SessionPool,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, SessionError>
where
    F: FnOnce(Lease) -> Fut,
    Fut: Future<Output = Result<T, FatalExecutionError>>,
{
    let handle = pool.acquire().await?;
    let session_id = handle.id.clone();
    let reusable = Arc::new(AtomicBool::new(true));
    info!("[session] Acquired {}", session_id);

    let lease = Lease {
        handle,
        reusable: reusable.clone(),
    };
    let guarded = AssertUnwindSafe(work(lease)).catch_unwind();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        outcome = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, guarded)
                    .await
                    .map_err(|_| SessionError::TimedOut(limit)),
                None => Ok(guarded.await),
            }
        } => match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(fatal))) => Err(SessionError::Fatal(fatal)),
            Ok(Err(payload)) => Err(SessionError::Panicked(panic_message(payload))),
            Err(timed_out) => Err(timed_out),
        },
    };

    let reuse = result.is_ok() && reusable.load(Ordering::SeqCst);
    if let Err(e) = &result {
        warn!("[session] Task on {} ended with error: {}", session_id, e);
    }
    match pool.release(&session_id, reuse).await {
        Ok(()) => info!("[session] Released {} (reuse: {})", session_id, reuse),
        Err(e) => warn!("[session] {}", e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MouseButton;
    use crate::coordinates::Point;
    use crate::error::ControlError;
    use std::sync::Mutex;

    struct NullBrowser;

    #[async_trait]
    impl BrowserControl for NullBrowser {
        async fn click_mouse(&self, _: Point, _: MouseButton, _: u8) -> Result<(), ControlError> {
            Ok(())
        }
        async fn move_mouse(&self, _: Point) -> Result<(), ControlError> {
            Ok(())
        }
        async fn drag_mouse(&self, _: &[Point]) -> Result<(), ControlError> {
            Ok(())
        }
        async fn scroll(&self, _: Point, _: i32, _: i32) -> Result<(), ControlError> {
            Ok(())
        }
        async fn press_key(&self, _: &[String]) -> Result<(), ControlError> {
            Ok(())
        }
        async fn type_text(&self, _: &str, _: u64) -> Result<(), ControlError> {
            Ok(())
        }
        async fn capture_screenshot(&self) -> Result<Vec<u8>, ControlError> {
            Ok(Vec::new())
        }
        async fn navigate(&self, _: &str) -> Result<(), ControlError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPool {
        releases: Mutex<Vec<(String, bool)>>,
        fail_release: bool,
    }

    #[async_trait]
    impl SessionPool for CountingPool {
        async fn acquire(&self) -> Result<SessionHandle, PoolError> {
            Ok(SessionHandle {
                id: "s-1".into(),
                browser: Arc::new(NullBrowser),
            })
        }

        async fn release(&self, session_id: &str, reuse: bool) -> Result<(), PoolError> {
            self.releases
                .lock()
                .unwrap()
                .push((session_id.to_string(), reuse));
            if self.fail_release {
                return Err(PoolError::Release {
                    session_id: session_id.to_string(),
                    message: "503".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_success_releases_reusable() {
        let pool = CountingPool::default();
        let value = with_session(&pool, None, |lease| async move {
            Ok::<_, FatalExecutionError>(lease.id().len())
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(*pool.releases.lock().unwrap(), vec![("s-1".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_fatal_error_releases_not_reusable() {
        let pool = CountingPool::default();
        let err = with_session(&pool, None, |_lease| async {
            Err::<(), _>(FatalExecutionError::new("session invalid: 401"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Fatal(_)));
        assert_eq!(*pool.releases.lock().unwrap(), vec![("s-1".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_panic_releases_not_reusable() {
        let pool = CountingPool::default();
        let err = with_session(&pool, None, |_lease| async {
            if true {
                panic!("boom");
            }
            Ok::<(), FatalExecutionError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Panicked(ref m) if m == "boom"));
        assert_eq!(pool.releases.lock().unwrap().len(), 1);
        assert!(!pool.releases.lock().unwrap()[0].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_once_not_reusable() {
        let pool = CountingPool::default();
        let err = with_session(&pool, Some(Duration::from_secs(5)), |_lease| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), FatalExecutionError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::TimedOut(d) if d == Duration::from_secs(5)));
        assert_eq!(*pool.releases.lock().unwrap(), vec![("s-1".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_marked_lease_and_release_failure() {
        let pool = CountingPool {
            fail_release: true,
            ..Default::default()
        };
        let value = with_session(&pool, None, |lease| async move {
            lease.mark_not_reusable();
            Ok::<_, FatalExecutionError>("done")
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
        assert_eq!(*pool.releases.lock().unwrap(), vec![("s-1".to_string(), false)]);
    }

    #[tokio::test]
    async fn test_cancel_releases_not_reusable() {
        let pool = CountingPool::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = with_session_until(&pool, None, &cancel, |_lease| async {
            std::future::pending::<()>().await;
            Ok::<(), FatalExecutionError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
        assert_eq!(*pool.releases.lock().unwrap(), vec![("s-1".to_string(), false)]);
    }
}
