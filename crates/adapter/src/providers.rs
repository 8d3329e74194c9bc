//! Built-in [`AsyncApi`] implementations.
//!
//! Real deployments wrap their own callback API; these cover the two common shapes of
//! "something that finishes later": a blocking job on its own thread, and a future on
//! a Tokio runtime. Both stop invoking callbacks once cancelled.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use sync_facade_cancel::{CancellationError, CancellationExt, CancellationToken};
use sync_facade_common::{AsyncApi, Callback, CancelHandle};
use tokio::runtime::Handle;
use tracing::debug;

/// Cancel handle that fires a [`CancellationToken`]
#[derive(Debug, Clone)]
pub struct TokenCancel(CancellationToken);

impl TokenCancel {
    pub fn token(&self) -> &CancellationToken {
        &self.0
    }
}

impl CancelHandle for TokenCancel {
    fn cancel(self: Box<Self>) {
        self.0.cancel();
    }
}

/// Runs a blocking job per operation on a freshly spawned thread.
///
/// The job receives the operation's token and is expected to poll it with
/// `check_cancellation` (or `sleep_with_cancellation`). Whatever it returns after the
/// token fired is discarded.
pub struct ThreadApi<P, T, E> {
    name: String,
    job: Arc<dyn Fn(P, &CancellationToken) -> Result<T, E> + Send + Sync>,
}

impl<P, T, E> ThreadApi<P, T, E> {
    pub fn new<F>(name: impl Into<String>, job: F) -> Self
    where
        F: Fn(P, &CancellationToken) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            job: Arc::new(job),
        }
    }
}

impl<P, T, E> AsyncApi for ThreadApi<P, T, E>
where
    P: Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    type Param = P;
    type Output = T;
    type Error = E;
    type Handle = TokenCancel;

    fn operation(&self, param: P, on_success: Callback<T>, on_error: Callback<E>) -> TokenCancel {
        let token = CancellationToken::new();
        let job_token = token.clone();
        let job = self.job.clone();
        let name = self.name.clone();

        std::thread::spawn(move || {
            let result = job(param, &job_token);
            if job_token.is_cancelled() {
                debug!("{}: job finished after cancellation, result dropped", name);
                return;
            }
            match result {
                Ok(value) => on_success(value),
                Err(e) => on_error(e),
            }
        });

        TokenCancel(token)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Either the job's own error or the token firing first
enum Interrupted<E> {
    Cancelled,
    Failed(E),
}

impl<E> From<CancellationError> for Interrupted<E> {
    fn from(_: CancellationError) -> Self {
        Interrupted::Cancelled
    }
}

/// Spawns one future per operation onto a Tokio runtime.
///
/// The future is raced against the operation's token with `with_cancellation`, so a
/// cancel drops it at its next await point.
pub struct TokioApi<P, F> {
    name: String,
    runtime: Handle,
    job: F,
    _param: PhantomData<fn(P)>,
}

impl<P, F> TokioApi<P, F> {
    pub fn new(name: impl Into<String>, runtime: Handle, job: F) -> Self {
        Self {
            name: name.into(),
            runtime,
            job,
            _param: PhantomData,
        }
    }
}

impl<P, T, E, F, Fut> AsyncApi for TokioApi<P, F>
where
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    type Param = P;
    type Output = T;
    type Error = E;
    type Handle = TokenCancel;

    fn operation(&self, param: P, on_success: Callback<T>, on_error: Callback<E>) -> TokenCancel {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let name = self.name.clone();
        let work = (self.job)(param);

        self.runtime.spawn(async move {
            let result = async move { work.await.map_err(Interrupted::Failed) }
                .with_cancellation::<Interrupted<E>>(&task_token, &name)
                .await;

            match result {
                Ok(value) => on_success(value),
                Err(Interrupted::Failed(e)) => on_error(e),
                Err(Interrupted::Cancelled) => {
                    debug!("{}: task dropped after cancellation", name);
                }
            }
        });

        TokenCancel(token)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use sync_facade_cancel::sleep_with_cancellation;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum JobError {
        #[error("cancelled")]
        Cancelled,
        #[error("rejected {0}")]
        Rejected(i32),
    }

    impl From<CancellationError> for JobError {
        fn from(_: CancellationError) -> Self {
            JobError::Cancelled
        }
    }

    fn report<T: Send + 'static>(tx: &mpsc::Sender<T>) -> Callback<T> {
        let tx = tx.clone();
        Box::new(move |v| {
            let _ = tx.send(v);
        })
    }

    fn times_ten() -> ThreadApi<i32, i32, JobError> {
        ThreadApi::new("times-ten", |param: i32, token: &CancellationToken| {
            sleep_with_cancellation(
                token,
                Duration::from_millis(50),
                Duration::from_millis(5),
                "times-ten",
            )?;
            if param < 0 {
                Err(JobError::Rejected(param))
            } else {
                Ok(param * 10)
            }
        })
    }

    #[test]
    fn test_thread_api_success_and_error() {
        let api = times_ten();
        let (ok_tx, ok_rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();

        let _handle = api.operation(3, report(&ok_tx), report(&err_tx));
        assert_eq!(ok_rx.recv_timeout(Duration::from_secs(5)), Ok(30));

        let _handle = api.operation(-1, report(&ok_tx), report(&err_tx));
        assert_eq!(
            err_rx.recv_timeout(Duration::from_secs(5)),
            Ok(JobError::Rejected(-1))
        );
        assert_eq!(api.name(), "times-ten");
    }

    #[test]
    fn test_thread_api_cancel_suppresses_callbacks() {
        let api = ThreadApi::new("slow", |_: i32, token: &CancellationToken| {
            sleep_with_cancellation(
                token,
                Duration::from_secs(10),
                Duration::from_millis(5),
                "slow",
            )?;
            Ok::<_, JobError>(1)
        });
        let (ok_tx, ok_rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();

        let handle = api.operation(1, report(&ok_tx), report(&err_tx));
        Box::new(handle).cancel();

        assert!(ok_rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(err_rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_tokio_api_success_and_cancel() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();

        let api = TokioApi::<i32, _>::new(
            "delayed",
            runtime.handle().clone(),
            |param: i32| async move {
                let delay = if param == 0 { 10_000 } else { 20 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<_, JobError>(param * 10)
            },
        );
        let (ok_tx, ok_rx) = mpsc::channel();
        let (err_tx, _err_rx) = mpsc::channel();

        let _handle = api.operation(2, report(&ok_tx), report(&err_tx));
        assert_eq!(ok_rx.recv_timeout(Duration::from_secs(5)), Ok(20));

        let handle = api.operation(0, report(&ok_tx), report(&err_tx));
        assert!(!handle.token().is_cancelled());
        Box::new(handle).cancel();
        assert!(ok_rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
