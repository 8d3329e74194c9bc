// Demo binary
//
// Drives a SyncAdapter through the reference scenarios: an overlapping call rejected
// as busy, two sequential calls, and a cancelled call. Runs once against a
// thread-backed API and once against a Tokio-backed one.

use anyhow::{anyhow, ensure, Result};
use std::env;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sync_facade_adapter::providers::{ThreadApi, TokioApi};
use sync_facade_adapter::{Metrics, SyncAdapter};
use sync_facade_cancel::{sleep_with_cancellation, CancellationError, CancellationToken};
use sync_facade_common::{AdapterConfig, AsyncApi, OperationError, TeardownMode};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("job cancelled")]
    Cancelled,
    #[error("negative input {0}")]
    Negative(i32),
}

impl From<CancellationError> for DemoError {
    fn from(_: CancellationError) -> Self {
        DemoError::Cancelled
    }
}

fn main() -> Result<()> {
    let level = env::var("SYNC_FACADE_LOG_LEVEL")
        .ok()
        .and_then(|l| l.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    // Initialize tracing
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config_from_env()?;
    let delay = env::var("SYNC_FACADE_DEMO_DELAY_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(2000));

    let metrics = Metrics::new()?;

    let threaded = Arc::new(
        SyncAdapter::new(times_ten_on_thread(delay), config.clone())
            .with_metrics(metrics.clone()),
    );
    run_scenarios(&threaded, delay)?;
    info!("Thread-backed stats: {:?}", threaded.stats());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()?;
    let api = TokioApi::<i32, _>::new(
        "tokio-times-ten",
        runtime.handle().clone(),
        move |param: i32| async move {
            tokio::time::sleep(delay).await;
            if param < 0 {
                Err(DemoError::Negative(param))
            } else {
                Ok(param * 10)
            }
        },
    );
    let tokio_config = AdapterConfig {
        name: format!("{}-tokio", config.name),
        ..config
    };
    let tokio_backed =
        Arc::new(SyncAdapter::new(api, tokio_config).with_metrics(metrics.clone()));
    run_scenarios(&tokio_backed, delay)?;
    info!("Tokio-backed stats: {:?}", tokio_backed.stats());

    print!("{}", metrics.render()?);
    Ok(())
}

fn load_config_from_env() -> Result<AdapterConfig> {
    let name = env::var("SYNC_FACADE_NAME").unwrap_or_else(|_| "demo".to_string());

    let wait_timeout = match env::var("SYNC_FACADE_WAIT_TIMEOUT_MS") {
        Ok(v) => Some(Duration::from_millis(v.parse::<u64>()?)),
        Err(_) => None,
    };

    // "background" (default) or "inline"
    let teardown: TeardownMode = env::var("SYNC_FACADE_TEARDOWN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    Ok(AdapterConfig {
        name,
        wait_timeout,
        teardown,
    })
}

fn times_ten_on_thread(delay: Duration) -> ThreadApi<i32, i32, DemoError> {
    ThreadApi::new("thread-times-ten", move |param: i32, token: &CancellationToken| {
        sleep_with_cancellation(token, delay, Duration::from_millis(10), "thread-times-ten")?;
        if param < 0 {
            Err(DemoError::Negative(param))
        } else {
            Ok(param * 10)
        }
    })
}

fn run_scenarios<A>(adapter: &Arc<SyncAdapter<A>>, delay: Duration) -> Result<()>
where
    A: AsyncApi<Param = i32, Output = i32, Error = DemoError> + 'static,
{
    info!("[{}] overlapping calls", adapter.config().name);
    let first = spawn_operation(adapter, 1);
    std::thread::sleep(delay / 4);
    let second = adapter.operation(2);
    ensure!(
        matches!(second, Err(OperationError::Busy)),
        "second call should be rejected as busy, got {:?}",
        second
    );
    ensure!(join(first)? == 10, "first call should return 10");

    info!("[{}] sequential calls", adapter.config().name);
    ensure!(adapter.operation(1)? == 10, "first sequential call should return 10");
    ensure!(adapter.operation(2)? == 20, "second sequential call should return 20");

    info!("[{}] domain error", adapter.config().name);
    let failed = adapter.operation(-1);
    ensure!(
        matches!(failed, Err(OperationError::Domain(DemoError::Negative(-1)))),
        "negative input should fail with the API's error, got {:?}",
        failed
    );

    info!("[{}] cancelled call", adapter.config().name);
    let cancelled = spawn_operation(adapter, 1);
    std::thread::sleep(delay / 4);
    ensure!(adapter.cancel_operation(), "cancel should win while in flight");
    let result = cancelled
        .join()
        .map_err(|_| anyhow!("operation thread panicked"))?;
    ensure!(
        matches!(result, Err(OperationError::Cancelled(_))),
        "cancelled call should report cancellation, got {:?}",
        result
    );
    ensure!(!adapter.cancel_operation(), "nothing left to cancel");

    Ok(())
}

type OperationResult = Result<i32, OperationError<DemoError>>;

fn spawn_operation<A>(adapter: &Arc<SyncAdapter<A>>, param: i32) -> JoinHandle<OperationResult>
where
    A: AsyncApi<Param = i32, Output = i32, Error = DemoError> + 'static,
{
    let adapter = adapter.clone();
    std::thread::spawn(move || adapter.operation(param))
}

fn join(handle: JoinHandle<OperationResult>) -> Result<i32> {
    let result = handle
        .join()
        .map_err(|_| anyhow!("operation thread panicked"))?;
    Ok(result?)
}
