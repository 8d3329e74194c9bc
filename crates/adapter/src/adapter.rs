use crate::gate::AdmissionGate;
use crate::metrics::{Metrics, OUTCOME_INTERNAL, OUTCOME_TIMED_OUT};
use crate::pending::{PendingCall, WaitError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sync_facade_common::{
    AdapterConfig, AdapterStats, AsyncApi, CallId, Callback, OperationError, Outcome,
    OutcomeKind, TeardownMode,
};
use tracing::{debug, error, info, warn};

/// RAII guard that keeps the in-flight gauge at 1 for the lifetime of a call
struct InFlightGuard<'a> {
    metrics: Option<&'a Metrics>,
    adapter: &'a str,
}

impl<'a> InFlightGuard<'a> {
    fn new(metrics: Option<&'a Metrics>, adapter: &'a str) -> Self {
        if let Some(metrics) = metrics {
            metrics.in_flight.with_label_values(&[adapter]).set(1);
        }
        Self { metrics, adapter }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(metrics) = self.metrics {
            metrics.in_flight.with_label_values(&[self.adapter]).set(0);
        }
    }
}

/// Shared by both callbacks of a call. Dropped with the last of them, so a call whose
/// callbacks were all discarded unused gets resolved instead of blocking forever.
struct CallbackSentinel<T, E> {
    call: Arc<PendingCall<T, E>>,
    adapter: String,
}

impl<T, E> Drop for CallbackSentinel<T, E> {
    fn drop(&mut self) {
        if self.call.abandon() {
            warn!(
                "{}: callbacks for {} dropped without a result",
                self.adapter,
                self.call.id()
            );
        }
    }
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    rejected_busy: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    internal_faults: AtomicU64,
    cancel_requests: AtomicU64,
    cancel_granted: AtomicU64,
}

/// Blocking, single-flight facade over a callback-based [`AsyncApi`].
///
/// - [`operation`](Self::operation) starts the API call and blocks until a callback
///   or a cancellation resolves it. A second caller arriving meanwhile gets
///   [`OperationError::Busy`] immediately.
/// - [`cancel_operation`](Self::cancel_operation) may be called from any thread. Among
///   any number of concurrent requests against the same call exactly one returns
///   `true`; that one wakes the blocked caller with `Cancelled` and tears down the
///   API's cancel handle.
///
/// `operation` parks the calling OS thread. Do not call it from inside an async task.
///
/// # Example
///
/// ```rust,ignore
/// let adapter = Arc::new(SyncAdapter::new(api, AdapterConfig::named("billing")));
///
/// let worker = {
///     let adapter = adapter.clone();
///     std::thread::spawn(move || adapter.operation(1))
/// };
///
/// // From any other thread:
/// let cancelled = adapter.cancel_operation();
/// ```
pub struct SyncAdapter<A: AsyncApi> {
    api: A,
    config: AdapterConfig,
    gate: AdmissionGate<A::Output, A::Error>,
    counters: Counters,
    metrics: Option<Metrics>,
}

impl<A: AsyncApi> SyncAdapter<A> {
    pub fn new(api: A, config: AdapterConfig) -> Self {
        info!(
            "Creating sync adapter '{}' over '{}' (wait_timeout: {:?}, teardown: {:?})",
            config.name,
            api.name(),
            config.wait_timeout,
            config.teardown
        );

        Self {
            api,
            config,
            gate: AdmissionGate::new(),
            counters: Counters::default(),
            metrics: None,
        }
    }

    /// Reports calls, rejections and cancellations to `metrics`
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        metrics.register_adapter(&self.config.name);
        self.metrics = Some(metrics);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Whether an operation is currently in flight
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Runs the wrapped operation and blocks until it resolves.
    ///
    /// Fails with `Busy` without side effects if another call is in flight, with
    /// `Domain` if the API reported an error, with `Cancelled` if a
    /// [`cancel_operation`](Self::cancel_operation) won, and with `TimedOut` if the
    /// configured wait timeout elapsed first.
    pub fn operation(&self, param: A::Param) -> Result<A::Output, OperationError<A::Error>> {
        let Some(admission) = self.gate.try_enter() else {
            self.counters.rejected_busy.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics {
                metrics
                    .busy_rejections
                    .with_label_values(&[self.config.name.as_str()])
                    .inc();
            }
            debug!("{}: rejected, another operation is in flight", self.config.name);
            return Err(OperationError::Busy);
        };

        let call = admission.call().clone();
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        let in_flight = InFlightGuard::new(self.metrics.as_ref(), &self.config.name);
        debug!("{}: {} admitted", self.config.name, call.id());

        let sentinel = Arc::new(CallbackSentinel {
            call: call.clone(),
            adapter: self.config.name.clone(),
        });
        let handle = self.api.operation(
            param,
            callback(&sentinel, Outcome::Success),
            callback(&sentinel, Outcome::Failure),
        );
        drop(sentinel);

        // A cancel that won before the handle existed left the teardown to us. The
        // caller is already woken, so never make it wait for the handle.
        if let Some(teardown) = call.install_handle(Box::new(handle)) {
            teardown.run(TeardownMode::Background);
        }

        let result = self.await_outcome(&call);

        // Retire the call and reopen the gate before handing the result back
        drop(in_flight);
        drop(admission);
        result
    }

    /// Requests cancellation of the in-flight operation.
    ///
    /// Returns `true` only for the single request that moved the current call from
    /// running to cancelled. Returns `false` when idle, when the call already resolved,
    /// or when another request won. Never blocks on the operation itself.
    pub fn cancel_operation(&self) -> bool {
        self.counters.cancel_requests.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics
                .cancel_requests
                .with_label_values(&[self.config.name.as_str()])
                .inc();
        }

        let Some(call) = self.gate.current() else {
            debug!("{}: cancel requested while idle", self.config.name);
            return false;
        };

        let Some(teardown) = call.try_cancel() else {
            debug!(
                "{}: cancel of {} refused, already {:?}",
                self.config.name,
                call.id(),
                call.state()
            );
            return false;
        };

        self.counters.cancel_granted.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics
                .cancel_granted
                .with_label_values(&[self.config.name.as_str()])
                .inc();
        }
        info!("{}: cancellation granted for {}", self.config.name, call.id());

        teardown.run(self.config.teardown);
        true
    }

    /// Snapshot of this adapter's counters
    pub fn stats(&self) -> AdapterStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        AdapterStats {
            name: self.config.name.clone(),
            admitted: load(&self.counters.admitted),
            rejected_busy: load(&self.counters.rejected_busy),
            succeeded: load(&self.counters.succeeded),
            failed: load(&self.counters.failed),
            cancelled: load(&self.counters.cancelled),
            timed_out: load(&self.counters.timed_out),
            internal_faults: load(&self.counters.internal_faults),
            cancel_requests: load(&self.counters.cancel_requests),
            cancel_granted: load(&self.counters.cancel_granted),
            in_flight: self.gate.is_busy(),
        }
    }

    fn await_outcome(
        &self,
        call: &PendingCall<A::Output, A::Error>,
    ) -> Result<A::Output, OperationError<A::Error>> {
        let outcome = match call.wait(self.config.wait_timeout) {
            Ok(outcome) => outcome,
            Err(WaitError::TimedOut) => return self.expire(call),
            Err(WaitError::Consumed) => {
                return Err(self.internal_fault(call.id(), "outcome already consumed".into()))
            }
            Err(WaitError::Abandoned) => {
                return Err(self.internal_fault(
                    call.id(),
                    "callbacks dropped without a result".into(),
                ))
            }
        };

        if let Err(reason) = call.verify(&outcome) {
            return Err(self.internal_fault(call.id(), reason));
        }

        self.record(outcome.kind());
        outcome.into_result()
    }

    /// The wait deadline passed: compete for the cancel flag like any other canceller
    fn expire(
        &self,
        call: &PendingCall<A::Output, A::Error>,
    ) -> Result<A::Output, OperationError<A::Error>> {
        let after = self.config.wait_timeout.unwrap_or_default();

        match call.try_cancel() {
            Some(teardown) => {
                // The caller is this thread, so the handle never runs inline here
                teardown.run(TeardownMode::Background);

                // The cancelled outcome we just published is ours to discard
                match call.wait(None) {
                    Ok(Outcome::Cancelled) => {}
                    Ok(outcome) => {
                        return Err(self.internal_fault(
                            call.id(),
                            format!("timed out but found {} outcome", outcome.kind()),
                        ))
                    }
                    Err(e) => {
                        return Err(
                            self.internal_fault(call.id(), format!("{:?} after timeout", e))
                        )
                    }
                }
                warn!("{}: {} timed out after {:?}", self.config.name, call.id(), after);
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(&self.config.name, OUTCOME_TIMED_OUT);
                }
                Err(OperationError::TimedOut {
                    call: call.id(),
                    after,
                })
            }
            None => {
                debug!(
                    "{}: {} resolved while its wait was timing out",
                    self.config.name,
                    call.id()
                );
                let outcome = call
                    .wait(None)
                    .map_err(|e| self.internal_fault(call.id(), format!("{:?} after timeout", e)))?;
                if let Err(reason) = call.verify(&outcome) {
                    return Err(self.internal_fault(call.id(), reason));
                }
                self.record(outcome.kind());
                outcome.into_result()
            }
        }
    }

    fn record(&self, kind: OutcomeKind) {
        let counter = match kind {
            OutcomeKind::Succeeded => &self.counters.succeeded,
            OutcomeKind::Failed => &self.counters.failed,
            OutcomeKind::Cancelled => &self.counters.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(&self.config.name, &kind.to_string());
        }
    }

    fn internal_fault(&self, call: CallId, reason: String) -> OperationError<A::Error> {
        error!("{}: internal fault on {}: {}", self.config.name, call, reason);
        self.counters.internal_faults.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(&self.config.name, OUTCOME_INTERNAL);
        }
        OperationError::Internal { call, reason }
    }
}

fn callback<T, E, V>(
    sentinel: &Arc<CallbackSentinel<T, E>>,
    wrap: fn(V) -> Outcome<T, E>,
) -> Callback<V>
where
    T: Send + 'static,
    E: Send + 'static,
    V: Send + 'static,
{
    let sentinel = sentinel.clone();
    Box::new(move |value| {
        let CallbackSentinel { call, adapter } = &*sentinel;
        let outcome = wrap(value);
        let kind = outcome.kind();
        if call.complete(outcome) {
            debug!("{}: {} {}", adapter, call.id(), kind);
        } else {
            warn!(
                "{}: late {} callback for {} ignored, already {:?}",
                adapter,
                kind,
                call.id(),
                call.state()
            );
        }
    })
}
