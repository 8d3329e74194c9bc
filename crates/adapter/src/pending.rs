use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use sync_facade_common::{CallId, CancelHandle, Outcome, OutcomeKind, TeardownMode};
use tracing::{debug, warn};

const RUNNING: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;
const CANCELLED: u8 = 3;
const ABANDONED: u8 = 4;

/// Lifecycle state of a [`PendingCall`]. Only `Running` accepts transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Both callbacks were dropped without either being invoked
    Abandoned,
}

impl CallState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            SUCCEEDED => Self::Succeeded,
            FAILED => Self::Failed,
            CANCELLED => Self::Cancelled,
            _ => Self::Abandoned,
        }
    }

    fn matches(self, kind: OutcomeKind) -> bool {
        matches!(
            (self, kind),
            (Self::Succeeded, OutcomeKind::Succeeded)
                | (Self::Failed, OutcomeKind::Failed)
                | (Self::Cancelled, OutcomeKind::Cancelled)
        )
    }
}

/// Write-once result slot read by the blocked caller
enum ResultSlot<T, E> {
    Unset,
    Ready(Outcome<T, E>),
    /// The API gave up on the call without reporting anything
    Abandoned,
    Taken,
}

/// Where the API's cancel handle is in its own lifecycle.
///
/// The handle only arrives once `AsyncApi::operation` returns, which may be after the
/// call already resolved or was cancelled, so both orders are recorded here.
enum HandleSlot {
    /// `operation` has not returned yet
    Awaiting,
    Installed(Box<dyn CancelHandle>),
    /// Cancellation was granted before the handle arrived
    CancelRequested,
    /// Resolved by a callback, or the handle was already handed out
    Retired,
}

/// Why [`PendingCall::wait`] returned without an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    TimedOut,
    /// The outcome was already taken by an earlier wait
    Consumed,
    /// The API dropped both callbacks unused
    Abandoned,
}

/// The single in-flight call of an adapter.
///
/// The state byte doubles as the "cancellation granted" flag: whoever moves it out of
/// `Running` with a compare-and-swap is the only writer of the result slot. Callbacks
/// and cancellation race on that CAS and losers write nothing.
pub struct PendingCall<T, E> {
    id: CallId,
    state: AtomicU8,
    result: Mutex<ResultSlot<T, E>>,
    resolved: Condvar,
    handle: Mutex<HandleSlot>,
}

impl<T, E> PendingCall<T, E> {
    pub fn new(id: CallId) -> Self {
        Self {
            id,
            state: AtomicU8::new(RUNNING),
            result: Mutex::new(ResultSlot::Unset),
            resolved: Condvar::new(),
            handle: Mutex::new(HandleSlot::Awaiting),
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn state(&self) -> CallState {
        CallState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Records a callback result. Returns `false` if the call already left `Running`.
    pub fn complete(&self, outcome: Outcome<T, E>) -> bool {
        let target = match outcome.kind() {
            OutcomeKind::Succeeded => SUCCEEDED,
            OutcomeKind::Failed => FAILED,
            OutcomeKind::Cancelled => CANCELLED,
        };

        if !self.transition(target) {
            return false;
        }

        self.publish(outcome);

        // Nothing left to tear down
        let stale = std::mem::replace(&mut *self.lock_handle(), HandleSlot::Retired);
        drop(stale);
        true
    }

    /// Resolves a call whose callbacks were dropped unused.
    ///
    /// Wakes the waiter with [`WaitError::Abandoned`]. Returns `false` if the call had
    /// already left `Running`, which is the normal case once a callback ran.
    pub fn abandon(&self) -> bool {
        if !self.transition(ABANDONED) {
            return false;
        }

        {
            let mut slot = self.lock_result();
            if let ResultSlot::Unset = *slot {
                *slot = ResultSlot::Abandoned;
                self.resolved.notify_all();
            }
        }

        let stale = std::mem::replace(&mut *self.lock_handle(), HandleSlot::Retired);
        drop(stale);
        true
    }

    /// Tries to win the cancellation flag.
    ///
    /// Returns `None` if the call already resolved or another canceller won. The winner
    /// gets a [`Teardown`] it must run; the blocked caller has already been woken with
    /// `Cancelled` by the time this returns.
    pub fn try_cancel(&self) -> Option<Teardown> {
        if !self.transition(CANCELLED) {
            return None;
        }

        self.publish(Outcome::Cancelled);

        let mut slot = self.lock_handle();
        let handle = match std::mem::replace(&mut *slot, HandleSlot::Retired) {
            HandleSlot::Installed(handle) => Some(handle),
            HandleSlot::Awaiting => {
                *slot = HandleSlot::CancelRequested;
                None
            }
            HandleSlot::CancelRequested | HandleSlot::Retired => None,
        };

        Some(Teardown {
            call: self.id,
            handle,
        })
    }

    /// Stores the handle returned by the API.
    ///
    /// If cancellation was granted before the handle existed, the handle comes straight
    /// back as a [`Teardown`]. If a callback already resolved the call, it is dropped.
    pub fn install_handle(&self, handle: Box<dyn CancelHandle>) -> Option<Teardown> {
        let mut slot = self.lock_handle();
        match std::mem::replace(&mut *slot, HandleSlot::Retired) {
            HandleSlot::Awaiting => {
                *slot = HandleSlot::Installed(handle);
                None
            }
            HandleSlot::CancelRequested => Some(Teardown {
                call: self.id,
                handle: Some(handle),
            }),
            previous => {
                *slot = previous;
                debug!("{}: resolved before its cancel handle arrived", self.id);
                None
            }
        }
    }

    /// Blocks until the result slot is written, then takes the outcome.
    ///
    /// With `timeout` set, gives up at the deadline without touching the call; the
    /// caller decides whether to cancel.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Outcome<T, E>, WaitError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.lock_result();

        loop {
            match std::mem::replace(&mut *slot, ResultSlot::Taken) {
                ResultSlot::Ready(outcome) => return Ok(outcome),
                ResultSlot::Abandoned => return Err(WaitError::Abandoned),
                ResultSlot::Taken => return Err(WaitError::Consumed),
                ResultSlot::Unset => *slot = ResultSlot::Unset,
            }

            slot = match deadline {
                None => self
                    .resolved
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::TimedOut);
                    }
                    self.resolved
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Checks the outcome a waiter received against the state the CAS recorded
    pub fn verify(&self, outcome: &Outcome<T, E>) -> Result<(), String> {
        let state = self.state();
        if state.matches(outcome.kind()) {
            Ok(())
        } else {
            Err(format!(
                "outcome {} does not match recorded state {:?}",
                outcome.kind(),
                state
            ))
        }
    }

    fn transition(&self, target: u8) -> bool {
        self.state
            .compare_exchange(RUNNING, target, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn publish(&self, outcome: Outcome<T, E>) {
        let mut slot = self.lock_result();
        match *slot {
            ResultSlot::Unset => {
                *slot = ResultSlot::Ready(outcome);
                self.resolved.notify_all();
            }
            // Unreachable while transition() admits a single writer
            ResultSlot::Ready(_) | ResultSlot::Abandoned | ResultSlot::Taken => {
                warn!("{}: result slot written twice, keeping the first", self.id);
            }
        }
    }

    fn lock_result(&self) -> MutexGuard<'_, ResultSlot<T, E>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handle(&self) -> MutexGuard<'_, HandleSlot> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancel-handle teardown owed by whoever won the cancellation flag
pub struct Teardown {
    call: CallId,
    handle: Option<Box<dyn CancelHandle>>,
}

impl Teardown {
    pub fn call(&self) -> CallId {
        self.call
    }

    /// `false` when the handle has not arrived yet; it is then torn down on arrival
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Invokes the API's cancel handle, on this thread or a detached one
    pub fn run(self, mode: TeardownMode) {
        let Some(handle) = self.handle else {
            debug!("{}: cancel handle not yet returned, deferring teardown", self.call);
            return;
        };

        match mode {
            TeardownMode::Inline => {
                debug!("{}: running cancel handle inline", self.call);
                handle.cancel();
            }
            TeardownMode::Background => spawn_teardown(self.call, handle),
        }
    }
}

fn spawn_teardown(call: CallId, handle: Box<dyn CancelHandle>) {
    // Shared so a failed spawn can still run the handle here
    let shared = std::sync::Arc::new(Mutex::new(Some(handle)));
    let job = shared.clone();

    let spawned = std::thread::Builder::new()
        .name(format!("teardown-{}", call.get()))
        .spawn(move || {
            let handle = job.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(handle) = handle {
                handle.cancel();
                debug!("{}: background teardown finished", call);
            }
        });

    if let Err(e) = spawned {
        warn!(
            "{}: failed to spawn teardown thread ({}), cancelling inline",
            call, e
        );
        let handle = shared.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use sync_facade_common::cancel_fn;

    type Call = PendingCall<i32, String>;

    fn counting_handle(counter: &Arc<AtomicUsize>) -> Box<dyn CancelHandle> {
        let counter = counter.clone();
        Box::new(cancel_fn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_first_writer_wins() {
        let call = Call::new(CallId::new(1));

        assert!(call.complete(Outcome::Success(10)));
        assert!(!call.complete(Outcome::Failure("late".to_string())));
        assert!(call.try_cancel().is_none());

        assert_eq!(call.state(), CallState::Succeeded);
        assert_eq!(call.wait(None), Ok(Outcome::Success(10)));
    }

    #[test]
    fn test_cancel_blocks_late_callback() {
        let call = Call::new(CallId::new(1));

        assert!(call.try_cancel().is_some());
        assert!(!call.complete(Outcome::Success(10)));

        assert_eq!(call.state(), CallState::Cancelled);
        assert_eq!(call.wait(None), Ok(Outcome::Cancelled));
    }

    #[test]
    fn test_wait_wakes_on_callback_from_other_thread() {
        let call = Arc::new(Call::new(CallId::new(1)));
        let producer = call.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.complete(Outcome::Failure("boom".to_string()))
        });

        assert_eq!(call.wait(None), Ok(Outcome::Failure("boom".to_string())));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_second_wait_reports_consumed() {
        let call = Call::new(CallId::new(1));
        call.complete(Outcome::Success(1));

        assert!(call.wait(None).is_ok());
        assert_eq!(call.wait(None), Err(WaitError::Consumed));
    }

    #[test]
    fn test_wait_timeout_leaves_call_running() {
        let call = Call::new(CallId::new(1));

        assert_eq!(
            call.wait(Some(Duration::from_millis(10))),
            Err(WaitError::TimedOut)
        );
        assert_eq!(call.state(), CallState::Running);
    }

    #[test]
    fn test_abandon_wakes_waiter_and_blocks_later_writers() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let call = Arc::new(Call::new(CallId::new(1)));
        assert!(call.install_handle(counting_handle(&cancels)).is_none());
        let dropper = call.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            dropper.abandon()
        });

        assert_eq!(call.wait(None), Err(WaitError::Abandoned));
        assert!(handle.join().unwrap());
        assert_eq!(call.state(), CallState::Abandoned);
        assert!(!call.abandon());
        assert!(!call.complete(Outcome::Success(1)));
        assert!(call.try_cancel().is_none());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abandon_after_callback_is_noop() {
        let call = Call::new(CallId::new(1));
        call.complete(Outcome::Success(3));

        assert!(!call.abandon());
        assert_eq!(call.state(), CallState::Succeeded);
        assert_eq!(call.wait(None), Ok(Outcome::Success(3)));
    }

    #[test]
    fn test_cancel_with_installed_handle_runs_it_once() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let call = Call::new(CallId::new(1));
        assert!(call.install_handle(counting_handle(&cancels)).is_none());

        let teardown = call.try_cancel().expect("first cancel wins");
        assert!(teardown.has_handle());
        teardown.run(TeardownMode::Inline);
        assert!(call.try_cancel().is_none());

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_before_handle_defers_teardown() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let call = Call::new(CallId::new(1));

        let teardown = call.try_cancel().expect("cancel wins");
        assert!(!teardown.has_handle());
        teardown.run(TeardownMode::Inline);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);

        let deferred = call
            .install_handle(counting_handle(&cancels))
            .expect("handle owed a teardown");
        deferred.run(TeardownMode::Inline);

        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_after_completion_is_dropped() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let call = Call::new(CallId::new(1));
        call.complete(Outcome::Success(3));

        assert!(call.install_handle(counting_handle(&cancels)).is_none());
        assert!(call.try_cancel().is_none());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_background_teardown_runs_handle() {
        let (tx, rx) = std::sync::mpsc::channel();
        let call = Call::new(CallId::new(9));
        call.install_handle(Box::new(cancel_fn(move || {
            let _ = tx.send(std::thread::current().name().map(str::to_string));
        })));

        call.try_cancel().unwrap().run(TeardownMode::Background);

        let thread_name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(thread_name.as_deref(), Some("teardown-9"));
    }

    #[test]
    fn test_exactly_one_cancel_winner() {
        const THREADS: usize = 16;

        for _ in 0..50 {
            let call = Arc::new(Call::new(CallId::new(1)));
            let barrier = Arc::new(Barrier::new(THREADS));

            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let call = call.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        call.try_cancel().is_some()
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();

            assert_eq!(winners, 1);
        }
    }

    #[test]
    fn test_verify_detects_mismatch() {
        let call = Call::new(CallId::new(1));
        call.complete(Outcome::Success(1));

        assert!(call.verify(&Outcome::Success(1)).is_ok());
        assert!(call.verify(&Outcome::Cancelled).is_err());
    }
}
