use crate::pending::PendingCall;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_facade_common::CallId;
use tracing::error;

/// Non-blocking single-flight gate.
///
/// The gate's busy flag *is* the occupancy of the pending-call slot, so admitting a
/// caller and publishing its call happen under one lock, as do retiring the call and
/// freeing the gate. A canceller can never see the gate free while an old call is
/// still reachable, nor an admitted caller next to a retired call.
pub struct AdmissionGate<T, E> {
    slot: Mutex<Option<Arc<PendingCall<T, E>>>>,
    next_id: AtomicU64,
}

impl<T, E> Default for AdmissionGate<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> AdmissionGate<T, E> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Admits the caller if nothing is in flight. Never waits for the current call.
    pub fn try_enter(&self) -> Option<AdmissionGuard<'_, T, E>> {
        let mut slot = self.lock();
        if slot.is_some() {
            return None;
        }

        let id = CallId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let call = Arc::new(PendingCall::new(id));
        *slot = Some(call.clone());

        Some(AdmissionGuard { gate: self, call })
    }

    /// The in-flight call, if any.
    ///
    /// The returned clone may outlive the call's tenure in the gate; by then the call is
    /// terminal, so it can only refuse further transitions.
    pub fn current(&self) -> Option<Arc<PendingCall<T, E>>> {
        self.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    fn leave(&self, call: &Arc<PendingCall<T, E>>) {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, call) => {
                *slot = None;
            }
            Some(current) => {
                error!(
                    "{} leaving the gate but {} occupies it; leaving slot untouched",
                    call.id(),
                    current.id()
                );
            }
            None => {
                error!("{} leaving the gate but the slot is already empty", call.id());
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<PendingCall<T, E>>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII proof of admission; dropping it retires the call and frees the gate
pub struct AdmissionGuard<'a, T, E> {
    gate: &'a AdmissionGate<T, E>,
    call: Arc<PendingCall<T, E>>,
}

impl<T, E> AdmissionGuard<'_, T, E> {
    pub fn call(&self) -> &Arc<PendingCall<T, E>> {
        &self.call
    }
}

impl<T, E> Drop for AdmissionGuard<'_, T, E> {
    fn drop(&mut self) {
        self.gate.leave(&self.call);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    type Gate = AdmissionGate<i32, String>;

    #[test]
    fn test_second_enter_rejected_while_held() {
        let gate = Gate::new();

        let guard = gate.try_enter().expect("idle gate admits");
        assert!(gate.is_busy());
        assert!(gate.try_enter().is_none());

        drop(guard);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_some());
    }

    #[test]
    fn test_call_ids_increase() {
        let gate = Gate::new();

        let first = gate.try_enter().unwrap().call().id();
        let second = gate.try_enter().unwrap().call().id();

        assert!(second > first);
    }

    #[test]
    fn test_current_tracks_admitted_call() {
        let gate = Gate::new();
        assert!(gate.current().is_none());

        let guard = gate.try_enter().unwrap();
        let current = gate.current().unwrap();
        assert!(Arc::ptr_eq(&current, guard.call()));

        drop(guard);
        assert!(gate.current().is_none());
    }

    #[test]
    fn test_release_on_unwind() {
        let gate = Gate::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = gate.try_enter().unwrap();
            panic!("provider blew up");
        }));

        assert!(result.is_err());
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_concurrent_enter_admits_one() {
        const THREADS: usize = 12;
        let gate = Gate::new();
        let barrier = Barrier::new(THREADS);
        let hold = Barrier::new(THREADS);

        let admitted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let guard = gate.try_enter();
                        let admitted = guard.is_some();
                        // Keep the winner inside until everyone has tried
                        hold.wait();
                        drop(guard);
                        admitted
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|admitted| *admitted)
                .count()
        });

        assert_eq!(admitted, 1);
        assert!(!gate.is_busy());
    }
}
