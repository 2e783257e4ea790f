//! Synchronization primitives for the connection logic.
//!
//! Two pieces live here:
//!
//! - [`completion`]: a single-use completion handle created fresh for every
//!   blocking operation (connect, scan). The radio event handlers resolve
//!   it, the caller waits on it with a bounded timeout, and `stop()` can
//!   cancel it from another thread. Because each operation gets its own
//!   handle, a stale event from a previous operation can never satisfy a
//!   later wait.
//! - [`OutcomeGuard`]: delivers a [`ConnectionOutcome`] callback exactly
//!   once. It defaults to the failure outcome on drop and is resolved
//!   explicitly on the success path, so every early return in the
//!   auto-connect flow reports back without repeated bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::debug;

use crate::config::{ConnectCallback, ConnectionOutcome};

/// Terminal state of a blocking operation, set by whoever resolves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// The operation finished successfully.
    Done,
    /// The radio reported a failure (disconnect during a connect attempt).
    Failed,
    /// The operation was cancelled by `stop()`.
    Cancelled,
}

/// Result of waiting on a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Done,
    Failed,
    Cancelled,
    TimedOut,
}

struct Shared {
    state: Mutex<Option<OpOutcome>>,
    resolved: Condvar,
}

/// Resolver half of a one-shot completion. Cloneable so both the event
/// bridge and a cancelling thread can hold it.
#[derive(Clone)]
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    /// Resolve the completion. The first resolution wins; later calls are
    /// ignored.
    pub fn resolve(&self, outcome: OpOutcome) {
        let mut state = self.shared.state.lock().unwrap();
        if state.is_none() {
            *state = Some(outcome);
            self.shared.resolved.notify_all();
        } else {
            debug!("completion already resolved, ignoring {:?}", outcome);
        }
    }

    /// Whether the completion has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.shared.state.lock().unwrap().is_some()
    }
}

/// Waiter half of a one-shot completion.
pub struct CompletionWaiter {
    shared: Arc<Shared>,
}

impl CompletionWaiter {
    /// Block until the completion resolves or the timeout elapses.
    pub fn wait(&self, timeout: Duration) -> WaitResult {
        let state = self.shared.state.lock().unwrap();
        let (state, wait_result) = self
            .shared
            .resolved
            .wait_timeout_while(state, timeout, |state| state.is_none())
            .unwrap();

        match *state {
            Some(OpOutcome::Done) => WaitResult::Done,
            Some(OpOutcome::Failed) => WaitResult::Failed,
            Some(OpOutcome::Cancelled) => WaitResult::Cancelled,
            None => {
                debug_assert!(wait_result.timed_out());
                WaitResult::TimedOut
            }
        }
    }
}

/// Create a fresh one-shot completion pair.
pub fn completion() -> (CompletionHandle, CompletionWaiter) {
    let shared = Arc::new(Shared {
        state: Mutex::new(None),
        resolved: Condvar::new(),
    });
    (
        CompletionHandle {
            shared: shared.clone(),
        },
        CompletionWaiter { shared },
    )
}

/// Exactly-once delivery of a connection outcome callback.
///
/// Constructed at the top of an auto-connect attempt with the failure
/// outcome armed. Dropping the guard (any early return, any error path)
/// delivers `Failed`; calling [`OutcomeGuard::succeed`] delivers
/// `Connected` instead. Delivery is suppressed once the shared abort flag
/// is set, so `stop()` never lets a callback fire into a caller that is
/// tearing things down.
pub struct OutcomeGuard {
    callback: Option<ConnectCallback>,
    ssid: String,
    abort: Arc<AtomicBool>,
}

impl OutcomeGuard {
    /// Arm the guard. Until [`set_ssid`](Self::set_ssid) is called the
    /// failure outcome carries an empty SSID (no credentials were loaded).
    pub fn new(callback: ConnectCallback, abort: Arc<AtomicBool>) -> Self {
        Self {
            callback: Some(callback),
            ssid: String::new(),
            abort,
        }
    }

    /// Record the SSID the attempt is for, so the failure outcome names it.
    pub fn set_ssid(&mut self, ssid: &str) {
        self.ssid = ssid.to_string();
    }

    /// Resolve with success, consuming the guard.
    pub fn succeed(mut self) {
        let ssid = std::mem::take(&mut self.ssid);
        self.fire(ConnectionOutcome::Connected(ssid));
    }

    fn fire(&mut self, outcome: ConnectionOutcome) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        if self.abort.load(Ordering::Acquire) {
            debug!("suppressing outcome delivery after stop: {}", outcome);
            return;
        }
        callback(outcome);
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        let ssid = std::mem::take(&mut self.ssid);
        self.fire(ConnectionOutcome::Failed(ssid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    // ==================== Completion Tests ====================

    #[test]
    fn test_resolve_before_wait() {
        let (handle, waiter) = completion();
        handle.resolve(OpOutcome::Done);
        assert_eq!(waiter.wait(Duration::from_millis(10)), WaitResult::Done);
    }

    #[test]
    fn test_first_resolution_wins() {
        let (handle, waiter) = completion();
        handle.resolve(OpOutcome::Failed);
        handle.resolve(OpOutcome::Done);
        assert_eq!(waiter.wait(Duration::from_millis(10)), WaitResult::Failed);
    }

    #[test]
    fn test_wait_times_out() {
        let (_handle, waiter) = completion();
        assert_eq!(waiter.wait(Duration::from_millis(20)), WaitResult::TimedOut);
    }

    #[test]
    fn test_resolve_from_other_thread_wakes_waiter() {
        let (handle, waiter) = completion();
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.resolve(OpOutcome::Done);
        });
        assert_eq!(waiter.wait(Duration::from_secs(5)), WaitResult::Done);
        resolver.join().unwrap();
    }

    #[test]
    fn test_cancellation() {
        let (handle, waiter) = completion();
        let canceller = handle.clone();
        let thread = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            canceller.resolve(OpOutcome::Cancelled);
        });
        assert_eq!(waiter.wait(Duration::from_secs(5)), WaitResult::Cancelled);
        assert!(handle.is_resolved());
        thread.join().unwrap();
    }

    // ==================== OutcomeGuard Tests ====================

    fn counting_callback(
        calls: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<ConnectionOutcome>>>,
    ) -> ConnectCallback {
        Box::new(move |outcome| {
            calls.fetch_add(1, Ordering::SeqCst);
            *last.lock().unwrap() = Some(outcome);
        })
    }

    #[test]
    fn test_guard_fails_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));

        {
            let mut guard =
                OutcomeGuard::new(counting_callback(calls.clone(), last.clone()), abort);
            guard.set_ssid("Home");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            last.lock().unwrap().clone(),
            Some(ConnectionOutcome::Failed("Home".to_string()))
        );
    }

    #[test]
    fn test_guard_succeeds_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));

        let mut guard = OutcomeGuard::new(counting_callback(calls.clone(), last.clone()), abort);
        guard.set_ssid("Home");
        guard.succeed();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            last.lock().unwrap().clone(),
            Some(ConnectionOutcome::Connected("Home".to_string()))
        );
    }

    #[test]
    fn test_guard_default_carries_empty_ssid() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));

        drop(OutcomeGuard::new(
            counting_callback(calls.clone(), last.clone()),
            abort,
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            last.lock().unwrap().clone(),
            Some(ConnectionOutcome::Failed(String::new()))
        );
    }

    #[test]
    fn test_abort_suppresses_delivery() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(Mutex::new(None));
        let abort = Arc::new(AtomicBool::new(false));

        let mut guard = OutcomeGuard::new(counting_callback(calls.clone(), last.clone()), abort.clone());
        guard.set_ssid("Home");
        abort.store(true, Ordering::Release);
        drop(guard);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(last.lock().unwrap().is_none());
    }
}
