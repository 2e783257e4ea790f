//! Event bridge between the asynchronous radio stack and blocking callers.
//!
//! Radio events arrive on the system event loop's thread; the connection
//! logic blocks on a per-operation completion. The bridge translates one
//! into the other, with the authoritative [`ConnectionMode`] deciding how
//! ambiguous events route: a station disconnect during a connect attempt is
//! a failure, the same disconnect while the access point is up is expected
//! churn and only logged.
//!
//! The bridge holds the completion handle for the *active* operation only.
//! Each operation installs a fresh handle before issuing radio commands, so
//! an event raised by a previous operation can never satisfy a later wait.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::wifi::signal::{completion, CompletionHandle, CompletionWaiter, OpOutcome};

/// Authoritative connection mode used for event routing.
///
/// The radio may physically run station and access point simultaneously
/// (scanning and the portal's connect attempt need the station interface
/// while the access point serves clients), but exactly one mode governs
/// how events are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Radio not configured by us yet.
    None,
    /// Joining an existing network.
    Station,
    /// Announcing our own network for provisioning.
    AccessPoint,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Station => "station",
            Self::AccessPoint => "access-point",
        };
        write!(f, "{}", name)
    }
}

/// Radio stack events relevant to the connection logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    /// The station interface started.
    StaStarted,
    /// The station associated with an access point (no IP yet).
    StaConnected,
    /// The station lost or failed its association.
    StaDisconnected,
    /// The station acquired an IP address.
    GotIp,
    /// A scan cycle finished.
    ScanDone,
    /// A client associated with our access point.
    ApClientJoined,
    /// A client left our access point.
    ApClientLeft,
}

/// Action the platform glue must perform after dispatching an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Re-issue the station connect command (the stack restarted the
    /// station interface underneath an active attempt).
    IssueConnect,
}

struct BridgeInner {
    mode: Mutex<ConnectionMode>,
    slot: Mutex<Option<CompletionHandle>>,
    abort: Arc<AtomicBool>,
}

/// Shared routing state between the controller, the platform event glue
/// and `stop()`. Cheap to clone.
#[derive(Clone)]
pub struct EventBridge {
    inner: Arc<BridgeInner>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                mode: Mutex::new(ConnectionMode::None),
                slot: Mutex::new(None),
                abort: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// The authoritative mode.
    pub fn mode(&self) -> ConnectionMode {
        *self.inner.mode.lock().unwrap()
    }

    /// Switch the authoritative mode.
    pub fn set_mode(&self, mode: ConnectionMode) {
        let mut current = self.inner.mode.lock().unwrap();
        if *current != mode {
            debug!("connection mode {} -> {}", *current, mode);
            *current = mode;
        }
    }

    /// Install a fresh completion for the operation about to start and
    /// return its waiter. Must be called before any radio command is
    /// issued so an early event cannot be lost.
    pub fn begin_op(&self) -> CompletionWaiter {
        let (handle, waiter) = completion();
        *self.inner.slot.lock().unwrap() = Some(handle);
        waiter
    }

    /// Drop the active completion once its operation has finished waiting.
    pub fn end_op(&self) {
        self.inner.slot.lock().unwrap().take();
    }

    /// Resolve the active operation, if any. The handle is consumed so
    /// duplicate events are ignored.
    pub fn resolve_active(&self, outcome: OpOutcome) {
        if let Some(handle) = self.inner.slot.lock().unwrap().take() {
            handle.resolve(outcome);
        }
    }

    /// Cancel the active operation, waking its blocked caller.
    pub fn cancel_active(&self) {
        self.resolve_active(OpOutcome::Cancelled);
    }

    /// Latch the abort flag: suppresses callback delivery until the next
    /// operation re-arms.
    pub fn abort(&self) {
        self.inner.abort.store(true, Ordering::Release);
    }

    /// Clear the abort flag at the start of a new operation.
    pub fn reset_abort(&self) {
        self.inner.abort.store(false, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.abort.load(Ordering::Acquire)
    }

    /// Shared handle to the abort flag, for outcome guards.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.inner.abort.clone()
    }

    /// Route a radio event. Returns a follow-up command when the platform
    /// glue must act on the radio from the event context.
    pub fn dispatch(&self, event: StackEvent) -> Option<FollowUp> {
        let mode = self.mode();
        match event {
            StackEvent::StaStarted => {
                if mode == ConnectionMode::Station {
                    debug!("station interface started, re-issuing connect");
                    return Some(FollowUp::IssueConnect);
                }
                debug!("station interface started (mode {})", mode);
            }
            StackEvent::StaConnected => {
                info!("station link established, waiting for IP");
            }
            StackEvent::StaDisconnected => {
                if mode == ConnectionMode::Station {
                    warn!("station disconnected");
                    self.resolve_active(OpOutcome::Failed);
                } else {
                    // Expected while the access point reconfigures clients
                    debug!("station disconnect ignored (mode {})", mode);
                }
            }
            StackEvent::GotIp => {
                debug!("IP acquired");
                self.resolve_active(OpOutcome::Done);
            }
            StackEvent::ScanDone => {
                debug!("scan cycle complete");
                self.resolve_active(OpOutcome::Done);
            }
            StackEvent::ApClientJoined => {
                info!("client joined the access point");
            }
            StackEvent::ApClientLeft => {
                info!("client left the access point");
            }
        }
        None
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::signal::WaitResult;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_got_ip_resolves_done() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);
        let waiter = bridge.begin_op();
        assert_eq!(bridge.dispatch(StackEvent::GotIp), None);
        assert_eq!(waiter.wait(SHORT), WaitResult::Done);
    }

    #[test]
    fn test_link_up_alone_is_not_success() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);
        let waiter = bridge.begin_op();
        bridge.dispatch(StackEvent::StaConnected);
        assert_eq!(waiter.wait(SHORT), WaitResult::TimedOut);
    }

    #[test]
    fn test_disconnect_fails_station_attempt() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);
        let waiter = bridge.begin_op();
        bridge.dispatch(StackEvent::StaDisconnected);
        assert_eq!(waiter.wait(SHORT), WaitResult::Failed);
    }

    #[test]
    fn test_disconnect_tolerated_in_access_point_mode() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::AccessPoint);
        let waiter = bridge.begin_op();
        bridge.dispatch(StackEvent::StaDisconnected);
        assert_eq!(waiter.wait(SHORT), WaitResult::TimedOut);
    }

    #[test]
    fn test_scan_done_resolves() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::AccessPoint);
        let waiter = bridge.begin_op();
        bridge.dispatch(StackEvent::ScanDone);
        assert_eq!(waiter.wait(SHORT), WaitResult::Done);
    }

    #[test]
    fn test_sta_started_follow_up_only_in_station_mode() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);
        assert_eq!(
            bridge.dispatch(StackEvent::StaStarted),
            Some(FollowUp::IssueConnect)
        );

        bridge.set_mode(ConnectionMode::AccessPoint);
        assert_eq!(bridge.dispatch(StackEvent::StaStarted), None);
    }

    #[test]
    fn test_stale_event_cannot_satisfy_next_operation() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);

        let first = bridge.begin_op();
        bridge.dispatch(StackEvent::GotIp);
        assert_eq!(first.wait(SHORT), WaitResult::Done);
        bridge.end_op();

        // A second operation must not observe the first one's event
        let second = bridge.begin_op();
        assert_eq!(second.wait(SHORT), WaitResult::TimedOut);
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let bridge = EventBridge::new();
        let waiter = bridge.begin_op();
        bridge.cancel_active();
        assert_eq!(waiter.wait(SHORT), WaitResult::Cancelled);
    }

    #[test]
    fn test_abort_flag_round_trip() {
        let bridge = EventBridge::new();
        assert!(!bridge.is_aborted());
        bridge.abort();
        assert!(bridge.is_aborted());
        assert!(bridge.abort_flag().load(std::sync::atomic::Ordering::Acquire));
        bridge.reset_abort();
        assert!(!bridge.is_aborted());
    }

    #[test]
    fn test_events_without_active_op_are_harmless() {
        let bridge = EventBridge::new();
        bridge.set_mode(ConnectionMode::Station);
        bridge.dispatch(StackEvent::GotIp);
        bridge.dispatch(StackEvent::StaDisconnected);
        bridge.dispatch(StackEvent::ApClientJoined);
        bridge.dispatch(StackEvent::ApClientLeft);
    }
}
