//! Sync loop lifecycle state machine and retry backoff policy.
//!
//! The state machine is pure: it takes events and returns a new state plus
//! actions for the client to execute. The polling task itself (the I/O)
//! lives in `palaver-client`.
//!
//! Stopping is cooperative. `StopRequested` moves to [`SyncLifecycle::Stopping`],
//! which suppresses the next poll; the in-flight request is allowed to
//! complete, and the loop reports `LoopExited` once it observes the stop.

use std::time::Duration;

/// Lifecycle of the sync polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLifecycle {
    /// No polling task is running.
    Idle,
    /// The polling task is issuing long-poll requests.
    Running,
    /// Stop was requested; the next iteration will not issue a request.
    Stopping,
}

/// Events that drive the sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The caller asked to start syncing.
    StartRequested,
    /// The caller asked to stop syncing.
    StopRequested,
    /// The polling loop exited (observed the stop, or hit a fatal error).
    LoopExited,
}

/// Actions for the client to execute after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Spawn the polling task.
    BeginPolling,
}

impl SyncLifecycle {
    /// Create a new lifecycle in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// Invalid transitions keep the current state and produce no actions;
    /// in particular `stop()` before `start()`, or repeated `stop()`, is a
    /// no-op.
    pub fn on_event(self, event: LifecycleEvent) -> (Self, Vec<LifecycleAction>) {
        match (self, event) {
            (Self::Idle, LifecycleEvent::StartRequested) => {
                (Self::Running, vec![LifecycleAction::BeginPolling])
            }
            (Self::Running, LifecycleEvent::StopRequested) => (Self::Stopping, vec![]),
            (Self::Running | Self::Stopping, LifecycleEvent::LoopExited) => (Self::Idle, vec![]),
            (state, _) => (state, vec![]),
        }
    }

    /// Whether the loop should issue another poll.
    pub fn should_poll(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether a polling task currently exists (running or winding down).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl Default for SyncLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate the retry delay after a transient sync failure.
///
/// Bounded exponential backoff with jitter: min(30s, 2^attempt seconds)
/// plus 0-5000ms of random jitter. The attempt counter resets on the next
/// successful cycle.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_secs = 2u64.pow(attempt.min(5)).min(30);
    let base = Duration::from_secs(base_secs);
    base + Duration::from_millis(random_jitter_ms())
}

/// Generate random jitter between 0 and 5000 milliseconds.
fn random_jitter_ms() -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes) % 5001
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(SyncLifecycle::new(), SyncLifecycle::Idle);
        assert!(!SyncLifecycle::new().should_poll());
    }

    #[test]
    fn start_transitions_to_running() {
        let (state, actions) = SyncLifecycle::Idle.on_event(LifecycleEvent::StartRequested);
        assert_eq!(state, SyncLifecycle::Running);
        assert_eq!(actions, vec![LifecycleAction::BeginPolling]);
        assert!(state.should_poll());
    }

    #[test]
    fn stop_transitions_to_stopping() {
        let (state, actions) = SyncLifecycle::Running.on_event(LifecycleEvent::StopRequested);
        assert_eq!(state, SyncLifecycle::Stopping);
        assert!(actions.is_empty());
        assert!(!state.should_poll());
        assert!(state.is_active());
    }

    #[test]
    fn loop_exit_returns_to_idle() {
        let (state, _) = SyncLifecycle::Stopping.on_event(LifecycleEvent::LoopExited);
        assert_eq!(state, SyncLifecycle::Idle);

        // A fatal error exits the loop straight from Running.
        let (state, _) = SyncLifecycle::Running.on_event(LifecycleEvent::LoopExited);
        assert_eq!(state, SyncLifecycle::Idle);
    }

    #[test]
    fn stop_before_start_is_noop() {
        let (state, actions) = SyncLifecycle::Idle.on_event(LifecycleEvent::StopRequested);
        assert_eq!(state, SyncLifecycle::Idle);
        assert!(actions.is_empty());
    }

    #[test]
    fn repeated_stop_is_noop() {
        let (state, _) = SyncLifecycle::Running.on_event(LifecycleEvent::StopRequested);
        let (state, actions) = state.on_event(LifecycleEvent::StopRequested);
        assert_eq!(state, SyncLifecycle::Stopping);
        assert!(actions.is_empty());
    }

    #[test]
    fn start_while_running_is_noop() {
        let (state, actions) = SyncLifecycle::Running.on_event(LifecycleEvent::StartRequested);
        assert_eq!(state, SyncLifecycle::Running);
        assert!(actions.is_empty());
    }

    #[test]
    fn full_lifecycle_round_trip() {
        let state = SyncLifecycle::new();
        let (state, _) = state.on_event(LifecycleEvent::StartRequested);
        let (state, _) = state.on_event(LifecycleEvent::StopRequested);
        let (state, _) = state.on_event(LifecycleEvent::LoopExited);
        assert_eq!(state, SyncLifecycle::Idle);
    }

    #[test]
    fn backoff_increases_with_attempt() {
        assert!(backoff_delay(1) >= Duration::from_secs(2));
        assert!(backoff_delay(3) >= Duration::from_secs(8));
    }

    #[test]
    fn backoff_capped_at_30_seconds_plus_jitter() {
        // Max possible: 30s base + 5s jitter.
        assert!(backoff_delay(20) <= Duration::from_secs(35));
    }
}
