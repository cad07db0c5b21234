//! Cooperative pause/cancel control for a single job.

use tokio::sync::watch;

/// Requested execution state of a scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    /// Terminal. Overrides any pause request.
    Cancelled,
}

/// Shared pause/cancel flags for one job.
///
/// Cloning yields another handle on the same job. A paused loop parked in
/// [`ControlHandle::wait_while_paused`] wakes as soon as the state changes.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: watch::Sender<ControlState>,
}

impl ControlHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self { tx }
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn cancel_requested(&self) -> bool {
        self.state() == ControlState::Cancelled
    }

    pub fn pause_requested(&self) -> bool {
        self.state() == ControlState::Paused
    }

    /// Request a pause. Returns false if not currently running.
    pub fn pause(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Running {
                *state = ControlState::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Lift a pause. Returns false if not currently paused.
    pub fn resume(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Paused {
                *state = ControlState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Request cancellation, clearing any pause. Returns false if already cancelled.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == ControlState::Cancelled {
                false
            } else {
                *state = ControlState::Cancelled;
                true
            }
        })
    }

    /// Park while paused. Returns true if cancellation was requested.
    pub async fn wait_while_paused(&self) -> bool {
        let mut rx = self.tx.subscribe();
        let cancelled = match rx.wait_for(|state| *state != ControlState::Paused).await {
            Ok(state) => *state == ControlState::Cancelled,
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => true,
        };
        cancelled
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}
