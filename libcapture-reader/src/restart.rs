use std::sync::atomic::{AtomicBool, Ordering};

/// Restart state of a session
///
/// Transitions only happen at block boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartState {
    /// Streaming blocks
    #[default]
    Normal,
    /// The initial block set must be queued again before streaming
    AwaitingReinit,
    /// The next read must return zero bytes to mark the boundary
    AwaitingBoundaryEcho,
}

/// Events driving the restart state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartEvent {
    /// A pending restart was taken at a block boundary
    Requested { bytes_written: bool },
    /// A read returned zero bytes to mark the boundary
    BoundaryEchoed,
    /// The initial block set was queued again
    Reinitialized,
}

impl RestartState {
    /// Transition table. Events that do not apply leave the state unchanged.
    pub fn next(self, event: RestartEvent) -> RestartState {
        use RestartEvent::*;
        use RestartState::*;
        match (self, event) {
            (Normal, Requested { bytes_written: true }) => AwaitingBoundaryEcho,
            (Normal, Requested { bytes_written: false }) => AwaitingReinit,
            (AwaitingBoundaryEcho, BoundaryEchoed) => AwaitingReinit,
            (AwaitingReinit, Reinitialized) => Normal,
            (state, _) => state,
        }
    }
}

/// Pending restart request, set by the control path and consumed by the read path
#[derive(Debug, Default)]
pub(crate) struct RestartSignal {
    requested: AtomicBool,
}

impl RestartSignal {
    /// Request a restart. Requests not yet consumed collapse into one.
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Test and clear the request
    pub(crate) fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
