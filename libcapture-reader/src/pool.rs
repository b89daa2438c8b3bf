use crate::restart::RestartState;
use crate::trim::Trim;
use libcapture_tools::{CaptureBlock, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Read cursor and scratch space of a session
///
/// Only touched by the read in flight (and by close).
#[derive(Debug, Default)]
pub(crate) struct ReadContext {
    pub(crate) state: RestartState,
    /// Block being emitted, if any
    pub(crate) block: Option<CaptureBlock>,
    /// Offset in the (possibly rewritten) current block
    pub(crate) offset: usize,
    /// Rewritten header/footer and zones, when the current block is trimmed
    pub(crate) trim: Option<Trim>,
}

impl ReadContext {
    fn reset(&mut self) {
        *self = ReadContext::default();
    }
}

/// Pool of session read contexts
///
/// `capacity` contexts are allocated up front and kept for reuse; more are allocated on
/// demand, up to `max_sessions` outstanding contexts.
#[derive(Debug)]
pub struct SessionPool {
    free: Mutex<Vec<Box<ReadContext>>>,
    outstanding: AtomicUsize,
    capacity: usize,
    max_sessions: usize,
}

impl SessionPool {
    pub fn new(capacity: usize, max_sessions: usize) -> Self {
        let capacity = capacity.min(max_sessions);
        let free = (0..capacity).map(|_| Box::default()).collect();
        debug!(
            "session pool: {} preallocated, {} max",
            capacity, max_sessions
        );
        SessionPool {
            free: Mutex::new(free),
            outstanding: AtomicUsize::new(0),
            capacity,
            max_sessions,
        }
    }

    pub(crate) fn acquire(&self) -> Result<Box<ReadContext>, Error> {
        let max = self.max_sessions;
        if self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_err()
        {
            warn!("session pool exhausted ({} sessions)", max);
            return Err(Error::ResourceExhausted("session pool exhausted"));
        }
        let ctx = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        Ok(ctx)
    }

    pub(crate) fn release(&self, mut ctx: Box<ReadContext>) {
        ctx.reset();
        {
            let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
            if free.len() < self.capacity {
                free.push(ctx);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of contexts currently handed out
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Number of contexts ready for reuse
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
