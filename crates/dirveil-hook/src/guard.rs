//! In-flight call accounting for safe hook removal.
//!
//! Every invocation of the wrapper holds a [`CallTicket`] for its whole
//! lifetime. Removal restores the original entry first and then polls the
//! counter until it reaches zero; once the swap is done no new ticket can
//! be taken through the wrapper, so the counter only decreases and the
//! poll terminates.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("in-flight calls did not drain within {waited:?} ({in_flight} still active)")]
    Timeout { waited: Duration, in_flight: u32 },
}

/// Atomically updated count of in-flight filtered calls.
#[derive(Debug, Default)]
pub struct CallGuard {
    in_flight: AtomicU32,
}

impl CallGuard {
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicU32::new(0),
        }
    }

    /// Register one in-flight call. The returned ticket releases the
    /// registration when dropped, on every exit path including panics, so
    /// an `enter` can never leak without its matching exit.
    pub fn enter(&self) -> CallTicket<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        CallTicket { guard: self }
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Poll until no call is in flight, sleeping `poll` between reads.
    ///
    /// With `bound = None` this waits forever, which is the production
    /// default: a hook that must come out waits for its callers rather
    /// than pulling state from under them. A bound turns an excessive wait
    /// into [`DrainError::Timeout`] so tests can detect a leaked ticket.
    pub fn wait_quiescent(
        &self,
        poll: Duration,
        bound: Option<Duration>,
    ) -> Result<(), DrainError> {
        let start = Instant::now();
        while self.in_flight() > 0 {
            if let Some(limit) = bound {
                let waited = start.elapsed();
                if waited >= limit {
                    return Err(DrainError::Timeout {
                        waited,
                        in_flight: self.in_flight(),
                    });
                }
            }
            thread::sleep(poll);
        }
        Ok(())
    }
}

/// Registration of one in-flight call.
#[must_use = "dropping the ticket immediately releases the registration"]
pub struct CallTicket<'a> {
    guard: &'a CallGuard,
}

impl Drop for CallTicket<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
