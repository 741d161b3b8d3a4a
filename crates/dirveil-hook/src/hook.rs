//! Installation and removal of the enumeration override.
//!
//! `install` captures the current dispatch entry as "original" and
//! publishes a wrapper in its place. `uninstall` restores the original
//! first and only then drains: once the swap is visible, new invocations
//! run the original directly and the in-flight counter can only decrease,
//! so the drain loop terminates.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use thiserror::Error;

use crate::{
    filter::filter_entries,
    guard::{CallGuard, DrainError},
    predicate::HideEngine,
    table::{DispatchSlot, EnumerateFn, TableError},
};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook is already installed")]
    AlreadyInstalled,
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Drain(#[from] DrainError),
}

/// How `uninstall` waits for in-flight calls.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Sleep between counter polls.
    pub poll: Duration,
    /// Upper bound on the whole drain. `None` waits forever, the
    /// production default; a bound is for tests that need a leaked
    /// in-flight call to surface as [`DrainError::Timeout`].
    pub bound: Option<Duration>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(2),
            bound: None,
        }
    }
}

enum HookState {
    Uninstalled,
    Installed { original: EnumerateFn },
}

/// Owner of the override lifecycle for one dispatch slot.
pub struct Hook {
    engine: Arc<HideEngine>,
    guard: Arc<CallGuard>,
    drain: DrainConfig,
    state: Mutex<HookState>,
}

impl Hook {
    pub fn new(engine: Arc<HideEngine>, drain: DrainConfig) -> Self {
        Self {
            engine,
            guard: Arc::new(CallGuard::new()),
            drain,
            state: Mutex::new(HookState::Uninstalled),
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(*self.state.lock().unwrap(), HookState::Installed { .. })
    }

    /// Number of wrapper invocations currently in flight.
    pub fn in_flight(&self) -> u32 {
        self.guard.in_flight()
    }

    /// Publish the filtering wrapper in the slot, remembering the current
    /// entry for restoration. Fails with [`HookError::AlreadyInstalled`]
    /// when called twice without an intervening uninstall.
    pub fn install(&self, slot: &DispatchSlot) -> Result<(), HookError> {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, HookState::Installed { .. }) {
            return Err(HookError::AlreadyInstalled);
        }

        let original = slot.current();
        let wrapper = wrapper(original.clone(), self.engine.clone(), self.guard.clone());
        {
            let _writable = slot.unprotect();
            slot.replace(wrapper)?;
        }
        *state = HookState::Installed { original };
        log::debug!("enumeration hook installed");
        Ok(())
    }

    /// Restore the original entry, then wait until every in-flight
    /// wrapper invocation has returned. A no-op when already uninstalled.
    pub fn uninstall(&self, slot: &DispatchSlot) -> Result<(), HookError> {
        let mut state = self.state.lock().unwrap();
        let HookState::Installed { original } =
            std::mem::replace(&mut *state, HookState::Uninstalled)
        else {
            return Ok(());
        };

        {
            let _writable = slot.unprotect();
            if let Err(err) = slot.replace(original.clone()) {
                *state = HookState::Installed { original };
                return Err(err.into());
            }
        }
        // Swap first, drain second: the counter can only go down now.
        drop(state);
        log::debug!("original entry restored, draining in-flight calls");
        self.guard
            .wait_quiescent(self.drain.poll, self.drain.bound)?;
        log::debug!("enumeration hook removed");
        Ok(())
    }
}

/// The published override: account the call, run the original, filter its
/// output. Native failures pass through untouched.
fn wrapper(original: EnumerateFn, engine: Arc<HideEngine>, guard: Arc<CallGuard>) -> EnumerateFn {
    Arc::new(move |fd, buf| {
        let _ticket = guard.enter();
        let ret = original(fd, buf);
        if ret <= 0 {
            return ret;
        }
        let dir = engine.directory_of(fd);
        filter_entries(buf, ret as usize, dir.as_deref(), &engine) as isize
    })
}
