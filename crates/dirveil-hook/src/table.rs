//! The shared dispatch-table entry the hook swaps.
//!
//! Locating the table and toggling its write protection are platform
//! primitives outside this crate's scope; here they are modeled as an
//! in-process slot whose mutation requires an explicit, scoped
//! write-protection guard. Callers of the slot never block on a swap:
//! they take their own reference to the current entry and invoke it
//! outside any lock.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use thiserror::Error;

/// The intercepted entry point: (descriptor, output buffer) to a result
/// count, negative for the native error code.
pub type EnumerateFn = Arc<dyn Fn(i32, &mut [u8]) -> isize + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("dispatch slot is write-protected")]
    WriteProtected,
}

/// One entry of the shared dispatch table.
pub struct DispatchSlot {
    entry: RwLock<EnumerateFn>,
    writable: AtomicBool,
}

impl DispatchSlot {
    pub fn new(entry: EnumerateFn) -> Self {
        Self {
            entry: RwLock::new(entry),
            writable: AtomicBool::new(false),
        }
    }

    /// Reference to the current entry.
    pub fn current(&self) -> EnumerateFn {
        self.entry.read().unwrap().clone()
    }

    /// Invoke whatever entry is currently published.
    pub fn call(&self, fd: i32, buf: &mut [u8]) -> isize {
        let entry = self.current();
        entry(fd, buf)
    }

    /// Scoped write-protection toggle. The slot is writable exactly while
    /// the returned guard lives; the guard's drop re-protects it on every
    /// exit path, error paths included.
    pub fn unprotect(&self) -> ProtectionGuard<'_> {
        self.writable.store(true, Ordering::Release);
        ProtectionGuard { slot: self }
    }

    /// Atomically publish `new` and return the previous entry. Fails if
    /// the slot is write-protected.
    pub fn replace(&self, new: EnumerateFn) -> Result<EnumerateFn, TableError> {
        if !self.writable.load(Ordering::Acquire) {
            return Err(TableError::WriteProtected);
        }
        let mut entry = self.entry.write().unwrap();
        Ok(std::mem::replace(&mut *entry, new))
    }
}

pub struct ProtectionGuard<'a> {
    slot: &'a DispatchSlot,
}

impl Drop for ProtectionGuard<'_> {
    fn drop(&mut self) {
        self.slot.writable.store(false, Ordering::Release);
    }
}
