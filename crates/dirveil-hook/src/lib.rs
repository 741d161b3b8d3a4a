//! # Enumeration interception and filtering
//!
//! This crate owns the two hard pieces of dirveil: the lifecycle of the
//! dispatch-table override (install, wrap, drain, restore) and the
//! in-place filtering of the variable-length record buffer the original
//! enumeration call produces.
//!
//! The flow per intercepted call: the wrapper registers with the
//! [`guard::CallGuard`], invokes the saved original entry, resolves the
//! descriptor's directory once, and drives [`filter::filter_entries`],
//! which asks the [`predicate::HideEngine`] for a hide-or-keep decision
//! per record and compacts the buffer in place. The corrected length is
//! returned to the caller; native errors pass through untouched.
//!
//! Platform mechanics that a portable crate cannot own — locating the
//! dispatch table, toggling its write protection, mapping a descriptor to
//! a path — sit behind [`table::DispatchSlot`] and
//! [`resolve::PathSource`], with [`procfs::Procfs`] as the production
//! path backend.

pub mod dirent;
pub mod filter;
pub mod guard;
pub mod hook;
pub mod predicate;
pub mod procfs;
pub mod resolve;
pub mod table;

#[cfg(test)]
mod test_util;

pub use guard::{CallGuard, CallTicket, DrainError};
pub use hook::{DrainConfig, Hook, HookError};
pub use predicate::{FailMode, HideEngine};
pub use resolve::{LinkChain, PathSource, ResolveError};
pub use table::{DispatchSlot, EnumerateFn, TableError};

pub use nix::unistd::Pid;
