//! Saved credential sets for escalated processes.

use nix::unistd::{Gid, Uid};

/// A full identity snapshot of a process, taken before its credentials are
/// rewritten so the original identity can be restored later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedCreds {
    pub uid: Uid,
    pub euid: Uid,
    pub suid: Uid,
    pub fsuid: Uid,
    pub gid: Gid,
    pub egid: Gid,
    pub sgid: Gid,
    pub fsgid: Gid,
}

impl SavedCreds {
    /// The all-root identity written by an escalation.
    pub fn root() -> Self {
        Self {
            uid: Uid::from_raw(0),
            euid: Uid::from_raw(0),
            suid: Uid::from_raw(0),
            fsuid: Uid::from_raw(0),
            gid: Gid::from_raw(0),
            egid: Gid::from_raw(0),
            sgid: Gid::from_raw(0),
            fsgid: Gid::from_raw(0),
        }
    }
}
