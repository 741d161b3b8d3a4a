//! Save/restore of a process's identity credentials.
//!
//! Escalation snapshots the caller's full credential set into the
//! registry (keyed by pid) before rewriting it to root; de-escalation
//! writes the snapshot back and clears the entry. Whether a process is
//! already escalated is entirely the registry's call, so repeating an
//! escalation is a no-op rather than an overwrite of the saved identity.

use dirveil_registry::{Pid, Registry, RegistryError, SavedCreds};
use nix::unistd::{self, Gid, ResGid, ResUid, Uid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrivilegeError {
    #[error("process {0} is not escalated")]
    NotEscalated(Pid),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("rewriting credentials failed")]
    Backend(#[source] nix::Error),
}

/// Reads and writes the calling process's credential set. Production code
/// uses [`ProcessCreds`]; tests substitute an in-memory identity.
pub trait CredBackend {
    fn current_pid(&self) -> Pid;
    fn read(&self) -> Result<SavedCreds, PrivilegeError>;
    fn write(&self, creds: &SavedCreds) -> Result<(), PrivilegeError>;
}

/// Save the caller's identity in the registry and rewrite it to root.
/// A no-op when the registry already holds a snapshot for this pid.
pub fn escalate(registry: &Registry, backend: &dyn CredBackend) -> Result<(), PrivilegeError> {
    let pid = backend.current_pid();
    if registry.is_escalated(pid) {
        log::debug!("process {pid} is already escalated");
        return Ok(());
    }

    let saved = backend.read()?;
    registry.record_escalation(pid, saved)?;
    if let Err(err) = backend.write(&SavedCreds::root()) {
        // Roll the bookkeeping back so a later attempt starts clean.
        let _ = registry.clear_escalation(pid);
        return Err(err);
    }
    log::debug!("process {pid} escalated");
    Ok(())
}

/// Restore the identity saved for the caller and drop the snapshot.
pub fn deescalate(registry: &Registry, backend: &dyn CredBackend) -> Result<(), PrivilegeError> {
    let pid = backend.current_pid();
    let saved = registry
        .saved_creds(pid)
        .ok_or(PrivilegeError::NotEscalated(pid))?;

    backend.write(&saved)?;
    registry.clear_escalation(pid)?;
    log::debug!("process {pid} restored to its saved identity");
    Ok(())
}

/// The real credential set of the calling process.
pub struct ProcessCreds;

impl CredBackend for ProcessCreds {
    fn current_pid(&self) -> Pid {
        unistd::getpid()
    }

    fn read(&self) -> Result<SavedCreds, PrivilegeError> {
        let ResUid {
            real: uid,
            effective: euid,
            saved: suid,
        } = unistd::getresuid().map_err(PrivilegeError::Backend)?;
        let ResGid {
            real: gid,
            effective: egid,
            saved: sgid,
        } = unistd::getresgid().map_err(PrivilegeError::Backend)?;
        // The filesystem ids have no getter; writing the all-bits value
        // is the documented way to read them without changing them.
        let fsuid = unistd::setfsuid(Uid::from_raw(u32::MAX));
        let fsgid = unistd::setfsgid(Gid::from_raw(u32::MAX));

        Ok(SavedCreds {
            uid,
            euid,
            suid,
            fsuid,
            gid,
            egid,
            sgid,
            fsgid,
        })
    }

    fn write(&self, creds: &SavedCreds) -> Result<(), PrivilegeError> {
        // Groups before users: once the uids are dropped the process may
        // no longer be allowed to change its gids.
        unistd::setresgid(creds.gid, creds.egid, creds.sgid).map_err(PrivilegeError::Backend)?;
        unistd::setresuid(creds.uid, creds.euid, creds.suid).map_err(PrivilegeError::Backend)?;
        unistd::setfsuid(creds.fsuid);
        unistd::setfsgid(creds.fsgid);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    struct FakeCreds {
        pid: Pid,
        current: Mutex<SavedCreds>,
    }

    impl FakeCreds {
        fn new(pid: i32, uid: u32) -> Self {
            Self {
                pid: Pid::from_raw(pid),
                current: Mutex::new(creds_of(uid)),
            }
        }

        fn current(&self) -> SavedCreds {
            *self.current.lock().unwrap()
        }
    }

    impl CredBackend for FakeCreds {
        fn current_pid(&self) -> Pid {
            self.pid
        }

        fn read(&self) -> Result<SavedCreds, PrivilegeError> {
            Ok(self.current())
        }

        fn write(&self, creds: &SavedCreds) -> Result<(), PrivilegeError> {
            *self.current.lock().unwrap() = *creds;
            Ok(())
        }
    }

    fn creds_of(uid: u32) -> SavedCreds {
        SavedCreds {
            uid: Uid::from_raw(uid),
            euid: Uid::from_raw(uid),
            suid: Uid::from_raw(uid),
            fsuid: Uid::from_raw(uid),
            gid: Gid::from_raw(uid),
            egid: Gid::from_raw(uid),
            sgid: Gid::from_raw(uid),
            fsgid: Gid::from_raw(uid),
        }
    }

    #[test]
    fn escalate_then_deescalate_round_trips_the_identity() {
        let registry = Registry::new();
        let backend = FakeCreds::new(4321, 1000);

        escalate(&registry, &backend).unwrap();
        assert_eq!(backend.current(), SavedCreds::root());
        assert!(registry.is_escalated(Pid::from_raw(4321)));

        deescalate(&registry, &backend).unwrap();
        assert_eq!(backend.current(), creds_of(1000));
        assert!(!registry.is_escalated(Pid::from_raw(4321)));
    }

    #[test]
    fn repeated_escalation_keeps_the_first_snapshot() {
        let registry = Registry::new();
        let backend = FakeCreds::new(77, 1000);

        escalate(&registry, &backend).unwrap();
        // Second call: already escalated, current (root) identity must
        // not replace the saved one.
        escalate(&registry, &backend).unwrap();
        assert_eq!(
            registry.saved_creds(Pid::from_raw(77)),
            Some(creds_of(1000))
        );

        deescalate(&registry, &backend).unwrap();
        assert_eq!(backend.current(), creds_of(1000));
    }

    #[test]
    fn deescalate_without_snapshot_fails() {
        let registry = Registry::new();
        let backend = FakeCreds::new(5, 1000);
        assert!(matches!(
            deescalate(&registry, &backend),
            Err(PrivilegeError::NotEscalated(_))
        ));
    }

    #[test]
    fn escalation_requires_a_loaded_registry() {
        let registry = Registry::new();
        registry.unload();
        let backend = FakeCreds::new(6, 1000);
        assert!(matches!(
            escalate(&registry, &backend),
            Err(PrivilegeError::Registry(RegistryError::NotLoaded))
        ));
        // The identity was not touched.
        assert_eq!(backend.current(), creds_of(1000));
    }
}
