//! Dirveil hides selected entries from a directory-like enumeration call
//! by intercepting its dispatch-table entry and rewriting the returned
//! record buffer in place. It is split into focused crates:
//!
//! - [`dirveil_hook`] — the interception lifecycle (install, wrap with a
//!   call guard, quiescence drain, restore) and the record filter with
//!   its path/link/ancestry resolution;
//! - [`dirveil_registry`] — the hide-lists: paths, prefixes, pids,
//!   sockets, addresses, module names, port-knock rules and saved
//!   credential sets, each behind its own lock;
//! - this crate — composition: configuration, the [`Dirveil`] lifecycle
//!   facade, and privilege save/restore.
//!
//! What should be hidden is pure registry configuration supplied by the
//! embedding application; this crate ships no policy of its own.

use std::sync::Arc;

use dirveil_hook::{DispatchSlot, HideEngine, Hook, HookError, PathSource, procfs::Procfs};
use dirveil_registry::Registry;

pub mod config;
pub mod privilege;

pub use config::Config;
pub use dirveil_hook as hook;
pub use dirveil_registry as registry;

/// Owns the registry, the hook and the dispatch slot for one intercepted
/// entry point. Install/uninstall are the module lifecycle boundary.
pub struct Dirveil {
    registry: Arc<Registry>,
    hook: Hook,
    slot: Arc<DispatchSlot>,
}

impl Dirveil {
    /// Wire up a context around a dispatch slot, using procfs for path
    /// resolution.
    pub fn new(config: &Config, slot: Arc<DispatchSlot>) -> Self {
        Self::with_path_source(config, slot, Arc::new(Procfs))
    }

    /// Same as [`Dirveil::new`] with an injected path backend.
    pub fn with_path_source(
        config: &Config,
        slot: Arc<DispatchSlot>,
        source: Arc<dyn PathSource>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let engine = HideEngine::new(registry.clone(), source)
            .with_fail_mode(config.fail_mode)
            .with_max_hops(config.max_link_hops);
        let hook = Hook::new(Arc::new(engine), config.drain());
        Self {
            registry,
            hook,
            slot,
        }
    }

    /// The hide-lists; mutate these to configure what is hidden.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_installed(&self) -> bool {
        self.hook.is_installed()
    }

    pub fn install(&self) -> Result<(), HookError> {
        self.hook.install(&self.slot)
    }

    pub fn uninstall(&self) -> Result<(), HookError> {
        self.hook.uninstall(&self.slot)
    }

    /// Remove the hook (draining in-flight calls) and unload the
    /// registry.
    pub fn teardown(self) -> Result<(), HookError> {
        self.hook.uninstall(&self.slot)?;
        self.registry.unload();
        Ok(())
    }
}
