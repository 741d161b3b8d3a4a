//! The hide predicate: one boolean decision per enumerated record.
//!
//! A record is hidden when any of four tests matches:
//!
//! 1. its absolute path is a registered hidden path;
//! 2. some level of that path starts with a registered hidden prefix;
//! 3. any target along its indirection chain matches 1 or 2;
//! 4. for entries under the process-table root, the named pid or any of
//!    its ancestors is a registered hidden pid.
//!
//! Decisions are recomputed on every call; the hide-lists may change
//! between calls, so nothing here is cached.

use std::sync::Arc;

use dirveil_registry::Registry;
use nix::unistd::Pid;

use crate::resolve::{self, LinkChain, PathSource};

/// Mount point of the process-table resource; entries directly under it
/// are named by pid and subject to the ancestry test.
const PROC_ROOT: &str = "/proc";

/// What a sub-test contributes when it cannot resolve the information it
/// needs: `Open` keeps the record visible (availability first), `Closed`
/// hides it (secrecy first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

impl FailMode {
    fn on_unresolved(self) -> bool {
        matches!(self, FailMode::Closed)
    }
}

/// Combines the path resolver and the registry into the per-record
/// hide-or-keep decision.
pub struct HideEngine {
    registry: Arc<Registry>,
    source: Arc<dyn PathSource>,
    fail_mode: FailMode,
    max_hops: usize,
}

impl HideEngine {
    pub fn new(registry: Arc<Registry>, source: Arc<dyn PathSource>) -> Self {
        Self {
            registry,
            source,
            fail_mode: FailMode::default(),
            max_hops: resolve::LINK_HOP_BOUND,
        }
    }

    pub fn with_fail_mode(mut self, fail_mode: FailMode) -> Self {
        self.fail_mode = fail_mode;
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Resolve the directory currently behind `fd`, `None` when the
    /// descriptor cannot be resolved. The caller feeds the result to
    /// [`HideEngine::must_hide`] once per record.
    pub fn directory_of(&self, fd: i32) -> Option<String> {
        match self.source.descriptor_path(fd) {
            Ok(path) => Some(path),
            Err(err) => {
                log::warn!("cannot resolve descriptor {fd}: {err}");
                None
            }
        }
    }

    /// Decide whether the record named `name`, enumerated from directory
    /// `dir`, must be withheld. `dir: None` means the descriptor could not
    /// be resolved; the configured [`FailMode`] then decides.
    pub fn must_hide(&self, dir: Option<&str>, name: &str) -> bool {
        if self.hidden_process_entry(dir, name) {
            return true;
        }
        let Some(dir) = dir else {
            return self.fail_mode.on_unresolved();
        };

        let path = resolve::join(dir, name);
        if self.path_hidden(&path) {
            return true;
        }
        // A link counts as hidden if anything it leads to is hidden.
        LinkChain::new(self.source.as_ref(), path, self.max_hops)
            .any(|target| self.path_hidden(&target))
    }

    fn path_hidden(&self, path: &str) -> bool {
        self.registry.is_path_hidden(path) || self.prefix_hidden(path)
    }

    /// Level-by-level prefix test: the full path and each successive
    /// suffix (stripped at every separator) is matched against the
    /// registered prefixes, so a prefix hides entries at any depth.
    fn prefix_hidden(&self, path: &str) -> bool {
        let mut level = path;
        loop {
            if self.registry.matches_hidden_prefix(level) {
                return true;
            }
            match level.find('/') {
                Some(i) if i + 1 < level.len() => level = &level[i + 1..],
                _ => return false,
            }
        }
    }

    /// Test 4: only for records enumerated from the process-table root,
    /// whose names are pids. Hidden if the pid or any ancestor is
    /// registered; the walk stops at pid 0 or a missing parent.
    fn hidden_process_entry(&self, dir: Option<&str>, name: &str) -> bool {
        match dir {
            Some(dir) if dir.starts_with(PROC_ROOT) => {}
            _ => return false,
        }
        let Ok(pid) = name.parse::<i32>() else {
            return false;
        };

        let mut current = Pid::from_raw(pid);
        loop {
            if self.registry.is_pid_hidden(current) {
                return true;
            }
            match self.source.parent_of(current) {
                Some(parent) if parent.as_raw() != 0 && parent != current => current = parent,
                _ => return false,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::FakeSource;

    fn engine(source: FakeSource) -> HideEngine {
        HideEngine::new(Arc::new(Registry::new()), Arc::new(source))
    }

    #[test]
    fn exact_path_match() {
        let engine = engine(FakeSource::new());
        engine.registry().hide_path("/tmp/secret").unwrap();

        assert!(engine.must_hide(Some("/tmp"), "secret"));
        assert!(!engine.must_hide(Some("/tmp"), "visible"));
        assert!(!engine.must_hide(Some("/var"), "secret"));
    }

    #[test]
    fn prefix_match_at_every_level() {
        let engine = engine(FakeSource::new());
        engine.registry().hide_prefix("/tmp/x").unwrap();

        assert!(engine.must_hide(Some("/tmp"), "xyz"));
        assert!(engine.must_hide(Some("/tmp/x"), "1"));
        assert!(!engine.must_hide(Some("/tmp"), "y"));

        // A bare prefix matches suffix levels of a deeper path.
        let engine = engine_with_prefix("cache-");
        assert!(engine.must_hide(Some("/var/lib"), "cache-main"));
        assert!(!engine.must_hide(Some("/var/lib"), "main-cache"));
    }

    fn engine_with_prefix(prefix: &str) -> HideEngine {
        let e = engine(FakeSource::new());
        e.registry().hide_prefix(prefix).unwrap();
        e
    }

    #[test]
    fn link_into_hidden_territory_hides_the_link() {
        let source = FakeSource::new().link("/home/user/shortcut", "/opt/hidden/tool");
        let engine = engine(source);
        engine.registry().hide_path("/opt/hidden/tool").unwrap();

        assert!(engine.must_hide(Some("/home/user"), "shortcut"));
        assert!(!engine.must_hide(Some("/home/user"), "other"));
    }

    #[test]
    fn cyclic_link_chain_resolves_to_not_hidden() {
        let source = FakeSource::new()
            .link("/loop/entry", "/loop/back")
            .link("/loop/back", "/loop/entry");
        let engine = engine(source);
        engine.registry().hide_path("/elsewhere").unwrap();

        assert!(!engine.must_hide(Some("/loop"), "entry"));
    }

    #[test]
    fn ancestry_walk_hides_descendants() {
        let source = FakeSource::new()
            .dir(3, "/proc")
            .parent(150, 120)
            .parent(120, 100)
            .parent(100, 1)
            .parent(200, 1)
            .parent(1, 0);
        let engine = engine(source);
        engine.registry().hide_pid(Pid::from_raw(100)).unwrap();

        assert!(engine.must_hide(Some("/proc"), "100"));
        assert!(engine.must_hide(Some("/proc"), "150"));
        assert!(!engine.must_hide(Some("/proc"), "200"));
        // Outside the process-table root pid names are ordinary names.
        assert!(!engine.must_hide(Some("/tmp"), "150"));
        // Non-numeric names are never process entries.
        assert!(!engine.must_hide(Some("/proc"), "uptime"));
    }

    #[test]
    fn fail_mode_decides_unresolvable_directories() {
        let open = engine(FakeSource::new());
        assert!(!open.must_hide(None, "anything"));

        let closed = engine(FakeSource::new()).with_fail_mode(FailMode::Closed);
        assert!(closed.must_hide(None, "anything"));
    }

    #[test]
    fn directory_of_reports_unresolvable_descriptors() {
        let engine = engine(FakeSource::new().dir(3, "/tmp"));
        assert_eq!(engine.directory_of(3).as_deref(), Some("/tmp"));
        assert_eq!(engine.directory_of(9), None);
    }
}
