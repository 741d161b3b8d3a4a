//! Path reconstruction and indirection-chain resolution.
//!
//! The hide decision needs the absolute path of each enumerated entry, not
//! just its name: the name is joined onto the descriptor's current path,
//! and any chain of symbolic links behind that path is followed so a link
//! pointing into hidden territory hides the link itself.

use std::io;

use nix::unistd::Pid;
use thiserror::Error;

/// Longest path the resolver will produce. Joins are truncated here
/// deterministically rather than growing without bound.
pub const PATH_MAX: usize = 4096;

/// Hops after which an indirection chain is abandoned. A cyclic chain of
/// links would otherwise never terminate; past this bound the chain ends
/// and the entry counts as not hidden.
pub const LINK_HOP_BOUND: usize = 40;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("reading link failed {path}")]
    ReadLink {
        #[source]
        source: io::Error,
        path: String,
    },
}

/// The lower-level primitives the resolver is built on: descriptor-to-path
/// lookup, one level of link resolution, and the process parent relation.
///
/// Production code uses [`crate::procfs::Procfs`]; tests inject synthetic
/// filesystems and process trees.
pub trait PathSource: Send + Sync {
    /// Absolute path currently behind the descriptor.
    fn descriptor_path(&self, fd: i32) -> Result<String, ResolveError>;

    /// Resolve one level of indirection, `None` when `path` is not a link
    /// or cannot be read.
    fn link_target(&self, path: &str) -> Option<String>;

    /// Parent of `pid`, `None` when the process is gone or has no parent.
    fn parent_of(&self, pid: Pid) -> Option<Pid>;
}

/// Join `name` onto `base`, inserting a separator only if missing and
/// truncating at [`PATH_MAX`] on a character boundary.
pub fn join(base: &str, name: &str) -> String {
    let mut path = String::with_capacity(base.len() + name.len() + 1);
    path.push_str(base);
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(name);
    if path.len() > PATH_MAX {
        let mut end = PATH_MAX;
        while !path.is_char_boundary(end) {
            end -= 1;
        }
        path.truncate(end);
    }
    path
}

/// Lazy walk of the indirection chain starting at a path.
///
/// Yields each intermediate target in order. The walk ends when the
/// current path resolves to nothing, or when [`LINK_HOP_BOUND`] targets
/// have been yielded while more remain, in which case the anomaly is
/// logged and the chain simply stops.
pub struct LinkChain<'a> {
    source: &'a dyn PathSource,
    current: String,
    hops: usize,
    max_hops: usize,
}

impl<'a> LinkChain<'a> {
    pub fn new(source: &'a dyn PathSource, start: String, max_hops: usize) -> Self {
        Self {
            source,
            current: start,
            hops: 0,
            max_hops,
        }
    }
}

impl Iterator for LinkChain<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let target = self.source.link_target(&self.current)?;
        if self.hops >= self.max_hops {
            log::warn!(
                "indirection chain through {} exceeded {} hops, treating as not hidden",
                self.current,
                self.max_hops
            );
            return None;
        }
        self.hops += 1;
        self.current = target.clone();
        Some(target)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::FakeSource;

    #[test]
    fn join_inserts_separator_only_if_missing() {
        assert_eq!(join("/tmp", "x"), "/tmp/x");
        assert_eq!(join("/tmp/", "x"), "/tmp/x");
        assert_eq!(join("/", "etc"), "/etc");
    }

    #[test]
    fn join_truncates_at_path_max() {
        let base = "/".to_string() + &"a".repeat(PATH_MAX);
        let joined = join(&base, "overflow");
        assert_eq!(joined.len(), PATH_MAX);
    }

    #[test]
    fn chain_follows_links_in_order() {
        let fs = FakeSource::new().link("/a", "/b").link("/b", "/c");
        let chain: Vec<_> = LinkChain::new(&fs, "/a".into(), LINK_HOP_BOUND).collect();
        assert_eq!(chain, vec!["/b".to_string(), "/c".to_string()]);
    }

    #[test]
    fn chain_is_restartable() {
        let fs = FakeSource::new().link("/a", "/b");
        for _ in 0..2 {
            let chain: Vec<_> = LinkChain::new(&fs, "/a".into(), LINK_HOP_BOUND).collect();
            assert_eq!(chain, vec!["/b".to_string()]);
        }
    }

    #[test]
    fn cyclic_chain_terminates_at_the_bound() {
        let fs = FakeSource::new().link("/loop/a", "/loop/b").link("/loop/b", "/loop/a");
        let chain: Vec<_> = LinkChain::new(&fs, "/loop/a".into(), LINK_HOP_BOUND).collect();
        assert_eq!(chain.len(), LINK_HOP_BOUND);
    }
}
