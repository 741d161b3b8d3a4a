//! Synthetic [`PathSource`] for unit tests: descriptor paths, link maps
//! and process parent chains are all declared up front.

use std::collections::HashMap;
use std::io;

use nix::unistd::Pid;

use crate::resolve::{PathSource, ResolveError};

#[derive(Default)]
pub(crate) struct FakeSource {
    dirs: HashMap<i32, String>,
    links: HashMap<String, String>,
    parents: HashMap<Pid, Pid>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dir(mut self, fd: i32, path: &str) -> Self {
        self.dirs.insert(fd, path.to_string());
        self
    }

    pub(crate) fn link(mut self, from: &str, to: &str) -> Self {
        self.links.insert(from.to_string(), to.to_string());
        self
    }

    pub(crate) fn parent(mut self, child: i32, parent: i32) -> Self {
        self.parents
            .insert(Pid::from_raw(child), Pid::from_raw(parent));
        self
    }
}

impl PathSource for FakeSource {
    fn descriptor_path(&self, fd: i32) -> Result<String, ResolveError> {
        self.dirs
            .get(&fd)
            .cloned()
            .ok_or_else(|| ResolveError::ReadLink {
                source: io::Error::from(io::ErrorKind::NotFound),
                path: format!("/proc/self/fd/{fd}"),
            })
    }

    fn link_target(&self, path: &str) -> Option<String> {
        self.links.get(path).cloned()
    }

    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        self.parents.get(&pid).copied()
    }
}
