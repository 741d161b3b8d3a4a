//! Production [`PathSource`] backed by procfs.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
};

use nix::unistd::Pid;

use crate::resolve::{PathSource, ResolveError};

/// Resolves descriptors through `/proc/self/fd`, links through
/// `readlink(2)` and process parents through `/proc/{pid}/status`.
pub struct Procfs;

impl PathSource for Procfs {
    fn descriptor_path(&self, fd: i32) -> Result<String, ResolveError> {
        let path = format!("/proc/self/fd/{fd}");
        fs::read_link(&path)
            .map(|target| target.to_string_lossy().into_owned())
            .map_err(|source| ResolveError::ReadLink { source, path })
    }

    fn link_target(&self, path: &str) -> Option<String> {
        fs::read_link(path)
            .ok()
            .map(|target| target.to_string_lossy().into_owned())
    }

    fn parent_of(&self, pid: Pid) -> Option<Pid> {
        let file = File::open(format!("/proc/{pid}/status")).ok()?;
        let reader = BufReader::new(file);
        for line in reader.lines().map_while(Result::ok) {
            if let Some(value) = line.strip_prefix("PPid:") {
                return value.trim().parse().ok().map(Pid::from_raw);
            }
        }
        None
    }
}
