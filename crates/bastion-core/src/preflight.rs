//! Preflight checks
//!
//! Privilege and tool availability are checked before anything on the host
//! is touched. Every missing tool is reported in one error.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};

/// Host facts needed before provisioning
pub struct Preflight {
    is_root: bool,
    locate: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Preflight {
    /// Checks against the running host
    pub fn host() -> Self {
        Self::new(effective_uid_is_root(), on_path)
    }

    /// Checks against supplied facts
    pub fn new(is_root: bool, locate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            is_root,
            locate: Box::new(locate),
        }
    }

    /// Fail unless running as root with every tool installed
    pub fn check<'a>(&self, tools: impl IntoIterator<Item = &'a str>) -> Result<()> {
        if !self.is_root {
            return Err(Error::precondition("must run as root"));
        }

        let missing: BTreeSet<&str> = tools
            .into_iter()
            .filter(|tool| !(self.locate)(*tool))
            .collect();

        if !missing.is_empty() {
            let missing: Vec<&str> = missing.into_iter().collect();
            return Err(Error::precondition(format!(
                "required tool(s) not found on PATH: {}",
                missing.join(", ")
            )));
        }

        tracing::debug!("Preflight passed");
        Ok(())
    }
}

impl std::fmt::Debug for Preflight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preflight")
            .field("is_root", &self.is_root)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn effective_uid_is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn effective_uid_is_root() -> bool {
    false
}

/// Whether an executable named `tool` is on PATH
fn on_path(tool: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(tool)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
