// src/lock.rs

//! Process-level mutual exclusion via a PID-stamped lock file
//!
//! The lock file at `<prefix><pid_filename><suffix>` contains the PID of
//! the holder. Its presence on disk is the only coordination signal. A file
//! left behind by a dead process is cleared on the next acquire.
//!
//! The file is written in full under a scratch name and hard-linked into
//! place, so a lock file is never observed half-written. Stale files are
//! claimed by renaming them away first, so only one of several recovering
//! processes removes a given file.

use crate::config::Config;
use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Attempts before giving up when the file keeps reappearing under us
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// A held lock. Dropping it releases the file.
#[derive(Debug)]
pub struct Lock {
    path: PathBuf,
    pid: u32,
    held: bool,
    /// False for re-entrant handles, which never remove the file
    owns_file: bool,
}

impl Lock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Remove the lock file if it still belongs to this process
    ///
    /// Releasing twice, releasing a re-entrant handle, or releasing after
    /// another process has taken the file over are all no-ops.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;

        if !self.owns_file {
            debug!(path = %self.path.display(), "Released re-entrant lock handle");
            return Ok(());
        }

        match read_holder(&self.path)? {
            Some(holder) if holder == self.pid => {
                remove_lock_file(&self.path)?;
                info!(pid = self.pid, path = %self.path.display(), "Lock released");
            }
            Some(holder) => {
                warn!(
                    pid = holder,
                    path = %self.path.display(),
                    "Lock file now belongs to another process, leaving it"
                );
            }
            None => debug!(path = %self.path.display(), "Lock file already gone"),
        }
        Ok(())
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Hands out locks for one configured lock path
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path_prefix: &str, pid_filename: &str, suffix: &str) -> Self {
        Self {
            path: PathBuf::from(format!("{}{}{}", path_prefix, pid_filename, suffix)),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.lock_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the lock file, if the file exists and is readable
    pub fn holder(&self) -> Result<Option<u32>> {
        read_holder(&self.path)
    }

    /// Take the lock for the current process
    ///
    /// Succeeds immediately when the file is absent, held by this process
    /// (re-entrant), or left behind by a dead process. Fails with
    /// `LockHeld` when a live process holds it; that process's file is left
    /// untouched.
    pub fn acquire(&self) -> Result<Lock> {
        let pid = std::process::id();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        for attempt in 1..=MAX_ACQUIRE_ATTEMPTS {
            if self.try_create(pid)? {
                info!(pid, path = %self.path.display(), "Lock acquired");
                return Ok(Lock {
                    path: self.path.clone(),
                    pid,
                    held: true,
                    owns_file: true,
                });
            }

            match read_holder(&self.path)? {
                Some(holder) if holder == pid => {
                    debug!(pid, "Lock already held by this process");
                    return Ok(Lock {
                        path: self.path.clone(),
                        pid,
                        held: true,
                        owns_file: false,
                    });
                }
                Some(holder) if is_pid_alive(holder) => {
                    return Err(Error::LockHeld {
                        path: self.path.clone(),
                        pid: holder,
                    });
                }
                holder => {
                    warn!(
                        ?holder,
                        attempt,
                        path = %self.path.display(),
                        "Recovering stale lock file"
                    );
                    self.clear_stale(holder, pid)?;
                }
            }
        }

        Err(Error::LockHeld {
            path: self.path.clone(),
            pid: self.holder()?.unwrap_or(0),
        })
    }

    /// Publish a lock file holding `pid`; false if one already exists
    fn try_create(&self, pid: u32) -> Result<bool> {
        let scratch = self.scratch_path("new", pid);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&scratch)?;
            file.write_all(format!("{}\n", pid).as_bytes())?;
            file.sync_all()?;
        }

        let linked = fs::hard_link(&scratch, &self.path);
        remove_lock_file(&scratch)?;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a lock file last seen holding the dead `stale` PID
    ///
    /// If the claimed file turns out to belong to a live process, it took
    /// the lock after `stale` was read and the file is put back.
    fn clear_stale(&self, stale: Option<u32>, pid: u32) -> Result<()> {
        let claimed = self.scratch_path("stale", pid);
        match fs::rename(&self.path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Stale lock already cleared");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let holder = read_holder(&claimed)?;
        if holder != stale && holder.is_some_and(is_pid_alive) {
            match fs::hard_link(&claimed, &self.path) {
                Ok(()) => debug!(?holder, "Restored lock file taken during recovery"),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(?holder, path = %self.path.display(), "Lock file replaced during recovery");
                }
                Err(e) => {
                    remove_lock_file(&claimed)?;
                    return Err(e.into());
                }
            }
        }
        remove_lock_file(&claimed)
    }

    fn scratch_path(&self, tag: &str, pid: u32) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}", tag, pid));
        self.path.with_file_name(name)
    }
}

/// Read the PID from a lock file
///
/// `Ok(None)` when the file is missing. A file whose content is not a PID
/// reads as `Some(0)`, which is never alive.
fn read_holder(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content.trim().parse().unwrap_or(0))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove_lock_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // Signal 0 only checks for existence; EPERM means it exists but is not ours
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_pid_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> LockManager {
        LockManager::new(&format!("{}/", dir.path().display()), "pkgtxn.pid", ".test")
    }

    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_lock_path_convention() {
        let lm = LockManager::new("/var/run/", "pkgtxn.pid", ".x");
        assert_eq!(lm.path(), Path::new("/var/run/pkgtxn.pid.x"));
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);

        let mut lock = lm.acquire().unwrap();
        assert!(lock.is_held());
        assert!(fs::metadata(lock.path()).is_ok());
        assert_eq!(lm.holder().unwrap(), Some(std::process::id()));

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!lm.path().exists());

        // second release is a no-op
        lock.release().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);

        {
            let _lock = lm.acquire().unwrap();
            assert!(lm.path().exists());
        }
        assert!(!lm.path().exists());
    }

    #[test]
    fn test_reentrant_for_owner() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);

        let outer = lm.acquire().unwrap();
        let mut inner = lm.acquire().unwrap();
        inner.release().unwrap();

        // the inner handle must not take the file away from the outer one
        assert!(lm.path().exists());
        drop(outer);
        assert!(!lm.path().exists());
    }

    #[test]
    fn test_stale_lock_is_recovered() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);
        fs::write(lm.path(), format!("{}\n", dead_pid())).unwrap();

        let lock = lm.acquire().unwrap();
        assert_eq!(lm.holder().unwrap(), Some(lock.pid()));
    }

    #[test]
    fn test_garbage_lock_file_is_recovered() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);
        fs::write(lm.path(), "not a pid").unwrap();

        assert!(lm.acquire().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_holder_rejects() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);
        let parent = std::os::unix::process::parent_id();
        fs::write(lm.path(), format!("{}\n", parent)).unwrap();

        let result = lm.acquire();
        match result {
            Err(Error::LockHeld { pid, .. }) => assert_eq!(pid, parent),
            other => panic!("expected LockHeld, got {:?}", other),
        }

        // the holder's file is untouched
        assert_eq!(lm.holder().unwrap(), Some(parent));
    }

    #[test]
    fn test_acquire_leaves_no_scratch_files() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);
        fs::write(lm.path(), format!("{}\n", dead_pid())).unwrap();

        let _lock = lm.acquire().unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![lm.path().file_name().unwrap().to_os_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_recovery_keeps_lock_taken_meanwhile() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);
        let stale = dead_pid();

        // another process cleared the stale file and locked before we got to it
        let parent = std::os::unix::process::parent_id();
        fs::write(lm.path(), format!("{}\n", parent)).unwrap();

        lm.clear_stale(Some(stale), std::process::id()).unwrap();
        assert_eq!(lm.holder().unwrap(), Some(parent));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(matches!(lm.acquire(), Err(Error::LockHeld { .. })));
    }

    #[test]
    fn test_clear_stale_after_someone_else_cleared() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);

        lm.clear_stale(Some(dead_pid()), std::process::id()).unwrap();
        assert!(!lm.path().exists());
    }

    #[test]
    fn test_release_leaves_foreign_file() {
        let dir = TempDir::new().unwrap();
        let lm = manager(&dir);

        let mut lock = lm.acquire().unwrap();
        fs::write(lm.path(), "4242\n").unwrap();

        lock.release().unwrap();
        assert_eq!(lm.holder().unwrap(), Some(4242));
    }
}
