// src/cache.rs

//! Removal of generated solver index caches
//!
//! Every repository, plus the `@System` pseudo-repository for the local
//! install database, may have a primary index and a filename index cached
//! under the configured temp directory.

use crate::error::Result;
use crate::package::SYSTEM_REPO_ID;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extension of a primary index cache
pub const PRIMARY_EXT: &str = "solv";

/// File name suffix of a filename index cache
pub const FILENAMES_SUFFIX: &str = "-filenames.solvx";

/// Filesystem access used by the janitor
#[cfg_attr(test, mockall::automock)]
pub trait CacheFs {
    /// Whether the path exists and can be accessed
    fn accessible(&self, path: &Path) -> bool;

    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl CacheFs for HostFs {
    #[cfg(unix)]
    fn accessible(&self, path: &Path) -> bool {
        use nix::unistd::{AccessFlags, access};
        access(path, AccessFlags::F_OK).is_ok()
    }

    #[cfg(not(unix))]
    fn accessible(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

pub struct CacheJanitor<F: CacheFs = HostFs> {
    tmpdir: PathBuf,
    fs: F,
}

impl CacheJanitor<HostFs> {
    pub fn new(tmpdir: &Path) -> Self {
        Self::with_fs(tmpdir, HostFs)
    }
}

impl<F: CacheFs> CacheJanitor<F> {
    pub fn with_fs(tmpdir: &Path, fs: F) -> Self {
        Self {
            tmpdir: tmpdir.to_path_buf(),
            fs,
        }
    }

    /// Cache files that may exist: the system index, then a primary and a
    /// filename index per repository
    pub fn candidate_paths(&self, repos: &[&str]) -> Vec<PathBuf> {
        let mut paths = vec![
            self.tmpdir
                .join(format!("{}.{}", SYSTEM_REPO_ID, PRIMARY_EXT)),
        ];
        for repo in repos {
            paths.push(self.tmpdir.join(format!("{}.{}", repo, PRIMARY_EXT)));
            paths.push(self.tmpdir.join(format!("{}{}", repo, FILENAMES_SUFFIX)));
        }
        paths
    }

    /// Delete every cache file that is present; returns the removed paths
    ///
    /// Missing files are skipped, and a file that disappears between the
    /// probe and the delete is not an error.
    pub fn clean_binary_cache(&self, repos: &[&str]) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for path in self.candidate_paths(repos) {
            if !self.fs.accessible(&path) {
                continue;
            }

            debug!("Removing cache file {}", path.display());
            match self.fs.remove(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Removed {} cache files", removed.len());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_probes_three_paths_for_one_repo() {
        let mut fs = MockCacheFs::new();
        fs.expect_accessible().times(3).return_const(true);
        fs.expect_remove().times(3).returning(|_| Ok(()));

        let janitor = CacheJanitor::with_fs(Path::new("/var/tmp/pkgtxn"), fs);
        let removed = janitor.clean_binary_cache(&["main"]).unwrap();

        assert_eq!(removed.len(), 3);
        assert!(removed[0].starts_with("/var/tmp/pkgtxn"));
        assert!(removed[0].to_string_lossy().ends_with("@System.solv"));
        assert!(removed[1].to_string_lossy().ends_with("main.solv"));
        assert!(removed[2].to_string_lossy().ends_with("main-filenames.solvx"));
    }

    #[test]
    fn test_only_accessible_files_are_removed() {
        let mut fs = MockCacheFs::new();
        fs.expect_accessible()
            .times(3)
            .returning(|p: &Path| p.ends_with("main.solv"));
        fs.expect_remove()
            .withf(|p: &Path| p.ends_with("main.solv"))
            .times(1)
            .returning(|_| Ok(()));

        let janitor = CacheJanitor::with_fs(Path::new("/tmp"), fs);
        let removed = janitor.clean_binary_cache(&["main"]).unwrap();
        assert_eq!(removed, vec![PathBuf::from("/tmp/main.solv")]);
    }

    #[test]
    fn test_vanished_file_is_not_an_error() {
        let mut fs = MockCacheFs::new();
        fs.expect_accessible().return_const(true);
        fs.expect_remove()
            .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));

        let janitor = CacheJanitor::with_fs(Path::new("/tmp"), fs);
        assert!(janitor.clean_binary_cache(&["main"]).unwrap().is_empty());
    }

    #[test]
    fn test_cleans_real_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("@System.solv"), b"x").unwrap();
        fs::write(dir.path().join("updates-filenames.solvx"), b"x").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        let janitor = CacheJanitor::new(dir.path());
        let removed = janitor.clean_binary_cache(&["main", "updates"]).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!dir.path().join("@System.solv").exists());
        assert!(!dir.path().join("updates-filenames.solvx").exists());
        assert!(dir.path().join("unrelated.txt").exists());
    }
}
