// src/base.rs

//! The session object tying the transaction core together
//!
//! A `Base` owns the configuration, the provenance store, the held lock and
//! the package index loaded under that lock. The index is only trusted for
//! the lifetime of the lock it was loaded under: unlocking drops it, and a
//! new lock starts without one.

use crate::cache::CacheJanitor;
use crate::comps::{self, Comps};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::{Lock, LockManager};
use crate::planner::TransactionPlanner;
use crate::provenance::ProvenanceStore;
use crate::query::{PackageDatabase, PackageIndex};
use crate::transaction::Transaction;
use crate::verify::{TransactionVerifier, VerifyReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Base {
    config: Config,
    store: ProvenanceStore,
    lock: Option<Lock>,
    index: Option<Arc<PackageIndex>>,
}

impl Base {
    /// Open a session, creating the provenance database if needed
    pub fn new(config: Config) -> Result<Self> {
        let store = ProvenanceStore::open(&config.db_path)?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: ProvenanceStore) -> Self {
        Self {
            config,
            store,
            lock: None,
            index: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ProvenanceStore {
        &self.store
    }

    pub fn is_locked(&self) -> bool {
        self.lock.as_ref().is_some_and(Lock::is_held)
    }

    /// Take the process lock; a no-op if this session already holds it
    pub fn lock(&mut self) -> Result<()> {
        if self.is_locked() {
            return Ok(());
        }

        let lock = LockManager::from_config(&self.config).acquire()?;
        // whatever was loaded before is stale now
        self.index = None;
        self.lock = Some(lock);
        Ok(())
    }

    /// Release the lock and forget the package index
    pub fn unlock(&mut self) -> Result<()> {
        self.index = None;
        match self.lock.take() {
            Some(mut lock) => lock.release(),
            None => {
                debug!("unlock called without a held lock");
                Ok(())
            }
        }
    }

    /// (Re)load the package index from the native database
    pub fn fill_index(&mut self, db: &dyn PackageDatabase) -> Result<Arc<PackageIndex>> {
        self.ensure_locked("load the package index")?;

        let index = Arc::new(PackageIndex::load(db)?);
        info!("Loaded {} packages into the index", index.len());
        self.index = Some(Arc::clone(&index));
        Ok(index)
    }

    pub fn index(&self) -> Option<&Arc<PackageIndex>> {
        self.index.as_ref()
    }

    /// Start planning a transaction against the loaded index
    pub fn planner(&self) -> Result<TransactionPlanner<'_>> {
        let index = self.index.as_ref().ok_or_else(|| {
            Error::InvalidState("no package index loaded, call fill_index first".to_string())
        })?;

        Ok(TransactionPlanner::new(
            Arc::clone(index),
            &self.store,
            self.config.clean_requirements_on_remove,
        ))
    }

    /// Reconcile the provenance store with an applied transaction
    ///
    /// The index is reloaded from `db` first so the comparison sees the
    /// database as the executor left it.
    pub fn verify_transaction(
        &mut self,
        db: &dyn PackageDatabase,
        transaction: &Transaction,
    ) -> Result<VerifyReport> {
        let index = self.fill_index(db)?;
        let releasever = self.config.releasever();

        let mut verifier = TransactionVerifier::new(&mut self.store, &releasever);
        if let Some(uid) = current_uid() {
            verifier = verifier.with_installed_by(uid);
        }
        verifier.verify_transaction(transaction, &index)
    }

    /// Delete the solver caches of the system and all enabled repositories
    pub fn clean_binary_cache(&self) -> Result<Vec<PathBuf>> {
        let repos: Vec<&str> = self
            .config
            .enabled_repos()
            .map(|r| r.id.as_str())
            .collect();
        CacheJanitor::new(&self.config.tmpdir).clean_binary_cache(&repos)
    }

    pub fn read_comps(&self) -> Result<Comps> {
        comps::read_comps(self.config.enabled_repos())
    }

    fn ensure_locked(&self, what: &str) -> Result<()> {
        if self.is_locked() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "the lock must be held to {}",
                what
            )))
        }
    }
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    Some(nix::unistd::getuid().as_raw())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}
