// src/provenance.rs

//! Persistent per-package install metadata
//!
//! The store owns its SQLite connection. Records are keyed by package
//! identity and are only ever replaced as a whole.

use crate::db::{self, models::ProvenanceRecord};
use crate::error::Result;
use crate::package::PackageId;
use crate::transaction::Reason;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

pub struct ProvenanceStore {
    conn: Connection,
}

impl ProvenanceStore {
    /// Open (creating if needed) the store at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            db::init(db_path)?;
        }
        let conn = db::open(db_path)?;
        debug!("Opened provenance store at {}", db_path.display());
        Ok(Self { conn })
    }

    /// A throwaway store, used for dry runs and tests
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    pub fn get(&self, package: &PackageId) -> Result<Option<ProvenanceRecord>> {
        ProvenanceRecord::find(&self.conn, package)
    }

    /// Persisted reason for a package, if it has a record
    pub fn reason(&self, package: &PackageId) -> Result<Option<Reason>> {
        Ok(self.get(package)?.map(|r| r.reason))
    }

    pub fn put(&self, record: &ProvenanceRecord) -> Result<()> {
        record.upsert(&self.conn)
    }

    /// Remove a record; returns whether one existed
    pub fn delete(&self, package: &PackageId) -> Result<bool> {
        ProvenanceRecord::delete(&self.conn, package)
    }

    pub fn count(&self) -> Result<usize> {
        ProvenanceRecord::count(&self.conn)
    }

    pub fn list(&self) -> Result<Vec<ProvenanceRecord>> {
        ProvenanceRecord::list_all(&self.conn)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Vec<ProvenanceRecord>> {
        ProvenanceRecord::find_by_name(&self.conn, name)
    }

    pub fn find_by_reason(&self, reason: Reason) -> Result<Vec<ProvenanceRecord>> {
        ProvenanceRecord::find_by_reason(&self.conn, reason)
    }

    /// Apply a batch of changes atomically
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        db::transaction(&mut self.conn, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    fn record(name: &str, reason: Reason) -> ProvenanceRecord {
        ProvenanceRecord::new(
            PackageId::new(name, "1", "1", "noarch"),
            "main".to_string(),
            reason,
            "39".to_string(),
        )
    }

    #[test]
    fn test_open_creates_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/provenance.db");

        {
            let store = ProvenanceStore::open(&path).unwrap();
            store.put(&record("pepper", Reason::User)).unwrap();
        }

        let store = ProvenanceStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(
            store.reason(&PackageId::new("pepper", "1", "1", "noarch")).unwrap(),
            Some(Reason::User)
        );
    }

    #[test]
    fn test_batch_is_atomic() {
        let mut store = ProvenanceStore::in_memory().unwrap();
        store.put(&record("keep", Reason::User)).unwrap();

        let result: Result<()> = store.transaction(|tx| {
            record("new", Reason::Dependency).upsert(tx)?;
            ProvenanceRecord::delete(tx, &PackageId::new("keep", "1", "1", "noarch"))?;
            Err(Error::InvalidState("executor crashed".to_string()))
        });
        assert!(result.is_err());

        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.package.name)
            .collect();
        assert_eq!(names, vec!["keep".to_string()]);
    }

    #[test]
    fn test_reason_of_missing_package() {
        let store = ProvenanceStore::in_memory().unwrap();
        let id = PackageId::new("ghost", "1", "1", "noarch");
        assert_eq!(store.reason(&id).unwrap(), None);
        assert!(!store.delete(&id).unwrap());
    }
}
