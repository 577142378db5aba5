// src/verify.rs

//! Post-transaction reconciliation of the provenance store
//!
//! Runs after the external executor has applied a plan. The package index
//! passed in must be reloaded from the database after the apply, so it
//! reflects what actually happened.

use crate::db::models::ProvenanceRecord;
use crate::error::Result;
use crate::package::PackageId;
use crate::provenance::ProvenanceStore;
use crate::query::PackageIndex;
use crate::transaction::{MemberState, Transaction, TransactionMember};
use tracing::{debug, info, warn};

/// What one verification run changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Records written (created or replaced)
    pub written: Vec<PackageId>,
    /// Records deleted
    pub removed: Vec<PackageId>,
    /// Members left alone: not committed, or the database disagrees
    pub skipped: Vec<PackageId>,
}

impl VerifyReport {
    pub fn changed(&self) -> usize {
        self.written.len() + self.removed.len()
    }
}

pub struct TransactionVerifier<'a> {
    store: &'a mut ProvenanceStore,
    releasever: String,
    installed_by: Option<u32>,
}

impl<'a> TransactionVerifier<'a> {
    pub fn new(store: &'a mut ProvenanceStore, releasever: &str) -> Self {
        Self {
            store,
            releasever: releasever.to_string(),
            installed_by: None,
        }
    }

    /// uid recorded as the installing user
    pub fn with_installed_by(mut self, uid: u32) -> Self {
        self.installed_by = Some(uid);
        self
    }

    /// Write or delete one provenance record per committed member
    ///
    /// Installed members get a fresh record, erased members lose theirs.
    /// Installed packages that are not part of the transaction are left
    /// untouched. Running it twice leaves the store in the same state.
    pub fn verify_transaction(
        &mut self,
        transaction: &Transaction,
        index: &PackageIndex,
    ) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut writes = Vec::new();
        let mut deletes = Vec::new();

        for member in transaction.members() {
            if member.state != MemberState::Committed {
                debug!(package = %member.package, state = ?member.state, "Skipping uncommitted member");
                report.skipped.push(member.id().clone());
                continue;
            }

            if member.operation.installs() {
                if !index.is_installed(member.id()) {
                    warn!(
                        "{} was supposed to be installed but is not",
                        member.package
                    );
                    report.skipped.push(member.id().clone());
                    continue;
                }

                writes.push(self.record_for(member)?);
                for old in &member.replaces {
                    if old.id != *member.id() && !index.is_installed(&old.id) {
                        deletes.push(old.id.clone());
                    }
                }
            } else if index.is_installed(member.id()) {
                warn!("{} was supposed to be removed but is not", member.package);
                report.skipped.push(member.id().clone());
            } else {
                deletes.push(member.id().clone());
            }
        }

        let untouched = index
            .query()
            .installed()
            .iter()
            .filter(|p| transaction.find(&p.id).is_none())
            .count();
        debug!(untouched, "Installed packages outside the transaction left alone");

        let (written, removed) = self.store.transaction(|tx| {
            let mut written = Vec::with_capacity(writes.len());
            for record in &writes {
                record.upsert(tx)?;
                written.push(record.package.clone());
            }

            let mut removed = Vec::new();
            for id in deletes {
                if ProvenanceRecord::delete(tx, &id)? {
                    removed.push(id);
                }
            }
            Ok((written, removed))
        })?;

        report.written = written;
        report.removed = removed;
        info!(
            written = report.written.len(),
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "Transaction verified"
        );
        Ok(report)
    }

    fn record_for(&self, member: &TransactionMember) -> Result<ProvenanceRecord> {
        let package = &member.package;

        // replacements keep the reason of what they replace; once that
        // record is gone, the one already written for the member carries it
        let mut reason = member.reason;
        if member.operation.replaces() {
            let mut inherited = None;
            for old in &member.replaces {
                if let Some(old_reason) = self.store.reason(&old.id)? {
                    inherited = Some(old_reason);
                    break;
                }
            }
            if inherited.is_none() {
                inherited = self.store.reason(member.id())?;
            }
            if let Some(inherited) = inherited {
                reason = inherited;
            }
        }

        let mut record = ProvenanceRecord::new(
            package.id.clone(),
            package.repo.clone(),
            reason,
            self.releasever.clone(),
        );
        if let Some(ref checksum) = package.checksum {
            record.checksum_type = Some(checksum.kind.as_str().to_string());
            record.checksum_data = Some(checksum.hex());
        }
        record.installed_by = self.installed_by;
        Ok(record)
    }
}
