// src/db/models.rs

//! Data models for provenance database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::error::Result;
use crate::package::PackageId;
use crate::transaction::Reason;
use rusqlite::{Connection, OptionalExtension, Row, params};

const SELECT_COLUMNS: &str = "SELECT name, epoch, version, release, arch, from_repo, reason,
        releasever, checksum_type, checksum_data, installed_by, recorded_at
     FROM provenance";

/// Why a package is installed, where it came from, and what it looked like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
    pub package: PackageId,
    pub from_repo: String,
    pub reason: Reason,
    pub releasever: String,
    pub checksum_type: Option<String>,
    /// Lowercase hex digest
    pub checksum_data: Option<String>,
    pub installed_by: Option<u32>,
    pub recorded_at: Option<String>,
}

impl ProvenanceRecord {
    /// Create a new record with no checksum
    pub fn new(package: PackageId, from_repo: String, reason: Reason, releasever: String) -> Self {
        Self {
            package,
            from_repo,
            reason,
            releasever,
            checksum_type: None,
            checksum_data: None,
            installed_by: None,
            recorded_at: None,
        }
    }

    /// Write this record, replacing every field of an existing record for
    /// the same package identity
    ///
    /// Rewriting an identical record leaves the row, `recorded_at`
    /// included, as it was.
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO provenance (name, epoch, version, release, arch, from_repo, reason,
                                     releasever, checksum_type, checksum_data, installed_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(name, epoch, version, release, arch) DO UPDATE SET
                from_repo = excluded.from_repo,
                reason = excluded.reason,
                releasever = excluded.releasever,
                checksum_type = excluded.checksum_type,
                checksum_data = excluded.checksum_data,
                installed_by = excluded.installed_by,
                recorded_at = CURRENT_TIMESTAMP
             WHERE provenance.from_repo IS NOT excluded.from_repo
                OR provenance.reason IS NOT excluded.reason
                OR provenance.releasever IS NOT excluded.releasever
                OR provenance.checksum_type IS NOT excluded.checksum_type
                OR provenance.checksum_data IS NOT excluded.checksum_data
                OR provenance.installed_by IS NOT excluded.installed_by",
            params![
                &self.package.name,
                &self.package.epoch,
                &self.package.version,
                &self.package.release,
                &self.package.arch,
                &self.from_repo,
                self.reason.as_str(),
                &self.releasever,
                &self.checksum_type,
                &self.checksum_data,
                &self.installed_by,
            ],
        )?;
        Ok(())
    }

    /// Find the record for a package identity
    pub fn find(conn: &Connection, package: &PackageId) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE name = ?1 AND epoch = ?2 AND version = ?3 AND release = ?4 AND arch = ?5",
            SELECT_COLUMNS
        ))?;

        let record = stmt
            .query_row(
                params![
                    &package.name,
                    &package.epoch,
                    &package.version,
                    &package.release,
                    &package.arch
                ],
                Self::from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// Find records by package name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE name = ?1 ORDER BY arch, epoch, version, release",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Find records with the given reason
    pub fn find_by_reason(conn: &Connection, reason: Reason) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE reason = ?1 ORDER BY name, arch",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map([reason.as_str()], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// List all records
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY name, arch, epoch, version, release",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Delete the record for a package identity, returning whether one existed
    pub fn delete(conn: &Connection, package: &PackageId) -> Result<bool> {
        let changed = conn.execute(
            "DELETE FROM provenance
             WHERE name = ?1 AND epoch = ?2 AND version = ?3 AND release = ?4 AND arch = ?5",
            params![
                &package.name,
                &package.epoch,
                &package.version,
                &package.release,
                &package.arch
            ],
        )?;
        Ok(changed > 0)
    }

    /// Number of stored records
    pub fn count(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM provenance", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Convert a database row to a ProvenanceRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let reason_str: String = row.get(6)?;
        let reason = reason_str.parse::<Reason>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            package: PackageId {
                name: row.get(0)?,
                epoch: row.get(1)?,
                version: row.get(2)?,
                release: row.get(3)?,
                arch: row.get(4)?,
            },
            from_repo: row.get(5)?,
            reason,
            releasever: row.get(7)?,
            checksum_type: row.get(8)?,
            checksum_data: row.get(9)?,
            installed_by: row.get(10)?,
            recorded_at: row.get(11)?,
        })
    }
}
