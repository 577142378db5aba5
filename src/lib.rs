// src/lib.rs

//! pkgtxn: the transaction core of a system package manager
//!
//! Guards mutating operations with a process lock, plans install/erase
//! transactions through an external resolver, and keeps a persistent record
//! of why every package was installed.
//!
//! # Architecture
//!
//! - `lock`: PID-stamped lock file, stale-lock recovery
//! - `query`: read-only package index with NEVRA subject matching
//! - `planner`: intent accumulation and resolution into a `Transaction`
//! - `verify`: reconciles the provenance store after the executor ran
//! - `provenance` / `db`: SQLite-backed per-package install metadata
//! - `base`: the session tying the above to one held lock

pub mod base;
pub mod cache;
pub mod comps;
pub mod config;
pub mod db;
mod error;
pub mod lock;
pub mod match_counter;
pub mod package;
pub mod planner;
pub mod provenance;
pub mod query;
pub mod transaction;
pub mod verify;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
