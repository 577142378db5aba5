// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for pkgtxn
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed input (comps metadata, checksums, package specs)
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Another live process holds the lock file
    #[error("Lock {} is held by process {pid}", path.display())]
    LockHeld { path: PathBuf, pid: u32 },

    /// A method was called out of sequence
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The resolver could not produce a consistent package set
    #[error("Dependency resolution failed: {0}")]
    Unsatisfiable(String),

    /// Group metadata is disabled or unreadable
    #[error("Groups error: {0}")]
    GroupsError(String),

    /// A package spec matched nothing in the package index
    #[error("No package matches '{0}'")]
    PackageNotFound(String),
}

/// Result type alias using pkgtxn's Error type
pub type Result<T> = std::result::Result<T, Error>;
