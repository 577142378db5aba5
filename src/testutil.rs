// src/testutil.rs

//! Package fixtures shared by unit tests

use crate::package::{Package, PackageId};
use crate::query::{PackageDatabase, PackageIndex};
use crate::error::Result;
use std::cell::RefCell;

fn id(name: &str, version: &str, release: &str, arch: &str) -> PackageId {
    PackageId::new(name, version, release, arch)
}

/// A small system: pepper and librita installed, a "main" repo offering
/// pepper (binary and source), mrkite, trampoline and hole
pub fn fixture_packages() -> Vec<Package> {
    vec![
        Package::installed(id("pepper", "20", "0", "x86_64")).with_summary("A hot vegetable."),
        Package::installed(id("librita", "1", "1", "x86_64")).with_summary("Rita's library."),
        Package::available(id("pepper", "20", "0", "x86_64"), "main")
            .with_summary("A hot vegetable."),
        Package::available(id("pepper", "20", "0", "src"), "main")
            .with_summary("A hot vegetable."),
        Package::available(id("mrkite", "2", "0", "x86_64"), "main")
            .with_summary("It's an invitation."),
        Package::available(id("trampoline", "2.1", "1", "noarch"), "main")
            .with_summary("Make a reservation."),
        Package::available(id("hole", "1", "1", "x86_64"), "main").with_summary("Dig one."),
        Package::available(id("librita", "1", "1", "x86_64"), "main")
            .with_summary("Rita's library."),
    ]
}

pub fn fixture_index() -> PackageIndex {
    PackageIndex::new(fixture_packages())
}

/// In-memory package database whose contents tests can swap out
pub struct FixtureDatabase {
    pub packages: RefCell<Vec<Package>>,
}

impl FixtureDatabase {
    pub fn new(packages: Vec<Package>) -> Self {
        Self {
            packages: RefCell::new(packages),
        }
    }
}

impl PackageDatabase for FixtureDatabase {
    fn load(&self) -> Result<Vec<Package>> {
        Ok(self.packages.borrow().clone())
    }
}
