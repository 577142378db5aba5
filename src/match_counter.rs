// src/match_counter.rs

//! Relevance accounting for package searches

use crate::package::{Package, PackageId};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

/// Package field a search scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchField {
    Name,
    Summary,
    Description,
    Url,
}

impl SearchField {
    /// Relevance added by one match in this field
    pub fn weight(&self) -> u32 {
        match self {
            SearchField::Name => 7,
            SearchField::Summary => 4,
            SearchField::Description => 2,
            SearchField::Url => 1,
        }
    }

    /// The field's text for a package, if it has one
    pub fn value<'a>(&self, package: &'a Package) -> Option<&'a str> {
        match self {
            SearchField::Name => Some(package.name()),
            SearchField::Summary => Some(package.summary.as_str()),
            SearchField::Description => package.description.as_deref(),
            SearchField::Url => package.url.as_deref(),
        }
        .filter(|s| !s.is_empty())
    }
}

impl FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(SearchField::Name),
            "summary" => Ok(SearchField::Summary),
            "description" => Ok(SearchField::Description),
            "url" => Ok(SearchField::Url),
            _ => Err(format!("Invalid search field: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
struct CounterEntry {
    package: Arc<Package>,
    matches: BTreeSet<(SearchField, String)>,
}

/// Packages matched by one or more searches, each with the text that
/// matched and the accumulated relevance
///
/// Entries are unique by package identity and iterate in identity order, so
/// results do not depend on the order the matches were added in.
#[derive(Debug, Clone, Default)]
pub struct MatchCounter {
    entries: BTreeMap<PackageId, CounterEntry>,
}

impl MatchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `haystack`, the value of `field`, matched for `package`
    pub fn add(&mut self, package: &Arc<Package>, field: SearchField, haystack: &str) {
        self.entries
            .entry(package.id.clone())
            .or_insert_with(|| CounterEntry {
                package: Arc::clone(package),
                matches: BTreeSet::new(),
            })
            .matches
            .insert((field, haystack.to_string()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &PackageId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.entries.values().map(|e| &e.package)
    }

    /// Texts that matched for a package
    pub fn matched_haystacks(&self, id: &PackageId) -> Vec<&str> {
        self.entries
            .get(id)
            .map(|e| e.matches.iter().map(|(_, h)| h.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn matched_fields(&self, id: &PackageId) -> BTreeSet<SearchField> {
        self.entries
            .get(id)
            .map(|e| e.matches.iter().map(|(f, _)| *f).collect())
            .unwrap_or_default()
    }

    pub fn score(&self, id: &PackageId) -> u32 {
        self.entries
            .get(id)
            .map(|e| e.matches.iter().map(|(f, _)| f.weight()).sum())
            .unwrap_or(0)
    }

    /// Packages by descending score, ties broken by identity
    pub fn sorted(&self) -> Vec<&Arc<Package>> {
        let mut packages: Vec<_> = self.packages().collect();
        packages.sort_by(|a, b| {
            self.score(&b.id)
                .cmp(&self.score(&a.id))
                .then_with(|| a.id.cmp(&b.id))
        });
        packages
    }
}
