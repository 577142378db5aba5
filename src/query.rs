// src/query.rs

//! Read-only views over the package database
//!
//! The native database is consumed through the `PackageDatabase` trait and
//! snapshotted into a `PackageIndex`. Queries, subjects and selectors all
//! hand out `Arc<Package>` references into that shared index.

use crate::error::{Error, Result};
use crate::match_counter::{MatchCounter, SearchField};
use crate::package::{Package, PackageId};
use glob::Pattern;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Read access to the native package database
pub trait PackageDatabase {
    /// Every known package, installed (`@System`) and available
    fn load(&self) -> Result<Vec<Package>>;
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Snapshot of the package database for one lock lifetime
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: Vec<Arc<Package>>,
}

impl PackageIndex {
    pub fn new(packages: Vec<Package>) -> Self {
        let mut packages: Vec<Arc<Package>> = packages.into_iter().map(Arc::new).collect();
        // installed builds sort ahead of available builds of the same identity
        packages.sort_by(|a, b| {
            a.id.cmp(&b.id)
                .then_with(|| b.installed.cmp(&a.installed))
                .then_with(|| a.repo.cmp(&b.repo))
        });
        Self { packages }
    }

    pub fn load(db: &dyn PackageDatabase) -> Result<Self> {
        let index = Self::new(db.load()?);
        debug!("Loaded package index with {} packages", index.len());
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Query over every package
    pub fn query(&self) -> Query {
        Query {
            packages: self.packages.clone(),
        }
    }

    pub fn is_installed(&self, id: &PackageId) -> bool {
        self.packages.iter().any(|p| p.installed && &p.id == id)
    }

    /// The installed build with this identity
    pub fn installed_package(&self, id: &PackageId) -> Option<&Arc<Package>> {
        self.packages.iter().find(|p| p.installed && &p.id == id)
    }

    /// Scan `field` of every package for `pattern` and record hits in
    /// `counter`
    ///
    /// Patterns containing `*`, `?` or `[` must match the whole field as a
    /// glob; anything else is a case-insensitive substring match.
    pub fn search_counted(
        &self,
        counter: &mut MatchCounter,
        field: SearchField,
        pattern: &str,
    ) -> Result<()> {
        let matcher: Box<dyn Fn(&str) -> bool> = if is_glob(pattern) {
            let glob = Pattern::new(pattern)
                .map_err(|e| Error::ParseError(format!("Invalid glob '{}': {}", pattern, e)))?;
            Box::new(move |hay| glob.matches(hay))
        } else {
            let needle = pattern.to_lowercase();
            Box::new(move |hay| hay.to_lowercase().contains(&needle))
        };

        let mut hits = 0;
        for package in &self.packages {
            if let Some(hay) = field.value(package) {
                if matcher(hay) {
                    counter.add(package, field, hay);
                    hits += 1;
                }
            }
        }

        debug!(?field, pattern, hits, "Search finished");
        Ok(())
    }

    /// Split a query into the installed builds and the available builds
    /// that would be new
    ///
    /// For every (name, arch) with an available build: if that name.arch is
    /// installed, the installed build goes into the first set; otherwise all
    /// available builds of it go into the second.
    pub fn query_matches_installed(
        &self,
        query: &Query,
    ) -> (Vec<Arc<Package>>, Vec<Arc<Package>>) {
        let installed = per_arch(query.clone().installed());
        let available = per_arch(query.clone().available());

        let mut inst = Vec::new();
        let mut avail = Vec::new();
        for (name_arch, builds) in available {
            match installed.get(&name_arch) {
                Some(installed_builds) => inst.push(Arc::clone(&installed_builds[0])),
                None => avail.extend(builds),
            }
        }
        (inst, avail)
    }

    /// Installed packages the selector matches
    pub fn selector_matches_installed(&self, selector: &Selector) -> Vec<Arc<Package>> {
        let matched: HashSet<PackageId> = selector
            .matches(self)
            .into_iter()
            .map(|p| p.id.clone())
            .collect();

        self.query()
            .installed()
            .into_iter()
            .filter(|p| matched.contains(&p.id))
            .collect()
    }
}

fn per_arch(query: Query) -> BTreeMap<(String, String), Vec<Arc<Package>>> {
    let mut map: BTreeMap<(String, String), Vec<Arc<Package>>> = BTreeMap::new();
    for package in query.packages {
        map.entry((package.id.name.clone(), package.id.arch.clone()))
            .or_default()
            .push(package);
    }
    // newest build first
    for builds in map.values_mut() {
        builds.sort_by(|a, b| b.id.evr_cmp(&a.id));
    }
    map
}

/// A filtered set of packages
#[derive(Debug, Clone, Default)]
pub struct Query {
    packages: Vec<Arc<Package>>,
}

impl Query {
    pub fn installed(mut self) -> Self {
        self.packages.retain(|p| p.installed);
        self
    }

    pub fn available(mut self) -> Self {
        self.packages.retain(|p| !p.installed);
        self
    }

    pub fn filter_name(mut self, name: &str) -> Self {
        self.packages.retain(|p| p.name() == name);
        self
    }

    pub fn filter_arch(mut self, arch: &str) -> Self {
        self.packages.retain(|p| p.arch() == arch);
        self
    }

    pub fn filter_pattern(mut self, pattern: &NevraPattern) -> Self {
        self.packages.retain(|p| pattern.matches(p));
        self
    }

    /// Keep only the newest build of every name.arch
    pub fn latest(self) -> Self {
        let packages = per_arch(self)
            .into_values()
            .filter_map(|builds| {
                let newest = builds.first()?.id.clone();
                Some(
                    builds
                        .into_iter()
                        .take_while(move |p| p.id.evr_cmp(&newest).is_eq()),
                )
            })
            .flatten()
            .collect();
        Self { packages }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Package>> {
        self.packages.iter()
    }

    pub fn into_vec(self) -> Vec<Arc<Package>> {
        self.packages
    }
}

impl From<Vec<Arc<Package>>> for Query {
    fn from(packages: Vec<Arc<Package>>) -> Self {
        Self { packages }
    }
}

impl IntoIterator for Query {
    type Item = Arc<Package>;
    type IntoIter = std::vec::IntoIter<Arc<Package>>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.into_iter()
    }
}

/// One way of reading a package spec: name (possibly a glob) plus the
/// optional parts that were split off it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NevraPattern {
    pub name: String,
    pub version: Option<String>,
    pub release: Option<String>,
    pub arch: Option<String>,
}

impl NevraPattern {
    fn name_only(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            release: None,
            arch: None,
        }
    }

    pub fn matches(&self, package: &Package) -> bool {
        let id = &package.id;
        field_matches(&self.name, &id.name)
            && self.version.as_ref().is_none_or(|v| field_matches(v, &id.version))
            && self.release.as_ref().is_none_or(|r| field_matches(r, &id.release))
            && self.arch.as_ref().is_none_or(|a| field_matches(a, &id.arch))
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    if is_glob(pattern) {
        Pattern::new(pattern)
            .map(|p| p.matches(value))
            .unwrap_or(false)
    } else {
        pattern == value
    }
}

/// A package spec as typed by the user
#[derive(Debug, Clone)]
pub struct Subject {
    spec: String,
}

impl Subject {
    pub fn new(spec: &str) -> Self {
        Self {
            spec: spec.trim().to_string(),
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Candidate readings, most literal first: `name`, `name.arch`,
    /// `name-version`, `name-version-release`, `name-version-release.arch`
    pub fn possibilities(&self) -> Vec<NevraPattern> {
        let spec = self.spec.as_str();
        let mut out = vec![NevraPattern::name_only(spec)];

        let split_arch = spec
            .rsplit_once('.')
            .filter(|(_, arch)| !arch.is_empty() && !arch.contains('-'));

        if let Some((name, arch)) = split_arch {
            out.push(NevraPattern {
                arch: Some(arch.to_string()),
                ..NevraPattern::name_only(name)
            });
        }

        if let Some((name, version)) = spec.rsplit_once('-') {
            out.push(NevraPattern {
                version: Some(version.to_string()),
                ..NevraPattern::name_only(name)
            });
        }

        let push_nvr = |out: &mut Vec<NevraPattern>, nvr: &str, arch: Option<&str>| {
            let mut parts = nvr.rsplitn(3, '-');
            if let (Some(release), Some(version), Some(name)) =
                (parts.next(), parts.next(), parts.next())
            {
                out.push(NevraPattern {
                    name: name.to_string(),
                    version: Some(version.to_string()),
                    release: Some(release.to_string()),
                    arch: arch.map(str::to_string),
                });
            }
        };

        push_nvr(&mut out, spec, None);
        if let Some((nvr, arch)) = split_arch {
            push_nvr(&mut out, nvr, Some(arch));
        }

        out
    }

    /// The first reading that matches anything, as a query
    pub fn best_query(&self, index: &PackageIndex) -> Query {
        self.best_pattern(index)
            .map(|pattern| index.query().filter_pattern(&pattern))
            .unwrap_or_default()
    }

    /// The first reading that matches anything, as a selector
    pub fn best_selector(&self, index: &PackageIndex) -> Option<Selector> {
        self.best_pattern(index).map(|pattern| Selector { pattern })
    }

    fn best_pattern(&self, index: &PackageIndex) -> Option<NevraPattern> {
        self.possibilities().into_iter().find(|pattern| {
            let found = !index.query().filter_pattern(pattern).is_empty();
            if found {
                debug!(spec = %self.spec, ?pattern, "Subject resolved");
            }
            found
        })
    }
}

/// A narrow package spec resolving to one best build per architecture
#[derive(Debug, Clone)]
pub struct Selector {
    pattern: NevraPattern,
}

impl Selector {
    pub fn new(pattern: NevraPattern) -> Self {
        Self { pattern }
    }

    pub fn pattern(&self) -> &NevraPattern {
        &self.pattern
    }

    /// Every build the selector admits
    pub fn matches(&self, index: &PackageIndex) -> Vec<Arc<Package>> {
        index.query().filter_pattern(&self.pattern).into_vec()
    }

    /// The newest admitted builds, one EVR per name.arch
    pub fn best(&self, index: &PackageIndex) -> Vec<Arc<Package>> {
        index
            .query()
            .filter_pattern(&self.pattern)
            .latest()
            .into_vec()
    }
}
