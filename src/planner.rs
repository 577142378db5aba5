// src/planner.rs

//! Transaction planning
//!
//! The planner collects install/erase/upgrade intents, hands them to the
//! external resolver, and turns the resolver's answer into a `Transaction`.
//!
//! States: `Empty -> Accumulating -> Resolved -> (Applied | Aborted)`.
//! A failed resolution drops back to `Accumulating` with every intent kept.

use crate::error::{Error, Result};
use crate::package::{Package, PackageId};
use crate::provenance::ProvenanceStore;
use crate::query::{PackageIndex, Query, Subject};
use crate::transaction::{Operation, Reason, Transaction, TransactionMember};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Architectures that are never installed directly
const SOURCE_ARCHES: [&str; 2] = ["src", "nosrc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentAction {
    Install,
    Erase,
    Upgrade,
}

/// One request handed to the resolver
#[derive(Debug, Clone)]
pub struct Intent {
    pub action: IntentAction,
    /// Package spec as typed by the caller
    pub spec: String,
    /// Packages it resolved to in the index
    pub packages: Vec<Arc<Package>>,
}

impl Intent {
    /// Whether a resolved member fulfils this intent
    fn covers(&self, member: &ResolvedMember) -> bool {
        let action_fits = match self.action {
            IntentAction::Install | IntentAction::Upgrade => member.operation.installs(),
            IntentAction::Erase => member.operation == Operation::Erase,
        };
        action_fits
            && self
                .packages
                .iter()
                .any(|p| p.id.name_arch() == member.package.id.name_arch())
    }
}

/// One entry of the resolver's answer, in the resolver's order
#[derive(Debug, Clone)]
pub struct ResolvedMember {
    pub package: Arc<Package>,
    pub operation: Operation,
    /// Classification by the resolver, if it made one
    pub reason: Option<Reason>,
    pub replaces: Vec<Arc<Package>>,
}

impl ResolvedMember {
    pub fn new(package: Arc<Package>, operation: Operation) -> Self {
        Self {
            package,
            operation,
            reason: None,
            replaces: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// The dependency solver, consumed as a black box
#[cfg_attr(test, mockall::automock)]
pub trait Resolver {
    /// Produce an ordered, consistent package set for the intents, or fail
    /// with `Error::Unsatisfiable`
    fn resolve(&mut self, intents: &[Intent]) -> Result<Vec<ResolvedMember>>;

    /// Keep `package` as user-installed so it is never pruned as an orphan
    fn mark_userinstalled(&mut self, package: &Package);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Empty,
    Accumulating,
    Resolved,
    Applied,
    Aborted,
}

pub struct TransactionPlanner<'a> {
    index: Arc<PackageIndex>,
    store: &'a ProvenanceStore,
    clean_requirements_on_remove: bool,
    state: PlannerState,
    intents: Vec<Intent>,
    transaction: Option<Transaction>,
}

impl<'a> TransactionPlanner<'a> {
    pub fn new(
        index: Arc<PackageIndex>,
        store: &'a ProvenanceStore,
        clean_requirements_on_remove: bool,
    ) -> Self {
        Self {
            index,
            store,
            clean_requirements_on_remove,
            state: PlannerState::Empty,
            intents: Vec::new(),
            transaction: None,
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    pub fn into_transaction(self) -> Option<Transaction> {
        self.transaction
    }

    /// Queue installation of the newest available builds matching `spec`
    ///
    /// Builds whose name.arch is already installed are skipped. Returns the
    /// number of packages queued.
    pub fn install(&mut self, spec: &str) -> Result<usize> {
        self.ensure_accumulating("install")?;

        let query = self.lookup(spec)?;
        let (installed, available) = self.index.query_matches_installed(&query);
        for package in &installed {
            info!("Package {} is already installed", package);
        }

        let candidates = Query::from(available)
            .latest()
            .into_iter()
            .filter(|p| !SOURCE_ARCHES.contains(&p.arch()))
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            info!("Nothing to install for '{}'", spec);
            return Ok(0);
        }

        Ok(self.push_intent(IntentAction::Install, spec, candidates))
    }

    /// Queue removal of the installed packages matching `spec`
    pub fn erase(&mut self, spec: &str) -> Result<usize> {
        self.ensure_accumulating("erase")?;

        let installed = self.lookup(spec)?.installed().into_vec();
        if installed.is_empty() {
            return Err(Error::PackageNotFound(spec.to_string()));
        }

        Ok(self.push_intent(IntentAction::Erase, spec, installed))
    }

    /// Queue an upgrade of the installed packages matching `spec`
    pub fn upgrade(&mut self, spec: &str) -> Result<usize> {
        self.ensure_accumulating("upgrade")?;

        let installed = self.lookup(spec)?.installed().into_vec();
        if installed.is_empty() {
            return Err(Error::PackageNotFound(spec.to_string()));
        }

        Ok(self.push_intent(IntentAction::Upgrade, spec, installed))
    }

    /// Tell the resolver which installed packages the user asked for
    ///
    /// Every installed package whose persisted reason is not `dep` is marked;
    /// packages without a record count as user-installed. A no-op when
    /// `clean_requirements_on_remove` is off. Returns the number marked.
    pub fn push_userinstalled(&self, resolver: &mut dyn Resolver) -> Result<usize> {
        if !self.clean_requirements_on_remove {
            debug!("clean_requirements_on_remove disabled, not marking user-installed packages");
            return Ok(0);
        }

        let mut marked = 0;
        for package in self.index.query().installed() {
            if self.store.reason(&package.id)? == Some(Reason::Dependency) {
                continue;
            }
            resolver.mark_userinstalled(&package);
            marked += 1;
        }

        debug!(marked, "Marked user-installed packages");
        Ok(marked)
    }

    /// Resolve the queued intents into a transaction
    ///
    /// The resolver's order and choice of builds are kept as-is. Members the
    /// user asked for get `Reason::User`; everything else keeps the
    /// resolver's classification, or `Reason::Unknown` without one.
    pub fn build_transaction(&mut self, resolver: &mut dyn Resolver) -> Result<&Transaction> {
        if self.state != PlannerState::Accumulating {
            return Err(Error::InvalidState(format!(
                "cannot build a transaction in state {:?}",
                self.state
            )));
        }

        self.push_userinstalled(resolver)?;

        let resolved = resolver.resolve(&self.intents).inspect_err(|e| {
            warn!("Resolution failed, keeping {} intents: {}", self.intents.len(), e);
        })?;

        let mut transaction = Transaction::new();
        for item in resolved {
            let reason = if self.intents.iter().any(|i| i.covers(&item)) {
                Reason::User
            } else {
                item.reason.unwrap_or_default()
            };

            let mut member = TransactionMember::new(item.package, item.operation);
            member.reason = reason;
            member.replaces = item.replaces;
            transaction.add(member);
        }

        info!("Resolved transaction with {} members", transaction.len());
        self.state = PlannerState::Resolved;
        Ok(self.transaction.insert(transaction))
    }

    /// Record the executor's outcome; members not listed as failed are
    /// committed
    pub fn mark_applied(&mut self, failed: &[PackageId]) -> Result<&Transaction> {
        if self.state != PlannerState::Resolved {
            return Err(Error::InvalidState(format!(
                "cannot apply a transaction in state {:?}",
                self.state
            )));
        }

        let transaction = self
            .transaction
            .as_mut()
            .ok_or_else(|| Error::InvalidState("resolved planner has no transaction".to_string()))?;
        transaction.mark_applied(failed);

        self.state = PlannerState::Applied;
        Ok(transaction)
    }

    /// Give up on this planning session
    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            PlannerState::Applied | PlannerState::Aborted => Err(Error::InvalidState(format!(
                "cannot abort in state {:?}",
                self.state
            ))),
            _ => {
                info!("Transaction planning aborted");
                self.state = PlannerState::Aborted;
                Ok(())
            }
        }
    }

    fn ensure_accumulating(&self, op: &str) -> Result<()> {
        match self.state {
            PlannerState::Empty | PlannerState::Accumulating => Ok(()),
            state => Err(Error::InvalidState(format!(
                "cannot {} in state {:?}",
                op, state
            ))),
        }
    }

    fn lookup(&self, spec: &str) -> Result<Query> {
        let query = Subject::new(spec).best_query(&self.index);
        if query.is_empty() {
            return Err(Error::PackageNotFound(spec.to_string()));
        }
        Ok(query)
    }

    fn push_intent(
        &mut self,
        action: IntentAction,
        spec: &str,
        packages: Vec<Arc<Package>>,
    ) -> usize {
        let count = packages.len();
        debug!(?action, spec, count, "Queued intent");
        self.intents.push(Intent {
            action,
            spec: spec.to_string(),
            packages,
        });
        self.state = PlannerState::Accumulating;
        count
    }
}
