// src/transaction.rs

//! Transaction plans: the ordered members produced by resolution
//!
//! A `Transaction` is built by the planner (or by hand for replays) and
//! handed to the external executor. The executor's outcome is written back
//! as member states, which the verifier then reconciles into the
//! provenance store.

use crate::package::{Package, PackageId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What happens to a package in a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Install,
    Erase,
    Upgrade,
    Downgrade,
    Reinstall,
    Obsoleting,
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Install => "install",
            Operation::Erase => "erase",
            Operation::Upgrade => "upgrade",
            Operation::Downgrade => "downgrade",
            Operation::Reinstall => "reinstall",
            Operation::Obsoleting => "obsoleting",
        }
    }

    /// Whether the member's package is present after the transaction
    pub fn installs(&self) -> bool {
        !matches!(self, Operation::Erase)
    }

    /// Whether the member takes the place of previously installed packages
    pub fn replaces(&self) -> bool {
        matches!(
            self,
            Operation::Upgrade | Operation::Downgrade | Operation::Reinstall | Operation::Obsoleting
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a package is (or will be) installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reason {
    /// Explicitly requested by the user
    User,
    /// Pulled in to satisfy another package
    Dependency,
    /// Not classified by the resolver
    #[default]
    Unknown,
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::User => "user",
            Reason::Dependency => "dep",
            Reason::Unknown => "unknown",
        }
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Reason::User),
            "dep" => Ok(Reason::Dependency),
            "unknown" => Ok(Reason::Unknown),
            _ => Err(format!("Invalid install reason: {}", s)),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a member relative to the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Pending,
    Committed,
    Failed,
}

/// A package paired with the operation performed on it
#[derive(Debug, Clone)]
pub struct TransactionMember {
    pub package: Arc<Package>,
    pub operation: Operation,
    pub reason: Reason,
    pub state: MemberState,
    /// Installed packages this member takes the place of
    pub replaces: Vec<Arc<Package>>,
}

impl TransactionMember {
    pub fn new(package: Arc<Package>, operation: Operation) -> Self {
        Self {
            package,
            operation,
            reason: Reason::Unknown,
            state: MemberState::Pending,
            replaces: Vec::new(),
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.package.id
    }
}

/// Ordered batch of members resolved together
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    members: Vec<TransactionMember>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member, keeping the given order
    pub fn add(&mut self, member: TransactionMember) {
        self.members.push(member);
    }

    pub fn add_install(&mut self, package: Arc<Package>) -> &mut TransactionMember {
        self.push(TransactionMember::new(package, Operation::Install))
    }

    pub fn add_erase(&mut self, package: Arc<Package>) -> &mut TransactionMember {
        self.push(TransactionMember::new(package, Operation::Erase))
    }

    pub fn add_upgrade(
        &mut self,
        package: Arc<Package>,
        replaces: Vec<Arc<Package>>,
    ) -> &mut TransactionMember {
        let mut member = TransactionMember::new(package, Operation::Upgrade);
        member.replaces = replaces;
        self.push(member)
    }

    fn push(&mut self, member: TransactionMember) -> &mut TransactionMember {
        self.members.push(member);
        let last = self.members.len() - 1;
        &mut self.members[last]
    }

    pub fn members(&self) -> &[TransactionMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn find(&self, id: &PackageId) -> Option<&TransactionMember> {
        self.members.iter().find(|m| m.id() == id)
    }

    /// Members that leave a package installed
    pub fn installs(&self) -> impl Iterator<Item = &TransactionMember> {
        self.members.iter().filter(|m| m.operation.installs())
    }

    pub fn erasures(&self) -> impl Iterator<Item = &TransactionMember> {
        self.members.iter().filter(|m| !m.operation.installs())
    }

    /// Record the executor outcome: every member is committed except the
    /// ones listed as failed
    pub fn mark_applied(&mut self, failed: &[PackageId]) {
        for member in &mut self.members {
            member.state = if failed.contains(&member.package.id) {
                MemberState::Failed
            } else {
                MemberState::Committed
            };
        }
    }

    pub fn committed(&self) -> impl Iterator<Item = &TransactionMember> {
        self.members
            .iter()
            .filter(|m| m.state == MemberState::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> Arc<Package> {
        Arc::new(Package::available(
            PackageId::new(name, "1.0", "1", "x86_64"),
            "main",
        ))
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(Reason::Dependency.as_str(), "dep");
        assert_eq!("unknown".parse::<Reason>().unwrap(), Reason::Unknown);
        assert!("bogus".parse::<Reason>().is_err());
        assert_eq!(Reason::default(), Reason::Unknown);
    }

    #[test]
    fn test_operation_classes() {
        assert!(Operation::Install.installs());
        assert!(!Operation::Erase.installs());
        assert!(Operation::Upgrade.replaces());
        assert!(!Operation::Install.replaces());
    }

    #[test]
    fn test_members_keep_order_and_defaults() {
        let mut tx = Transaction::new();
        tx.add_install(pkg("b"));
        tx.add_erase(pkg("a"));
        tx.add_install(pkg("c")).reason = Reason::User;

        let names: Vec<_> = tx.members().iter().map(|m| m.package.name()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(tx.members()[0].reason, Reason::Unknown);
        assert_eq!(tx.members()[0].state, MemberState::Pending);
        assert_eq!(tx.installs().count(), 2);
        assert_eq!(tx.erasures().count(), 1);
        assert_eq!(tx.find(&pkg("c").id).unwrap().reason, Reason::User);
    }

    #[test]
    fn test_mark_applied_with_failures() {
        let mut tx = Transaction::new();
        tx.add_install(pkg("a"));
        tx.add_install(pkg("b"));

        tx.mark_applied(&[pkg("b").id.clone()]);

        let committed: Vec<_> = tx.committed().map(|m| m.package.name()).collect();
        assert_eq!(committed, vec!["a"]);
        assert_eq!(tx.members()[1].state, MemberState::Failed);
    }
}
