//! Role grants and the membership gate.
//!
//! Both are checked at the top of every mutating ledger operation, before any
//! state is touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::units::AccountId;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operator,
    Feeder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Feeder => "feeder",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccessControl {
    grants: BTreeMap<Role, BTreeSet<AccountId>>,
    /// owner -> accounts allowed to redeem on the owner's behalf
    approvals: BTreeMap<AccountId, BTreeSet<AccountId>>,
}

impl AccessControl {
    pub fn with_admin(admin: &AccountId) -> Self {
        let mut access = Self::default();
        access.insert(Role::Admin, admin);
        access.insert(Role::Operator, admin);
        access
    }

    pub fn has_role(&self, account: &AccountId, role: Role) -> bool {
        self.grants
            .get(&role)
            .map(|members| members.contains(account))
            .unwrap_or(false)
    }

    pub fn require(&self, account: &AccountId, role: Role) -> Result<(), LedgerError> {
        if self.has_role(account, role) {
            return Ok(());
        }
        Err(LedgerError::MissingRole {
            account: account.clone(),
            role,
        })
    }

    /// Plain feeds are open to feeders and operators.
    pub fn require_feeder(&self, account: &AccountId) -> Result<(), LedgerError> {
        if self.has_role(account, Role::Operator) {
            return Ok(());
        }
        self.require(account, Role::Feeder)
    }

    pub fn grant(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<(), LedgerError> {
        self.require(caller, Role::Admin)?;
        if account.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        self.insert(role, account);
        Ok(())
    }

    pub fn revoke(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> Result<(), LedgerError> {
        self.require(caller, Role::Admin)?;
        if let Some(members) = self.grants.get_mut(&role) {
            members.remove(account);
        }
        Ok(())
    }

    pub fn set_approval(&mut self, owner: &AccountId, operator: &AccountId, approved: bool) {
        let entry = self.approvals.entry(owner.clone()).or_default();
        if approved {
            entry.insert(operator.clone());
        } else {
            entry.remove(operator);
        }
    }

    /// Owner, an approved operator of the owner, or a ledger operator.
    pub fn require_owner_or_approved(
        &self,
        caller: &AccountId,
        owner: &AccountId,
    ) -> Result<(), LedgerError> {
        let approved = self
            .approvals
            .get(owner)
            .map(|ops| ops.contains(caller))
            .unwrap_or(false);
        if caller == owner || approved || self.has_role(caller, Role::Operator) {
            return Ok(());
        }
        Err(LedgerError::NotOwnerOrApproved {
            caller: caller.clone(),
            owner: owner.clone(),
        })
    }

    fn insert(&mut self, role: Role, account: &AccountId) {
        self.grants.entry(role).or_default().insert(account.clone());
    }
}

/// Membership predicate consulted before accepting stakes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MembershipGate {
    /// When set, every account not on the blocklist is a member.
    pub open: bool,
    pub members: BTreeSet<AccountId>,
    pub blocked: BTreeSet<AccountId>,
}

impl MembershipGate {
    pub fn open() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    pub fn allow(&mut self, account: impl Into<AccountId>) {
        self.members.insert(account.into());
    }

    pub fn block(&mut self, account: impl Into<AccountId>) {
        self.blocked.insert(account.into());
    }

    pub fn is_member(&self, account: &AccountId) -> bool {
        if self.blocked.contains(account) {
            return false;
        }
        self.open || self.members.contains(account)
    }

    pub fn require_member(&self, account: &AccountId) -> Result<(), LedgerError> {
        if self.is_member(account) {
            Ok(())
        } else {
            Err(LedgerError::NotMember {
                account: account.clone(),
            })
        }
    }
}
