//! Machinery shared by the open-term and fixed-term ledgers.
//!
//! A [`Ledger`] pairs the common [`LedgerCore`] (config, roles, basket, feed
//! clock, fees, event trail) with a variant-specific [`Book`] that knows how
//! claims are minted and how reconciled deltas are booked. Construction is
//! two-phase: [`Ledger::new`] fixes the immutable fields, [`Ledger::activate`]
//! runs exactly once and creates the mutable state. Every mutating call runs
//! as a unit of work over staged copies of the state and the host.

mod base;
mod snapshot;

pub use base::{Claim, LedgerCore, LedgerEvent, SnapshotMetadata};
pub use snapshot::{LedgerSnapshot, SCHEMA_VERSION};

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::access::Role;
use crate::basket::AssetInfo;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::feed::{Accrual, FeedMode, FeedReport};
use crate::host::{atomically, Host};
use crate::units::{AccountId, Amount, Timestamp};

/// Immutable fields fixed at construction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerParams {
    /// Token account holding the ledger's funds and vault shares.
    pub account: AccountId,
}

impl LedgerParams {
    pub fn new(account: impl Into<AccountId>) -> Result<Self, LedgerError> {
        let account = account.into();
        if account.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        Ok(Self { account })
    }
}

/// Variant-specific claim accounting.
pub trait Book: Accrual + Clone + fmt::Debug + Serialize + DeserializeOwned {
    /// Tag stored in snapshots.
    const KIND: &'static str;

    /// Immutable terms supplied at construction.
    type Terms: Clone + fmt::Debug;

    fn open(terms: &Self::Terms) -> LedgerResult<Self>;

    /// Liabilities the admin bounds are checked against.
    fn outstanding(&self) -> Amount;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState<B> {
    pub core: LedgerCore,
    pub book: B,
}

/// Outcome of a redemption.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redemption {
    pub claim: Claim,
    /// Value redeemed before the unstake fee.
    pub gross: Amount,
    pub fee: Amount,
    /// Tokens sent to the owner.
    pub paid: Amount,
}

#[derive(Clone, Debug)]
pub struct Ledger<B: Book> {
    params: LedgerParams,
    terms: B::Terms,
    state: Option<LedgerState<B>>,
}

impl<B: Book> Ledger<B> {
    pub fn new(params: LedgerParams, terms: B::Terms) -> Self {
        Self {
            params,
            terms,
            state: None,
        }
    }

    pub fn activate(
        &mut self,
        host: &Host,
        admin: &AccountId,
        config: LedgerConfig,
        assets: Vec<AssetInfo>,
    ) -> LedgerResult<()> {
        if self.state.is_some() {
            return Err(LedgerError::AlreadyActivated);
        }
        let core = LedgerCore::activate(host, &self.params, admin, config, assets)?;
        let book = B::open(&self.terms)?;
        self.state = Some(LedgerState { core, book });
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn terms(&self) -> &B::Terms {
        &self.terms
    }

    pub fn account(&self) -> &AccountId {
        &self.params.account
    }

    pub fn state(&self) -> LedgerResult<&LedgerState<B>> {
        self.state.as_ref().ok_or(LedgerError::NotActivated)
    }

    pub fn core(&self) -> LedgerResult<&LedgerCore> {
        self.state().map(|s| &s.core)
    }

    pub fn book(&self) -> LedgerResult<&B> {
        self.state().map(|s| &s.book)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        self.state
            .as_ref()
            .map(|s| s.core.events.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_feed_time(&self) -> LedgerResult<Timestamp> {
        self.core().map(|c| c.feed.last_feed_time())
    }

    pub fn total_fee(&self) -> LedgerResult<Amount> {
        self.core().map(|c| c.total_fee)
    }

    pub fn basket_value(&self, host: &Host) -> LedgerResult<Amount> {
        self.core()?.basket_value(host)
    }

    /// Runs `op` as a unit of work over staged state and host.
    pub(crate) fn transact<R, F>(&mut self, host: &mut Host, op: F) -> LedgerResult<R>
    where
        F: FnOnce(&mut LedgerState<B>, &mut Host) -> LedgerResult<R>,
    {
        let state = self.state.as_mut().ok_or(LedgerError::NotActivated)?;
        atomically(state, host, op)
    }

    /// Unit of work that only reads the host.
    fn update<R, F>(&mut self, host: &Host, op: F) -> LedgerResult<R>
    where
        F: FnOnce(&mut LedgerState<B>, &Host) -> LedgerResult<R>,
    {
        let state = self.state.as_mut().ok_or(LedgerError::NotActivated)?;
        let mut staged = state.clone();
        let out = op(&mut staged, host)?;
        *state = staged;
        Ok(out)
    }

    /// Reconciles the book against the basket for the accounting day of
    /// `target`. Returns `false` when nothing is outstanding.
    pub fn feed(
        &mut self,
        host: &Host,
        caller: &AccountId,
        target: Timestamp,
    ) -> LedgerResult<bool> {
        self.feed_with_mode(host, caller, target, FeedMode::Plain)
            .map(|r| r.is_some())
    }

    /// Operator-only re-post of an already fed accounting day.
    pub fn feed_forced(
        &mut self,
        host: &Host,
        caller: &AccountId,
        target: Timestamp,
    ) -> LedgerResult<bool> {
        self.feed_with_mode(host, caller, target, FeedMode::Forced)
            .map(|r| r.is_some())
    }

    pub fn feed_with_mode(
        &mut self,
        host: &Host,
        caller: &AccountId,
        target: Timestamp,
        mode: FeedMode,
    ) -> LedgerResult<Option<FeedReport>> {
        self.update(host, |state, host| {
            let LedgerState { core, book } = state;
            core.feed(host, caller, book, target, mode)
        })
    }

    pub fn collect_fee(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        to: &AccountId,
    ) -> LedgerResult<Amount> {
        self.transact(host, |state, host| state.core.collect_fee(host, caller, to))
    }

    pub fn set_stake_fee_rate(
        &mut self,
        host: &Host,
        caller: &AccountId,
        rate: u32,
    ) -> LedgerResult<()> {
        self.update(host, |state, host| state.core.set_stake_fee_rate(host, caller, rate))
    }

    pub fn set_unstake_fee_rate(
        &mut self,
        host: &Host,
        caller: &AccountId,
        rate: u32,
    ) -> LedgerResult<()> {
        self.update(host, |state, host| {
            state.core.set_unstake_fee_rate(host, caller, rate)
        })
    }

    pub fn set_dust_balance(
        &mut self,
        host: &Host,
        caller: &AccountId,
        dust_balance: Amount,
    ) -> LedgerResult<()> {
        self.update(host, |state, host| {
            let outstanding = state.book.outstanding();
            state
                .core
                .set_dust_balance(host, caller, dust_balance, outstanding)
        })
    }

    pub fn set_max_supply(
        &mut self,
        host: &Host,
        caller: &AccountId,
        max_supply: Amount,
    ) -> LedgerResult<()> {
        self.update(host, |state, host| {
            let outstanding = state.book.outstanding();
            state
                .core
                .set_max_supply(host, caller, max_supply, outstanding)
        })
    }

    pub fn add_asset(
        &mut self,
        host: &Host,
        caller: &AccountId,
        info: AssetInfo,
    ) -> LedgerResult<()> {
        self.update(host, |state, host| state.core.add_asset(host, caller, info))
    }

    pub fn pause(&mut self, host: &Host, caller: &AccountId) -> LedgerResult<()> {
        self.update(host, |state, host| state.core.pause(host, caller))
    }

    pub fn unpause(&mut self, host: &Host, caller: &AccountId) -> LedgerResult<()> {
        self.update(host, |state, host| state.core.unpause(host, caller))
    }

    pub fn grant_role(
        &mut self,
        host: &Host,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> LedgerResult<()> {
        self.update(host, |state, _| state.core.access.grant(caller, account, role))
    }

    pub fn revoke_role(
        &mut self,
        host: &Host,
        caller: &AccountId,
        account: &AccountId,
        role: Role,
    ) -> LedgerResult<()> {
        self.update(host, |state, _| state.core.access.revoke(caller, account, role))
    }

    /// Lets `operator` redeem on `owner`'s behalf.
    pub fn set_approval(
        &mut self,
        host: &Host,
        owner: &AccountId,
        operator: &AccountId,
        approved: bool,
    ) -> LedgerResult<()> {
        if operator.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        self.update(host, |state, _| {
            state.core.access.set_approval(owner, operator, approved);
            Ok(())
        })
    }

    pub fn snapshot(&self) -> LedgerResult<LedgerSnapshot<LedgerState<B>>> {
        LedgerSnapshot::capture(B::KIND, self.state()?.clone())
    }

    /// Rebuilds an activated ledger from a verified snapshot.
    pub fn restore(
        params: LedgerParams,
        terms: B::Terms,
        snapshot: LedgerSnapshot<LedgerState<B>>,
    ) -> LedgerResult<Self> {
        let state = snapshot.into_state(B::KIND)?;
        if state.core.account != params.account {
            return Err(LedgerError::SnapshotKind {
                expected: params.account,
                found: state.core.account,
            });
        }
        Ok(Self {
            params,
            terms,
            state: Some(state),
        })
    }
}
