//! Continuous, share-based ledger: stake or unstake any amount at any time,
//! priced at `total_interest_bearing / total_shares`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::feed::{to_signed, Accrual};
use crate::host::Host;
use crate::ledger::{Book, Claim, Ledger, LedgerEvent, LedgerState, Redemption};
use crate::units::{mul_div, AccountId, Amount, SignedAmount, Timestamp};

pub type OpenTermLedger = Ledger<SharePool>;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SharePool {
    pub total_interest_bearing: Amount,
    pub total_shares: Amount,
    pub shares: BTreeMap<AccountId, Amount>,
}

impl SharePool {
    pub fn shares_of(&self, owner: &AccountId) -> Amount {
        self.shares.get(owner).copied().unwrap_or(0)
    }

    /// Current value of `shares`, rounded down.
    pub fn value_of(&self, shares: Amount) -> LedgerResult<Amount> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        if shares == self.total_shares {
            return Ok(self.total_interest_bearing);
        }
        mul_div(shares, self.total_interest_bearing, self.total_shares)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Shares minted for `net` assets; 1:1 for the first stake.
    fn shares_for(&self, net: Amount) -> LedgerResult<Amount> {
        if self.total_shares == 0 {
            return Ok(net);
        }
        if self.total_interest_bearing == 0 {
            return Err(LedgerError::PoolBankrupt);
        }
        mul_div(net, self.total_shares, self.total_interest_bearing)
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Shares worth at most `amount` assets, rounded down and clamped to
    /// what `owner` holds.
    fn shares_to_burn(&self, owner: &AccountId, amount: Amount) -> Amount {
        let owned = self.shares_of(owner);
        mul_div(amount, self.total_shares, self.total_interest_bearing)
            .unwrap_or(Amount::MAX)
            .min(owned)
    }
}

impl Accrual for SharePool {
    fn liabilities(&self) -> SignedAmount {
        self.total_interest_bearing as SignedAmount
    }

    fn has_liabilities(&self) -> bool {
        self.total_shares > 0
    }

    /// Gains and losses move the share price; a loss deeper than the pool is
    /// absorbed at zero.
    fn apply(&mut self, delta: SignedAmount, at: Timestamp) -> LedgerResult<()> {
        let current = to_signed(self.total_interest_bearing)?;
        let next = current
            .checked_add(delta)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if next < 0 {
            warn!(at, delta, shortfall = -next, "loss exceeds pool, absorbed at zero");
        }
        self.total_interest_bearing = next.max(0) as Amount;
        Ok(())
    }
}

impl Book for SharePool {
    const KIND: &'static str = "open_term";
    type Terms = ();

    fn open(_: &()) -> LedgerResult<Self> {
        Ok(Self::default())
    }

    fn outstanding(&self) -> Amount {
        self.total_interest_bearing
    }
}

impl Ledger<SharePool> {
    /// Stakes `amount` from `caller` for `caller`. Returns minted shares.
    pub fn stake(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Amount> {
        self.stake_for(host, caller, amount, caller)
    }

    /// Stakes `amount` pulled from `caller`, minting shares to `beneficiary`.
    pub fn stake_for(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
        beneficiary: &AccountId,
    ) -> LedgerResult<Amount> {
        self.transact(host, |state, host| {
            stake_shares(state, host, caller, amount, beneficiary)
        })
    }

    /// Redeems up to `amount` of `caller`'s position.
    pub fn unstake(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Redemption> {
        self.unstake_from(host, caller, amount, caller)
    }

    /// Redeems up to `amount` of `owner`'s position; requests above the
    /// position are clamped to it. Proceeds go to `owner`.
    pub fn unstake_from(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
        owner: &AccountId,
    ) -> LedgerResult<Redemption> {
        self.transact(host, |state, host| {
            redeem_shares(state, host, caller, amount, owner)
        })
    }

    pub fn shares_of(&self, owner: &AccountId) -> Amount {
        self.book().map(|b| b.shares_of(owner)).unwrap_or(0)
    }

    /// Asset value of `owner`'s shares at the last reconciled price.
    pub fn balance_of(&self, owner: &AccountId) -> LedgerResult<Amount> {
        let book = self.book()?;
        book.value_of(book.shares_of(owner))
    }

    pub fn total_shares(&self) -> LedgerResult<Amount> {
        self.book().map(|b| b.total_shares)
    }

    pub fn total_interest_bearing(&self) -> LedgerResult<Amount> {
        self.book().map(|b| b.total_interest_bearing)
    }
}

fn stake_shares(
    state: &mut LedgerState<SharePool>,
    host: &mut Host,
    caller: &AccountId,
    amount: Amount,
    beneficiary: &AccountId,
) -> LedgerResult<Amount> {
    let LedgerState { core, book } = state;
    core.admit_stake(host, caller, beneficiary, amount)?;

    let fee = core.stake_fee(amount)?;
    let net = amount - fee;
    let minted = book.shares_for(net)?;
    if minted == 0 {
        return Err(LedgerError::ZeroShares);
    }
    let liabilities = book
        .total_interest_bearing
        .checked_add(net)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    core.check_stake_bounds(liabilities)?;

    book.total_interest_bearing = liabilities;
    book.total_shares += minted;
    *book.shares.entry(beneficiary.clone()).or_default() += minted;
    core.total_fee += fee;

    core.pull_and_deposit(host, caller, amount)?;
    core.record(
        host,
        LedgerEvent::Staked {
            payer: caller.clone(),
            beneficiary: beneficiary.clone(),
            amount,
            fee,
            claim: Claim::Shares { amount: minted },
        },
    );
    info!(payer = %caller, beneficiary = %beneficiary, amount, fee, minted, "open-term stake");
    Ok(minted)
}

fn redeem_shares(
    state: &mut LedgerState<SharePool>,
    host: &mut Host,
    caller: &AccountId,
    amount: Amount,
    owner: &AccountId,
) -> LedgerResult<Redemption> {
    let LedgerState { core, book } = state;
    core.access.require_owner_or_approved(caller, owner)?;
    if amount == 0 {
        return Err(LedgerError::ZeroAmount);
    }
    if book.total_interest_bearing == 0 {
        return Err(LedgerError::PoolBankrupt);
    }
    if book.shares_of(owner) == 0 {
        return Err(LedgerError::NoPosition {
            owner: owner.clone(),
        });
    }
    let burned = book.shares_to_burn(owner, amount);
    if burned == 0 {
        return Err(LedgerError::ZeroShares);
    }
    let gross = book.value_of(burned)?;
    let remaining = book.total_interest_bearing - gross;
    core.check_remaining(remaining)?;
    let fee = core.unstake_fee(gross)?;
    let paid = gross - fee;

    book.total_interest_bearing = remaining;
    book.total_shares -= burned;
    if let Some(held) = book.shares.get_mut(owner) {
        *held -= burned;
    }
    core.total_fee += fee;

    core.withdraw_and_pay(host, owner, paid)?;
    let claim = Claim::Shares { amount: burned };
    core.record(
        host,
        LedgerEvent::Unstaked {
            caller: caller.clone(),
            owner: owner.clone(),
            gross,
            fee,
            paid,
            claim: claim.clone(),
        },
    );
    info!(owner = %owner, requested = amount, burned, gross, fee, paid, "open-term unstake");
    Ok(Redemption {
        claim,
        gross,
        fee,
        paid,
    })
}
