//! Certificate-of-deposit ledger: each stake mints a certificate with its own
//! principal, start and maturity date.
//!
//! Interest is never stored per certificate. Every feed posts one point on a
//! global [`AccumulatedRateCurve`], spreading the reconciled delta over the
//! principal accruing on that day; a certificate's interest is its principal
//! times the curve's rise between its start and maturity dates. Accruing
//! principal is kept in start/maturity date buckets, so a feed costs the same
//! regardless of how many certificates are outstanding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::feed::{to_signed, Accrual, AccumulatedRateCurve};
use crate::host::Host;
use crate::ledger::{Book, Claim, Ledger, LedgerEvent, LedgerState, Redemption};
use crate::units::{normalized, AccountId, Amount, SignedAmount, Timestamp, DAY};

pub type FixedTermLedger = Ledger<CertificateBook>;

pub type CertificateId = u64;

/// Immutable terms of a fixed-term ledger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedTerms {
    pub lock_period_days: u64,
}

impl FixedTerms {
    pub fn new(lock_period_days: u64) -> LedgerResult<Self> {
        let terms = Self { lock_period_days };
        terms.validate()?;
        Ok(terms)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.lock_period_days == 0 {
            return Err(LedgerError::InvalidLockPeriod);
        }
        Ok(())
    }

    pub fn lock_period(&self) -> LedgerResult<Timestamp> {
        self.lock_period_days
            .checked_mul(DAY)
            .ok_or(LedgerError::ArithmeticOverflow)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StakeStatus {
    Open,
    Closed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakeInfo {
    pub principal: Amount,
    pub start_date: Timestamp,
    pub maturity_date: Timestamp,
    pub status: StakeStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    pub owner: AccountId,
    pub stake: StakeInfo,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateBook {
    pub lock_period: Timestamp,
    pub total_principal: Amount,
    /// Reconciled interest not yet paid out; negative after net losses.
    pub total_interest: SignedAmount,
    pub curve: AccumulatedRateCurve,
    pub next_id: CertificateId,
    pub certificates: BTreeMap<CertificateId, Certificate>,
    /// Open principal keyed by start date.
    by_start: BTreeMap<Timestamp, Amount>,
    /// Open principal keyed by maturity date.
    by_maturity: BTreeMap<Timestamp, Amount>,
}

impl CertificateBook {
    pub fn certificate(&self, id: CertificateId) -> LedgerResult<&Certificate> {
        self.certificates
            .get(&id)
            .ok_or(LedgerError::UnknownCertificate { id })
    }

    /// Open principal earning interest for the accounting day `at`: started
    /// before it and not yet matured.
    pub fn accruing_principal(&self, at: Timestamp) -> Amount {
        let started: Amount = self.by_start.range(..at).map(|(_, p)| *p).sum();
        let matured: Amount = self.by_maturity.range(..at).map(|(_, p)| *p).sum();
        started.saturating_sub(matured)
    }

    /// Interest reconciled so far for certificate `id`, up to `until` or its
    /// maturity, whichever is earlier.
    pub fn interest_until(
        &self,
        id: CertificateId,
        until: Timestamp,
    ) -> LedgerResult<SignedAmount> {
        let stake = &self.certificate(id)?.stake;
        let to = until.min(stake.maturity_date).max(stake.start_date);
        self.curve.interest(stake.principal, stake.start_date, to)
    }

    pub fn certificates_of<'a>(
        &'a self,
        owner: &'a AccountId,
    ) -> impl Iterator<Item = (CertificateId, &'a Certificate)> + 'a {
        self.certificates
            .iter()
            .filter(move |(_, c)| &c.owner == owner)
            .map(|(id, c)| (*id, c))
    }

    fn open_certificate(
        &mut self,
        owner: &AccountId,
        principal: Amount,
        start: Timestamp,
    ) -> LedgerResult<CertificateId> {
        let maturity = start
            .checked_add(self.lock_period)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let id = self.next_id;
        self.next_id += 1;
        self.total_principal = self
            .total_principal
            .checked_add(principal)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        *self.by_start.entry(start).or_default() += principal;
        *self.by_maturity.entry(maturity).or_default() += principal;
        self.certificates.insert(
            id,
            Certificate {
                owner: owner.clone(),
                stake: StakeInfo {
                    principal,
                    start_date: start,
                    maturity_date: maturity,
                    status: StakeStatus::Open,
                },
            },
        );
        Ok(id)
    }

    /// Marks `id` closed and books its payout. Returns the gross value owed.
    fn close_certificate(&mut self, id: CertificateId) -> LedgerResult<Amount> {
        let stake = self.certificate(id)?.stake.clone();
        let interest = self
            .curve
            .interest(stake.principal, stake.start_date, stake.maturity_date)?;
        let principal = to_signed(stake.principal)?;
        let gross = principal
            .checked_add(interest)
            .ok_or(LedgerError::ArithmeticOverflow)?
            .max(0);

        self.total_principal -= stake.principal;
        self.total_interest -= gross - principal;
        drain_bucket(&mut self.by_start, stake.start_date, stake.principal);
        drain_bucket(&mut self.by_maturity, stake.maturity_date, stake.principal);
        if let Some(cert) = self.certificates.get_mut(&id) {
            cert.stake.status = StakeStatus::Closed;
        }
        Ok(gross as Amount)
    }

    /// Once no principal is open, hands back whatever `total_interest` still
    /// holds: flooring residue and deltas booked with nothing accruing.
    fn sweep_residue(&mut self) -> SignedAmount {
        if self.total_principal != 0 {
            return 0;
        }
        std::mem::take(&mut self.total_interest)
    }
}

fn drain_bucket(bucket: &mut BTreeMap<Timestamp, Amount>, at: Timestamp, principal: Amount) {
    if let Some(left) = bucket.get_mut(&at) {
        *left = left.saturating_sub(principal);
        if *left == 0 {
            bucket.remove(&at);
        }
    }
}

impl Accrual for CertificateBook {
    fn liabilities(&self) -> SignedAmount {
        (self.total_principal as SignedAmount).saturating_add(self.total_interest)
    }

    fn has_liabilities(&self) -> bool {
        self.total_principal > 0
    }

    fn apply(&mut self, delta: SignedAmount, at: Timestamp) -> LedgerResult<()> {
        self.total_interest = self
            .total_interest
            .checked_add(delta)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let accruing = self.accruing_principal(at);
        if accruing == 0 {
            if delta != 0 {
                warn!(at, delta, "no principal accruing, delta booked to totals only");
            }
            return Ok(());
        }
        let rate = AccumulatedRateCurve::rate_for(delta, accruing)?;
        self.curve.post(at, rate)?;
        debug!(at, delta, accruing, rate, "rate posted");
        Ok(())
    }
}

impl Book for CertificateBook {
    const KIND: &'static str = "fixed_term";
    type Terms = FixedTerms;

    fn open(terms: &FixedTerms) -> LedgerResult<Self> {
        terms.validate()?;
        Ok(Self {
            lock_period: terms.lock_period()?,
            total_principal: 0,
            total_interest: 0,
            curve: AccumulatedRateCurve::new(),
            next_id: 1,
            certificates: BTreeMap::new(),
            by_start: BTreeMap::new(),
            by_maturity: BTreeMap::new(),
        })
    }

    fn outstanding(&self) -> Amount {
        self.liabilities().max(0) as Amount
    }
}

impl Ledger<CertificateBook> {
    pub fn stake(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
    ) -> LedgerResult<CertificateId> {
        self.stake_for(host, caller, amount, caller)
    }

    /// Pulls `amount` from `caller` and mints a certificate to `beneficiary`
    /// starting on the current accounting day.
    pub fn stake_for(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        amount: Amount,
        beneficiary: &AccountId,
    ) -> LedgerResult<CertificateId> {
        self.transact(host, |state, host| {
            issue_certificate(state, host, caller, amount, beneficiary)
        })
    }

    /// Redeems a matured certificate for `caller`, who must own it or act for
    /// its owner. Proceeds go to the owner.
    pub fn unstake(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        id: CertificateId,
    ) -> LedgerResult<Redemption> {
        self.transact(host, |state, host| redeem_certificate(state, host, caller, id))
    }

    pub fn certificate(&self, id: CertificateId) -> LedgerResult<Certificate> {
        self.book()?.certificate(id).cloned()
    }

    /// Interest reconciled so far for certificate `id`.
    pub fn interest_of(&self, id: CertificateId) -> LedgerResult<SignedAmount> {
        let last_feed = self.last_feed_time()?;
        self.book()?.interest_until(id, last_feed)
    }

    pub fn certificates_of(&self, owner: &AccountId) -> Vec<CertificateId> {
        self.book()
            .map(|b| b.certificates_of(owner).map(|(id, _)| id).collect())
            .unwrap_or_default()
    }

    pub fn total_principal(&self) -> LedgerResult<Amount> {
        self.book().map(|b| b.total_principal)
    }

    pub fn total_interest(&self) -> LedgerResult<SignedAmount> {
        self.book().map(|b| b.total_interest)
    }
}

fn issue_certificate(
    state: &mut LedgerState<CertificateBook>,
    host: &mut Host,
    caller: &AccountId,
    amount: Amount,
    beneficiary: &AccountId,
) -> LedgerResult<CertificateId> {
    let LedgerState { core, book } = state;
    core.admit_stake(host, caller, beneficiary, amount)?;

    let fee = core.stake_fee(amount)?;
    let principal = amount - fee;
    let principal_after = book
        .total_principal
        .checked_add(principal)
        .ok_or(LedgerError::ArithmeticOverflow)?;
    core.check_stake_bounds(principal_after)?;

    let start = normalized(host.now);
    let id = book.open_certificate(beneficiary, principal, start)?;
    core.total_fee += fee;

    core.pull_and_deposit(host, caller, amount)?;
    core.record(
        host,
        LedgerEvent::Staked {
            payer: caller.clone(),
            beneficiary: beneficiary.clone(),
            amount,
            fee,
            claim: Claim::Certificate { id },
        },
    );
    info!(
        id,
        payer = %caller,
        beneficiary = %beneficiary,
        principal,
        fee,
        start,
        "certificate issued"
    );
    Ok(id)
}

fn redeem_certificate(
    state: &mut LedgerState<CertificateBook>,
    host: &mut Host,
    caller: &AccountId,
    id: CertificateId,
) -> LedgerResult<Redemption> {
    let LedgerState { core, book } = state;
    let cert = book.certificate(id)?.clone();
    core.access.require_owner_or_approved(caller, &cert.owner)?;
    if cert.stake.status == StakeStatus::Closed {
        return Err(LedgerError::CertificateClosed { id });
    }
    let maturity = cert.stake.maturity_date;
    let today = normalized(host.now);
    if today < maturity {
        return Err(LedgerError::NotMatured {
            id,
            maturity,
            today,
        });
    }
    let last_feed = core.feed.last_feed_time();
    if last_feed < maturity {
        return Err(LedgerError::WaitingForMaturityFeed {
            id,
            maturity,
            last_feed,
        });
    }

    let gross = book.close_certificate(id)?;
    core.check_remaining(book.total_principal)?;
    let residue = book.sweep_residue();
    if residue > 0 {
        core.total_fee += residue as Amount;
        info!(id, residue, "unclaimed interest swept to fees");
    } else if residue < 0 {
        warn!(id, residue, "loss left after last certificate written off");
    }
    let fee = core.unstake_fee(gross)?;
    let paid = gross - fee;
    core.total_fee += fee;

    core.withdraw_and_pay(host, &cert.owner, paid)?;
    let claim = Claim::Certificate { id };
    core.record(
        host,
        LedgerEvent::Unstaked {
            caller: caller.clone(),
            owner: cert.owner.clone(),
            gross,
            fee,
            paid,
            claim: claim.clone(),
        },
    );
    info!(
        id,
        owner = %cert.owner,
        principal = cert.stake.principal,
        gross,
        fee,
        paid,
        "certificate redeemed"
    );
    Ok(Redemption {
        claim,
        gross,
        fee,
        paid,
    })
}
