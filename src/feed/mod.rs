//! Reconciliation of accounted liabilities against the priced basket.
//!
//! A feed targets one accounting day. The target is normalized, checked
//! against the last posted day and the host clock, and only then is the basket
//! priced. The difference between basket value (net of fees) and liabilities
//! is bounded by an elapsed-time band before the ledger-specific [`Accrual`]
//! books it.

mod curve;

pub use curve::AccumulatedRateCurve;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::basket::AssetBasket;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::host::Host;
use crate::units::{
    mul_div, normalized, AccountId, Amount, SignedAmount, Timestamp, DAY, PRECISION, YEAR,
};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Plain,
    /// Re-posts the last accounting day; monotonicity and the future bound
    /// still apply.
    Forced,
}

/// Ledger-side view of the liabilities a feed reconciles.
pub trait Accrual {
    /// Liabilities the basket must cover, excluding fees.
    fn liabilities(&self) -> SignedAmount;

    /// Whether anything is outstanding; feeds against an empty ledger are
    /// no-ops.
    fn has_liabilities(&self) -> bool;

    /// Books a bounded delta for the accounting day `at`.
    fn apply(&mut self, delta: SignedAmount, at: Timestamp) -> LedgerResult<()>;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedReport {
    pub at: Timestamp,
    pub basket_value: Amount,
    pub delta: SignedAmount,
    pub elapsed: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedEngine {
    last_feed_time: Timestamp,
}

impl FeedEngine {
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            last_feed_time: normalized(now),
        }
    }

    pub fn last_feed_time(&self) -> Timestamp {
        self.last_feed_time
    }

    /// Normalizes `target` and checks it against the posted history and the
    /// host clock.
    pub fn window(
        &self,
        target: Timestamp,
        now: Timestamp,
        mode: FeedMode,
    ) -> LedgerResult<Timestamp> {
        let at = normalized(target);
        let last = self.last_feed_time;
        if at < last {
            return Err(LedgerError::AncientFeed { target: at, last });
        }
        if at == last && mode == FeedMode::Plain {
            return Err(LedgerError::FeedRequiresForce { target: at });
        }
        let limit = normalized(now);
        if at > limit {
            return Err(LedgerError::FutureFeedNotAllowed { target: at, limit });
        }
        Ok(at)
    }

    /// Runs one reconciliation. `Ok(None)` means there was nothing to
    /// reconcile and no state changed.
    #[allow(clippy::too_many_arguments)]
    pub fn reconcile<A: Accrual>(
        &mut self,
        host: &Host,
        basket: &AssetBasket,
        holder: &AccountId,
        total_fee: Amount,
        config: &LedgerConfig,
        accrual: &mut A,
        target: Timestamp,
        mode: FeedMode,
    ) -> LedgerResult<Option<FeedReport>> {
        let at = self.window(target, host.now, mode)?;
        if !accrual.has_liabilities() {
            info!(at, "feed skipped, nothing outstanding");
            return Ok(None);
        }

        let basket_value = basket.value(host, holder)?;
        let covered = to_signed(basket_value)? - to_signed(total_fee)?;
        let liabilities = accrual.liabilities();
        let delta = covered
            .checked_sub(liabilities)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let elapsed = at - self.last_feed_time;
        let base = liabilities.max(0) as Amount;
        let allowance = basket.rounding_allowance();
        let bound = if delta >= 0 {
            interest_bound(base, config.max_interest_rate, elapsed, allowance)
        } else {
            interest_bound(base, config.max_loss_rate, elapsed, allowance)
        };
        if delta.unsigned_abs() > bound {
            warn!(at, delta, bound, basket_value, "feed rejected, implausible rate");
            return Err(LedgerError::UnbelievableInterestRate { delta, bound });
        }

        accrual.apply(delta, at)?;
        self.last_feed_time = at;
        info!(at, basket_value, delta, elapsed, ?mode, "feed posted");
        Ok(Some(FeedReport {
            at,
            basket_value,
            delta,
            elapsed,
        }))
    }
}

/// Largest plausible |delta| for `liabilities` at an annualized `rate` over
/// `elapsed` seconds (at least one day), plus a fixed rounding allowance.
pub fn interest_bound(
    liabilities: Amount,
    rate: u32,
    elapsed: Timestamp,
    allowance: Amount,
) -> Amount {
    let elapsed = elapsed.max(DAY) as Amount;
    mul_div(liabilities, rate as Amount, PRECISION)
        .and_then(|annual| mul_div(annual, elapsed, YEAR as Amount))
        .unwrap_or(Amount::MAX)
        .saturating_add(allowance)
}

pub(crate) fn to_signed(value: Amount) -> LedgerResult<SignedAmount> {
    SignedAmount::try_from(value).map_err(|_| LedgerError::ArithmeticOverflow)
}
