use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::units::{Amount, SignedAmount, Timestamp, RATE_SCALE};

/// Date-indexed step function of the accumulated per-unit rate.
///
/// Each feed posts one point; a certificate's interest is its principal times
/// the difference between two samples, so nothing is stored per certificate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccumulatedRateCurve {
    points: BTreeMap<Timestamp, SignedAmount>,
}

impl AccumulatedRateCurve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated rate as of `at`: the latest point at or before it.
    pub fn sample(&self, at: Timestamp) -> SignedAmount {
        self.points
            .range(..=at)
            .next_back()
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Adds `rate` on top of the curve at `at`. Posting twice for the same
    /// date accumulates into a single point.
    pub fn post(&mut self, at: Timestamp, rate: SignedAmount) -> LedgerResult<()> {
        let value = self
            .sample(at)
            .checked_add(rate)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.points.insert(at, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `principal * (curve(to) - curve(from)) / RATE_SCALE`, floored.
    pub fn interest(
        &self,
        principal: Amount,
        from: Timestamp,
        to: Timestamp,
    ) -> LedgerResult<SignedAmount> {
        let spread = self
            .sample(to)
            .checked_sub(self.sample(from))
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let principal =
            SignedAmount::try_from(principal).map_err(|_| LedgerError::ArithmeticOverflow)?;
        principal
            .checked_mul(spread)
            .map(|v| v.div_euclid(RATE_SCALE))
            .ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Per-unit rate of spreading `delta` over `principal`.
    pub fn rate_for(delta: SignedAmount, principal: Amount) -> LedgerResult<SignedAmount> {
        let principal =
            SignedAmount::try_from(principal).map_err(|_| LedgerError::ArithmeticOverflow)?;
        if principal == 0 {
            return Ok(0);
        }
        delta
            .checked_mul(RATE_SCALE)
            .map(|v| v.div_euclid(principal))
            .ok_or(LedgerError::ArithmeticOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::DAY;

    #[test]
    fn samples_are_step_wise() {
        let mut curve = AccumulatedRateCurve::new();
        curve.post(10 * DAY, 5).unwrap();
        curve.post(11 * DAY, 7).unwrap();
        assert_eq!(curve.sample(9 * DAY), 0);
        assert_eq!(curve.sample(10 * DAY), 5);
        assert_eq!(curve.sample(10 * DAY + 1), 5);
        assert_eq!(curve.sample(12 * DAY), 12);
    }

    #[test]
    fn same_day_posts_accumulate() {
        let mut curve = AccumulatedRateCurve::new();
        curve.post(DAY, 3).unwrap();
        curve.post(DAY, 4).unwrap();
        assert_eq!(curve.len(), 1);
        assert_eq!(curve.sample(DAY), 7);
    }

    #[test]
    fn interest_is_principal_times_spread() {
        let mut curve = AccumulatedRateCurve::new();
        // 1% then 0.5%
        curve.post(DAY, RATE_SCALE / 100).unwrap();
        curve.post(2 * DAY, RATE_SCALE / 200).unwrap();
        assert_eq!(curve.interest(10_000, 0, 2 * DAY).unwrap(), 150);
        assert_eq!(curve.interest(10_000, DAY, 2 * DAY).unwrap(), 50);
        curve.post(3 * DAY, -RATE_SCALE / 50).unwrap();
        // losses floor towards negative infinity
        assert_eq!(curve.interest(333, DAY, 3 * DAY).unwrap(), -5);
    }

    #[test]
    fn rate_spreads_delta_over_principal() {
        assert_eq!(
            AccumulatedRateCurve::rate_for(10, 1_000).unwrap(),
            RATE_SCALE / 100
        );
        assert_eq!(AccumulatedRateCurve::rate_for(10, 0).unwrap(), 0);
    }
}
