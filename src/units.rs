//! Fixed-point scales and the daily accounting boundary.

pub type AccountId = String;
pub type VaultId = String;
pub type Amount = u128;
pub type SignedAmount = i128;
pub type Timestamp = u64;

/// Scale for weights and rates: 1_000_000 = 100%.
pub const PRECISION: u128 = 1_000_000;
/// Hard ceiling for stake/unstake fee rates (5%).
pub const MAX_FEE_RATE: u32 = 50_000;
/// Scale of the fixed-term accumulated-rate curve.
pub const RATE_SCALE: i128 = 1_000_000_000_000;

pub const HOUR: Timestamp = 3_600;
pub const DAY: Timestamp = 24 * HOUR;
pub const YEAR: Timestamp = 365 * DAY;

/// Accounting days roll over at 07:00 UTC.
const CUTOVER_SHIFT: Timestamp = 17 * HOUR;
const CUTOVER_OFFSET: Timestamp = 7 * HOUR;

/// Snaps `t` onto the accounting boundary that closes its accounting day.
///
/// `normalized(t) = floor((t + 17h) / 1 day) * 1 day + 7h`, so every instant in
/// `[D 07:00, D+1 07:00)` maps to `D+1 07:00`.
pub fn normalized(t: Timestamp) -> Timestamp {
    (t.saturating_add(CUTOVER_SHIFT) / DAY) * DAY + CUTOVER_OFFSET
}

/// `amount * rate / PRECISION`, rounded down.
pub fn ppm_of(amount: Amount, rate: u32) -> Option<Amount> {
    amount.checked_mul(rate as u128).map(|v| v / PRECISION)
}

/// `a * b / d` rounded up. `None` on overflow or zero divisor.
pub fn mul_div_ceil(a: Amount, b: Amount, d: Amount) -> Option<Amount> {
    if d == 0 {
        return None;
    }
    let product = a.checked_mul(b)?;
    Some(product / d + u128::from(product % d != 0))
}

/// `a * b / d` rounded down. `None` on overflow or zero divisor.
pub fn mul_div(a: Amount, b: Amount, d: Amount) -> Option<Amount> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b).map(|p| p / d)
}
