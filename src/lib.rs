//! Basket-backed, interest-accruing custodial ledgers.
//!
//! Depositors lock a unit-of-account token and receive a claim backed by a
//! weighted basket of external yield vaults:
//!
//! * [`open_term`]: fungible shares, redeemable for any amount at any time.
//! * [`fixed_term`]: certificates with a lock period, redeemable at maturity
//!   once the maturity day has been reconciled.
//!
//! Both variants share the same machinery:
//!
//! * [`basket`]: append-only weighted vault set with pro-rata deposit and
//!   withdrawal.
//! * [`feed`]: time-windowed reconciliation of liabilities against the priced
//!   basket, plus the accumulated-rate curve used by certificates.
//! * [`ledger`]: two-phase construction, transactional updates, admin surface,
//!   event trail and versioned snapshots.
//!
//! The [`host`] module models the collaborators the ledgers run against (clock,
//! token, vaults, membership gate) so the engine can be exercised end to end.

pub mod access;
pub mod basket;
pub mod config;
pub mod error;
pub mod feed;
pub mod fixed_term;
pub mod host;
pub mod ledger;
pub mod open_term;
pub mod scenario;
pub mod units;

pub use access::{AccessControl, MembershipGate, Role};
pub use basket::{AssetBasket, AssetInfo};
pub use config::{ConfigError, LedgerConfig};
pub use error::{LedgerError, LedgerResult};
pub use feed::{AccumulatedRateCurve, FeedMode, FeedReport};
pub use fixed_term::{CertificateId, FixedTermLedger, FixedTerms};
pub use host::{Host, TokenBook, Vault, YieldVault};
pub use ledger::{Ledger, LedgerEvent, LedgerParams, LedgerSnapshot, Redemption};
pub use open_term::OpenTermLedger;
pub use units::{normalized, AccountId, Amount, SignedAmount, Timestamp, VaultId};
