use thiserror::Error;

use crate::access::Role;
use crate::config::ConfigError;
use crate::host::{TokenError, VaultError};
use crate::units::{AccountId, Amount, SignedAmount, Timestamp, VaultId};

/// Every distinct rejection a ledger operation can produce.
///
/// Variants are parameterized so callers can branch on the condition and
/// report the offending values without parsing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // access control
    #[error("ledger has not been activated")]
    NotActivated,
    #[error("ledger is already activated")]
    AlreadyActivated,
    #[error("account {account} lacks role {role}")]
    MissingRole { account: AccountId, role: Role },
    #[error("account {account} is not a member")]
    NotMember { account: AccountId },
    #[error("{caller} may not act for {owner}")]
    NotOwnerOrApproved { caller: AccountId, owner: AccountId },
    #[error("staking is paused")]
    Paused,

    // parameter validation
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("account id must not be empty")]
    ZeroAccount,
    #[error("vault id must not be empty")]
    ZeroVault,
    #[error("vault {vault} has invalid weight {weight}")]
    InvalidWeight { vault: VaultId, weight: u32 },
    #[error("basket weights would sum to {total}, above 1000000")]
    WeightOverflow { total: u64 },
    #[error("vault {vault} holds {actual}, ledger accounts in {expected}")]
    AssetMismatch {
        vault: VaultId,
        expected: String,
        actual: String,
    },
    #[error("vault {vault} is already in the basket")]
    DuplicateVault { vault: VaultId },
    #[error("vault {vault} is not attached to the host")]
    UnknownVault { vault: VaultId },
    #[error("basket is empty")]
    EmptyBasket,
    #[error("lock period must be at least one day")]
    InvalidLockPeriod,
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    // feed time window
    #[error("feed time {target} is older than last feed {last}")]
    AncientFeed { target: Timestamp, last: Timestamp },
    #[error("feed time {target} was already posted, force required")]
    FeedRequiresForce { target: Timestamp },
    #[error("feed time {target} is past the current accounting day {limit}")]
    FutureFeedNotAllowed { target: Timestamp, limit: Timestamp },

    // external dependencies
    #[error("vault {vault} deposit shortfall: expected {expected}, got {actual}")]
    DepositShortfall {
        vault: VaultId,
        expected: Amount,
        actual: Amount,
    },
    #[error("vault {vault} withdraw shortfall: expected {expected}, got {actual}")]
    WithdrawShortfall {
        vault: VaultId,
        expected: Amount,
        actual: Amount,
    },
    #[error("vault failure: {0}")]
    Vault(#[from] VaultError),
    #[error("token failure: {0}")]
    Token(#[from] TokenError),

    // economic guards
    #[error("liabilities {liabilities} would exceed max supply {max_supply}")]
    ExceedsMaxSupply { liabilities: Amount, max_supply: Amount },
    #[error("liabilities {liabilities} would fall below dust balance {dust_balance}")]
    BelowDustBalance {
        liabilities: Amount,
        dust_balance: Amount,
    },
    #[error("pool is bankrupt")]
    PoolBankrupt,
    #[error("unbelievable interest: delta {delta} outside bound {bound}")]
    UnbelievableInterestRate { delta: SignedAmount, bound: Amount },
    #[error("amount too small for a whole share")]
    ZeroShares,
    #[error("{owner} holds no position")]
    NoPosition { owner: AccountId },
    #[error("max supply {max_supply} is below outstanding liabilities {liabilities}")]
    MaxSupplyBelowLiabilities { max_supply: Amount, liabilities: Amount },
    #[error("dust balance {dust_balance} is above outstanding liabilities {liabilities}")]
    DustAboveLiabilities {
        dust_balance: Amount,
        liabilities: Amount,
    },

    // certificates
    #[error("certificate {id} does not exist")]
    UnknownCertificate { id: u64 },
    #[error("certificate {id} is already closed")]
    CertificateClosed { id: u64 },
    #[error("certificate {id} matures at {maturity}, today is {today}")]
    NotMatured {
        id: u64,
        maturity: Timestamp,
        today: Timestamp,
    },
    #[error("certificate {id} waits for the {maturity} feed, last feed {last_feed}")]
    WaitingForMaturityFeed {
        id: u64,
        maturity: Timestamp,
        last_feed: Timestamp,
    },

    // storage
    #[error("snapshot schema {found} is not supported (expected {expected})")]
    UnsupportedSchema { found: u16, expected: u16 },
    #[error("snapshot holds a {found} ledger, expected {expected}")]
    SnapshotKind { expected: String, found: String },
    #[error("snapshot state root does not match its contents")]
    StateRootMismatch,
    #[error("snapshot encoding failed: {0}")]
    Encoding(String),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
