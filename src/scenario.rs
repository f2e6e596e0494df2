//! JSON scenario replay: builds an in-memory host and a ledger, applies a
//! list of actions and reports the outcome of each step plus the final
//! snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::basket::AssetInfo;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::fixed_term::{CertificateBook, CertificateId, FixedTermLedger, FixedTerms};
use crate::host::Host;
use crate::ledger::{LedgerParams, LedgerSnapshot, LedgerState, Redemption};
use crate::open_term::{OpenTermLedger, SharePool};
use crate::units::{AccountId, Amount, Timestamp, VaultId, DAY};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed scenario: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("setup failed: {0}")]
    Setup(#[from] LedgerError),
    #[error("step {index} ({action}) failed: {source}")]
    Step {
        index: usize,
        action: String,
        source: LedgerError,
    },
    #[error("step {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    OpenTerm,
    FixedTerm,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Advance {
        #[serde(default)]
        seconds: Timestamp,
        #[serde(default)]
        days: Timestamp,
    },
    Stake {
        account: AccountId,
        amount: Amount,
        #[serde(default)]
        beneficiary: Option<AccountId>,
    },
    /// Open-term ledgers take `amount`, fixed-term ledgers `certificate`.
    Unstake {
        account: AccountId,
        #[serde(default)]
        amount: Option<Amount>,
        #[serde(default)]
        certificate: Option<CertificateId>,
        #[serde(default)]
        owner: Option<AccountId>,
    },
    Feed {
        caller: AccountId,
        /// Defaults to the host clock.
        #[serde(default)]
        at: Option<Timestamp>,
        #[serde(default)]
        forced: bool,
    },
    Accrue {
        vault: VaultId,
        amount: Amount,
    },
    Slash {
        vault: VaultId,
        amount: Amount,
    },
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::Advance { .. } => "advance",
            Action::Stake { .. } => "stake",
            Action::Unstake { .. } => "unstake",
            Action::Feed { .. } => "feed",
            Action::Accrue { .. } => "accrue",
            Action::Slash { .. } => "slash",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scenario {
    pub kind: LedgerKind,
    #[serde(default = "default_asset")]
    pub asset: String,
    pub start: Timestamp,
    #[serde(default = "default_ledger")]
    pub ledger: AccountId,
    #[serde(default = "default_admin")]
    pub admin: AccountId,
    #[serde(default)]
    pub lock_period_days: Option<u64>,
    #[serde(default)]
    pub config: LedgerConfig,
    pub vaults: Vec<AssetInfo>,
    /// Starting token balances, each pre-approved to the ledger.
    #[serde(default)]
    pub accounts: BTreeMap<AccountId, Amount>,
    #[serde(default)]
    pub blocked: Vec<AccountId>,
    /// Abort on the first failing step instead of recording it.
    #[serde(default)]
    pub strict: bool,
    pub actions: Vec<Action>,
}

fn default_asset() -> String {
    "USDV".to_string()
}

fn default_ledger() -> AccountId {
    "ledger".to_string()
}

fn default_admin() -> AccountId {
    "admin".to_string()
}

impl Scenario {
    pub fn from_json(raw: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub action: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SnapshotRecord {
    OpenTerm(LedgerSnapshot<LedgerState<SharePool>>),
    FixedTerm(LedgerSnapshot<LedgerState<CertificateBook>>),
}

impl SnapshotRecord {
    pub fn kind(&self) -> &str {
        match self {
            SnapshotRecord::OpenTerm(s) => &s.kind,
            SnapshotRecord::FixedTerm(s) => &s.kind,
        }
    }

    pub fn state_root(&self) -> &str {
        match self {
            SnapshotRecord::OpenTerm(s) => &s.state_root,
            SnapshotRecord::FixedTerm(s) => &s.state_root,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ScenarioReport {
    pub kind: LedgerKind,
    pub now: Timestamp,
    pub basket_value: Amount,
    pub balances: BTreeMap<AccountId, Amount>,
    pub steps: Vec<StepOutcome>,
    pub snapshot: SnapshotRecord,
}

impl ScenarioReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

enum Subject {
    Open(OpenTermLedger),
    Fixed(FixedTermLedger),
}

impl Subject {
    fn build(scenario: &Scenario, host: &Host) -> Result<Self, ScenarioError> {
        let params = LedgerParams::new(scenario.ledger.clone())?;
        let config = scenario.config.clone();
        let assets = scenario.vaults.clone();
        Ok(match scenario.kind {
            LedgerKind::OpenTerm => {
                let mut ledger = OpenTermLedger::new(params, ());
                ledger.activate(host, &scenario.admin, config, assets)?;
                Subject::Open(ledger)
            }
            LedgerKind::FixedTerm => {
                let days = scenario.lock_period_days.unwrap_or(0);
                let mut ledger = FixedTermLedger::new(params, FixedTerms::new(days)?);
                ledger.activate(host, &scenario.admin, config, assets)?;
                Subject::Fixed(ledger)
            }
        })
    }

    fn basket_value(&self, host: &Host) -> Result<Amount, LedgerError> {
        match self {
            Subject::Open(l) => l.basket_value(host),
            Subject::Fixed(l) => l.basket_value(host),
        }
    }

    fn snapshot(&self) -> Result<SnapshotRecord, LedgerError> {
        Ok(match self {
            Subject::Open(l) => SnapshotRecord::OpenTerm(l.snapshot()?),
            Subject::Fixed(l) => SnapshotRecord::FixedTerm(l.snapshot()?),
        })
    }
}

/// Replays `scenario` from a fresh host.
pub fn run(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let mut host = Host::new(&scenario.asset, scenario.start);
    for info in &scenario.vaults {
        host.add_yield_vault(&info.vault);
    }
    for account in &scenario.blocked {
        host.gate.block(account.clone());
    }
    for (account, amount) in &scenario.accounts {
        host.mint(account, *amount)?;
        host.token
            .approve(account, &scenario.ledger, Amount::MAX)
            .map_err(LedgerError::from)?;
    }
    let mut subject = Subject::build(scenario, &host)?;

    let mut steps = Vec::with_capacity(scenario.actions.len());
    for (index, action) in scenario.actions.iter().enumerate() {
        let label = action.label();
        let result = apply(&mut subject, &mut host, action)
            .map_err(|reason| match reason {
                StepFailure::Ledger(source) => (source.to_string(), Some(source)),
                StepFailure::Invalid(reason) => (reason, None),
            });
        match result {
            Ok(detail) => {
                info!(index, action = label, %detail, "step applied");
                steps.push(StepOutcome {
                    index,
                    action: label.to_string(),
                    ok: true,
                    detail,
                });
            }
            Err((detail, source)) => {
                warn!(index, action = label, %detail, "step failed");
                if scenario.strict {
                    return Err(match source {
                        Some(source) => ScenarioError::Step {
                            index,
                            action: label.to_string(),
                            source,
                        },
                        None => ScenarioError::Invalid {
                            index,
                            reason: detail,
                        },
                    });
                }
                steps.push(StepOutcome {
                    index,
                    action: label.to_string(),
                    ok: false,
                    detail,
                });
            }
        }
    }

    let mut balances = BTreeMap::new();
    for account in scenario.accounts.keys() {
        balances.insert(account.clone(), host.token.balance_of(account));
    }
    Ok(ScenarioReport {
        kind: scenario.kind,
        now: host.now,
        basket_value: subject.basket_value(&host)?,
        balances,
        steps,
        snapshot: subject.snapshot()?,
    })
}

enum StepFailure {
    Ledger(LedgerError),
    Invalid(String),
}

impl From<LedgerError> for StepFailure {
    fn from(err: LedgerError) -> Self {
        StepFailure::Ledger(err)
    }
}

fn apply(subject: &mut Subject, host: &mut Host, action: &Action) -> Result<String, StepFailure> {
    match action {
        Action::Advance { seconds, days } => {
            host.advance(days.saturating_mul(DAY).saturating_add(*seconds));
            Ok(format!("now {}", host.now))
        }
        Action::Accrue { vault, amount } => {
            host.accrue(vault, *amount)?;
            Ok(format!("{vault} +{amount}"))
        }
        Action::Slash { vault, amount } => {
            host.slash(vault, *amount)?;
            Ok(format!("{vault} -{amount}"))
        }
        Action::Feed { caller, at, forced } => {
            let target = at.unwrap_or(host.now);
            let posted = match subject {
                Subject::Open(l) if *forced => l.feed_forced(host, caller, target)?,
                Subject::Open(l) => l.feed(host, caller, target)?,
                Subject::Fixed(l) if *forced => l.feed_forced(host, caller, target)?,
                Subject::Fixed(l) => l.feed(host, caller, target)?,
            };
            Ok(if posted {
                format!("posted for {target}")
            } else {
                "nothing outstanding".to_string()
            })
        }
        Action::Stake {
            account,
            amount,
            beneficiary,
        } => {
            let beneficiary = beneficiary.as_ref().unwrap_or(account);
            match subject {
                Subject::Open(l) => {
                    let shares = l.stake_for(host, account, *amount, beneficiary)?;
                    Ok(format!("{shares} shares to {beneficiary}"))
                }
                Subject::Fixed(l) => {
                    let id = l.stake_for(host, account, *amount, beneficiary)?;
                    Ok(format!("certificate {id} to {beneficiary}"))
                }
            }
        }
        Action::Unstake {
            account,
            amount,
            certificate,
            owner,
        } => {
            let redemption = match (subject, amount, certificate) {
                (Subject::Open(l), Some(amount), None) => {
                    let owner = owner.as_ref().unwrap_or(account);
                    l.unstake_from(host, account, *amount, owner)?
                }
                (Subject::Fixed(l), None, Some(id)) => l.unstake(host, account, *id)?,
                (Subject::Open(_), ..) => {
                    return Err(StepFailure::Invalid(
                        "open-term unstake takes `amount` only".to_string(),
                    ))
                }
                (Subject::Fixed(_), ..) => {
                    return Err(StepFailure::Invalid(
                        "fixed-term unstake takes `certificate` only".to_string(),
                    ))
                }
            };
            Ok(describe(&redemption))
        }
    }
}

fn describe(r: &Redemption) -> String {
    format!("gross {} fee {} paid {}", r.gross, r.fee, r.paid)
}
