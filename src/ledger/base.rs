use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::{AccessControl, Role};
use crate::basket::{AssetBasket, AssetInfo};
use crate::config::{check_fee_rate, ConfigError, LedgerConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::feed::{Accrual, FeedEngine, FeedMode, FeedReport};
use crate::host::Host;
use crate::units::{ppm_of, AccountId, Amount, SignedAmount, Timestamp, VaultId};

use super::LedgerParams;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of committed mutations.
    pub height: u64,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Claim {
    Shares { amount: Amount },
    Certificate { id: u64 },
}

/// Adjacently tagged: internally tagged enums cannot carry `u128` fields
/// through serde_json.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LedgerEvent {
    Activated {
        admin: AccountId,
        last_feed_time: Timestamp,
    },
    Staked {
        payer: AccountId,
        beneficiary: AccountId,
        amount: Amount,
        fee: Amount,
        claim: Claim,
    },
    Unstaked {
        caller: AccountId,
        owner: AccountId,
        gross: Amount,
        fee: Amount,
        paid: Amount,
        claim: Claim,
    },
    Fed {
        at: Timestamp,
        basket_value: Amount,
        delta: SignedAmount,
        forced: bool,
    },
    FeeCollected {
        to: AccountId,
        amount: Amount,
    },
    ConfigUpdated {
        field: String,
        value: Amount,
    },
    VaultAdded {
        vault: VaultId,
        weight: u32,
    },
    Paused {
        by: AccountId,
    },
    Unpaused {
        by: AccountId,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerCore {
    pub meta: SnapshotMetadata,
    pub account: AccountId,
    pub config: LedgerConfig,
    pub access: AccessControl,
    pub basket: AssetBasket,
    pub feed: FeedEngine,
    pub total_fee: Amount,
    pub paused: bool,
    pub events: Vec<LedgerEvent>,
}

impl LedgerCore {
    /// One-time activation: validates config and basket and starts the feed
    /// clock at the host's current accounting day.
    pub fn activate(
        host: &Host,
        params: &LedgerParams,
        admin: &AccountId,
        config: LedgerConfig,
        assets: Vec<AssetInfo>,
    ) -> LedgerResult<Self> {
        if admin.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        config.validate()?;
        let mut basket = AssetBasket::new();
        for info in assets {
            basket.add(host, info)?;
        }
        let feed = FeedEngine::starting_at(host.now);
        let mut core = Self {
            meta: SnapshotMetadata::default(),
            account: params.account.clone(),
            config,
            access: AccessControl::with_admin(admin),
            basket,
            feed,
            total_fee: 0,
            paused: false,
            events: Vec::new(),
        };
        core.record(
            host,
            LedgerEvent::Activated {
                admin: admin.clone(),
                last_feed_time: core.feed.last_feed_time(),
            },
        );
        info!(account = %core.account, admin = %admin, "ledger activated");
        Ok(core)
    }

    pub fn record(&mut self, host: &Host, event: LedgerEvent) {
        self.meta.height += 1;
        self.meta.timestamp = host.now;
        self.events.push(event);
    }

    pub fn require_operator(&self, caller: &AccountId) -> LedgerResult<()> {
        self.access.require(caller, Role::Operator)
    }

    pub fn require_not_paused(&self) -> LedgerResult<()> {
        if self.paused {
            Err(LedgerError::Paused)
        } else {
            Ok(())
        }
    }

    /// Membership, pause and amount checks common to every stake.
    pub fn admit_stake(
        &self,
        host: &Host,
        payer: &AccountId,
        beneficiary: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        if payer.is_empty() || beneficiary.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        host.gate.require_member(payer)?;
        host.gate.require_member(beneficiary)?;
        self.require_not_paused()?;
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if self.basket.is_empty() {
            return Err(LedgerError::EmptyBasket);
        }
        Ok(())
    }

    pub fn stake_fee(&self, amount: Amount) -> LedgerResult<Amount> {
        ppm_of(amount, self.config.stake_fee_rate).ok_or(LedgerError::ArithmeticOverflow)
    }

    pub fn unstake_fee(&self, amount: Amount) -> LedgerResult<Amount> {
        ppm_of(amount, self.config.unstake_fee_rate).ok_or(LedgerError::ArithmeticOverflow)
    }

    /// Cap and dust floor for liabilities after a stake.
    pub fn check_stake_bounds(&self, liabilities: Amount) -> LedgerResult<()> {
        if liabilities > self.config.max_supply {
            return Err(LedgerError::ExceedsMaxSupply {
                liabilities,
                max_supply: self.config.max_supply,
            });
        }
        self.check_dust(liabilities)
    }

    /// Dust floor for liabilities left behind; a full exit is always allowed.
    pub fn check_remaining(&self, liabilities: Amount) -> LedgerResult<()> {
        if liabilities == 0 {
            return Ok(());
        }
        self.check_dust(liabilities)
    }

    fn check_dust(&self, liabilities: Amount) -> LedgerResult<()> {
        if liabilities < self.config.dust_balance {
            return Err(LedgerError::BelowDustBalance {
                liabilities,
                dust_balance: self.config.dust_balance,
            });
        }
        Ok(())
    }

    /// Pulls `amount` from `payer` (against its allowance to the ledger) and
    /// spreads it over the basket.
    pub fn pull_and_deposit(
        &self,
        host: &mut Host,
        payer: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        host.token
            .transfer_from(&self.account, payer, &self.account, amount)?;
        self.basket.deposit(host, &self.account, amount)
    }

    /// Withdraws `amount` from the basket and sends it to `to`.
    pub fn withdraw_and_pay(
        &self,
        host: &mut Host,
        to: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        self.basket.withdraw(host, &self.account, amount)?;
        host.token.transfer(&self.account, to, amount)?;
        Ok(())
    }

    pub fn basket_value(&self, host: &Host) -> LedgerResult<Amount> {
        self.basket.value(host, &self.account)
    }

    /// Role check plus reconciliation. Returns whether anything was posted.
    pub fn feed<A: Accrual>(
        &mut self,
        host: &Host,
        caller: &AccountId,
        accrual: &mut A,
        target: Timestamp,
        mode: FeedMode,
    ) -> LedgerResult<Option<FeedReport>> {
        match mode {
            FeedMode::Plain => self.access.require_feeder(caller)?,
            FeedMode::Forced => self.require_operator(caller)?,
        }
        let report = self.feed.reconcile(
            host,
            &self.basket,
            &self.account,
            self.total_fee,
            &self.config,
            accrual,
            target,
            mode,
        )?;
        if let Some(report) = &report {
            self.record(
                host,
                LedgerEvent::Fed {
                    at: report.at,
                    basket_value: report.basket_value,
                    delta: report.delta,
                    forced: mode == FeedMode::Forced,
                },
            );
        }
        Ok(report)
    }

    /// Sends accumulated fees to `to`, capped by what the basket still holds.
    pub fn collect_fee(
        &mut self,
        host: &mut Host,
        caller: &AccountId,
        to: &AccountId,
    ) -> LedgerResult<Amount> {
        self.require_operator(caller)?;
        if to.is_empty() {
            return Err(LedgerError::ZeroAccount);
        }
        let amount = self.total_fee.min(self.basket_value(host)?);
        self.total_fee -= amount;
        self.withdraw_and_pay(host, to, amount)?;
        self.record(
            host,
            LedgerEvent::FeeCollected {
                to: to.clone(),
                amount,
            },
        );
        info!(to = %to, amount, "fees collected");
        Ok(amount)
    }

    pub fn set_stake_fee_rate(
        &mut self,
        host: &Host,
        caller: &AccountId,
        rate: u32,
    ) -> LedgerResult<()> {
        self.require_operator(caller)?;
        check_fee_rate("stake", rate)?;
        self.config.stake_fee_rate = rate;
        self.config_updated(host, "stake_fee_rate", rate as Amount);
        Ok(())
    }

    pub fn set_unstake_fee_rate(
        &mut self,
        host: &Host,
        caller: &AccountId,
        rate: u32,
    ) -> LedgerResult<()> {
        self.require_operator(caller)?;
        check_fee_rate("unstake", rate)?;
        self.config.unstake_fee_rate = rate;
        self.config_updated(host, "unstake_fee_rate", rate as Amount);
        Ok(())
    }

    pub fn set_dust_balance(
        &mut self,
        host: &Host,
        caller: &AccountId,
        dust_balance: Amount,
        liabilities: Amount,
    ) -> LedgerResult<()> {
        self.require_operator(caller)?;
        if dust_balance > self.config.max_supply {
            return Err(ConfigError::DustAboveMaxSupply {
                dust_balance,
                max_supply: self.config.max_supply,
            }
            .into());
        }
        if liabilities > 0 && dust_balance > liabilities {
            return Err(LedgerError::DustAboveLiabilities {
                dust_balance,
                liabilities,
            });
        }
        self.config.dust_balance = dust_balance;
        self.config_updated(host, "dust_balance", dust_balance);
        Ok(())
    }

    pub fn set_max_supply(
        &mut self,
        host: &Host,
        caller: &AccountId,
        max_supply: Amount,
        liabilities: Amount,
    ) -> LedgerResult<()> {
        self.require_operator(caller)?;
        if max_supply < liabilities {
            return Err(LedgerError::MaxSupplyBelowLiabilities {
                max_supply,
                liabilities,
            });
        }
        if max_supply < self.config.dust_balance {
            return Err(ConfigError::DustAboveMaxSupply {
                dust_balance: self.config.dust_balance,
                max_supply,
            }
            .into());
        }
        self.config.max_supply = max_supply;
        self.config_updated(host, "max_supply", max_supply);
        Ok(())
    }

    pub fn add_asset(
        &mut self,
        host: &Host,
        caller: &AccountId,
        info: AssetInfo,
    ) -> LedgerResult<()> {
        self.require_operator(caller)?;
        let event = LedgerEvent::VaultAdded {
            vault: info.vault.clone(),
            weight: info.weight,
        };
        self.basket.add(host, info)?;
        self.record(host, event);
        Ok(())
    }

    pub fn pause(&mut self, host: &Host, caller: &AccountId) -> LedgerResult<()> {
        self.require_operator(caller)?;
        self.paused = true;
        self.record(host, LedgerEvent::Paused { by: caller.clone() });
        info!(by = %caller, "staking paused");
        Ok(())
    }

    pub fn unpause(&mut self, host: &Host, caller: &AccountId) -> LedgerResult<()> {
        self.require_operator(caller)?;
        self.paused = false;
        self.record(host, LedgerEvent::Unpaused { by: caller.clone() });
        info!(by = %caller, "staking resumed");
        Ok(())
    }

    fn config_updated(&mut self, host: &Host, field: &str, value: Amount) {
        info!(field, value, "config updated");
        self.record(
            host,
            LedgerEvent::ConfigUpdated {
                field: field.to_string(),
                value,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activated() -> (Host, LedgerCore, AccountId) {
        let mut host = Host::new("USDV", 1_700_000_000);
        host.add_yield_vault("a");
        let admin: AccountId = "admin".into();
        let params = LedgerParams::new("ledger").unwrap();
        let core = LedgerCore::activate(
            &host,
            &params,
            &admin,
            LedgerConfig::default(),
            vec![AssetInfo::new("a", 1_000_000)],
        )
        .unwrap();
        (host, core, admin)
    }

    #[test]
    fn activation_records_event_and_height() {
        let (_, core, admin) = activated();
        assert_eq!(core.meta.height, 1);
        assert!(matches!(
            &core.events[0],
            LedgerEvent::Activated { admin: a, .. } if a == &admin
        ));
        assert!(core.access.has_role(&admin, Role::Operator));
    }

    #[test]
    fn fee_updates_respect_ceiling_and_role() {
        let (host, mut core, admin) = activated();
        core.set_stake_fee_rate(&host, &admin, 50_000).unwrap();
        assert!(matches!(
            core.set_unstake_fee_rate(&host, &admin, 50_001),
            Err(LedgerError::Config(ConfigError::FeeRate { rate: 50_001, .. }))
        ));
        assert!(matches!(
            core.set_stake_fee_rate(&host, &"bob".into(), 1),
            Err(LedgerError::MissingRole { .. })
        ));
        assert_eq!(core.config.stake_fee_rate, 50_000);
    }

    #[test]
    fn supply_bounds_follow_liabilities() {
        let (host, mut core, admin) = activated();
        assert_eq!(
            core.set_max_supply(&host, &admin, 99, 100).unwrap_err(),
            LedgerError::MaxSupplyBelowLiabilities {
                max_supply: 99,
                liabilities: 100
            }
        );
        core.set_max_supply(&host, &admin, 1_000, 100).unwrap();
        assert_eq!(
            core.set_dust_balance(&host, &admin, 101, 100).unwrap_err(),
            LedgerError::DustAboveLiabilities {
                dust_balance: 101,
                liabilities: 100
            }
        );
        // with nothing outstanding only the cap limits the floor
        core.set_dust_balance(&host, &admin, 500, 0).unwrap();
        assert!(core.set_dust_balance(&host, &admin, 1_001, 0).is_err());
        assert_eq!(
            core.check_stake_bounds(1_001).unwrap_err(),
            LedgerError::ExceedsMaxSupply {
                liabilities: 1_001,
                max_supply: 1_000
            }
        );
        assert_eq!(
            core.check_stake_bounds(499).unwrap_err(),
            LedgerError::BelowDustBalance {
                liabilities: 499,
                dust_balance: 500
            }
        );
        core.check_remaining(0).unwrap();
    }

    #[test]
    fn pause_blocks_admission() {
        let (host, mut core, admin) = activated();
        core.pause(&host, &admin).unwrap();
        assert_eq!(
            core.admit_stake(&host, &"alice".into(), &"alice".into(), 1)
                .unwrap_err(),
            LedgerError::Paused
        );
        core.unpause(&host, &admin).unwrap();
        core.admit_stake(&host, &"alice".into(), &"alice".into(), 1)
            .unwrap();
    }
}
