use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{Amount, MAX_FEE_RATE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} fee rate {rate} exceeds ceiling {max}")]
    FeeRate {
        field: &'static str,
        rate: u32,
        max: u32,
    },
    #[error("dust balance {dust_balance} exceeds max supply {max_supply}")]
    DustAboveMaxSupply { dust_balance: Amount, max_supply: Amount },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Mutable economic parameters of a ledger.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Stake fee in parts-per-million of the staked amount.
    #[serde(default)]
    pub stake_fee_rate: u32,
    /// Unstake fee in parts-per-million of the redeemed amount.
    #[serde(default)]
    pub unstake_fee_rate: u32,
    #[serde(default)]
    pub dust_balance: Amount,
    #[serde(default = "default_max_supply")]
    pub max_supply: Amount,
    /// Annualized ceiling on reconciled interest, in parts-per-million.
    #[serde(default = "default_max_interest_rate")]
    pub max_interest_rate: u32,
    /// Annualized ceiling on reconciled losses, in parts-per-million.
    #[serde(default = "default_max_loss_rate")]
    pub max_loss_rate: u32,
}

fn default_max_supply() -> Amount {
    Amount::MAX
}

fn default_max_interest_rate() -> u32 {
    200_000
}

fn default_max_loss_rate() -> u32 {
    500_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            stake_fee_rate: 0,
            unstake_fee_rate: 0,
            dust_balance: 0,
            max_supply: default_max_supply(),
            max_interest_rate: default_max_interest_rate(),
            max_loss_rate: default_max_loss_rate(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fee_rate("stake", self.stake_fee_rate)?;
        check_fee_rate("unstake", self.unstake_fee_rate)?;
        if self.dust_balance > self.max_supply {
            return Err(ConfigError::DustAboveMaxSupply {
                dust_balance: self.dust_balance,
                max_supply: self.max_supply,
            });
        }
        if self.max_interest_rate == 0 {
            return Err(ConfigError::Zero {
                field: "max_interest_rate",
            });
        }
        Ok(())
    }

    pub fn with_fees(mut self, stake_fee_rate: u32, unstake_fee_rate: u32) -> Self {
        self.stake_fee_rate = stake_fee_rate;
        self.unstake_fee_rate = unstake_fee_rate;
        self
    }
}

pub(crate) fn check_fee_rate(field: &'static str, rate: u32) -> Result<(), ConfigError> {
    if rate > MAX_FEE_RATE {
        return Err(ConfigError::FeeRate {
            field,
            rate,
            max: MAX_FEE_RATE,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_unbounded() {
        let config = LedgerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_supply, Amount::MAX);
    }

    #[test]
    fn fee_ceiling_is_enforced() {
        let config = LedgerConfig::default().with_fees(50_000, 50_001);
        match config.validate().unwrap_err() {
            ConfigError::FeeRate { field, rate, max } => {
                assert_eq!(field, "unstake");
                assert_eq!(rate, 50_001);
                assert_eq!(max, MAX_FEE_RATE);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "stake_fee_rate": 1000, "dust_balance": 5 }"#).unwrap();
        assert_eq!(config.stake_fee_rate, 1_000);
        assert_eq!(config.dust_balance, 5);
        assert_eq!(config.max_interest_rate, 200_000);
        assert_eq!(config.max_supply, Amount::MAX);
    }

    #[test]
    fn dust_cannot_exceed_max_supply() {
        let config = LedgerConfig {
            dust_balance: 10,
            max_supply: 5,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DustAboveMaxSupply { .. })
        ));
    }
}
