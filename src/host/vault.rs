use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::token::{TokenBook, TokenError};
use crate::units::{mul_div, mul_div_ceil, AccountId, Amount, VaultId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("vault {vault} would mint zero shares for {assets}")]
    ZeroShares { vault: VaultId, assets: Amount },
    #[error("vault {vault}: {owner} holds {shares} shares, needs {needed}")]
    InsufficientShares {
        vault: VaultId,
        owner: AccountId,
        shares: Amount,
        needed: Amount,
    },
    #[error("vault {vault} overflow")]
    Overflow { vault: VaultId },
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Tokenized yield vault over the unit-of-account token.
///
/// The vault's own token account is its id; deposits pull tokens from the
/// caller and withdrawals push tokens to the receiver.
pub trait Vault: fmt::Debug {
    fn id(&self) -> &VaultId;

    /// Symbol of the underlying asset.
    fn asset(&self) -> &str;

    fn deposit(
        &mut self,
        token: &mut TokenBook,
        caller: &AccountId,
        assets: Amount,
        receiver: &AccountId,
    ) -> Result<Amount, VaultError>;

    fn withdraw(
        &mut self,
        token: &mut TokenBook,
        assets: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> Result<Amount, VaultError>;

    fn convert_to_assets(&self, token: &TokenBook, shares: Amount) -> Amount;

    fn balance_of(&self, owner: &AccountId) -> Amount;

    fn clone_box(&self) -> Box<dyn Vault>;
}

impl Clone for Box<dyn Vault> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Share-priced vault whose total assets are its token balance.
///
/// Yield and losses are simulated by minting to or burning from the vault's
/// token account.
#[derive(Clone, Debug)]
pub struct YieldVault {
    id: VaultId,
    asset: String,
    total_shares: Amount,
    shares: BTreeMap<AccountId, Amount>,
}

impl YieldVault {
    pub fn new(id: impl Into<VaultId>, asset: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asset: asset.into(),
            total_shares: 0,
            shares: BTreeMap::new(),
        }
    }

    pub fn total_shares(&self) -> Amount {
        self.total_shares
    }

    pub fn total_assets(&self, token: &TokenBook) -> Amount {
        token.balance_of(&self.id)
    }

    fn overflow(&self) -> VaultError {
        VaultError::Overflow {
            vault: self.id.clone(),
        }
    }
}

impl Vault for YieldVault {
    fn id(&self) -> &VaultId {
        &self.id
    }

    fn asset(&self) -> &str {
        &self.asset
    }

    fn deposit(
        &mut self,
        token: &mut TokenBook,
        caller: &AccountId,
        assets: Amount,
        receiver: &AccountId,
    ) -> Result<Amount, VaultError> {
        let total_assets = self.total_assets(token);
        let minted = if self.total_shares == 0 || total_assets == 0 {
            assets
        } else {
            mul_div(assets, self.total_shares, total_assets).ok_or_else(|| self.overflow())?
        };
        if minted == 0 {
            return Err(VaultError::ZeroShares {
                vault: self.id.clone(),
                assets,
            });
        }
        token.transfer(caller, &self.id, assets)?;
        *self.shares.entry(receiver.clone()).or_default() += minted;
        self.total_shares += minted;
        Ok(minted)
    }

    fn withdraw(
        &mut self,
        token: &mut TokenBook,
        assets: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> Result<Amount, VaultError> {
        let total_assets = self.total_assets(token);
        let burned =
            mul_div_ceil(assets, self.total_shares, total_assets).ok_or_else(|| self.overflow())?;
        let held = self.balance_of(owner);
        if burned > held {
            return Err(VaultError::InsufficientShares {
                vault: self.id.clone(),
                owner: owner.clone(),
                shares: held,
                needed: burned,
            });
        }
        token.transfer(&self.id, receiver, assets)?;
        self.shares.insert(owner.clone(), held - burned);
        self.total_shares -= burned;
        Ok(burned)
    }

    fn convert_to_assets(&self, token: &TokenBook, shares: Amount) -> Amount {
        if self.total_shares == 0 {
            return shares;
        }
        mul_div(shares, self.total_assets(token), self.total_shares).unwrap_or(Amount::MAX)
    }

    fn balance_of(&self, owner: &AccountId) -> Amount {
        self.shares.get(owner).copied().unwrap_or(0)
    }

    fn clone_box(&self) -> Box<dyn Vault> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TokenBook, YieldVault) {
        let mut token = TokenBook::new("USDV", "bridge");
        token
            .mint(&"bridge".into(), &"ledger".into(), 10_000)
            .unwrap();
        (token, YieldVault::new("vault-a", "USDV"))
    }

    #[test]
    fn shares_track_exchange_rate() {
        let (mut token, mut vault) = setup();
        let ledger: AccountId = "ledger".into();
        assert_eq!(vault.deposit(&mut token, &ledger, 1_000, &ledger).unwrap(), 1_000);
        // 10% yield lands in the vault's token account
        token.mint(&"bridge".into(), &"vault-a".into(), 100).unwrap();
        assert_eq!(vault.convert_to_assets(&token, 1_000), 1_100);
        // new deposits mint fewer shares at the higher price
        assert_eq!(vault.deposit(&mut token, &ledger, 1_100, &ledger).unwrap(), 1_000);
        assert_eq!(vault.balance_of(&ledger), 2_000);
    }

    #[test]
    fn withdraw_rounds_shares_up() {
        let (mut token, mut vault) = setup();
        let ledger: AccountId = "ledger".into();
        vault.deposit(&mut token, &ledger, 3_000, &ledger).unwrap();
        token.mint(&"bridge".into(), &"vault-a".into(), 1).unwrap();
        let burned = vault.withdraw(&mut token, 1_000, &ledger, &ledger).unwrap();
        assert_eq!(burned, 1_000);
        assert_eq!(token.balance_of(&ledger), 8_000);
    }

    #[test]
    fn withdraw_beyond_shares_fails() {
        let (mut token, mut vault) = setup();
        let ledger: AccountId = "ledger".into();
        vault.deposit(&mut token, &ledger, 500, &ledger).unwrap();
        let err = vault
            .withdraw(&mut token, 501, &ledger, &ledger)
            .unwrap_err();
        assert!(matches!(err, VaultError::InsufficientShares { shares: 500, .. }));
    }
}
