use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::units::{AccountId, Amount};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("account {account} holds {balance}, needs {needed}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        needed: Amount,
    },
    #[error("{spender} may spend {allowance} of {owner}, needs {needed}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        allowance: Amount,
        needed: Amount,
    },
    #[error("account {account} may not mint or burn")]
    NotMinter { account: AccountId },
    #[error("token account id must not be empty")]
    ZeroAccount,
    #[error("token supply overflow")]
    Overflow,
}

/// In-memory unit-of-account token.
///
/// Mint and burn are restricted to the minter set, which stands in for the
/// exchange bridge that issues the unit of account.
#[derive(Clone, Debug, Default)]
pub struct TokenBook {
    symbol: String,
    total_supply: Amount,
    balances: BTreeMap<AccountId, Amount>,
    allowances: BTreeMap<AccountId, BTreeMap<AccountId, Amount>>,
    minters: BTreeSet<AccountId>,
}

impl TokenBook {
    pub fn new(symbol: impl Into<String>, minter: impl Into<AccountId>) -> Self {
        let mut minters = BTreeSet::new();
        minters.insert(minter.into());
        Self {
            symbol: symbol.into(),
            minters,
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if owner.is_empty() || spender.is_empty() {
            return Err(TokenError::ZeroAccount);
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if from.is_empty() || to.is_empty() {
            return Err(TokenError::ZeroAccount);
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Moves `amount` out of `owner` on behalf of `spender`, consuming allowance.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        owner: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                allowance,
                needed: amount,
            });
        }
        self.transfer(owner, to, amount)?;
        if allowance != Amount::MAX {
            self.approve(owner, spender, allowance - amount)?;
        }
        Ok(())
    }

    pub fn mint(
        &mut self,
        minter: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.require_minter(minter)?;
        if to.is_empty() {
            return Err(TokenError::ZeroAccount);
        }
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.credit(to, amount)
    }

    pub fn burn(
        &mut self,
        minter: &AccountId,
        from: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.require_minter(minter)?;
        self.debit(from, amount)?;
        self.total_supply -= amount;
        Ok(())
    }

    fn require_minter(&self, account: &AccountId) -> Result<(), TokenError> {
        if self.minters.contains(account) {
            Ok(())
        } else {
            Err(TokenError::NotMinter {
                account: account.clone(),
            })
        }
    }

    fn debit(&mut self, account: &AccountId, amount: Amount) -> Result<(), TokenError> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: account.clone(),
                balance,
                needed: amount,
            });
        }
        self.balances.insert(account.clone(), balance - amount);
        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: Amount) -> Result<(), TokenError> {
        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        self.balances.insert(account.clone(), balance);
        Ok(())
    }
}
