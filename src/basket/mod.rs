//! Append-only weighted set of vaults backing a ledger.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::host::Host;
use crate::units::{mul_div, AccountId, Amount, VaultId, PRECISION};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetInfo {
    pub vault: VaultId,
    /// Parts-per-million of the basket.
    pub weight: u32,
}

impl AssetInfo {
    pub fn new(vault: impl Into<VaultId>, weight: u32) -> Self {
        Self {
            vault: vault.into(),
            weight,
        }
    }
}

/// Per-vault slice of an amount moved in or out of the basket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub vault: VaultId,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AssetBasket {
    assets: Vec<AssetInfo>,
}

impl AssetBasket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `info` against the host's vaults and the running weight sum,
    /// then appends it.
    pub fn add(&mut self, host: &Host, info: AssetInfo) -> LedgerResult<()> {
        if info.vault.is_empty() {
            return Err(LedgerError::ZeroVault);
        }
        if info.weight == 0 || info.weight as u128 > PRECISION {
            return Err(LedgerError::InvalidWeight {
                vault: info.vault,
                weight: info.weight,
            });
        }
        if self.assets.iter().any(|a| a.vault == info.vault) {
            return Err(LedgerError::DuplicateVault { vault: info.vault });
        }
        let vault = host.vault(&info.vault)?;
        if vault.asset() != host.asset() {
            return Err(LedgerError::AssetMismatch {
                vault: info.vault.clone(),
                expected: host.asset().to_string(),
                actual: vault.asset().to_string(),
            });
        }
        let total = self.total_weight() + info.weight as u64;
        if total as u128 > PRECISION {
            return Err(LedgerError::WeightOverflow { total });
        }
        debug!(vault = %info.vault, weight = info.weight, total, "basket asset added");
        self.assets.push(info);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AssetInfo> {
        self.assets.get(index)
    }

    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }

    pub fn total_weight(&self) -> u64 {
        self.assets.iter().map(|a| a.weight as u64).sum()
    }

    /// Sum of `holder`'s redeemable claim across every vault.
    pub fn value(&self, host: &Host, holder: &AccountId) -> LedgerResult<Amount> {
        let mut total: Amount = 0;
        for asset in &self.assets {
            let claim = host.claim_value(&asset.vault, holder)?;
            total = total.checked_add(claim).ok_or(LedgerError::ArithmeticOverflow)?;
        }
        Ok(total)
    }

    /// Splits `amount` by weight, normalized over the basket's total weight.
    /// The last vault takes the rounding remainder.
    pub fn split_by_weight(&self, amount: Amount) -> LedgerResult<Vec<Allocation>> {
        let total_weight = self.total_weight() as Amount;
        if total_weight == 0 {
            return Err(LedgerError::EmptyBasket);
        }
        let mut out = Vec::with_capacity(self.assets.len());
        let mut assigned: Amount = 0;
        for (idx, asset) in self.assets.iter().enumerate() {
            let part = if idx + 1 == self.assets.len() {
                amount - assigned
            } else {
                mul_div(amount, asset.weight as Amount, total_weight)
                    .ok_or(LedgerError::ArithmeticOverflow)?
            };
            assigned += part;
            out.push(Allocation {
                vault: asset.vault.clone(),
                amount: part,
            });
        }
        Ok(out)
    }

    /// Splits `amount` by each vault's current claim value held by `holder`.
    /// Rounding remainder goes to the first vaults with claim left over, so
    /// no slice exceeds the claim backing it.
    pub fn split_by_value(
        &self,
        host: &Host,
        holder: &AccountId,
        amount: Amount,
    ) -> LedgerResult<Vec<Allocation>> {
        let mut claims = Vec::with_capacity(self.assets.len());
        for asset in &self.assets {
            claims.push((asset.vault.clone(), host.claim_value(&asset.vault, holder)?));
        }
        let total: Amount = claims.iter().map(|(_, c)| *c).sum();
        if amount == 0 {
            return Ok(Vec::new());
        }
        if amount > total {
            return Err(LedgerError::PoolBankrupt);
        }
        let mut out = Vec::with_capacity(claims.len());
        let mut assigned: Amount = 0;
        for (vault, claim) in &claims {
            let part = mul_div(amount, *claim, total).ok_or(LedgerError::ArithmeticOverflow)?;
            assigned += part;
            out.push(Allocation {
                vault: vault.clone(),
                amount: part,
            });
        }
        let mut remainder = amount - assigned;
        for (alloc, (_, claim)) in out.iter_mut().zip(&claims) {
            if remainder == 0 {
                break;
            }
            let top_up = remainder.min(claim - alloc.amount);
            alloc.amount += top_up;
            remainder -= top_up;
        }
        out.retain(|a| a.amount > 0);
        Ok(out)
    }

    /// Deposits `amount` from `holder`'s token balance into every vault by
    /// weight. A vault crediting less than it received fails the whole call.
    pub fn deposit(&self, host: &mut Host, holder: &AccountId, amount: Amount) -> LedgerResult<()> {
        let slack = VAULT_ROUNDING_SLACK;
        for alloc in self.split_by_weight(amount)? {
            if alloc.amount == 0 {
                continue;
            }
            let before = host.claim_value(&alloc.vault, holder)?;
            host.vault_deposit(&alloc.vault, holder, alloc.amount)?;
            let after = host.claim_value(&alloc.vault, holder)?;
            let credited = after.saturating_sub(before);
            if credited + slack < alloc.amount {
                return Err(LedgerError::DepositShortfall {
                    vault: alloc.vault,
                    expected: alloc.amount,
                    actual: credited,
                });
            }
            debug!(vault = %alloc.vault, amount = alloc.amount, credited, "basket deposit");
        }
        Ok(())
    }

    /// Withdraws `amount` back to `holder`'s token balance, pro-rata to each
    /// vault's current claim. Any vault paying out short fails the whole call.
    pub fn withdraw(
        &self,
        host: &mut Host,
        holder: &AccountId,
        amount: Amount,
    ) -> LedgerResult<()> {
        if amount == 0 {
            return Ok(());
        }
        for alloc in self.split_by_value(host, holder, amount)? {
            if alloc.amount == 0 {
                continue;
            }
            let before = host.token.balance_of(holder);
            host.vault_withdraw(&alloc.vault, holder, alloc.amount)?;
            let received = host.token.balance_of(holder).saturating_sub(before);
            if received < alloc.amount {
                return Err(LedgerError::WithdrawShortfall {
                    vault: alloc.vault,
                    expected: alloc.amount,
                    actual: received,
                });
            }
            debug!(vault = %alloc.vault, amount = alloc.amount, "basket withdraw");
        }
        Ok(())
    }

    /// Rounding allowance for reconciliation, two units per vault.
    pub fn rounding_allowance(&self) -> Amount {
        self.assets.len() as Amount * VAULT_ROUNDING_SLACK
    }
}

/// Units a vault may under-credit a deposit through share rounding.
pub const VAULT_ROUNDING_SLACK: Amount = 2;
