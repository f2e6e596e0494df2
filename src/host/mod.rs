//! Execution environment the ledgers run against: clock, unit-of-account
//! token, attached vaults and the membership gate.

mod token;
mod vault;

use std::collections::BTreeMap;

pub use token::{TokenBook, TokenError};
pub use vault::{Vault, VaultError, YieldVault};

use crate::access::MembershipGate;
use crate::error::{LedgerError, LedgerResult};
use crate::units::{AccountId, Amount, Timestamp, VaultId};

pub const DEFAULT_BRIDGE: &str = "bridge";

#[derive(Clone, Debug)]
pub struct Host {
    pub now: Timestamp,
    pub token: TokenBook,
    pub gate: MembershipGate,
    vaults: BTreeMap<VaultId, Box<dyn Vault>>,
    bridge: AccountId,
}

impl Host {
    /// Open-gated host whose token is minted by [`DEFAULT_BRIDGE`].
    pub fn new(asset: &str, now: Timestamp) -> Self {
        Self {
            now,
            token: TokenBook::new(asset, DEFAULT_BRIDGE),
            gate: MembershipGate::open(),
            vaults: BTreeMap::new(),
            bridge: DEFAULT_BRIDGE.to_string(),
        }
    }

    pub fn asset(&self) -> &str {
        self.token.symbol()
    }

    pub fn advance(&mut self, seconds: Timestamp) {
        self.now = self.now.saturating_add(seconds);
    }

    pub fn attach_vault(&mut self, vault: Box<dyn Vault>) -> VaultId {
        let id = vault.id().clone();
        self.vaults.insert(id.clone(), vault);
        id
    }

    /// Attaches a fresh [`YieldVault`] over this host's asset.
    pub fn add_yield_vault(&mut self, id: &str) -> VaultId {
        let asset = self.asset().to_string();
        self.attach_vault(Box::new(YieldVault::new(id, asset)))
    }

    pub fn vault(&self, id: &VaultId) -> LedgerResult<&dyn Vault> {
        self.vaults
            .get(id)
            .map(|v| v.as_ref())
            .ok_or_else(|| LedgerError::UnknownVault { vault: id.clone() })
    }

    /// Assets `holder` could redeem from `vault` at the vault's current rate.
    pub fn claim_value(&self, vault: &VaultId, holder: &AccountId) -> LedgerResult<Amount> {
        let v = self.vault(vault)?;
        Ok(v.convert_to_assets(&self.token, v.balance_of(holder)))
    }

    pub fn vault_deposit(
        &mut self,
        vault: &VaultId,
        caller: &AccountId,
        assets: Amount,
    ) -> LedgerResult<Amount> {
        let Host { vaults, token, .. } = self;
        let v = vaults
            .get_mut(vault)
            .ok_or_else(|| LedgerError::UnknownVault { vault: vault.clone() })?;
        Ok(v.deposit(token, caller, assets, caller)?)
    }

    pub fn vault_withdraw(
        &mut self,
        vault: &VaultId,
        owner: &AccountId,
        assets: Amount,
    ) -> LedgerResult<Amount> {
        let Host { vaults, token, .. } = self;
        let v = vaults
            .get_mut(vault)
            .ok_or_else(|| LedgerError::UnknownVault { vault: vault.clone() })?;
        Ok(v.withdraw(token, assets, owner, owner)?)
    }

    /// Issues unit-of-account tokens through the bridge.
    pub fn mint(&mut self, to: &AccountId, amount: Amount) -> LedgerResult<()> {
        let bridge = self.bridge.clone();
        Ok(self.token.mint(&bridge, to, amount)?)
    }

    /// Simulates yield by growing the vault's assets.
    pub fn accrue(&mut self, vault: &VaultId, amount: Amount) -> LedgerResult<()> {
        self.vault(vault)?;
        self.mint(vault, amount)
    }

    /// Simulates a loss by shrinking the vault's assets.
    pub fn slash(&mut self, vault: &VaultId, amount: Amount) -> LedgerResult<()> {
        self.vault(vault)?;
        let bridge = self.bridge.clone();
        Ok(self.token.burn(&bridge, vault, amount)?)
    }
}

/// Runs `op` against staged copies of `state` and `host`, committing both only
/// when it succeeds.
pub(crate) fn atomically<S, R, F>(state: &mut S, host: &mut Host, op: F) -> LedgerResult<R>
where
    S: Clone,
    F: FnOnce(&mut S, &mut Host) -> LedgerResult<R>,
{
    let mut staged_state = state.clone();
    let mut staged_host = host.clone();
    let out = op(&mut staged_state, &mut staged_host)?;
    *state = staged_state;
    *host = staged_host;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_unit_of_work_leaves_host_untouched() {
        let mut host = Host::new("USDV", 0);
        let vault = host.add_yield_vault("vault-a");
        host.mint(&"ledger".into(), 100).unwrap();
        let mut counter = 0u32;
        let err = atomically(&mut counter, &mut host, |counter, host| {
            *counter += 1;
            host.vault_deposit(&vault, &"ledger".into(), 60)?;
            host.vault_deposit(&vault, &"ledger".into(), 60)?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, LedgerError::Vault(_)));
        assert_eq!(counter, 0);
        assert_eq!(host.token.balance_of(&"ledger".into()), 100);
        assert_eq!(host.claim_value(&vault, &"ledger".into()).unwrap(), 0);
    }

    #[test]
    fn accrue_and_slash_move_claim_value() {
        let mut host = Host::new("USDV", 0);
        let vault = host.add_yield_vault("vault-a");
        let ledger: AccountId = "ledger".into();
        host.mint(&ledger, 1_000).unwrap();
        host.vault_deposit(&vault, &ledger, 1_000).unwrap();
        host.accrue(&vault, 50).unwrap();
        assert_eq!(host.claim_value(&vault, &ledger).unwrap(), 1_050);
        host.slash(&vault, 150).unwrap();
        assert_eq!(host.claim_value(&vault, &ledger).unwrap(), 900);
        assert!(matches!(
            host.accrue(&"missing".into(), 1),
            Err(LedgerError::UnknownVault { .. })
        ));
    }
}
