mod common;

use basket_ledger::host::{TokenBook, VaultError};
use basket_ledger::units::DAY;
use basket_ledger::{AccountId, Amount, LedgerConfig, LedgerError, Vault, VaultId, YieldVault};

use common::*;

/// Vault that diverts part of every transfer to a side account.
#[derive(Clone, Debug)]
struct SkimmingVault {
    inner: YieldVault,
    on_deposit: Amount,
    on_withdraw: Amount,
}

const SINK: &str = "sink";

impl Vault for SkimmingVault {
    fn id(&self) -> &VaultId {
        self.inner.id()
    }

    fn asset(&self) -> &str {
        self.inner.asset()
    }

    fn deposit(
        &mut self,
        token: &mut TokenBook,
        caller: &AccountId,
        assets: Amount,
        receiver: &AccountId,
    ) -> Result<Amount, VaultError> {
        let skim = self.on_deposit.min(assets - 1);
        token.transfer(caller, &id(SINK), skim)?;
        self.inner.deposit(token, caller, assets - skim, receiver)
    }

    fn withdraw(
        &mut self,
        token: &mut TokenBook,
        assets: Amount,
        receiver: &AccountId,
        owner: &AccountId,
    ) -> Result<Amount, VaultError> {
        let burned = self.inner.withdraw(token, assets, receiver, owner)?;
        let skim = self.on_withdraw.min(assets);
        token.transfer(receiver, &id(SINK), skim)?;
        Ok(burned)
    }

    fn convert_to_assets(&self, token: &TokenBook, shares: Amount) -> Amount {
        self.inner.convert_to_assets(token, shares)
    }

    fn balance_of(&self, owner: &AccountId) -> Amount {
        self.inner.balance_of(owner)
    }

    fn clone_box(&self) -> Box<dyn Vault> {
        Box::new(self.clone())
    }
}

fn skimming(id: &str, on_deposit: Amount, on_withdraw: Amount) -> Box<dyn Vault> {
    Box::new(SkimmingVault {
        inner: YieldVault::new(id, "USDV"),
        on_deposit,
        on_withdraw,
    })
}

#[test]
fn deposit_shortfall_reverts_the_whole_stake() {
    let mut host = host_with(&["a"]);
    host.attach_vault(skimming("bad", 10, 0));
    let mut pool = open_term(
        &host,
        LedgerConfig::default(),
        basket(&[("a", 500_000), ("bad", 500_000)]),
    );
    let alice = fund(&mut host, "alice", 1_000);
    let untouched = host.clone();

    assert_eq!(
        pool.stake(&mut host, &alice, 1_000).unwrap_err(),
        LedgerError::DepositShortfall {
            vault: id("bad"),
            expected: 500,
            actual: 490
        }
    );
    assert_eq!(host.token.balance_of(&alice), 1_000);
    assert_eq!(host.token.balance_of(&id(SINK)), 0);
    assert_eq!(
        host.claim_value(&id("a"), &id(POOL)).unwrap(),
        untouched.claim_value(&id("a"), &id(POOL)).unwrap()
    );
    assert_eq!(pool.total_interest_bearing().unwrap(), 0);
    assert_eq!(pool.core().unwrap().meta.height, 1);
}

#[test]
fn rounding_sized_skim_is_tolerated() {
    let mut host = host_with(&["a"]);
    host.attach_vault(skimming("lossy", 2, 0));
    let mut pool = open_term(
        &host,
        LedgerConfig::default(),
        basket(&[("a", 500_000), ("lossy", 500_000)]),
    );
    let alice = fund(&mut host, "alice", 1_000);
    pool.stake(&mut host, &alice, 1_000).unwrap();
    assert_eq!(pool.basket_value(&host).unwrap(), 998);
}

#[test]
fn withdraw_shortfall_reverts_the_whole_unstake() {
    let mut host = host_with(&["a"]);
    host.attach_vault(skimming("bad", 0, 7));
    let mut pool = open_term(
        &host,
        LedgerConfig::default(),
        basket(&[("a", 500_000), ("bad", 500_000)]),
    );
    let alice = fund(&mut host, "alice", 1_000);
    pool.stake(&mut host, &alice, 1_000).unwrap();
    let shares = pool.shares_of(&alice);

    assert_eq!(
        pool.unstake(&mut host, &alice, 400).unwrap_err(),
        LedgerError::WithdrawShortfall {
            vault: id("bad"),
            expected: 200,
            actual: 193
        }
    );
    assert_eq!(pool.shares_of(&alice), shares);
    assert_eq!(host.token.balance_of(&alice), 0);
    assert_eq!(pool.basket_value(&host).unwrap(), 1_000);
}

#[test]
fn certificate_redemption_reverts_on_withdraw_shortfall() {
    let mut host = host_with(&[]);
    host.attach_vault(skimming("bad", 0, 1));
    let mut cd = fixed_term(&host, 1, LedgerConfig::default(), basket(&[("bad", 1_000_000)]));
    let alice = fund(&mut host, "alice", 1_000);
    let cert = cd.stake(&mut host, &alice, 1_000).unwrap();
    host.advance(DAY);
    cd.feed(&host, &id(ADMIN), host.now).unwrap();

    assert!(matches!(
        cd.unstake(&mut host, &alice, cert),
        Err(LedgerError::WithdrawShortfall { .. })
    ));
    assert!(cd.certificate(cert).is_ok());
    assert_eq!(cd.total_principal().unwrap(), 1_000);
}

#[test]
fn vault_over_a_different_asset_is_refused() {
    let mut host = host_with(&["a"]);
    host.attach_vault(Box::new(YieldVault::new("eur", "EURV")));
    let mut pool = open_term(&host, LedgerConfig::default(), basket(&[("a", 500_000)]));
    assert!(matches!(
        pool.add_asset(&host, &id(ADMIN), basket(&[("eur", 100_000)]).remove(0)),
        Err(LedgerError::AssetMismatch { .. })
    ));
    assert!(matches!(
        pool.add_asset(&host, &id(ADMIN), basket(&[("missing", 100_000)]).remove(0)),
        Err(LedgerError::UnknownVault { .. })
    ));
}
