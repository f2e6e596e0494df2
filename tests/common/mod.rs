#![allow(dead_code)]

use basket_ledger::{
    AccountId, Amount, AssetInfo, FixedTermLedger, FixedTerms, Host, LedgerConfig, LedgerParams,
    OpenTermLedger, Timestamp,
};

/// 2023-11-14 22:13:20 UTC
pub const T0: Timestamp = 1_700_000_000;

pub const POOL: &str = "pool";
pub const ADMIN: &str = "admin";

pub fn id(s: &str) -> AccountId {
    s.to_string()
}

/// Host with one yield vault per id, clock at [`T0`].
pub fn host_with(vaults: &[&str]) -> Host {
    let mut host = Host::new("USDV", T0);
    for v in vaults {
        host.add_yield_vault(v);
    }
    host
}

pub fn basket(weights: &[(&str, u32)]) -> Vec<AssetInfo> {
    weights.iter().map(|(v, w)| AssetInfo::new(*v, *w)).collect()
}

pub fn open_term(host: &Host, config: LedgerConfig, assets: Vec<AssetInfo>) -> OpenTermLedger {
    let mut ledger = OpenTermLedger::new(LedgerParams::new(POOL).unwrap(), ());
    ledger.activate(host, &id(ADMIN), config, assets).unwrap();
    ledger
}

pub fn fixed_term(
    host: &Host,
    lock_days: u64,
    config: LedgerConfig,
    assets: Vec<AssetInfo>,
) -> FixedTermLedger {
    let terms = FixedTerms::new(lock_days).unwrap();
    let mut ledger = FixedTermLedger::new(LedgerParams::new(POOL).unwrap(), terms);
    ledger.activate(host, &id(ADMIN), config, assets).unwrap();
    ledger
}

/// Mints `amount` to `who` and approves the ledger for all of it.
pub fn fund(host: &mut Host, who: &str, amount: Amount) -> AccountId {
    let account = id(who);
    host.mint(&account, amount).unwrap();
    host.token
        .approve(&account, &id(POOL), Amount::MAX)
        .unwrap();
    account
}
