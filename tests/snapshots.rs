mod common;

use basket_ledger::fixed_term::CertificateBook;
use basket_ledger::ledger::{LedgerState, SCHEMA_VERSION};
use basket_ledger::open_term::SharePool;
use basket_ledger::units::DAY;
use basket_ledger::{
    FixedTermLedger, FixedTerms, LedgerConfig, LedgerError, LedgerParams, LedgerSnapshot,
    OpenTermLedger,
};

use common::*;

#[test]
fn open_term_restores_and_keeps_operating() {
    let mut host = host_with(&["a", "b"]);
    let admin = id(ADMIN);
    let mut pool = open_term(
        &host,
        LedgerConfig::default().with_fees(1_000, 1_000),
        basket(&[("a", 500_000), ("b", 500_000)]),
    );
    let alice = fund(&mut host, "alice", 1_000_000);
    pool.stake(&mut host, &alice, 600_000).unwrap();
    host.advance(DAY);
    host.accrue(&id("a"), 100).unwrap();
    pool.feed(&host, &admin, host.now).unwrap();

    let raw = pool.snapshot().unwrap().to_json().unwrap();
    let snap: LedgerSnapshot<LedgerState<SharePool>> = LedgerSnapshot::from_json(&raw).unwrap();
    assert_eq!(snap.schema_version, SCHEMA_VERSION);
    assert_eq!(snap.kind, "open_term");
    let mut restored =
        OpenTermLedger::restore(LedgerParams::new(POOL).unwrap(), (), snap).unwrap();
    assert_eq!(restored.state().unwrap(), pool.state().unwrap());

    let mut twin = host.clone();
    let a = pool.stake(&mut host, &alice, 10_000).unwrap();
    let b = restored.stake(&mut twin, &alice, 10_000).unwrap();
    assert_eq!(a, b);
    assert_eq!(restored.state().unwrap(), pool.state().unwrap());
}

#[test]
fn fixed_term_snapshot_carries_the_curve() {
    let mut host = host_with(&["a"]);
    let admin = id(ADMIN);
    let mut cd = fixed_term(&host, 3, LedgerConfig::default(), basket(&[("a", 1_000_000)]));
    let alice = fund(&mut host, "alice", 1_000_000);
    let cert = cd.stake(&mut host, &alice, 1_000_000).unwrap();
    host.advance(DAY);
    host.accrue(&id("a"), 300).unwrap();
    cd.feed(&host, &admin, host.now).unwrap();

    let raw = cd.snapshot().unwrap().to_json().unwrap();
    let snap: LedgerSnapshot<LedgerState<CertificateBook>> =
        LedgerSnapshot::from_json(&raw).unwrap();
    let restored = FixedTermLedger::restore(
        LedgerParams::new(POOL).unwrap(),
        FixedTerms::new(3).unwrap(),
        snap,
    )
    .unwrap();
    assert_eq!(restored.interest_of(cert).unwrap(), 300);
    assert_eq!(restored.certificate(cert).unwrap(), cd.certificate(cert).unwrap());
}

#[test]
fn tampered_snapshot_is_refused() {
    let mut host = host_with(&["a"]);
    let mut pool = open_term(&host, LedgerConfig::default(), basket(&[("a", 1_000_000)]));
    let alice = fund(&mut host, "alice", 1_000);
    pool.stake(&mut host, &alice, 1_000).unwrap();

    let mut snap = pool.snapshot().unwrap();
    snap.state.book.total_interest_bearing += 1;
    assert_eq!(
        OpenTermLedger::restore(LedgerParams::new(POOL).unwrap(), (), snap).unwrap_err(),
        LedgerError::StateRootMismatch
    );

    let snap = pool.snapshot().unwrap();
    assert!(matches!(
        OpenTermLedger::restore(LedgerParams::new("elsewhere").unwrap(), (), snap),
        Err(LedgerError::SnapshotKind { .. })
    ));
}

#[test]
fn snapshot_before_activation_fails() {
    let pool = OpenTermLedger::new(LedgerParams::new(POOL).unwrap(), ());
    assert_eq!(pool.snapshot().unwrap_err(), LedgerError::NotActivated);
    assert!(pool.events().is_empty());
}
