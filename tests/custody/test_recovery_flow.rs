//! Recovery flow tests: bounded search plus persistence semantics

use super::mocks::{test_config, MockDerivationPort, MockRootPort, MockValidatorCrypto, TEST_MNEMONIC};
use fabstir_staking_node::{
    CredentialError, CredentialManager, HostWalletStatus, MnemonicKeySource, NodeConfig,
};
use std::sync::Arc;
use tempfile::TempDir;

fn open_manager(config: NodeConfig, host_source: Option<MnemonicKeySource>) -> CredentialManager {
    CredentialManager::open(
        config,
        Arc::new(MockDerivationPort),
        Arc::new(MockValidatorCrypto),
        Arc::new(MockRootPort),
        host_source,
    )
    .unwrap()
}

#[tokio::test]
async fn test_recover_wallet_finds_index_and_persists() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(test_config(dir.path()), None);

    let source = MnemonicKeySource::new(TEST_MNEMONIC);
    let target = source.address_at(5).unwrap();

    let recovered = manager.recover_wallet(TEST_MNEMONIC, target).await.unwrap();
    assert_eq!(recovered.index, 5);
    assert_eq!(recovered.derivation_path, "m/44'/60'/0'/0/5");

    // The mapping is re-established durably: index floor past the recovered
    // index, host address on record
    assert_eq!(manager.next_account_index().await, 6);
    assert!(dir.path().join("host-address.txt").exists());
}

#[tokio::test]
async fn test_test_recover_wallet_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(test_config(dir.path()), None);

    let source = MnemonicKeySource::new(TEST_MNEMONIC);
    let target = source.address_at(5).unwrap();

    let recovered = manager.test_recover_wallet(TEST_MNEMONIC, target).unwrap();
    assert_eq!(recovered.index, 5);

    // Dry run: no ledger movement, no address record, no keystore files
    assert_eq!(manager.next_account_index().await, 0);
    assert!(!dir.path().join("host-address.txt").exists());
    assert!(manager.stored_public_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_budget_exhaustion() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.recovery_search_budget = 3;
    let manager = open_manager(config, None);

    let source = MnemonicKeySource::new(TEST_MNEMONIC);
    let target = source.address_at(5).unwrap();

    let result = manager.test_recover_wallet(TEST_MNEMONIC, target);
    assert!(matches!(
        result,
        Err(CredentialError::Exhausted {
            attempted: 3,
            budget: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn test_recovered_wallet_reports_ready_status() {
    let dir = TempDir::new().unwrap();
    let source = MnemonicKeySource::new(TEST_MNEMONIC);
    let target = source.address_at(0).unwrap();

    let manager = open_manager(
        test_config(dir.path()),
        Some(MnemonicKeySource::new(TEST_MNEMONIC)),
    );
    // First status check records the derived address and reports ready
    assert_eq!(
        manager.host_wallet_status().unwrap(),
        HostWalletStatus::Ready { address: target }
    );

    // A different mnemonic now disagrees with the recorded address:
    // read-only, not an error
    let other = open_manager(
        test_config(dir.path()),
        Some(MnemonicKeySource::new(
            "legal winner thank year wave sausage worth useful legal winner thank yellow",
        )),
    );
    match other.host_wallet_status().unwrap() {
        HostWalletStatus::ReadOnly { stored, .. } => assert_eq!(stored, target),
        status => panic!("expected read-only status, got {:?}", status),
    }
}

#[tokio::test]
async fn test_no_mnemonic_reports_locked() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(test_config(dir.path()), None);
    assert_eq!(
        manager.host_wallet_status().unwrap(),
        HostWalletStatus::Locked
    );
}
