//! End-to-end tests for the credential generation and commitment flow

use super::mocks::{test_config, MockDerivationPort, MockRootPort, MockValidatorCrypto};
use fabstir_staking_node::{CredentialError, CredentialManager, ValidatorCryptoPort};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn open_manager(dir: &TempDir) -> CredentialManager {
    CredentialManager::open(
        test_config(dir.path()),
        Arc::new(MockDerivationPort),
        Arc::new(MockValidatorCrypto),
        Arc::new(MockRootPort),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_generate_assigns_sequential_paths() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);

    let wc = [0x01u8; 32];
    let first = manager.generate_next_validator_key(wc).await.unwrap();
    let second = manager.generate_next_validator_key(wc).await.unwrap();
    let third = manager.generate_next_validator_key(wc).await.unwrap();

    assert_eq!(first.derivation_path, "m/12381/3600/0/0/0");
    assert_eq!(second.derivation_path, "m/12381/3600/1/0/0");
    assert_eq!(third.derivation_path, "m/12381/3600/2/0/0");
    assert_eq!(manager.next_account_index().await, 3);
    assert_eq!(manager.deposit_batch_len().await, 3);
    assert_eq!(manager.stored_public_keys().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_generated_key_is_loadable_and_intact() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);

    let generated = manager
        .generate_next_validator_key([0x02u8; 32])
        .await
        .unwrap();
    drop(manager);

    // Reopen the store independently and decrypt the key
    let store = fabstir_staking_node::KeystoreStore::open(&dir.path().join("keystore")).unwrap();
    let loaded = store
        .load(&hex::encode(&generated.public_key), |secret| {
            MockValidatorCrypto.public_key(secret).ok()
        })
        .unwrap();

    // The derivation port is deterministic, so the stored secret must match
    // a fresh derivation at the same path
    let expected = ethers::utils::keccak256(generated.derivation_path.as_bytes());
    assert_eq!(loaded.as_slice(), &expected);
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let manager = open_manager(&dir);
        manager
            .generate_next_validator_key([0x03u8; 32])
            .await
            .unwrap();
        manager
            .generate_next_validator_key([0x03u8; 32])
            .await
            .unwrap();
    }
    let manager = open_manager(&dir);
    assert_eq!(manager.next_account_index().await, 2);
    assert_eq!(manager.deposit_batch_len().await, 2);

    // Generation resumes past the persisted index, never reusing one
    let next = manager
        .generate_next_validator_key([0x03u8; 32])
        .await
        .unwrap();
    assert_eq!(next.derivation_path, "m/12381/3600/2/0/0");
}

#[tokio::test]
async fn test_regressed_ledger_is_rejected_at_open() {
    let dir = TempDir::new().unwrap();
    {
        let manager = open_manager(&dir);
        manager
            .generate_next_validator_key([0x05u8; 32])
            .await
            .unwrap();
        manager
            .generate_next_validator_key([0x05u8; 32])
            .await
            .unwrap();
    }

    // Roll the ledger back behind the two stored keys: corruption, since
    // every stored key advanced the index exactly once
    fs::write(
        dir.path().join("credential-ledger.json"),
        b"{\"next_account_index\":0,\"last_published_commitment_version\":0}",
    )
    .unwrap();

    let result = CredentialManager::open(
        test_config(dir.path()),
        Arc::new(MockDerivationPort),
        Arc::new(MockValidatorCrypto),
        Arc::new(MockRootPort),
        None,
    );
    assert!(matches!(
        result,
        Err(CredentialError::PersistFailure { .. })
    ));
}

#[tokio::test]
async fn test_commitment_root_empty_batch() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);
    assert!(matches!(
        manager.commitment_root().await,
        Err(CredentialError::EmptyBatch)
    ));
}

#[tokio::test]
async fn test_publish_commitment_advances_version() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);
    manager
        .generate_next_validator_key([0x04u8; 32])
        .await
        .unwrap();

    let (root_v1, v1) = manager.publish_commitment().await.unwrap();
    let (root_v2, v2) = manager.publish_commitment().await.unwrap();
    assert_eq!(v1, 1);
    assert_eq!(v2, 2);
    // Unchanged batch, unchanged root
    assert_eq!(root_v1, root_v2);
}

#[tokio::test]
async fn test_regenerate_batch_is_idempotent_on_disk() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);
    let batch_path = dir.path().join("deposit-batch.json");

    let keys = vec![
        (vec![0x11u8; 48], [0x22u8; 32], vec![0x33u8; 96]),
        (vec![0x44u8; 48], [0x55u8; 32], vec![0x66u8; 96]),
    ];
    manager.regenerate_deposit_batch(&keys).await.unwrap();
    let first = fs::read(&batch_path).unwrap();
    manager.regenerate_deposit_batch(&keys).await.unwrap();
    let second = fs::read(&batch_path).unwrap();
    assert_eq!(first, second);
    assert_eq!(manager.deposit_batch_len().await, 2);
}

#[tokio::test]
async fn test_commitment_root_recomputes_over_regenerated_batch() {
    let dir = TempDir::new().unwrap();
    let manager = open_manager(&dir);

    manager
        .generate_next_validator_key([0x07u8; 32])
        .await
        .unwrap();
    let root_one = manager.commitment_root().await.unwrap();

    manager
        .generate_next_validator_key([0x07u8; 32])
        .await
        .unwrap();
    let root_two = manager.commitment_root().await.unwrap();
    assert_ne!(root_one, root_two);
}
