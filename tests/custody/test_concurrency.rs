//! Concurrency tests for the ledger critical section
//!
//! Two generation sequences racing the same ledger must never observe the
//! same index. The manager serializes `next_path + advance + keystore
//! write` under one mutex; these tests fail against an implementation that
//! drops the lock between those steps.

use super::mocks::{test_config, MockDerivationPort, MockRootPort, MockValidatorCrypto};
use fabstir_staking_node::CredentialManager;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_generation_never_duplicates_indices() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(
        CredentialManager::open(
            test_config(dir.path()),
            Arc::new(MockDerivationPort),
            Arc::new(MockValidatorCrypto),
            Arc::new(MockRootPort),
            None,
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            manager
                .generate_next_validator_key([0x09u8; 32])
                .await
                .unwrap()
        }));
    }

    let mut paths = HashSet::new();
    let mut pubkeys = HashSet::new();
    for handle in handles {
        let generated = handle.await.unwrap();
        assert!(
            paths.insert(generated.derivation_path.clone()),
            "duplicate derivation path assigned: {}",
            generated.derivation_path
        );
        assert!(pubkeys.insert(generated.public_key.clone()));
    }

    assert_eq!(paths.len(), 8);
    assert_eq!(manager.next_account_index().await, 8);
    assert_eq!(manager.deposit_batch_len().await, 8);
}

#[tokio::test]
async fn test_concurrent_publishers_assign_unique_ordered_versions() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(
        CredentialManager::open(
            test_config(dir.path()),
            Arc::new(MockDerivationPort),
            Arc::new(MockValidatorCrypto),
            Arc::new(MockRootPort),
            None,
        )
        .unwrap(),
    );
    manager
        .generate_next_validator_key([0x0bu8; 32])
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(
            async move { manager.publish_commitment().await.unwrap() },
        ));
    }

    // Snapshot and version are assigned under one lock acquisition, so the
    // 8 racing publishers must take 8 distinct versions, and with an
    // unchanged batch every published root is the same
    let mut versions = Vec::new();
    let mut roots = HashSet::new();
    for handle in handles {
        let (root, version) = handle.await.unwrap();
        versions.push(version);
        roots.insert(root);
    }
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<u64>>());
    assert_eq!(roots.len(), 1);
}

#[tokio::test]
async fn test_commitment_runs_concurrently_with_generation() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(
        CredentialManager::open(
            test_config(dir.path()),
            Arc::new(MockDerivationPort),
            Arc::new(MockValidatorCrypto),
            Arc::new(MockRootPort),
            None,
        )
        .unwrap(),
    );

    manager
        .generate_next_validator_key([0x0au8; 32])
        .await
        .unwrap();

    // Roots computed mid-generation must be valid for SOME batch snapshot:
    // with 1..=4 records every intermediate snapshot is non-empty, so the
    // computation itself must never fail or panic.
    let generator = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for _ in 0..3 {
                manager
                    .generate_next_validator_key([0x0au8; 32])
                    .await
                    .unwrap();
            }
        })
    };
    let reader = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for _ in 0..5 {
                manager.commitment_root().await.unwrap();
            }
        })
    };

    generator.await.unwrap();
    reader.await.unwrap();
    assert_eq!(manager.deposit_batch_len().await, 4);
}
