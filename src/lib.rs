// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod config;
pub mod deposit;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod manager;
pub mod merkle;
pub mod ports;
pub mod recovery;
pub mod wallet;

// Re-export main types
pub use config::{Network, NetworkSpec, NodeConfig, DEFAULT_RECOVERY_SEARCH_BUDGET};
pub use deposit::{DepositRecord, DepositRecordAggregator, DEPOSIT_RECORD_SCHEMA_VERSION};
pub use error::CredentialError;
pub use keystore::{EncryptedKeystoreEntry, KeystoreStore};
pub use ledger::CredentialIndexLedger;
pub use manager::{CredentialManager, GeneratedCredential};
pub use merkle::MerkleCommitmentBuilder;
pub use ports::{
    DepositMessageRootPort, KeyDerivationPort, MnemonicKeySource, ValidatorCryptoPort,
};
pub use recovery::{RecoveredAccount, RecoverySearchEngine};
pub use wallet::{HostIdentity, HostWalletStatus};
