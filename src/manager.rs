// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Credential Manager
//!
//! Orchestrates the custody core: hands out the next validator key, keeps
//! the index ledger and the encrypted keystore in lockstep, maintains the
//! deposit batch, and produces commitment roots for the external verifier.
//!
//! ## Critical section
//!
//! One credential's `next_path → derive → advance → keystore write →
//! aggregator append` sequence runs under a single `tokio::sync::Mutex`
//! held across all of it. Concurrent generation requests serialize; two
//! callers can never observe the same index. A crash after derivation but
//! before `advance` retries the same path (derivation is deterministic); a
//! crash after `advance` skips one index, which is safe — indices are never
//! reused.
//!
//! Read-only commitment roots are computed outside the lock, over a
//! snapshot of the batch taken under it. Publishing holds the lock across
//! snapshot, root, and version assignment so version order always matches
//! snapshot order.

use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::NodeConfig;
use crate::deposit::{DepositRecord, DepositRecordAggregator};
use crate::error::CredentialError;
use crate::keystore::KeystoreStore;
use crate::ledger::CredentialIndexLedger;
use crate::merkle::MerkleCommitmentBuilder;
use crate::ports::{
    DepositMessageRootPort, KeyDerivationPort, MnemonicKeySource, ValidatorCryptoPort,
};
use crate::recovery::{RecoveredAccount, RecoverySearchEngine};
use crate::wallet::{HostIdentity, HostWalletStatus};

/// Outcome of generating one validator credential
#[derive(Clone, Debug)]
pub struct GeneratedCredential {
    /// Validator public key (48 bytes)
    pub public_key: Vec<u8>,
    /// Path the key was derived at, immutable from here on
    pub derivation_path: String,
    /// Deposit record appended to the batch for this key
    pub record: DepositRecord,
}

/// State guarded by the generation critical section
struct CustodyState {
    ledger: CredentialIndexLedger,
    keystore: KeystoreStore,
    aggregator: DepositRecordAggregator,
}

/// Orchestrator over ledger, keystore, aggregator, and commitment builder
pub struct CredentialManager {
    config: NodeConfig,
    derivation: Arc<dyn KeyDerivationPort>,
    validator_crypto: Arc<dyn ValidatorCryptoPort>,
    merkle: MerkleCommitmentBuilder,
    state: Arc<Mutex<CustodyState>>,
    host: HostIdentity,
    host_source: Option<MnemonicKeySource>,
}

impl CredentialManager {
    /// Open the custody core at the configured data directory.
    ///
    /// `host_source` is the in-process host key source; pass `None` when no
    /// host mnemonic is loaded — the wallet then reports `Locked` and the
    /// daemon runs in cannot-sign mode.
    pub fn open(
        config: NodeConfig,
        derivation: Arc<dyn KeyDerivationPort>,
        validator_crypto: Arc<dyn ValidatorCryptoPort>,
        root_port: Arc<dyn DepositMessageRootPort>,
        host_source: Option<MnemonicKeySource>,
    ) -> Result<Self, CredentialError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            CredentialError::PersistFailure {
                file: config.data_dir.display().to_string(),
                reason: format!("failed to create data directory: {}", e),
            }
        })?;

        let keystore = KeystoreStore::open(&config.keystore_dir)?
            .with_scrypt_log_n(config.keystore_scrypt_log_n);
        let ledger = CredentialIndexLedger::open(&config.ledger_path)?;

        // Each stored validator key advanced the ledger exactly once, so an
        // index below the stored-key count means the ledger regressed.
        let stored_keys = keystore.list_stored_public_keys()?.count();
        if (ledger.next_account_index() as usize) < stored_keys {
            return Err(CredentialError::PersistFailure {
                file: config.ledger_path.display().to_string(),
                reason: format!(
                    "ledger index {} is behind {} stored validator keys",
                    ledger.next_account_index(),
                    stored_keys
                ),
            });
        }

        let aggregator = DepositRecordAggregator::open(
            &config.deposit_batch_path,
            config.network.deposit_amount_gwei,
            Arc::clone(&root_port),
        )?;
        let merkle =
            MerkleCommitmentBuilder::new(config.network.deposit_amount_gwei, root_port);
        let host = HostIdentity::new(&config.data_dir);

        info!(
            "Credential manager opened for {} ({} deposit records on disk, next index {})",
            config.network.name,
            aggregator.len(),
            ledger.next_account_index()
        );

        Ok(Self {
            config,
            derivation,
            validator_crypto,
            merkle,
            state: Arc::new(Mutex::new(CustodyState {
                ledger,
                keystore,
                aggregator,
            })),
            host,
            host_source,
        })
    }

    /// Generate the next validator key: derive at the ledger's next path,
    /// advance the ledger, encrypt the key at rest, and append its deposit
    /// record to the batch. One atomic sequence per credential.
    pub async fn generate_next_validator_key(
        &self,
        withdrawal_credentials: [u8; 32],
    ) -> Result<GeneratedCredential, CredentialError> {
        let mut state = self.state.lock().await;

        // Path first, advance later: if derivation fails the same path is
        // retried and no index is burned.
        let derivation_path = state.ledger.next_path(&self.config.network);
        let secret = self.derivation.derive_key(&derivation_path).await?;
        let public_key = self.validator_crypto.public_key(&secret)?;
        let public_key_hex = hex::encode(&public_key);

        // Key material exists: advance before anything is reported, so a
        // crash from here on skips the index instead of duplicating it.
        state.ledger.advance()?;

        // scrypt at production cost takes on the order of a second; run the
        // encrypt-and-write off the async worker while the lock stays held.
        let store = state.keystore.clone();
        let store_secret = secret.clone();
        let store_path = derivation_path.clone();
        let store_pubkey = public_key_hex.clone();
        tokio::task::spawn_blocking(move || {
            store.store(&store_secret, &store_path, &store_pubkey)
        })
        .await
        .map_err(|e| CredentialError::EncryptionFailure {
            public_key: public_key_hex.clone(),
            reason: format!("keystore write task failed: {}", e),
        })??;

        let signature = self.validator_crypto.sign_deposit(
            &secret,
            &withdrawal_credentials,
            self.config.network.deposit_amount_gwei,
        )?;
        let record =
            state
                .aggregator
                .append(public_key.clone(), withdrawal_credentials, signature)?;
        state.aggregator.save()?;

        info!(
            "Generated validator credential {} at {}",
            public_key_hex, derivation_path
        );
        Ok(GeneratedCredential {
            public_key,
            derivation_path,
            record,
        })
    }

    /// Commitment root over a consistent snapshot of the deposit batch.
    /// The lock is released before hashing; the root is valid as of the
    /// snapshot it was computed from.
    pub async fn commitment_root(&self) -> Result<[u8; 32], CredentialError> {
        let snapshot = self.state.lock().await.aggregator.snapshot();
        self.merkle.commitment_root(&snapshot)
    }

    /// Compute the commitment root and record the next published version
    /// in the ledger. Returns the root and the version it was published as.
    ///
    /// Snapshot, root, and version are all taken under one lock
    /// acquisition, so concurrent publishers can never pair an older
    /// snapshot with a newer version.
    pub async fn publish_commitment(&self) -> Result<([u8; 32], u64), CredentialError> {
        let mut state = self.state.lock().await;
        let snapshot = state.aggregator.snapshot();
        let root = self.merkle.commitment_root(&snapshot)?;
        let version = state.ledger.last_published_commitment_version() + 1;
        state.ledger.mark_published(version)?;
        info!(
            "Published commitment root 0x{} as version {}",
            hex::encode(root),
            version
        );
        Ok((root, version))
    }

    /// Rebuild the deposit batch wholesale from the given key material,
    /// replacing any corrupted or stale batch file.
    pub async fn regenerate_deposit_batch(
        &self,
        keys: &[(Vec<u8>, [u8; 32], Vec<u8>)],
    ) -> Result<(), CredentialError> {
        let mut state = self.state.lock().await;
        state.aggregator.regenerate_all(keys)
    }

    /// Recover a lost host-wallet index from a mnemonic and known address,
    /// then persist the re-established mapping: the address goes on record
    /// and the ledger's index floor rises past the recovered index.
    pub async fn recover_wallet(
        &self,
        mnemonic: &str,
        target_address: Address,
    ) -> Result<RecoveredAccount, CredentialError> {
        let recovered = self.search(mnemonic, target_address)?;

        let mut state = self.state.lock().await;
        state
            .ledger
            .raise_index_floor(u64::from(recovered.index) + 1)?;
        self.host.record_address(recovered.address)?;
        info!(
            "Recovered wallet index {} for {:?}",
            recovered.index, target_address
        );
        Ok(recovered)
    }

    /// Dry-run recovery: identical search, guaranteed to write nothing
    /// (no ledger update, no address record, no keystore files).
    pub fn test_recover_wallet(
        &self,
        mnemonic: &str,
        target_address: Address,
    ) -> Result<RecoveredAccount, CredentialError> {
        self.search(mnemonic, target_address)
    }

    /// Host wallet status: `Ready`, `ReadOnly` (address mismatch), or
    /// `Locked` (no signing material loaded). Degraded states are reported,
    /// never thrown.
    pub fn host_wallet_status(&self) -> Result<HostWalletStatus, CredentialError> {
        let derived = match &self.host_source {
            Some(source) => Some(source.address_at(0)?),
            None => None,
        };
        self.host.status(derived)
    }

    /// Public keys currently held in the encrypted keystore
    pub async fn stored_public_keys(&self) -> Result<Vec<String>, CredentialError> {
        let state = self.state.lock().await;
        Ok(state.keystore.list_stored_public_keys()?.collect())
    }

    /// Number of deposit records awaiting commitment
    pub async fn deposit_batch_len(&self) -> usize {
        self.state.lock().await.aggregator.len()
    }

    /// Next unused account index
    pub async fn next_account_index(&self) -> u64 {
        self.state.lock().await.ledger.next_account_index()
    }

    fn search(
        &self,
        mnemonic: &str,
        target_address: Address,
    ) -> Result<RecoveredAccount, CredentialError> {
        RecoverySearchEngine::new(self.config.recovery_search_budget).search(
            mnemonic,
            target_address,
            &self.config.network,
        )
    }
}
