// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Consumed Capability Ports
//!
//! The custody core does not implement hierarchical BLS derivation, BLS
//! signing, or SSZ hash-tree-root computation. It consumes them through the
//! traits below, keeping the core testable with deterministic mocks and
//! deployable against an external key daemon.
//!
//! Determinism contract: `KeyDerivationPort::derive_key` must return the
//! same bytes for the same path every time (fixed seed), so a crash between
//! derivation and keystore write is safe to retry.

use async_trait::async_trait;
use ethers::signers::{coins_bip39::English, MnemonicBuilder, Signer};
use ethers::types::Address;
use ethers::utils::secret_key_to_address;
use zeroize::Zeroizing;

use crate::error::CredentialError;

/// External hierarchical key derivation: path in, secret key bytes out
#[async_trait]
pub trait KeyDerivationPort: Send + Sync {
    /// Derive the secret key at `path`. Pure per (seed, path).
    async fn derive_key(&self, path: &str) -> Result<Zeroizing<Vec<u8>>, CredentialError>;
}

/// External SSZ capability: standardized deposit-message root
pub trait DepositMessageRootPort: Send + Sync {
    /// Compute the 32-byte deposit-message root over the given fields
    fn deposit_message_root(
        &self,
        public_key: &[u8],
        withdrawal_credentials: &[u8; 32],
        amount_gwei: u64,
        signature: &[u8],
    ) -> Result<[u8; 32], CredentialError>;
}

/// External BLS capability: public key derivation and deposit signing
pub trait ValidatorCryptoPort: Send + Sync {
    /// Public key (48 bytes) for a validator secret key
    fn public_key(&self, secret_key: &[u8]) -> Result<Vec<u8>, CredentialError>;

    /// Signature (96 bytes) over the deposit message for this key
    fn sign_deposit(
        &self,
        secret_key: &[u8],
        withdrawal_credentials: &[u8; 32],
        amount_gwei: u64,
    ) -> Result<Vec<u8>, CredentialError>;
}

/// In-process secp256k1 key source backed by a BIP-39 mnemonic
///
/// Serves the host-identity side of the wallet: the recovery search and the
/// host wallet status check both derive through this. Validator (BLS) keys
/// always come from the external [`KeyDerivationPort`].
pub struct MnemonicKeySource {
    phrase: Zeroizing<String>,
}

impl MnemonicKeySource {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: Zeroizing::new(phrase.trim().to_string()),
        }
    }

    /// Reject malformed phrases up front, before any search loop runs
    pub fn validate(&self) -> Result<(), CredentialError> {
        self.wallet_at(0).map(|_| ())
    }

    /// Ethereum address of the key at host-wallet `index`
    pub fn address_at(&self, index: u32) -> Result<Address, CredentialError> {
        Ok(self.wallet_at(index)?.address())
    }

    /// Raw secret key bytes at host-wallet `index`
    pub fn secret_key_at(&self, index: u32) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let wallet = self.wallet_at(index)?;
        Ok(Zeroizing::new(wallet.signer().to_bytes().to_vec()))
    }

    fn wallet_at(
        &self,
        index: u32,
    ) -> Result<ethers::signers::Wallet<k256::ecdsa::SigningKey>, CredentialError> {
        MnemonicBuilder::<English>::default()
            .phrase(self.phrase.as_str())
            .index(index)
            .and_then(|b| b.build())
            .map_err(|e| CredentialError::InvalidMnemonic {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl KeyDerivationPort for MnemonicKeySource {
    async fn derive_key(&self, path: &str) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(self.phrase.as_str())
            .derivation_path(path)
            .and_then(|b| b.build())
            .map_err(|e| CredentialError::Derivation {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Zeroizing::new(wallet.signer().to_bytes().to_vec()))
    }
}

/// Ethereum address for a raw secp256k1 secret key
pub fn secp256k1_address(secret_key: &[u8]) -> Result<Address, CredentialError> {
    let signing_key = k256::ecdsa::SigningKey::from_slice(secret_key).map_err(|e| {
        CredentialError::Derivation {
            path: "<raw secret key>".to_string(),
            reason: format!("invalid secp256k1 secret key: {}", e),
        }
    })?;
    Ok(secret_key_to_address(&signing_key))
}
