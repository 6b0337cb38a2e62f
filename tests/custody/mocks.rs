//! Deterministic stand-ins for the consumed capabilities
//!
//! The custody core treats hierarchical BLS derivation, BLS signing, and
//! SSZ hash-tree-root computation as external capabilities. These mocks are
//! pure functions of their inputs, so every test that uses them is
//! reproducible bit-for-bit.

use async_trait::async_trait;
use ethers::utils::keccak256;
use fabstir_staking_node::{
    CredentialError, DepositMessageRootPort, KeyDerivationPort, Network, NetworkSpec, NodeConfig,
    ValidatorCryptoPort,
};
use sha2::{Digest, Sha256};
use std::path::Path;
use zeroize::Zeroizing;

/// Secret key at a path = keccak256 of the path string
pub struct MockDerivationPort;

#[async_trait]
impl KeyDerivationPort for MockDerivationPort {
    async fn derive_key(&self, path: &str) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        Ok(Zeroizing::new(keccak256(path.as_bytes()).to_vec()))
    }
}

/// Deterministic 48-byte "public keys" and 96-byte "signatures"
pub struct MockValidatorCrypto;

impl MockValidatorCrypto {
    fn digest(data: &[u8], tag: u8) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([tag]);
        hasher.update(data);
        hasher.finalize().into()
    }
}

impl ValidatorCryptoPort for MockValidatorCrypto {
    fn public_key(&self, secret_key: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let a = Self::digest(secret_key, 0);
        let b = Self::digest(&a, 1);
        let mut pk = Vec::with_capacity(48);
        pk.extend_from_slice(&a);
        pk.extend_from_slice(&b[..16]);
        Ok(pk)
    }

    fn sign_deposit(
        &self,
        secret_key: &[u8],
        withdrawal_credentials: &[u8; 32],
        amount_gwei: u64,
    ) -> Result<Vec<u8>, CredentialError> {
        let mut message = Vec::new();
        message.extend_from_slice(secret_key);
        message.extend_from_slice(withdrawal_credentials);
        message.extend_from_slice(&amount_gwei.to_le_bytes());
        let a = Self::digest(&message, 2);
        let b = Self::digest(&a, 3);
        let c = Self::digest(&b, 4);
        let mut sig = Vec::with_capacity(96);
        sig.extend_from_slice(&a);
        sig.extend_from_slice(&b);
        sig.extend_from_slice(&c);
        Ok(sig)
    }
}

/// Deposit-message root = keccak256(pubkey || wc || amount_le || signature)
pub struct MockRootPort;

impl DepositMessageRootPort for MockRootPort {
    fn deposit_message_root(
        &self,
        public_key: &[u8],
        withdrawal_credentials: &[u8; 32],
        amount_gwei: u64,
        signature: &[u8],
    ) -> Result<[u8; 32], CredentialError> {
        let mut data = Vec::new();
        data.extend_from_slice(public_key);
        data.extend_from_slice(withdrawal_credentials);
        data.extend_from_slice(&amount_gwei.to_le_bytes());
        data.extend_from_slice(signature);
        Ok(keccak256(data))
    }
}

/// Node config rooted at a temp dir, with test-grade scrypt cost
pub fn test_config(data_dir: &Path) -> NodeConfig {
    NodeConfig::with_data_dir(data_dir.to_path_buf(), NetworkSpec::resolve(Network::Devnet))
        .with_keystore_scrypt_log_n(4)
}

/// Well-known development mnemonic (hardhat/anvil default accounts)
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
