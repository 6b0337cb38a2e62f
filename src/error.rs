// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Credential Custody Error Taxonomy
//!
//! Closed error type for every operation in the credential-custody core.
//! Each variant carries enough context (public key, derivation path, file)
//! for an operator to act on the message alone, without reading source.
//!
//! ## Recoverable vs fatal
//!
//! - **Exhausted**: expected outcome of a bounded recovery search. Retry
//!   with a larger budget or a different mnemonic.
//! - **AddressMismatch** / **PasswordRequired**: degraded host-wallet states.
//!   The daemon keeps running in read-only / cannot-sign mode; these are
//!   surfaced as status, not process aborts.
//! - Everything else is an input or storage fault the caller decides how to
//!   retry. The core never retries silently.

use thiserror::Error;

/// Error type for all credential custody operations
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No keystore file exists for the requested public key
    #[error("no keystore entry found for public key {public_key} in {dir}")]
    NotFound { public_key: String, dir: String },

    /// Passphrase-based decryption failed (wrong passphrase or corrupted
    /// cipher payload). Distinct from `PubkeyMismatch`.
    #[error("failed to decrypt keystore for {public_key}: {reason}")]
    DecryptionFailure { public_key: String, reason: String },

    /// Decryption succeeded but the recovered secret key derives a public
    /// key other than the one the file is named for. Keystore corruption.
    #[error(
        "keystore corruption in {file}: expected public key {expected}, decrypted key derives {derived}"
    )]
    PubkeyMismatch {
        expected: String,
        derived: String,
        file: String,
    },

    /// Encrypting or writing a keystore entry failed
    #[error("failed to store keystore entry for {public_key}: {reason}")]
    EncryptionFailure { public_key: String, reason: String },

    /// Durable-storage write or read failed (ledger, batch file, sidecar)
    #[error("failed to persist {file}: {reason}")]
    PersistFailure { file: String, reason: String },

    /// Recovery search finished its budget without finding the target
    #[error(
        "recovery search exhausted: target {target_address} not found in {attempted} of {budget} indices"
    )]
    Exhausted {
        target_address: String,
        attempted: u32,
        budget: u32,
    },

    /// The supplied mnemonic is not a valid seed phrase
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic { reason: String },

    /// A commitment root was requested over zero deposit records
    #[error("deposit batch is empty: commitment root is undefined for zero records")]
    EmptyBatch,

    /// The host wallet's stored address disagrees with its derived key.
    /// The wallet enters read-only mode; signing is refused.
    #[error("host wallet address mismatch: stored {stored}, derived {derived} (read-only mode)")]
    AddressMismatch { stored: String, derived: String },

    /// A keystore exists on disk but no passphrase is loaded for it
    #[error("keystore at {dir} exists but no passphrase is loaded")]
    PasswordRequired { dir: String },

    /// Network name did not resolve to a known network at startup
    #[error("unknown network '{name}' (expected one of: mainnet, hoodi, devnet)")]
    UnknownNetwork { name: String },

    /// The external key-derivation capability failed for a path
    #[error("key derivation failed for path {path}: {reason}")]
    Derivation { path: String, reason: String },
}

impl CredentialError {
    /// True for states the daemon tolerates by degrading instead of aborting
    pub fn is_degraded_state(&self) -> bool {
        matches!(
            self,
            CredentialError::AddressMismatch { .. } | CredentialError::PasswordRequired { .. }
        )
    }
}
