// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Host Wallet Status
//!
//! The host identity is one secp256k1 key. Its address is persisted beside
//! the keystore so the daemon can detect two degraded states at startup:
//!
//! - **Locked**: credential material exists on disk but no signing key or
//!   passphrase is loaded (`PasswordRequired` semantics).
//! - **ReadOnly**: the loaded key derives a different address than the one
//!   on record (`AddressMismatch` semantics).
//!
//! Both are status values the daemon reports and keeps running with, in a
//! cannot-sign mode. Neither aborts the process.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ethers::types::Address;
use tracing::warn;

use crate::error::CredentialError;
use crate::keystore::atomic_write;

const ADDRESS_FILE: &str = "host-address.txt";

/// Operator-visible host wallet state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostWalletStatus {
    /// Signing available; derived and stored addresses agree
    Ready { address: Address },
    /// Stored address disagrees with the derived key; signing refused
    ReadOnly { stored: Address, derived: Address },
    /// Wallet state exists on disk but no signing material is loaded
    Locked,
}

/// File-backed record of the host wallet's address
pub struct HostIdentity {
    address_path: PathBuf,
}

impl HostIdentity {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            address_path: data_dir.join(ADDRESS_FILE),
        }
    }

    /// Stored host address, if one was ever recorded
    pub fn stored_address(&self) -> Result<Option<Address>, CredentialError> {
        if !self.address_path.exists() {
            return Ok(None);
        }
        let raw =
            fs::read_to_string(&self.address_path).map_err(|e| CredentialError::PersistFailure {
                file: self.address_path.display().to_string(),
                reason: format!("failed to read host address file: {}", e),
            })?;
        let address = Address::from_str(raw.trim()).map_err(|e| {
            CredentialError::PersistFailure {
                file: self.address_path.display().to_string(),
                reason: format!("malformed host address '{}': {}", raw.trim(), e),
            }
        })?;
        Ok(Some(address))
    }

    /// Record the host address (atomic replace)
    pub fn record_address(&self, address: Address) -> Result<(), CredentialError> {
        atomic_write(&self.address_path, format!("{:?}", address).as_bytes())
    }

    /// Evaluate wallet status against an optionally-loaded signing key.
    ///
    /// `derived` is `None` when no mnemonic/passphrase is available. A
    /// first run with a key but no stored address records the address and
    /// reports `Ready`.
    pub fn status(
        &self,
        derived: Option<Address>,
    ) -> Result<HostWalletStatus, CredentialError> {
        let stored = self.stored_address()?;
        match (stored, derived) {
            (_, None) => Ok(HostWalletStatus::Locked),
            (None, Some(address)) => {
                self.record_address(address)?;
                Ok(HostWalletStatus::Ready { address })
            }
            (Some(stored), Some(derived)) if stored == derived => {
                Ok(HostWalletStatus::Ready { address: derived })
            }
            (Some(stored), Some(derived)) => {
                warn!(
                    "Host wallet address mismatch: stored {:?}, derived {:?}, entering read-only mode",
                    stored, derived
                );
                Ok(HostWalletStatus::ReadOnly { stored, derived })
            }
        }
    }
}
