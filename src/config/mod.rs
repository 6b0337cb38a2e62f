// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node Configuration
//!
//! Environment-variable driven configuration for the credential-custody
//! core, plus the closed network registry. Network resolution happens once
//! at startup; an unknown network name is a constructor error, never a
//! runtime panic.

pub mod networks;

pub use networks::{Network, NetworkSpec};

use std::env;
use std::path::PathBuf;

use crate::error::CredentialError;

/// Default bound on the recovery brute-force search
pub const DEFAULT_RECOVERY_SEARCH_BUDGET: u32 = 100_000;

/// Runtime configuration for the custody core
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Root data directory (keystore dir, ledger, batch file live below it)
    pub data_dir: PathBuf,
    /// Directory holding one encrypted keystore file per validator key
    pub keystore_dir: PathBuf,
    /// Credential index ledger file
    pub ledger_path: PathBuf,
    /// Deposit batch file consumed by the external verification service
    pub deposit_batch_path: PathBuf,
    /// Maximum indices examined by a recovery search
    pub recovery_search_budget: u32,
    /// scrypt cost exponent for newly written keystore entries
    pub keystore_scrypt_log_n: u8,
    /// Resolved network parameters
    pub network: NetworkSpec,
}

impl NodeConfig {
    /// Build configuration from environment variables with defaults
    ///
    /// Variables:
    /// - `STAKING_DATA_DIR` (default `./data`)
    /// - `STAKING_NETWORK` (default `mainnet`)
    /// - `RECOVERY_SEARCH_BUDGET` (default 100000)
    pub fn from_env() -> Result<Self, CredentialError> {
        let data_dir = PathBuf::from(
            env::var("STAKING_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );
        let network_name = env::var("STAKING_NETWORK").unwrap_or_else(|_| "mainnet".to_string());
        let network = NetworkSpec::resolve(network_name.parse()?);
        let recovery_search_budget = env::var("RECOVERY_SEARCH_BUDGET")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RECOVERY_SEARCH_BUDGET);

        Ok(Self {
            keystore_dir: data_dir.join("keystore"),
            ledger_path: data_dir.join("credential-ledger.json"),
            deposit_batch_path: data_dir.join("deposit-batch.json"),
            data_dir,
            recovery_search_budget,
            keystore_scrypt_log_n: crate::keystore::SCRYPT_LOG_N,
            network,
        })
    }

    /// Configuration rooted at an explicit directory (tests, embedding)
    pub fn with_data_dir(data_dir: PathBuf, network: NetworkSpec) -> Self {
        Self {
            keystore_dir: data_dir.join("keystore"),
            ledger_path: data_dir.join("credential-ledger.json"),
            deposit_batch_path: data_dir.join("deposit-batch.json"),
            data_dir,
            recovery_search_budget: DEFAULT_RECOVERY_SEARCH_BUDGET,
            keystore_scrypt_log_n: crate::keystore::SCRYPT_LOG_N,
            network,
        }
    }

    /// Lower the scrypt cost for newly written keystore entries (tests)
    pub fn with_keystore_scrypt_log_n(mut self, log_n: u8) -> Self {
        self.keystore_scrypt_log_n = log_n;
        self
    }
}
