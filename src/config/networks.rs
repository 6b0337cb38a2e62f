// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Network Registry
//!
//! Closed enum-to-struct mapping of supported networks, resolved once at
//! startup. Constants per network live in one place; there is no default
//! arm and no runtime branching on chain ids.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CredentialError;

/// Fixed protocol deposit amount in gwei (32 ETH). The commitment root is
/// always recomputed with this constant, regardless of any declared amount
/// carried by a deposit record. This mirrors the external verifier's rule.
pub const DEPOSIT_AMOUNT_GWEI: u64 = 32_000_000_000;

/// Supported networks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Hoodi,
    Devnet,
}

impl FromStr for Network {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "hoodi" => Ok(Network::Hoodi),
            "devnet" => Ok(Network::Devnet),
            other => Err(CredentialError::UnknownNetwork {
                name: other.to_string(),
            }),
        }
    }
}

/// Per-network parameters resolved from a [`Network`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub chain_id: u64,
    pub name: String,
    /// Effective deposit amount used for every deposit-message root
    pub deposit_amount_gwei: u64,
    pub genesis_fork_version: [u8; 4],
    /// Host identity path template, `{}` replaced by the account index
    pub host_wallet_path_template: String,
    /// Validator signing-key path template, `{}` replaced by the account index
    pub validator_path_template: String,
}

impl NetworkSpec {
    /// Resolve the full parameter set for a known network
    pub fn resolve(network: Network) -> Self {
        match network {
            Network::Mainnet => NetworkSpec {
                chain_id: 1,
                name: "Mainnet".to_string(),
                deposit_amount_gwei: DEPOSIT_AMOUNT_GWEI,
                genesis_fork_version: [0x00, 0x00, 0x00, 0x00],
                host_wallet_path_template: "m/44'/60'/0'/0/{}".to_string(),
                validator_path_template: "m/12381/3600/{}/0/0".to_string(),
            },
            Network::Hoodi => NetworkSpec {
                chain_id: 560048,
                name: "Hoodi".to_string(),
                deposit_amount_gwei: DEPOSIT_AMOUNT_GWEI,
                genesis_fork_version: [0x10, 0x00, 0x09, 0x10],
                host_wallet_path_template: "m/44'/60'/0'/0/{}".to_string(),
                validator_path_template: "m/12381/3600/{}/0/0".to_string(),
            },
            Network::Devnet => NetworkSpec {
                chain_id: 1337,
                name: "Devnet".to_string(),
                deposit_amount_gwei: DEPOSIT_AMOUNT_GWEI,
                genesis_fork_version: [0x00, 0x00, 0x00, 0xff],
                host_wallet_path_template: "m/44'/60'/0'/0/{}".to_string(),
                validator_path_template: "m/12381/3600/{}/0/0".to_string(),
            },
        }
    }

    /// Host wallet derivation path at `index`
    pub fn host_wallet_path(&self, index: u32) -> String {
        self.host_wallet_path_template
            .replace("{}", &index.to_string())
    }

    /// Validator derivation path at `index`
    pub fn validator_path(&self, index: u32) -> String {
        self.validator_path_template
            .replace("{}", &index.to_string())
    }
}
