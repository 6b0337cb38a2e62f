// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recovery Search Engine
//!
//! Brute-force recovery of a lost derivation index: walk the host-wallet
//! path template from index 0 upward, derive the secp256k1 key at each
//! index, and compare its address to the known target. The search is
//! bounded by a fixed budget (default 100,000 indices) and never loops
//! unbounded.
//!
//! The engine itself is pure: it writes no keystore files and no ledger
//! state. Persisting a recovered index is the orchestrator's job
//! (`CredentialManager::recover_wallet`).

use ethers::types::Address;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::NetworkSpec;
use crate::error::CredentialError;
use crate::ports::MnemonicKeySource;

/// Result of a successful recovery search
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredAccount {
    pub index: u32,
    pub derivation_path: String,
    pub address: Address,
}

/// Bounded brute-force search over host-wallet derivation indices
pub struct RecoverySearchEngine {
    max_iterations: u32,
    cancel: CancellationToken,
}

impl RecoverySearchEngine {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token checked between iterations
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Search indices `0..max_iterations` in ascending order for the key
    /// whose address equals `target_address`. First match wins.
    ///
    /// A malformed mnemonic fails immediately with `InvalidMnemonic`; an
    /// unmatched target fails with `Exhausted` after the full budget (or at
    /// the point of cancellation).
    pub fn search(
        &self,
        mnemonic: &str,
        target_address: Address,
        network: &NetworkSpec,
    ) -> Result<RecoveredAccount, CredentialError> {
        let source = MnemonicKeySource::new(mnemonic);
        source.validate()?;

        info!(
            "Starting recovery search for {:?} over {} indices",
            target_address, self.max_iterations
        );

        for index in 0..self.max_iterations {
            if self.cancel.is_cancelled() {
                debug!("Recovery search cancelled at index {}", index);
                return Err(CredentialError::Exhausted {
                    target_address: format!("{:?}", target_address),
                    attempted: index,
                    budget: self.max_iterations,
                });
            }

            if source.address_at(index)? == target_address {
                let derivation_path = network.host_wallet_path(index);
                info!(
                    "Recovery search found {:?} at index {} ({})",
                    target_address, index, derivation_path
                );
                return Ok(RecoveredAccount {
                    index,
                    derivation_path,
                    address: target_address,
                });
            }

            if index > 0 && index % 10_000 == 0 {
                debug!("Recovery search at index {}", index);
            }
        }

        Err(CredentialError::Exhausted {
            target_address: format!("{:?}", target_address),
            attempted: self.max_iterations,
            budget: self.max_iterations,
        })
    }
}
