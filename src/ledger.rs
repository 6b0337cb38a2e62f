// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Credential Index Ledger
//!
//! Single source of truth for the next unused derivation index. The ledger
//! only ever moves forward: an index handed out and advanced past is never
//! reassigned, and a crash between derivation and advance leaves at most one
//! skipped index (safe) rather than a duplicated one.
//!
//! Formatting the next path and advancing the counter are deliberately
//! split: the caller retries key generation against the same path if the
//! derivation capability fails, and advances only once it has key material
//! in hand.
//!
//! Callers must hold the process-wide generation lock around
//! `next_path` + `advance` + keystore write (see `CredentialManager`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::NetworkSpec;
use crate::error::CredentialError;
use crate::keystore::atomic_write;

/// On-disk ledger record
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerRecord {
    pub next_account_index: u64,
    pub last_published_commitment_version: u64,
}

/// File-backed monotonic index ledger
pub struct CredentialIndexLedger {
    path: PathBuf,
    record: LedgerRecord,
}

impl CredentialIndexLedger {
    /// Load the ledger from `path`, creating it with both counters at zero
    /// on first use.
    pub fn open(path: &Path) -> Result<Self, CredentialError> {
        let record = if path.exists() {
            let raw = fs::read(path).map_err(|e| CredentialError::PersistFailure {
                file: path.display().to_string(),
                reason: format!("failed to read ledger: {}", e),
            })?;
            serde_json::from_slice(&raw).map_err(|e| CredentialError::PersistFailure {
                file: path.display().to_string(),
                reason: format!("malformed ledger file: {}", e),
            })?
        } else {
            let record = LedgerRecord::default();
            persist(path, &record)?;
            info!("Initialized credential ledger at {}", path.display());
            record
        };

        Ok(Self {
            path: path.to_path_buf(),
            record,
        })
    }

    /// Next unused account index (not yet advanced past)
    pub fn next_account_index(&self) -> u64 {
        self.record.next_account_index
    }

    /// Version of the last commitment handed to the external verifier
    pub fn last_published_commitment_version(&self) -> u64 {
        self.record.last_published_commitment_version
    }

    /// Format the validator path for the current index without advancing
    pub fn next_path(&self, network: &NetworkSpec) -> String {
        network.validator_path(self.record.next_account_index as u32)
    }

    /// Advance the counter by exactly one and persist durably.
    ///
    /// Call only after the derivation capability produced key material for
    /// the current path, and before reporting the key to any caller.
    pub fn advance(&mut self) -> Result<(), CredentialError> {
        let advanced = LedgerRecord {
            next_account_index: self.record.next_account_index + 1,
            ..self.record.clone()
        };
        persist(&self.path, &advanced)?;
        self.record = advanced;
        debug!(
            "Ledger advanced, next account index is {}",
            self.record.next_account_index
        );
        Ok(())
    }

    /// Raise the next index to at least `floor`. Used after wallet recovery
    /// to re-establish a lost index mapping. Never lowers the counter.
    pub fn raise_index_floor(&mut self, floor: u64) -> Result<(), CredentialError> {
        if floor <= self.record.next_account_index {
            return Ok(());
        }
        let raised = LedgerRecord {
            next_account_index: floor,
            ..self.record.clone()
        };
        persist(&self.path, &raised)?;
        self.record = raised;
        info!("Ledger index floor raised to {}", floor);
        Ok(())
    }

    /// Record a published commitment version. Monotonically non-decreasing.
    pub fn mark_published(&mut self, version: u64) -> Result<(), CredentialError> {
        if version < self.record.last_published_commitment_version {
            return Err(CredentialError::PersistFailure {
                file: self.path.display().to_string(),
                reason: format!(
                    "commitment version {} is lower than last published {}",
                    version, self.record.last_published_commitment_version
                ),
            });
        }
        let updated = LedgerRecord {
            last_published_commitment_version: version,
            ..self.record.clone()
        };
        persist(&self.path, &updated)?;
        self.record = updated;
        Ok(())
    }
}

fn persist(path: &Path, record: &LedgerRecord) -> Result<(), CredentialError> {
    let json = serde_json::to_vec_pretty(record).map_err(|e| CredentialError::PersistFailure {
        file: path.display().to_string(),
        reason: format!("failed to serialize ledger: {}", e),
    })?;
    atomic_write(path, &json)
}
