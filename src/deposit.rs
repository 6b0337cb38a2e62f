// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deposit Record Aggregator
//!
//! Builds and persists the batch of validator deposit records awaiting
//! commitment. Records are append-only: a single record is never mutated in
//! place, and the only batch-level mutation is a wholesale regeneration
//! from currently-held keys.
//!
//! ## The declared-amount quirk
//!
//! Each record carries a declared `amount`, but the deposit-message root is
//! always recomputed with the fixed protocol amount. The external verifier
//! ignores the declared field, and so does this aggregator. This is a
//! deliberate mirror of the verifier's rule, not a bug to fix.
//!
//! The on-disk batch file is a JSON array, replaced wholesale with an
//! atomic rename, never patched incrementally.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CredentialError;
use crate::keystore::atomic_write;
use crate::ports::DepositMessageRootPort;

/// Schema marker the external verification service expects on each record
pub const DEPOSIT_RECORD_SCHEMA_VERSION: u32 = 1;

/// One validator deposit record
///
/// Byte fields serialize as 0x-prefixed lowercase hex.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositRecord {
    #[serde(rename = "pubkey", with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub withdrawal_credentials: Vec<u8>,
    /// Declared amount in gwei. Recorded for interoperability, ignored for
    /// commitment purposes.
    #[serde(rename = "amount")]
    pub amount_gwei: u64,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(rename = "deposit_data_root", with = "hex_bytes")]
    pub deposit_message_root: Vec<u8>,
    pub schema_version: u32,
}

/// Append-only batch of deposit records backed by one JSON file
pub struct DepositRecordAggregator {
    batch_path: PathBuf,
    records: Vec<DepositRecord>,
    deposit_amount_gwei: u64,
    root_port: Arc<dyn DepositMessageRootPort>,
}

impl DepositRecordAggregator {
    /// Open the aggregator, loading an existing batch file if present.
    /// A corrupt batch file is a `PersistFailure`; recover by calling
    /// `regenerate_all` with the currently-held keys.
    pub fn open(
        batch_path: &Path,
        deposit_amount_gwei: u64,
        root_port: Arc<dyn DepositMessageRootPort>,
    ) -> Result<Self, CredentialError> {
        let records = if batch_path.exists() {
            let raw = fs::read(batch_path).map_err(|e| CredentialError::PersistFailure {
                file: batch_path.display().to_string(),
                reason: format!("failed to read deposit batch: {}", e),
            })?;
            serde_json::from_slice(&raw).map_err(|e| CredentialError::PersistFailure {
                file: batch_path.display().to_string(),
                reason: format!("malformed deposit batch (regenerate to recover): {}", e),
            })?
        } else {
            Vec::new()
        };

        Ok(Self {
            batch_path: batch_path.to_path_buf(),
            records,
            deposit_amount_gwei,
            root_port,
        })
    }

    /// Append one record, recomputing its deposit-message root with the
    /// fixed protocol amount via the external SSZ capability.
    pub fn append(
        &mut self,
        public_key: Vec<u8>,
        withdrawal_credentials: [u8; 32],
        signature: Vec<u8>,
    ) -> Result<DepositRecord, CredentialError> {
        let record = self.build_record(public_key, withdrawal_credentials, signature)?;
        self.records.push(record.clone());
        debug!(
            "Appended deposit record for {} (batch size {})",
            hex::encode(&record.public_key),
            self.records.len()
        );
        Ok(record)
    }

    /// Rebuild the entire batch from scratch, in the given key order, and
    /// replace the batch file wholesale. Idempotent: an unchanged key set
    /// yields a byte-identical file.
    pub fn regenerate_all(
        &mut self,
        keys: &[(Vec<u8>, [u8; 32], Vec<u8>)],
    ) -> Result<(), CredentialError> {
        let mut records = Vec::with_capacity(keys.len());
        for (public_key, withdrawal_credentials, signature) in keys {
            records.push(self.build_record(
                public_key.clone(),
                *withdrawal_credentials,
                signature.clone(),
            )?);
        }
        self.records = records;
        self.save()?;
        info!(
            "Regenerated deposit batch with {} records at {}",
            self.records.len(),
            self.batch_path.display()
        );
        Ok(())
    }

    /// Persist the current batch with write-new-then-atomic-rename
    pub fn save(&self) -> Result<(), CredentialError> {
        let json = serde_json::to_vec_pretty(&self.records).map_err(|e| {
            CredentialError::PersistFailure {
                file: self.batch_path.display().to_string(),
                reason: format!("failed to serialize deposit batch: {}", e),
            }
        })?;
        atomic_write(&self.batch_path, &json)
    }

    /// Consistent snapshot of the batch for commitment computation
    pub fn snapshot(&self) -> Vec<DepositRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn build_record(
        &self,
        public_key: Vec<u8>,
        withdrawal_credentials: [u8; 32],
        signature: Vec<u8>,
    ) -> Result<DepositRecord, CredentialError> {
        let root = self.root_port.deposit_message_root(
            &public_key,
            &withdrawal_credentials,
            self.deposit_amount_gwei,
            &signature,
        )?;
        Ok(DepositRecord {
            public_key,
            withdrawal_credentials: withdrawal_credentials.to_vec(),
            amount_gwei: self.deposit_amount_gwei,
            signature,
            deposit_message_root: root.to_vec(),
            schema_version: DEPOSIT_RECORD_SCHEMA_VERSION,
        })
    }
}

/// 0x-prefixed hex (de)serialization for byte fields
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
