// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Merkle Commitment Builder
//!
//! Computes the commitment root the external verification service checks
//! before accepting a deposit batch. The construction is non-standard and
//! must be reproduced bit-exactly:
//!
//! 1. Recompute each record's deposit-message root with the fixed protocol
//!    amount (stored roots are never trusted).
//! 2. `entry_data = pubkey || signature || deposit_message_root`
//! 3. ABI-tuple-encode `(bytes entry_data, uint256 index)` with the
//!    record's position in the original caller-supplied order.
//! 4. `leaf = keccak256(keccak256(encoded))` — double hash.
//! 5. Sort leaves ascending by raw bytes; original order is discarded.
//! 6. Lay the sorted leaves at the tail of a `2n - 1` slot array, in
//!    reverse sorted order, and hash parents as
//!    `keccak256(min(left, right) || max(left, right))`.
//! 7. Root is slot 0.
//!
//! Because the leaves are sorted before assembly, the root is invariant
//! under any permutation of the (record, index) pairs. A zero-record batch
//! has no defined tree shape and is rejected with `EmptyBatch`.

use std::sync::Arc;

use ethers::abi::{encode, Token};
use ethers::types::U256;
use ethers::utils::keccak256;
use tracing::debug;

use crate::deposit::DepositRecord;
use crate::error::CredentialError;
use crate::ports::DepositMessageRootPort;

/// Stateless builder for deposit batch commitment roots
pub struct MerkleCommitmentBuilder {
    deposit_amount_gwei: u64,
    root_port: Arc<dyn DepositMessageRootPort>,
}

impl MerkleCommitmentBuilder {
    pub fn new(deposit_amount_gwei: u64, root_port: Arc<dyn DepositMessageRootPort>) -> Self {
        Self {
            deposit_amount_gwei,
            root_port,
        }
    }

    /// Commitment root over a snapshot of deposit records in their
    /// original batch order. Each record's position becomes the `uint256`
    /// index baked into its leaf.
    pub fn commitment_root(
        &self,
        records: &[DepositRecord],
    ) -> Result<[u8; 32], CredentialError> {
        let indexed: Vec<(usize, &DepositRecord)> = records.iter().enumerate().collect();
        self.commitment_root_indexed(&indexed)
    }

    /// Commitment root over records carrying their original batch indices.
    /// The leaf sort makes the result invariant under any permutation of
    /// the (index, record) pairs.
    pub fn commitment_root_indexed(
        &self,
        records: &[(usize, &DepositRecord)],
    ) -> Result<[u8; 32], CredentialError> {
        if records.is_empty() {
            return Err(CredentialError::EmptyBatch);
        }

        let mut leaves = Vec::with_capacity(records.len());
        for (index, record) in records {
            leaves.push(self.leaf(record, *index)?);
        }

        let root = assemble_tree(leaves);
        debug!("Computed commitment root over {} deposit records", records.len());
        Ok(root)
    }

    /// Double-keccak leaf over the ABI-encoded `(entry_data, index)` tuple
    fn leaf(&self, record: &DepositRecord, index: usize) -> Result<[u8; 32], CredentialError> {
        let withdrawal_credentials: [u8; 32] = record
            .withdrawal_credentials
            .as_slice()
            .try_into()
            .map_err(|_| CredentialError::PersistFailure {
                file: "<deposit batch>".to_string(),
                reason: format!(
                    "record {} has {}-byte withdrawal credentials, expected 32",
                    index,
                    record.withdrawal_credentials.len()
                ),
            })?;

        // Never trust the stored root: recompute with the fixed amount.
        let root = self.root_port.deposit_message_root(
            &record.public_key,
            &withdrawal_credentials,
            self.deposit_amount_gwei,
            &record.signature,
        )?;

        let mut entry_data =
            Vec::with_capacity(record.public_key.len() + record.signature.len() + root.len());
        entry_data.extend_from_slice(&record.public_key);
        entry_data.extend_from_slice(&record.signature);
        entry_data.extend_from_slice(&root);

        let encoded = encode(&[Token::Bytes(entry_data), Token::Uint(U256::from(index))]);
        Ok(keccak256(keccak256(encoded)))
    }
}

/// Sort the leaves, lay them at the tail of a `2n - 1` slot array in
/// reverse sorted order, then fold parents down to slot 0.
fn assemble_tree(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    leaves.sort_unstable();

    let n = leaves.len();
    let tree_len = 2 * n - 1;
    let mut tree = vec![[0u8; 32]; tree_len];
    for (i, leaf) in leaves.iter().enumerate() {
        tree[tree_len - 1 - i] = *leaf;
    }

    // Internal slots are 0..n-1; children of slot k sit at 2k+1 and 2k+2.
    for k in (0..tree_len - n).rev() {
        let left = tree[2 * k + 1];
        let right = tree[2 * k + 2];
        tree[k] = hash_sorted_pair(left, right);
    }

    tree[0]
}

/// Hash an unordered pair: `keccak256(min || max)` on raw bytes
fn hash_sorted_pair(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(&lo);
    buf[32..].copy_from_slice(&hi);
    keccak256(buf)
}
