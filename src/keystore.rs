// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Encrypted Keystore Store
//!
//! Encrypts validator secret keys at rest, one JSON file per public key.
//! The scheme is EIP-2335-shaped: a memory-hard scrypt KDF stretches the
//! store passphrase, a SHA-256 checksum binds the derived key to the
//! ciphertext, and the payload cipher is AES-256-GCM.
//!
//! ## File layout
//!
//! ```text
//! <keystore_dir>/
//!   keystore-password.txt      # store passphrase sidecar, mode 0600
//!   <pubkey-hex>.json          # one entry per key, lowercase hex, no 0x
//! ```
//!
//! ## Error discipline
//!
//! - Wrong passphrase or corrupted cipher payload: `DecryptionFailure`
//! - Decrypts fine but the recovered key derives a different public key:
//!   `PubkeyMismatch` (keystore corruption, never silent)
//! - Existing file with different contents on `store`: `EncryptionFailure`
//!   (no silent overwrite)

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CredentialError;

/// Keystore schema version written to every entry
pub const KEYSTORE_VERSION: u32 = 1;

/// scrypt cost parameters (EIP-2335 reference values): N=2^18, r=8, p=1
pub const SCRYPT_LOG_N: u8 = 18;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;
pub const SCRYPT_DKLEN: usize = 32;

const PASSWORD_SIDECAR: &str = "keystore-password.txt";
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 32;

/// scrypt parameters as persisted in the entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    pub dklen: u32,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    /// Salt as lowercase hex
    pub salt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfModule {
    /// Always "scrypt"
    pub function: String,
    pub params: KdfParams,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChecksumModule {
    /// Always "sha256"
    pub function: String,
    /// sha256(dk[16..32] || ciphertext) as hex
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CipherModule {
    /// Always "aes-256-gcm"
    pub function: String,
    /// 12-byte nonce as hex
    pub nonce: String,
    /// Ciphertext plus 16-byte auth tag as hex
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CryptoModule {
    pub kdf: KdfModule,
    pub checksum: ChecksumModule,
    pub cipher: CipherModule,
}

/// One encrypted secret key plus the metadata needed to decrypt it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedKeystoreEntry {
    pub crypto: CryptoModule,
    pub version: u32,
    pub uuid: Uuid,
    /// Derivation path, immutable once assigned
    pub path: String,
    /// Lowercase hex, no 0x prefix
    pub pubkey: String,
}

/// Directory-backed store of encrypted keystore entries
#[derive(Clone)]
pub struct KeystoreStore {
    dir: PathBuf,
    passphrase: Zeroizing<String>,
    scrypt_log_n: u8,
}

impl KeystoreStore {
    /// Open the store at `dir`, creating it and its passphrase sidecar on
    /// first use. An existing store whose sidecar is missing surfaces
    /// `PasswordRequired` rather than minting a new passphrase over live
    /// entries.
    pub fn open(dir: &Path) -> Result<Self, CredentialError> {
        fs::create_dir_all(dir).map_err(|e| CredentialError::PersistFailure {
            file: dir.display().to_string(),
            reason: format!("failed to create keystore directory: {}", e),
        })?;

        let sidecar = dir.join(PASSWORD_SIDECAR);
        let passphrase = if sidecar.exists() {
            let raw = fs::read_to_string(&sidecar).map_err(|e| CredentialError::PersistFailure {
                file: sidecar.display().to_string(),
                reason: format!("failed to read passphrase sidecar: {}", e),
            })?;
            Zeroizing::new(raw.trim().to_string())
        } else {
            if has_entries(dir) {
                return Err(CredentialError::PasswordRequired {
                    dir: dir.display().to_string(),
                });
            }
            let passphrase = generate_passphrase();
            write_sidecar(&sidecar, &passphrase)?;
            info!("Generated new keystore passphrase sidecar at {}", sidecar.display());
            passphrase
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            passphrase,
            scrypt_log_n: SCRYPT_LOG_N,
        })
    }

    /// Override the scrypt cost for newly written entries. Existing entries
    /// always decrypt with the parameters recorded in their own file.
    /// Intended for tests, where N=2^18 is prohibitively slow.
    pub fn with_scrypt_log_n(mut self, log_n: u8) -> Self {
        self.scrypt_log_n = log_n;
        self
    }

    /// Encrypt and persist one secret key
    ///
    /// Retry-safe for the dual-write flow: if a file for this public key
    /// already exists and decrypts to the same secret with the same path,
    /// the call is an idempotent no-op returning the existing entry. An
    /// existing file with different contents is an error.
    pub fn store(
        &self,
        secret_key: &[u8],
        derivation_path: &str,
        public_key_hex: &str,
    ) -> Result<EncryptedKeystoreEntry, CredentialError> {
        let pubkey = normalize_hex(public_key_hex);
        let file = self.entry_path(&pubkey);

        if file.exists() {
            let existing = self.read_entry(&pubkey)?;
            let decrypted = self.decrypt_entry(&existing, &pubkey)?;
            if decrypted.as_slice() == secret_key && existing.path == derivation_path {
                debug!("Keystore entry for {} already present, store is a no-op", pubkey);
                return Ok(existing);
            }
            return Err(CredentialError::EncryptionFailure {
                public_key: pubkey,
                reason: format!(
                    "keystore file {} already exists with different contents",
                    file.display()
                ),
            });
        }

        let entry = self.encrypt(secret_key, derivation_path, &pubkey)?;
        let json =
            serde_json::to_vec_pretty(&entry).map_err(|e| CredentialError::EncryptionFailure {
                public_key: pubkey.clone(),
                reason: format!("failed to serialize keystore entry: {}", e),
            })?;
        atomic_write(&file, &json)?;
        info!("Stored encrypted keystore entry for {} at {}", pubkey, file.display());
        Ok(entry)
    }

    /// Decrypt the secret key stored for `public_key_hex`
    ///
    /// `derive_public` re-derives the public key from the recovered secret;
    /// a mismatch against the requested key is `PubkeyMismatch`, kept
    /// distinct from a wrong-passphrase `DecryptionFailure`.
    pub fn load<F>(
        &self,
        public_key_hex: &str,
        derive_public: F,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError>
    where
        F: Fn(&[u8]) -> Option<Vec<u8>>,
    {
        let pubkey = normalize_hex(public_key_hex);
        let entry = self.read_entry(&pubkey)?;
        let secret = self.decrypt_entry(&entry, &pubkey)?;

        let derived = derive_public(&secret)
            .map(|bytes| hex::encode(&bytes))
            .unwrap_or_else(|| "<underivable>".to_string());
        if derived != pubkey {
            return Err(CredentialError::PubkeyMismatch {
                expected: pubkey.clone(),
                derived,
                file: self.entry_path(&pubkey).display().to_string(),
            });
        }
        Ok(secret)
    }

    /// Lazy, restartable scan of the stored public keys
    ///
    /// Filenames that do not parse as `<hex>.json` are skipped with a debug
    /// log, never fatal.
    pub fn list_stored_public_keys(
        &self,
    ) -> Result<impl Iterator<Item = String>, CredentialError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CredentialError::PersistFailure {
            file: self.dir.display().to_string(),
            reason: format!("failed to scan keystore directory: {}", e),
        })?;
        Ok(entries.filter_map(|entry| {
            let path = entry.ok()?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return None;
            }
            let stem = path.file_stem()?.to_str()?;
            if stem.len() % 2 == 0 && !stem.is_empty() && hex::decode(stem).is_ok() {
                Some(stem.to_string())
            } else {
                debug!("Skipping unparseable keystore filename: {}", path.display());
                None
            }
        }))
    }

    /// Directory this store reads and writes
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, pubkey: &str) -> PathBuf {
        self.dir.join(format!("{}.json", pubkey))
    }

    fn read_entry(&self, pubkey: &str) -> Result<EncryptedKeystoreEntry, CredentialError> {
        let file = self.entry_path(pubkey);
        let raw = fs::read(&file).map_err(|_| CredentialError::NotFound {
            public_key: pubkey.to_string(),
            dir: self.dir.display().to_string(),
        })?;
        serde_json::from_slice(&raw).map_err(|e| CredentialError::DecryptionFailure {
            public_key: pubkey.to_string(),
            reason: format!("malformed keystore file {}: {}", file.display(), e),
        })
    }

    fn encrypt(
        &self,
        secret_key: &[u8],
        derivation_path: &str,
        pubkey: &str,
    ) -> Result<EncryptedKeystoreEntry, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let mut dk = derive_store_key(&self.passphrase, &salt, self.scrypt_log_n, pubkey)?;

        let cipher = Aes256Gcm::new_from_slice(&dk).map_err(|e| {
            CredentialError::EncryptionFailure {
                public_key: pubkey.to_string(),
                reason: format!("failed to create cipher: {}", e),
            }
        })?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret_key)
            .map_err(|e| CredentialError::EncryptionFailure {
                public_key: pubkey.to_string(),
                reason: format!("AEAD encryption failed: {}", e),
            })?;

        let checksum = checksum_message(&dk, &ciphertext);
        dk.zeroize();

        Ok(EncryptedKeystoreEntry {
            crypto: CryptoModule {
                kdf: KdfModule {
                    function: "scrypt".to_string(),
                    params: KdfParams {
                        dklen: SCRYPT_DKLEN as u32,
                        n: 1 << self.scrypt_log_n,
                        r: SCRYPT_R,
                        p: SCRYPT_P,
                        salt: hex::encode(salt),
                    },
                },
                checksum: ChecksumModule {
                    function: "sha256".to_string(),
                    message: hex::encode(checksum),
                },
                cipher: CipherModule {
                    function: "aes-256-gcm".to_string(),
                    nonce: hex::encode(nonce),
                    message: hex::encode(&ciphertext),
                },
            },
            version: KEYSTORE_VERSION,
            uuid: Uuid::new_v4(),
            path: derivation_path.to_string(),
            pubkey: pubkey.to_string(),
        })
    }

    fn decrypt_entry(
        &self,
        entry: &EncryptedKeystoreEntry,
        pubkey: &str,
    ) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
        let decryption_failure = |reason: String| CredentialError::DecryptionFailure {
            public_key: pubkey.to_string(),
            reason,
        };

        let salt = hex::decode(&entry.crypto.kdf.params.salt)
            .map_err(|e| decryption_failure(format!("invalid salt hex: {}", e)))?;
        let nonce = hex::decode(&entry.crypto.cipher.nonce)
            .map_err(|e| decryption_failure(format!("invalid nonce hex: {}", e)))?;
        let ciphertext = hex::decode(&entry.crypto.cipher.message)
            .map_err(|e| decryption_failure(format!("invalid cipher payload hex: {}", e)))?;
        if nonce.len() != NONCE_LEN {
            return Err(decryption_failure(format!(
                "invalid nonce size: expected {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }

        let n = entry.crypto.kdf.params.n;
        if n == 0 || !n.is_power_of_two() {
            return Err(decryption_failure(format!(
                "invalid scrypt n parameter: {}",
                n
            )));
        }
        let log_n = n.trailing_zeros() as u8;
        let mut dk = derive_store_key(&self.passphrase, &salt, log_n, pubkey)?;

        // Checksum binds the derived key to the ciphertext; a mismatch means
        // wrong passphrase or a tampered payload, not a pubkey problem.
        let expected = checksum_message(&dk, &ciphertext);
        if hex::encode(expected) != entry.crypto.checksum.message {
            dk.zeroize();
            return Err(decryption_failure(
                "checksum verification failed (wrong passphrase or corrupted payload)".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&dk)
            .map_err(|e| decryption_failure(format!("failed to create cipher: {}", e)))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| {
                decryption_failure("AEAD authentication failed".to_string())
            });
        dk.zeroize();
        Ok(Zeroizing::new(plaintext?))
    }
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| {
            entries.any(|e| {
                e.map(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"))
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

fn generate_passphrase() -> Zeroizing<String> {
    let mut raw = [0u8; 32];
    OsRng.fill_bytes(&mut raw);
    Zeroizing::new(hex::encode(raw))
}

fn write_sidecar(path: &Path, passphrase: &str) -> Result<(), CredentialError> {
    let persist_failure = |reason: String| CredentialError::PersistFailure {
        file: path.display().to_string(),
        reason,
    };
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| persist_failure(format!("failed to create passphrase sidecar: {}", e)))?;
    file.write_all(passphrase.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| persist_failure(format!("failed to write passphrase sidecar: {}", e)))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| persist_failure(format!("failed to restrict sidecar permissions: {}", e)))
}

/// scrypt-stretch the store passphrase. The public key is not mixed in; the
/// per-entry salt alone differentiates derived keys.
fn derive_store_key(
    passphrase: &str,
    salt: &[u8],
    log_n: u8,
    pubkey: &str,
) -> Result<[u8; SCRYPT_DKLEN], CredentialError> {
    let params = ScryptParams::new(log_n, SCRYPT_R, SCRYPT_P, SCRYPT_DKLEN).map_err(
        |e| CredentialError::EncryptionFailure {
            public_key: pubkey.to_string(),
            reason: format!("invalid scrypt parameters: {}", e),
        },
    )?;
    let mut dk = [0u8; SCRYPT_DKLEN];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut dk).map_err(|e| {
        CredentialError::EncryptionFailure {
            public_key: pubkey.to_string(),
            reason: format!("scrypt derivation failed: {}", e),
        }
    })?;
    Ok(dk)
}

fn checksum_message(dk: &[u8; SCRYPT_DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&dk[16..32]);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

fn normalize_hex(pubkey: &str) -> String {
    pubkey.trim_start_matches("0x").to_ascii_lowercase()
}

/// Atomic replace: write a temp file in the same directory, fsync, rename
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), CredentialError> {
    let persist_failure = |reason: String| CredentialError::PersistFailure {
        file: path.display().to_string(),
        reason,
    };
    let dir = path
        .parent()
        .ok_or_else(|| persist_failure("path has no parent directory".to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| persist_failure(format!("failed to create temp file: {}", e)))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| persist_failure(format!("failed to write temp file: {}", e)))?;
    tmp.persist(path)
        .map_err(|e| persist_failure(format!("failed to rename temp file: {}", e)))?;
    Ok(())
}
