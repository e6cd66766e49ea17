//! Key derivation and AES-256-GCM sealing.

use crate::{KeyFileRecord, KeyFileStatus};
use aes_gcm::Aes256Gcm;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bastion_core::{EncryptionConfig, MIN_KDF_ITERATIONS};
use bastion_error::{CryptoError, CryptoErrorKind, CryptoResult};
use rand::RngCore;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Length of the AES-256 key in bytes.
pub const KEY_LEN: usize = 32;
/// Length of the PBKDF2 salt in bytes.
pub const SALT_LEN: usize = 16;
/// Length of the GCM nonce prepended to every ciphertext.
pub const NONCE_LEN: usize = 12;

/// Seals and opens credential values under the master key.
///
/// Ciphertext is `base64(nonce || ciphertext || tag)` with a fresh random
/// nonce per call.
pub struct EncryptionProvider {
    key: [u8; KEY_LEN],
    key_file: Option<PathBuf>,
}

impl std::fmt::Debug for EncryptionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionProvider")
            .field("key", &"<redacted>")
            .field("key_file", &self.key_file)
            .finish()
    }
}

impl EncryptionProvider {
    /// Open the provider described by `config`, reading the passphrase from
    /// the configured environment variable.
    pub fn open_from_env(config: &EncryptionConfig) -> CryptoResult<Self> {
        let passphrase = std::env::var(config.passphrase_env()).map_err(|_| {
            CryptoError::new(CryptoErrorKind::InvalidConfig(format!(
                "Environment variable {} is not set",
                config.passphrase_env()
            )))
        })?;
        Self::open(config, &passphrase)
    }

    /// Open the provider, creating the key file on first use.
    ///
    /// An existing key file is never rewritten: the key is re-derived from
    /// `passphrase` and the stored salt and must match the stored key.
    #[instrument(skip(config, passphrase), fields(key_file = %config.key_file().display()))]
    pub fn open(config: &EncryptionConfig, passphrase: &str) -> CryptoResult<Self> {
        if passphrase.is_empty() {
            return Err(CryptoError::new(CryptoErrorKind::InvalidConfig(
                "Passphrase must not be empty".to_string(),
            )));
        }
        let path = config.key_file();
        if path.exists() {
            Self::reopen(path, passphrase)
        } else {
            Self::initialize(path, passphrase, *config.iterations())
        }
    }

    fn initialize(path: &Path, passphrase: &str, iterations: u32) -> CryptoResult<Self> {
        check_iterations(iterations)?;
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(passphrase, &salt, iterations);

        KeyFileRecord::new(iterations, &salt, &key).create(path)?;
        info!(iterations, "Created master key file");
        Ok(Self {
            key,
            key_file: Some(path.to_path_buf()),
        })
    }

    fn reopen(path: &Path, passphrase: &str) -> CryptoResult<Self> {
        let record = KeyFileRecord::read(path)?;
        check_iterations(*record.iterations())?;
        let salt = record.salt_bytes()?;
        let stored = record.key_bytes()?;
        if stored.len() != KEY_LEN {
            return Err(CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Stored key has {} bytes, expected {}",
                stored.len(),
                KEY_LEN
            ))));
        }

        let key = derive_key(passphrase, &salt, *record.iterations());
        if !constant_time_eq::constant_time_eq(&key, &stored) {
            warn!("Passphrase does not derive the stored key");
            return Err(CryptoError::new(CryptoErrorKind::PassphraseMismatch));
        }
        debug!("Reopened master key file");
        Ok(Self {
            key,
            key_file: Some(path.to_path_buf()),
        })
    }

    /// Provider over an explicit key, without a key file.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            key,
            key_file: None,
        }
    }

    /// Provider over a random key, without a key file.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Seal plaintext.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .map_err(|e| {
                CryptoError::new(CryptoErrorKind::Encryption(format!("AES-256-GCM: {}", e)))
            })?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open ciphertext produced by [`EncryptionProvider::encrypt`].
    ///
    /// Fails with `DecryptionFailure` on malformed, truncated, tampered or
    /// foreign input.
    pub fn decrypt(&self, sealed: &str) -> CryptoResult<Vec<u8>> {
        let data = STANDARD.decode(sealed).map_err(|e| {
            CryptoError::new(CryptoErrorKind::DecryptionFailure(format!(
                "Ciphertext is not valid base64: {}",
                e
            )))
        })?;
        if data.len() < NONCE_LEN {
            return Err(CryptoError::new(CryptoErrorKind::DecryptionFailure(
                "Ciphertext is shorter than the nonce".to_string(),
            )));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CryptoError::new(CryptoErrorKind::DecryptionFailure(
                    "Authentication tag mismatch".to_string(),
                ))
            })
    }

    /// Seal a UTF-8 secret.
    pub fn encrypt_str(&self, plaintext: &str) -> CryptoResult<String> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Open a sealed UTF-8 secret.
    pub fn decrypt_to_string(&self, sealed: &str) -> CryptoResult<String> {
        let bytes = self.decrypt(sealed)?;
        String::from_utf8(bytes).map_err(|_| {
            CryptoError::new(CryptoErrorKind::DecryptionFailure(
                "Plaintext is not valid UTF-8".to_string(),
            ))
        })
    }

    /// Path of the backing key file, if any.
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    /// Current on-disk state of the key file.
    pub fn key_file_status(&self) -> KeyFileStatus {
        match &self.key_file {
            Some(path) => KeyFileStatus::inspect(path),
            None => KeyFileStatus::none(),
        }
    }
}

fn check_iterations(iterations: u32) -> CryptoResult<()> {
    if iterations < MIN_KDF_ITERATIONS {
        return Err(CryptoError::new(CryptoErrorKind::InvalidConfig(format!(
            "PBKDF2 iterations must be at least {}, got {}",
            MIN_KDF_ITERATIONS, iterations
        ))));
    }
    Ok(())
}

fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<sha2::Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);
    key
}
