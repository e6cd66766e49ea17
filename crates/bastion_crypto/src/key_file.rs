//! On-disk key file.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bastion_error::{CryptoError, CryptoErrorKind, CryptoResult};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

const KEY_FILE_VERSION: u32 = 1;
const KDF_NAME: &str = "pbkdf2-hmac-sha256";

/// Serialized contents of the key file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct KeyFileRecord {
    version: u32,
    kdf: String,
    iterations: u32,
    salt: String,
    key: String,
}

impl KeyFileRecord {
    pub(crate) fn new(iterations: u32, salt: &[u8], key: &[u8]) -> Self {
        Self {
            version: KEY_FILE_VERSION,
            kdf: KDF_NAME.to_string(),
            iterations,
            salt: STANDARD.encode(salt),
            key: STANDARD.encode(key),
        }
    }

    pub(crate) fn salt_bytes(&self) -> CryptoResult<Vec<u8>> {
        decode_field("salt", &self.salt)
    }

    pub(crate) fn key_bytes(&self) -> CryptoResult<Vec<u8>> {
        decode_field("key", &self.key)
    }

    /// Read and parse a key file.
    pub(crate) fn read(path: &Path) -> CryptoResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        })?;
        let record: Self = serde_json::from_str(&content).map_err(|e| {
            CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            )))
        })?;
        if record.version != KEY_FILE_VERSION || record.kdf != KDF_NAME {
            return Err(CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Unsupported key file format: version {} kdf {}",
                record.version, record.kdf
            ))));
        }
        Ok(record)
    }

    /// Create the key file with owner-only permissions.
    ///
    /// Fails if the file already exists.
    pub(crate) fn create(&self, path: &Path) -> CryptoResult<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Failed to serialize key file: {}",
                e
            )))
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CryptoError::new(CryptoErrorKind::KeyFile(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(|e| {
            CryptoError::new(CryptoErrorKind::KeyFile(format!(
                "Failed to create {}: {}",
                path.display(),
                e
            )))
        })?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                CryptoError::new(CryptoErrorKind::KeyFile(format!(
                    "Failed to write {}: {}",
                    path.display(),
                    e
                )))
            })
    }
}

fn decode_field(name: &str, value: &str) -> CryptoResult<Vec<u8>> {
    STANDARD.decode(value).map_err(|e| {
        CryptoError::new(CryptoErrorKind::KeyFile(format!(
            "Key file field {} is not valid base64: {}",
            name, e
        )))
    })
}

/// Presence and permission state of the key file, as seen by the auditor.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct KeyFileStatus {
    /// Path of the key file, if the provider has one
    path: Option<PathBuf>,
    /// Whether the file exists
    exists: bool,
    /// Whether group and other have no access
    owner_only: bool,
}

impl KeyFileStatus {
    /// Status for a provider without a key file.
    pub fn none() -> Self {
        Self {
            path: None,
            exists: false,
            owner_only: false,
        }
    }

    /// Status with explicit values.
    pub fn new(path: Option<PathBuf>, exists: bool, owner_only: bool) -> Self {
        Self {
            path,
            exists,
            owner_only,
        }
    }

    /// Inspect a key file on disk.
    pub fn inspect(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        let exists = metadata.is_some();
        let owner_only = metadata.as_ref().is_some_and(is_owner_only);
        Self {
            path: Some(path.to_path_buf()),
            exists,
            owner_only,
        }
    }

    /// Whether the key is present and restricted.
    pub fn is_secure(&self) -> bool {
        self.exists && self.owner_only
    }
}

#[cfg(unix)]
fn is_owner_only(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o077 == 0
}

#[cfg(not(unix))]
fn is_owner_only(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}
