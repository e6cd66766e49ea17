//! Encryption error types.

/// Kinds of encryption errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CryptoErrorKind {
    /// The key file could not be read, written or parsed
    #[display("Key file error: {_0}")]
    KeyFile(String),
    /// PBKDF2 key derivation failed
    #[display("Key derivation failed: {_0}")]
    KeyDerivation(String),
    /// Encryption settings are unusable (e.g. too few iterations)
    #[display("Invalid encryption configuration: {_0}")]
    InvalidConfig(String),
    /// The supplied passphrase does not derive the persisted key
    #[display("Passphrase does not match the persisted key")]
    PassphraseMismatch,
    /// Sealing plaintext failed
    #[display("Encryption failed: {_0}")]
    Encryption(String),
    /// Ciphertext was tampered with, truncated, or sealed under another key
    #[display("Decryption failed: {_0}")]
    DecryptionFailure(String),
}

/// Encryption error with location tracking.
///
/// # Examples
///
/// ```
/// use bastion_error::{CryptoError, CryptoErrorKind};
///
/// let err = CryptoError::new(CryptoErrorKind::DecryptionFailure("tag mismatch".into()));
/// assert!(err.is_decryption_failure());
/// assert!(format!("{}", err).contains("tag mismatch"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Crypto Error: {} at line {} in {}", kind, line, file)]
pub struct CryptoError {
    /// The kind of error that occurred
    pub kind: CryptoErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl CryptoError {
    /// Create a new crypto error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: CryptoErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Whether this error signals corrupted or foreign ciphertext.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(self.kind, CryptoErrorKind::DecryptionFailure(_))
    }
}

/// Result type for encryption operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
