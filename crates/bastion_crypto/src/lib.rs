//! Encryption provider for the Bastion security gateway.
//!
//! A master key is derived once from a passphrase with PBKDF2-HMAC-SHA256 and
//! persisted together with its salt in an owner-only key file. Later starts
//! re-derive the key from the same passphrase and salt and refuse to run if it
//! does not match. Credentials are sealed with AES-256-GCM; tampered or foreign
//! ciphertext fails with a decryption error and never yields plaintext.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod key_file;
mod provider;

pub use key_file::{KeyFileRecord, KeyFileStatus};
pub use provider::{EncryptionProvider, KEY_LEN, NONCE_LEN, SALT_LEN};
