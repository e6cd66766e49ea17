//! Key file lifecycle tests for the encryption provider.

use bastion_core::EncryptionConfig;
use bastion_crypto::*;
use bastion_error::CryptoErrorKind;

fn config_in(dir: &tempfile::TempDir) -> EncryptionConfig {
    EncryptionConfig::default().with_key_file(dir.path().join("master.key"))
}

#[test]
fn test_first_open_creates_secure_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let provider = EncryptionProvider::open(&config_in(&dir), "correct horse").unwrap();

    let status = provider.key_file_status();
    assert!(*status.exists());
    #[cfg(unix)]
    assert!(status.is_secure());
}

#[test]
fn test_reopen_with_same_passphrase_reads_old_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let sealed = EncryptionProvider::open(&config, "correct horse")
        .unwrap()
        .encrypt_str("sk-live-123")
        .unwrap();

    let reopened = EncryptionProvider::open(&config, "correct horse").unwrap();
    assert_eq!(reopened.decrypt_to_string(&sealed).unwrap(), "sk-live-123");
}

#[test]
fn test_reopen_with_wrong_passphrase_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    EncryptionProvider::open(&config, "correct horse").unwrap();

    let err = EncryptionProvider::open(&config, "battery staple").unwrap_err();
    assert_eq!(err.kind, CryptoErrorKind::PassphraseMismatch);
}

#[test]
fn test_too_few_iterations_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir).with_iterations(10_000u32);
    let err = EncryptionProvider::open(&config, "correct horse").unwrap_err();
    assert!(matches!(err.kind, CryptoErrorKind::InvalidConfig(_)));
    assert!(!dir.path().join("master.key").exists());
}

#[test]
fn test_ephemeral_provider_has_no_key_file() {
    let provider = EncryptionProvider::ephemeral();
    assert!(provider.key_file().is_none());
    assert!(!provider.key_file_status().is_secure());
}
