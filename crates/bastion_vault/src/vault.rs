//! Credential vault.

use crate::request::NewCredentialMeta;
use crate::{CredentialAccess, GrantedCredential, NewCredential, SecretValue};
use bastion_core::{
    Credential, CredentialBuilder, CredentialSummary, EventDraft, EventType, SYSTEM_SOURCE_IP,
    ThreatLevel,
};
use bastion_crypto::EncryptionProvider;
use bastion_error::{VaultError, VaultErrorKind, VaultResult};
use bastion_events::EventLog;
use bastion_storage::SecurityStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Stores, releases and retires encrypted credentials.
///
/// Read-modify-write sequences on credential records are serialized so that
/// concurrent releases never lose a usage count.
#[derive(Debug)]
pub struct CredentialVault {
    store: Arc<dyn SecurityStore>,
    crypto: Arc<EncryptionProvider>,
    events: Arc<EventLog>,
    writes: Mutex<()>,
}

impl CredentialVault {
    /// Create a vault over the given store, key and event log.
    pub fn new(
        store: Arc<dyn SecurityStore>,
        crypto: Arc<EncryptionProvider>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            store,
            crypto,
            events,
            writes: Mutex::new(()),
        }
    }

    /// Seal and persist a new credential. Returns its id.
    #[instrument(skip(self, request), fields(service = %request.service_name()))]
    pub async fn store(&self, request: NewCredential) -> VaultResult<String> {
        let (secret, meta) = request.into_parts();
        let NewCredentialMeta {
            service_name,
            credential_type,
            access_level,
            expires_at,
            allowed_ips,
            allowed_domains,
            rate_limit_profile,
        } = meta;

        let encrypted_value = self.crypto.encrypt_str(secret.expose())?;
        drop(secret);

        let id = uuid::Uuid::new_v4().to_string();
        let credential = CredentialBuilder::default()
            .id(id.clone())
            .service_name(service_name)
            .credential_type(credential_type)
            .encrypted_value(encrypted_value)
            .created_at(Utc::now())
            .expires_at(expires_at)
            .access_level(access_level)
            .allowed_ips(allowed_ips)
            .allowed_domains(allowed_domains)
            .rate_limit_profile(rate_limit_profile)
            .build()
            .map_err(|e| VaultError::new(VaultErrorKind::InvalidCredential(e.to_string())))?;

        self.store.insert_credential(&credential).await?;
        self.events
            .append(
                EventDraft::new(EventType::CredentialStored, ThreatLevel::Info, SYSTEM_SOURCE_IP)
                    .with_credential_id(id.clone())
                    .with_detail("service_name", credential.service_name().clone())
                    .with_detail("access_level", credential.access_level().to_string()),
            )
            .await?;
        info!(credential_id = %id, "Credential stored");
        Ok(id)
    }

    /// Release a credential to a caller.
    ///
    /// Checks, in order: the credential exists and is active, it has not
    /// expired, and `source_ip` passes its allow-list.
    pub async fn get(&self, credential_id: &str, source_ip: &str) -> VaultResult<CredentialAccess> {
        self.release(credential_id, source_ip, None).await
    }

    /// Release a credential for a call to `host`, additionally enforcing the
    /// credential's domain allow-list.
    pub async fn get_for_host(
        &self,
        credential_id: &str,
        source_ip: &str,
        host: &str,
    ) -> VaultResult<CredentialAccess> {
        self.release(credential_id, source_ip, Some(host)).await
    }

    #[instrument(skip(self), fields(outcome))]
    async fn release(
        &self,
        credential_id: &str,
        source_ip: &str,
        host: Option<&str>,
    ) -> VaultResult<CredentialAccess> {
        let _guard = self.writes.lock().await;
        let now = Utc::now();
        let endpoint = host.unwrap_or_default();

        let credential = match self.store.get_credential(credential_id).await? {
            Some(credential) if *credential.active() => credential,
            _ => {
                warn!("Credential not found or inactive");
                tracing::Span::current().record("outcome", "not_found");
                self.log_denial(
                    EventType::CredentialNotFound,
                    ThreatLevel::Warning,
                    credential_id,
                    source_ip,
                    endpoint,
                    404,
                )
                .await?;
                return Ok(CredentialAccess::NotFound);
            }
        };

        if credential.is_expired_at(now) {
            warn!("Credential expired");
            tracing::Span::current().record("outcome", "expired");
            self.log_denial(
                EventType::CredentialExpired,
                ThreatLevel::Warning,
                credential_id,
                source_ip,
                endpoint,
                401,
            )
            .await?;
            return Ok(CredentialAccess::Expired);
        }

        if !credential.permits_ip(source_ip) {
            warn!("Source IP outside credential allow-list");
            tracing::Span::current().record("outcome", "ip_denied");
            self.log_denial(
                EventType::IpAccessDenied,
                ThreatLevel::High,
                credential_id,
                source_ip,
                endpoint,
                403,
            )
            .await?;
            return Ok(CredentialAccess::AccessDenied {
                source_ip: source_ip.to_string(),
            });
        }

        if let Some(host) = host.filter(|h| !credential.permits_host(h)) {
            warn!(host, "Target host outside credential domain allow-list");
            tracing::Span::current().record("outcome", "domain_denied");
            self.log_denial(
                EventType::DomainAccessDenied,
                ThreatLevel::High,
                credential_id,
                source_ip,
                endpoint,
                403,
            )
            .await?;
            return Ok(CredentialAccess::DomainDenied {
                host: host.to_string(),
            });
        }

        let secret = match self.crypto.decrypt_to_string(credential.encrypted_value()) {
            Ok(plaintext) => SecretValue::from(plaintext),
            Err(e) => {
                error!(error = %e, "Stored credential failed to decrypt");
                self.events
                    .append(
                        EventDraft::new(
                            EventType::Custom("credential_decryption_failed".to_string()),
                            ThreatLevel::Critical,
                            source_ip,
                        )
                        .with_credential_id(credential_id)
                        .with_endpoint(endpoint)
                        .with_action_taken("aborted"),
                    )
                    .await?;
                return Err(VaultError::from(e));
            }
        };

        let mut credential = credential;
        credential.record_use(now);
        self.store.update_credential(&credential).await?;

        self.events
            .append(
                EventDraft::new(EventType::CredentialAccessed, ThreatLevel::Info, source_ip)
                    .with_credential_id(credential_id)
                    .with_endpoint(endpoint)
                    .with_action_taken("granted")
                    .with_detail("usage_count", *credential.usage_count()),
            )
            .await?;
        tracing::Span::current().record("outcome", "granted");
        debug!(usage_count = *credential.usage_count(), "Credential released");

        Ok(CredentialAccess::Granted(Box::new(GrantedCredential {
            credential,
            secret,
        })))
    }

    async fn log_denial(
        &self,
        event_type: EventType,
        level: ThreatLevel,
        credential_id: &str,
        source_ip: &str,
        endpoint: &str,
        code: u16,
    ) -> VaultResult<()> {
        let action = if level >= ThreatLevel::High {
            "blocked"
        } else {
            "denied"
        };
        self.events
            .append(
                EventDraft::new(event_type, level, source_ip)
                    .with_credential_id(credential_id)
                    .with_endpoint(endpoint)
                    .with_response_code(code)
                    .with_action_taken(action),
            )
            .await?;
        Ok(())
    }

    /// Retire a credential. The record is kept for audit history.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, credential_id: &str) -> VaultResult<()> {
        let _guard = self.writes.lock().await;
        let mut credential = self.require(credential_id).await?;
        if !*credential.active() {
            debug!("Credential already inactive");
            return Ok(());
        }
        credential.deactivate();
        self.store.update_credential(&credential).await?;
        self.events
            .append(
                EventDraft::new(
                    EventType::CredentialDeactivated,
                    ThreatLevel::Info,
                    SYSTEM_SOURCE_IP,
                )
                .with_credential_id(credential_id),
            )
            .await?;
        info!("Credential deactivated");
        Ok(())
    }

    /// Replace the secret of an active credential.
    #[instrument(skip(self, new_secret))]
    pub async fn rotate(
        &self,
        credential_id: &str,
        new_secret: impl Into<SecretValue>,
    ) -> VaultResult<()> {
        let new_secret = new_secret.into();
        if new_secret.is_empty() {
            return Err(VaultError::new(VaultErrorKind::InvalidCredential(
                "secret must not be empty".to_string(),
            )));
        }
        let _guard = self.writes.lock().await;
        let mut credential = self.require(credential_id).await?;
        if !*credential.active() {
            return Err(VaultError::new(VaultErrorKind::UnknownCredential(
                credential_id.to_string(),
            )));
        }

        let sealed = self.crypto.encrypt_str(new_secret.expose())?;
        drop(new_secret);
        credential.replace_value(sealed, Utc::now());
        self.store.update_credential(&credential).await?;
        self.events
            .append(
                EventDraft::new(EventType::CredentialRotated, ThreatLevel::Info, SYSTEM_SOURCE_IP)
                    .with_credential_id(credential_id),
            )
            .await?;
        info!("Credential rotated");
        Ok(())
    }

    /// Flag a credential so that audits report it until it is rotated.
    #[instrument(skip(self))]
    pub async fn mark_rotation_required(&self, credential_id: &str) -> VaultResult<()> {
        let _guard = self.writes.lock().await;
        let mut credential = self.require(credential_id).await?;
        credential.require_rotation();
        self.store.update_credential(&credential).await?;
        info!("Credential flagged for rotation");
        Ok(())
    }

    /// Whether the credential is older than `max_age_days` since creation or
    /// last rotation, or has been flagged for rotation.
    pub async fn is_rotation_due(&self, credential_id: &str, max_age_days: u32) -> VaultResult<bool> {
        let credential = self.require(credential_id).await?;
        Ok(credential.rotation_due_at(Utc::now(), max_age_days))
    }

    /// Metadata of every credential, active or retired.
    pub async fn list_metadata(&self) -> VaultResult<Vec<CredentialSummary>> {
        Ok(self
            .store
            .list_credentials()
            .await?
            .iter()
            .map(Credential::summary)
            .collect())
    }

    /// Number of active credentials.
    pub async fn active_count(&self) -> VaultResult<usize> {
        Ok(self
            .store
            .list_credentials()
            .await?
            .iter()
            .filter(|c| *c.active())
            .count())
    }

    async fn require(&self, credential_id: &str) -> VaultResult<Credential> {
        self.store
            .get_credential(credential_id)
            .await?
            .ok_or_else(|| VaultError::new(VaultErrorKind::UnknownCredential(credential_id.to_string())))
    }
}
