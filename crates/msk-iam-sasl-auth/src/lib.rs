//! AWS_MSK_IAM SASL authentication: SigV4 request signing plus the STS
//! credential lifecycle a Kafka client needs to authenticate against an
//! MSK cluster using IAM roles instead of static SASL/SCRAM secrets.
//!
//! Module layout follows the signing pipeline's own data flow
//! (`G -> D -> (B,C,A) -> F -> H -> E -> (B,C,A) -> broker`):
//! [`hash`] and [`canonical`] and [`signer`] are the pure signing engine,
//! [`sts`] drives `AssumeRole`, [`sasl`] builds the broker payload,
//! [`store`] holds the shared credential, [`scheduler`] keeps it fresh, and
//! [`authenticator`] runs one connection's handshake.

pub mod authenticator;
pub mod canonical;
pub mod config;
pub mod error;
pub mod hash;
pub mod sasl;
pub mod scheduler;
pub mod signer;
pub mod store;
pub mod sts;

pub use authenticator::Authenticator;
pub use config::{AuthConfig, TlsConfig, ValidatedAuthConfig};
pub use error::{AuthError, Result};
pub use scheduler::RefreshScheduler;
pub use store::{Credential, CredentialStore, Notifier};

use std::sync::Arc;

/// Top-level entry point: validates configuration, builds the shared
/// credential store (installing the static credential immediately when STS
/// is disabled), and starts the refresh scheduler when STS is enabled.
pub struct MskIamAuth {
    pub store: CredentialStore,
    scheduler: Option<RefreshScheduler>,
}

impl MskIamAuth {
    pub fn new(config: AuthConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let validated = config.validate()?;
        let requires_session_token = validated.sts.is_some();
        let store = CredentialStore::new(notifier, requires_session_token);

        if validated.sts.is_none() {
            store.install(Credential {
                access_key_id: validated.access_key_id.clone(),
                secret_access_key: validated.secret_access_key.clone(),
                region: validated.region.clone(),
                session_token: validated.session_token.clone(),
                // Static credentials never expire; far-future sentinel per §3.
                expires_at_unix_ms: i64::MAX,
            })?;
        }

        let scheduler = if validated.sts.is_some() {
            let client = build_http_client(&validated.tls)?;
            Some(RefreshScheduler::start(validated, store.downgrade(), client))
        } else {
            None
        };

        Ok(Self { store, scheduler })
    }

    pub fn authenticator(&self, hostname: impl Into<String>) -> Authenticator {
        Authenticator::new(hostname)
    }

    pub async fn shutdown(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }
    }
}

fn build_http_client(tls: &TlsConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if let Some(ca_path) = &tls.ca_bundle_path {
        let pem = std::fs::read(ca_path)
            .map_err(|e| AuthError::Config(format!("failed to read CA bundle '{ca_path}': {e}")))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| AuthError::Config(format!("invalid CA bundle '{ca_path}': {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) {
        let mut combined = std::fs::read(cert_path)
            .map_err(|e| AuthError::Config(format!("failed to read client cert '{cert_path}': {e}")))?;
        let mut key_bytes = std::fs::read(key_path)
            .map_err(|e| AuthError::Config(format!("failed to read client key '{key_path}': {e}")))?;
        combined.append(&mut key_bytes);
        let identity = reqwest::Identity::from_pem(&combined)
            .map_err(|e| AuthError::Config(format!("invalid client cert/key pair: {e}")))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| AuthError::Config(format!("failed to build STS HTTP client: {e}")))
}
