//! Configuration surface (SigV4 §6) and validation.

use crate::error::AuthError;

/// Raw configuration options, mirroring the `aws.*` keys a caller would set
/// on the client's configuration object.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub session_token: Option<String>,
    pub enable_sts: bool,
    pub role_arn: Option<String>,
    pub role_session_name: Option<String>,
    pub external_id: Option<String>,
    pub duration_sec: Option<u32>,
    /// TLS material passed through to the STS HTTPS client unmodified.
    pub tls: TlsConfig,
}

/// TLS material for the STS client, all optional; absence means "use the
/// platform default trust store and no client certificate".
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_bundle_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
}

/// STS-specific configuration, present only when STS mode validated successfully.
#[derive(Debug, Clone)]
pub struct ValidatedStsConfig {
    pub role_arn: String,
    pub role_session_name: String,
    pub external_id: Option<String>,
    pub duration_sec: u32,
}

/// Configuration that has passed the "missing required combination" checks
/// in §6 and is safe to build a client from.
#[derive(Debug, Clone)]
pub struct ValidatedAuthConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub session_token: Option<String>,
    pub sts: Option<ValidatedStsConfig>,
    pub tls: TlsConfig,
}

impl AuthConfig {
    /// Validate the configuration, returning a fatal [`AuthError::Config`]
    /// describing the first missing/invalid field found.
    pub fn validate(self) -> Result<ValidatedAuthConfig, AuthError> {
        if self.access_key_id.is_empty() {
            return Err(AuthError::Config("aws.access.key.id is required".to_string()));
        }
        if self.secret_access_key.is_empty() {
            return Err(AuthError::Config("aws.secret.access.key is required".to_string()));
        }
        if self.region.is_empty() {
            return Err(AuthError::Config("aws.region is required".to_string()));
        }

        let sts = if self.enable_sts {
            let role_arn = self
                .role_arn
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AuthError::Config("aws.role.arn is required when aws.enable.sts=true".to_string()))?;
            let role_session_name = self.role_session_name.filter(|s| !s.is_empty()).ok_or_else(|| {
                AuthError::Config("aws.role.session.name is required when aws.enable.sts=true".to_string())
            })?;
            let duration_sec = self
                .duration_sec
                .filter(|&d| d > 0)
                .ok_or_else(|| AuthError::Config("aws.duration.sec must be a positive integer when aws.enable.sts=true".to_string()))?;

            Some(ValidatedStsConfig {
                role_arn,
                role_session_name,
                external_id: self.external_id.filter(|s| !s.is_empty()),
                duration_sec,
            })
        } else {
            None
        };

        Ok(ValidatedAuthConfig {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            region: self.region,
            session_token: self.session_token,
            sts,
            tls: self.tls,
        })
    }
}
