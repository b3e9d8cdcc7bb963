//! Error types for SigV4 signing, STS credential refresh, and SASL authentication.

use thiserror::Error;

/// Errors that can occur anywhere in the credential lifecycle or signing path.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or invalid configuration; fatal at client construction.
    #[error("invalid AWS_MSK_IAM configuration: {0}")]
    Config(String),

    /// `install` was called with a non-future expiration.
    #[error("credential already expired: expires_at={expires_at_unix_ms}ms, now={now_unix_ms}ms")]
    CredentialExpired {
        expires_at_unix_ms: i64,
        now_unix_ms: i64,
    },

    /// The HTTPS call to STS failed before a response was received.
    #[error("STS transport error: {0}")]
    StsTransport(String),

    /// STS returned a well-formed response that is either an `ErrorResponse`
    /// or is missing a required field.
    #[error("STS protocol error: {0}")]
    StsProtocol(String),

    /// `snapshot` was called before any credential was installed, or STS mode
    /// is enabled but the installed credential carries no session token.
    #[error("no credentials available: {0}")]
    NoCredentialsAvailable(String),

    /// The broker rejected the SASL authentication attempt.
    #[error("SASL AWS_MSK_IAM authentication rejected: {0}")]
    AuthRejected(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::StsTransport(err.to_string())
    }
}

impl From<quick_xml::Error> for AuthError {
    fn from(err: quick_xml::Error) -> Self {
        AuthError::StsProtocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
