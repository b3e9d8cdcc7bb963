//! Per-connection authenticator state machine (SigV4 §4.H).
//!
//! Runs entirely on the calling broker thread: `CredentialStore::snapshot`
//! is a plain reader-writer lock acquisition, never async, so there is no
//! executor to bridge into here — only the refresh scheduler (G) needs one.

use crate::canonical::SigningClock;
use crate::error::{AuthError, Result};
use crate::sasl::{build_payload, SaslCredentials};
use crate::store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendFirst,
    AwaitResponse,
}

/// One in-flight `AWS_MSK_IAM` authentication attempt against `hostname`.
pub struct Authenticator {
    state: State,
    hostname: String,
}

impl Authenticator {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self { state: State::SendFirst, hostname: hostname.into() }
    }

    /// Build the signed first-message payload from the current credential
    /// snapshot. Call exactly once, while in `SEND_FIRST`; advances to
    /// `AWAIT_RESPONSE` on success. The snapshot is copied into the payload
    /// build and not retained, so a mid-flight credential refresh cannot
    /// desynchronize an attempt already in flight.
    pub fn build_first_message(&mut self, store: &CredentialStore) -> Result<Vec<u8>> {
        if self.state != State::SendFirst {
            return Err(AuthError::AuthRejected("build_first_message called out of order".to_string()));
        }

        let credential = store.snapshot()?;
        let creds = SaslCredentials {
            access_key_id: &credential.access_key_id,
            secret_access_key: &credential.secret_access_key,
            region: &credential.region,
            session_token: credential.session_token.as_deref(),
        };
        let clock = SigningClock::now();
        let payload = build_payload(&creds, &self.hostname, &clock);

        self.state = State::AwaitResponse;
        Ok(payload.into_bytes())
    }

    /// Feed the broker's response. Empty bytes mean success; any non-empty
    /// bytes are the broker's rejection reason.
    pub fn handle_response(&mut self, response: &[u8]) -> Result<()> {
        if self.state != State::AwaitResponse {
            return Err(AuthError::AuthRejected("handle_response called out of order".to_string()));
        }

        if response.is_empty() {
            Ok(())
        } else {
            let text = String::from_utf8_lossy(response).into_owned();
            Err(AuthError::AuthRejected(text))
        }
    }
}
