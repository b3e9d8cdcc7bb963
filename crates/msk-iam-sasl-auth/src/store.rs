//! Process-wide credential store (SigV4 §4.F).
//!
//! A reader-writer lock guards a single current [`Credential`] plus the last
//! observed refresh error. `snapshot` is the only operation on the read path;
//! `install` and `record_failure` are the two writers, matching the "at most
//! one writer, any number of consistent readers" discipline in the design.

use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{AuthError, Result};

/// One immutable set of signing credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub session_token: Option<String>,
    pub expires_at_unix_ms: i64,
}

/// Receiver side of store wake-up notifications: any broker thread blocked
/// on a missing credential is released through this interface rather than
/// the store holding a cyclic pointer back to its owning client.
pub trait Notifier: Send + Sync {
    fn wake_all(&self, reason: &str);

    /// Deliver an authentication-error event to the client's asynchronous
    /// error stream. `kind` is a short machine-readable tag (e.g.
    /// `"authentication"`); `text` is the human-readable message.
    fn emit_error(&self, kind: &str, text: &str);
}

struct Inner {
    current: Option<Credential>,
    last_error: Option<String>,
}

/// Process-wide credential store. Cheaply `Clone`-able; every clone shares
/// the same underlying lock and notifier.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<Inner>>,
    notifier: Arc<dyn Notifier>,
    requires_session_token: bool,
}

pub fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl CredentialStore {
    /// `requires_session_token` should be `true` when STS mode is enabled —
    /// `snapshot` then rejects a credential with no session token even though
    /// one is installed.
    pub fn new(notifier: Arc<dyn Notifier>, requires_session_token: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner { current: None, last_error: None })),
            notifier,
            requires_session_token,
        }
    }

    /// Replace the current credential. Rejects a non-future expiration
    /// without mutating any state. On success, clears the last error and
    /// wakes every worker blocked on `snapshot`.
    pub fn install(&self, credential: Credential) -> Result<()> {
        let now = now_unix_ms();
        if credential.expires_at_unix_ms <= now {
            return Err(AuthError::CredentialExpired {
                expires_at_unix_ms: credential.expires_at_unix_ms,
                now_unix_ms: now,
            });
        }

        {
            let mut inner = self.inner.write();
            inner.current = Some(credential);
            inner.last_error = None;
        }

        tracing::info!("installed new SASL AWS_MSK_IAM credential");
        self.notifier.wake_all("credential installed");
        Ok(())
    }

    /// Record a refresh failure. The current credential, if any, is left
    /// untouched and remains usable until it actually expires. Emits an
    /// error event only when `errstr` differs from the last recorded one
    /// (debounced repeats of the same failure).
    pub fn record_failure(&self, errstr: &str) {
        let mut inner = self.inner.write();
        let is_new = inner.last_error.as_deref() != Some(errstr);
        if is_new {
            inner.last_error = Some(errstr.to_string());
        }
        drop(inner);

        if is_new {
            let text = format!("Failed to acquire SASL AWS_MSK_IAM credential: {errstr}");
            tracing::warn!(error = %errstr, "Failed to acquire SASL AWS_MSK_IAM credential");
            self.notifier.emit_error("authentication", &text);
        }
    }

    /// Clone out a credential snapshot for a single authentication attempt.
    pub fn snapshot(&self) -> Result<Credential> {
        let inner = self.inner.read();
        let credential = inner
            .current
            .clone()
            .ok_or_else(|| AuthError::NoCredentialsAvailable("no credential installed yet".to_string()))?;

        if self.requires_session_token && credential.session_token.is_none() {
            return Err(AuthError::NoCredentialsAvailable(
                "STS mode enabled but installed credential carries no session token".to_string(),
            ));
        }

        Ok(credential)
    }

    /// Last recorded error string, if any (for diagnostics/tests).
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// A non-owning handle: the background refresh task holds this instead
    /// of a strong `CredentialStore`, so a dropped client lets the task
    /// observe that the store is gone and stop itself.
    pub fn downgrade(&self) -> WeakCredentialStore {
        WeakCredentialStore {
            inner: Arc::downgrade(&self.inner),
            notifier: Arc::downgrade(&self.notifier),
            requires_session_token: self.requires_session_token,
        }
    }
}

/// Non-owning handle to a [`CredentialStore`]. Upgrading fails once every
/// strong `CredentialStore` (and thus the owning client) has been dropped.
#[derive(Clone)]
pub struct WeakCredentialStore {
    inner: Weak<RwLock<Inner>>,
    notifier: Weak<dyn Notifier>,
    requires_session_token: bool,
}

impl WeakCredentialStore {
    pub fn upgrade(&self) -> Option<CredentialStore> {
        Some(CredentialStore {
            inner: self.inner.upgrade()?,
            notifier: self.notifier.upgrade()?,
            requires_session_token: self.requires_session_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotifier {
        count: AtomicUsize,
        errors: parking_lot::Mutex<Vec<(String, String)>>,
    }

    impl CountingNotifier {
        fn new() -> Self {
            Self { count: AtomicUsize::new(0), errors: parking_lot::Mutex::new(Vec::new()) }
        }
    }

    impl Notifier for CountingNotifier {
        fn wake_all(&self, _reason: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_error(&self, kind: &str, text: &str) {
            self.errors.lock().push((kind.to_string(), text.to_string()));
        }
    }

    fn future_credential(ms_from_now: i64) -> Credential {
        Credential {
            access_key_id: "AKID".to_string(),
            secret_access_key: "SECRET".to_string(),
            region: "us-east-1".to_string(),
            session_token: None,
            expires_at_unix_ms: now_unix_ms() + ms_from_now,
        }
    }

    #[test]
    fn test_snapshot_before_install_fails() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier, false);
        assert!(matches!(store.snapshot(), Err(AuthError::NoCredentialsAvailable(_))));
    }

    #[test]
    fn test_install_then_snapshot_round_trips() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier, false);
        let credential = future_credential(60_000);
        store.install(credential.clone()).unwrap();
        assert_eq!(store.snapshot().unwrap(), credential);
    }

    #[test]
    fn test_install_rejects_non_future_expiry() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier, false);
        let expired = future_credential(-1_000);
        assert!(matches!(store.install(expired), Err(AuthError::CredentialExpired { .. })));
        assert!(store.snapshot().is_err());
    }

    #[test]
    fn test_install_wakes_notifier() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier.clone(), false);
        store.install(future_credential(60_000)).unwrap();
        assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sts_mode_requires_session_token() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier, true);
        store.install(future_credential(60_000)).unwrap();
        assert!(matches!(store.snapshot(), Err(AuthError::NoCredentialsAvailable(_))));

        let mut with_token = future_credential(60_000);
        with_token.session_token = Some("token".to_string());
        store.install(with_token).unwrap();
        assert!(store.snapshot().is_ok());
    }

    #[test]
    fn test_record_failure_debounces_identical_error() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier.clone(), false);
        store.record_failure("boom");
        assert_eq!(store.last_error(), Some("boom".to_string()));
        store.record_failure("boom");
        store.record_failure("boom");
        store.record_failure("different");
        assert_eq!(store.last_error(), Some("different".to_string()));

        let errors = notifier.errors.lock();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, "authentication");
        assert_eq!(errors[0].1, "Failed to acquire SASL AWS_MSK_IAM credential: boom");
        assert_eq!(errors[1].1, "Failed to acquire SASL AWS_MSK_IAM credential: different");
    }

    #[test]
    fn test_record_failure_preserves_existing_credential() {
        let notifier = Arc::new(CountingNotifier::new());
        let store = CredentialStore::new(notifier, false);
        let credential = future_credential(60_000);
        store.install(credential.clone()).unwrap();
        store.record_failure("transient error");
        assert_eq!(store.snapshot().unwrap(), credential);
    }
}
