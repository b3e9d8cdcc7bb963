//! Refresh scheduler (SigV4 §4.G).
//!
//! Drives the STS client (D) on a fixed timer and installs its result into
//! the credential store (F), holding only a [`WeakCredentialStore`] so a
//! dropped client aborts the loop. Follows the same `tokio::select!` +
//! `watch`-channel shutdown shape as the control plane's reconnection loop,
//! but with a data-dependent reschedule delay instead of exponential backoff.

use std::time::Duration;

use tokio::sync::watch;

use crate::config::ValidatedAuthConfig;
use crate::store::{Credential, WeakCredentialStore};
use crate::sts::{self, AssumeRoleInput};

const FAILURE_RETRY: Duration = Duration::from_secs(10);

/// A running scheduler task and the handle used to stop it.
pub struct RefreshScheduler {
    shutdown_tx: watch::Sender<bool>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl RefreshScheduler {
    /// Start the scheduler. The task holds only a weak reference to the
    /// credential store, so dropping the owning [`crate::MskIamAuth`]
    /// without calling [`RefreshScheduler::shutdown`] still aborts the
    /// background refresh loop — it notices on its next fire that the
    /// store is gone and returns instead of signing in against live AWS
    /// credentials with nobody left to consume them.
    ///
    /// No-op loop (returns a handle that exits immediately once dropped)
    /// when STS mode is disabled or `duration_sec` is zero — static
    /// credentials never refresh.
    pub fn start(config: ValidatedAuthConfig, store: WeakCredentialStore, client: reqwest::Client) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let join_handle = tokio::spawn(async move {
            refresh_loop(config, store, client, shutdown_rx).await;
        });

        Self { shutdown_tx, join_handle }
    }

    /// Stop the scheduler, waiting for an in-flight fire to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join_handle.await;
    }
}

async fn refresh_loop(
    config: ValidatedAuthConfig,
    store: WeakCredentialStore,
    client: reqwest::Client,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let Some(sts_config) = config.sts.as_ref() else {
        return;
    };
    if sts_config.duration_sec == 0 {
        return;
    }

    // First fire is immediate; subsequent delays are computed from the
    // outcome of the previous fire.
    let mut delay = Duration::ZERO;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("refresh scheduler shutting down");
                    return;
                }
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if *shutdown_rx.borrow() {
            return;
        }

        let Some(store) = store.upgrade() else {
            tracing::info!("credential store dropped, stopping refresh scheduler");
            return;
        };

        let input = AssumeRoleInput {
            access_key_id: &config.access_key_id,
            secret_access_key: &config.secret_access_key,
            region: &config.region,
            role_arn: &sts_config.role_arn,
            role_session_name: &sts_config.role_session_name,
            external_id: sts_config.external_id.as_deref(),
            duration_sec: sts_config.duration_sec,
        };

        delay = match sts::assume_role(&client, &input).await {
            Ok(creds) => {
                let now = crate::store::now_unix_ms();
                let remaining_ms = (creds.expires_at_unix_ms - now).max(0);
                let credential = Credential {
                    access_key_id: creds.access_key_id,
                    secret_access_key: creds.secret_access_key,
                    region: config.region.clone(),
                    session_token: Some(creds.session_token),
                    expires_at_unix_ms: creds.expires_at_unix_ms,
                };
                match store.install(credential) {
                    Ok(()) => Duration::from_millis((remaining_ms as f64 * 0.8) as u64),
                    Err(err) => {
                        store.record_failure(&err.to_string());
                        FAILURE_RETRY
                    }
                }
            }
            Err(err) => {
                store.record_failure(&err.to_string());
                FAILURE_RETRY
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopNotifier;
    impl crate::store::Notifier for NoopNotifier {
        fn wake_all(&self, _reason: &str) {}
        fn emit_error(&self, _kind: &str, _text: &str) {}
    }

    #[test]
    fn test_failure_retry_is_ten_seconds() {
        assert_eq!(FAILURE_RETRY, Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_inert_when_sts_disabled() {
        let counting = Arc::new(AtomicUsize::new(0));
        let notifier = Arc::new(NoopNotifier);
        let store = crate::store::CredentialStore::new(notifier, false);
        let config = crate::config::AuthConfig {
            access_key_id: "AKID".into(),
            secret_access_key: "SECRET".into(),
            region: "us-east-1".into(),
            session_token: None,
            enable_sts: false,
            role_arn: None,
            role_session_name: None,
            external_id: None,
            duration_sec: None,
            tls: Default::default(),
        }
        .validate()
        .unwrap();

        let client = reqwest::Client::new();
        let scheduler = RefreshScheduler::start(config, store.downgrade(), client);
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.shutdown().await;
        // Completing shutdown without hanging proves the inert path returned promptly.
        assert_eq!(counting.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scheduler_stops_when_store_dropped() {
        let notifier = Arc::new(NoopNotifier);
        let store = crate::store::CredentialStore::new(notifier, true);
        let weak = store.downgrade();
        let config = crate::config::AuthConfig {
            access_key_id: "AKID".into(),
            secret_access_key: "SECRET".into(),
            region: "us-east-1".into(),
            session_token: None,
            enable_sts: true,
            role_arn: Some("arn:aws:iam::123456789012:role/test".into()),
            role_session_name: Some("session".into()),
            external_id: None,
            duration_sec: Some(900),
            tls: Default::default(),
        }
        .validate()
        .unwrap();

        let client = reqwest::Client::new();
        let scheduler = RefreshScheduler::start(config, weak.clone(), client);

        // Dropping the only strong handle should let the loop observe a
        // failed upgrade and exit on its next (immediate) fire, without
        // requiring an explicit `shutdown()` call.
        drop(store);
        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.join_handle).await;
        assert!(result.is_ok(), "refresh loop did not stop after the store was dropped");
        assert!(weak.upgrade().is_none());
    }
}
