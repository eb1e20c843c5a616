// Refresh coordination
// At most one token renewal in flight; every other caller waits on its outcome

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::navigator::Navigator;
use super::refresh::{self, DEFAULT_REFRESH_PATH};
use super::store::CredentialStore;
use crate::error::RefreshError;
use crate::transport::Transport;

/// Default login entry point for the redirect on refresh failure
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// New access token, or the reason there is none
pub type RefreshOutcome = Result<String, RefreshError>;

/// Gate and queue. Only touched under the mutex, never across an await.
#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    /// Error of the last renewal, until one succeeds
    last_failure: Option<RefreshError>,
}

/// Owns the refresh gate and the queue of requests waiting on it.
///
/// The renewal itself runs on a spawned task, so a caller that stops waiting
/// cannot leave the gate closed. The outcome is written to the credential
/// store before the gate opens again, and every queued waiter is answered
/// while the gate is still held.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<dyn CredentialStore>,

    /// Uninstrumented transport, used only for the refresh call
    transport: Arc<dyn Transport>,

    navigator: Arc<dyn Navigator>,
    refresh_path: String,
    login_path: String,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            store,
            transport,
            navigator,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// True while a renewal is in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().in_progress
    }

    /// Number of callers currently waiting on the in-flight renewal
    pub fn pending_waiters(&self) -> usize {
        self.lock_state().waiters.len()
    }

    /// Get an access token usable for a retry.
    ///
    /// `rejected_token` is the bearer the failed request carried. If no
    /// renewal is running and the store already holds a different token, a
    /// renewal finished after that request went out, and the stored token is
    /// returned as is. If the store is empty because the last renewal
    /// failed, that failure is returned without another attempt or redirect.
    /// Otherwise the caller joins the in-flight renewal or starts one.
    pub async fn ensure_fresh_token(self: &Arc<Self>, rejected_token: Option<&str>) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let start_refresh = {
            let mut state = self.lock_state();

            if !state.in_progress {
                match self.store.access_token() {
                    Some(current) if rejected_token != Some(current.as_str()) => {
                        tracing::debug!("Token already renewed, reusing stored token");
                        return Ok(current);
                    }
                    // The session this request was sent with already ended in a
                    // failed renewal, which has redirected once
                    None if rejected_token.is_some() => {
                        if let Some(failure) = state.last_failure.clone() {
                            tracing::debug!("Session already ended by a failed refresh");
                            return Err(failure);
                        }
                    }
                    _ => {}
                }
            }

            state.waiters.push(tx);
            let start = !state.in_progress;
            state.in_progress = true;
            start
        };

        if start_refresh {
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.run_refresh().await });
        } else {
            tracing::debug!("Refresh already in flight, queued");
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    async fn run_refresh(self: Arc<Self>) {
        let gate = Gate {
            coordinator: &self,
            released: false,
        };

        let outcome = self.renew().await;

        // Redirect before waking anyone, so a caller that sees the failure
        // also sees the redirect
        if outcome.is_err() {
            self.navigator.redirect(&self.login_path);
        }

        gate.release(outcome);
    }

    /// Call the auth endpoint and apply the result to the credential store
    async fn renew(&self) -> RefreshOutcome {
        let result = match self.store.refresh_token() {
            Some(refresh_token) => {
                match refresh::request_token_refresh(
                    self.transport.as_ref(),
                    &self.refresh_path,
                    &refresh_token,
                )
                .await
                {
                    Ok(data) => {
                        let creds = data.credentials();
                        self.store
                            .set_credentials(
                                &creds.access_token,
                                &creds.refresh_token,
                                data.user.as_ref(),
                            )
                            .map(|()| creds.access_token)
                            .map_err(|e| RefreshError::Storage(e.to_string()))
                    }
                    Err(e) => Err(e),
                }
            }
            None => Err(RefreshError::MissingRefreshToken),
        };

        if let Err(ref e) = result {
            tracing::error!("Token refresh failed: {}", e);
            if let Err(clear_err) = self.store.clear_credentials() {
                tracing::error!("Failed to clear credentials: {}", clear_err);
            }
        }

        result
    }

    /// Answer every waiter and open the gate, in one critical section
    fn settle(&self, outcome: RefreshOutcome) {
        let mut state = self.lock_state();
        let waiters = std::mem::take(&mut state.waiters);

        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "Refresh settled"
        );

        state.last_failure = outcome.as_ref().err().cloned();
        for waiter in waiters {
            // Receiver gone means the caller lost interest
            let _ = waiter.send(outcome.clone());
        }
        state.in_progress = false;
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held by the refresh task. Dropping it unreleased answers everyone with
/// `Abandoned` so no waiter hangs.
struct Gate<'a> {
    coordinator: &'a RefreshCoordinator,
    released: bool,
}

impl Gate<'_> {
    fn release(mut self, outcome: RefreshOutcome) {
        self.released = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!("Refresh task ended without an outcome");
            self.coordinator.settle(Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryCredentialStore;
    use crate::test_support::{FakeBackend, RecordingNavigator};
    use std::time::Duration;

    fn coordinator(
        backend: &Arc<FakeBackend>,
        store: &Arc<MemoryCredentialStore>,
        nav: &Arc<RecordingNavigator>,
    ) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            store.clone(),
            backend.clone(),
            nav.clone(),
        ))
    }

    async fn concurrent_renewals(n: usize) {
        let backend = Arc::new(
            FakeBackend::new("old")
                .issuing("9|new", "10|new2")
                .with_refresh_delay(Duration::from_millis(50)),
        );
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let calls = (0..n).map(|_| {
            let coord = coord.clone();
            async move { coord.ensure_fresh_token(Some("old")).await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(results.len(), n);
        for result in results {
            assert_eq!(result.unwrap(), "new");
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!coord.is_refreshing());
        assert_eq!(coord.pending_waiters(), 0);
        assert_eq!(nav.count(), 0);
    }

    #[tokio::test]
    async fn test_single_renewal_for_one_caller() {
        concurrent_renewals(1).await;
    }

    #[tokio::test]
    async fn test_single_renewal_for_five_callers() {
        concurrent_renewals(5).await;
    }

    #[tokio::test]
    async fn test_single_renewal_for_fifty_callers() {
        concurrent_renewals(50).await;
    }

    #[tokio::test]
    async fn test_renewal_persists_stripped_tokens_and_profile() {
        let backend = Arc::new(FakeBackend::new("old").issuing("7|abcdef123", "8|r2").with_user());
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let token = coord.ensure_fresh_token(Some("old")).await.unwrap();
        assert_eq!(token, "abcdef123");
        assert_eq!(store.access_token().as_deref(), Some("abcdef123"));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert_eq!(store.user_profile().map(|u| u.id), Some(42));

        // Refresh call carried the stored refresh token and no bearer
        let refresh = backend.requests_to("/api/refresh");
        assert_eq!(refresh.len(), 1);
        assert_eq!(
            refresh[0].body,
            Some(serde_json::json!({"refresh_token": "refresh"}))
        );
        assert!(!refresh[0].has_authorization());
    }

    #[tokio::test]
    async fn test_failure_clears_store_and_redirects_once() {
        let backend = Arc::new(
            FakeBackend::new("old")
                .failing_refresh(401)
                .with_refresh_delay(Duration::from_millis(30)),
        );
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let calls = (0..5).map(|_| {
            let coord = coord.clone();
            async move { coord.ensure_fresh_token(Some("old")).await }
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            assert!(matches!(
                result,
                Err(RefreshError::Rejected { status: 401, .. })
            ));
        }
        assert_eq!(backend.refresh_calls(), 1);
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert_eq!(nav.paths(), vec!["/login".to_string()]);
    }

    #[tokio::test]
    async fn test_late_rejection_after_failure_does_not_redirect_again() {
        let backend = Arc::new(FakeBackend::new("old").failing_refresh(401));
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let first = coord.ensure_fresh_token(Some("old")).await.unwrap_err();
        assert!(matches!(first, RefreshError::Rejected { status: 401, .. }));

        // A request sent with the same token whose 401 lands after the failure
        let late = coord.ensure_fresh_token(Some("old")).await.unwrap_err();
        assert_eq!(late, first);
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test]
    async fn test_login_after_failure_allows_renewal_again() {
        let backend = Arc::new(FakeBackend::new("old").failing_refresh(401));
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        assert!(coord.ensure_fresh_token(Some("old")).await.is_err());

        // Fresh session, whose token later expires too
        store.set_credentials("relogin", "refresh2", None).unwrap();
        assert!(coord.ensure_fresh_token(Some("relogin")).await.is_err());
        assert_eq!(backend.refresh_calls(), 2);
        assert_eq!(nav.count(), 2);
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let backend = Arc::new(FakeBackend::new("old"));
        let store = Arc::new(MemoryCredentialStore::new());
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let err = coord.ensure_fresh_token(None).await.unwrap_err();
        assert_eq!(err, RefreshError::MissingRefreshToken);
        assert_eq!(backend.refresh_calls(), 0);
        assert_eq!(nav.count(), 1);
    }

    #[tokio::test]
    async fn test_custom_login_path() {
        let backend = Arc::new(FakeBackend::new("old").failing_refresh(500));
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = Arc::new(
            RefreshCoordinator::new(store.clone(), backend.clone(), nav.clone())
                .with_login_path("/masuk?expired=true"),
        );

        assert!(coord.ensure_fresh_token(Some("old")).await.is_err());
        assert_eq!(nav.paths(), vec!["/masuk?expired=true".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_rejection_reuses_stored_token() {
        let backend = Arc::new(FakeBackend::new("current"));
        let store = Arc::new(MemoryCredentialStore::with_tokens("current", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let token = coord.ensure_fresh_token(Some("previous")).await.unwrap();
        assert_eq!(token, "current");
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_reopens_after_settle() {
        let backend = Arc::new(FakeBackend::new("old").issuing("a", "b"));
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        assert_eq!(coord.ensure_fresh_token(Some("old")).await.unwrap(), "a");
        // The new token itself got rejected: a second renewal is allowed
        assert_eq!(coord.ensure_fresh_token(Some("a")).await.unwrap(), "a");
        assert_eq!(backend.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_gate_answers_waiters() {
        let backend = Arc::new(FakeBackend::new("old"));
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let (tx, rx) = oneshot::channel();
        {
            let mut state = coord.lock_state();
            state.in_progress = true;
            state.waiters.push(tx);
        }

        drop(Gate {
            coordinator: &coord,
            released: false,
        });

        assert_eq!(rx.await.unwrap(), Err(RefreshError::Abandoned));
        assert!(!coord.is_refreshing());
    }

    #[tokio::test]
    async fn test_waiter_that_gives_up_does_not_block_others() {
        let backend = Arc::new(
            FakeBackend::new("old")
                .issuing("new", "new2")
                .with_refresh_delay(Duration::from_millis(50)),
        );
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        // The caller that started the renewal stops waiting almost immediately
        let impatient = tokio::time::timeout(
            Duration::from_millis(5),
            coord.ensure_fresh_token(Some("old")),
        )
        .await;
        assert!(impatient.is_err());

        let token = coord.ensure_fresh_token(Some("old")).await.unwrap();
        assert_eq!(token, "new");
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_queued_waiter_survives_dropped_starter() {
        let backend = Arc::new(
            FakeBackend::new("old")
                .issuing("new", "new2")
                .with_refresh_delay(Duration::from_millis(50)),
        );
        let store = Arc::new(MemoryCredentialStore::with_tokens("old", "refresh"));
        let nav = Arc::new(RecordingNavigator::default());
        let coord = coordinator(&backend, &store, &nav);

        let starter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_fresh_token(Some("old")).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(coord.is_refreshing());

        let waiter = {
            let coord = coord.clone();
            tokio::spawn(async move { coord.ensure_fresh_token(Some("old")).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        starter.abort();

        assert_eq!(waiter.await.unwrap(), Ok("new".to_string()));
        assert_eq!(backend.refresh_calls(), 1);
        assert!(!coord.is_refreshing());
        assert_eq!(nav.count(), 0);
    }
}
