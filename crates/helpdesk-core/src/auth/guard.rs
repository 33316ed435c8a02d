//! Session guard: attaches credentials to every API call and recovers from
//! an expired session with a single, shared refresh.
//!
//! When a call comes back `401`, the guard either starts a refresh episode
//! or joins the one already in flight. Every request that joined an episode
//! is sent again exactly once after a successful refresh; if the refresh
//! fails, the session is cleared and each of them resolves with
//! [`ApiError::SessionExpired`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::{ApiError, ApiRequest, ApiResponse, Transport};
use crate::models::SuccessResponse;

use super::SessionStore;

/// Endpoint that renews the session cookie / access token.
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

/// Requests whose 401 is the answer itself and must never start a refresh.
const AUTH_ENDPOINTS: &[&str] = &[
    "auth/login",
    "auth/register",
    "auth/forgot-password",
    "auth/verify-email",
    "auth/reset-password",
    "auth/refresh",
];

/// True when `path` targets one of the authentication endpoints.
pub fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|endpoint| path.contains(endpoint))
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    Renewed,
    Expired(String),
}

/// One refresh attempt shared by every request that hit the expiry.
#[derive(Clone)]
struct RefreshEpisode {
    id: u64,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
    waiters: Arc<AtomicUsize>,
}

/// Holds a place in an episode's waiter count until dropped.
struct Waiter(Arc<AtomicUsize>);

impl Waiter {
    fn join(episode: &RefreshEpisode) -> Self {
        episode.waiters.fetch_add(1, Ordering::SeqCst);
        Waiter(Arc::clone(&episode.waiters))
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How many episodes had finished, either way, when a request went out.
#[derive(Debug, Clone, Copy)]
struct Epoch {
    renewals: u64,
    expirations: u64,
}

#[derive(Default)]
struct GuardState {
    /// The in-flight episode. `Some` means REFRESHING, `None` means IDLE.
    episode: Option<RefreshEpisode>,
    /// Successful refreshes so far.
    renewals: u64,
    /// Failed refreshes so far.
    expirations: u64,
    /// Reason the latest failed refresh gave.
    last_expiry: Option<String>,
    /// Refresh calls issued so far.
    episodes_started: u64,
}

impl GuardState {
    fn epoch(&self) -> Epoch {
        Epoch {
            renewals: self.renewals,
            expirations: self.expirations,
        }
    }
}

struct GuardInner {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    refresh_timeout: Duration,
    state: Mutex<GuardState>,
}

/// Clone is cheap - all clones share the same episode slot.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(GuardInner {
                transport,
                session,
                refresh_timeout,
                state: Mutex::new(GuardState::default()),
            }),
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Number of refresh calls issued since the guard was created.
    pub fn refresh_count(&self) -> u64 {
        self.state().episodes_started
    }

    pub fn is_refreshing(&self) -> bool {
        self.state().episode.is_some()
    }

    /// Requests currently suspended on the in-flight episode (0 when idle).
    pub fn waiter_count(&self) -> usize {
        self.state()
            .episode
            .as_ref()
            .map(|e| e.waiters.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Send `request` with the current credentials, recovering once from an
    /// expired session.
    pub async fn intercept(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let dispatched_at = self.state().epoch();

        match self.dispatch(request.clone()).await {
            Err(ApiError::Unauthorized) if !is_auth_endpoint(&request.path) => {
                self.recover(request, dispatched_at).await
            }
            outcome => outcome,
        }
    }

    /// Attach the credentials as they are *now* and send.
    async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        request.bearer = self.inner.session.access_token();
        self.inner.transport.send(request).await
    }

    async fn recover(&self, request: ApiRequest, dispatched_at: Epoch) -> Result<ApiResponse, ApiError> {
        // Check-and-join must stay in one critical section with no await.
        let joined = {
            let mut state = self.state();
            if state.expirations > dispatched_at.expirations {
                // Sent before a refresh that failed: report the expiry as is.
                let reason = state
                    .last_expiry
                    .clone()
                    .unwrap_or_else(|| "session expired".to_string());
                return Err(ApiError::SessionExpired(reason));
            }
            if state.renewals > dispatched_at.renewals {
                None
            } else {
                let episode = match state.episode.clone() {
                    Some(episode) => episode,
                    None => self.start_episode(&mut state),
                };
                let waiter = Waiter::join(&episode);
                Some((episode, waiter))
            }
        };

        match joined {
            Some((episode, _waiter)) => {
                debug!(episode = episode.id, path = %request.path, "Waiting for session refresh");
                if let RefreshOutcome::Expired(reason) = episode.outcome.await {
                    return Err(ApiError::SessionExpired(reason));
                }
            }
            None => {
                debug!(path = %request.path, "Credentials renewed since dispatch, retrying");
            }
        }

        // Retried once; a second 401 goes back to the caller as-is.
        self.dispatch(request).await
    }

    fn start_episode(&self, state: &mut GuardState) -> RefreshEpisode {
        state.episodes_started += 1;
        let id = state.episodes_started;
        info!(episode = id, "Session rejected, refreshing");

        // Own task: the slot is reset even if every waiter is dropped.
        let guard = self.clone();
        let task = tokio::spawn(async move { guard.refresh(id).await });
        let outcome = async move {
            task.await.unwrap_or_else(|e| {
                RefreshOutcome::Expired(format!("session refresh task failed: {}", e))
            })
        };

        let episode = RefreshEpisode {
            id,
            outcome: outcome.boxed().shared(),
            waiters: Arc::new(AtomicUsize::new(0)),
        };
        state.episode = Some(episode.clone());
        episode
    }

    async fn refresh(&self, id: u64) -> RefreshOutcome {
        let timeout = self.inner.refresh_timeout;
        let call = self.dispatch(ApiRequest::post(REFRESH_PATH).with_empty_object());

        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => self.absorb_renewal(&response),
            Ok(Err(e)) => RefreshOutcome::Expired(e.to_string()),
            Err(_) => RefreshOutcome::Expired(format!("refresh timed out after {:?}", timeout)),
        };

        if let RefreshOutcome::Expired(ref reason) = outcome {
            warn!(episode = id, reason = %reason, "Session refresh failed, signing out");
            // Subscribers see the session disappear before any waiter resumes.
            if let Err(e) = self.inner.session.clear() {
                warn!(error = %e, "Failed to clear session");
            }
        }

        let mut state = self.state();
        let waiters = state
            .episode
            .as_ref()
            .filter(|e| e.id == id)
            .map(|e| e.waiters.load(Ordering::SeqCst))
            .unwrap_or(0);
        if state.episode.as_ref().is_some_and(|e| e.id == id) {
            state.episode = None;
        }
        match outcome {
            RefreshOutcome::Renewed => state.renewals += 1,
            RefreshOutcome::Expired(ref reason) => {
                state.expirations += 1;
                state.last_expiry = Some(reason.clone());
            }
        }
        info!(
            episode = id,
            waiters,
            renewed = matches!(outcome, RefreshOutcome::Renewed),
            "Session refresh finished"
        );
        outcome
    }

    /// Store whatever credentials the refresh handed back.
    fn absorb_renewal(&self, response: &ApiResponse) -> RefreshOutcome {
        let envelope: SuccessResponse = response.json().unwrap_or_default();
        if envelope.is_error() {
            return RefreshOutcome::Expired(envelope.message);
        }
        let cookies = self.inner.transport.cookie_snapshot();
        if let Err(e) = self.inner.session.renew(envelope.access_token, cookies) {
            warn!(error = %e, "Failed to save renewed session");
        }
        RefreshOutcome::Renewed
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
