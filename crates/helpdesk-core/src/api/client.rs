//! API client for the help desk REST service.
//!
//! `ApiClient` owns the session guard and exposes typed calls for the
//! authentication endpoints here and the ticket endpoints in `tickets.rs`.
//! Every call goes through [`SessionGuard::intercept`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::auth::{Session, SessionGuard, SessionStore};
use crate::config::Config;
use crate::models::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    SuccessResponse, User, UserRole, VerifyEmailRequest,
};

use super::{ApiError, ApiRequest, ApiResponse, HttpTransport, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Prefix shared by every REST endpoint
pub(crate) const API_PREFIX: &str = "/api/v1";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the help desk service.
/// Clone is cheap - clones share the guard, session and connection pool.
#[derive(Clone)]
pub struct ApiClient {
    guard: SessionGuard,
}

impl ApiClient {
    /// Create a client from configuration, restoring any saved session.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.api_uri, config.request_timeout())?;
        let session = SessionStore::open(&config.cache_dir()?);

        if let Some(cookies) = session.current().and_then(|s| s.cookies) {
            transport.restore_cookies(&cookies);
            debug!("Restored session cookies");
        }

        let guard = SessionGuard::new(
            Arc::new(transport),
            Arc::new(session),
            config.refresh_timeout(),
        );
        Ok(Self { guard })
    }

    pub fn with_guard(guard: SessionGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn session(&self) -> &SessionStore {
        self.guard.session()
    }

    /// Observe sign-in and sign-out, including sign-out after a failed refresh.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session().subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.session().current().map(|s| s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_authenticated()
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.current_user().is_some_and(|u| u.role == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Administrator)
    }

    pub fn is_support_agent(&self) -> bool {
        self.current_user().is_some_and(|u| u.role.is_support_staff())
    }

    // ===== Request plumbing =====

    /// Send through the guard, backing off on 429.
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            match self.guard.intercept(request.clone()).await {
                Err(ApiError::RateLimited) if retries < MAX_RATE_LIMIT_RETRIES => {
                    retries += 1;
                    warn!(path = %request.path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
                outcome => return outcome,
            }
        }
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.execute(request).await?.json()
    }

    /// For endpoints whose response body carries nothing useful.
    pub(crate) async fn send_discarding(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.execute(request).await.map(|_| ())
    }

    fn auth_path(endpoint: &str) -> String {
        format!("{}/auth/{}", API_PREFIX, endpoint)
    }

    // ===== Authentication =====

    /// Sign in and establish the session.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<User, ApiError> {
        let request = ApiRequest::post(Self::auth_path("login")).with_json(credentials)?;
        let auth: AuthResponse = self.fetch(request).await?;
        Ok(self.establish(auth))
    }

    /// Create an account; the new account is signed in.
    pub async fn register(&self, details: &RegisterRequest) -> Result<User, ApiError> {
        let request = ApiRequest::post(Self::auth_path("register")).with_json(details)?;
        let auth: AuthResponse = self.fetch(request).await?;
        Ok(self.establish(auth))
    }

    /// Sign out. The local session is dropped even when the server call fails.
    pub async fn logout(&self) -> Result<SuccessResponse, ApiError> {
        let request = ApiRequest::post(Self::auth_path("logout")).with_empty_object();
        let result = self.fetch(request).await;

        if let Err(e) = self.session().clear() {
            warn!(error = %e, "Failed to clear session");
        }
        info!("Signed out");
        result
    }

    pub async fn forgot_password(&self, request: &ForgotPasswordRequest) -> Result<SuccessResponse, ApiError> {
        self.fetch(ApiRequest::post(Self::auth_path("forgot-password")).with_json(request)?)
            .await
    }

    pub async fn verify_email(&self, request: &VerifyEmailRequest) -> Result<SuccessResponse, ApiError> {
        self.fetch(ApiRequest::post(Self::auth_path("verify-email")).with_json(request)?)
            .await
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<SuccessResponse, ApiError> {
        self.fetch(ApiRequest::post(Self::auth_path("reset-password")).with_json(request)?)
            .await
    }

    fn establish(&self, auth: AuthResponse) -> User {
        let cookies = self.guard.transport().cookie_snapshot();
        let session = Session::new(auth.user.clone())
            .with_access_token(auth.access_token)
            .with_cookies(cookies);

        if let Err(e) = self.session().establish(session) {
            warn!(error = %e, "Failed to save session");
        }
        info!(user = %auth.user.email, role = ?auth.user.role, "Signed in");
        auth.user
    }
}
