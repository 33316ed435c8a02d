use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{User, UserRole};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// The authenticated identity. Either fully present or absent; there is no
/// partially-built session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Cookies captured from the transport, each with the path it was
    /// scoped to, so a later process can resume the same server-side session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self {
            user,
            access_token: None,
            cookies: None,
            established_at: Utc::now(),
        }
    }

    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn with_cookies(mut self, cookies: Option<String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.user.id
    }

    pub fn display_name(&self) -> String {
        self.user.display_name()
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }

    pub fn is_active(&self) -> bool {
        self.user.is_active
    }
}

/// Holds the current session in memory and mirrors it to `session.json`.
///
/// Readers observe the session through [`SessionStore::subscribe`]; only the
/// crate (the session guard and the API client) mutates it.
pub struct SessionStore {
    path: Option<PathBuf>,
    state: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Open the store backed by `cache_dir/session.json`, seeding it from disk.
    /// An unreadable file is discarded rather than trusted.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(SESSION_FILE);
        let initial = match Self::read(&path) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session file");
                if let Err(e) = std::fs::remove_file(&path) {
                    debug!(error = %e, "Failed to remove session file");
                }
                None
            }
        };
        debug!(has_session = initial.is_some(), ?path, "Session store opened");

        let (state, _) = watch::channel(initial);
        Self {
            path: Some(path),
            state,
        }
    }

    /// A store with no durable slot.
    pub fn in_memory() -> Self {
        let (state, _) = watch::channel(None);
        Self { path: None, state }
    }

    fn read(path: &Path) -> Result<Option<Session>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).context("Failed to read session file")?;
        let session: Session =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    pub fn current(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .and_then(|s| s.access_token.clone())
    }

    /// Replace the session and persist it.
    /// Memory is updated even when the write fails.
    pub(crate) fn establish(&self, session: Session) -> Result<()> {
        self.state.send_replace(Some(session.clone()));
        self.save(&session)
    }

    /// Record renewed credentials on the existing session, if there is one.
    pub(crate) fn renew(&self, access_token: Option<String>, cookies: Option<String>) -> Result<()> {
        let mut renewed = None;
        self.state.send_if_modified(|current| match current {
            Some(session) => {
                if access_token.is_some() {
                    session.access_token = access_token;
                }
                if cookies.is_some() {
                    session.cookies = cookies;
                }
                renewed = Some(session.clone());
                true
            }
            None => false,
        });
        match renewed {
            Some(session) => self.save(&session),
            None => Ok(()),
        }
    }

    /// Drop the session from memory first, then from disk.
    pub(crate) fn clear(&self) -> Result<()> {
        self.state.send_replace(None);
        if let Some(ref path) = self.path {
            if path.exists() {
                std::fs::remove_file(path).context("Failed to remove session file")?;
            }
        }
        Ok(())
    }

    fn save(&self, session: &Session) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(session)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }
}
