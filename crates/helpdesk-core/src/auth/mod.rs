//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: the current session, observable and persisted to disk
//! - `SessionGuard`: credential attachment and coalesced session refresh
//! - `Keychain`: remembered passwords via the OS keyring
//! - `route`: which pages need a session

pub mod credentials;
pub mod guard;
pub mod route;
pub mod session;

pub use credentials::Keychain;
pub use guard::{is_auth_endpoint, SessionGuard, REFRESH_PATH};
pub use route::{authorize, Navigation, Route};
pub use session::{Session, SessionStore};
