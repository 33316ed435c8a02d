//! Core library for the help desk client.
//!
//! - `api`: REST client, transport and error types
//! - `auth`: session store, session guard, route authorization, keychain
//! - `models`: users, tickets and request/response bodies
//! - `config`: persisted client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{Session, SessionGuard, SessionStore};
pub use config::Config;
