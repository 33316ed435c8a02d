//! REST API client module for the help desk service.
//!
//! This module provides the `ApiClient` for the authentication and ticket
//! endpoints, the `Transport` seam it sends through, and `ApiError`.
//!
//! Requests are credential-bearing: the transport keeps the service's
//! cookies and the session guard adds a bearer token when the session has one.

pub mod client;
pub mod error;
pub mod tickets;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use transport::{ApiRequest, ApiResponse, FilePart, HttpTransport, Method, RequestBody, Transport};
