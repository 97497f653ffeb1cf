//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients (Stripe, Resend) are built here so every request is bounded.

use reqwest::Client;
use std::time::Duration;

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout (total request/response time).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client with default timeouts.
///
/// Panics if the client cannot be built (e.g., TLS misconfiguration).
/// Only called from singleton constructors at startup.
pub fn build_client() -> Client {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}
