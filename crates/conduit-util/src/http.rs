//! HTTP client construction for talking to the Tool Gateway.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

/// Default per-call timeout for Tool Gateway requests.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a `reqwest::Client` configured with the Tool Gateway's default timeout.
///
/// Mirrors the teacher's client-construction idiom: one client per gateway
/// connection, built once, reused across calls.
pub fn build_gateway_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("build tool gateway http client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_with_custom_timeout() {
        let client = build_gateway_client(Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn default_timeout_matches_spec() {
        assert_eq!(DEFAULT_GATEWAY_TIMEOUT, Duration::from_secs(30));
    }
}
