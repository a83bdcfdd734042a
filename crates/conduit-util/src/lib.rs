//! Shared runtime helpers for the `conduit` workflow orchestrator: the Tool Gateway
//! HTTP client, timezone normalization, and log-safe redaction.

pub mod date_handling;
pub mod http;
pub mod redact;

pub use date_handling::normalize_timezone;
pub use http::{build_gateway_client, DEFAULT_GATEWAY_TIMEOUT};
pub use redact::{mask_sensitive_arguments, redact_bearer_tokens};
