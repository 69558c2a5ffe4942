//! HTTP client construction shared by the authority clients.
//!
//! Both remote authorities are plain JSON-over-HTTPS APIs. Each client owns
//! its own `reqwest::Client` with a bounded timeout so that a stalled
//! authority surfaces as a network error instead of hanging issuance.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;

use crate::error::{CertProviderError, Result};
use crate::USER_AGENT;

/// JSON media type used for every request and response.
pub const APPLICATION_JSON: &str = "application/json";

/// Redirect handling for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    /// Follow redirects the way reqwest does by default.
    Follow,
    /// Return 3xx responses to the caller unchanged.
    Surface,
}

/// Build a reqwest Client for a JSON API.
///
/// TLS 1.2 is the minimum accepted version; Mozilla's root store is used
/// for server verification.
pub fn build_http_client(timeout: Duration, redirects: Redirects) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

    let policy = match redirects {
        Redirects::Follow => Policy::default(),
        Redirects::Surface => Policy::none(),
    };

    reqwest::Client::builder()
        .timeout(timeout)
        .use_rustls_tls()
        .tls_built_in_root_certs(true)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .redirect(policy)
        .build()
        .map_err(|e| CertProviderError::configuration(format!("Failed to build HTTP client: {e}")))
}
