//! Integration test utilities and helpers
//!
//! Mock STI-PA and CA endpoints served from one wiremock server, plus
//! fixtures for their JSON bodies.

use std::path::Path;

use serde_json::{json, Value};
use stir_certprovider::ProviderConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// STI-PA login path
pub const PATH_LOGIN: &str = "/api/v1/auth/login";

/// CA certificate request path
pub const PATH_CA: &str = "/certificates/request";

/// SPC used across tests, and its TNAuthList tkvalue
pub const TEST_SPC: &str = "119F";
pub const TEST_TKVALUE: &str = "MAigBhYEMTE5Rg==";

/// Credentials the mocks expect
pub const TEST_CA_TOKEN: &str = "ca-bearer-token";
pub const TEST_STIPA_USER: &str = "stipa-user";
pub const TEST_STIPA_PASSWORD: &str = "stipa-password";
pub const TEST_ACCESS_TOKEN: &str = "access-token-123";

/// STI-PA token path for an SPC
pub fn token_path(spc: &str) -> String {
    format!("/api/v1/account/{}/token/", spc)
}

/// Mock STI-PA + CA server for integration tests
pub struct MockAuthorityServer {
    server: MockServer,
}

impl MockAuthorityServer {
    /// Start a new mock server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Base URL of the mock server (STI-PA base)
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// CA endpoint URL
    pub fn ca_url(&self) -> String {
        format!("{}{}", self.server.uri(), PATH_CA)
    }

    /// Inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Provider configuration pointing at this server
    pub fn config(&self, key_path: &Path) -> ProviderConfig {
        ProviderConfig::builder()
            .key_path(key_path)
            .without_key_owner()
            .ca_url(self.ca_url())
            .expect("Valid URL")
            .ca_token(TEST_CA_TOKEN)
            .stipa_url(self.url())
            .expect("Valid URL")
            .stipa_credentials(TEST_STIPA_USER, TEST_STIPA_PASSWORD)
            .spc_code(TEST_SPC)
            .build()
    }

    /// Mock a successful login
    pub async fn mock_login_success(&self) {
        Mock::given(method("POST"))
            .and(path(PATH_LOGIN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Authenticated",
                "accessToken": TEST_ACCESS_TOKEN,
                "refreshToken": "refresh-token-456"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mock a login answered with the STI-PA error envelope
    pub async fn mock_login_error(&self, status: u16, error_code: &str, message: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_LOGIN))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "status": "failed",
                "message": message,
                "errorCode": error_code
            })))
            .mount(&self.server)
            .await;
    }

    /// Mock a successful SPC token response
    pub async fn mock_spc_token_success(&self, token: &str) {
        Mock::given(method("POST"))
            .and(path(token_path(TEST_SPC)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "message": "Token generated",
                "token": token,
                "crl": "https://authenticate-api.example.com/crl"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mock an issued certificate (201 or 302)
    pub async fn mock_ca_issued(&self, status: u16, not_after: i64) {
        Mock::given(method("POST"))
            .and(path(PATH_CA))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(fixtures::certificate_body(not_after, "https://certs.example.com/1.pem")),
            )
            .mount(&self.server)
            .await;
    }

    /// Mock a CA error envelope
    pub async fn mock_ca_errors(&self, status: u16, errors: &[(u16, &str, &str)]) {
        Mock::given(method("POST"))
            .and(path(PATH_CA))
            .respond_with(ResponseTemplate::new(status).set_body_json(fixtures::ca_errors(errors)))
            .mount(&self.server)
            .await;
    }

    /// Mock a raw CA response body
    pub async fn mock_ca_body(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path(PATH_CA))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(body)
                    .insert_header("Content-Type", "text/plain"),
            )
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of every request received on `request_path`
    pub async fn received_json(&self, request_path: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .map(|r| serde_json::from_slice(&r.body).expect("JSON request body"))
            .collect()
    }
}

/// Test fixture helpers
pub mod fixtures {
    use super::*;

    /// Epoch seconds `days` from now (negative for the past)
    pub fn epoch_in_days(days: i64) -> i64 {
        (chrono::Utc::now() + chrono::Duration::days(days)).timestamp()
    }

    /// CA success envelope
    pub fn certificate_body(not_after: i64, repository_url: &str) -> Value {
        json!({
            "request": {
                "validityDays": 360,
                "serviceProviderCodeToken": "spc-token",
                "certificateSigningRequest": "-----BEGIN CERTIFICATE REQUEST-----"
            },
            "certificate": {
                "id": "cert-1",
                "serviceProviderCodeTokenId": "tok-1",
                "subjectKeyIdentifier": "00:11:22",
                "serviceProvider": "Example Telecom",
                "notBefore": epoch_in_days(0),
                "notAfter": not_after,
                "spid": TEST_SPC,
                "certificateRepositoryUrl": repository_url,
                "rootCertificate": "",
                "intermediateCertificate": "",
                "shakenCertificate": "",
                "requestor": "api",
                "validityDays": 360,
                "price": 0
            }
        })
    }

    /// CA error envelope
    pub fn ca_errors(errors: &[(u16, &str, &str)]) -> Value {
        let entries: Vec<Value> = errors
            .iter()
            .map(|(status, title, detail)| json!({"status": status, "title": title, "detail": detail}))
            .collect();
        json!({ "errors": entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let mock_server = MockAuthorityServer::start().await;
        assert!(mock_server.url().starts_with("http://"));
        assert!(mock_server.ca_url().ends_with(PATH_CA));
    }

    #[test]
    fn test_fixture_error_envelope() {
        let body = fixtures::ca_errors(&[(400, "Bad Request", "x"), (403, "Forbidden", "y")]);
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(2));
    }
}
