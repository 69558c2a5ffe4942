//! Integration tests for the certificate authority request

use std::path::Path;
use std::time::Duration;

use crate::integration::{fixtures, MockAuthorityServer, PATH_CA, TEST_CA_TOKEN};
use serde_json::json;
use stir_certprovider::{
    CertProviderError, CertificateAuthorityClient, ErrorKind, ProviderConfig,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

const CSR_PEM: &str = "-----BEGIN CERTIFICATE REQUEST-----\nMAA=\n-----END CERTIFICATE REQUEST-----\n";

fn client(config: &ProviderConfig) -> CertificateAuthorityClient {
    CertificateAuthorityClient::new(config).expect("Client creation failed")
}

#[tokio::test]
async fn test_certificate_issued_201() {
    let mock = MockAuthorityServer::start().await;
    let not_after = fixtures::epoch_in_days(360);

    Mock::given(method("POST"))
        .and(path(PATH_CA))
        .and(header("Authorization", format!("Bearer {}", TEST_CA_TOKEN).as_str()))
        .and(body_partial_json(json!({
            "request": {
                "validityDays": 360,
                "serviceProviderCodeToken": "spc-token",
                "certificateSigningRequest": CSR_PEM
            }
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(fixtures::certificate_body(not_after, "https://certs.example.com/1.pem")),
        )
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = mock.config(Path::new("unused.pem"));
    let record = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .expect("Certificate request failed");

    assert_eq!(record.certificate_url, "https://certs.example.com/1.pem");
    assert_eq!(record.expiration_time.timestamp(), not_after);
    assert_eq!(record.raw.certificate.id, "cert-1");
}

#[tokio::test]
async fn test_certificate_issued_302_is_not_followed() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_issued(302, fixtures::epoch_in_days(30)).await;

    let config = mock.config(Path::new("unused.pem"));
    let record = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .expect("Certificate request failed");

    assert_eq!(record.certificate_url, "https://certs.example.com/1.pem");
}

#[tokio::test]
async fn test_past_expiration_is_validation_error() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_issued(201, fixtures::epoch_in_days(-1)).await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(err, CertProviderError::ExpiredCertificate { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_error_envelope_entries_are_all_reported() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_errors(
        400,
        &[
            (400, "Bad Request", "CSR signature is invalid"),
            (403, "Forbidden", "SPC token has expired"),
        ],
    )
    .await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    let message = err.to_string();
    let lines: Vec<&str> = message.lines().collect();
    assert_eq!(lines.len(), 2, "one line per entry: {message}");
    assert!(lines[0].contains("CSR signature is invalid"));
    assert!(lines[1].contains("SPC token has expired"));
    assert!(!message.contains(TEST_CA_TOKEN));
}

#[tokio::test]
async fn test_empty_error_envelope() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_errors(500, &[]).await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("HTTP 500"));
}

#[tokio::test]
async fn test_unreadable_error_body() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_body(500, "Internal Server Error").await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert!(matches!(err, CertProviderError::UnreadableBody { status: 500, .. }));
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_success_status_with_error_envelope() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_errors(201, &[(422, "Unprocessable", "validityDays out of range")])
        .await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("validityDays out of range"));
}

#[tokio::test]
async fn test_success_status_with_garbage_body() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_ca_body(201, "created").await;

    let config = mock.config(Path::new("unused.pem"));
    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert!(matches!(err, CertProviderError::UnreadableBody { status: 201, .. }));
}

#[tokio::test]
async fn test_missing_token_makes_no_request() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(mock.inner())
        .await;

    let config = ProviderConfig::builder()
        .ca_url(mock.ca_url())
        .expect("Valid URL")
        .build();

    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_request_timeout() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .and(path(PATH_CA))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(fixtures::certificate_body(fixtures::epoch_in_days(30), "u"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(mock.inner())
        .await;

    let mut config = mock.config(Path::new("unused.pem"));
    config.ca_timeout = Duration::from_millis(200);

    let err = client(&config)
        .request_certificate(CSR_PEM, "spc-token", 360)
        .await
        .unwrap_err();

    assert!(matches!(err, CertProviderError::Http(_)), "got: {:?}", err);
    assert!(err.is_retryable());
}
