//! Integration tests for the STI-PA login and SPC token exchange

use crate::integration::{
    token_path, MockAuthorityServer, PATH_LOGIN, TEST_ACCESS_TOKEN, TEST_SPC, TEST_STIPA_PASSWORD,
    TEST_STIPA_USER, TEST_TKVALUE,
};
use serde_json::json;
use stir_certprovider::{
    fingerprint, CertProviderError, ErrorKind, ProviderConfig, SecondaryAuthorityClient,
    SigningKey,
};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn client(config: &ProviderConfig) -> SecondaryAuthorityClient {
    SecondaryAuthorityClient::new(config).expect("Client creation failed")
}

#[tokio::test]
async fn test_get_spc_token_success() {
    let mock = MockAuthorityServer::start().await;
    let key = SigningKey::generate();

    Mock::given(method("POST"))
        .and(path(PATH_LOGIN))
        .and(body_json(json!({
            "userId": TEST_STIPA_USER,
            "password": TEST_STIPA_PASSWORD
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "ok",
            "accessToken": TEST_ACCESS_TOKEN,
            "refreshToken": "refresh"
        })))
        .expect(1)
        .mount(mock.inner())
        .await;

    Mock::given(method("POST"))
        .and(path(token_path(TEST_SPC)))
        .and(header("Authorization", TEST_ACCESS_TOKEN))
        .and(body_partial_json(json!({
            "atc": {
                "tktype": "TNAuthList",
                "tkvalue": TEST_TKVALUE,
                "ca": false,
                "fingerprint": fingerprint(&key)
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Token generated",
            "token": "spc-token-xyz",
            "crl": "https://crl.example.com"
        })))
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let token = client(&config).get_spc_token(&key).await;

    assert_eq!(token.expect("SPC token"), "spc-token-xyz");
}

#[tokio::test]
async fn test_empty_password_makes_no_request() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(mock.inner())
        .await;

    let config = ProviderConfig::builder()
        .stipa_url(mock.url())
        .expect("Valid URL")
        .stipa_credentials(TEST_STIPA_USER, "")
        .spc_code(TEST_SPC)
        .build();

    let err = client(&config).authenticate().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = client(&config)
        .get_spc_token(&SigningKey::generate())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_empty_spc_code_makes_no_request() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(mock.inner())
        .await;

    let config = ProviderConfig::builder()
        .stipa_url(mock.url())
        .expect("Valid URL")
        .stipa_credentials(TEST_STIPA_USER, TEST_STIPA_PASSWORD)
        .build();

    let err = client(&config)
        .get_spc_token(&SigningKey::generate())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_login_error_envelope_surfaced_verbatim() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_login_error(401, "AUTH-1001", "Invalid user credentials")
        .await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config).authenticate().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    match &err {
        CertProviderError::AuthorityRejected {
            http_status,
            status,
            message,
            error_code,
            ..
        } => {
            assert_eq!(*http_status, 401);
            assert_eq!(status, "failed");
            assert_eq!(message, "Invalid user credentials");
            assert_eq!(error_code, "AUTH-1001");
        }
        other => panic!("Expected AuthorityRejected, got: {:?}", other),
    }
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_login_unreadable_body() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .and(path(PATH_LOGIN))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(mock.inner())
        .await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config).authenticate().await.unwrap_err();

    assert!(matches!(err, CertProviderError::UnreadableBody { status: 502, .. }));
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_login_empty_error_body() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .and(path(PATH_LOGIN))
        .respond_with(ResponseTemplate::new(503))
        .mount(mock.inner())
        .await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config).authenticate().await.unwrap_err();

    assert!(matches!(err, CertProviderError::UnexpectedStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_login_200_with_error_envelope() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_login_error(200, "AUTH-1002", "Account locked").await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config).authenticate().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("Account locked"));
}

#[tokio::test]
async fn test_token_request_rejected() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_login_success().await;

    Mock::given(method("POST"))
        .and(path(token_path(TEST_SPC)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": "failed",
            "message": "Account not authorized for SPC",
            "errorCode": "TKN-2003"
        })))
        .mount(mock.inner())
        .await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config)
        .get_spc_token(&SigningKey::generate())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("TKN-2003"));
}

#[tokio::test]
async fn test_each_exchange_logs_in_again() {
    let mock = MockAuthorityServer::start().await;

    Mock::given(method("POST"))
        .and(path(PATH_LOGIN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": TEST_ACCESS_TOKEN
        })))
        .expect(2)
        .mount(mock.inner())
        .await;
    mock.mock_spc_token_success("spc-token").await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let client = client(&config);
    let key = SigningKey::generate();

    client.get_spc_token(&key).await.expect("first exchange");
    client.get_spc_token(&key).await.expect("second exchange");
}

#[tokio::test]
async fn test_empty_spc_token_is_unreadable() {
    let mock = MockAuthorityServer::start().await;
    mock.mock_login_success().await;
    mock.mock_spc_token_success("").await;

    let config = mock.config(std::path::Path::new("unused.pem"));
    let err = client(&config)
        .get_spc_token(&SigningKey::generate())
        .await
        .unwrap_err();

    assert!(matches!(err, CertProviderError::UnreadableBody { status: 200, .. }));
    assert_eq!(err.kind(), ErrorKind::Network);
}
