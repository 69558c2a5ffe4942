// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! STI-PA (Secondary Authority) client.
//!
//! Obtaining an SPC token takes two sequential calls:
//!
//! 1. `POST {base}/api/v1/auth/login` with the service account credentials,
//!    answered with an access token.
//! 2. `POST {base}/api/v1/account/{spc}/token/` with the access token in the
//!    `Authorization` header and the TNAuthList `tkvalue` plus key
//!    fingerprint in the body, answered with the SPC token.
//!
//! Nothing is cached: every [`SecondaryAuthorityClient::get_spc_token`] call
//! logs in again.

use std::fmt;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{CertProviderError, Result};
use crate::fingerprint::fingerprint;
use crate::http::{build_http_client, Redirects};
use crate::keystore::SigningKey;
use crate::spc::{encode_spc, TNAUTHLIST_TOKEN_TYPE};

/// Path of the login endpoint.
pub const LOGIN_PATH: &str = "/api/v1/auth/login";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default)]
    status: String,
    access_token: String,
}

/// Authority error envelope.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    error_code: String,
}

impl ErrorEnvelope {
    fn into_error(self, url: &str, http_status: StatusCode) -> CertProviderError {
        CertProviderError::AuthorityRejected {
            url: url.to_string(),
            http_status: http_status.as_u16(),
            status: self.status,
            message: self.message,
            error_code: self.error_code,
        }
    }
}

/// Access token credential claims sent with a token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessTokenClaims {
    /// Always `TNAuthList`.
    pub tktype: String,
    /// Base64 DER TNAuthList holding the SPC.
    pub tkvalue: String,
    /// Whether the token is for a CA certificate.
    pub ca: bool,
    /// Fingerprint of the key the certificate will be issued for.
    pub fingerprint: String,
}

impl AccessTokenClaims {
    /// Claims for an end-entity certificate.
    pub fn new(tkvalue: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            tktype: TNAUTHLIST_TOKEN_TYPE.to_string(),
            tkvalue: tkvalue.into(),
            ca: false,
            fingerprint: fingerprint.into(),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    atc: &'a AccessTokenClaims,
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpcTokenResponse {
    /// Authority status string.
    #[serde(default)]
    pub status: String,
    /// Authority message.
    #[serde(default)]
    pub message: String,
    /// The SPC token.
    pub token: String,
    /// CRL distribution URL for SPC tokens.
    #[serde(default)]
    pub crl: String,
}

/// Bearer session from a successful login. Lives for one token request.
#[derive(Clone)]
pub struct AuthSession {
    access_token: String,
}

impl AuthSession {
    /// Wrap an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// The raw access token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Client for the STI-PA token API.
pub struct SecondaryAuthorityClient {
    base_url: Url,
    username: String,
    password: String,
    spc_code: String,
    http: reqwest::Client,
}

impl fmt::Debug for SecondaryAuthorityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondaryAuthorityClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("spc_code", &self.spc_code)
            .finish_non_exhaustive()
    }
}

impl SecondaryAuthorityClient {
    /// Create a client from provider configuration.
    ///
    /// Credentials are not checked here; they are checked before each call.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = build_http_client(config.stipa_timeout, Redirects::Follow)?;

        Ok(Self {
            base_url: config.stipa_url.clone(),
            username: config.stipa_username.clone(),
            password: config.stipa_password.clone(),
            spc_code: config.spc_code.clone(),
            http,
        })
    }

    /// Base URL of the authority.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Log in and return a fresh session.
    ///
    /// # Errors
    ///
    /// A configuration error, before any request is made, when the username
    /// or password is empty.
    pub async fn authenticate(&self) -> Result<AuthSession> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(CertProviderError::configuration(
                "STI-PA username or password is empty",
            ));
        }

        let url = self.endpoint(LOGIN_PATH);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                user_id: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let login: LoginResponse = self.decode(&url, response).await?;
        if login.access_token.is_empty() {
            return Err(CertProviderError::unreadable_body(
                url,
                StatusCode::OK.as_u16(),
                format!("empty accessToken (status '{}')", login.status),
            ));
        }

        tracing::debug!("Authenticated with STI-PA as {}", self.username);
        Ok(AuthSession::new(login.access_token))
    }

    /// Exchange a session for an SPC token.
    ///
    /// A `200` whose `token` is empty is reported as an unreadable body.
    pub async fn request_spc_token(
        &self,
        session: &AuthSession,
        claims: &AccessTokenClaims,
    ) -> Result<SpcTokenResponse> {
        if self.spc_code.is_empty() {
            return Err(CertProviderError::configuration("SPC code is empty"));
        }

        let url = self.token_url()?;
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(url.clone())
            .header(AUTHORIZATION, session.access_token())
            .json(&TokenRequest { atc: claims })
            .send()
            .await?;

        let token: SpcTokenResponse = self.decode(url.as_str(), response).await?;
        if token.token.is_empty() {
            return Err(CertProviderError::unreadable_body(
                url.as_str(),
                StatusCode::OK.as_u16(),
                format!("empty token (status '{}': {})", token.status, token.message),
            ));
        }

        Ok(token)
    }

    /// Run the full exchange for `key` and return the SPC token.
    ///
    /// The SPC code is validated and encoded before logging in, so a bad
    /// code never costs a network round trip.
    pub async fn get_spc_token(&self, key: &SigningKey) -> Result<String> {
        let claims = AccessTokenClaims::new(encode_spc(&self.spc_code)?, fingerprint(key));

        let session = self.authenticate().await?;
        let response = self.request_spc_token(&session, &claims).await?;

        tracing::info!("Obtained SPC token for {}", self.spc_code);
        Ok(response.token)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    // The SPC is a single percent-encoded path segment.
    fn token_url(&self) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                CertProviderError::configuration(format!(
                    "STI-PA URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "account", self.spc_code.as_str(), "token", ""]);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(&self, url: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;

        let parse_error = if status == StatusCode::OK {
            match serde_json::from_slice::<T>(&body) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            }
        } else {
            match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(envelope) => return Err(envelope.into_error(url, status)),
                Err(_) if body.is_empty() => {
                    return Err(CertProviderError::unexpected_status(status.as_u16(), url))
                }
                Err(e) => e,
            }
        };

        // A 200 can still carry an error envelope.
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(&body) {
            return Err(envelope.into_error(url, status));
        }

        Err(CertProviderError::unreadable_body(
            url,
            status.as_u16(),
            parse_error.to_string(),
        ))
    }
}
