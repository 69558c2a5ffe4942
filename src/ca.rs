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

//! Certificate authority client.
//!
//! Submits a PEM CSR together with an SPC token and turns the CA's answer
//! into a [`CertRecord`]. A `201 Created` or `302 Found` carries the issued
//! certificate; anything else carries an `{"errors": [...]}` envelope.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{CaErrorDetail, CertProviderError, Result};
use crate::http::{build_http_client, Redirects};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRequest<'a> {
    validity_days: u32,
    service_provider_code_token: &'a str,
    certificate_signing_request: &'a str,
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    request: CertificateRequest<'a>,
}

/// The request as echoed back by the CA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestEcho {
    /// Requested validity in days.
    pub validity_days: u32,
    /// SPC token submitted.
    pub service_provider_code_token: String,
    /// CSR submitted, PEM.
    pub certificate_signing_request: String,
}

/// Issued certificate details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
    /// CA-assigned certificate identifier.
    #[serde(default)]
    pub id: String,
    /// Identifier of the SPC token used.
    #[serde(default)]
    pub service_provider_code_token_id: String,
    /// Subject key identifier, hex.
    #[serde(default)]
    pub subject_key_identifier: String,
    /// Service provider name.
    #[serde(default)]
    pub service_provider: String,
    /// Start of validity, Unix epoch seconds.
    #[serde(default)]
    pub not_before: i64,
    /// End of validity, Unix epoch seconds.
    pub not_after: i64,
    /// Service provider ID (the SPC).
    #[serde(default)]
    pub spid: String,
    /// Public URL of the certificate chain.
    pub certificate_repository_url: String,
    /// Root certificate, PEM.
    #[serde(default)]
    pub root_certificate: String,
    /// Intermediate certificate, PEM.
    #[serde(default)]
    pub intermediate_certificate: String,
    /// The issued SHAKEN certificate, PEM.
    #[serde(default)]
    pub shaken_certificate: String,
    /// Account that made the request.
    #[serde(default)]
    pub requestor: String,
    /// Granted validity in days.
    #[serde(default)]
    pub validity_days: i64,
    /// Billed price.
    #[serde(default)]
    pub price: i64,
}

/// Success envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateResponse {
    /// Echo of the submitted request.
    #[serde(default)]
    pub request: RequestEcho,
    /// The issued certificate.
    pub certificate: IssuedCertificate,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorEntry>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ErrorEntry {
    status: u16,
    title: String,
    detail: String,
}

impl From<ErrorEntry> for CaErrorDetail {
    fn from(e: ErrorEntry) -> Self {
        Self {
            status: e.status,
            title: e.title,
            detail: e.detail,
        }
    }
}

/// An issued certificate: where to fetch it and when it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRecord {
    /// Repository URL of the certificate.
    pub certificate_url: String,
    /// Expiration time; always after the time the record was created.
    pub expiration_time: DateTime<Utc>,
    /// Full success envelope.
    pub raw: CertificateResponse,
}

impl CertRecord {
    /// Build a record from a success envelope, checking that it has not
    /// already expired at `now`.
    pub fn from_response(raw: CertificateResponse, now: DateTime<Utc>) -> Result<Self> {
        let epoch = raw.certificate.not_after;
        let expiration_time = DateTime::<Utc>::from_timestamp(epoch, 0)
            .ok_or(CertProviderError::InvalidExpiration(epoch))?;

        if expiration_time <= now {
            return Err(CertProviderError::ExpiredCertificate {
                not_after: expiration_time.to_rfc3339(),
                epoch,
            });
        }

        Ok(Self {
            certificate_url: raw.certificate.certificate_repository_url.clone(),
            expiration_time,
            raw,
        })
    }
}

/// Client for the CA certificate request endpoint.
pub struct CertificateAuthorityClient {
    url: Url,
    token: String,
    http: reqwest::Client,
}

impl fmt::Debug for CertificateAuthorityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthorityClient")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl CertificateAuthorityClient {
    /// Create a client from provider configuration.
    ///
    /// Redirects are not followed so that a `302` answer is seen as such.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = build_http_client(config.ca_timeout, Redirects::Surface)?;

        Ok(Self {
            url: config.ca_url.clone(),
            token: config.ca_token.clone(),
            http,
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request a certificate for `csr_pem`.
    ///
    /// # Errors
    ///
    /// - configuration error if no CA token is configured (no request sent)
    /// - [`CertProviderError::CaRejected`] for an error envelope
    /// - [`CertProviderError::UnreadableBody`] if the body matches neither envelope
    /// - [`CertProviderError::ExpiredCertificate`] if `notAfter` is not in the future
    pub async fn request_certificate(
        &self,
        csr_pem: &str,
        spc_token: &str,
        validity_days: u32,
    ) -> Result<CertRecord> {
        if self.token.is_empty() {
            return Err(CertProviderError::configuration(
                "CA authorization token is empty",
            ));
        }

        let url = self.url.as_str();
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(&RequestEnvelope {
                request: CertificateRequest {
                    validity_days,
                    service_provider_code_token: spc_token,
                    certificate_signing_request: csr_pem,
                },
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::CREATED || status == StatusCode::FOUND {
            let raw = match serde_json::from_slice::<CertificateResponse>(&body) {
                Ok(raw) => raw,
                Err(e) => return Err(rejection(url, status, &body, e)),
            };
            let record = CertRecord::from_response(raw, Utc::now())?;

            tracing::info!(
                "Certificate issued: {} (expires {})",
                record.certificate_url,
                record.expiration_time
            );
            return Ok(record);
        }

        Err(match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(envelope) => ca_rejected(url, status, envelope),
            Err(e) => CertProviderError::unreadable_body(url, status.as_u16(), e.to_string()),
        })
    }
}

fn ca_rejected(url: &str, status: StatusCode, envelope: ErrorEnvelope) -> CertProviderError {
    CertProviderError::CaRejected {
        url: url.to_string(),
        status: status.as_u16(),
        errors: envelope.errors.into_iter().map(Into::into).collect(),
    }
}

// A success status whose body is not a success envelope.
fn rejection(
    url: &str,
    status: StatusCode,
    body: &[u8],
    parse_error: serde_json::Error,
) -> CertProviderError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => ca_rejected(url, status, envelope),
        Err(_) => CertProviderError::unreadable_body(url, status.as_u16(), parse_error.to_string()),
    }
}
