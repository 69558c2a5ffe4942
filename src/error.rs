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

//! Error types for certificate issuance.
//!
//! Every failure surfaced by this crate is a [`CertProviderError`]. Each
//! variant maps onto one stable [`ErrorKind`] so callers can branch on the
//! category of failure without matching on individual variants.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`CertProviderError`].
pub type Result<T> = std::result::Result<T, CertProviderError>;

/// Stable discriminator for the category of an issuance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required credential, code or path is missing.
    Configuration,
    /// The key file could not be read, written or re-owned.
    KeyManagement,
    /// ASN.1/DER/PEM encoding failed.
    Encoding,
    /// Transport failure, timeout, or a body that violates the protocol contract.
    Network,
    /// The remote authority answered with a structured error envelope.
    Protocol,
    /// The issued certificate failed a correctness check.
    Validation,
}

impl ErrorKind {
    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::KeyManagement => "key-management",
            Self::Encoding => "encoding",
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a certificate authority error envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaErrorDetail {
    /// Status reported inside the entry.
    pub status: u16,
    /// Short error title.
    pub title: String,
    /// Longer description, possibly empty.
    pub detail: String,
}

/// Errors that can occur while issuing a certificate.
#[derive(Debug, Error)]
pub enum CertProviderError {
    /// Required configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key file handling failed.
    #[error("Key management error: {0}")]
    KeyManagement(String),

    /// Key file I/O error.
    #[error("Key file I/O error on {path}: {source}")]
    KeyIo {
        /// Path of the key file (or its temporary sibling).
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// ASN.1, DER or PEM encoding failure.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// DER library error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// HTTP transport error, including timeouts.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote endpoint answered with an unexpected status and no usable body.
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Endpoint URL.
        url: String,
    },

    /// Response body could not be parsed as any envelope the protocol defines.
    #[error("Unreadable response body from {url} (HTTP {status}): {detail}")]
    UnreadableBody {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Parser diagnostic.
        detail: String,
    },

    /// The secondary authority (STI-PA) returned its error envelope.
    #[error(
        "STI-PA error from {url} (HTTP {http_status}): error_code: {error_code}, status: {status}, message: {message}"
    )]
    AuthorityRejected {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        http_status: u16,
        /// `status` field of the envelope.
        status: String,
        /// `message` field of the envelope.
        message: String,
        /// `errorCode` field of the envelope.
        error_code: String,
    },

    /// The certificate authority returned its error envelope.
    #[error("{}", format_ca_errors(url, *status, errors))]
    CaRejected {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Every entry of the envelope, in order.
        errors: Vec<CaErrorDetail>,
    },

    /// The issued certificate expires at or before the time of issuance.
    #[error("Certificate expiration {not_after} (epoch {epoch}) is not in the future")]
    ExpiredCertificate {
        /// Parsed expiration time.
        not_after: String,
        /// Raw epoch seconds from the response.
        epoch: i64,
    },

    /// The issued certificate carries an out-of-range expiration value.
    #[error("Invalid certificate expiration epoch: {0}")]
    InvalidExpiration(i64),

    /// A CSR failed structural or signature checks.
    #[error("Invalid CSR: {0}")]
    InvalidCsr(String),
}

fn format_ca_errors(url: &str, status: u16, errors: &[CaErrorDetail]) -> String {
    if errors.is_empty() {
        return format!("CA error from {url}: HTTP {status} with no error entries");
    }

    errors
        .iter()
        .map(|e| {
            format!(
                "CA error from {url}: status: {}, title: {}, detail: {}",
                e.status, e.title, e.detail
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl CertProviderError {
    /// Create a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a key management error with the given message.
    pub fn key_management(msg: impl Into<String>) -> Self {
        Self::KeyManagement(msg.into())
    }

    /// Create a key file I/O error.
    pub fn key_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::KeyIo {
            path: path.into(),
            source,
        }
    }

    /// Create an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Create an invalid CSR error with the given message.
    pub fn invalid_csr(msg: impl Into<String>) -> Self {
        Self::InvalidCsr(msg.into())
    }

    /// Create an unexpected status error.
    pub fn unexpected_status(status: u16, url: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            url: url.into(),
        }
    }

    /// Create an unreadable body error.
    pub fn unreadable_body(url: impl Into<String>, status: u16, detail: impl Into<String>) -> Self {
        Self::UnreadableBody {
            url: url.into(),
            status,
            detail: detail.into(),
        }
    }

    /// The stable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::KeyManagement(_) | Self::KeyIo { .. } => ErrorKind::KeyManagement,
            Self::Encoding(_) | Self::Der(_) => ErrorKind::Encoding,
            Self::Http(_) | Self::UnexpectedStatus { .. } | Self::UnreadableBody { .. } => {
                ErrorKind::Network
            }
            Self::AuthorityRejected { .. } | Self::CaRejected { .. } => ErrorKind::Protocol,
            Self::ExpiredCertificate { .. } | Self::InvalidExpiration(_) | Self::InvalidCsr(_) => {
                ErrorKind::Validation
            }
        }
    }

    /// Returns true if a fresh issuance attempt may succeed.
    ///
    /// Only transport failures qualify; nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}
