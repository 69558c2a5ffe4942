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

//! Certificate provider façade.
//!
//! A [`CertProvider`] runs one issuance attempt at a time and keeps the
//! resulting [`CertRecord`]. Two backends exist:
//!
//! - [`DirectCaProvider`]: CSR straight to the CA with a pre-provisioned SPC
//!   token.
//! - [`SpcTokenCaProvider`]: SPC token from the STI-PA first, then the CA.
//!
//! [`Provider`] wraps either one, selected by [`ProviderKind`].
//!
//! # Example
//!
//! ```no_run
//! use stir_certprovider::{CertProvider, Provider, ProviderConfig, ProviderKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::from_toml(&std::fs::read_to_string("certprovider.toml")?)?;
//! let mut provider = Provider::new(ProviderKind::SpcTokenCa, config)?;
//!
//! provider.issue_certificate().await?;
//! provider.print_certificate_url(&mut std::io::stdout())?;
//! provider.print_expiration_time(&mut std::io::stdout(), "%Y-%m-%d %H:%M:%S")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ca::{CertRecord, CertificateAuthorityClient, CertificateResponse};
use crate::config::ProviderConfig;
use crate::csr::CsrBuilder;
use crate::error::{CertProviderError, ErrorKind, Result};
use crate::keystore::KeyStore;
use crate::stipa::SecondaryAuthorityClient;

/// Default layout for [`CertProvider::print_expiration_time`].
pub const DEFAULT_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// Where a provider is in its issuance lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceState {
    /// No attempt made yet.
    Idle,
    /// An attempt is in flight.
    Requesting,
    /// The last attempt produced a certificate.
    Issued,
    /// The last attempt failed.
    Failed {
        /// Category of the failure.
        kind: ErrorKind,
        /// Display text of the error.
        message: String,
    },
}

/// The identifying metadata of an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    /// Repository URL of the certificate.
    pub certificate_url: String,
    /// Expiration time.
    pub certificate_expiration_time: DateTime<Utc>,
}

impl From<&CertRecord> for CertificateSummary {
    fn from(record: &CertRecord) -> Self {
        Self {
            certificate_url: record.certificate_url.clone(),
            certificate_expiration_time: record.expiration_time,
        }
    }
}

/// `{"certificate": {...}}` document wrapping a [`CertificateSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// The summarized certificate.
    pub certificate: CertificateSummary,
}

/// Capability set shared by every certificate backend.
///
/// Getters only return data while the provider is [`IssuanceState::Issued`].
#[async_trait]
pub trait CertProvider: Send {
    /// Run one issuance attempt.
    async fn issue_certificate(&mut self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> &IssuanceState;

    /// Record of the last successful attempt.
    fn record(&self) -> Option<&CertRecord>;

    /// Repository URL of the issued certificate.
    fn certificate_url(&self) -> Option<&str> {
        self.record().map(|r| r.certificate_url.as_str())
    }

    /// Expiration time of the issued certificate.
    fn expiration_time(&self) -> Option<DateTime<Utc>> {
        self.record().map(|r| r.expiration_time)
    }

    /// Full CA response for the issued certificate.
    fn certificate_raw(&self) -> Option<&CertificateResponse> {
        self.record().map(|r| &r.raw)
    }

    /// URL and expiration of the issued certificate.
    fn summary(&self) -> Option<CertificateSummary> {
        self.record().map(CertificateSummary::from)
    }

    /// Write the certificate URL followed by a newline.
    fn print_certificate_url(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", self.certificate_url().unwrap_or_default())
    }

    /// Write the expiration time formatted with a strftime `layout`.
    fn print_expiration_time(&self, out: &mut dyn Write, layout: &str) -> io::Result<()> {
        let text = match self.expiration_time() {
            Some(time) => format_time(time, layout)?,
            None => String::new(),
        };
        writeln!(out, "{}", text)
    }

    /// Write the full CA response as pretty JSON.
    fn print_certificate_raw(&self, out: &mut dyn Write) -> io::Result<()> {
        if let Some(raw) = self.certificate_raw() {
            serde_json::to_writer_pretty(&mut *out, raw)?;
        }
        writeln!(out)
    }
}

fn format_time(time: DateTime<Utc>, layout: &str) -> io::Result<String> {
    use std::fmt::Write as _;

    let mut text = String::new();
    write!(text, "{}", time.format(layout)).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid time layout '{layout}'"),
        )
    })?;
    Ok(text)
}

/// State and record bookkeeping shared by the backends.
#[derive(Debug)]
struct Issuance {
    state: IssuanceState,
    record: Option<CertRecord>,
}

impl Issuance {
    fn new() -> Self {
        Self {
            state: IssuanceState::Idle,
            record: None,
        }
    }

    fn begin(&mut self) {
        self.state = IssuanceState::Requesting;
        self.record = None;
    }

    fn finish(&mut self, result: Result<CertRecord>) -> Result<()> {
        match result {
            Ok(record) => {
                self.record = Some(record);
                self.state = IssuanceState::Issued;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Certificate issuance failed: {}", e);
                self.state = IssuanceState::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn record(&self) -> Option<&CertRecord> {
        match self.state {
            IssuanceState::Issued => self.record.as_ref(),
            _ => None,
        }
    }
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CertProviderError::configuration(format!("{what} is empty")));
    }
    Ok(())
}

/// Issues certificates straight from the CA using a configured SPC token.
#[derive(Debug)]
pub struct DirectCaProvider {
    config: ProviderConfig,
    key_store: KeyStore,
    ca: CertificateAuthorityClient,
    issuance: Issuance,
}

impl DirectCaProvider {
    /// Create the provider. No network or file access happens here.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            key_store: KeyStore::from_config(&config),
            ca: CertificateAuthorityClient::new(&config)?,
            config,
            issuance: Issuance::new(),
        })
    }

    async fn run(&self) -> Result<CertRecord> {
        require(&self.config.ca_token, "CA authorization token")?;
        require(&self.config.spc_token, "SPC token")?;

        let key = self.key_store.load_or_create()?;
        let csr = CsrBuilder::new(self.config.subject.clone()).build(&key)?;

        self.ca
            .request_certificate(&csr, &self.config.spc_token, self.config.validity_days)
            .await
    }
}

#[async_trait]
impl CertProvider for DirectCaProvider {
    async fn issue_certificate(&mut self) -> Result<()> {
        self.issuance.begin();
        let result = self.run().await;
        self.issuance.finish(result)
    }

    fn state(&self) -> &IssuanceState {
        &self.issuance.state
    }

    fn record(&self) -> Option<&CertRecord> {
        self.issuance.record()
    }
}

/// Obtains an SPC token from the STI-PA, then a certificate from the CA.
#[derive(Debug)]
pub struct SpcTokenCaProvider {
    config: ProviderConfig,
    key_store: KeyStore,
    stipa: SecondaryAuthorityClient,
    ca: CertificateAuthorityClient,
    issuance: Issuance,
}

impl SpcTokenCaProvider {
    /// Create the provider. No network or file access happens here.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            key_store: KeyStore::from_config(&config),
            stipa: SecondaryAuthorityClient::new(&config)?,
            ca: CertificateAuthorityClient::new(&config)?,
            config,
            issuance: Issuance::new(),
        })
    }

    async fn run(&self) -> Result<CertRecord> {
        // The STI-PA token is single-use; nothing is spent until every
        // credential for both hops is present.
        require(&self.config.ca_token, "CA authorization token")?;
        require(&self.config.stipa_username, "STI-PA username")?;
        require(&self.config.stipa_password, "STI-PA password")?;
        require(&self.config.spc_code, "SPC code")?;

        let key = self.key_store.load_or_create()?;
        let spc_token = self.stipa.get_spc_token(&key).await?;
        let csr = CsrBuilder::new(self.config.subject.clone()).build(&key)?;

        self.ca
            .request_certificate(&csr, &spc_token, self.config.validity_days)
            .await
    }
}

#[async_trait]
impl CertProvider for SpcTokenCaProvider {
    async fn issue_certificate(&mut self) -> Result<()> {
        self.issuance.begin();
        let result = self.run().await;
        self.issuance.finish(result)
    }

    fn state(&self) -> &IssuanceState {
        &self.issuance.state
    }

    fn record(&self) -> Option<&CertRecord> {
        self.issuance.record()
    }
}

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// [`DirectCaProvider`].
    DirectCa,
    /// [`SpcTokenCaProvider`].
    SpcTokenCa,
}

impl ProviderKind {
    /// Name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectCa => "direct-ca",
            Self::SpcTokenCa => "spc-token-ca",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CertProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "direct-ca" => Ok(Self::DirectCa),
            "spc-token-ca" => Ok(Self::SpcTokenCa),
            other => Err(CertProviderError::configuration(format!(
                "Unknown certificate provider '{other}', expected direct-ca or spc-token-ca"
            ))),
        }
    }
}

/// Any supported backend.
#[derive(Debug)]
pub enum Provider {
    /// Direct CA backend.
    DirectCa(DirectCaProvider),
    /// STI-PA then CA backend.
    SpcTokenCa(SpcTokenCaProvider),
}

impl Provider {
    /// Create the backend named by `kind`.
    pub fn new(kind: ProviderKind, config: ProviderConfig) -> Result<Self> {
        Ok(match kind {
            ProviderKind::DirectCa => Self::DirectCa(DirectCaProvider::new(config)?),
            ProviderKind::SpcTokenCa => Self::SpcTokenCa(SpcTokenCaProvider::new(config)?),
        })
    }

    /// Which backend this is.
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::DirectCa(_) => ProviderKind::DirectCa,
            Self::SpcTokenCa(_) => ProviderKind::SpcTokenCa,
        }
    }
}

#[async_trait]
impl CertProvider for Provider {
    async fn issue_certificate(&mut self) -> Result<()> {
        match self {
            Self::DirectCa(p) => p.issue_certificate().await,
            Self::SpcTokenCa(p) => p.issue_certificate().await,
        }
    }

    fn state(&self) -> &IssuanceState {
        match self {
            Self::DirectCa(p) => p.state(),
            Self::SpcTokenCa(p) => p.state(),
        }
    }

    fn record(&self) -> Option<&CertRecord> {
        match self {
            Self::DirectCa(p) => p.record(),
            Self::SpcTokenCa(p) => p.record(),
        }
    }
}
