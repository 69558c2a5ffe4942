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

//! # stir-certprovider
//!
//! Issuance of STIR/SHAKEN signing certificates.
//!
//! A SHAKEN certificate is obtained in up to three HTTPS round trips:
//! log in to the STI-PA, exchange a TNAuthList/fingerprint pair for an SPC
//! token, then submit a CSR plus that token to a certificate authority. This
//! crate implements each step and a [`CertProvider`] façade that runs them
//! in order and keeps the resulting [`CertRecord`].
//!
//! ## Features
//!
//! - **Persistent P-256 key** with owner-only permissions and service account ownership
//! - **CSR construction** with the subject e-mail attribute and SAN that SHAKEN CAs expect
//! - **STI-PA client** (login, SPC token request, key fingerprinting, TNAuthList encoding)
//! - **CA client** with error envelope aggregation and expiration checks
//! - **Async-first design** using Tokio and reqwest
//!
//! ## Quick Start
//!
//! ```no_run
//! use stir_certprovider::{CertProvider, Provider, ProviderConfig, ProviderKind, SubjectInfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProviderConfig::builder()
//!         .subject(SubjectInfo {
//!             common_name: "sip.example.com".into(),
//!             country: "US".into(),
//!             organization: "Example Telecom".into(),
//!             email: "noc@example.com".into(),
//!             ..Default::default()
//!         })
//!         .key_path("/etc/kamailio/stir/private_key.pem")
//!         .ca_token(std::env::var("CA_TOKEN")?)
//!         .stipa_credentials("api-user", std::env::var("STIPA_PASSWORD")?)
//!         .spc_code("119F")
//!         .build();
//!
//!     let mut provider = Provider::new(ProviderKind::SpcTokenCa, config)?;
//!     provider.issue_certificate().await?;
//!
//!     println!("{:?}", provider.summary());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ca;
pub mod config;
pub mod csr;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod keystore;
pub mod provider;
pub mod spc;
pub mod stipa;

pub use ca::{CertRecord, CertificateAuthorityClient, CertificateResponse};
pub use config::{ProviderConfig, ProviderConfigBuilder, SubjectInfo};
pub use csr::{build_csr, CsrBuilder, ParsedCsr};
pub use error::{CertProviderError, ErrorKind, Result};
pub use fingerprint::fingerprint;
pub use keystore::{KeyStore, SigningKey};
pub use provider::{
    CertProvider, CertificateSummary, DirectCaProvider, IssuanceState, Provider, ProviderKind,
    SpcTokenCaProvider, SummaryDocument,
};
pub use spc::encode_spc;
pub use stipa::{AuthSession, SecondaryAuthorityClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("stir-certprovider/", env!("CARGO_PKG_VERSION"));
