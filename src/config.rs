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

//! Configuration types for certificate providers.
//!
//! A [`ProviderConfig`] is an immutable value handed to every component at
//! construction. It can be assembled with [`ProviderConfig::builder`] or
//! loaded from TOML:
//!
//! ```toml
//! key_path = "/etc/kamailio/stir/private_key.pem"
//! ca_url = "https://api.ca.transnexus.com/certificates/request"
//! ca_token = "${CERTIFICATE_AUTHORITY_TOKEN}"
//! spc_code = "119F"
//! stipa_username = "stipa-user"
//! stipa_password = "${STIPA_PASSWORD}"
//!
//! [subject]
//! common_name = "example.com"
//! country = "US"
//! email = "admin@example.com"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CertProviderError, Result};

/// Default certificate authority endpoint.
pub const DEFAULT_CA_URL: &str = "https://api.ca.transnexus.com/certificates/request";

/// Default STI-PA API base URL.
pub const DEFAULT_STIPA_URL: &str = "https://authenticate-api.iconectiv.com";

/// Default service account that owns the private key file.
pub const DEFAULT_KEY_OWNER: &str = "kamailio";

/// Default certificate validity requested from the CA.
pub const DEFAULT_VALIDITY_DAYS: u32 = 360;

/// Default timeout for the CA request.
pub const DEFAULT_CA_TIMEOUT: Duration = Duration::from_secs(3);

/// Default timeout for each STI-PA request.
pub const DEFAULT_STIPA_TIMEOUT: Duration = Duration::from_secs(10);

/// Subject fields placed into the CSR.
///
/// Every field may be empty; the resulting subject is still well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubjectInfo {
    /// Common Name, normally the signing domain.
    pub common_name: String,
    /// Country (C).
    pub country: String,
    /// State or province (ST).
    pub province: String,
    /// Locality (L).
    pub locality: String,
    /// Organization (O).
    pub organization: String,
    /// Organizational unit (OU).
    pub organizational_unit: String,
    /// Contact e-mail, added as a PKCS#9 subject attribute and as a SAN.
    pub email: String,
}

/// Configuration for a certificate provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// CSR subject.
    #[serde(default)]
    pub subject: SubjectInfo,

    /// Path to the PEM private key file.
    #[serde(default)]
    pub key_path: PathBuf,

    /// Service account that must own the key file.
    ///
    /// `None` leaves ownership with the current process user.
    #[serde(default = "default_key_owner")]
    pub key_owner: Option<String>,

    /// Certificate authority endpoint.
    #[serde(default = "default_ca_url")]
    pub ca_url: Url,

    /// Bearer token for the certificate authority.
    #[serde(default)]
    pub ca_token: String,

    /// Requested certificate validity in days.
    #[serde(default = "default_validity_days")]
    pub validity_days: u32,

    /// Timeout for the CA request.
    #[serde(default = "default_ca_timeout", with = "duration_secs")]
    pub ca_timeout: Duration,

    /// Pre-provisioned SPC token for providers that skip the STI-PA hop.
    #[serde(default)]
    pub spc_token: String,

    /// STI-PA API base URL.
    #[serde(default = "default_stipa_url")]
    pub stipa_url: Url,

    /// STI-PA API login.
    #[serde(default)]
    pub stipa_username: String,

    /// STI-PA API password.
    #[serde(default)]
    pub stipa_password: String,

    /// Service Provider Code (OCN); also the STI-PA account identifier.
    #[serde(default)]
    pub spc_code: String,

    /// Timeout for each STI-PA request.
    #[serde(default = "default_stipa_timeout", with = "duration_secs")]
    pub stipa_timeout: Duration,
}

fn default_key_owner() -> Option<String> {
    Some(DEFAULT_KEY_OWNER.to_string())
}

fn default_ca_url() -> Url {
    Url::parse(DEFAULT_CA_URL).expect("valid default URL")
}

fn default_stipa_url() -> Url {
    Url::parse(DEFAULT_STIPA_URL).expect("valid default URL")
}

fn default_validity_days() -> u32 {
    DEFAULT_VALIDITY_DAYS
}

fn default_ca_timeout() -> Duration {
    DEFAULT_CA_TIMEOUT
}

fn default_stipa_timeout() -> Duration {
    DEFAULT_STIPA_TIMEOUT
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("subject", &self.subject)
            .field("key_path", &self.key_path)
            .field("key_owner", &self.key_owner)
            .field("ca_url", &self.ca_url)
            .field("ca_token", &!self.ca_token.is_empty())
            .field("validity_days", &self.validity_days)
            .field("ca_timeout", &self.ca_timeout)
            .field("spc_token", &!self.spc_token.is_empty())
            .field("stipa_url", &self.stipa_url)
            .field("stipa_username", &self.stipa_username)
            .field("stipa_password", &!self.stipa_password.is_empty())
            .field("spc_code", &self.spc_code)
            .field("stipa_timeout", &self.stipa_timeout)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            subject: SubjectInfo::default(),
            key_path: PathBuf::new(),
            key_owner: default_key_owner(),
            ca_url: default_ca_url(),
            ca_token: String::new(),
            validity_days: DEFAULT_VALIDITY_DAYS,
            ca_timeout: DEFAULT_CA_TIMEOUT,
            spc_token: String::new(),
            stipa_url: default_stipa_url(),
            stipa_username: String::new(),
            stipa_password: String::new(),
            spc_code: String::new(),
            stipa_timeout: DEFAULT_STIPA_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::new()
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| CertProviderError::configuration(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CertProviderError::configuration(format!("TOML serialize: {e}")))
    }

    /// Replace `${VAR}` references in string values with environment values.
    ///
    /// Unknown variables are left unchanged so the missing value shows up
    /// verbatim in later configuration errors.
    pub fn expand_variables(&mut self) {
        let subject = &mut self.subject;
        for field in [
            &mut subject.common_name,
            &mut subject.country,
            &mut subject.province,
            &mut subject.locality,
            &mut subject.organization,
            &mut subject.organizational_unit,
            &mut subject.email,
            &mut self.ca_token,
            &mut self.spc_token,
            &mut self.stipa_username,
            &mut self.stipa_password,
            &mut self.spc_code,
        ] {
            *field = expand_variables(field);
        }

        if let Some(ref mut owner) = self.key_owner {
            *owner = expand_variables(owner);
        }

        let key_path = expand_variables(&self.key_path.to_string_lossy());
        self.key_path = PathBuf::from(key_path);
    }
}

/// Expand `${NAME}` references using the process environment.
pub fn expand_variables(input: &str) -> String {
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        let Some(var_end) = result[absolute_start..].find('}') else {
            break;
        };
        let absolute_end = absolute_start + var_end;
        let var_name = &result[absolute_start + 2..absolute_end];

        match std::env::var(var_name) {
            Ok(value) => {
                result.replace_range(absolute_start..absolute_end + 1, &value);
                start = absolute_start + value.len();
            }
            Err(_) => start = absolute_end + 1,
        }
    }

    result
}

/// Builder for [`ProviderConfig`].
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Create a new builder populated with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CSR subject.
    pub fn subject(mut self, subject: SubjectInfo) -> Self {
        self.config.subject = subject;
        self
    }

    /// Set the private key file path.
    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.key_path = path.into();
        self
    }

    /// Set the service account that owns the key file.
    pub fn key_owner(mut self, owner: impl Into<String>) -> Self {
        self.config.key_owner = Some(owner.into());
        self
    }

    /// Keep the key file owned by the current process user.
    pub fn without_key_owner(mut self) -> Self {
        self.config.key_owner = None;
        self
    }

    /// Set the certificate authority endpoint.
    pub fn ca_url(mut self, url: impl AsRef<str>) -> std::result::Result<Self, url::ParseError> {
        self.config.ca_url = Url::parse(url.as_ref())?;
        Ok(self)
    }

    /// Set the certificate authority bearer token.
    pub fn ca_token(mut self, token: impl Into<String>) -> Self {
        self.config.ca_token = token.into();
        self
    }

    /// Set the requested validity in days.
    pub fn validity_days(mut self, days: u32) -> Self {
        self.config.validity_days = days;
        self
    }

    /// Set the CA request timeout.
    pub fn ca_timeout(mut self, timeout: Duration) -> Self {
        self.config.ca_timeout = timeout;
        self
    }

    /// Set a pre-provisioned SPC token.
    pub fn spc_token(mut self, token: impl Into<String>) -> Self {
        self.config.spc_token = token.into();
        self
    }

    /// Set the STI-PA API base URL.
    pub fn stipa_url(mut self, url: impl AsRef<str>) -> std::result::Result<Self, url::ParseError> {
        self.config.stipa_url = Url::parse(url.as_ref())?;
        Ok(self)
    }

    /// Set STI-PA login credentials.
    pub fn stipa_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.stipa_username = username.into();
        self.config.stipa_password = password.into();
        self
    }

    /// Set the Service Provider Code (OCN).
    pub fn spc_code(mut self, code: impl Into<String>) -> Self {
        self.config.spc_code = code.into();
        self
    }

    /// Set the STI-PA request timeout.
    pub fn stipa_timeout(mut self, timeout: Duration) -> Self {
        self.config.stipa_timeout = timeout;
        self
    }

    /// Build the configuration.
    ///
    /// Missing credentials are not rejected here; each component reports
    /// them as configuration errors before doing any I/O.
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}
