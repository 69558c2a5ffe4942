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

//! Persistent P-256 signing key storage.
//!
//! The signing key lives in a single PEM file. [`KeyStore::load_or_create`]
//! reuses the key if the file parses, otherwise it generates a fresh key and
//! persists it with owner-only permissions, owned by the configured service
//! account.
//!
//! # Example
//!
//! ```no_run
//! use stir_certprovider::keystore::KeyStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KeyStore::new("/etc/kamailio/stir/private_key.pem").with_owner("kamailio");
//! let key = store.load_or_create()?;
//! # Ok(())
//! # }
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use der::pem::LineEnding;
use p256::ecdsa::{SigningKey as EcdsaSigningKey, VerifyingKey};
use p256::elliptic_curve::zeroize::Zeroizing;
use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;

use crate::config::ProviderConfig;
use crate::error::{CertProviderError, Result};

/// PEM label for SEC1 EC private keys.
pub const SEC1_PEM_LABEL: &str = "EC PRIVATE KEY";

/// PEM label for PKCS#8 private keys.
pub const PKCS8_PEM_LABEL: &str = "PRIVATE KEY";

/// File mode applied to persisted keys.
pub const KEY_FILE_MODE: u32 = 0o600;

/// A P-256 private/public key pair.
#[derive(Clone)]
pub struct SigningKey {
    secret: SecretKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a fresh key from the OS random source.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Parse a PEM-encoded EC private key.
    ///
    /// Accepts SEC1 (`EC PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) blocks. A
    /// `PRIVATE KEY` block holding SEC1 bytes is accepted as well, since
    /// earlier tooling wrote keys that way.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) = der::pem::decode_vec(pem.as_bytes())
            .map_err(|e| CertProviderError::key_management(format!("Invalid key PEM: {e}")))?;
        let der = Zeroizing::new(der);

        let secret = match label {
            SEC1_PEM_LABEL => SecretKey::from_sec1_der(&der).map_err(|e| e.to_string()),
            PKCS8_PEM_LABEL => SecretKey::from_pkcs8_der(&der)
                .or_else(|_| SecretKey::from_sec1_der(&der))
                .map_err(|e| e.to_string()),
            other => Err(format!("unsupported PEM label '{other}'")),
        }
        .map_err(|e| CertProviderError::key_management(format!("Invalid EC private key: {e}")))?;

        Ok(Self { secret })
    }

    /// Encode the key as a SEC1 PEM block.
    pub fn to_pem(&self) -> Result<Zeroizing<String>> {
        self.secret
            .to_sec1_pem(LineEnding::LF)
            .map_err(|e| CertProviderError::encoding(format!("Failed to encode private key: {e}")))
    }

    /// Public half of the key pair.
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// ECDSA signer for this key.
    pub fn ecdsa(&self) -> EcdsaSigningKey {
        EcdsaSigningKey::from(&self.secret)
    }

    /// ECDSA verifier for this key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.public_key())
    }
}

/// On-disk home of the signing key.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
    owner: Option<String>,
}

impl KeyStore {
    /// Create a key store for `path` that leaves file ownership unchanged.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owner: None,
        }
    }

    /// Create a key store from provider configuration.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            path: config.key_path.clone(),
            owner: config.key_owner.clone(),
        }
    }

    /// Require newly written key files to be owned by `account`.
    pub fn with_owner(mut self, account: impl Into<String>) -> Self {
        self.owner = Some(account.into());
        self
    }

    /// Path of the key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the key at the configured path, creating it if needed.
    ///
    /// A missing or unparseable file triggers generation of a new key; any
    /// other read failure is returned so an unreadable but valid key is
    /// never replaced.
    pub fn load_or_create(&self) -> Result<SigningKey> {
        if self.path.as_os_str().is_empty() {
            return Err(CertProviderError::configuration("Private key path is empty"));
        }

        match fs::read_to_string(&self.path) {
            Ok(pem) => match SigningKey::from_pem(&pem) {
                Ok(key) => {
                    tracing::debug!("Reusing private key from {}", self.path.display());
                    return Ok(key);
                }
                Err(e) => {
                    tracing::warn!(
                        "Private key at {} is unparseable ({}), generating a new one",
                        self.path.display(),
                        e
                    );
                }
            },
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::info!(
                    "No private key at {}, generating a new one",
                    self.path.display()
                );
            }
            Err(e) if e.kind() == IoErrorKind::InvalidData => {
                tracing::warn!(
                    "Private key at {} is not text, generating a new one",
                    self.path.display()
                );
            }
            Err(e) => return Err(CertProviderError::key_io(self.display_path(), e)),
        }

        let key = SigningKey::generate();
        self.persist(&key)?;
        tracing::info!("Stored new P-256 private key at {}", self.path.display());
        Ok(key)
    }

    /// Write `key` to the configured path.
    ///
    /// The key is written to a sibling temporary file with mode 0600, handed
    /// to the service account, then renamed over the target.
    pub fn persist(&self, key: &SigningKey) -> Result<()> {
        let owner = self.resolve_owner()?;
        let pem = key.to_pem()?;
        let tmp = self.temp_path();

        let result = write_restricted(&tmp, pem.as_bytes())
            .and_then(|()| apply_owner(&tmp, owner.as_ref()))
            .and_then(|()| {
                fs::rename(&tmp, &self.path)
                    .map_err(|e| CertProviderError::key_io(self.display_path(), e))
            });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(unix)]
    fn resolve_owner(&self) -> Result<Option<nix::unistd::User>> {
        let Some(ref account) = self.owner else {
            return Ok(None);
        };

        match nix::unistd::User::from_name(account) {
            Ok(Some(user)) => Ok(Some(user)),
            Ok(None) => Err(CertProviderError::key_management(format!(
                "Unknown service account '{account}'"
            ))),
            Err(e) => Err(CertProviderError::key_management(format!(
                "Cannot look up service account '{account}': {e}"
            ))),
        }
    }

    #[cfg(not(unix))]
    fn resolve_owner(&self) -> Result<Option<()>> {
        if let Some(ref account) = self.owner {
            tracing::warn!(
                "Key file ownership ('{}') is not supported on this platform",
                account
            );
        }
        Ok(None)
    }
}

fn write_restricted(path: &Path, contents: &[u8]) -> Result<()> {
    let io_err = |e| CertProviderError::key_io(path.display().to_string(), e);

    // A leftover entry (possibly a symlink) is unlinked, never written through.
    match fs::remove_file(path) {
        Ok(()) => tracing::warn!("Removed stale temporary key file {}", path.display()),
        Err(e) if e.kind() == IoErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(KEY_FILE_MODE);
    }

    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;

    Ok(())
}

#[cfg(unix)]
fn apply_owner(path: &Path, owner: Option<&nix::unistd::User>) -> Result<()> {
    let Some(user) = owner else {
        return Ok(());
    };

    nix::unistd::chown(path, Some(user.uid), Some(user.gid)).map_err(|e| {
        CertProviderError::key_management(format!(
            "Cannot chown {} to '{}': {e}",
            path.display(),
            user.name
        ))
    })
}

#[cfg(not(unix))]
fn apply_owner(_path: &Path, _owner: Option<&()>) -> Result<()> {
    Ok(())
}
