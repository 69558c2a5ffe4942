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

//! CSR (Certificate Signing Request) generation.
//!
//! The request layout is fixed by what STIR/SHAKEN certificate authorities
//! accept:
//!
//! - subject RDNs in the order C, ST, L, O, OU, CN (CN only when set),
//!   followed by a PKCS#9 `emailAddress` RDN;
//! - an `extensionRequest` attribute carrying a subjectAltName with the same
//!   address as an `rfc822Name`;
//! - an `ecdsa-with-SHA1` signature by the [`SigningKey`].
//!
//! # Example
//!
//! ```no_run
//! use stir_certprovider::csr::CsrBuilder;
//! use stir_certprovider::keystore::SigningKey;
//! use stir_certprovider::SubjectInfo;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let subject = SubjectInfo {
//!     common_name: "sip.example.com".into(),
//!     country: "US".into(),
//!     ..Default::default()
//! };
//! let key = SigningKey::generate();
//! let pem = CsrBuilder::new(subject)
//!     .email("noc@example.com")
//!     .build(&key)?;
//! # Ok(())
//! # }
//! ```

use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString, Ia5String, OctetString, SetOfVec};
use der::pem::LineEnding;
use der::{Decode, Encode, Tag};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use p256::PublicKey;
use sha1::{Digest, Sha1};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::attr::{Attribute, AttributeTypeAndValue};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::config::SubjectInfo;
use crate::error::{CertProviderError, Result};
use crate::keystore::SigningKey;

/// PEM label of an encoded request.
pub const CSR_PEM_LABEL: &str = "CERTIFICATE REQUEST";

/// `countryName` (2.5.4.6).
pub const COUNTRY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
/// `stateOrProvinceName` (2.5.4.8).
pub const STATE_OR_PROVINCE_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
/// `localityName` (2.5.4.7).
pub const LOCALITY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
/// `organizationName` (2.5.4.10).
pub const ORGANIZATION_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
/// `organizationalUnitName` (2.5.4.11).
pub const ORGANIZATIONAL_UNIT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
/// `commonName` (2.5.4.3).
pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
/// PKCS#9 `emailAddress` (1.2.840.113549.1.9.1).
pub const EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");
/// PKCS#9 `extensionRequest` (1.2.840.113549.1.9.14).
pub const EXTENSION_REQUEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");
/// `subjectAltName` extension (2.5.29.17).
pub const SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");
/// `ecdsa-with-SHA1` (1.2.840.10045.4.1).
pub const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

/// Builder for the certificate signing request sent to the CA.
#[derive(Debug, Clone)]
pub struct CsrBuilder {
    subject: SubjectInfo,
    email: String,
}

impl CsrBuilder {
    /// Create a builder for `subject`, using its e-mail field.
    pub fn new(subject: SubjectInfo) -> Self {
        let email = subject.email.clone();
        Self { subject, email }
    }

    /// Override the e-mail address placed in the subject and SAN.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Build and sign the request, returning it PEM encoded.
    pub fn build(&self, key: &SigningKey) -> Result<String> {
        let der = self.build_der(key)?;
        der::pem::encode_string(CSR_PEM_LABEL, LineEnding::LF, &der)
            .map_err(|e| CertProviderError::encoding(format!("Failed to PEM encode CSR: {e}")))
    }

    /// Build and sign the request, returning the DER bytes.
    pub fn build_der(&self, key: &SigningKey) -> Result<Vec<u8>> {
        let public_key = key
            .public_key()
            .to_public_key_der()
            .map_err(|e| CertProviderError::encoding(format!("Failed to encode public key: {e}")))?;

        let info = CertReqInfo {
            version: Version::V1,
            subject: self.subject_name()?,
            public_key: SubjectPublicKeyInfoOwned::from_der(public_key.as_bytes())?,
            attributes: SetOfVec::try_from(vec![self.extension_request()?])?,
        };

        let digest = Sha1::digest(info.to_der()?);
        let signature: Signature = key
            .ecdsa()
            .sign_prehash(&digest)
            .map_err(|e| CertProviderError::encoding(format!("Failed to sign CSR: {e}")))?;

        let request = CertReq {
            info,
            algorithm: AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA1,
                parameters: None,
            },
            signature: BitString::from_bytes(signature.to_der().as_bytes())?,
        };

        tracing::debug!("Built CSR for '{}' <{}>", self.subject.common_name, self.email);

        Ok(request.to_der()?)
    }

    fn subject_name(&self) -> Result<Name> {
        let s = &self.subject;
        let mut rdns = vec![
            rdn(COUNTRY_NAME, &s.country)?,
            rdn(STATE_OR_PROVINCE_NAME, &s.province)?,
            rdn(LOCALITY_NAME, &s.locality)?,
            rdn(ORGANIZATION_NAME, &s.organization)?,
            rdn(ORGANIZATIONAL_UNIT_NAME, &s.organizational_unit)?,
        ];
        if !s.common_name.is_empty() {
            rdns.push(rdn(COMMON_NAME, &s.common_name)?);
        }
        rdns.push(rdn(EMAIL_ADDRESS, &self.email)?);

        Ok(RdnSequence(rdns))
    }

    fn extension_request(&self) -> Result<Attribute> {
        let email = Ia5String::new(&self.email).map_err(|e| {
            CertProviderError::encoding(format!("E-mail address is not IA5: {e}"))
        })?;
        let san = SubjectAltName(vec![GeneralName::Rfc822Name(email)]);
        let extensions = vec![Extension {
            extn_id: SUBJECT_ALT_NAME,
            critical: false,
            extn_value: OctetString::new(san.to_der()?)?,
        }];

        Ok(Attribute {
            oid: EXTENSION_REQUEST,
            values: SetOfVec::try_from(vec![Any::from_der(&extensions.to_der()?)?])?,
        })
    }
}

/// Build a PEM CSR for `subject` with `email`, signed by `key`.
pub fn build_csr(subject: &SubjectInfo, email: &str, key: &SigningKey) -> Result<String> {
    CsrBuilder::new(subject.clone()).email(email).build(key)
}

fn rdn(oid: ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let tag = if is_printable(value) {
        Tag::PrintableString
    } else {
        Tag::Utf8String
    };
    let atv = AttributeTypeAndValue {
        oid,
        value: Any::new(tag, value.as_bytes())?,
    };

    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
}

// X.680 PrintableString alphabet.
fn is_printable(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b" '()+,-./:=?".contains(&b))
}

/// A decoded CSR, for inspecting what [`CsrBuilder`] produced.
#[derive(Debug, Clone)]
pub struct ParsedCsr {
    request: CertReq,
}

impl ParsedCsr {
    /// Decode a PEM `CERTIFICATE REQUEST` block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) = der::pem::decode_vec(pem.as_bytes())
            .map_err(|e| CertProviderError::invalid_csr(format!("not a PEM block: {e}")))?;
        if label != CSR_PEM_LABEL {
            return Err(CertProviderError::invalid_csr(format!(
                "unexpected PEM label '{label}'"
            )));
        }
        Self::from_der(&der)
    }

    /// Decode DER bytes.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            request: CertReq::from_der(der)?,
        })
    }

    /// First subject value stored under `oid`.
    pub fn subject_value(&self, oid: ObjectIdentifier) -> Option<String> {
        self.request
            .info
            .subject
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .find(|atv| atv.oid == oid)
            .and_then(|atv| std::str::from_utf8(atv.value.value()).ok())
            .map(str::to_owned)
    }

    /// The PKCS#9 e-mail address carried in the subject.
    pub fn email_attribute(&self) -> Option<String> {
        self.subject_value(EMAIL_ADDRESS)
    }

    /// Subject attribute OIDs in encoded order.
    pub fn subject_oids(&self) -> Vec<ObjectIdentifier> {
        self.request
            .info
            .subject
            .0
            .iter()
            .flat_map(|rdn| rdn.0.iter())
            .map(|atv| atv.oid)
            .collect()
    }

    /// `rfc822Name` entries of the requested subjectAltName extension.
    pub fn san_emails(&self) -> Result<Vec<String>> {
        let mut emails = Vec::new();

        for attr in self.request.info.attributes.iter() {
            if attr.oid != EXTENSION_REQUEST {
                continue;
            }
            for value in attr.values.iter() {
                let extensions = Vec::<Extension>::from_der(&value.to_der()?)?;
                for ext in extensions.iter().filter(|e| e.extn_id == SUBJECT_ALT_NAME) {
                    let san = SubjectAltName::from_der(ext.extn_value.as_bytes())?;
                    emails.extend(san.0.iter().filter_map(|name| match name {
                        GeneralName::Rfc822Name(email) => Some(email.to_string()),
                        _ => None,
                    }));
                }
            }
        }

        Ok(emails)
    }

    /// Signature algorithm OID.
    pub fn signature_algorithm(&self) -> ObjectIdentifier {
        self.request.algorithm.oid
    }

    /// Public key the request was issued for.
    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_sec1_bytes(self.request.info.public_key.subject_public_key.raw_bytes())
            .map_err(|e| CertProviderError::invalid_csr(format!("bad public key: {e}")))
    }

    /// Check the self-signature against the embedded public key.
    pub fn verify_signature(&self) -> Result<()> {
        if self.request.algorithm.oid != ECDSA_WITH_SHA1 {
            return Err(CertProviderError::invalid_csr(format!(
                "unsupported signature algorithm {}",
                self.request.algorithm.oid
            )));
        }

        let verifying_key = VerifyingKey::from(&self.public_key()?);
        let signature = Signature::from_der(self.request.signature.raw_bytes())
            .map_err(|e| CertProviderError::invalid_csr(format!("bad signature encoding: {e}")))?;
        let digest = Sha1::digest(self.request.info.to_der()?);

        verifying_key
            .verify_prehash(&digest, &signature)
            .map_err(|_| CertProviderError::invalid_csr("signature does not verify"))
    }
}
