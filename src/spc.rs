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

//! TNAuthList `tkvalue` encoding of a Service Provider Code.
//!
//! The STI-PA token API identifies the carrier by a DER-encoded TNAuthList
//! holding a single SPC entry, base64 encoded:
//!
//! ```text
//! SEQUENCE {
//!   [0] EXPLICIT IA5String "119F"
//! }
//! ```
//!
//! `"119F"` therefore encodes to `MAigBhYEMTE5Rg==`.

use base64::prelude::*;
use der::asn1::Ia5String;
use der::{Decode, Encode, Sequence};

use crate::error::{CertProviderError, Result};

/// Token type sent alongside the encoded SPC.
pub const TNAUTHLIST_TOKEN_TYPE: &str = "TNAuthList";

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct TnAuthListSpc {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    spc: Ia5String,
}

/// Encode an SPC/OCN code as a base64 TNAuthList `tkvalue`.
///
/// # Errors
///
/// A configuration error for an empty code; an encoding error for codes
/// that are not IA5 (ASCII).
pub fn encode_spc(spc: &str) -> Result<String> {
    if spc.is_empty() {
        return Err(CertProviderError::configuration("SPC code is empty"));
    }

    let spc = Ia5String::new(spc)
        .map_err(|e| CertProviderError::encoding(format!("SPC code is not IA5: {e}")))?;
    let der = TnAuthListSpc { spc }.to_der()?;

    Ok(BASE64_STANDARD.encode(der))
}

/// Decode a base64 TNAuthList `tkvalue` back to the SPC code.
pub fn decode_spc(tkvalue: &str) -> Result<String> {
    let der = BASE64_STANDARD
        .decode(tkvalue)
        .map_err(|e| CertProviderError::encoding(format!("tkvalue is not base64: {e}")))?;
    let entry = TnAuthListSpc::from_der(&der)?;

    Ok(entry.spc.to_string())
}
