//! Public key fingerprints in the form the STI-PA API expects.
//!
//! The fingerprint is the SHA-256 digest of the key's SSH wire encoding
//! (RFC 5656 `ecdsa-sha2-nistp256`), rendered as colon-separated lowercase
//! hex octets, e.g. `9f:2b:d7:...:51:ee`.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::keystore::SigningKey;

/// SSH key type name for P-256 ECDSA keys.
pub const SSH_KEY_TYPE: &str = "ecdsa-sha2-nistp256";

/// SSH curve identifier for P-256.
pub const SSH_CURVE_NAME: &str = "nistp256";

/// Fingerprint of a signing key's public half.
pub fn fingerprint(key: &SigningKey) -> String {
    public_key_fingerprint(&key.public_key())
}

/// Fingerprint of a P-256 public key.
pub fn public_key_fingerprint(public_key: &PublicKey) -> String {
    let digest = Sha256::digest(ssh_wire_encoding(public_key));
    format_colon_hex(&digest)
}

/// Fingerprint of the key held in PEM text.
pub fn fingerprint_from_pem(pem: &str) -> Result<String> {
    SigningKey::from_pem(pem).map(|key| fingerprint(&key))
}

/// SSH wire encoding of a P-256 public key.
///
/// Three length-prefixed strings: key type, curve name and the
/// uncompressed SEC1 point.
pub fn ssh_wire_encoding(public_key: &PublicKey) -> Vec<u8> {
    let point = public_key.to_encoded_point(false);

    let mut out = Vec::with_capacity(4 + SSH_KEY_TYPE.len() + 4 + SSH_CURVE_NAME.len() + 4 + 65);
    put_ssh_string(&mut out, SSH_KEY_TYPE.as_bytes());
    put_ssh_string(&mut out, SSH_CURVE_NAME.as_bytes());
    put_ssh_string(&mut out, point.as_bytes());
    out
}

fn put_ssh_string(out: &mut Vec<u8>, data: &[u8]) {
    // SSH strings are u32 big-endian length prefixed.
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

/// Format bytes as lowercase two-digit hex octets joined by colons.
pub fn format_colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
