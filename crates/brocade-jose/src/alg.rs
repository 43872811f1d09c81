//! The signature algorithm registry.
//!
//! Every entry maps to exactly one (key kind, hash, padding) triple.
//! The same enum serves JOSE (`"ES256"`) and COSE (`-7`); there is no
//! "alg: none" and no Ed448 (absent from the underlying crypto stack).

use serde::{Deserialize, Serialize};

use crate::error::{JoseError, Result};

/// Kind of key material an algorithm requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// NIST P-256
    EcP256,
    /// NIST P-384
    EcP384,
    /// NIST P-521
    EcP521,
    /// RSA (any size the padding accepts)
    Rsa,
    /// Ed25519
    Ed25519,
    /// Symmetric octet secret
    Oct,
}

/// Supported signature algorithms (RFC 7518 / RFC 8152)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// ECDSA with P-256 and SHA-256
    #[serde(rename = "ES256")]
    Es256,
    /// ECDSA with P-384 and SHA-384
    #[serde(rename = "ES384")]
    Es384,
    /// ECDSA with P-521 and SHA-512
    #[serde(rename = "ES512")]
    Es512,
    /// RSASSA-PSS with SHA-256
    #[serde(rename = "PS256")]
    Ps256,
    /// RSASSA-PSS with SHA-384
    #[serde(rename = "PS384")]
    Ps384,
    /// RSASSA-PSS with SHA-512
    #[serde(rename = "PS512")]
    Ps512,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    #[serde(rename = "RS256")]
    Rs256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    #[serde(rename = "RS384")]
    Rs384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    #[serde(rename = "RS512")]
    Rs512,
    /// Ed25519
    #[serde(rename = "EdDSA")]
    EdDsa,
    /// HMAC with SHA-256
    #[serde(rename = "HS256")]
    Hs256,
    /// HMAC with SHA-384
    #[serde(rename = "HS384")]
    Hs384,
    /// HMAC with SHA-512
    #[serde(rename = "HS512")]
    Hs512,
}

impl Algorithm {
    /// JOSE name, e.g. `"ES256"`
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Es256 => "ES256",
            Algorithm::Es384 => "ES384",
            Algorithm::Es512 => "ES512",
            Algorithm::Ps256 => "PS256",
            Algorithm::Ps384 => "PS384",
            Algorithm::Ps512 => "PS512",
            Algorithm::Rs256 => "RS256",
            Algorithm::Rs384 => "RS384",
            Algorithm::Rs512 => "RS512",
            Algorithm::EdDsa => "EdDSA",
            Algorithm::Hs256 => "HS256",
            Algorithm::Hs384 => "HS384",
            Algorithm::Hs512 => "HS512",
        }
    }

    /// Look up by JOSE name
    pub fn from_name(name: &str) -> Result<Algorithm> {
        Ok(match name {
            "ES256" => Algorithm::Es256,
            "ES384" => Algorithm::Es384,
            "ES512" => Algorithm::Es512,
            "PS256" => Algorithm::Ps256,
            "PS384" => Algorithm::Ps384,
            "PS512" => Algorithm::Ps512,
            "RS256" => Algorithm::Rs256,
            "RS384" => Algorithm::Rs384,
            "RS512" => Algorithm::Rs512,
            "EdDSA" => Algorithm::EdDsa,
            "HS256" => Algorithm::Hs256,
            "HS384" => Algorithm::Hs384,
            "HS512" => Algorithm::Hs512,
            other => return Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        })
    }

    /// COSE algorithm identifier (RFC 8152 / RFC 8230)
    pub fn cose_id(&self) -> i64 {
        match self {
            Algorithm::Es256 => -7,
            Algorithm::Es384 => -35,
            Algorithm::Es512 => -36,
            Algorithm::Ps256 => -37,
            Algorithm::Ps384 => -38,
            Algorithm::Ps512 => -39,
            Algorithm::Rs256 => -257,
            Algorithm::Rs384 => -258,
            Algorithm::Rs512 => -259,
            Algorithm::EdDsa => -8,
            Algorithm::Hs256 => 5,
            Algorithm::Hs384 => 6,
            Algorithm::Hs512 => 7,
        }
    }

    /// Look up by COSE identifier
    pub fn from_cose_id(id: i64) -> Result<Algorithm> {
        Ok(match id {
            -7 => Algorithm::Es256,
            -35 => Algorithm::Es384,
            -36 => Algorithm::Es512,
            -37 => Algorithm::Ps256,
            -38 => Algorithm::Ps384,
            -39 => Algorithm::Ps512,
            -257 => Algorithm::Rs256,
            -258 => Algorithm::Rs384,
            -259 => Algorithm::Rs512,
            -8 => Algorithm::EdDsa,
            5 => Algorithm::Hs256,
            6 => Algorithm::Hs384,
            7 => Algorithm::Hs512,
            other => return Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        })
    }

    /// The key material this algorithm signs with
    pub fn key_kind(&self) -> KeyKind {
        match self {
            Algorithm::Es256 => KeyKind::EcP256,
            Algorithm::Es384 => KeyKind::EcP384,
            Algorithm::Es512 => KeyKind::EcP521,
            Algorithm::Ps256
            | Algorithm::Ps384
            | Algorithm::Ps512
            | Algorithm::Rs256
            | Algorithm::Rs384
            | Algorithm::Rs512 => KeyKind::Rsa,
            Algorithm::EdDsa => KeyKind::Ed25519,
            Algorithm::Hs256 | Algorithm::Hs384 | Algorithm::Hs512 => KeyKind::Oct,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
