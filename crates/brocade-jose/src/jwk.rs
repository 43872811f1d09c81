//! JSON Web Keys, in JSON and COSE_Key form.
//!
//! Key parameters live as base64url text exactly as they appear on
//! the wire; conversion to concrete curve/RSA/EdDSA types happens at
//! sign/verify time, keyed off the [`Algorithm`] registry. A key
//! whose `alg` field disagrees with the requested algorithm, or whose
//! curve cannot carry it, fails with `AlgorithmMismatch`.

use base64::Engine;
use base64::prelude::BASE64_URL_SAFE_NO_PAD as URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use smol_str::SmolStr;

use brocade_node::{Node, Value};

use crate::alg::{Algorithm, KeyKind};
use crate::error::{JoseError, Result};

/// A JSON Web Key (RFC 7517)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `EC`, `RSA`, `oct` or `OKP`
    pub kty: SmolStr,
    /// Curve name for EC/OKP keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<SmolStr>,
    /// EC/OKP public x coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC public y coordinate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// Private exponent / scalar / seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// RSA modulus
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA public exponent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// RSA first prime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// RSA second prime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Symmetric secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    /// Pinned algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<SmolStr>,
    /// Key identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<SmolStr>,
    /// Intended use (`sig` / `enc`)
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<SmolStr>,
}

fn b64(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

fn required(name: &'static str, field: &Option<String>) -> Result<Vec<u8>> {
    let text = field.as_ref().ok_or(JoseError::KeyMaterial(name))?;
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|_| JoseError::KeyMaterial(name))
}

fn crypto(e: impl std::fmt::Display) -> JoseError {
    JoseError::Crypto(e.to_string())
}

impl Jwk {
    /// Parse the JSON form
    pub fn from_json(text: &str) -> Result<Jwk> {
        Ok(serde_json::from_str(text)?)
    }

    /// Emit the JSON form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Symmetric key over a raw octet secret
    pub fn from_oct(secret: &[u8]) -> Jwk {
        Jwk {
            kty: "oct".into(),
            k: Some(b64(secret)),
            ..Jwk::default()
        }
    }

    /// EC key pair on P-256
    pub fn from_p256(secret: &p256::SecretKey) -> Jwk {
        use p256::elliptic_curve::sec1::ToEncodedPoint;
        let point = secret.public_key().to_encoded_point(false);
        Jwk {
            kty: "EC".into(),
            crv: Some("P-256".into()),
            x: point.x().map(|x| b64(x)),
            y: point.y().map(|y| b64(y)),
            d: Some(b64(&secret.to_bytes())),
            ..Jwk::default()
        }
    }

    /// EC key pair on P-384
    pub fn from_p384(secret: &p384::SecretKey) -> Jwk {
        use p384::elliptic_curve::sec1::ToEncodedPoint;
        let point = secret.public_key().to_encoded_point(false);
        Jwk {
            kty: "EC".into(),
            crv: Some("P-384".into()),
            x: point.x().map(|x| b64(x)),
            y: point.y().map(|y| b64(y)),
            d: Some(b64(&secret.to_bytes())),
            ..Jwk::default()
        }
    }

    /// EC key pair on P-521
    pub fn from_p521(secret: &p521::SecretKey) -> Jwk {
        use p521::elliptic_curve::sec1::ToEncodedPoint;
        let point = secret.public_key().to_encoded_point(false);
        Jwk {
            kty: "EC".into(),
            crv: Some("P-521".into()),
            x: point.x().map(|x| b64(x)),
            y: point.y().map(|y| b64(y)),
            d: Some(b64(&secret.to_bytes())),
            ..Jwk::default()
        }
    }

    /// RSA key pair
    pub fn from_rsa(key: &rsa::RsaPrivateKey) -> Jwk {
        use rsa::traits::{PrivateKeyParts, PublicKeyParts};
        let primes = key.primes();
        Jwk {
            kty: "RSA".into(),
            n: Some(b64(&key.n().to_bytes_be())),
            e: Some(b64(&key.e().to_bytes_be())),
            d: Some(b64(&key.d().to_bytes_be())),
            p: primes.first().map(|p| b64(&p.to_bytes_be())),
            q: primes.get(1).map(|q| b64(&q.to_bytes_be())),
            ..Jwk::default()
        }
    }

    /// RSA public key
    pub fn from_rsa_public(key: &rsa::RsaPublicKey) -> Jwk {
        use rsa::traits::PublicKeyParts;
        Jwk {
            kty: "RSA".into(),
            n: Some(b64(&key.n().to_bytes_be())),
            e: Some(b64(&key.e().to_bytes_be())),
            ..Jwk::default()
        }
    }

    /// Ed25519 key pair
    pub fn from_ed25519(key: &ed25519_dalek::SigningKey) -> Jwk {
        Jwk {
            kty: "OKP".into(),
            crv: Some("Ed25519".into()),
            x: Some(b64(key.verifying_key().as_bytes())),
            d: Some(b64(&key.to_bytes())),
            ..Jwk::default()
        }
    }

    /// The public half, with private material stripped
    pub fn public(&self) -> Jwk {
        Jwk {
            d: None,
            p: None,
            q: None,
            ..self.clone()
        }
    }

    /// True when private material is present
    pub fn is_private(&self) -> bool {
        self.d.is_some() || self.k.is_some()
    }

    /// The algorithm this key signs with: the pinned `alg` field if
    /// present, otherwise inferred from curve or size
    pub fn algorithm(&self) -> Result<Algorithm> {
        if let Some(alg) = &self.alg {
            return Algorithm::from_name(alg);
        }
        match self.kty.as_str() {
            "EC" => match self.crv.as_deref() {
                Some("P-256") => Ok(Algorithm::Es256),
                Some("P-384") => Ok(Algorithm::Es384),
                Some("P-521") => Ok(Algorithm::Es512),
                other => Err(JoseError::UnsupportedAlgorithm(format!(
                    "EC curve {other:?}"
                ))),
            },
            "OKP" => match self.crv.as_deref() {
                Some("Ed25519") => Ok(Algorithm::EdDsa),
                other => Err(JoseError::UnsupportedAlgorithm(format!(
                    "OKP curve {other:?}"
                ))),
            },
            "RSA" => Ok(Algorithm::Rs256),
            "oct" => {
                let len = required("k", &self.k)?.len();
                Ok(match len {
                    48 => Algorithm::Hs384,
                    64 => Algorithm::Hs512,
                    _ => Algorithm::Hs256,
                })
            }
            other => Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn key_kind(&self) -> Result<KeyKind> {
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("EC", Some("P-256")) => Ok(KeyKind::EcP256),
            ("EC", Some("P-384")) => Ok(KeyKind::EcP384),
            ("EC", Some("P-521")) => Ok(KeyKind::EcP521),
            ("OKP", Some("Ed25519")) => Ok(KeyKind::Ed25519),
            ("RSA", _) => Ok(KeyKind::Rsa),
            ("oct", _) => Ok(KeyKind::Oct),
            (kty, crv) => Err(JoseError::UnsupportedAlgorithm(format!("{kty}/{crv:?}"))),
        }
    }

    fn check_kind(&self, alg: Algorithm) -> Result<()> {
        if self.key_kind()? != alg.key_kind() {
            return Err(JoseError::AlgorithmMismatch(
                "key type cannot carry the requested algorithm",
            ));
        }
        if let Some(pinned) = &self.alg
            && Algorithm::from_name(pinned)? != alg
        {
            return Err(JoseError::AlgorithmMismatch(
                "key pins a different algorithm",
            ));
        }
        Ok(())
    }

    /// SEC1 uncompressed point from the x/y fields
    fn sec1_point(&self) -> Result<Vec<u8>> {
        let x = required("x", &self.x)?;
        let y = required("y", &self.y)?;
        let mut point = Vec::with_capacity(1 + x.len() + y.len());
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        Ok(point)
    }

    fn rsa_public(&self) -> Result<rsa::RsaPublicKey> {
        let n = rsa::BigUint::from_bytes_be(&required("n", &self.n)?);
        let e = rsa::BigUint::from_bytes_be(&required("e", &self.e)?);
        rsa::RsaPublicKey::new(n, e).map_err(crypto)
    }

    fn rsa_private(&self) -> Result<rsa::RsaPrivateKey> {
        let n = rsa::BigUint::from_bytes_be(&required("n", &self.n)?);
        let e = rsa::BigUint::from_bytes_be(&required("e", &self.e)?);
        let d = rsa::BigUint::from_bytes_be(&required("d", &self.d)?);
        let p = rsa::BigUint::from_bytes_be(&required("p", &self.p)?);
        let q = rsa::BigUint::from_bytes_be(&required("q", &self.q)?);
        rsa::RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(crypto)
    }

    /// Sign `data`, producing the raw signature bytes the JOSE/COSE
    /// wire formats carry
    pub fn sign(&self, alg: Algorithm, data: &[u8]) -> Result<Vec<u8>> {
        self.check_kind(alg)?;
        tracing::debug!(alg = %alg, "signing");
        match alg {
            Algorithm::Es256 => {
                let sk = p256::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                    .map_err(crypto)?;
                let sig: p256::ecdsa::Signature = sk.sign(data);
                Ok(sig.to_bytes().to_vec())
            }
            Algorithm::Es384 => {
                let sk = p384::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                    .map_err(crypto)?;
                let sig: p384::ecdsa::Signature = sk.sign(data);
                Ok(sig.to_bytes().to_vec())
            }
            Algorithm::Es512 => {
                let sk = p521::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                    .map_err(crypto)?;
                let sig: p521::ecdsa::Signature = sk.sign(data);
                Ok(sig.to_bytes().to_vec())
            }
            Algorithm::Rs256 => self.rsa_pkcs1_sign::<sha2::Sha256>(data),
            Algorithm::Rs384 => self.rsa_pkcs1_sign::<sha2::Sha384>(data),
            Algorithm::Rs512 => self.rsa_pkcs1_sign::<sha2::Sha512>(data),
            Algorithm::Ps256 => self.rsa_pss_sign::<sha2::Sha256>(data),
            Algorithm::Ps384 => self.rsa_pss_sign::<sha2::Sha384>(data),
            Algorithm::Ps512 => self.rsa_pss_sign::<sha2::Sha512>(data),
            Algorithm::EdDsa => {
                let d = required("d", &self.d)?;
                let d: [u8; 32] = d
                    .try_into()
                    .map_err(|_| JoseError::KeyMaterial("d"))?;
                let sk = ed25519_dalek::SigningKey::from_bytes(&d);
                let sig: ed25519_dalek::Signature = sk.sign(data);
                Ok(sig.to_bytes().to_vec())
            }
            Algorithm::Hs256 => self.hmac_sign::<sha2::Sha256>(data),
            Algorithm::Hs384 => self.hmac_sign::<sha2::Sha384>(data),
            Algorithm::Hs512 => self.hmac_sign::<sha2::Sha512>(data),
        }
    }

    /// Verify `sig` over `data`
    pub fn verify(&self, alg: Algorithm, data: &[u8], sig: &[u8]) -> Result<()> {
        self.check_kind(alg)?;
        match alg {
            Algorithm::Es256 => {
                let vk = self.p256_verifying()?;
                let sig = p256::ecdsa::Signature::from_slice(sig)
                    .map_err(|_| JoseError::VerifyFailed)?;
                vk.verify(data, &sig).map_err(|_| JoseError::VerifyFailed)
            }
            Algorithm::Es384 => {
                let vk = self.p384_verifying()?;
                let sig = p384::ecdsa::Signature::from_slice(sig)
                    .map_err(|_| JoseError::VerifyFailed)?;
                vk.verify(data, &sig).map_err(|_| JoseError::VerifyFailed)
            }
            Algorithm::Es512 => {
                let vk = self.p521_verifying()?;
                let sig = p521::ecdsa::Signature::from_slice(sig)
                    .map_err(|_| JoseError::VerifyFailed)?;
                vk.verify(data, &sig).map_err(|_| JoseError::VerifyFailed)
            }
            Algorithm::Rs256 => self.rsa_pkcs1_verify::<sha2::Sha256>(data, sig),
            Algorithm::Rs384 => self.rsa_pkcs1_verify::<sha2::Sha384>(data, sig),
            Algorithm::Rs512 => self.rsa_pkcs1_verify::<sha2::Sha512>(data, sig),
            Algorithm::Ps256 => self.rsa_pss_verify::<sha2::Sha256>(data, sig),
            Algorithm::Ps384 => self.rsa_pss_verify::<sha2::Sha384>(data, sig),
            Algorithm::Ps512 => self.rsa_pss_verify::<sha2::Sha512>(data, sig),
            Algorithm::EdDsa => {
                let x = required("x", &self.x)?;
                let x: [u8; 32] = x
                    .try_into()
                    .map_err(|_| JoseError::KeyMaterial("x"))?;
                let vk = ed25519_dalek::VerifyingKey::from_bytes(&x).map_err(crypto)?;
                let sig: [u8; 64] = sig.try_into().map_err(|_| JoseError::VerifyFailed)?;
                vk.verify(data, &ed25519_dalek::Signature::from_bytes(&sig))
                    .map_err(|_| JoseError::VerifyFailed)
            }
            Algorithm::Hs256 => self.hmac_verify::<sha2::Sha256>(data, sig),
            Algorithm::Hs384 => self.hmac_verify::<sha2::Sha384>(data, sig),
            Algorithm::Hs512 => self.hmac_verify::<sha2::Sha512>(data, sig),
        }
    }

    fn p256_verifying(&self) -> Result<p256::ecdsa::VerifyingKey> {
        if self.x.is_some() {
            p256::ecdsa::VerifyingKey::from_sec1_bytes(&self.sec1_point()?).map_err(crypto)
        } else {
            let sk = p256::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                .map_err(crypto)?;
            Ok(*sk.verifying_key())
        }
    }

    fn p384_verifying(&self) -> Result<p384::ecdsa::VerifyingKey> {
        if self.x.is_some() {
            p384::ecdsa::VerifyingKey::from_sec1_bytes(&self.sec1_point()?).map_err(crypto)
        } else {
            let sk = p384::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                .map_err(crypto)?;
            Ok(*sk.verifying_key())
        }
    }

    fn p521_verifying(&self) -> Result<p521::ecdsa::VerifyingKey> {
        if self.x.is_some() {
            p521::ecdsa::VerifyingKey::from_sec1_bytes(&self.sec1_point()?).map_err(crypto)
        } else {
            let sk = p521::ecdsa::SigningKey::from_slice(&required("d", &self.d)?)
                .map_err(crypto)?;
            Ok(p521::ecdsa::VerifyingKey::from(&sk))
        }
    }

    fn rsa_pkcs1_sign<D>(&self, data: &[u8]) -> Result<Vec<u8>>
    where
        D: rsa::sha2::Digest + der::oid::AssociatedOid,
    {
        let sk = rsa::pkcs1v15::SigningKey::<D>::new(self.rsa_private()?);
        Ok(sk.sign(data).to_vec())
    }

    fn rsa_pkcs1_verify<D>(&self, data: &[u8], sig: &[u8]) -> Result<()>
    where
        D: rsa::sha2::Digest + der::oid::AssociatedOid,
    {
        let vk = rsa::pkcs1v15::VerifyingKey::<D>::new(self.rsa_public()?);
        let sig =
            rsa::pkcs1v15::Signature::try_from(sig).map_err(|_| JoseError::VerifyFailed)?;
        vk.verify(data, &sig).map_err(|_| JoseError::VerifyFailed)
    }

    fn rsa_pss_sign<D>(&self, data: &[u8]) -> Result<Vec<u8>>
    where
        D: rsa::sha2::Digest + rsa::sha2::digest::FixedOutputReset,
    {
        let sk = rsa::pss::SigningKey::<D>::new(self.rsa_private()?);
        Ok(sk.sign_with_rng(&mut rand::rngs::OsRng, data).to_vec())
    }

    fn rsa_pss_verify<D>(&self, data: &[u8], sig: &[u8]) -> Result<()>
    where
        D: rsa::sha2::Digest + rsa::sha2::digest::FixedOutputReset,
    {
        let vk = rsa::pss::VerifyingKey::<D>::new(self.rsa_public()?);
        let sig = rsa::pss::Signature::try_from(sig).map_err(|_| JoseError::VerifyFailed)?;
        vk.verify(data, &sig).map_err(|_| JoseError::VerifyFailed)
    }

    fn hmac_sign<D>(&self, data: &[u8]) -> Result<Vec<u8>>
    where
        D: hmac::digest::Digest + hmac::digest::core_api::BlockSizeUser,
    {
        use hmac::Mac;
        let mut mac = hmac::SimpleHmac::<D>::new_from_slice(&required("k", &self.k)?)
            .map_err(crypto)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn hmac_verify<D>(&self, data: &[u8], sig: &[u8]) -> Result<()>
    where
        D: hmac::digest::Digest + hmac::digest::core_api::BlockSizeUser,
    {
        use hmac::Mac;
        let mut mac = hmac::SimpleHmac::<D>::new_from_slice(&required("k", &self.k)?)
            .map_err(crypto)?;
        mac.update(data);
        mac.verify_slice(sig).map_err(|_| JoseError::VerifyFailed)
    }

    // ---- COSE_Key form ------------------------------------------------

    /// Build the COSE_Key shape (RFC 8152 §13 / RFC 8230) as a value
    /// tree. Serialize it with the CBOR writer's `int_keys` option.
    pub fn to_node(&self) -> Result<Node> {
        let node = Node::map();
        let put_bytes = |key: &str, field: &Option<String>, name: &'static str| -> Result<()> {
            if field.is_some() {
                node.put(&format!("[\"{key}\"]"), required(name, field)?)
                    .map_err(JoseError::from)?;
            }
            Ok(())
        };
        match self.kty.as_str() {
            "OKP" => {
                node.put("[\"1\"]", 1).map_err(JoseError::from)?;
                node.put("[\"-1\"]", 6).map_err(JoseError::from)?;
                put_bytes("-2", &self.x, "x")?;
                put_bytes("-4", &self.d, "d")?;
            }
            "EC" => {
                node.put("[\"1\"]", 2).map_err(JoseError::from)?;
                let crv = match self.crv.as_deref() {
                    Some("P-256") => 1,
                    Some("P-384") => 2,
                    Some("P-521") => 3,
                    other => {
                        return Err(JoseError::UnsupportedAlgorithm(format!(
                            "EC curve {other:?}"
                        )));
                    }
                };
                node.put("[\"-1\"]", crv).map_err(JoseError::from)?;
                put_bytes("-2", &self.x, "x")?;
                put_bytes("-3", &self.y, "y")?;
                put_bytes("-4", &self.d, "d")?;
            }
            "RSA" => {
                node.put("[\"1\"]", 3).map_err(JoseError::from)?;
                put_bytes("-1", &self.n, "n")?;
                put_bytes("-2", &self.e, "e")?;
                put_bytes("-3", &self.d, "d")?;
                put_bytes("-4", &self.p, "p")?;
                put_bytes("-5", &self.q, "q")?;
            }
            "oct" => {
                node.put("[\"1\"]", 4).map_err(JoseError::from)?;
                put_bytes("-1", &self.k, "k")?;
            }
            other => return Err(JoseError::UnsupportedAlgorithm(other.to_string())),
        }
        if let Some(alg) = &self.alg {
            let id = Algorithm::from_name(alg)?.cose_id();
            node.put("[\"3\"]", id).map_err(JoseError::from)?;
        }
        Ok(node)
    }

    /// Read a COSE_Key shape back into a JWK
    pub fn from_node(node: &Node) -> Result<Jwk> {
        let get_bytes = |label: &str| -> Option<String> {
            node.get(&format!("[\"{label}\"]"))
                .and_then(|n| n.buffer_value().ok())
                .map(|b| b64(&b))
        };
        let kty = node
            .get("[\"1\"]")
            .ok_or_else(|| JoseError::malformed("COSE_Key", "missing kty"))?
            .long_value()
            .map_err(|_| JoseError::malformed("COSE_Key", "non-numeric kty"))?;
        let mut jwk = match kty {
            1 => {
                let crv = node.get("[\"-1\"]").and_then(|n| n.long_value().ok());
                if crv != Some(6) {
                    return Err(JoseError::malformed("COSE_Key", "unsupported OKP curve"));
                }
                Jwk {
                    kty: "OKP".into(),
                    crv: Some("Ed25519".into()),
                    x: get_bytes("-2"),
                    d: get_bytes("-4"),
                    ..Jwk::default()
                }
            }
            2 => {
                let crv = match node.get("[\"-1\"]").and_then(|n| n.long_value().ok()) {
                    Some(1) => "P-256",
                    Some(2) => "P-384",
                    Some(3) => "P-521",
                    _ => {
                        return Err(JoseError::malformed("COSE_Key", "unsupported EC curve"));
                    }
                };
                Jwk {
                    kty: "EC".into(),
                    crv: Some(crv.into()),
                    x: get_bytes("-2"),
                    y: get_bytes("-3"),
                    d: get_bytes("-4"),
                    ..Jwk::default()
                }
            }
            3 => Jwk {
                kty: "RSA".into(),
                n: get_bytes("-1"),
                e: get_bytes("-2"),
                d: get_bytes("-3"),
                p: get_bytes("-4"),
                q: get_bytes("-5"),
                ..Jwk::default()
            },
            4 => Jwk {
                kty: "oct".into(),
                k: get_bytes("-1"),
                ..Jwk::default()
            },
            other => {
                return Err(JoseError::malformed(
                    "COSE_Key",
                    format!("unsupported kty {other}"),
                ));
            }
        };
        if let Some(id) = node.get("[\"3\"]").and_then(|n| n.long_value().ok()) {
            jwk.alg = Some(Algorithm::from_cose_id(id)?.name().into());
        }
        Ok(jwk)
    }

    /// Parse the CBOR (COSE_Key) wire form
    pub fn from_cose_slice(bytes: &[u8]) -> Result<Jwk> {
        Jwk::from_node(&brocade_codec::cbor::from_slice(bytes)?)
    }

    /// Emit the CBOR (COSE_Key) wire form
    pub fn to_cose_vec(&self) -> Result<Vec<u8>> {
        use brocade_codec::cbor::{CborWriteOptions, CborWriter};
        let mut writer = CborWriter::new(CborWriteOptions::builder().int_keys(true).build());
        writer.write_node(&self.to_node()?)?;
        Ok(writer.into_bytes())
    }
}

/// Build a verification JWK from an X.509 SubjectPublicKeyInfo
pub(crate) fn jwk_from_spki(spki_der: &[u8], alg: Algorithm) -> Result<Jwk> {
    const OID_EC: &str = "1.2.840.10045.2.1";
    const OID_RSA: &str = "1.2.840.113549.1.1.1";
    const OID_ED25519: &str = "1.3.101.112";

    use der::Decode;
    let spki = x509_cert::spki::SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| JoseError::malformed("SubjectPublicKeyInfo", e.to_string()))?;
    let oid = spki.algorithm.oid.to_string();
    let key_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| JoseError::malformed("SubjectPublicKeyInfo", "unaligned key bits"))?;
    match oid.as_str() {
        OID_EC => {
            // uncompressed SEC1 point: 0x04 || x || y
            if key_bytes.first() != Some(&0x04) || key_bytes.len() % 2 != 1 {
                return Err(JoseError::malformed(
                    "SubjectPublicKeyInfo",
                    "EC key is not an uncompressed point",
                ));
            }
            let half = (key_bytes.len() - 1) / 2;
            let crv = match alg {
                Algorithm::Es256 => "P-256",
                Algorithm::Es384 => "P-384",
                Algorithm::Es512 => "P-521",
                _ => {
                    return Err(JoseError::AlgorithmMismatch(
                        "EC certificate with a non-EC algorithm",
                    ));
                }
            };
            Ok(Jwk {
                kty: "EC".into(),
                crv: Some(crv.into()),
                x: Some(b64(&key_bytes[1..1 + half])),
                y: Some(b64(&key_bytes[1 + half..])),
                ..Jwk::default()
            })
        }
        OID_RSA => {
            use rsa::pkcs8::DecodePublicKey;
            let key = rsa::RsaPublicKey::from_public_key_der(spki_der)
                .map_err(|e| JoseError::malformed("SubjectPublicKeyInfo", e.to_string()))?;
            Ok(Jwk::from_rsa_public(&key))
        }
        OID_ED25519 => Ok(Jwk {
            kty: "OKP".into(),
            crv: Some("Ed25519".into()),
            x: Some(b64(key_bytes)),
            ..Jwk::default()
        }),
        other => Err(JoseError::UnsupportedAlgorithm(format!(
            "certificate key {other}"
        ))),
    }
}

/// Node helper used by the COSE layer: bytes of a buffer-valued label
pub(crate) fn node_buffer(node: &Node) -> Option<bytes::Bytes> {
    node.with_value(|v| match v {
        Value::Buffer(b) => Some(b.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oct_key_infers_hmac_size() {
        assert_eq!(
            Jwk::from_oct(&[0u8; 32]).algorithm().unwrap(),
            Algorithm::Hs256
        );
        assert_eq!(
            Jwk::from_oct(&[0u8; 48]).algorithm().unwrap(),
            Algorithm::Hs384
        );
        assert_eq!(
            Jwk::from_oct(&[0u8; 64]).algorithm().unwrap(),
            Algorithm::Hs512
        );
    }

    #[test]
    fn pinned_alg_wins() {
        let mut key = Jwk::from_oct(&[0u8; 64]);
        key.alg = Some("HS256".into());
        assert_eq!(key.algorithm().unwrap(), Algorithm::Hs256);
    }

    #[test]
    fn p256_inference_and_round_trip() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let key = Jwk::from_p256(&secret);
        assert_eq!(key.algorithm().unwrap(), Algorithm::Es256);
        let json = key.to_json().unwrap();
        let parsed = Jwk::from_json(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn sign_verify_all_curves() {
        let data = b"attested bytes";
        for (key, alg) in [
            (
                Jwk::from_p256(&p256::SecretKey::random(&mut rand::rngs::OsRng)),
                Algorithm::Es256,
            ),
            (
                Jwk::from_p384(&p384::SecretKey::random(&mut rand::rngs::OsRng)),
                Algorithm::Es384,
            ),
            (
                Jwk::from_p521(&p521::SecretKey::random(&mut rand::rngs::OsRng)),
                Algorithm::Es512,
            ),
        ] {
            let sig = key.sign(alg, data).expect("sign");
            key.public().verify(alg, data, &sig).expect("verify");
            assert!(key.public().verify(alg, b"other bytes", &sig).is_err());
        }
    }

    #[test]
    fn sign_verify_ed25519_and_hmac() {
        let data = b"attested bytes";
        let key = Jwk::from_ed25519(&ed25519_dalek::SigningKey::generate(
            &mut rand::rngs::OsRng,
        ));
        let sig = key.sign(Algorithm::EdDsa, data).unwrap();
        key.public().verify(Algorithm::EdDsa, data, &sig).unwrap();

        let key = Jwk::from_oct(b"a-very-secret-key");
        let sig = key.sign(Algorithm::Hs256, data).unwrap();
        key.verify(Algorithm::Hs256, data, &sig).unwrap();
        assert!(key.verify(Algorithm::Hs256, data, &sig[..31]).is_err());
    }

    #[test]
    fn mismatched_algorithm_rejected() {
        let key = Jwk::from_oct(b"secret");
        assert!(matches!(
            key.sign(Algorithm::Es256, b"x").unwrap_err(),
            JoseError::AlgorithmMismatch(_)
        ));
        let mut key = Jwk::from_oct(&[0u8; 32]);
        key.alg = Some("HS512".into());
        assert!(matches!(
            key.sign(Algorithm::Hs256, b"x").unwrap_err(),
            JoseError::AlgorithmMismatch(_)
        ));
    }

    #[test]
    fn cose_key_round_trip() {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let key = Jwk::from_p256(&secret);
        let cose = key.to_cose_vec().unwrap();
        let back = Jwk::from_cose_slice(&cose).unwrap();
        assert_eq!(back, key);

        let oct = Jwk::from_oct(&[7u8; 32]);
        let back = Jwk::from_cose_slice(&oct.to_cose_vec().unwrap()).unwrap();
        assert_eq!(back, oct);
    }

    #[test]
    fn spki_extraction_matches_key() {
        use p256::pkcs8::EncodePublicKey;
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let spki = secret
            .public_key()
            .to_public_key_der()
            .expect("spki");
        let jwk = jwk_from_spki(spki.as_bytes(), Algorithm::Es256).expect("extract");
        let direct = Jwk::from_p256(&secret).public();
        assert_eq!(jwk.x, direct.x);
        assert_eq!(jwk.y, direct.y);
    }
}
