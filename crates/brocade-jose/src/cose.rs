//! COSE Sign1 (RFC 8152).
//!
//! The structure is the tagged CBOR array
//! `18([protected, unprotected, payload, signature])`. Header maps
//! travel through the value tree with stringified integer labels; the
//! CBOR writer's `int_keys` option restores the integer form on the
//! wire. The encoded protected header is kept verbatim so the
//! `Sig_structure` never depends on re-serialization.

use bytes::Bytes;
use der::{Decode, Encode};

use brocade_codec::cbor::{self, CborWriteOptions, CborWriter};
use brocade_node::{Node, Value};

use crate::alg::Algorithm;
use crate::error::{JoseError, Result};
use crate::jwk::{Jwk, jwk_from_spki, node_buffer};

/// COSE_Sign1 CBOR tag
const TAG_SIGN1: u64 = 18;
/// Protected-header label for the algorithm
const LABEL_ALG: &str = "[\"1\"]";
/// Header label for an embedded certificate chain (RFC 9360)
const LABEL_X5CHAIN: &str = "[\"33\"]";

/// A COSE Sign1 object, attached or detached
#[derive(Debug, Clone)]
pub struct CoseSign1 {
    /// Decoded protected header map
    pub protected: Node,
    /// Unprotected header map
    pub unprotected: Node,
    /// Payload; `None` in detached mode
    pub payload: Option<Bytes>,
    /// Raw signature bytes
    pub signature: Bytes,
    /// Encoded protected header exactly as signed
    protected_raw: Bytes,
}

fn int_key_writer() -> CborWriter {
    CborWriter::new(CborWriteOptions::builder().int_keys(true).build())
}

impl CoseSign1 {
    /// Parse from CBOR, tagged or bare
    pub fn from_slice(bytes: &[u8]) -> Result<CoseSign1> {
        let node = cbor::from_slice(bytes)?;
        match node.tag() {
            None | Some(TAG_SIGN1) => {}
            Some(other) => {
                return Err(JoseError::malformed(
                    "COSE_Sign1",
                    format!("unexpected tag {other}"),
                ));
            }
        }
        if node.type_name() != "list" || node.size() != 4 {
            return Err(JoseError::malformed(
                "COSE_Sign1",
                "expected an array of four items",
            ));
        }
        let protected_raw = node
            .get("[0]")
            .and_then(|n| n.buffer_value().ok())
            .ok_or_else(|| JoseError::malformed("COSE_Sign1", "protected header must be bstr"))?;
        let protected = if protected_raw.is_empty() {
            Node::map()
        } else {
            let inner = cbor::from_slice(&protected_raw)?;
            if inner.type_name() != "map" {
                return Err(JoseError::malformed(
                    "COSE_Sign1",
                    "protected header is not a map",
                ));
            }
            inner
        };
        let unprotected = node
            .get("[1]")
            .filter(|n| n.type_name() == "map")
            .ok_or_else(|| JoseError::malformed("COSE_Sign1", "unprotected header must be a map"))?;
        let payload = match node.get("[2]") {
            Some(n) if n.type_name() == "null" => None,
            Some(n) => Some(
                n.buffer_value()
                    .map_err(|_| JoseError::malformed("COSE_Sign1", "payload must be bstr or null"))?,
            ),
            None => None,
        };
        let signature = node
            .get("[3]")
            .and_then(|n| n.buffer_value().ok())
            .ok_or_else(|| JoseError::malformed("COSE_Sign1", "signature must be bstr"))?;
        // detach the headers so they can be grafted into a fresh tree
        let unprotected = unprotected.duplicate();
        Ok(CoseSign1 {
            protected,
            unprotected,
            payload,
            signature,
            protected_raw,
        })
    }

    /// Serialize as the tagged array of four
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let root = Node::list();
        root.set_tag(Some(TAG_SIGN1));
        root.put("[0]", self.protected_raw.clone())?;
        root.put("[1]", self.unprotected.duplicate())?;
        match &self.payload {
            Some(p) => root.put("[2]", p.clone())?,
            None => root.put("[2]", Value::Null)?,
        };
        root.put("[3]", self.signature.clone())?;
        let mut writer = int_key_writer();
        writer.write_node(&root)?;
        Ok(writer.into_bytes())
    }

    /// The algorithm pinned in the protected header
    pub fn algorithm(&self) -> Result<Algorithm> {
        let id = self
            .protected
            .get(LABEL_ALG)
            .ok_or_else(|| JoseError::malformed("COSE_Sign1", "protected header has no alg"))?
            .long_value()
            .map_err(|_| JoseError::malformed("COSE_Sign1", "alg label is not an integer"))?;
        Algorithm::from_cose_id(id)
    }

    /// DER certificates from `x5chain`, protected header first
    pub fn x5chain(&self) -> Vec<Bytes> {
        let mut out = Vec::new();
        for header in [&self.protected, &self.unprotected] {
            let Some(entry) = header.get(LABEL_X5CHAIN) else {
                continue;
            };
            if let Some(buffer) = node_buffer(&entry) {
                out.push(buffer);
            } else if let Some(items) = entry.items() {
                out.extend(items.iter().filter_map(node_buffer));
            }
        }
        out
    }

    /// Canonical `Sig_structure` for Signature1 (RFC 8152 §4.4)
    fn sig_structure(protected_raw: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let structure = Node::list();
        structure.put("[0]", "Signature1")?;
        structure.put("[1]", protected_raw.to_vec())?;
        // external_aad: always empty here
        structure.put("[2]", Vec::<u8>::new())?;
        structure.put("[3]", payload.to_vec())?;
        Ok(cbor::to_vec(&structure)?)
    }

    /// Sign `payload`. In detached mode the payload is omitted from
    /// the wire form and must be re-supplied at verification.
    pub fn sign(
        payload: &[u8],
        detached: bool,
        key: &Jwk,
        alg: Algorithm,
        x5chain: &[Bytes],
    ) -> Result<CoseSign1> {
        let protected = Node::map();
        protected.put(LABEL_ALG, alg.cose_id())?;
        if !x5chain.is_empty() {
            let chain = Node::list();
            for (i, cert) in x5chain.iter().enumerate() {
                chain.put(&format!("[{i}]"), cert.clone())?;
            }
            protected.put(LABEL_X5CHAIN, chain)?;
        }
        let mut writer = int_key_writer();
        writer.write_node(&protected)?;
        let protected_raw = Bytes::from(writer.into_bytes());

        let tbs = CoseSign1::sig_structure(&protected_raw, payload)?;
        let signature = key.sign(alg, &tbs)?;
        Ok(CoseSign1 {
            protected,
            unprotected: Node::map(),
            payload: (!detached).then(|| Bytes::copy_from_slice(payload)),
            signature: Bytes::from(signature),
            protected_raw,
        })
    }

    /// Verify the signature. Detached objects need `detached_payload`;
    /// with no key supplied the leaf certificate of `x5chain` provides
    /// one.
    pub fn verify(&self, detached_payload: Option<&[u8]>, key: Option<&Jwk>) -> Result<()> {
        let alg = self.algorithm()?;
        let payload = match (&self.payload, detached_payload) {
            (Some(p), _) => p.as_ref(),
            (None, Some(p)) => p,
            (None, None) => {
                return Err(JoseError::malformed(
                    "COSE_Sign1",
                    "detached payload not supplied",
                ));
            }
        };
        let tbs = CoseSign1::sig_structure(&self.protected_raw, payload)?;
        let leaf_key;
        let key = match key {
            Some(key) => key,
            None => {
                let chain = self.x5chain();
                let leaf = chain.first().ok_or(JoseError::KeyMaterial("public key"))?;
                let cert = x509_cert::Certificate::from_der(leaf)
                    .map_err(|e| JoseError::malformed("x5chain certificate", e.to_string()))?;
                let spki = cert
                    .tbs_certificate
                    .subject_public_key_info
                    .to_der()
                    .map_err(|e| JoseError::Crypto(e.to_string()))?;
                leaf_key = jwk_from_spki(&spki, alg)?;
                &leaf_key
            }
        };
        key.verify(alg, &tbs, &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p256_key() -> Jwk {
        Jwk::from_p256(&p256::SecretKey::random(&mut rand::rngs::OsRng))
    }

    #[test]
    fn attached_sign_verify_round_trip() {
        let key = p256_key();
        let signed = CoseSign1::sign(b"payload bytes", false, &key, Algorithm::Es256, &[])
            .expect("sign");
        signed.verify(None, Some(&key.public())).expect("verify");

        let wire = signed.to_vec().expect("encode");
        // tagged array of four
        assert_eq!(wire[0], 0xd2);
        assert_eq!(wire[1], 0x84);
        let parsed = CoseSign1::from_slice(&wire).expect("parse");
        parsed.verify(None, Some(&key.public())).expect("verify parsed");
        assert_eq!(parsed.payload.as_deref(), Some(&b"payload bytes"[..]));
    }

    #[test]
    fn detached_needs_payload() {
        let key = p256_key();
        let signed =
            CoseSign1::sign(b"detached body", true, &key, Algorithm::Es256, &[]).expect("sign");
        assert!(signed.payload.is_none());
        assert!(signed.verify(None, Some(&key)).is_err());
        signed
            .verify(Some(b"detached body"), Some(&key))
            .expect("verify with payload");
        assert!(matches!(
            signed
                .verify(Some(b"detached bodY"), Some(&key))
                .unwrap_err(),
            JoseError::VerifyFailed
        ));
    }

    #[test]
    fn every_algorithm_round_trips() {
        let message = b"sign me with everything";
        let mut cases: Vec<(Jwk, Algorithm)> = vec![
            (p256_key(), Algorithm::Es256),
            (
                Jwk::from_p384(&p384::SecretKey::random(&mut rand::rngs::OsRng)),
                Algorithm::Es384,
            ),
            (
                Jwk::from_p521(&p521::SecretKey::random(&mut rand::rngs::OsRng)),
                Algorithm::Es512,
            ),
            (
                Jwk::from_ed25519(&ed25519_dalek::SigningKey::generate(
                    &mut rand::rngs::OsRng,
                )),
                Algorithm::EdDsa,
            ),
            (Jwk::from_oct(&[9u8; 32]), Algorithm::Hs256),
            (Jwk::from_oct(&[9u8; 64]), Algorithm::Hs512),
        ];
        let rsa =
            rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("rsa keygen");
        cases.push((Jwk::from_rsa(&rsa), Algorithm::Rs256));
        cases.push((Jwk::from_rsa(&rsa), Algorithm::Ps256));

        for (key, alg) in cases {
            let signed = CoseSign1::sign(message, true, &key, alg, &[]).expect("sign");
            let wire = signed.to_vec().expect("encode");
            let parsed = CoseSign1::from_slice(&wire).expect("parse");
            assert_eq!(parsed.algorithm().unwrap(), alg);
            // symmetric algs verify with the same key
            let verify_key = if key.k.is_some() { key.clone() } else { key.public() };
            parsed
                .verify(Some(message), Some(&verify_key))
                .unwrap_or_else(|e| panic!("{alg} verify: {e}"));
        }
    }

    #[test]
    fn header_and_key_disagreement_fails() {
        let key = p256_key();
        let signed =
            CoseSign1::sign(b"data", false, &key, Algorithm::Es256, &[]).expect("sign");
        let oct = Jwk::from_oct(&[1u8; 32]);
        assert!(matches!(
            signed.verify(None, Some(&oct)).unwrap_err(),
            JoseError::AlgorithmMismatch(_)
        ));
    }

    #[test]
    fn x5chain_appears_in_protected_header() {
        let key = p256_key();
        let fake_cert = Bytes::from_static(b"not-a-real-certificate");
        let signed = CoseSign1::sign(b"data", false, &key, Algorithm::Es256, &[fake_cert.clone()])
            .expect("sign");
        let parsed = CoseSign1::from_slice(&signed.to_vec().unwrap()).expect("parse");
        assert_eq!(parsed.x5chain(), vec![fake_cert]);
        // a garbage chain cannot stand in for a key
        assert!(parsed.verify(None, None).is_err());
        parsed.verify(None, Some(&key)).expect("explicit key still works");
    }

    #[test]
    fn wire_form_is_stable() {
        let key = p256_key();
        let signed = CoseSign1::sign(b"abc", false, &key, Algorithm::Es256, &[]).expect("sign");
        let wire = signed.to_vec().unwrap();
        let reparsed = CoseSign1::from_slice(&wire).unwrap();
        assert_eq!(reparsed.to_vec().unwrap(), wire);
    }
}
