//! The signing flow.
//!
//! Signing refuses to produce output when a precondition fails; the
//! error carries the status naming the failed check.

use bytes::Bytes;
use sha2::Digest;

use brocade_jose::{Algorithm, CoseSign1, Jwk};
use brocade_node::Node;

use crate::assertion::AssertionKind;
use crate::error::{C2paError, Result};
use crate::status::{StatusCode, ValidationStatus};
use crate::store::Store;

/// Default digest algorithm written into claims that name none
pub const DEFAULT_DIGEST: &str = "sha256";
/// Default claim generator
const DEFAULT_GENERATOR: &str = concat!("brocade/", env!("CARGO_PKG_VERSION"));

/// A byte range of the asset excluded from the data hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExclusionRange {
    /// First excluded byte
    pub start: usize,
    /// Number of excluded bytes
    pub length: usize,
}

/// Everything signing needs besides the store and the asset
#[derive(Debug, Clone, bon::Builder)]
pub struct SignOptions {
    /// Private key
    pub key: Jwk,
    /// Signature algorithm
    pub alg: Algorithm,
    /// DER certificate chain for `x5chain`, leaf first
    #[builder(default)]
    pub certs: Vec<Bytes>,
    /// Asset ranges the data hash skips (where the store itself
    /// lands)
    #[builder(default)]
    pub exclusions: Vec<ExclusionRange>,
    /// Claim generator override
    pub generator: Option<String>,
}

/// Digest `data` with a C2PA algorithm name
pub(crate) fn digest(alg: &str, data: &[u8]) -> Option<Vec<u8>> {
    match alg {
        "sha256" => Some(sha2::Sha256::digest(data).to_vec()),
        "sha384" => Some(sha2::Sha384::digest(data).to_vec()),
        "sha512" => Some(sha2::Sha512::digest(data).to_vec()),
        _ => None,
    }
}

/// Digest the asset minus the exclusion ranges
pub(crate) fn excluded_digest(
    alg: &str,
    asset: &[u8],
    exclusions: &[(usize, usize)],
) -> Option<Vec<u8>> {
    let mut ranges: Vec<(usize, usize)> = exclusions.to_vec();
    ranges.sort_unstable();
    let mut update = |hasher: &mut dyn FnMut(&[u8])| {
        let mut at = 0usize;
        for &(start, length) in &ranges {
            let start = start.min(asset.len());
            if start > at {
                hasher(&asset[at..start]);
            }
            at = at.max(start.saturating_add(length).min(asset.len()));
        }
        if at < asset.len() {
            hasher(&asset[at..]);
        }
    };
    match alg {
        "sha256" => {
            let mut h = sha2::Sha256::new();
            update(&mut |b| h.update(b));
            Some(h.finalize().to_vec())
        }
        "sha384" => {
            let mut h = sha2::Sha384::new();
            update(&mut |b| h.update(b));
            Some(h.finalize().to_vec())
        }
        "sha512" => {
            let mut h = sha2::Sha512::new();
            update(&mut |b| h.update(b));
            Some(h.finalize().to_vec())
        }
        _ => None,
    }
}

fn precondition(code: StatusCode, url: Option<String>) -> C2paError {
    C2paError::Precondition(ValidationStatus {
        code,
        url,
        explanation: None,
    })
}

impl Store {
    /// Sign the active manifest over `asset`.
    ///
    /// Precondition checks run first; any failure aborts with the
    /// status naming the check and leaves no signature behind. On
    /// success the claim carries recomputed hashed URIs, the
    /// hard-binding assertion carries the asset digest, and the
    /// manifest carries a detached COSE Sign1 over the claim bytes.
    pub fn sign(&mut self, asset: &[u8], options: &SignOptions) -> Result<()> {
        let manifest = self
            .manifests
            .last()
            .ok_or(C2paError::Structure("store has no manifest"))?;
        if manifest.claim_count() > 1 {
            return Err(precondition(StatusCode::ClaimMultiple, None));
        }
        let claim = manifest
            .claim()
            .ok_or_else(|| precondition(StatusCode::ClaimMissing, None))?;

        // required fields, then defaults
        for field in ["dc:format", "instanceID"] {
            let present = claim
                .get(&format!("[\"{field}\"]"))
                .is_some_and(|n| n.string_value().is_ok());
            if !present {
                return Err(precondition(
                    StatusCode::ClaimRequiredMissing,
                    Some(field.to_string()),
                ));
            }
        }
        if claim.get("alg").is_none() {
            claim.put("alg", DEFAULT_DIGEST)?;
        }
        if claim.get("claim_generator").is_none() {
            let generator = options
                .generator
                .clone()
                .unwrap_or_else(|| DEFAULT_GENERATOR.to_string());
            claim.put("claim_generator", generator)?;
        }
        let claim_alg = claim.get("alg").expect("defaulted").string_value()?;
        if digest(&claim_alg, b"").is_none() {
            return Err(precondition(
                StatusCode::AlgorithmUnsupported,
                Some(claim_alg),
            ));
        }

        // assertion list: claim order wins, manifest order fills in.
        // Per-entry digest algorithm overrides survive the rewrite.
        let listed_urls: Vec<(String, Option<String>)> = match claim.get("assertions") {
            Some(list) if list.size() > 0 => (0..list.size())
                .map(|i| {
                    let url = list
                        .get(&format!("[{i}].url"))
                        .ok_or_else(|| precondition(StatusCode::AssertionMissing, None))
                        .and_then(|n| n.string_value().map_err(C2paError::from))?;
                    let alg = list
                        .get(&format!("[{i}].alg"))
                        .and_then(|n| n.string_value().ok());
                    Ok((url, alg))
                })
                .collect::<Result<_>>()?,
            _ => {
                claim.remove("assertions");
                manifest
                    .assertions
                    .iter()
                    .map(|a| (manifest.assertion_uri(&a.label), None))
                    .collect()
            }
        };

        // every entry must resolve to an assertion in this manifest
        let mut resolved = Vec::with_capacity(listed_urls.len());
        for (url, _) in &listed_urls {
            let assertion = crate::store::split_uri(url)
                .filter(|(m, _)| *m == manifest.label)
                .and_then(|(_, rest)| rest.strip_prefix("c2pa.assertions/"))
                .and_then(|label| manifest.assertion(label))
                .ok_or_else(|| {
                    precondition(StatusCode::AssertionMissing, Some(url.clone()))
                })?;
            resolved.push(assertion);
        }

        // exactly one hard binding
        let hard: Vec<_> = resolved.iter().filter(|a| a.is_hard_binding()).collect();
        match hard.len() {
            0 => return Err(precondition(StatusCode::ClaimHardBindingsMissing, None)),
            1 => {}
            _ => {
                return Err(precondition(StatusCode::AssertionMultipleHardBindings, None));
            }
        }

        // hard-binding digest goes into the assertion content first,
        // so the hashed URIs below cover the final bytes
        let hard_binding = hard[0];
        let content = hard_binding
            .value()
            .ok_or(C2paError::Structure("hard binding has no content map"))?;
        let exclusions = Node::list();
        for (i, range) in options.exclusions.iter().enumerate() {
            exclusions.put(&format!("[{i}].start"), range.start as i64)?;
            exclusions.put(&format!("[{i}].length"), range.length as i64)?;
        }
        content.put("exclusions", exclusions)?;
        let ranges: Vec<(usize, usize)> = options
            .exclusions
            .iter()
            .map(|r| (r.start, r.length))
            .collect();
        let asset_digest =
            excluded_digest(&claim_alg, asset, &ranges).expect("algorithm checked");
        content.put("alg", claim_alg.as_str())?;
        content.put("hash", asset_digest)?;
        if hard_binding.kind() == AssertionKind::DataHash
            && content.get("name").is_none()
        {
            content.put("name", "jumbf manifest")?;
        }

        // hashed URIs over the final assertion payloads
        let entries = Node::list();
        for (i, ((url, entry_alg), assertion)) in listed_urls.iter().zip(&resolved).enumerate() {
            let alg = entry_alg.as_deref().unwrap_or(&claim_alg);
            let hash = digest(alg, &assertion.digest_bytes()?).ok_or_else(|| {
                precondition(StatusCode::AlgorithmUnsupported, Some(alg.to_string()))
            })?;
            entries.put(&format!("[{i}].url"), url.as_str())?;
            if let Some(entry_alg) = entry_alg {
                entries.put(&format!("[{i}].alg"), entry_alg.as_str())?;
            }
            entries.put(&format!("[{i}].hash"), hash)?;
        }
        claim.remove("assertions");
        claim.put("assertions", entries)?;

        // the claim bytes are the detached payload
        claim.remove("signature");
        claim.put("signature", self.manifests.last().expect("checked").signature_uri())?;
        let payload = brocade_codec::cbor::to_vec(&claim)?;
        tracing::debug!(alg = %options.alg, bytes = payload.len(), "signing claim");
        let signature = CoseSign1::sign(
            &payload,
            true,
            &options.key,
            options.alg,
            &options.certs,
        )?;
        self.manifests
            .last_mut()
            .expect("checked")
            .set_signature(signature);
        Ok(())
    }
}
