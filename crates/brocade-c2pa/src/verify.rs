//! The verification state machine.
//!
//! Verification never throws for content failures: every check
//! appends a status and the caller judges the list with
//! [`crate::status::all_ok`]. Only a store that cannot be traversed
//! at all produced an error earlier, at parse time.

use brocade_jose::Jwk;
use brocade_node::Node;

use crate::assertion::{Assertion, AssertionKind};
use crate::sign::{digest, excluded_digest};
use crate::status::{StatusCode, ValidationStatus};
use crate::store::{Manifest, Store, split_uri};

impl Store {
    /// Verify the active manifest against the asset bytes.
    ///
    /// `key` overrides the signing credential; without it the leaf of
    /// the embedded `x5chain` is used.
    pub fn verify(&self, asset: &[u8], key: Option<&Jwk>) -> Vec<ValidationStatus> {
        let mut statuses = Vec::new();
        let Some(manifest) = self.active_manifest() else {
            statuses.push(ValidationStatus::bare(StatusCode::ClaimMissing));
            return statuses;
        };
        self.verify_manifest(manifest, asset, key, &mut statuses);
        statuses
    }

    fn verify_manifest(
        &self,
        manifest: &Manifest,
        asset: &[u8],
        key: Option<&Jwk>,
        statuses: &mut Vec<ValidationStatus>,
    ) {
        // structural: exactly one claim and one signature
        match manifest.claim_count() {
            0 => {
                statuses.push(ValidationStatus::bare(StatusCode::ClaimMissing));
                return;
            }
            1 => {}
            _ => {
                statuses.push(ValidationStatus::bare(StatusCode::ClaimMultiple));
                return;
            }
        }
        let claim = manifest.claim().expect("counted");
        let claim_alg = claim
            .get("alg")
            .and_then(|n| n.string_value().ok())
            .unwrap_or_else(|| crate::sign::DEFAULT_DIGEST.to_string());

        let signature_resolves = claim
            .get("signature")
            .and_then(|n| n.string_value().ok())
            .is_some_and(|uri| uri == manifest.signature_uri());
        if manifest.signature_count() != 1 || !signature_resolves {
            statuses.push(ValidationStatus::at(
                StatusCode::ClaimSignatureMissing,
                manifest.signature_uri(),
            ));
        }

        // hashed URIs of the claim's assertion list
        let mut resolved: Vec<(String, &Assertion)> = Vec::new();
        let entries = claim.get("assertions");
        let entry_count = entries.as_ref().map_or(0, Node::size);
        for i in 0..entry_count {
            let entry = entries.as_ref().and_then(|e| e.get(&format!("[{i}]")));
            let Some(url) = entry
                .as_ref()
                .and_then(|e| e.get("url"))
                .and_then(|n| n.string_value().ok())
            else {
                statuses.push(ValidationStatus::bare(StatusCode::AssertionMissing));
                continue;
            };
            let Some(assertion) = self.resolve_assertion(manifest, &url) else {
                statuses.push(ValidationStatus::at(StatusCode::AssertionMissing, url));
                continue;
            };
            resolved.push((url.clone(), assertion));

            let entry_alg = entry
                .as_ref()
                .and_then(|e| e.get("alg"))
                .and_then(|n| n.string_value().ok())
                .unwrap_or_else(|| claim_alg.clone());
            let expected = entry
                .as_ref()
                .and_then(|e| e.get("hash"))
                .and_then(|n| n.buffer_value().ok());
            let actual = assertion
                .digest_bytes()
                .ok()
                .and_then(|bytes| digest(&entry_alg, &bytes));
            match (expected, actual) {
                (Some(expected), Some(actual)) if expected == actual => {
                    statuses.push(ValidationStatus::at(StatusCode::AssertionHashedUriMatch, url));
                }
                (_, None) => {
                    statuses.push(ValidationStatus::at(StatusCode::AlgorithmUnsupported, url));
                }
                _ => {
                    statuses.push(ValidationStatus::at(
                        StatusCode::AssertionHashedUriMismatch,
                        url,
                    ));
                }
            }
        }

        // hard binding: exactly one, and it must match the asset
        let hard: Vec<&(String, &Assertion)> = resolved
            .iter()
            .filter(|(_, a)| a.is_hard_binding())
            .collect();
        match hard.len() {
            0 => statuses.push(ValidationStatus::bare(StatusCode::ClaimHardBindingsMissing)),
            1 => {
                let (url, assertion) = hard[0];
                statuses.push(verify_hard_binding(url, assertion, asset, &claim_alg));
            }
            _ => statuses.push(ValidationStatus::bare(
                StatusCode::AssertionMultipleHardBindings,
            )),
        }

        // the detached payload is the claim's own encoding
        match (manifest.signature(), brocade_codec::cbor::to_vec(&claim)) {
            (Some(signature), Ok(payload)) => {
                let status = match signature.verify(Some(&payload), key) {
                    Ok(()) => ValidationStatus::at(
                        StatusCode::ClaimSignatureValidated,
                        manifest.signature_uri(),
                    ),
                    Err(e) => ValidationStatus::at(
                        StatusCode::ClaimSignatureMismatch,
                        manifest.signature_uri(),
                    )
                    .explain(e.to_string()),
                };
                statuses.push(status);
            }
            (None, _) => {}
            (_, Err(e)) => {
                statuses.push(
                    ValidationStatus::bare(StatusCode::GeneralError).explain(e.to_string()),
                );
            }
        }

        // per-kind assertion checks
        let mut parents = 0usize;
        for (url, assertion) in &resolved {
            match assertion.kind() {
                AssertionKind::Actions => {
                    self.verify_actions(manifest, url, assertion, statuses);
                }
                AssertionKind::Ingredient => {
                    if let Some(content) = assertion.value() {
                        if content
                            .get("relationship")
                            .and_then(|n| n.string_value().ok())
                            .as_deref()
                            == Some("parentOf")
                        {
                            parents += 1;
                        }
                        surface_embedded_statuses(&content, url, statuses);
                    }
                }
                _ => {}
            }
        }
        if parents > 1 {
            statuses.push(ValidationStatus::bare(StatusCode::ManifestMultipleParents));
        }
    }

    fn resolve_assertion<'a>(
        &'a self,
        active: &'a Manifest,
        url: &str,
    ) -> Option<&'a Assertion> {
        let (manifest_label, rest) = split_uri(url)?;
        let manifest = if manifest_label == active.label {
            active
        } else {
            self.manifest(manifest_label)?
        };
        let label = rest.strip_prefix("c2pa.assertions/")?;
        manifest.assertion(label)
    }

    /// `c2pa.actions`: every referenced ingredient must resolve.
    /// Ingredient manifests are not validated recursively.
    fn verify_actions(
        &self,
        manifest: &Manifest,
        url: &str,
        assertion: &Assertion,
        statuses: &mut Vec<ValidationStatus>,
    ) {
        let Some(content) = assertion.value() else {
            return;
        };
        let Some(actions) = content.get("actions") else {
            return;
        };
        for i in 0..actions.size() {
            let action = format!("actions[{i}]");
            let mut refs = Vec::new();
            if let Some(one) = content.get(&format!("{action}.ingredient.url")) {
                if let Ok(u) = one.string_value() {
                    refs.push(u);
                }
            }
            if let Some(many) = content.get(&format!("{action}.ingredients")) {
                for j in 0..many.size() {
                    if let Some(u) = content
                        .get(&format!("{action}.ingredients[{j}].url"))
                        .and_then(|n| n.string_value().ok())
                    {
                        refs.push(u);
                    }
                }
            }
            for reference in refs {
                if self.resolve_assertion(manifest, &reference).is_none() {
                    statuses.push(
                        ValidationStatus::at(
                            StatusCode::AssertionActionIngredientMismatch,
                            url.to_string(),
                        )
                        .explain(reference),
                    );
                }
            }
        }
    }
}

fn verify_hard_binding(
    url: &str,
    assertion: &Assertion,
    asset: &[u8],
    claim_alg: &str,
) -> ValidationStatus {
    let (match_code, mismatch_code) = match assertion.kind() {
        AssertionKind::DataHash => {
            (StatusCode::AssertionDataHashMatch, StatusCode::AssertionDataHashMismatch)
        }
        _ => (StatusCode::AssertionBmffHashMatch, StatusCode::AssertionBmffHashMismatch),
    };
    let Some(content) = assertion.value() else {
        return ValidationStatus::at(mismatch_code, url).explain("no content map");
    };
    let alg = content
        .get("alg")
        .and_then(|n| n.string_value().ok())
        .unwrap_or_else(|| claim_alg.to_string());
    let expected = content.get("hash").and_then(|n| n.buffer_value().ok());
    let mut ranges = Vec::new();
    if let Some(exclusions) = content.get("exclusions") {
        for i in 0..exclusions.size() {
            let start = exclusions
                .get(&format!("[{i}].start"))
                .and_then(|n| n.long_value().ok());
            let length = exclusions
                .get(&format!("[{i}].length"))
                .and_then(|n| n.long_value().ok());
            if let (Some(start), Some(length)) = (start, length) {
                ranges.push((start as usize, length as usize));
            }
        }
    }
    let actual = excluded_digest(&alg, asset, &ranges);
    match (expected, actual) {
        (Some(expected), Some(actual)) if expected == actual => {
            ValidationStatus::at(match_code, url)
        }
        (_, None) => ValidationStatus::at(StatusCode::AlgorithmUnsupported, url),
        _ => ValidationStatus::at(mismatch_code, url),
    }
}

/// Report failure codes an ingredient carried from its own
/// validation
fn surface_embedded_statuses(content: &Node, url: &str, statuses: &mut Vec<ValidationStatus>) {
    let Some(embedded) = content.get("validationStatus") else {
        return;
    };
    for i in 0..embedded.size() {
        let Some(code_text) = content
            .get(&format!("validationStatus[{i}].code"))
            .and_then(|n| n.string_value().ok())
        else {
            continue;
        };
        match StatusCode::from_official(&code_text) {
            Some(code) if code.is_ok() => {}
            Some(code) => {
                statuses.push(ValidationStatus::at(code, url.to_string()));
            }
            None => {
                statuses.push(
                    ValidationStatus::at(StatusCode::GeneralError, url.to_string())
                        .explain(code_text),
                );
            }
        }
    }
}
