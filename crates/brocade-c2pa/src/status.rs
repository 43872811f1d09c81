//! The fixed C2PA validation status taxonomy.
//!
//! Every verification path reports codes from this set (or
//! `general.error`); overall success is `all(is_ok)` over the list.

/// One status code from the C2PA taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The claim signature validated against the signing credential
    ClaimSignatureValidated,
    /// An assertion's hashed URI digest matched its content
    AssertionHashedUriMatch,
    /// The data-hash hard binding matched the asset bytes
    AssertionDataHashMatch,
    /// The BMFF hard binding matched the asset bytes
    AssertionBmffHashMatch,

    /// No claim box is present
    ClaimMissing,
    /// More than one claim box is present
    ClaimMultiple,
    /// The claim lacks a required field
    ClaimRequiredMissing,
    /// The claim's signature reference does not resolve
    ClaimSignatureMissing,
    /// The claim signature did not validate
    ClaimSignatureMismatch,
    /// No hard-binding assertion is present
    ClaimHardBindingsMissing,
    /// A claim assertion reference does not resolve
    AssertionMissing,
    /// More than one hard-binding assertion is present
    AssertionMultipleHardBindings,
    /// An assertion's hashed URI digest did not match
    AssertionHashedUriMismatch,
    /// The data-hash hard binding did not match the asset
    AssertionDataHashMismatch,
    /// The BMFF hard binding did not match the asset
    AssertionBmffHashMismatch,
    /// An action referenced an ingredient that is not present
    AssertionActionIngredientMismatch,
    /// More than one ingredient claims the parent relationship
    ManifestMultipleParents,
    /// A digest algorithm outside the registry was requested
    AlgorithmUnsupported,
    /// Any other failure
    GeneralError,
}

impl StatusCode {
    /// The official code string
    pub fn official(&self) -> &'static str {
        match self {
            StatusCode::ClaimSignatureValidated => "claimSignature.validated",
            StatusCode::AssertionHashedUriMatch => "assertion.hashedURI.match",
            StatusCode::AssertionDataHashMatch => "assertion.dataHash.match",
            StatusCode::AssertionBmffHashMatch => "assertion.bmffHash.match",
            StatusCode::ClaimMissing => "claim.missing",
            StatusCode::ClaimMultiple => "claim.multiple",
            StatusCode::ClaimRequiredMissing => "claim.required.missing",
            StatusCode::ClaimSignatureMissing => "claimSignature.missing",
            StatusCode::ClaimSignatureMismatch => "claimSignature.mismatch",
            StatusCode::ClaimHardBindingsMissing => "claim.hardBindings.missing",
            StatusCode::AssertionMissing => "assertion.missing",
            StatusCode::AssertionMultipleHardBindings => "assertion.multipleHardBindings",
            StatusCode::AssertionHashedUriMismatch => "assertion.hashedURI.mismatch",
            StatusCode::AssertionDataHashMismatch => "assertion.dataHash.mismatch",
            StatusCode::AssertionBmffHashMismatch => "assertion.bmffHash.mismatch",
            StatusCode::AssertionActionIngredientMismatch => {
                "assertion.action.ingredientMismatch"
            }
            StatusCode::ManifestMultipleParents => "manifest.multipleParents",
            StatusCode::AlgorithmUnsupported => "algorithm.unsupported",
            StatusCode::GeneralError => "general.error",
        }
    }

    /// True for success codes
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            StatusCode::ClaimSignatureValidated
                | StatusCode::AssertionHashedUriMatch
                | StatusCode::AssertionDataHashMatch
                | StatusCode::AssertionBmffHashMatch
        )
    }

    /// Inverse of [`StatusCode::official`], for codes embedded in
    /// ingredient assertions
    pub fn from_official(code: &str) -> Option<StatusCode> {
        const ALL: &[StatusCode] = &[
            StatusCode::ClaimSignatureValidated,
            StatusCode::AssertionHashedUriMatch,
            StatusCode::AssertionDataHashMatch,
            StatusCode::AssertionBmffHashMatch,
            StatusCode::ClaimMissing,
            StatusCode::ClaimMultiple,
            StatusCode::ClaimRequiredMissing,
            StatusCode::ClaimSignatureMissing,
            StatusCode::ClaimSignatureMismatch,
            StatusCode::ClaimHardBindingsMissing,
            StatusCode::AssertionMissing,
            StatusCode::AssertionMultipleHardBindings,
            StatusCode::AssertionHashedUriMismatch,
            StatusCode::AssertionDataHashMismatch,
            StatusCode::AssertionBmffHashMismatch,
            StatusCode::AssertionActionIngredientMismatch,
            StatusCode::ManifestMultipleParents,
            StatusCode::AlgorithmUnsupported,
            StatusCode::GeneralError,
        ];
        ALL.iter().copied().find(|c| c.official() == code)
    }

    /// Human description
    pub fn description(&self) -> &'static str {
        match self {
            StatusCode::ClaimSignatureValidated => "the claim signature is valid",
            StatusCode::AssertionHashedUriMatch => "assertion digest matches its content",
            StatusCode::AssertionDataHashMatch => "asset data digest matches",
            StatusCode::AssertionBmffHashMatch => "asset box digest matches",
            StatusCode::ClaimMissing => "the manifest has no claim",
            StatusCode::ClaimMultiple => "the manifest has more than one claim",
            StatusCode::ClaimRequiredMissing => "the claim lacks a required field",
            StatusCode::ClaimSignatureMissing => "the claim signature reference does not resolve",
            StatusCode::ClaimSignatureMismatch => "the claim signature is not valid",
            StatusCode::ClaimHardBindingsMissing => "the claim has no hard binding",
            StatusCode::AssertionMissing => "a referenced assertion is not in the store",
            StatusCode::AssertionMultipleHardBindings => {
                "the claim has more than one hard binding"
            }
            StatusCode::AssertionHashedUriMismatch => {
                "assertion digest does not match its content"
            }
            StatusCode::AssertionDataHashMismatch => "asset data digest does not match",
            StatusCode::AssertionBmffHashMismatch => "asset box digest does not match",
            StatusCode::AssertionActionIngredientMismatch => {
                "an action references a missing ingredient"
            }
            StatusCode::ManifestMultipleParents => "more than one parent ingredient",
            StatusCode::AlgorithmUnsupported => "unsupported digest algorithm",
            StatusCode::GeneralError => "verification could not complete",
        }
    }
}

/// A status code bound to the place it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStatus {
    /// The code
    pub code: StatusCode,
    /// JUMBF URI (or other locus) the code applies to
    pub url: Option<String>,
    /// Free-form detail, e.g. an embedded foreign code string
    pub explanation: Option<String>,
}

impl ValidationStatus {
    /// Status at a locus
    pub fn at(code: StatusCode, url: impl Into<String>) -> ValidationStatus {
        ValidationStatus {
            code,
            url: Some(url.into()),
            explanation: None,
        }
    }

    /// Status without a locus
    pub fn bare(code: StatusCode) -> ValidationStatus {
        ValidationStatus {
            code,
            url: None,
            explanation: None,
        }
    }

    /// Attach detail text
    pub fn explain(mut self, text: impl Into<String>) -> ValidationStatus {
        self.explanation = Some(text.into());
        self
    }

    /// True for success codes
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.official())?;
        if let Some(url) = &self.url {
            write!(f, " at {url}")?;
        }
        if let Some(explanation) = &self.explanation {
            write!(f, " ({explanation})")?;
        }
        Ok(())
    }
}

/// The single predicate of overall verification success
pub fn all_ok(statuses: &[ValidationStatus]) -> bool {
    statuses.iter().all(ValidationStatus::is_ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_partition() {
        assert!(StatusCode::ClaimSignatureValidated.is_ok());
        assert!(StatusCode::AssertionHashedUriMatch.is_ok());
        assert!(!StatusCode::ClaimSignatureMismatch.is_ok());
        assert!(!StatusCode::GeneralError.is_ok());
    }

    #[test]
    fn official_strings() {
        assert_eq!(
            StatusCode::AssertionHashedUriMismatch.official(),
            "assertion.hashedURI.mismatch"
        );
        assert_eq!(
            StatusCode::ClaimHardBindingsMissing.official(),
            "claim.hardBindings.missing"
        );
    }

    #[test]
    fn aggregate_predicate() {
        let ok = vec![
            ValidationStatus::bare(StatusCode::ClaimSignatureValidated),
            ValidationStatus::bare(StatusCode::AssertionHashedUriMatch),
        ];
        assert!(all_ok(&ok));
        let mut mixed = ok.clone();
        mixed.push(ValidationStatus::bare(StatusCode::AssertionDataHashMismatch));
        assert!(!all_ok(&mixed));
    }
}
