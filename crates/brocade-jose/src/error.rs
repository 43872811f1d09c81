//! Error types for signing operations

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, JoseError>;

/// Errors surfaced by the JWK/JWS/COSE layer
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum JoseError {
    /// Header algorithm and key material disagree
    #[error("algorithm and key disagree: {0}")]
    AlgorithmMismatch(&'static str),

    /// Algorithm name or identifier outside the registry
    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    /// Signature did not validate
    #[error("signature verification failed")]
    VerifyFailed,

    /// Structurally broken input
    #[error("malformed {what}: {detail}")]
    Malformed {
        /// Which structure was broken
        what: &'static str,
        /// What was wrong with it
        detail: String,
    },

    /// A key field was absent or undecodable
    #[error("key is missing usable `{0}` material")]
    KeyMaterial(&'static str),

    /// Low-level crypto library failure
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// JSON (de)serialization of a JOSE structure failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR (de)serialization of a COSE structure failed
    #[error(transparent)]
    Codec(#[from] brocade_codec::CodecError),

    /// Value-tree failure
    #[error(transparent)]
    Node(#[from] brocade_node::NodeError),
}

impl JoseError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> JoseError {
        JoseError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}
