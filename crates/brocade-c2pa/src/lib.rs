//! C2PA content provenance over the Brocade stack.
//!
//! A [`Store`] holds manifests; each manifest composes assertions, a
//! CBOR claim and a detached COSE signature into a verifiable graph
//! of hashed cross-references. Signing enforces its preconditions and
//! refuses to emit on failure; verification always returns a
//! [`ValidationStatus`] list where [`all_ok`] is the single success
//! predicate.

pub mod assertion;
pub mod error;
pub mod sign;
pub mod status;
pub mod store;
mod verify;

pub use assertion::{Assertion, AssertionContent, AssertionKind};
pub use error::{C2paError, Result};
pub use sign::{ExclusionRange, SignOptions};
pub use status::{StatusCode, ValidationStatus, all_ok};
pub use store::{Manifest, Store};
