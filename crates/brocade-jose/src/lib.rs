//! JOSE and COSE signing for Brocade.
//!
//! One algorithm registry serves both worlds: every [`Algorithm`]
//! knows its JOSE name, its COSE identifier and the exact
//! (key kind, hash, padding) triple it stands for. Keys are [`Jwk`]s
//! parsed from JSON or from the COSE_Key CBOR shape; signatures are
//! compact [`Jws`] tokens or [`CoseSign1`] structures with optional
//! detached payloads and embedded certificate chains.

pub mod alg;
pub mod cose;
pub mod error;
pub mod jwk;
pub mod jws;
pub mod jwt;

pub use alg::{Algorithm, KeyKind};
pub use cose::CoseSign1;
pub use error::{JoseError, Result};
pub use jwk::Jwk;
pub use jws::{Jws, JwsHeader};
pub use jwt::Jwt;
