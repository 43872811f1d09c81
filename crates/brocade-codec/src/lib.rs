//! Codecs for the Brocade value tree.
//!
//! Three formats, one shape: every reader is a pull parser that emits
//! the shared [`brocade_node::Event`] stream and every writer walks a
//! finished tree (or accepts raw events) and pushes bytes. Readers
//! support incremental input: construct with `partial`, feed bytes
//! with `push_input`, and `next_event` returns `Ok(None)` instead of
//! failing when the buffer runs dry mid-document.

pub mod cbor;
pub mod error;
pub mod input;
pub mod json;
pub mod msgpack;

pub use error::{CodecError, Location, Result};
