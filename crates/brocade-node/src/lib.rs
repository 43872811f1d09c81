//! Polymorphic value tree shared by every Brocade codec.
//!
//! A [`Node`] is a cheap-to-clone handle onto a single-threaded tree of
//! values (maps, lists, numbers, strings, buffers). Codecs talk to the
//! tree through the [`Event`] stream: readers emit events, a
//! [`NodeBuilder`] folds them into a tree, writers walk the tree back
//! into events. Structural mutations notify [`NodeListener`]s up the
//! ancestor chain.

pub mod error;
pub mod event;
pub mod listener;
pub mod node;
pub mod path;

pub use error::{NodeError, Result};
pub use event::{Event, NodeBuilder, Scalar};
pub use listener::{NodeEvent, NodeEventKind, NodeListener};
pub use node::{Node, Value};
pub use path::{Path, Step};
