#![doc = include_str!("../../../README.md")]
#![warn(missing_docs)]

/// Value tree, paths, events and listeners
pub use brocade_node as node;

/// JSON, CBOR and MsgPack codecs
pub use brocade_codec as codec;

/// JWK, JWS and COSE Sign1
pub use brocade_jose as jose;

/// ISO-BMFF / JUMBF box trees and JPEG embedding
pub use brocade_boxes as boxes;

/// C2PA manifests, claims, signatures and validation
pub use brocade_c2pa as c2pa;

pub use brocade_codec::{cbor, json, msgpack};
pub use brocade_node::{Event, Node, NodeBuilder, Scalar, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_stack_composes() {
        // JSON in, CBOR out, path access on the way
        let node = json::from_str(r#"{"a":{"b":[0,null,2]}}"#).unwrap();
        assert_eq!(node.get("a.b[0]").unwrap().int_value().unwrap(), 0);
        let bytes = cbor::to_vec(&node).unwrap();
        let back = cbor::from_slice(&bytes).unwrap();
        assert_eq!(back, node);
    }
}
