//! The event stream shared by every codec.
//!
//! Readers pull bytes and emit [`Event`]s; a [`NodeBuilder`] folds the
//! events into a tree; writers walk a tree and push the same events at
//! a byte sink. Partial input falls out of this shape for free: a
//! reader that runs dry mid-document simply stops yielding events
//! until it is fed more bytes.

use bytes::Bytes;
use num_bigint::BigInt;
use smol_str::SmolStr;

use crate::error::{NodeError, Result};
use crate::node::{Node, Value};

/// Payload of a primitive event
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Null
    Null,
    /// Undefined (CBOR 0xf7 / MsgPack has no equivalent)
    Undefined,
    /// Boolean
    Bool(bool),
    /// Fits signed 32-bit
    Int(i32),
    /// Fits signed 64-bit
    Long(i64),
    /// Arbitrary precision
    Big(BigInt),
    /// Double float
    Float(f64),
    /// Unicode text
    Str(String),
    /// Byte string
    Bytes(Bytes),
}

impl Scalar {
    /// Narrowest integer variant holding an unsigned value
    pub fn from_u64(v: u64) -> Scalar {
        if let Ok(v) = i32::try_from(v) {
            Scalar::Int(v)
        } else if let Ok(v) = i64::try_from(v) {
            Scalar::Long(v)
        } else {
            Scalar::Big(BigInt::from(v))
        }
    }

    /// Narrowest integer variant holding a signed value
    pub fn from_i64(v: i64) -> Scalar {
        if let Ok(v) = i32::try_from(v) {
            Scalar::Int(v)
        } else {
            Scalar::Long(v)
        }
    }

    /// Narrowest integer variant holding any integer
    pub fn from_big(v: BigInt) -> Scalar {
        use num_traits::ToPrimitive;
        match v.to_i64() {
            Some(v) => Scalar::from_i64(v),
            None => Scalar::Big(v),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Value {
        match s {
            Scalar::Null => Value::Null,
            Scalar::Undefined => Value::Undefined(None),
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Long(v) => Value::Long(v),
            Scalar::Big(v) => Value::Big(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Str(v) => Value::String(v),
            Scalar::Bytes(v) => Value::Buffer(v),
        }
    }
}

/// One step of a document, in document order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Opens a map
    StartMap,
    /// Closes the innermost map
    EndMap,
    /// Opens a list
    StartList,
    /// Closes the innermost list
    EndList,
    /// Key of the next value inside a map
    Key(SmolStr),
    /// A complete scalar value
    Primitive(Scalar),
    /// Semantic tag applied to the next value
    Tag(u64),
    /// CBOR simple value outside the core set; becomes an undefined
    /// node carrying the code
    Simple(u8),
}

/// Folds an event stream into a value tree.
///
/// The builder reports completion when the outermost container closes,
/// or immediately on a primitive at depth zero.
#[derive(Default)]
pub struct NodeBuilder {
    stack: Vec<Node>,
    key: Option<SmolStr>,
    tag: Option<u64>,
    root: Option<Node>,
}

impl NodeBuilder {
    /// Fresh builder with no partial state
    pub fn new() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// True once a full document has been built
    pub fn is_complete(&self) -> bool {
        self.root.is_some()
    }

    /// The finished tree, leaving the builder ready for another
    /// document
    pub fn take(&mut self) -> Option<Node> {
        self.stack.clear();
        self.key = None;
        self.tag = None;
        self.root.take()
    }

    /// Depth of currently open containers
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Feed one event
    pub fn on_event(&mut self, event: Event) -> Result<()> {
        if self.root.is_some() {
            return Err(NodeError::BadEventStream("event after document end"));
        }
        match event {
            Event::Tag(t) => {
                self.tag = Some(t);
            }
            Event::Key(k) => {
                let in_map = self
                    .stack
                    .last()
                    .is_some_and(|n| n.type_name() == "map");
                if !in_map || self.key.is_some() {
                    return Err(NodeError::BadEventStream("key outside a map slot"));
                }
                self.key = Some(k);
            }
            Event::StartMap => self.open(Node::map())?,
            Event::StartList => self.open(Node::list())?,
            Event::EndMap => self.close("map")?,
            Event::EndList => self.close("list")?,
            Event::Primitive(s) => {
                let node = Node::new(Value::from(s));
                self.leaf(node)?;
            }
            Event::Simple(code) => {
                let node = Node::undefined(Some(code));
                self.leaf(node)?;
            }
        }
        Ok(())
    }

    fn open(&mut self, node: Node) -> Result<()> {
        node.set_tag(self.tag.take());
        self.attach(&node)?;
        self.stack.push(node);
        Ok(())
    }

    fn close(&mut self, expected: &'static str) -> Result<()> {
        let top = self
            .stack
            .pop()
            .ok_or(NodeError::BadEventStream("close without open"))?;
        if top.type_name() != expected {
            return Err(NodeError::BadEventStream("mismatched container close"));
        }
        if self.stack.is_empty() {
            self.root = Some(top);
        }
        Ok(())
    }

    fn leaf(&mut self, node: Node) -> Result<()> {
        node.set_tag(self.tag.take());
        if self.stack.is_empty() {
            if self.key.is_some() {
                return Err(NodeError::BadEventStream("dangling key"));
            }
            self.root = Some(node);
            return Ok(());
        }
        self.attach(&node)
    }

    fn attach(&mut self, node: &Node) -> Result<()> {
        let Some(parent) = self.stack.last() else {
            return Ok(());
        };
        let mut inner = parent.0.borrow_mut();
        match &mut inner.value {
            Value::Map(m) => {
                let key = self
                    .key
                    .take()
                    .ok_or(NodeError::BadEventStream("map value without key"))?;
                // duplicate keys: last occurrence wins
                m.insert(key, node.clone());
            }
            Value::List(v) => {
                if self.key.is_some() {
                    return Err(NodeError::BadEventStream("key inside a list"));
                }
                v.push(node.clone());
            }
            _ => unreachable!("only containers are pushed"),
        }
        drop(inner);
        node.set_parent(Some(parent));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(events: Vec<Event>) -> Node {
        let mut b = NodeBuilder::new();
        for e in events {
            b.on_event(e).expect("event");
        }
        assert!(b.is_complete());
        b.take().expect("root")
    }

    #[test]
    fn builds_nested_document() {
        let root = build(vec![
            Event::StartMap,
            Event::Key("a".into()),
            Event::StartList,
            Event::Primitive(Scalar::Int(0)),
            Event::Primitive(Scalar::Null),
            Event::Primitive(Scalar::Int(2)),
            Event::EndList,
            Event::EndMap,
        ]);
        assert_eq!(root.get("a").unwrap().type_name(), "list");
        assert_eq!(root.get("a").unwrap().size(), 3);
        assert_eq!(root.get("a[2]").unwrap().int_value().unwrap(), 2);
        assert!(root.get("a[0]").unwrap().parent().is_some());
    }

    #[test]
    fn primitive_at_depth_zero_completes() {
        let mut b = NodeBuilder::new();
        b.on_event(Event::Primitive(Scalar::Str("alone".into())))
            .unwrap();
        assert!(b.is_complete());
        assert_eq!(b.take().unwrap().string_value().unwrap(), "alone");
    }

    #[test]
    fn tag_attaches_to_next_value() {
        let root = build(vec![
            Event::StartList,
            Event::Tag(2),
            Event::Primitive(Scalar::Bytes(vec![1u8, 2].into())),
            Event::EndList,
        ]);
        assert_eq!(root.get("[0]").unwrap().tag(), Some(2));
    }

    #[test]
    fn simple_becomes_coded_undefined() {
        let root = build(vec![
            Event::StartList,
            Event::Simple(99),
            Event::EndList,
        ]);
        let n = root.get("[0]").unwrap();
        assert_eq!(n.type_name(), "undefined");
        n.with_value(|v| assert!(matches!(v, Value::Undefined(Some(99)))));
    }

    #[test]
    fn narrowing_picks_smallest_variant() {
        assert_eq!(Scalar::from_u64(7), Scalar::Int(7));
        assert_eq!(Scalar::from_u64(1 << 40), Scalar::Long(1 << 40));
        assert!(matches!(Scalar::from_u64(u64::MAX), Scalar::Big(_)));
        assert_eq!(Scalar::from_i64(i64::from(i32::MIN)), Scalar::Int(i32::MIN));
        assert_eq!(
            Scalar::from_i64(i64::from(i32::MIN) - 1),
            Scalar::Long(i64::from(i32::MIN) - 1)
        );
    }

    #[test]
    fn malformed_streams_error() {
        let mut b = NodeBuilder::new();
        assert!(b.on_event(Event::EndMap).is_err());

        let mut b = NodeBuilder::new();
        b.on_event(Event::StartList).unwrap();
        assert!(b.on_event(Event::Key("k".into())).is_err());

        let mut b = NodeBuilder::new();
        b.on_event(Event::StartMap).unwrap();
        assert!(b.on_event(Event::Primitive(Scalar::Null)).is_err());
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let root = build(vec![
            Event::StartMap,
            Event::Key("k".into()),
            Event::Primitive(Scalar::Int(1)),
            Event::Key("k".into()),
            Event::Primitive(Scalar::Int(2)),
            Event::EndMap,
        ]);
        assert_eq!(root.size(), 1);
        assert_eq!(root.get("k").unwrap().int_value().unwrap(), 2);
    }
}
