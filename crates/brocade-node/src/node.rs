//! The value tree.
//!
//! [`Node`] is a handle: cloning it clones the handle, not the value.
//! Children are owned by their parent; the parent pointer is a weak
//! back reference only and is cleared on detach. A node joins at most
//! one tree at a time — inserting a node that already has a parent
//! fails with [`NodeError::CycleOrShared`], as does inserting a node
//! into its own descendant.
//!
//! Trees are single-threaded. Independent trees may live on different
//! threads; one tree must not be mutated concurrently.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use base64::Engine;
use base64::prelude::{BASE64_STANDARD, BASE64_STANDARD_NO_PAD};
use bytes::Bytes;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use smol_str::SmolStr;

use crate::error::{NodeError, Result};
use crate::listener::{ListenerHandle, NodeEvent, NodeEventKind, NodeListener, deliver};
use crate::path::{Path, Step};

/// The variants a node can hold.
///
/// Exactly one variant is active. Numbers keep the narrowest variant
/// that preserves their value; accessors widen or saturate as
/// documented on [`Node`].
#[derive(Debug)]
pub enum Value {
    /// JSON `null` / CBOR null / MsgPack nil
    Null,
    /// CBOR/MsgPack undefined; carries the simple-value code when it
    /// came from a CBOR simple outside the core set
    Undefined(Option<u8>),
    /// Boolean
    Bool(bool),
    /// Number fitting a signed 32-bit integer
    Int(i32),
    /// Number fitting a signed 64-bit integer
    Long(i64),
    /// Arbitrary-precision integer
    Big(BigInt),
    /// Double-precision float
    Float(f64),
    /// Unicode string
    String(String),
    /// Byte buffer; rendered as base64 in JSON, natively in the binary
    /// codecs
    Buffer(Bytes),
    /// Ordered sequence
    List(Vec<Node>),
    /// Insertion-ordered string-keyed map
    Map(IndexMap<SmolStr, Node>),
}

impl Value {
    /// Stable lower-case variant tag
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined(_) => "undefined",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Long(_) | Value::Big(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Buffer(_) => "buffer",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

pub(crate) struct Inner {
    pub(crate) value: Value,
    pub(crate) tag: Option<u64>,
    pub(crate) parent: Option<Weak<RefCell<Inner>>>,
    pub(crate) listeners: Vec<ListenerHandle>,
}

/// Handle onto one node of a value tree
pub struct Node(pub(crate) Rc<RefCell<Inner>>);

impl Clone for Node {
    fn clone(&self) -> Self {
        Node(Rc::clone(&self.0))
    }
}

/// Where a prepared put lands inside the parent
enum Slot {
    MapKey(SmolStr),
    ListIndex(usize),
}

impl Node {
    fn from_value(value: Value, tag: Option<u64>) -> Node {
        Node(Rc::new(RefCell::new(Inner {
            value,
            tag,
            parent: None,
            listeners: Vec::new(),
        })))
    }

    /// New `null` node
    pub fn null() -> Node {
        Node::from_value(Value::Null, None)
    }

    /// New `undefined` node, optionally carrying a CBOR simple code
    pub fn undefined(code: Option<u8>) -> Node {
        Node::from_value(Value::Undefined(code), None)
    }

    /// New empty map node
    pub fn map() -> Node {
        Node::from_value(Value::Map(IndexMap::new()), None)
    }

    /// New empty list node
    pub fn list() -> Node {
        Node::from_value(Value::List(Vec::new()), None)
    }

    /// Build a node from a raw value
    pub fn new(value: Value) -> Node {
        Node::from_value(value, None)
    }

    /// Handle identity (not structural equality)
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.as_ref()?.upgrade().map(Node)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Node>) {
        self.0.borrow_mut().parent = parent.map(|p| Rc::downgrade(&p.0));
    }

    /// Semantic tag (CBOR tag number / MsgPack ext code), if any
    pub fn tag(&self) -> Option<u64> {
        self.0.borrow().tag
    }

    /// Attach a semantic tag. Tags are 63-bit unsigned.
    pub fn set_tag(&self, tag: Option<u64>) {
        debug_assert!(tag.is_none_or(|t| t < 1u64 << 63));
        self.0.borrow_mut().tag = tag;
    }

    /// Run `f` against the current value without cloning it
    pub fn with_value<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.0.borrow().value)
    }

    /// Replace the value in place, keeping identity, parent and
    /// listeners
    pub fn set_value(&self, value: Value) {
        self.0.borrow_mut().value = value;
    }

    /// Stable lower-case variant tag, e.g. `"list"` or `"number"`
    pub fn type_name(&self) -> &'static str {
        self.0.borrow().value.type_name()
    }

    /// Number of children for lists and maps, 0 otherwise
    pub fn size(&self) -> usize {
        match &self.0.borrow().value {
            Value::List(v) => v.len(),
            Value::Map(m) => m.len(),
            _ => 0,
        }
    }

    /// Register a mutation listener on this node
    pub fn add_listener(&self, listener: Rc<dyn NodeListener>) {
        self.0.borrow_mut().listeners.push(listener);
    }

    /// Remove every listener from this node
    pub fn clear_listeners(&self) {
        self.0.borrow_mut().listeners.clear();
    }

    pub(crate) fn listeners(&self) -> Vec<ListenerHandle> {
        self.0.borrow().listeners.clone()
    }

    // ---- accessors -----------------------------------------------------

    /// Integer coercion. Wider numeric variants saturate at the `i32`
    /// range; strings must parse exactly.
    pub fn int_value(&self) -> Result<i32> {
        match &self.0.borrow().value {
            Value::Int(v) => Ok(*v),
            Value::Long(v) => Ok((*v).clamp(i32::MIN as i64, i32::MAX as i64) as i32),
            Value::Big(b) => Ok(b.to_i32().unwrap_or(if b.sign() == num_bigint::Sign::Minus {
                i32::MIN
            } else {
                i32::MAX
            })),
            Value::Float(f) => Ok(*f as i32),
            Value::String(s) => s
                .parse::<i32>()
                .map_err(|_| self.coercion_err("int")),
            _ => Err(self.coercion_err("int")),
        }
    }

    /// Long coercion with the same saturation rules at the `i64` range
    pub fn long_value(&self) -> Result<i64> {
        match &self.0.borrow().value {
            Value::Int(v) => Ok(*v as i64),
            Value::Long(v) => Ok(*v),
            Value::Big(b) => Ok(b.to_i64().unwrap_or(if b.sign() == num_bigint::Sign::Minus {
                i64::MIN
            } else {
                i64::MAX
            })),
            Value::Float(f) => Ok(*f as i64),
            Value::String(s) => s
                .parse::<i64>()
                .map_err(|_| self.coercion_err("long")),
            _ => Err(self.coercion_err("long")),
        }
    }

    /// Double coercion; on strings any finite parse is accepted
    pub fn double_value(&self) -> Result<f64> {
        match &self.0.borrow().value {
            Value::Int(v) => Ok(*v as f64),
            Value::Long(v) => Ok(*v as f64),
            Value::Big(b) => b.to_f64().ok_or_else(|| self.coercion_err("double")),
            Value::Float(f) => Ok(*f),
            Value::String(s) => match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(f),
                _ => Err(self.coercion_err("double")),
            },
            _ => Err(self.coercion_err("double")),
        }
    }

    /// Boolean coercion; only booleans qualify
    pub fn boolean_value(&self) -> Result<bool> {
        match &self.0.borrow().value {
            Value::Bool(b) => Ok(*b),
            _ => Err(self.coercion_err("boolean")),
        }
    }

    /// String coercion: numbers render canonically, buffers as base64
    /// (padding retained)
    pub fn string_value(&self) -> Result<String> {
        match &self.0.borrow().value {
            Value::String(s) => Ok(s.clone()),
            Value::Int(v) => Ok(v.to_string()),
            Value::Long(v) => Ok(v.to_string()),
            Value::Big(b) => Ok(b.to_string()),
            Value::Float(f) => Ok(format_float(*f)),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Buffer(b) => Ok(BASE64_STANDARD.encode(b)),
            _ => Err(self.coercion_err("string")),
        }
    }

    /// Buffer coercion; strings are decoded as base64
    pub fn buffer_value(&self) -> Result<Bytes> {
        match &self.0.borrow().value {
            Value::Buffer(b) => Ok(b.clone()),
            Value::String(s) => BASE64_STANDARD
                .decode(s)
                .or_else(|_| BASE64_STANDARD_NO_PAD.decode(s))
                .map(Bytes::from)
                .map_err(|_| self.coercion_err("buffer")),
            _ => Err(self.coercion_err("buffer")),
        }
    }

    fn coercion_err(&self, to: &'static str) -> NodeError {
        NodeError::BadCoercion {
            from: self.0.borrow().value.type_name(),
            to,
        }
    }

    // ---- traversal -----------------------------------------------------

    /// Child addressed by one step, or `None` on a miss. Key steps
    /// select on maps only, index steps on lists only; a quoted
    /// numeric key never aliases a list index.
    pub fn child(&self, step: &Step) -> Option<Node> {
        match (&self.0.borrow().value, step) {
            (Value::Map(m), Step::Key(k)) => m.get(k.as_str()).cloned(),
            (Value::List(v), Step::Index(i)) => v.get(*i).cloned(),
            _ => None,
        }
    }

    /// Resolve a path. Misses and unparseable paths return `None`.
    pub fn get(&self, path: &str) -> Option<Node> {
        let path = Path::parse(path).ok()?;
        let mut cur = self.clone();
        for step in path.steps() {
            cur = cur.child(step)?;
        }
        Some(cur)
    }

    /// Map entries as (key, handle) pairs, or `None` on a non-map
    pub fn entries(&self) -> Option<Vec<(SmolStr, Node)>> {
        match &self.0.borrow().value {
            Value::Map(m) => Some(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            _ => None,
        }
    }

    /// List items as handles, or `None` on a non-list
    pub fn items(&self) -> Option<Vec<Node>> {
        match &self.0.borrow().value {
            Value::List(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Path text from this node down to `other`; the empty string is
    /// self, `None` means `other` is not a descendant.
    pub fn find(&self, other: &Node) -> Option<String> {
        let mut steps = Vec::new();
        let mut cur = other.clone();
        while !cur.ptr_eq(self) {
            let parent = cur.parent()?;
            steps.push(parent.step_of(&cur)?);
            cur = parent;
        }
        steps.reverse();
        Some(Path::from_steps(steps).to_string())
    }

    fn step_of(&self, child: &Node) -> Option<Step> {
        match &self.0.borrow().value {
            Value::Map(m) => m
                .iter()
                .find(|(_, v)| v.ptr_eq(child))
                .map(|(k, _)| Step::Key(k.clone())),
            Value::List(v) => v
                .iter()
                .position(|n| n.ptr_eq(child))
                .map(Step::Index),
            _ => None,
        }
    }

    // ---- mutation ------------------------------------------------------

    /// Assign `value` at `path`, creating intermediate containers as
    /// needed. Returns the node previously at that position.
    ///
    /// Bareword steps materialise maps, bracketed indices materialise
    /// zero-padded lists, and a string key landing on a list rewrites
    /// the list into a map keyed by stringified indices. Each
    /// conversion and insertion notifies listeners.
    pub fn put(&self, path: &str, value: impl Into<Node>) -> Result<Option<Node>> {
        let path = Path::parse(path)?;
        let steps = path.steps();
        if steps.is_empty() {
            return Err(NodeError::BadPath {
                path: String::new(),
                offset: 0,
                reason: "empty path cannot address a child",
            });
        }
        let node = value.into();
        if node.parent().is_some() {
            return Err(NodeError::CycleOrShared);
        }
        // Inserting an ancestor (or self) anywhere below would close a
        // cycle: `node` can only be above `self` if it is a root, and
        // then it heads self's ancestor chain.
        let mut at = Some(self.clone());
        while let Some(n) = at {
            if n.ptr_eq(&node) {
                return Err(NodeError::CycleOrShared);
            }
            at = n.parent();
        }

        let mut cur = self.clone();
        for i in 0..steps.len() - 1 {
            cur = cur.descend(&steps[i], &steps[i + 1]);
        }
        Ok(cur.put_child(steps.last().expect("non-empty"), node))
    }

    /// Detach the child addressed by a single step (`"key"`, `"[3]"`
    /// or `"3"`). Returns the detached node, now a root.
    pub fn remove(&self, step: &str) -> Option<Node> {
        let path = Path::parse(step).ok()?;
        let [step] = path.steps() else { return None };
        let removed = match (&mut self.0.borrow_mut().value, step) {
            (Value::Map(m), Step::Key(k)) => m.shift_remove(k.as_str()),
            (Value::List(v), Step::Index(i)) if *i < v.len() => Some(v.remove(*i)),
            _ => None,
        };
        if let Some(node) = &removed {
            node.set_parent(None);
            deliver(
                self,
                &NodeEvent {
                    kind: NodeEventKind::ChildRemoved,
                    target: self.clone(),
                    step: Some(step.clone()),
                    previous: Some(node.clone()),
                    current: None,
                },
            );
        }
        removed
    }

    /// Deep copy with no parent and no listeners
    pub fn duplicate(&self) -> Node {
        let (value, tag) = {
            let inner = self.0.borrow();
            let value = match &inner.value {
                Value::Null => Value::Null,
                Value::Undefined(c) => Value::Undefined(*c),
                Value::Bool(b) => Value::Bool(*b),
                Value::Int(v) => Value::Int(*v),
                Value::Long(v) => Value::Long(*v),
                Value::Big(b) => Value::Big(b.clone()),
                Value::Float(f) => Value::Float(*f),
                Value::String(s) => Value::String(s.clone()),
                Value::Buffer(b) => Value::Buffer(b.clone()),
                Value::List(items) => {
                    Value::List(items.iter().map(Node::duplicate).collect())
                }
                Value::Map(m) => Value::Map(
                    m.iter()
                        .map(|(k, v)| (k.clone(), v.duplicate()))
                        .collect(),
                ),
            };
            (value, inner.tag)
        };
        let node = Node::from_value(value, tag);
        node.adopt_children();
        node
    }

    fn adopt_children(&self) {
        let children: Vec<Node> = match &self.0.borrow().value {
            Value::List(v) => v.clone(),
            Value::Map(m) => m.values().cloned().collect(),
            _ => Vec::new(),
        };
        for child in children {
            child.set_parent(Some(self));
        }
    }

    /// Ensure this node can hold a child at `step`, converting the
    /// variant in place when the grammar says so.
    fn prepare_slot(&self, step: &Step) -> Slot {
        enum Shape {
            Map,
            List(usize),
            Other,
        }
        let shape = match &self.0.borrow().value {
            Value::Map(_) => Shape::Map,
            Value::List(v) => Shape::List(v.len()),
            _ => Shape::Other,
        };
        match (step, shape) {
            (Step::Key(k), Shape::Map) => Slot::MapKey(k.clone()),
            (Step::Index(i), Shape::Map) => {
                // an index addressed into a non-list rewrites it
                self.convert(Value::List(Vec::new()));
                Slot::ListIndex(*i)
            }
            (Step::Key(k), Shape::List(_)) => {
                // a string key on a list always rewrites it into a
                // map keyed by stringified indices, numeric or not
                self.list_to_map();
                Slot::MapKey(k.clone())
            }
            (Step::Index(i), Shape::List(_)) => Slot::ListIndex(*i),
            (Step::Key(k), Shape::Other) => {
                self.convert(Value::Map(IndexMap::new()));
                Slot::MapKey(k.clone())
            }
            (Step::Index(i), Shape::Other) => {
                self.convert(Value::List(Vec::new()));
                Slot::ListIndex(*i)
            }
        }
    }

    fn convert(&self, value: Value) {
        self.0.borrow_mut().value = value;
        deliver(
            self,
            &NodeEvent {
                kind: NodeEventKind::Converted,
                target: self.clone(),
                step: None,
                previous: None,
                current: Some(self.clone()),
            },
        );
    }

    /// List keyed by a string becomes a map whose keys are the
    /// stringified indices.
    fn list_to_map(&self) {
        let items = {
            let mut inner = self.0.borrow_mut();
            let Value::List(items) = std::mem::replace(&mut inner.value, Value::Null) else {
                unreachable!("list_to_map on non-list")
            };
            items
        };
        let map: IndexMap<SmolStr, Node> = items
            .into_iter()
            .enumerate()
            .map(|(i, n)| (SmolStr::new(i.to_string()), n))
            .collect();
        self.0.borrow_mut().value = Value::Map(map);
        deliver(
            self,
            &NodeEvent {
                kind: NodeEventKind::Converted,
                target: self.clone(),
                step: None,
                previous: None,
                current: Some(self.clone()),
            },
        );
    }

    /// Walk one level for `put`, creating the intermediate container
    /// implied by `next` when nothing suitable is there.
    fn descend(&self, step: &Step, next: &Step) -> Node {
        let slot = self.prepare_slot(step);
        if let Some(existing) = self.slot_child(&slot) {
            return existing;
        }
        let child = match next {
            Step::Key(_) => Node::map(),
            Step::Index(_) => Node::list(),
        };
        self.insert_at(slot, child.clone(), step);
        child
    }

    fn slot_child(&self, slot: &Slot) -> Option<Node> {
        match (&self.0.borrow().value, slot) {
            (Value::Map(m), Slot::MapKey(k)) => m.get(k.as_str()).cloned(),
            (Value::List(v), Slot::ListIndex(i)) => v.get(*i).cloned(),
            _ => None,
        }
    }

    fn put_child(&self, step: &Step, node: Node) -> Option<Node> {
        let slot = self.prepare_slot(step);
        self.insert_at(slot, node, step)
    }

    /// Insert `node` at `slot`, padding lists with nulls. Returns the
    /// displaced child.
    fn insert_at(&self, slot: Slot, node: Node, step: &Step) -> Option<Node> {
        node.set_parent(Some(self));
        let previous = {
            let mut inner = self.0.borrow_mut();
            match (&mut inner.value, slot) {
                (Value::Map(m), Slot::MapKey(k)) => m.insert(k, node.clone()),
                (Value::List(v), Slot::ListIndex(i)) => {
                    if i < v.len() {
                        Some(std::mem::replace(&mut v[i], node.clone()))
                    } else {
                        while v.len() < i {
                            v.push(Node::null());
                        }
                        v.push(node.clone());
                        None
                    }
                }
                _ => unreachable!("slot prepared against a different shape"),
            }
        };
        // padding nulls need their back reference too
        self.adopt_children_padding();
        if let Some(prev) = &previous {
            prev.set_parent(None);
        }
        deliver(
            self,
            &NodeEvent {
                kind: if previous.is_some() {
                    NodeEventKind::ChildReplaced
                } else {
                    NodeEventKind::ChildAdded
                },
                target: self.clone(),
                step: Some(step.clone()),
                previous: previous.clone(),
                current: Some(node),
            },
        );
        previous
    }

    fn adopt_children_padding(&self) {
        let orphans: Vec<Node> = match &self.0.borrow().value {
            Value::List(v) => v
                .iter()
                .filter(|n| n.parent().is_none())
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        for child in orphans {
            child.set_parent(Some(self));
        }
    }
}

/// Canonical text for a float: shortest round-trip form, always marked
/// as non-integral (`2.0`, not `2`).
pub fn format_float(f: f64) -> String {
    let mut s = format!("{f:?}");
    if !s.contains(['.', 'e', 'E', 'n', 'i']) {
        s.push_str(".0");
    }
    s
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.borrow();
        if let Some(tag) = inner.tag {
            write!(f, "{}(", tag)?;
        }
        match &inner.value {
            Value::Null => write!(f, "null")?,
            Value::Undefined(None) => write!(f, "undefined")?,
            Value::Undefined(Some(c)) => write!(f, "simple({c})")?,
            Value::Bool(b) => write!(f, "{b}")?,
            Value::Int(v) => write!(f, "{v}")?,
            Value::Long(v) => write!(f, "{v}")?,
            Value::Big(b) => write!(f, "{b}")?,
            Value::Float(v) => write!(f, "{}", format_float(*v))?,
            Value::String(s) => write!(f, "{s:?}")?,
            Value::Buffer(b) => write!(f, "b64'{}'", BASE64_STANDARD.encode(b))?,
            Value::List(items) => f.debug_list().entries(items.iter()).finish()?,
            Value::Map(m) => f.debug_map().entries(m.iter()).finish()?,
        }
        if inner.tag.is_some() {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl PartialEq for Node {
    /// Structural equality over value and tag; parents and listeners
    /// are ignored. Integer variants compare by numeric value.
    fn eq(&self, other: &Node) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let a = self.0.borrow();
        let b = other.0.borrow();
        if a.tag != b.tag {
            return false;
        }
        match (&a.value, &b.value) {
            (Value::Null, Value::Null) => true,
            (Value::Undefined(x), Value::Undefined(y)) => x == y,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::String(x), Value::String(y)) => x == y,
            (Value::Buffer(x), Value::Buffer(y)) => x == y,
            (Value::List(x), Value::List(y)) => x == y,
            (Value::Map(x), Value::Map(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
            }
            (x, y) => match (int_of(x), int_of(y)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

fn int_of(v: &Value) -> Option<BigInt> {
    match v {
        Value::Int(v) => Some(BigInt::from(*v)),
        Value::Long(v) => Some(BigInt::from(*v)),
        Value::Big(b) => Some(b.clone()),
        _ => None,
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Node {
        Node::new(value)
    }
}

impl From<bool> for Node {
    fn from(v: bool) -> Node {
        Node::new(Value::Bool(v))
    }
}

impl From<i32> for Node {
    fn from(v: i32) -> Node {
        Node::new(Value::Int(v))
    }
}

impl From<i64> for Node {
    fn from(v: i64) -> Node {
        if let Ok(v) = i32::try_from(v) {
            Node::new(Value::Int(v))
        } else {
            Node::new(Value::Long(v))
        }
    }
}

impl From<f64> for Node {
    fn from(v: f64) -> Node {
        Node::new(Value::Float(v))
    }
}

impl From<BigInt> for Node {
    fn from(v: BigInt) -> Node {
        Node::new(Value::Big(v))
    }
}

impl From<&str> for Node {
    fn from(v: &str) -> Node {
        Node::new(Value::String(v.to_string()))
    }
}

impl From<String> for Node {
    fn from(v: String) -> Node {
        Node::new(Value::String(v))
    }
}

impl From<Bytes> for Node {
    fn from(v: Bytes) -> Node {
        Node::new(Value::Buffer(v))
    }
}

impl From<Vec<u8>> for Node {
    fn from(v: Vec<u8>) -> Node {
        Node::new(Value::Buffer(Bytes::from(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn put_then_get_round_trips() {
        let root = Node::map();
        let v = Node::from("hello");
        root.put("a.b", v.clone()).expect("put");
        let got = root.get("a.b").expect("get");
        assert!(got.ptr_eq(&v));
        assert_eq!(got, v);
    }

    #[test]
    fn deep_put_vivifies_maps() {
        let root = Node::map();
        root.put("a.b.c.d", 1).expect("put");
        assert_eq!(root.get("a.b.c.d").unwrap().int_value().unwrap(), 1);
        assert_eq!(root.get("a").unwrap().type_name(), "map");
        assert_eq!(root.get("a.b.c").unwrap().type_name(), "map");
    }

    #[test]
    fn list_converts_to_map_on_string_key() {
        let root = Node::map();
        root.put("e[0]", false).expect("put");
        assert_eq!(root.get("e").unwrap().type_name(), "list");
        root.put("e[\"a\"]", true).expect("put");
        let e = root.get("e").unwrap();
        assert_eq!(e.type_name(), "map");
        assert_eq!(e.size(), 2);
        assert!(!root.get("e[\"0\"]").unwrap().boolean_value().unwrap());
        assert!(root.get("e.a").unwrap().boolean_value().unwrap());
    }

    #[test]
    fn quoted_numeric_key_converts_list_too() {
        // a quoted key is a string key even when its text is numeric
        let root = Node::map();
        root.put("e[0]", 10).expect("put");
        root.put("e[1]", 11).expect("put");
        root.put("e[\"1\"]", 99).expect("put");
        let e = root.get("e").unwrap();
        assert_eq!(e.type_name(), "map");
        assert_eq!(e.size(), 2);
        assert_eq!(root.get("e[\"0\"]").unwrap().int_value().unwrap(), 10);
        assert_eq!(root.get("e[\"1\"]").unwrap().int_value().unwrap(), 99);
    }

    #[test]
    fn quoted_numeric_key_never_aliases_an_index() {
        let root = Node::map();
        root.put("l[2]", 5).expect("put");
        let l = root.get("l").unwrap();
        assert_eq!(l.type_name(), "list");
        assert_eq!(root.get("l[2]").unwrap().int_value().unwrap(), 5);
        // reads by string key miss on a list
        assert!(root.get("l[\"2\"]").is_none());
        // and removal by string key fails to find, leaving the list
        assert!(l.remove("[\"2\"]").is_none());
        assert_eq!(l.size(), 3);
        // bracketed indices miss on a map as well
        let m = Node::map();
        m.put("[\"0\"]", 1).expect("put");
        assert!(m.get("[0]").is_none());
        assert!(m.remove("[0]").is_none());
    }

    #[test]
    fn index_put_zero_pads() {
        let root = Node::map();
        root.put("l[3]", 7).expect("put");
        let l = root.get("l").unwrap();
        assert_eq!(l.size(), 4);
        assert_eq!(l.get("[0]").unwrap().type_name(), "null");
        assert_eq!(l.get("[3]").unwrap().int_value().unwrap(), 7);
        assert!(l.get("[0]").unwrap().parent().unwrap().ptr_eq(&l));
    }

    #[test]
    fn put_returns_previous_child() {
        let root = Node::map();
        assert!(root.put("k", 1).expect("put").is_none());
        let prev = root.put("k", 2).expect("put").expect("previous");
        assert_eq!(prev.int_value().unwrap(), 1);
        assert!(prev.parent().is_none());
    }

    #[test]
    fn shared_insert_rejected() {
        let root = Node::map();
        root.put("a", 1).expect("put");
        let child = root.get("a").unwrap();
        let other = Node::map();
        assert_eq!(
            other.put("x", child).unwrap_err(),
            NodeError::CycleOrShared
        );
    }

    #[test]
    fn ancestor_insert_rejected() {
        let root = Node::map();
        root.put("a.b", 1).expect("put");
        let a = root.get("a").unwrap();
        assert_eq!(a.put("c", root).unwrap_err(), NodeError::CycleOrShared);
    }

    #[test]
    fn no_node_appears_twice() {
        let root = Node::map();
        root.put("a.b", 1).expect("put");
        let b = root.get("a.b").unwrap();
        // reinsertion elsewhere requires detaching first
        assert!(root.put("c", b.clone()).is_err());
        let detached = root.get("a").unwrap().remove("b").unwrap();
        assert!(detached.ptr_eq(&b));
        root.put("c", detached).expect("put");
        assert!(root.get("a.b").is_none());
        assert!(root.get("c").unwrap().ptr_eq(&b));
    }

    #[test]
    fn int_saturation_at_boundaries() {
        let long = Node::from(1i64 << 31);
        assert_eq!(long.int_value().unwrap(), i32::MAX);
        assert_eq!(long.long_value().unwrap(), 1i64 << 31);

        let neg = Node::from(-(1i64 << 31) - 1);
        assert_eq!(neg.int_value().unwrap(), i32::MIN);

        let big = Node::from(BigInt::from(1u128 << 63));
        assert_eq!(big.long_value().unwrap(), i64::MAX);
        assert_eq!(big.int_value().unwrap(), i32::MAX);

        let max_long = Node::from(i64::MAX);
        assert_eq!(max_long.long_value().unwrap(), i64::MAX);
    }

    #[test]
    fn string_coercions_parse_exactly() {
        assert_eq!(Node::from("123").int_value().unwrap(), 123);
        assert!(Node::from("12.5").int_value().is_err());
        assert!(Node::from("2147483648").int_value().is_err());
        assert_eq!(Node::from("2147483648").long_value().unwrap(), 1i64 << 31);
        assert_eq!(Node::from("12.5").double_value().unwrap(), 12.5);
        assert!(Node::from("NaN").double_value().is_err());
        assert!(Node::from("banana").double_value().is_err());
    }

    #[test]
    fn coercion_failures() {
        assert!(Node::null().int_value().is_err());
        assert!(Node::map().double_value().is_err());
        assert!(Node::list().boolean_value().is_err());
        assert!(Node::undefined(None).long_value().is_err());
        let err = Node::null().int_value().unwrap_err();
        assert_eq!(
            err,
            NodeError::BadCoercion {
                from: "null",
                to: "int"
            }
        );
    }

    #[test]
    fn number_string_forms() {
        assert_eq!(Node::from(2.0f64).string_value().unwrap(), "2.0");
        assert_eq!(Node::from(-7).string_value().unwrap(), "-7");
        assert_eq!(
            Node::from(vec![0u8, 1, 2]).string_value().unwrap(),
            "AAEC"
        );
    }

    #[test]
    fn buffer_base64_lengths() {
        for len in 0..=10usize {
            let data: Vec<u8> = (0..len as u8).collect();
            let node = Node::from(data.clone());
            let text = node.string_value().unwrap();
            let back = Node::from(text).buffer_value().unwrap();
            assert_eq!(back.as_ref(), &data[..], "length {len}");
        }
    }

    #[test]
    fn find_builds_paths() {
        let root = Node::map();
        root.put("a.b[2].c", true).expect("put");
        let c = root.get("a.b[2].c").unwrap();
        assert_eq!(root.find(&c).unwrap(), "a.b[2].c");
        assert_eq!(root.find(&root).unwrap(), "");
        let stranger = Node::null();
        assert!(root.find(&stranger).is_none());
        // a quoted key round-trips through find
        root.put("[\"odd key\"]", 1).expect("put");
        let odd = root.get("[\"odd key\"]").unwrap();
        assert_eq!(root.find(&odd).unwrap(), "[\"odd key\"]");
        assert!(root.get(&root.find(&odd).unwrap()).unwrap().ptr_eq(&odd));
    }

    #[test]
    fn duplicate_is_deep_and_detached() {
        let root = Node::map();
        root.put("a.b", 5).expect("put");
        root.get("a").unwrap().set_tag(Some(40));
        let copy = root.duplicate();
        assert!(copy.parent().is_none());
        assert_eq!(copy, root);
        assert!(!copy.get("a.b").unwrap().ptr_eq(&root.get("a.b").unwrap()));
        assert_eq!(copy.get("a").unwrap().tag(), Some(40));
        // mutating the copy leaves the original alone
        copy.put("a.b", 6).expect("put");
        assert_eq!(root.get("a.b").unwrap().int_value().unwrap(), 5);
    }

    struct Counter(Cell<usize>);
    impl NodeListener for Counter {
        fn node_changed(&self, _event: &NodeEvent) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn listeners_fire_up_the_chain() {
        let root = Node::map();
        root.put("a.b", 1).expect("put");
        let counter = Rc::new(Counter(Cell::new(0)));
        root.add_listener(counter.clone());
        root.put("a.b", 2).expect("put");
        // replacing a.b notifies the root listener once
        assert_eq!(counter.0.get(), 1);
        root.get("a").unwrap().remove("b").unwrap();
        assert_eq!(counter.0.get(), 2);
    }

    #[test]
    fn conversion_notifies_listeners() {
        let root = Node::map();
        root.put("e[0]", 1).expect("put");
        let counter = Rc::new(Counter(Cell::new(0)));
        root.add_listener(counter.clone());
        root.put("e[\"k\"]", 2).expect("put");
        // one Converted (list to map) plus one ChildAdded
        assert_eq!(counter.0.get(), 2);
    }

    #[test]
    fn detached_node_becomes_root() {
        let root = Node::map();
        root.put("x.y", 1).expect("put");
        let x = root.remove("x").unwrap();
        assert!(x.parent().is_none());
        assert_eq!(x.get("y").unwrap().int_value().unwrap(), 1);
    }

    #[test]
    fn tags_survive_duplicate_and_compare() {
        let a = Node::from(1);
        a.set_tag(Some(7));
        let b = Node::from(1);
        assert_ne!(a, b);
        b.set_tag(Some(7));
        assert_eq!(a, b);
    }
}
