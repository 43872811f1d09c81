//! Listener bus for structural mutations.
//!
//! Every node may carry listeners. A mutation (child added, removed or
//! replaced, or an in-place variant conversion) produces one
//! [`NodeEvent`], delivered synchronously after the tree is consistent
//! to the listeners of the mutated node and then each ancestor in turn
//! up to the root.

use std::rc::Rc;

use crate::node::Node;
use crate::path::Step;

/// What happened to the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    /// A child was inserted at a previously empty key/index
    ChildAdded,
    /// A child was detached
    ChildRemoved,
    /// A child was replaced by another node at the same key/index
    ChildReplaced,
    /// A node's variant was rewritten in place (auto-vivification or
    /// list-to-map conversion)
    Converted,
}

/// A single structural mutation
#[derive(Clone)]
pub struct NodeEvent {
    /// Kind of mutation
    pub kind: NodeEventKind,
    /// The node the mutation happened on (the parent for child
    /// mutations, the converted node itself for `Converted`)
    pub target: Node,
    /// Key or index of the affected child, when applicable
    pub step: Option<Step>,
    /// Node previously at that position
    pub previous: Option<Node>,
    /// Node now at that position
    pub current: Option<Node>,
}

impl std::fmt::Debug for NodeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeEvent")
            .field("kind", &self.kind)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// Receives structural mutation events.
///
/// Delivery is synchronous on the mutating call, after the tree is
/// already in its new state. Listeners must not mutate the tree they
/// are observing from inside the callback.
pub trait NodeListener {
    /// Called once per mutation, parent-first along the ancestor chain
    fn node_changed(&self, event: &NodeEvent);
}

pub(crate) type ListenerHandle = Rc<dyn NodeListener>;

/// Deliver `event` to the listeners of `start` and every ancestor.
pub(crate) fn deliver(start: &Node, event: &NodeEvent) {
    let mut at = Some(start.clone());
    while let Some(node) = at {
        for listener in node.listeners() {
            listener.node_changed(event);
        }
        at = node.parent();
    }
}
