use std::rc::Rc;

use crate::component::ComponentDef;
use crate::refs::RefBinding;
use crate::value::{Props, Value};

/// Stable id of a committed tree position, allocated when the position
/// first commits and kept while it keeps appearing. A position that
/// vanishes releases its id; reappearing later allocates a fresh one.
pub type NodeId = u64;

/// What a render function returns: a description of the desired tree.
///
/// Component nodes become (or update) child instances during reconciliation;
/// element and text nodes pass through to the committed tree.
#[derive(Clone)]
pub enum Node {
    Component {
        def: Rc<ComponentDef>,
        key: Option<String>,
        props: Props,
    },
    Element {
        tag: String,
        key: Option<String>,
        props: Props,
        node_ref: Option<RefBinding>,
        children: Vec<Node>,
    },
    Text(String),
}

impl Node {
    pub fn component(def: &Rc<ComponentDef>, props: Props) -> Node {
        Node::Component {
            def: def.clone(),
            key: None,
            props,
        }
    }

    pub fn element(tag: impl Into<String>) -> Node {
        Node::Element {
            tag: tag.into(),
            key: None,
            props: Props::new(),
            node_ref: None,
            children: Vec::new(),
        }
    }

    pub fn text(s: impl Into<String>) -> Node {
        Node::Text(s.into())
    }

    /// Explicit identity key, for siblings that can reorder.
    pub fn keyed(mut self, k: impl Into<String>) -> Self {
        match &mut self {
            Node::Component { key, .. } | Node::Element { key, .. } => *key = Some(k.into()),
            Node::Text(_) => {}
        }
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Node::Component { props, .. } | Node::Element { props, .. } => {
                props.insert(name, value);
            }
            Node::Text(_) => {}
        }
        self
    }

    pub fn node_ref(mut self, binding: RefBinding) -> Self {
        if let Node::Element { node_ref, .. } = &mut self {
            *node_ref = Some(binding);
        }
        self
    }

    pub fn child(mut self, node: Node) -> Self {
        if let Node::Element { children, .. } = &mut self {
            children.push(node);
        }
        self
    }

    pub fn children(mut self, nodes: Vec<Node>) -> Self {
        if let Node::Element { children, .. } = &mut self {
            children.extend(nodes);
        }
        self
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Node::Component { def, key, props },
                Node::Component {
                    def: d2,
                    key: k2,
                    props: p2,
                },
            ) => Rc::ptr_eq(def, d2) && key == k2 && props == p2,
            (
                Node::Element {
                    tag,
                    key,
                    props,
                    node_ref,
                    children,
                },
                Node::Element {
                    tag: t2,
                    key: k2,
                    props: p2,
                    node_ref: r2,
                    children: c2,
                },
            ) => {
                tag == t2
                    && key == k2
                    && props == p2
                    && children == c2
                    && match (node_ref, r2) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.same_identity(b),
                        _ => false,
                    }
            }
            (Node::Text(a), Node::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Component { def, key, props } => f
                .debug_struct("Component")
                .field("def", &def.name)
                .field("key", key)
                .field("props", props)
                .finish(),
            Node::Element {
                tag, key, children, ..
            } => f
                .debug_struct("Element")
                .field("tag", tag)
                .field("key", key)
                .field("children", children)
                .finish(),
            Node::Text(s) => write!(f, "Text({s:?})"),
        }
    }
}

/// One position of the committed tree handed to the renderer.
///
/// Structurally complete per commit: component nodes have been expanded
/// into the subtrees their instances rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedNode {
    pub id: NodeId,
    pub kind: CommittedKind,
    pub props: Props,
    pub children: Vec<CommittedNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommittedKind {
    Element { tag: String },
    Text { text: String },
}

impl CommittedNode {
    pub fn find(&self, id: NodeId) -> Option<&CommittedNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// First node (preorder) with the given element tag.
    pub fn find_by_tag(&self, tag: &str) -> Option<&CommittedNode> {
        if let CommittedKind::Element { tag: t } = &self.kind
            && t == tag
        {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_tag(tag))
    }

    /// All text content in document order, useful for assertions.
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_texts(&mut out);
        out
    }

    fn collect_texts(&self, out: &mut Vec<String>) {
        if let CommittedKind::Text { text } = &self.kind {
            out.push(text.clone());
        }
        for c in &self.children {
            c.collect_texts(out);
        }
    }
}
