//! Node arena - the storage behind [`Document`](super::Document).
//!
//! Nodes are indices into a single `Vec`, the same way spark-tui components
//! are indices into parallel arrays. A removed node keeps its slot so it can
//! be re-inserted later with its identity intact.

use bitflags::bitflags;
use indexmap::IndexMap;

/// Handle to a node in a [`Document`](super::Document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

bitflags! {
    /// Per-node state that is not reflected in attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Current checkedness (only meaningful with `CHECKED_DIRTY`).
        const CHECKED = 1 << 0;
        /// Checkedness was set programmatically and no longer follows the attribute.
        const CHECKED_DIRTY = 1 << 1;
        /// Discarded for good; owners may drop state kept for it.
        const RELEASED = 1 << 2;
    }
}

/// Elements exposing a `value` property.
const VALUE_ELEMENTS: &[&str] = &[
    "input", "output", "textarea", "select", "option", "button", "li", "meter", "progress", "data",
    "param",
];

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Element { tag: String },
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) attributes: IndexMap<String, String>,
    /// Dirty `value` property; falls back to the `value` attribute when `None`.
    pub(crate) value: Option<String>,
    pub(crate) style: IndexMap<String, String>,
    pub(crate) flags: NodeFlags,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            value: None,
            style: IndexMap::new(),
            flags: NodeFlags::empty(),
        }
    }
}

/// The arena itself.
#[derive(Debug)]
pub(crate) struct Tree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Tree {
    pub(crate) fn new(root_tag: &str) -> Self {
        Self {
            nodes: vec![NodeData::new(NodeKind::Element {
                tag: root_tag.to_ascii_lowercase(),
            })],
            root: NodeId(0),
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn is_element(&self, id: NodeId) -> bool {
        matches!(self.get(id), Some(NodeData { kind: NodeKind::Element { .. }, .. }))
    }

    pub(crate) fn tag(&self, id: NodeId) -> Option<&str> {
        match self.get(id)?.kind {
            NodeKind::Element { ref tag } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub(crate) fn supports_value(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(|tag| VALUE_ELEMENTS.contains(&tag))
    }

    pub(crate) fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.get(id)?.attributes.get(name).map(String::as_str)
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    pub(crate) fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&parent| self.is_element(parent))
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map_or(&[], |node| node.children.as_slice())
    }

    /// Is `node` `ancestor` or inside it?
    pub(crate) fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Descendants of `id` in document (pre-)order, excluding `id` itself.
    pub(crate) fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Unlink `id` from its parent. Returns false if it had none.
    pub(crate) fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.retain(|&child| child != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
        true
    }

    /// Insert `id` into `parent` at `position`, detaching it first.
    pub(crate) fn insert_at(&mut self, parent: NodeId, position: usize, id: NodeId) {
        self.detach(id);
        if let Some(parent_node) = self.get_mut(parent) {
            let position = position.min(parent_node.children.len());
            parent_node.children.insert(position, id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = Some(parent);
        }
    }

    /// Copy `id` (and its subtree when `deep`) into fresh, parentless slots.
    pub(crate) fn clone_subtree(&mut self, id: NodeId, deep: bool) -> Option<NodeId> {
        let mut data = self.get(id)?.clone();
        let children = std::mem::take(&mut data.children);
        data.parent = None;
        let copy = self.alloc(data);
        if deep {
            for child in children {
                if let Some(child_copy) = self.clone_subtree(child, true) {
                    let len = self.children(copy).len();
                    self.insert_at(copy, len, child_copy);
                }
            }
        }
        Some(copy)
    }
}
