//! CloneContent - grow or shrink a run of sibling nodes to a target count.
//!
//! The element manages the nodes selected by `root` + `target` (default: its
//! direct children) and keeps exactly `count` of them attached.
//!
//! # Pools
//!
//! ```text
//! originals  attached nodes that were not generated
//! clones     attached copies, tagged Clone { index } (1-based, creation order)
//! stashed    detached originals kept for reuse, most recently evicted first
//! ```
//!
//! # Reconciliation
//!
//! Each pass, for a target `count`:
//! 1. Restore stashed originals (front first) after the last attached original
//! 2. Trim clones from the tail while too many nodes are attached
//! 3. Evict originals from the tail into the front of the stash
//! 4. Clone the last clone (or last original) until `count` nodes are attached
//!
//! Originals always come back before any clone is created, and clones are
//! only ever added or removed at the tail.
//!
//! # Example
//!
//! ```ignore
//! // <clone-content count="5"><li>a</li><li>b</li><li>c</li></clone-content>
//! // → a b c c¹ c²  (copies of the last node, tagged 1 and 2)
//! registry.set_attribute(&doc, host, "count", "1");
//! // → a            (clones dropped, b and c stashed)
//! registry.set_attribute(&doc, host, "count", "4");
//! // → a b c c¹     (b and c restored, then one new clone)
//! ```

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace, warn};

use crate::dom::{Document, NodeId, Selector};
use crate::engine::{CustomElement, ElementContext, Lifecycle, Register};
use crate::types::parse_number;

/// Markup attribute carrying a clone's index.
pub const CLONE_ATTRIBUTE: &str = "data-clone";

const DEFAULT_ROOT: &str = ":scope";
const DEFAULT_TARGET: &str = " > *";

/// What a managed node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedNode {
    Original,
    Clone { index: usize },
}

/// The content-cloning element.
#[derive(Debug)]
pub struct CloneContent {
    host: NodeId,
    lifecycle: Lifecycle,
    /// Kinds of the nodes this element has seen or created.
    kinds: HashMap<NodeId, ManagedNode>,
    stashed: VecDeque<NodeId>,
    /// Parent of the first original, for re-inserting when no original is attached.
    original_root: Option<NodeId>,
}

impl CloneContent {
    pub fn new(host: NodeId) -> Self {
        Self {
            host,
            lifecycle: Lifecycle::new(),
            kinds: HashMap::new(),
            stashed: VecDeque::new(),
            original_root: None,
        }
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Detached originals, next to be restored first.
    pub fn stashed(&self) -> Vec<NodeId> {
        self.stashed.iter().copied().collect()
    }

    /// Currently attached managed nodes with their kinds, in document order.
    pub fn managed_nodes(&self, doc: &Document) -> Vec<(NodeId, ManagedNode)> {
        let Some(selector) = self.content_selector(doc) else {
            return Vec::new();
        };
        let mut clones = 0;
        doc.query_selector_all(self.host, &selector)
            .into_iter()
            .map(|node| {
                let kind = self.kind_of(doc, node, clones + 1);
                if matches!(kind, ManagedNode::Clone { .. }) {
                    clones += 1;
                }
                (node, kind)
            })
            .collect()
    }

    /// `root` + `target`, with `root` anchored to this element unless it
    /// already names `:scope` or `:root`.
    fn content_selector(&self, doc: &Document) -> Option<Selector> {
        let mut root = doc
            .get_attribute(self.host, "root")
            .unwrap_or_else(|| DEFAULT_ROOT.to_string());
        if !(root.contains(":root") || root.contains(":scope")) {
            root = format!(":scope {root}");
        }
        let target = doc
            .get_attribute(self.host, "target")
            .unwrap_or_else(|| DEFAULT_TARGET.to_string());
        let source = format!("{root}{target}");
        match Selector::parse(&source) {
            Ok(selector) => Some(selector),
            Err(error) => {
                warn!(selector = %source, %error, "clone-content selector is invalid");
                None
            }
        }
    }

    /// `position` is the 1-based index the node would have as the next clone
    /// in the pool; markup clones with an unusable index take it.
    fn kind_of(&self, doc: &Document, node: NodeId, position: usize) -> ManagedNode {
        if let Some(&kind) = self.kinds.get(&node) {
            return kind;
        }
        // Clones already present in the markup.
        match doc.get_attribute(node, CLONE_ATTRIBUTE) {
            Some(index) => ManagedNode::Clone {
                index: index
                    .trim()
                    .parse()
                    .ok()
                    .filter(|&index| index > 0)
                    .unwrap_or(position),
            },
            None => ManagedNode::Original,
        }
    }

    /// Converge the attached node count to the `count` attribute.
    pub fn reconcile(&mut self, doc: &Document) {
        let count = parse_count(doc.get_attribute(self.host, "count").as_deref());
        let Some(selector) = self.content_selector(doc) else {
            return;
        };

        let mut originals = Vec::new();
        let mut clones = Vec::new();
        for node in doc.query_selector_all(self.host, &selector) {
            match self.kind_of(doc, node, clones.len() + 1) {
                ManagedNode::Original => originals.push(node),
                ManagedNode::Clone { .. } => clones.push(node),
            }
        }

        let target_originals = count.min(originals.len() + self.stashed.len());

        // Restore
        while originals.len() < target_originals {
            let Some(node) = self.stashed.pop_front() else {
                break;
            };
            let inserted = match originals.last() {
                Some(&last) => doc.insert_after(last, node),
                None => self
                    .original_root
                    .is_some_and(|root| doc.prepend(root, node)),
            };
            if !inserted {
                debug!(node = node.index(), "no anchor to restore stashed node");
                self.stashed.push_front(node);
                break;
            }
            originals.push(node);
        }

        // Trim clones
        while originals.len() + clones.len() > count {
            let Some(clone) = clones.pop() else {
                break;
            };
            doc.remove(clone);
            doc.release(clone);
            self.kinds.remove(&clone);
        }

        // Evict originals
        while originals.len() > count {
            let Some(node) = originals.pop() else {
                break;
            };
            if originals.is_empty() {
                self.original_root = doc.parent(node);
            }
            doc.remove(node);
            self.kinds.insert(node, ManagedNode::Original);
            self.stashed.push_front(node);
        }

        // Grow clones
        while originals.len() + clones.len() < count {
            let Some(&source) = clones.last().or(originals.last()) else {
                debug!(count, "nothing to clone");
                break;
            };
            let Some(clone) = doc.clone_node(source, true) else {
                break;
            };
            let index = clones.len() + 1;
            doc.set_attribute(clone, CLONE_ATTRIBUTE, &index.to_string());
            if !doc.insert_after(source, clone) {
                break;
            }
            self.kinds.insert(clone, ManagedNode::Clone { index });
            clones.push(clone);
        }

        trace!(
            count,
            originals = originals.len(),
            clones = clones.len(),
            stashed = self.stashed.len(),
            "clone-content reconciled"
        );
    }
}

/// `count` as a non-negative integer: missing, empty, negative and
/// non-numeric values are all `0`, fractions truncate.
pub fn parse_count(raw: Option<&str>) -> usize {
    let value = raw.map_or(0.0, parse_number);
    if value.is_finite() && value > 0.0 {
        value.trunc() as usize
    } else {
        0
    }
}

impl CustomElement for CloneContent {
    fn observed_attributes(&self) -> &'static [&'static str] {
        &["count", "root", "target"]
    }

    fn connected(&mut self, _doc: &Document) {
        self.lifecycle.connect();
    }

    fn disconnected(&mut self, _doc: &Document) {
        self.lifecycle.disconnect();
    }

    fn attribute_changed(
        &mut self,
        doc: &Document,
        name: &str,
        old: Option<&str>,
        new: Option<&str>,
    ) {
        if old == new {
            return;
        }
        // `root` only takes effect on the next count/target change.
        if matches!(name, "count" | "target") {
            self.reconcile(doc);
        }
    }
}

impl Register for CloneContent {
    const DEFAULT_NAME: &'static str = "clone-content";

    fn create(host: NodeId, _context: &ElementContext) -> Self {
        Self::new(host)
    }
}
