//! DOM - the in-memory document the elements operate on.
//!
//! This is the collaborator layer: tree query, node clone, node
//! insert/remove, attribute and property access, class list, custom
//! properties and event dispatch. The elements in [`crate::primitives`] only
//! ever talk to the tree through [`Document`].
//!
//! # Architecture
//!
//! ```text
//! Document (Rc handle)
//!   ├── Tree            arena of NodeData, addressed by NodeId
//!   ├── EventRegistry   listeners keyed by (node, event type)
//!   ├── mutations       counter bumped by every tree/attribute write
//!   └── observers       attribute records + post-dispatch callbacks
//! ```
//!
//! Once something calls [`Document::observe`], every attribute write is
//! recorded as an [`AttributeRecord`] and the observers run after each
//! outermost [`Document::dispatch_event`]. The element registry uses this to
//! deliver attribute changes made by one element to another.
//!
//! Every method borrows the arena for the duration of one operation only, and
//! listeners are invoked with no borrow held, so callbacks are free to mutate
//! the document.

mod events;
mod node;
mod selector;

pub use events::{Event, EventListener};
pub use node::{NodeFlags, NodeId};
pub use selector::{Selector, SelectorError};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use events::EventRegistry;
use node::{NodeData, NodeKind, Tree};
use tracing::trace;

use crate::engine::AbortSignal;

/// One attribute write on an element, as seen by document observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub node: NodeId,
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
    /// [`Document::mutation_count`] right after the write.
    pub sequence: u64,
}

type Observer = Rc<dyn Fn(&Document)>;

struct DocumentInner {
    tree: RefCell<Tree>,
    events: RefCell<EventRegistry>,
    mutations: Cell<u64>,
    /// `None` until someone observes the document.
    records: RefCell<Option<Vec<AttributeRecord>>>,
    observers: RefCell<Vec<Observer>>,
    dispatch_depth: Cell<usize>,
}

/// Handle to an in-memory document. Clones share the same tree.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("mutations", &self.inner.mutations.get())
            .field("listeners", &self.inner.events.borrow().len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with an `html` root and an empty `body`.
    pub fn new() -> Self {
        let doc = Self {
            inner: Rc::new(DocumentInner {
                tree: RefCell::new(Tree::new("html")),
                events: RefCell::new(EventRegistry::default()),
                mutations: Cell::new(0),
                records: RefCell::new(None),
                observers: RefCell::new(Vec::new()),
                dispatch_depth: Cell::new(0),
            }),
        };
        let body = doc.create_element("body");
        doc.append_child(doc.root(), body);
        doc.inner.mutations.set(0);
        doc
    }

    /// The document element (`html`).
    pub fn root(&self) -> NodeId {
        self.inner.tree.borrow().root()
    }

    /// The `body` element.
    pub fn body(&self) -> NodeId {
        let body = Selector::type_selector("body");
        self.query_selector(self.root(), &body).unwrap_or_else(|| self.root())
    }

    /// Number of tree and attribute writes since creation.
    pub fn mutation_count(&self) -> u64 {
        self.inner.mutations.get()
    }

    fn bump(&self) {
        self.inner.mutations.set(self.inner.mutations.get() + 1);
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Start recording attribute writes and call `observer` once every
    /// outermost event dispatch has finished.
    pub fn observe(&self, observer: impl Fn(&Document) + 'static) {
        self.inner
            .records
            .borrow_mut()
            .get_or_insert_with(Vec::new);
        self.inner.observers.borrow_mut().push(Rc::new(observer));
    }

    /// Drain the attribute writes recorded since the last call.
    pub fn take_attribute_records(&self) -> Vec<AttributeRecord> {
        self.inner
            .records
            .borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    fn record_attribute(&self, node: NodeId, name: &str, old: Option<String>, new: Option<&str>) {
        let sequence = self.mutation_count();
        if let Some(records) = self.inner.records.borrow_mut().as_mut() {
            records.push(AttributeRecord {
                node,
                name: name.to_string(),
                old,
                new: new.map(str::to_string),
                sequence,
            });
        }
    }

    fn notify_observers(&self) {
        let observers: Vec<Observer> = self.inner.observers.borrow().clone();
        for observer in observers {
            observer(self);
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.tree.borrow_mut().alloc(NodeData::new(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
        }))
    }

    /// Create a detached element with attributes.
    pub fn create_element_with(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let id = self.create_element(tag);
        let mut tree = self.inner.tree.borrow_mut();
        if let Some(node) = tree.get_mut(id) {
            for (name, value) in attributes {
                node.attributes
                    .insert(name.to_ascii_lowercase(), (*value).to_string());
            }
        }
        id
    }

    /// Create a detached text node.
    pub fn create_text(&self, text: &str) -> NodeId {
        self.inner
            .tree
            .borrow_mut()
            .alloc(NodeData::new(NodeKind::Text(text.to_string())))
    }

    /// Copy a node; `deep` copies its subtree too. The copy is detached.
    pub fn clone_node(&self, node: NodeId, deep: bool) -> Option<NodeId> {
        self.inner.tree.borrow_mut().clone_subtree(node, deep)
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        let position = self.inner.tree.borrow().children(parent).len();
        self.insert_child(parent, position, child)
    }

    /// Insert `child` as the first child of `parent`.
    pub fn prepend(&self, parent: NodeId, child: NodeId) -> bool {
        self.insert_child(parent, 0, child)
    }

    /// Insert `node` right after `reference` under the same parent.
    pub fn insert_after(&self, reference: NodeId, node: NodeId) -> bool {
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        if reference == node {
            return false;
        }
        // Position is read after detaching `node` in case they are siblings.
        let mut tree = self.inner.tree.borrow_mut();
        if tree.contains(node, parent) {
            return false;
        }
        tree.detach(node);
        let Some(position) = tree.children(parent).iter().position(|&c| c == reference) else {
            return false;
        };
        tree.insert_at(parent, position + 1, node);
        drop(tree);
        self.bump();
        true
    }

    fn insert_child(&self, parent: NodeId, position: usize, child: NodeId) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        if !tree.is_element(parent) || tree.get(child).is_none() || tree.contains(child, parent) {
            return false;
        }
        tree.insert_at(parent, position, child);
        drop(tree);
        self.bump();
        true
    }

    /// Mark a detached subtree as discarded for good. Owners of per-node
    /// state (the element registry) drop it on their next pass. Connected
    /// nodes are left alone.
    pub fn release(&self, node: NodeId) {
        if self.is_connected(node) {
            return;
        }
        let mut tree = self.inner.tree.borrow_mut();
        let mut released = tree.descendants(node);
        released.push(node);
        for id in released {
            if let Some(data) = tree.get_mut(id) {
                data.flags.insert(NodeFlags::RELEASED);
            }
        }
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.inner
            .tree
            .borrow()
            .get(node)
            .is_some_and(|data| data.flags.contains(NodeFlags::RELEASED))
    }

    /// Detach `node` from its parent. The node stays valid for re-insertion.
    pub fn remove(&self, node: NodeId) -> bool {
        let removed = self.inner.tree.borrow_mut().detach(node);
        if removed {
            self.bump();
        }
        removed
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.tree.borrow().parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.borrow().children(node).to_vec()
    }

    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        let tree = self.inner.tree.borrow();
        tree.children(node)
            .iter()
            .copied()
            .filter(|&child| tree.is_element(child))
            .collect()
    }

    /// Descendants of `node` in document order, `node` excluded.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.tree.borrow().descendants(node)
    }

    /// Is `node` attached under the document root?
    pub fn is_connected(&self, node: NodeId) -> bool {
        let tree = self.inner.tree.borrow();
        tree.contains(tree.root(), node)
    }

    /// Is `node` `ancestor` itself or one of its descendants?
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.tree.borrow().contains(ancestor, node)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.inner.tree.borrow().is_element(node)
    }

    /// Lowercase tag name, `None` for text nodes.
    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.inner.tree.borrow().tag(node).map(str::to_string)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .tree
            .borrow()
            .attribute(node, &name.to_ascii_lowercase())
            .map(str::to_string)
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.get_attribute(node, name).is_some()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut tree = self.inner.tree.borrow_mut();
        let Some(data) = tree.get_mut(node) else {
            return;
        };
        if !matches!(data.kind, NodeKind::Element { .. }) {
            return;
        }
        let name = name.to_ascii_lowercase();
        let old = data.attributes.insert(name.clone(), value.to_string());
        drop(tree);
        self.bump();
        self.record_attribute(node, &name, old, Some(value));
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        let removed = self
            .inner
            .tree
            .borrow_mut()
            .get_mut(node)
            .and_then(|data| data.attributes.shift_remove(&name));
        if let Some(old) = removed {
            self.bump();
            self.record_attribute(node, &name, Some(old), None);
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Does this element expose a `value` property?
    pub fn supports_value(&self, node: NodeId) -> bool {
        self.inner.tree.borrow().supports_value(node)
    }

    /// The `value` property: the dirty value if set, else the `value`
    /// attribute, else empty. `None` for elements without the property.
    pub fn value(&self, node: NodeId) -> Option<String> {
        let tree = self.inner.tree.borrow();
        if !tree.supports_value(node) {
            return None;
        }
        let data = tree.get(node)?;
        Some(
            data.value
                .clone()
                .or_else(|| data.attributes.get("value").cloned())
                .unwrap_or_default(),
        )
    }

    /// Set the `value` property. Ignored for elements without it.
    pub fn set_value(&self, node: NodeId, value: &str) -> bool {
        let mut tree = self.inner.tree.borrow_mut();
        if !tree.supports_value(node) {
            return false;
        }
        let Some(data) = tree.get_mut(node) else {
            return false;
        };
        data.value = Some(value.to_string());
        drop(tree);
        self.bump();
        true
    }

    /// Checkedness: follows the `checked` attribute until set explicitly.
    pub fn checked(&self, node: NodeId) -> bool {
        let tree = self.inner.tree.borrow();
        let Some(data) = tree.get(node) else {
            return false;
        };
        if data.flags.contains(NodeFlags::CHECKED_DIRTY) {
            data.flags.contains(NodeFlags::CHECKED)
        } else {
            data.attributes.contains_key("checked")
        }
    }

    pub fn set_checked(&self, node: NodeId, checked: bool) {
        if let Some(data) = self.inner.tree.borrow_mut().get_mut(node) {
            data.flags.insert(NodeFlags::CHECKED_DIRTY);
            data.flags.set(NodeFlags::CHECKED, checked);
        }
        self.bump();
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let tree = self.inner.tree.borrow();
        if let Some(NodeData {
            kind: NodeKind::Text(text),
            ..
        }) = tree.get(node)
        {
            return text.clone();
        }
        tree.descendants(node)
            .into_iter()
            .filter_map(|id| match tree.get(id) {
                Some(NodeData {
                    kind: NodeKind::Text(text),
                    ..
                }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node (none for `None`/empty).
    pub fn set_text_content(&self, node: NodeId, text: Option<&str>) {
        let mut tree = self.inner.tree.borrow_mut();
        let Some(data) = tree.get_mut(node) else {
            return;
        };
        if let NodeKind::Text(existing) = &mut data.kind {
            *existing = text.unwrap_or_default().to_string();
        } else {
            for child in tree.children(node).to_vec() {
                tree.detach(child);
            }
            if let Some(text) = text.filter(|t| !t.is_empty()) {
                let text_node = tree.alloc(NodeData::new(NodeKind::Text(text.to_string())));
                tree.insert_at(node, 0, text_node);
            }
        }
        drop(tree);
        self.bump();
    }

    /// Inline style property, including `--custom` properties.
    pub fn style_property(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner
            .tree
            .borrow()
            .get(node)?
            .style
            .get(name)
            .cloned()
    }

    /// Set an inline style property; an empty value removes it.
    pub fn set_style_property(&self, node: NodeId, name: &str, value: &str) {
        let mut tree = self.inner.tree.borrow_mut();
        let Some(data) = tree.get_mut(node) else {
            return;
        };
        if value.is_empty() {
            data.style.shift_remove(name);
        } else {
            data.style.insert(name.to_string(), value.to_string());
        }
        drop(tree);
        self.bump();
    }

    pub fn class_list_contains(&self, node: NodeId, class: &str) -> bool {
        self.inner
            .tree
            .borrow()
            .attribute(node, "class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    /// Add (`force = true`) or remove a class name.
    pub fn class_list_toggle(&self, node: NodeId, class: &str, force: bool) {
        if class.is_empty() || self.class_list_contains(node, class) == force {
            return;
        }
        let current = self.get_attribute(node, "class").unwrap_or_default();
        let mut classes: Vec<&str> = current
            .split_ascii_whitespace()
            .filter(|&c| c != class)
            .collect();
        if force {
            classes.push(class);
        }
        self.set_attribute(node, "class", &classes.join(" "));
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Elements under `scope` matching `selector`, in document order.
    /// `:scope` refers to `scope`.
    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        let tree = self.inner.tree.borrow();
        tree.descendants(scope)
            .into_iter()
            .filter(|&node| selector.matches_in(&tree, node, Some(scope)))
            .collect()
    }

    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        let tree = self.inner.tree.borrow();
        tree.descendants(scope)
            .into_iter()
            .find(|&node| selector.matches_in(&tree, node, Some(scope)))
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches_in(&self.inner.tree.borrow(), node, None)
    }

    /// `node` or its nearest ancestor element matching `selector`.
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let tree = self.inner.tree.borrow();
        let mut current = Some(node).filter(|&n| tree.is_element(n));
        while let Some(id) = current {
            if selector.matches_in(&tree, id, None) {
                return Some(id);
            }
            current = tree.parent_element(id);
        }
        None
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen for `event_type` on `node` until `signal` aborts.
    pub fn add_event_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: impl Fn(&Document, &Event) + 'static,
        signal: Option<&AbortSignal>,
    ) {
        if signal.is_some_and(AbortSignal::is_aborted) {
            return;
        }
        let id = self.inner.events.borrow_mut().add(
            node,
            event_type,
            Rc::new(listener),
            signal.cloned(),
        );
        if let Some(signal) = signal {
            let weak: Weak<DocumentInner> = Rc::downgrade(&self.inner);
            signal.on_abort(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.events.borrow_mut().remove(id);
                }
            });
        }
    }

    /// Deliver an event to the listeners on `node`. Returns how many ran.
    ///
    /// Observers run once the outermost dispatch has returned.
    pub fn dispatch_event(&self, node: NodeId, event_type: &str) -> usize {
        let depth = self.inner.dispatch_depth.get();
        self.inner.dispatch_depth.set(depth + 1);
        let delivered = self.deliver_event(node, event_type);
        self.inner.dispatch_depth.set(depth);
        if depth == 0 {
            self.notify_observers();
        }
        delivered
    }

    fn deliver_event(&self, node: NodeId, event_type: &str) -> usize {
        let listeners = self.inner.events.borrow().snapshot(node, event_type);
        let event = Event {
            event_type: event_type.to_string(),
            target: node,
        };
        let mut delivered = 0;
        for (listener, signal) in listeners {
            // A previous listener may have aborted this one.
            if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
                continue;
            }
            listener(self, &event);
            delivered += 1;
        }
        trace!(node = node.index(), event_type, delivered, "event dispatched");
        delivered
    }

    /// Total registered listeners across all nodes.
    pub fn listener_count(&self) -> usize {
        self.inner.events.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AbortController;

    fn list(doc: &Document, items: usize) -> (NodeId, Vec<NodeId>) {
        let ul = doc.create_element("ul");
        doc.append_child(doc.body(), ul);
        let lis = (0..items)
            .map(|i| {
                let li = doc.create_element_with("li", &[("id", &format!("item-{i}"))]);
                doc.append_child(ul, li);
                li
            })
            .collect();
        (ul, lis)
    }

    #[test]
    fn test_new_document_has_body() {
        let doc = Document::new();
        let body = doc.body();
        assert_eq!(doc.tag(body).as_deref(), Some("body"));
        assert_eq!(doc.parent(body), Some(doc.root()));
        assert_eq!(doc.mutation_count(), 0);
    }

    #[test]
    fn test_insert_after_and_remove() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, 3);

        doc.remove(lis[0]);
        assert!(!doc.is_connected(lis[0]));
        assert_eq!(doc.element_children(ul), vec![lis[1], lis[2]]);

        doc.insert_after(lis[2], lis[0]);
        assert_eq!(doc.element_children(ul), vec![lis[1], lis[2], lis[0]]);

        // Moving a sibling keeps the reference position right.
        doc.insert_after(lis[1], lis[0]);
        assert_eq!(doc.element_children(ul), vec![lis[1], lis[0], lis[2]]);

        doc.prepend(ul, lis[2]);
        assert_eq!(doc.element_children(ul), vec![lis[2], lis[1], lis[0]]);
    }

    #[test]
    fn test_cannot_insert_into_own_subtree() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, 1);
        assert!(!doc.append_child(lis[0], ul));
        assert!(!doc.insert_after(lis[0], ul));
        assert_eq!(doc.parent(ul), Some(doc.body()));
    }

    #[test]
    fn test_clone_node_is_detached_deep_copy() {
        let doc = Document::new();
        let (_, lis) = list(&doc, 1);
        let span = doc.create_element("span");
        doc.append_child(lis[0], span);
        doc.set_text_content(span, Some("hello"));

        let copy = doc.clone_node(lis[0], true).unwrap();
        assert_ne!(copy, lis[0]);
        assert_eq!(doc.parent(copy), None);
        assert_eq!(doc.get_attribute(copy, "id").as_deref(), Some("item-0"));
        assert_eq!(doc.text_content(copy), "hello");

        let shallow = doc.clone_node(lis[0], false).unwrap();
        assert!(doc.children(shallow).is_empty());
    }

    #[test]
    fn test_query_scope_and_child_combinator() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, 2);
        let nested = doc.create_element("li");
        let inner = doc.create_element("ul");
        doc.append_child(lis[1], inner);
        doc.append_child(inner, nested);

        let direct = Selector::parse(":scope > *").unwrap();
        assert_eq!(doc.query_selector_all(ul, &direct), lis);

        let all_li = Selector::parse("li").unwrap();
        assert_eq!(doc.query_selector_all(ul, &all_li), vec![lis[0], lis[1], nested]);

        let nested_only = Selector::parse(":scope li li").unwrap();
        assert_eq!(doc.query_selector_all(ul, &nested_only), vec![nested]);
    }

    #[test]
    fn test_closest_includes_self() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, 1);
        let li = Selector::type_selector("li");
        let ul_sel = Selector::type_selector("ul");
        assert_eq!(doc.closest(lis[0], &li), Some(lis[0]));
        assert_eq!(doc.closest(lis[0], &ul_sel), Some(ul));
        assert_eq!(doc.closest(ul, &li), None);
    }

    #[test]
    fn test_class_list_and_style() {
        let doc = Document::new();
        let div = doc.create_element_with("div", &[("class", "a")]);
        doc.class_list_toggle(div, "b", true);
        doc.class_list_toggle(div, "a", false);
        assert_eq!(doc.get_attribute(div, "class").as_deref(), Some("b"));
        assert!(doc.class_list_contains(div, "b"));

        doc.set_style_property(div, "--level", "3");
        assert_eq!(doc.style_property(div, "--level").as_deref(), Some("3"));
        doc.set_style_property(div, "--level", "");
        assert_eq!(doc.style_property(div, "--level"), None);
    }

    #[test]
    fn test_value_property_only_on_value_elements() {
        let doc = Document::new();
        let input = doc.create_element_with("input", &[("value", "4")]);
        let div = doc.create_element("div");

        assert_eq!(doc.value(input).as_deref(), Some("4"));
        assert!(doc.set_value(input, "9"));
        assert_eq!(doc.value(input).as_deref(), Some("9"));
        assert_eq!(doc.get_attribute(input, "value").as_deref(), Some("4"));

        assert_eq!(doc.value(div), None);
        assert!(!doc.set_value(div, "1"));
    }

    #[test]
    fn test_checked_follows_attribute_until_dirty() {
        let doc = Document::new();
        let checkbox = doc.create_element_with("input", &[("type", "checkbox"), ("checked", "")]);
        assert!(doc.checked(checkbox));
        doc.set_checked(checkbox, false);
        assert!(!doc.checked(checkbox));
        assert!(doc.has_attribute(checkbox, "checked"));
    }

    #[test]
    fn test_event_listener_removed_on_abort() {
        use std::cell::Cell;

        let doc = Document::new();
        let input = doc.create_element("input");
        let controller = AbortController::new();
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();

        doc.add_event_listener(
            input,
            "input",
            move |_, event| {
                assert_eq!(event.event_type, "input");
                count_clone.set(count_clone.get() + 1);
            },
            Some(&controller.signal()),
        );
        assert_eq!(doc.dispatch_event(input, "input"), 1);
        assert_eq!(doc.dispatch_event(input, "change"), 0);

        controller.abort();
        assert_eq!(doc.listener_count(), 0);
        assert_eq!(doc.dispatch_event(input, "input"), 0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_attribute_records_start_with_observe() {
        use std::cell::Cell;

        let doc = Document::new();
        let (ul, _) = list(&doc, 0);
        doc.set_attribute(ul, "hidden", "");
        assert!(doc.take_attribute_records().is_empty());

        let checkpoints = Rc::new(Cell::new(0));
        let seen = checkpoints.clone();
        doc.observe(move |_| seen.set(seen.get() + 1));

        doc.set_attribute(ul, "Data-Mode", "a");
        doc.remove_attribute(ul, "hidden");
        doc.remove_attribute(ul, "missing");
        let records = doc.take_attribute_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "data-mode");
        assert_eq!((records[0].old.as_deref(), records[0].new.as_deref()), (None, Some("a")));
        assert_eq!((records[1].old.as_deref(), records[1].new.as_deref()), (Some(""), None));
        assert!(records[0].sequence < records[1].sequence);
        assert!(doc.take_attribute_records().is_empty());

        // Nested dispatches reach observers once.
        let inner = doc.create_element("button");
        let outer = doc.create_element("button");
        doc.add_event_listener(
            outer,
            "click",
            move |doc, _| {
                doc.dispatch_event(inner, "click");
            },
            None,
        );
        doc.dispatch_event(outer, "click");
        assert_eq!(checkpoints.get(), 1);
    }

    #[test]
    fn test_release_marks_detached_subtree() {
        let doc = Document::new();
        let (ul, lis) = list(&doc, 2);

        doc.release(ul);
        assert!(!doc.is_released(ul));

        doc.remove(ul);
        doc.release(ul);
        assert!(doc.is_released(ul));
        assert!(lis.iter().all(|&li| doc.is_released(li)));
        assert!(!doc.is_released(doc.body()));
    }
}
