//! Element Registry - element definitions and live instances.
//!
//! Manages the lifecycle of element instances:
//! - name → factory definitions (the registration capability)
//! - node → instance mapping for upgraded elements
//! - connect/disconnect bookkeeping after every tree change made through it
//!
//! Tree changes that should reach element callbacks go through the registry
//! (`set_attribute`, `append_child`, `remove`). After each one the registry
//! re-syncs:
//! - recorded attribute writes reach the instances observing them
//! - instances whose node left the document get `disconnected`, instances
//!   that came back get `connected`
//! - instances of released nodes are dropped
//! - newly attached nodes with a defined tag are upgraded
//!
//! The registry also observes its document, so attribute writes elements make
//! directly on the [`Document`] (an `input-value` rendering `as="@count"`)
//! are delivered at the end of the event dispatch that caused them.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, warn};

use crate::dom::{AttributeRecord, Document, NodeId};
use crate::state::InputBus;

/// Passes after which a re-sync stops chasing callbacks that keep mutating the tree.
const MAX_SYNC_PASSES: usize = 16;

// =============================================================================
// Element traits
// =============================================================================

/// Callbacks an element receives from the registry.
pub trait CustomElement {
    /// Attributes whose changes reach [`attribute_changed`](Self::attribute_changed).
    fn observed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    fn connected(&mut self, _doc: &Document) {}

    fn disconnected(&mut self, _doc: &Document) {}

    fn attribute_changed(
        &mut self,
        _doc: &Document,
        _name: &str,
        _old: Option<&str>,
        _new: Option<&str>,
    ) {
    }
}

/// Shared services handed to every element at creation.
#[derive(Debug, Clone, Default)]
pub struct ElementContext {
    pub bus: InputBus,
}

/// Builds an element instance for a host node.
pub type ElementFactory = Rc<dyn Fn(NodeId, &ElementContext) -> Box<dyn CustomElement>>;

/// Options for [`Register::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Tag name; the element's default name when `None`.
    pub name: Option<String>,
    /// Target registry; the thread's global registry when `None`.
    pub registry: Option<ElementRegistry>,
}

/// Registration capability.
pub trait Register: CustomElement + Sized + 'static {
    const DEFAULT_NAME: &'static str;

    /// Gate for registration (feature detection). Registration is skipped when false.
    fn condition() -> bool {
        true
    }

    fn create(host: NodeId, context: &ElementContext) -> Self;

    fn register(options: RegisterOptions) -> Result<(), RegistryError> {
        if !Self::condition() {
            debug!(name = Self::DEFAULT_NAME, "registration condition not met");
            return Ok(());
        }
        let registry = options.registry.unwrap_or_else(ElementRegistry::global);
        let name = options.name.unwrap_or_else(|| Self::DEFAULT_NAME.to_string());
        let factory: ElementFactory = Rc::new(|host: NodeId, context: &ElementContext| {
            Box::new(Self::create(host, context)) as Box<dyn CustomElement>
        });
        registry.define(&name, factory)
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid element name {0:?}: must start with a lowercase letter and contain a hyphen")]
    InvalidName(String),
    #[error("element {0:?} is already defined")]
    AlreadyDefined(String),
}

// =============================================================================
// Registry State
// =============================================================================

struct Instance {
    element: Rc<RefCell<Box<dyn CustomElement>>>,
    connected: Cell<bool>,
    /// Mutation count at creation; older attribute records were replayed.
    upgraded_at: u64,
}

struct RegistryInner {
    context: ElementContext,
    definitions: RefCell<HashMap<String, ElementFactory>>,
    instances: RefCell<HashMap<NodeId, Rc<Instance>>>,
    observing: Cell<bool>,
    syncing: Cell<bool>,
}

/// Handle to an element registry. Clones share state.
///
/// One registry serves one [`Document`]: instances are keyed by node.
#[derive(Clone)]
pub struct ElementRegistry {
    inner: Rc<RegistryInner>,
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.inner.definitions.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("ElementRegistry")
            .field("definitions", &names)
            .field("instances", &self.inner.instances.borrow().len())
            .finish()
    }
}

thread_local! {
    static GLOBAL_REGISTRY: ElementRegistry = ElementRegistry::new(ElementContext::default());
}

impl ElementRegistry {
    pub fn new(context: ElementContext) -> Self {
        Self {
            inner: Rc::new(RegistryInner {
                context,
                definitions: RefCell::new(HashMap::new()),
                instances: RefCell::new(HashMap::new()),
                observing: Cell::new(false),
                syncing: Cell::new(false),
            }),
        }
    }

    /// The default registry for this thread.
    pub fn global() -> Self {
        GLOBAL_REGISTRY.with(|registry| registry.clone())
    }

    pub fn context(&self) -> &ElementContext {
        &self.inner.context
    }

    // =========================================================================
    // Definitions
    // =========================================================================

    /// Define `name`. Names are validated and can only be defined once.
    pub fn define(&self, name: &str, factory: ElementFactory) -> Result<(), RegistryError> {
        if !is_valid_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let mut definitions = self.inner.definitions.borrow_mut();
        if definitions.contains_key(name) {
            warn!(name, "element already defined");
            return Err(RegistryError::AlreadyDefined(name.to_string()));
        }
        definitions.insert(name.to_string(), factory);
        debug!(name, "element defined");
        Ok(())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.inner.definitions.borrow().contains_key(name)
    }

    // =========================================================================
    // Tree changes
    // =========================================================================

    /// Upgrade every connected element with a defined tag.
    pub fn upgrade(&self, doc: &Document) {
        self.sync(doc);
    }

    /// Set an attribute and notify the element if it observes it.
    pub fn set_attribute(&self, doc: &Document, node: NodeId, name: &str, value: &str) {
        self.observe(doc);
        doc.set_attribute(node, name, value);
        self.sync(doc);
    }

    /// Remove an attribute and notify the element if it observes it.
    pub fn remove_attribute(&self, doc: &Document, node: NodeId, name: &str) {
        self.observe(doc);
        doc.remove_attribute(node, name);
        self.sync(doc);
    }

    /// Append `child` under `parent`, then connect/upgrade what became attached.
    pub fn append_child(&self, doc: &Document, parent: NodeId, child: NodeId) -> bool {
        let appended = doc.append_child(parent, child);
        self.sync(doc);
        appended
    }

    /// Detach `node`, then disconnect every instance inside it.
    pub fn remove(&self, doc: &Document, node: NodeId) -> bool {
        let removed = doc.remove(node);
        self.sync(doc);
        removed
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn is_upgraded(&self, node: NodeId) -> bool {
        self.inner.instances.borrow().contains_key(&node)
    }

    /// Number of live instances, connected or not.
    pub fn instance_count(&self) -> usize {
        self.inner.instances.borrow().len()
    }

    // =========================================================================
    // Sync
    // =========================================================================

    fn instance(&self, node: NodeId) -> Option<Rc<Instance>> {
        self.inner.instances.borrow().get(&node).cloned()
    }

    /// Start recording `doc`'s attribute writes and re-sync after its event
    /// dispatches. Done once; one registry serves one document.
    fn observe(&self, doc: &Document) {
        if self.inner.observing.replace(true) {
            return;
        }
        let registry: Weak<RegistryInner> = Rc::downgrade(&self.inner);
        doc.observe(move |doc| {
            if let Some(inner) = registry.upgrade() {
                ElementRegistry { inner }.sync(doc);
            }
        });
    }

    /// Deliver a recorded write; returns whether a callback ran.
    fn notify_attribute(&self, doc: &Document, record: &AttributeRecord) -> bool {
        let Some(instance) = self.instance(record.node) else {
            return false;
        };
        // Writes from before the upgrade were replayed at creation.
        if record.sequence <= instance.upgraded_at {
            return false;
        }
        let mut element = instance.element.borrow_mut();
        if !element
            .observed_attributes()
            .iter()
            .any(|&observed| observed == record.name)
        {
            return false;
        }
        element.attribute_changed(
            doc,
            &record.name,
            record.old.as_deref(),
            record.new.as_deref(),
        );
        true
    }

    /// Bring instances in line with the tree. Repeats while callbacks keep
    /// changing it. Calls made from inside a callback return at once; the
    /// running sync picks their changes up on its next pass.
    fn sync(&self, doc: &Document) {
        self.observe(doc);
        if self.inner.syncing.replace(true) {
            return;
        }
        let mut settled = false;
        for _ in 0..MAX_SYNC_PASSES {
            if !self.sync_pass(doc) {
                settled = true;
                break;
            }
        }
        self.inner.syncing.set(false);
        if !settled {
            warn!(passes = MAX_SYNC_PASSES, "element sync did not settle");
        }
    }

    /// One pass; returns whether any callback ran.
    fn sync_pass(&self, doc: &Document) -> bool {
        let mut changed = false;

        // Attribute writes since the last pass.
        for record in doc.take_attribute_records() {
            changed |= self.notify_attribute(doc, &record);
        }

        // Existing instances: connect/disconnect transitions.
        let mut instances: Vec<(NodeId, Rc<Instance>)> = self
            .inner
            .instances
            .borrow()
            .iter()
            .map(|(&node, instance)| (node, instance.clone()))
            .collect();
        instances.sort_by_key(|&(node, _)| node);
        for (node, instance) in instances {
            let now = doc.is_connected(node);
            if now == instance.connected.get() {
                continue;
            }
            instance.connected.set(now);
            changed = true;
            let mut element = instance.element.borrow_mut();
            if now {
                element.connected(doc);
            } else {
                element.disconnected(doc);
            }
        }

        self.prune_released(doc);

        // New elements, in document order.
        let candidates: Vec<NodeId> = doc
            .descendants(doc.root())
            .into_iter()
            .filter(|&node| !self.is_upgraded(node))
            .collect();
        for node in candidates {
            // An earlier callback may have moved it out again.
            if !doc.is_connected(node) || self.is_upgraded(node) {
                continue;
            }
            let Some(tag) = doc.tag(node) else {
                continue;
            };
            let factory = self.inner.definitions.borrow().get(&tag).cloned();
            let Some(factory) = factory else {
                continue;
            };
            self.create_instance(doc, node, &tag, &factory);
            changed = true;
        }

        changed
    }

    /// Drop disconnected instances whose node was released.
    fn prune_released(&self, doc: &Document) {
        let released: Vec<Rc<Instance>> = {
            let mut instances = self.inner.instances.borrow_mut();
            let nodes: Vec<NodeId> = instances
                .iter()
                .filter(|(node, instance)| !instance.connected.get() && doc.is_released(**node))
                .map(|(&node, _)| node)
                .collect();
            nodes
                .iter()
                .filter_map(|node| instances.remove(node))
                .collect()
        };
        if !released.is_empty() {
            debug!(count = released.len(), "released element instances dropped");
        }
        // Elements drop here, with no registry borrow held.
        drop(released);
    }

    fn create_instance(&self, doc: &Document, node: NodeId, tag: &str, factory: &ElementFactory) {
        let instance = Rc::new(Instance {
            element: Rc::new(RefCell::new(factory(node, &self.inner.context))),
            connected: Cell::new(true),
            upgraded_at: doc.mutation_count(),
        });
        self.inner.instances.borrow_mut().insert(node, instance.clone());
        debug!(tag, node = node.index(), "element upgraded");

        let mut element = instance.element.borrow_mut();
        for &name in element.observed_attributes() {
            if let Some(value) = doc.get_attribute(node, name) {
                element.attribute_changed(doc, name, None, Some(value.as_str()));
            }
        }
        element.connected(doc);
    }
}

/// Custom element names: lowercase ASCII start, at least one hyphen, no uppercase.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && name.contains('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every callback it receives.
    struct Probe {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl CustomElement for Probe {
        fn observed_attributes(&self) -> &'static [&'static str] {
            &["mode"]
        }

        fn connected(&mut self, _doc: &Document) {
            self.log.borrow_mut().push("connected".into());
        }

        fn disconnected(&mut self, _doc: &Document) {
            self.log.borrow_mut().push("disconnected".into());
        }

        fn attribute_changed(
            &mut self,
            _doc: &Document,
            name: &str,
            old: Option<&str>,
            new: Option<&str>,
        ) {
            self.log
                .borrow_mut()
                .push(format!("{name}: {old:?} -> {new:?}"));
        }
    }

    thread_local! {
        static PROBE_LOG: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    }

    impl Register for Probe {
        const DEFAULT_NAME: &'static str = "probe-element";

        fn create(_host: NodeId, _context: &ElementContext) -> Self {
            Self {
                log: PROBE_LOG.with(|log| log.clone()),
            }
        }
    }

    struct Unsupported;

    impl CustomElement for Unsupported {}

    impl Register for Unsupported {
        const DEFAULT_NAME: &'static str = "unsupported-element";

        fn condition() -> bool {
            false
        }

        fn create(_host: NodeId, _context: &ElementContext) -> Self {
            Unsupported
        }
    }

    fn setup() -> (Document, ElementRegistry) {
        PROBE_LOG.with(|log| log.borrow_mut().clear());
        let registry = ElementRegistry::new(ElementContext::default());
        Probe::register(RegisterOptions {
            registry: Some(registry.clone()),
            ..Default::default()
        })
        .unwrap();
        (Document::new(), registry)
    }

    fn log() -> Vec<String> {
        PROBE_LOG.with(|log| log.borrow().clone())
    }

    #[test]
    fn test_name_validation() {
        let registry = ElementRegistry::new(ElementContext::default());
        let factory: ElementFactory = Rc::new(|host: NodeId, context: &ElementContext| {
            Box::new(Probe::create(host, context)) as Box<dyn CustomElement>
        });
        assert_eq!(
            registry.define("probe", factory.clone()),
            Err(RegistryError::InvalidName("probe".into()))
        );
        assert_eq!(
            registry.define("Probe-x", factory.clone()),
            Err(RegistryError::InvalidName("Probe-x".into()))
        );
        assert!(registry.define("probe-x", factory.clone()).is_ok());
        assert_eq!(
            registry.define("probe-x", factory),
            Err(RegistryError::AlreadyDefined("probe-x".into()))
        );
    }

    #[test]
    fn test_condition_gates_registration() {
        let registry = ElementRegistry::new(ElementContext::default());
        Unsupported::register(RegisterOptions {
            registry: Some(registry.clone()),
            ..Default::default()
        })
        .unwrap();
        assert!(!registry.is_defined("unsupported-element"));
    }

    #[test]
    fn test_custom_name() {
        let registry = ElementRegistry::new(ElementContext::default());
        Probe::register(RegisterOptions {
            name: Some("my-probe".into()),
            registry: Some(registry.clone()),
        })
        .unwrap();
        assert!(registry.is_defined("my-probe"));
        assert!(!registry.is_defined("probe-element"));
    }

    #[test]
    fn test_upgrade_replays_attributes_then_connects() {
        let (doc, registry) = setup();
        let probe = doc.create_element_with("probe-element", &[("mode", "on"), ("other", "x")]);
        doc.append_child(doc.body(), probe);

        registry.upgrade(&doc);
        assert!(registry.is_upgraded(probe));
        assert_eq!(
            log(),
            vec![r#"mode: None -> Some("on")"#.to_string(), "connected".to_string()]
        );
    }

    #[test]
    fn test_detached_elements_are_not_upgraded() {
        let (doc, registry) = setup();
        let probe = doc.create_element("probe-element");
        registry.upgrade(&doc);
        assert!(!registry.is_upgraded(probe));

        registry.append_child(&doc, doc.body(), probe);
        assert!(registry.is_upgraded(probe));
    }

    #[test]
    fn test_only_observed_attributes_notify() {
        let (doc, registry) = setup();
        let probe = doc.create_element("probe-element");
        registry.append_child(&doc, doc.body(), probe);

        registry.set_attribute(&doc, probe, "other", "1");
        registry.set_attribute(&doc, probe, "mode", "a");
        registry.remove_attribute(&doc, probe, "mode");

        assert_eq!(
            log(),
            vec![
                "connected".to_string(),
                r#"mode: None -> Some("a")"#.to_string(),
                r#"mode: Some("a") -> None"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_remove_and_reinsert_cycles_connection() {
        let (doc, registry) = setup();
        let wrapper = doc.create_element("div");
        let probe = doc.create_element("probe-element");
        doc.append_child(wrapper, probe);
        registry.append_child(&doc, doc.body(), wrapper);

        registry.remove(&doc, wrapper);
        registry.append_child(&doc, doc.body(), wrapper);

        assert_eq!(log(), vec!["connected", "disconnected", "connected"]);
        assert_eq!(registry.instance_count(), 1);
    }

    #[test]
    fn test_direct_writes_are_delivered_after_dispatch() {
        let (doc, registry) = setup();
        let probe = doc.create_element("probe-element");
        let button = doc.create_element("button");
        registry.append_child(&doc, doc.body(), probe);
        registry.append_child(&doc, doc.body(), button);

        doc.add_event_listener(
            button,
            "click",
            move |doc, _event| {
                doc.set_attribute(probe, "mode", "clicked");
            },
            None,
        );
        doc.dispatch_event(button, "click");

        assert_eq!(log(), vec!["connected", r#"mode: None -> Some("clicked")"#]);
    }

    #[test]
    fn test_writes_before_upgrade_are_only_replayed() {
        let (doc, registry) = setup();
        registry.upgrade(&doc);
        let probe = doc.create_element("probe-element");
        doc.set_attribute(probe, "mode", "early");

        registry.append_child(&doc, doc.body(), probe);
        assert_eq!(log(), vec![r#"mode: None -> Some("early")"#, "connected"]);
    }

    #[test]
    fn test_released_instances_are_dropped() {
        let (doc, registry) = setup();
        let discarded = doc.create_element("probe-element");
        let stashed = doc.create_element("probe-element");
        registry.append_child(&doc, doc.body(), discarded);
        registry.append_child(&doc, doc.body(), stashed);

        // Releasing a connected node does nothing.
        doc.release(discarded);
        assert!(!doc.is_released(discarded));

        registry.remove(&doc, stashed);
        registry.remove(&doc, discarded);
        doc.release(discarded);
        registry.upgrade(&doc);

        assert!(!registry.is_upgraded(discarded));
        assert!(registry.is_upgraded(stashed));
        assert_eq!(registry.instance_count(), 1);
        assert_eq!(
            log(),
            vec!["connected", "connected", "disconnected", "disconnected"]
        );
    }
}
