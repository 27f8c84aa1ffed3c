//! Input Bus - recorded input values and their subscribers.
//!
//! The bus is the shared state between [`InputSource`] publishers and
//! [`InputValue`] subscribers:
//!
//! - `record_input(input)` - coerce the input's current value, store it, broadcast
//! - `subscribe(output, selector, handler, signal)` - replay + follow matching inputs
//! - `forget(input)` - drop an input's entry when its source leaves the document
//!
//! It is an explicit context object rather than a process global: whoever
//! builds the element tree owns one bus and hands clones of it to every
//! element.
//!
//! # Matching
//!
//! An input is visible to an output when the input (or its nearest
//! `input-source` wrapper) matches the output's selector, and, if the output
//! sits inside a scope boundary, the input sits inside the same nearest
//! boundary.
//!
//! # Example
//!
//! ```ignore
//! let bus = InputBus::new();
//! let signal = lifecycle.acquire();
//!
//! bus.subscribe(&doc, output, Selector::parse("#slider")?, |value| {
//!     println!("slider: {value}");
//! }, &signal);
//!
//! doc.set_value(slider, "7");
//! bus.record_input(&doc, slider); // prints "slider: 7"
//! ```
//!
//! [`InputSource`]: crate::primitives::InputSource
//! [`InputValue`]: crate::primitives::InputValue

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::dom::{Document, NodeId, Selector};
use crate::engine::AbortSignal;
use crate::types::{Value, parse_number};

// =============================================================================
// TYPES
// =============================================================================

/// Broadcast message: `input` now holds `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct InputUpdate {
    pub input: NodeId,
    pub value: Value,
}

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Elements establishing a scope boundary.
    pub scope: Selector,
    /// Wrapper elements an input may be selected through.
    pub source: Selector,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            scope: Selector::type_selector("input-scope")
                .or(Selector::has_attribute("data-input-scope")),
            source: Selector::type_selector("input-source"),
        }
    }
}

type Listener = Rc<dyn Fn(&Document, &InputUpdate)>;

struct BusInner {
    config: BusConfig,
    /// Insertion order decides which value a new subscriber sees first.
    values: RefCell<IndexMap<NodeId, Value>>,
    listeners: RefCell<Vec<(usize, Listener)>>,
    next_id: Cell<usize>,
}

/// Handle to an input bus. Clones share state.
#[derive(Clone)]
pub struct InputBus {
    inner: Rc<BusInner>,
}

impl fmt::Debug for InputBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputBus")
            .field("values", &self.inner.values.borrow().len())
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl Default for InputBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PUBLISHING
// =============================================================================

impl InputBus {
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        Self {
            inner: Rc::new(BusInner {
                config,
                values: RefCell::new(IndexMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Read, coerce and store `input`'s value, then broadcast it.
    ///
    /// - `number` / `range` parse as numbers, clamped to `min`/`max`
    /// - `checkbox` reads the checked state
    /// - everything else stays a string
    pub fn record_input(&self, doc: &Document, input: NodeId) -> Value {
        let value = coerce(doc, input);
        trace!(input = input.index(), %value, "input recorded");
        self.inner.values.borrow_mut().insert(input, value.clone());
        self.broadcast(
            doc,
            &InputUpdate {
                input,
                value: value.clone(),
            },
        );
        value
    }

    /// Last recorded value of `input`.
    pub fn value_of(&self, input: NodeId) -> Option<Value> {
        self.inner.values.borrow().get(&input).cloned()
    }

    /// Drop `input`'s entry. Subscribers keep what they last rendered.
    pub fn forget(&self, input: NodeId) -> Option<Value> {
        self.inner.values.borrow_mut().shift_remove(&input)
    }

    /// Number of recorded inputs.
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Deliver to every listener, in registration order.
    fn broadcast(&self, doc: &Document, update: &InputUpdate) {
        // Snapshot: listeners may subscribe or unsubscribe while running.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(doc, update);
        }
    }
}

// =============================================================================
// SUBSCRIBING
// =============================================================================

impl InputBus {
    /// Is `input` visible to `output` through `selector`?
    pub fn matches_scope(
        &self,
        doc: &Document,
        output: NodeId,
        input: NodeId,
        selector: &Selector,
    ) -> bool {
        matches_scope(&self.inner.config, doc, output, input, selector)
    }

    /// Follow the inputs matching `selector` from `output`'s point of view.
    ///
    /// The first already-recorded matching value is delivered immediately.
    /// After that `handler` runs on every matching broadcast whose value
    /// differs from the last one delivered, until `signal` aborts.
    pub fn subscribe(
        &self,
        doc: &Document,
        output: NodeId,
        selector: Selector,
        handler: impl Fn(&Value) + 'static,
        signal: &AbortSignal,
    ) {
        if signal.is_aborted() {
            return;
        }

        let last: RefCell<Option<Value>> = RefCell::new(None);
        let deliver = Rc::new(move |value: &Value| {
            let changed = last.borrow().as_ref() != Some(value);
            if changed {
                *last.borrow_mut() = Some(value.clone());
                handler(value);
            }
        });

        // Replay
        let initial = self
            .inner
            .values
            .borrow()
            .iter()
            .find(|&(&input, _)| self.matches_scope(doc, output, input, &selector))
            .map(|(_, value)| value.clone());
        if let Some(value) = initial {
            deliver(&value);
        }
        // The handler may have torn the subscription down already.
        if signal.is_aborted() {
            return;
        }

        // Follow
        let bus: Weak<BusInner> = Rc::downgrade(&self.inner);
        let listener_signal = signal.clone();
        let listener: Listener = Rc::new(move |doc: &Document, update: &InputUpdate| {
            if listener_signal.is_aborted() {
                return;
            }
            let Some(inner) = bus.upgrade() else {
                return;
            };
            if matches_scope(&inner.config, doc, output, update.input, &selector) {
                deliver(&update.value);
            }
        });

        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));

        let bus = Rc::downgrade(&self.inner);
        signal.on_abort(move || {
            if let Some(inner) = bus.upgrade() {
                inner.listeners.borrow_mut().retain(|(listener_id, _)| *listener_id != id);
            }
        });
    }
}

fn matches_scope(
    config: &BusConfig,
    doc: &Document,
    output: NodeId,
    input: NodeId,
    selector: &Selector,
) -> bool {
    // Inputs without a source wrapper are matched on their own.
    let selected = doc.matches(input, selector)
        || doc
            .closest(input, &config.source)
            .is_some_and(|source| doc.matches(source, selector));
    if !selected {
        return false;
    }
    match doc.closest(output, &config.scope) {
        Some(scope) => doc.closest(input, &config.scope) == Some(scope),
        None => true,
    }
}

fn coerce(doc: &Document, input: NodeId) -> Value {
    let raw = doc.value(input).unwrap_or_default();
    let input_type = doc
        .get_attribute(input, "type")
        .unwrap_or_default()
        .to_ascii_lowercase();
    match input_type.as_str() {
        "number" | "range" => Value::Number(clamp(doc, input, parse_number(&raw))),
        "checkbox" => Value::Bool(doc.checked(input)),
        _ => Value::Text(raw),
    }
}

fn clamp(doc: &Document, input: NodeId, value: f64) -> f64 {
    let bound = |name: &str| {
        doc.get_attribute(input, name)
            .map(|raw| parse_number(&raw))
            .filter(|bound| bound.is_finite())
    };
    let mut value = value;
    if let Some(min) = bound("min") {
        if value < min {
            value = min;
        }
    }
    if let Some(max) = bound("max") {
        if value > max {
            value = max;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AbortController;

    fn setup() -> (Document, InputBus) {
        (Document::new(), InputBus::new())
    }

    fn input(doc: &Document, parent: NodeId, attrs: &[(&str, &str)]) -> NodeId {
        let input = doc.create_element_with("input", attrs);
        doc.append_child(parent, input);
        input
    }

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn(&Value) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |value: &Value| seen_clone.borrow_mut().push(value.clone()))
    }

    #[test]
    fn test_coercion_by_type() {
        let (doc, bus) = setup();
        let body = doc.body();
        let number = input(&doc, body, &[("type", "number"), ("value", "12")]);
        let checkbox = input(&doc, body, &[("type", "checkbox"), ("checked", "")]);
        let text = input(&doc, body, &[("value", "hi")]);

        assert_eq!(bus.record_input(&doc, number), Value::Number(12.0));
        assert_eq!(bus.record_input(&doc, checkbox), Value::Bool(true));
        assert_eq!(bus.record_input(&doc, text), Value::Text("hi".into()));
        assert_eq!(bus.len(), 3);
    }

    #[test]
    fn test_numeric_clamp() {
        let (doc, bus) = setup();
        let slider = input(
            &doc,
            doc.body(),
            &[("type", "range"), ("min", "2"), ("max", "10"), ("value", "50")],
        );
        assert_eq!(bus.record_input(&doc, slider), Value::Number(10.0));
        doc.set_value(slider, "-3");
        assert_eq!(bus.record_input(&doc, slider), Value::Number(2.0));

        // Text inputs are never clamped.
        let text = input(&doc, doc.body(), &[("max", "3"), ("value", "99")]);
        assert_eq!(bus.record_input(&doc, text), Value::Text("99".into()));
    }

    #[test]
    fn test_subscribe_replays_first_match() {
        let (doc, bus) = setup();
        let first = input(&doc, doc.body(), &[("value", "a")]);
        let second = input(&doc, doc.body(), &[("value", "b")]);
        bus.record_input(&doc, first);
        bus.record_input(&doc, second);

        let output = doc.create_element("input-value");
        doc.append_child(doc.body(), output);
        let controller = AbortController::new();
        let (seen, handler) = recorder();

        bus.subscribe(&doc, output, Selector::universal(), handler, &controller.signal());
        assert_eq!(*seen.borrow(), vec![Value::Text("a".into())]);
    }

    #[test]
    fn test_duplicate_values_suppressed() {
        let (doc, bus) = setup();
        let field = input(&doc, doc.body(), &[("id", "name")]);
        let output = doc.create_element("input-value");
        doc.append_child(doc.body(), output);
        let controller = AbortController::new();
        let (seen, handler) = recorder();

        bus.subscribe(
            &doc,
            output,
            Selector::parse("#name").unwrap(),
            handler,
            &controller.signal(),
        );
        assert!(seen.borrow().is_empty());

        doc.set_value(field, "x");
        bus.record_input(&doc, field);
        bus.record_input(&doc, field);
        doc.set_value(field, "y");
        bus.record_input(&doc, field);

        assert_eq!(
            *seen.borrow(),
            vec![Value::Text("x".into()), Value::Text("y".into())]
        );
    }

    #[test]
    fn test_abort_unsubscribes() {
        let (doc, bus) = setup();
        let field = input(&doc, doc.body(), &[]);
        let controller = AbortController::new();
        let (seen, handler) = recorder();

        bus.subscribe(&doc, doc.body(), Selector::universal(), handler, &controller.signal());
        assert_eq!(bus.subscriber_count(), 1);

        controller.abort();
        assert_eq!(bus.subscriber_count(), 0);

        doc.set_value(field, "late");
        bus.record_input(&doc, field);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_scope_boundaries() {
        let (doc, bus) = setup();
        let left = doc.create_element("input-scope");
        let right = doc.create_element_with("section", &[("data-input-scope", "")]);
        doc.append_child(doc.body(), left);
        doc.append_child(doc.body(), right);

        let left_input = input(&doc, left, &[]);
        let right_input = input(&doc, right, &[]);
        let outside_input = input(&doc, doc.body(), &[]);
        let left_output = doc.create_element("input-value");
        doc.append_child(left, left_output);
        let free_output = doc.create_element("input-value");
        doc.append_child(doc.body(), free_output);

        let any_input = Selector::type_selector("input");
        assert!(bus.matches_scope(&doc, left_output, left_input, &any_input));
        assert!(!bus.matches_scope(&doc, left_output, right_input, &any_input));
        assert!(!bus.matches_scope(&doc, left_output, outside_input, &any_input));

        // Scope-less outputs see everything the selector matches.
        assert!(bus.matches_scope(&doc, free_output, left_input, &any_input));
        assert!(bus.matches_scope(&doc, free_output, outside_input, &any_input));
    }

    #[test]
    fn test_selected_through_source_wrapper() {
        let (doc, bus) = setup();
        let source = doc.create_element_with("input-source", &[("id", "volume")]);
        doc.append_child(doc.body(), source);
        let wrapped = input(&doc, source, &[]);
        let bare = input(&doc, doc.body(), &[]);

        let by_wrapper = Selector::parse("#volume").unwrap();
        assert!(bus.matches_scope(&doc, doc.body(), wrapped, &by_wrapper));
        assert!(!bus.matches_scope(&doc, doc.body(), bare, &by_wrapper));
    }

    #[test]
    fn test_forget_removes_entry() {
        let (doc, bus) = setup();
        let field = input(&doc, doc.body(), &[("value", "v")]);
        bus.record_input(&doc, field);
        assert_eq!(bus.value_of(field), Some(Value::Text("v".into())));

        assert_eq!(bus.forget(field), Some(Value::Text("v".into())));
        assert!(bus.is_empty());
        assert_eq!(bus.value_of(field), None);
    }

    #[test]
    fn test_broadcast_in_registration_order() {
        let (doc, bus) = setup();
        let field = input(&doc, doc.body(), &[]);
        let controller = AbortController::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(
                &doc,
                doc.body(),
                Selector::universal(),
                move |_| order.borrow_mut().push(label),
                &controller.signal(),
            );
        }

        doc.set_value(field, "go");
        bus.record_input(&doc, field);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }
}
