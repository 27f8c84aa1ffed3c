//! InputValue - renders the value of a matching input into target elements.
//!
//! # Attributes
//!
//! | attribute | meaning                                         | default       |
//! |-----------|-------------------------------------------------|---------------|
//! | `from`    | selector for the inputs to follow               | `*`           |
//! | `to`      | selector for the targets, or `self`             | `output`      |
//! | `as`      | write mode (see [`WriteMode`])                  | `textContent` |
//! | `root`    | ancestor (or self) the `to` query starts from   | `*`           |
//!
//! # Reactivity
//!
//! The last delivered value and the three rendering attributes live in
//! signals. A render effect reads all four, so:
//! - a new value from the bus re-renders
//! - changing `to`/`as`/`root` re-renders the last value without resubscribing
//! - changing `from` aborts the subscription epoch and subscribes again
//!
//! Nothing renders until a first value has been delivered.

use spark_signals::{Signal, effect, effect_scope, flush_sync, signal};
use tracing::{debug, warn};

use crate::dom::{Document, NodeId, Selector};
use crate::engine::{AbortSignal, CustomElement, ElementContext, Lifecycle, Register};
use crate::primitives::Cleanup;
use crate::state::InputBus;
use crate::types::{Value, WriteMode};

const DEFAULT_FROM: &str = "*";
const DEFAULT_TO: &str = "output";
const DEFAULT_AS: &str = "textContent";
const DEFAULT_ROOT: &str = "*";

/// Reactive state shared with the render effect and the bus handler.
#[derive(Clone)]
struct Binding {
    value: Signal<Option<Value>>,
    to: Signal<String>,
    mode: Signal<String>,
    root: Signal<String>,
}

impl Binding {
    fn new() -> Self {
        Self {
            value: signal(None),
            to: signal(DEFAULT_TO.to_string()),
            mode: signal(DEFAULT_AS.to_string()),
            root: signal(DEFAULT_ROOT.to_string()),
        }
    }
}

/// The output-binding element.
pub struct InputValue {
    host: NodeId,
    bus: InputBus,
    lifecycle: Lifecycle,
    binding: Binding,
    /// Signal of the live subscription epoch.
    subscription: Option<AbortSignal>,
    /// Stops the render effect.
    stop_render: Option<Cleanup>,
}

impl InputValue {
    pub fn new(host: NodeId, bus: InputBus) -> Self {
        Self {
            host,
            bus,
            lifecycle: Lifecycle::new(),
            binding: Binding::new(),
            subscription: None,
            stop_render: None,
        }
    }

    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Last value delivered by the bus.
    pub fn value(&self) -> Option<Value> {
        self.binding.value.get()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|signal| !signal.is_aborted())
    }

    /// Start a fresh epoch and follow the inputs matching `from`.
    fn subscribe(&mut self, doc: &Document, from: &str) {
        self.lifecycle.cleanup();
        self.subscription = None;

        let selector = match Selector::parse(from) {
            Ok(selector) => selector,
            Err(error) => {
                warn!(from, %error, "input-value `from` is not a valid selector");
                return;
            }
        };
        let signal = self.lifecycle.acquire();
        let value = self.binding.value.clone();
        self.bus.subscribe(
            doc,
            self.host,
            selector,
            move |delivered: &Value| {
                value.set(Some(delivered.clone()));
                flush_sync();
            },
            &signal,
        );
        self.subscription = Some(signal);
    }

    fn start_rendering(&mut self, doc: &Document) {
        if self.stop_render.is_some() {
            return;
        }
        let scope = effect_scope(false);
        let binding = self.binding.clone();
        let doc = doc.clone();
        let host = self.host;

        scope.run(move || {
            let _effect_cleanup = effect(move || {
                // Read every signal so each one is tracked.
                let value = binding.value.get();
                let to = binding.to.get();
                let mode = binding.mode.get();
                let root = binding.root.get();
                if let Some(value) = value {
                    render(&doc, host, &to, &mode, &root, &value);
                }
            });
        });
        flush_sync();

        self.stop_render = Some(Box::new(move || {
            scope.stop();
        }));
    }

    fn stop_rendering(&mut self) {
        if let Some(stop) = self.stop_render.take() {
            stop();
        }
    }
}

fn render(doc: &Document, host: NodeId, to: &str, mode: &str, root: &str, value: &Value) {
    let root_selector = match Selector::parse(root) {
        Ok(selector) => selector,
        Err(error) => {
            warn!(root, %error, "input-value `root` is not a valid selector");
            return;
        }
    };
    let Some(root_node) = doc.closest(host, &root_selector) else {
        debug!(root, host = host.index(), "input-value root not found, render skipped");
        return;
    };

    let targets = if to == "self" {
        vec![host]
    } else {
        match Selector::parse(to) {
            Ok(selector) => doc.query_selector_all(root_node, &selector),
            Err(error) => {
                warn!(to, %error, "input-value `to` is not a valid selector");
                return;
            }
        }
    };

    let mode = WriteMode::parse(mode);
    for target in targets {
        mode.apply(doc, target, value);
    }
}

/// Attribute value, or `default` when missing or empty.
fn or_default(value: Option<&str>, default: &str) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl CustomElement for InputValue {
    fn observed_attributes(&self) -> &'static [&'static str] {
        &["from", "to", "as", "root"]
    }

    fn connected(&mut self, doc: &Document) {
        self.lifecycle.connect();
        self.start_rendering(doc);
        if !self.is_subscribed() {
            let from = doc.get_attribute(self.host, "from");
            self.subscribe(doc, &or_default(from.as_deref(), DEFAULT_FROM));
        }
    }

    fn disconnected(&mut self, _doc: &Document) {
        self.lifecycle.disconnect();
        self.subscription = None;
        self.stop_rendering();
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
        match name {
            "from" => self.subscribe(doc, &or_default(new, DEFAULT_FROM)),
            "to" => {
                self.binding.to.set(or_default(new, DEFAULT_TO));
            }
            "as" => {
                self.binding.mode.set(or_default(new, DEFAULT_AS));
            }
            "root" => {
                self.binding.root.set(or_default(new, DEFAULT_ROOT));
            }
            _ => return,
        }
        flush_sync();
    }
}

impl Register for InputValue {
    const DEFAULT_NAME: &'static str = "input-value";

    fn create(host: NodeId, context: &ElementContext) -> Self {
        Self::new(host, context.bus.clone())
    }
}

impl Drop for InputValue {
    fn drop(&mut self) {
        self.stop_rendering();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        doc: Document,
        bus: InputBus,
        slider: NodeId,
        host: NodeId,
        output: NodeId,
    }

    fn setup() -> Fixture {
        let doc = Document::new();
        let bus = InputBus::new();
        let slider = doc.create_element_with(
            "input",
            &[("id", "slider"), ("type", "range"), ("max", "10"), ("value", "4")],
        );
        doc.append_child(doc.body(), slider);
        let host = doc.create_element_with("input-value", &[("from", "#slider")]);
        let output = doc.create_element("output");
        doc.append_child(doc.body(), host);
        doc.append_child(host, output);
        Fixture {
            doc,
            bus,
            slider,
            host,
            output,
        }
    }

    /// Mirror registry upgrade: present attributes first, then connect.
    fn mount(fixture: &Fixture) -> InputValue {
        let mut element = InputValue::new(fixture.host, fixture.bus.clone());
        for name in ["from", "to", "as", "root"] {
            if let Some(value) = fixture.doc.get_attribute(fixture.host, name) {
                element.attribute_changed(&fixture.doc, name, None, Some(value.as_str()));
            }
        }
        element.connected(&fixture.doc);
        element
    }

    fn set(fixture: &Fixture, element: &mut InputValue, name: &str, value: &str) {
        let old = fixture.doc.get_attribute(fixture.host, name);
        fixture.doc.set_attribute(fixture.host, name, value);
        element.attribute_changed(&fixture.doc, name, old.as_deref(), Some(value));
    }

    #[test]
    fn test_renders_recorded_value_on_connect() {
        let fixture = setup();
        fixture.bus.record_input(&fixture.doc, fixture.slider);

        let element = mount(&fixture);
        assert_eq!(element.value(), Some(Value::Number(4.0)));
        assert_eq!(fixture.doc.text_content(fixture.output), "4");
    }

    #[test]
    fn test_nothing_rendered_before_first_value() {
        let fixture = setup();
        fixture.doc.set_text_content(fixture.output, Some("placeholder"));

        let element = mount(&fixture);
        assert_eq!(element.value(), None);
        assert_eq!(fixture.doc.text_content(fixture.output), "placeholder");
    }

    #[test]
    fn test_follows_updates() {
        let fixture = setup();
        let _element = mount(&fixture);

        fixture.doc.set_value(fixture.slider, "7");
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        assert_eq!(fixture.doc.text_content(fixture.output), "7");

        // Clamped to max.
        fixture.doc.set_value(fixture.slider, "70");
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        assert_eq!(fixture.doc.text_content(fixture.output), "10");
    }

    #[test]
    fn test_mode_change_rerenders_without_resubscribing() {
        let fixture = setup();
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        let mut element = mount(&fixture);
        assert_eq!(fixture.bus.subscriber_count(), 1);

        set(&fixture, &mut element, "as", "@value");
        assert_eq!(fixture.doc.value(fixture.output).as_deref(), Some("4"));

        set(&fixture, &mut element, "as", "--level");
        assert_eq!(
            fixture.doc.style_property(fixture.output, "--level").as_deref(),
            Some("4")
        );
        assert_eq!(fixture.bus.subscriber_count(), 1);
    }

    #[test]
    fn test_to_self() {
        let fixture = setup();
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        let mut element = mount(&fixture);

        set(&fixture, &mut element, "as", "@data-level");
        set(&fixture, &mut element, "to", "self");
        assert_eq!(
            fixture.doc.get_attribute(fixture.host, "data-level").as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_from_change_resubscribes() {
        let fixture = setup();
        let other = fixture
            .doc
            .create_element_with("input", &[("id", "other"), ("value", "text")]);
        fixture.doc.append_child(fixture.doc.body(), other);
        fixture.bus.record_input(&fixture.doc, other);

        let mut element = mount(&fixture);
        assert_eq!(element.value(), None);

        set(&fixture, &mut element, "from", "#other");
        assert_eq!(element.value(), Some(Value::Text("text".into())));
        assert_eq!(fixture.bus.subscriber_count(), 1);

        // The old selector no longer reaches this element.
        fixture.doc.set_value(fixture.slider, "9");
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        assert_eq!(element.value(), Some(Value::Text("text".into())));
    }

    #[test]
    fn test_unresolvable_root_skips_render() {
        let fixture = setup();
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        fixture.doc.set_attribute(fixture.host, "root", "section");

        let element = mount(&fixture);
        assert_eq!(element.value(), Some(Value::Number(4.0)));
        assert_eq!(fixture.doc.text_content(fixture.output), "");
    }

    #[test]
    fn test_root_widens_target_search() {
        let fixture = setup();
        let section = fixture.doc.create_element("section");
        fixture.doc.append_child(fixture.doc.body(), section);
        let outside = fixture.doc.create_element("output");
        fixture.doc.append_child(section, outside);
        fixture.bus.record_input(&fixture.doc, fixture.slider);

        let mut element = mount(&fixture);
        set(&fixture, &mut element, "root", "body");
        assert_eq!(fixture.doc.text_content(outside), "4");
        assert_eq!(fixture.doc.text_content(fixture.output), "4");
    }

    #[test]
    fn test_disconnect_stops_updates() {
        let fixture = setup();
        let mut element = mount(&fixture);
        fixture.doc.set_value(fixture.slider, "2");
        fixture.bus.record_input(&fixture.doc, fixture.slider);

        element.disconnected(&fixture.doc);
        assert_eq!(fixture.bus.subscriber_count(), 0);

        fixture.doc.set_value(fixture.slider, "3");
        fixture.bus.record_input(&fixture.doc, fixture.slider);
        assert_eq!(fixture.doc.text_content(fixture.output), "2");
    }

    #[test]
    fn test_invalid_from_does_not_subscribe() {
        let fixture = setup();
        let mut element = mount(&fixture);
        set(&fixture, &mut element, "from", "#");
        assert!(!element.is_subscribed());
        assert_eq!(fixture.bus.subscriber_count(), 0);
    }
}
