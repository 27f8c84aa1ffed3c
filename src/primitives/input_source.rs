//! InputSource - publishes a wrapped `<input>` to the input bus.
//!
//! On connect the first contained `input` is recorded immediately and then
//! re-recorded on every `input` event, for as long as the element stays in
//! the document. On disconnect the listener is dropped and the input's entry
//! is removed from the bus.

use tracing::debug;

use crate::dom::{Document, NodeId, Selector};
use crate::engine::{CustomElement, ElementContext, Lifecycle, Register};
use crate::state::InputBus;

#[derive(Debug)]
pub struct InputSource {
    host: NodeId,
    bus: InputBus,
    lifecycle: Lifecycle,
    input: Option<NodeId>,
}

impl InputSource {
    pub fn new(host: NodeId, bus: InputBus) -> Self {
        Self {
            host,
            bus,
            lifecycle: Lifecycle::new(),
            input: None,
        }
    }

    /// The input currently being published.
    pub fn input(&self) -> Option<NodeId> {
        self.input
    }
}

impl CustomElement for InputSource {
    fn connected(&mut self, doc: &Document) {
        self.lifecycle.connect();
        let Some(input) = doc.query_selector(self.host, &Selector::type_selector("input")) else {
            debug!(host = self.host.index(), "input-source has no input");
            return;
        };
        self.input = Some(input);
        self.bus.record_input(doc, input);

        let bus = self.bus.clone();
        doc.add_event_listener(
            input,
            "input",
            move |doc, event| {
                bus.record_input(doc, event.target);
            },
            Some(&self.lifecycle.acquire()),
        );
    }

    fn disconnected(&mut self, _doc: &Document) {
        self.lifecycle.disconnect();
        if let Some(input) = self.input.take() {
            self.bus.forget(input);
        }
    }
}

impl Register for InputSource {
    const DEFAULT_NAME: &'static str = "input-source";

    fn create(host: NodeId, context: &ElementContext) -> Self {
        Self::new(host, context.bus.clone())
    }
}
