//! # spark-elements
//!
//! Declarative custom elements over an in-memory document.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for
//! fine-grained reactivity.
//!
//! ## Elements
//!
//! - `clone-content` keeps a host's children at a declared `count`, cloning
//!   the last one to grow and stashing originals to shrink
//! - `input-source` publishes a wrapped `<input>` to the input bus
//! - `input-value` renders the value of matching inputs into target elements
//!
//! ## Architecture
//!
//! ```text
//! Document ──(tree changes via)──> ElementRegistry ──> CustomElement callbacks
//!                                        │
//!                                  ElementContext { bus: InputBus }
//!                                        │
//!              InputSource ──record──> InputBus ──broadcast──> InputValue
//!                                                                  │
//!                                                  signals + render effect
//! ```
//!
//! ## Modules
//!
//! - [`dom`] - Document arena, selectors, events
//! - [`engine`] - Abort epochs, lifecycle, element registry
//! - [`state`] - The input bus
//! - [`primitives`] - The three elements
//! - [`types`] - Values and write modes
//!
//! ## Example
//!
//! ```ignore
//! use spark_elements::*;
//!
//! let doc = Document::new();
//! let registry = ElementRegistry::new(ElementContext::default());
//! define_elements(&registry)?;
//!
//! let list = doc.create_element_with("clone-content", &[("count", "3")]);
//! let item = doc.create_element("li");
//! doc.append_child(list, item);
//! registry.append_child(&doc, doc.body(), list);
//! assert_eq!(doc.element_children(list).len(), 3);
//! ```

pub mod dom;
pub mod engine;
pub mod error;
pub mod primitives;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{Error, Result};

pub use dom::{
    AttributeRecord, Document, Event, EventListener, NodeFlags, NodeId, Selector, SelectorError,
};

pub use engine::{
    AbortController, AbortSignal, CustomElement, ElementContext, ElementFactory, ElementRegistry,
    Lifecycle, Register, RegisterOptions, RegistryError,
};

pub use state::{BusConfig, InputBus, InputUpdate};

pub use primitives::{
    CLONE_ATTRIBUTE, Cleanup, CloneContent, InputSource, InputValue, ManagedNode, define_elements,
    parse_count,
};
