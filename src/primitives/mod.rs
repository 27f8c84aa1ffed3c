//! Elements - the custom elements built on the engine capabilities.
//!
//! - [`CloneContent`] - keeps a host's managed children at a declared count
//! - [`InputSource`] - publishes a wrapped `<input>` to the input bus
//! - [`InputValue`] - renders the value of matching inputs into targets
//!
//! # Architecture
//!
//! Every element is a struct holding its host node plus the capabilities it
//! needs (a [`Lifecycle`](crate::engine::Lifecycle), the shared
//! [`InputBus`](crate::state::InputBus)). It implements
//! [`CustomElement`](crate::engine::CustomElement) for the callbacks and
//! [`Register`](crate::engine::Register) for its default tag name.
//!
//! ```ignore
//! let registry = ElementRegistry::new(ElementContext::default());
//! define_elements(&registry)?;
//! registry.upgrade(&doc);
//! ```

mod clone_content;
mod input_source;
mod input_value;
mod types;

pub use clone_content::{CLONE_ATTRIBUTE, CloneContent, ManagedNode, parse_count};
pub use input_source::InputSource;
pub use input_value::InputValue;
pub use types::*;

use crate::engine::{ElementRegistry, Register, RegisterOptions};
use crate::error::Result;

/// Define all three elements under their default names on `registry`.
pub fn define_elements(registry: &ElementRegistry) -> Result<()> {
    let options = || RegisterOptions {
        name: None,
        registry: Some(registry.clone()),
    };
    CloneContent::register(options())?;
    InputSource::register(options())?;
    InputValue::register(options())?;
    Ok(())
}
