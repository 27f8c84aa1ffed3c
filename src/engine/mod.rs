//! Element Engine - the capabilities every element is composed from.
//!
//! - Abort: `AbortController`/`AbortSignal` epochs and the `Lifecycle`
//!   capability (abort on disconnect, `cleanup()` to re-arm)
//! - Registry: the `Register` capability, element definitions, and the
//!   instance bookkeeping that drives element callbacks
//!
//! # Architecture
//!
//! Elements are plain structs that hold their capabilities as fields:
//!
//! ```text
//! CloneContent { host, lifecycle: Lifecycle, .. }  + impl Register
//! InputValue   { host, lifecycle: Lifecycle, bus, .. } + impl Register
//! ```
//!
//! The registry owns the instances and calls into them through
//! [`CustomElement`] whenever the tree changes through it.

mod abort;
mod registry;

pub use abort::*;
pub use registry::*;
