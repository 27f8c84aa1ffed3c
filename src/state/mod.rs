//! State Module - Runtime state shared between elements
//!
//! - **Input bus** - recorded input values, broadcast, scoped subscriptions

mod input_bus;

pub use input_bus::*;
