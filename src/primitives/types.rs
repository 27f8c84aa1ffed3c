//! Primitive types - cleanup.

// =============================================================================
// Cleanup Function
// =============================================================================

/// Cleanup function handed out by capabilities.
///
/// Call it to release whatever the capability was holding on to.
pub type Cleanup = Box<dyn FnOnce()>;
