//! Crate-level error type.
//!
//! Element callbacks never fail (problems there are logged and skipped), so
//! errors only surface from the setup APIs: parsing a selector up front and
//! defining elements.

use thiserror::Error;

use crate::dom::SelectorError;
use crate::engine::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, Error>;
