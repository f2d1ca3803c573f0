//! Built-in [`SourceAdapter`](crate::adapter::SourceAdapter) implementations.

pub mod fixture;
pub mod selector;

pub use fixture::FixtureAdapter;
pub use selector::{FieldSpec, SelectorAdapter, SelectorSpec};
