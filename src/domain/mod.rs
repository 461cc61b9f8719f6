//! Domain layer types and invariants.

pub mod calculation;
pub mod error;
pub mod history;
