//! Domain layer types and invariants.

pub mod error;
pub mod feed;
pub mod keyword;
