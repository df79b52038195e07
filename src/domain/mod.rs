//! Domain layer types and invariants.

pub mod attachment;
pub mod document;
pub mod slug;
